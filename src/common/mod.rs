pub mod config;
pub mod distro;
pub mod interrupt;
pub mod package;
pub mod paths;
pub mod privileges;
pub mod progress;
