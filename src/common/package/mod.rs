//! Driving the system package manager.
//!
//! - [`PackageTool`]: which APT front end runs the commands
//! - [`PackageInstaller`]: the install and repair primitives a batch run is
//!   built on, implemented for the real system by [`AptInstaller`]
//! - [`InstallLog`]: the file package manager output is appended to

mod install;
mod log;
mod manager;

pub use install::{AptInstaller, InstallError, InstallOptions, PackageInstaller};
pub use log::InstallLog;
pub use manager::PackageTool;
