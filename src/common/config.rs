//! User configuration for a reinstall run.
//!
//! Everything here has a default, so a missing file or a file with only a
//! few keys is fine:
//!
//! ```toml
//! tool = "apt-get"
//! split_count = 4
//! log_dir = "/var/log/reinstall-all"
//! output = "text"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::package::PackageTool;
use crate::common::paths;
use crate::reinstall::batch::DEFAULT_SPLIT_COUNT;
use crate::ui::OutputFormat;

fn default_split_count() -> usize {
    DEFAULT_SPLIT_COUNT
}

fn default_color() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Package manager front end used for installs and repairs
    pub tool: PackageTool,
    /// Run this executable instead of the tool's default program
    pub tool_path: Option<PathBuf>,
    /// Number of equal groups a failed batch is split into
    #[serde(default = "default_split_count")]
    pub split_count: usize,
    /// Where install logs are created
    pub log_dir: Option<PathBuf>,
    pub assume_yes: bool,
    pub skip_apt_update: bool,
    pub output: OutputFormat,
    #[serde(default = "default_color")]
    pub color: bool,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tool: PackageTool::default(),
            tool_path: None,
            split_count: default_split_count(),
            log_dir: None,
            assume_yes: false,
            skip_apt_update: false,
            output: OutputFormat::default(),
            color: default_color(),
            debug: false,
        }
    }
}

impl Config {
    /// Load the config from its default location. A missing file yields the
    /// defaults.
    pub fn load() -> Result<Config> {
        let cfg_path = paths::config_file()?;
        Self::load_from(&cfg_path)
    }

    pub fn load_from(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&s)
            .with_context(|| format!("parsing config toml {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.split_count < 2 {
            anyhow::bail!(
                "split_count must be at least 2, got {}",
                self.split_count
            );
        }
        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(paths::default_log_dir)
    }
}
