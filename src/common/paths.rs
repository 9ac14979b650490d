use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "REINSTALL_ALL_CONFIG";

/// Location of the config file: `$REINSTALL_ALL_CONFIG` if set, otherwise
/// `reinstall-all/config.toml` in the user config directory.
pub fn config_file() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir().context("Unable to determine user config directory")?;
    Ok(config_dir.join("reinstall-all").join("config.toml"))
}

/// Directory that receives the per-run install logs when none is configured
pub fn default_log_dir() -> PathBuf {
    std::env::temp_dir()
}
