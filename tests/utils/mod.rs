use anyhow::Result;
use std::path::Path;
use std::process::Command;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run the built binary with `args`, pointing it at `config` instead of the
/// user's config file.
pub fn run_reinstall_command(config: &Path, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_reinstall-all"))
        .args(args)
        .env("REINSTALL_ALL_CONFIG", config)
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
