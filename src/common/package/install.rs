//! Running the package manager for one batch.

use std::cell::Cell;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use duct::cmd;
use thiserror::Error;

use super::{InstallLog, PackageTool};
use crate::common::interrupt::InterruptLatch;
use crate::ui::prelude::*;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum InstallError {
    /// The package manager ran and exited non-zero.
    #[error("{tool} exited with {}", exit_description(.code))]
    Failed { tool: PackageTool, code: Option<i32> },

    #[error("{tool} was killed after a second interrupt")]
    ForcedInterrupt { tool: PackageTool },

    #[error("failed to run {tool}: {source}")]
    Launch {
        tool: PackageTool,
        #[source]
        source: io::Error,
    },

    #[error("failed to write install log: {source}")]
    Log {
        #[source]
        source: io::Error,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Options forwarded to every install invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Answer yes to every prompt and run non-interactively
    pub assume_yes: bool,
    /// Do not refresh the package lists before the first install
    pub skip_apt_update: bool,
}

/// The single-batch primitives the batch installer is built on.
pub trait PackageInstaller {
    /// Reinstall `packages` in one package manager invocation, writing its
    /// output to `log`. Fails with [`InstallError::Failed`] when the package
    /// manager exits non-zero.
    fn reinstall(&self, packages: &[String], log: &InstallLog) -> Result<(), InstallError>;

    /// Best-effort repair of broken dependencies.
    fn fix_broken(&self, log: &InstallLog) -> Result<(), InstallError>;
}

/// [`PackageInstaller`] backed by apt-get or apt.
#[derive(Debug)]
pub struct AptInstaller {
    tool: PackageTool,
    program: OsString,
    options: InstallOptions,
    latch: Arc<InterruptLatch>,
    lists_refreshed: Cell<bool>,
}

impl AptInstaller {
    pub fn new(tool: PackageTool, options: InstallOptions, latch: Arc<InterruptLatch>) -> Self {
        Self {
            tool,
            program: OsString::from(tool.program()),
            options,
            latch,
            lists_refreshed: Cell::new(false),
        }
    }

    /// Run `program` instead of the tool's own executable, keeping the
    /// tool's arguments.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into().into_os_string();
        self
    }

    fn launch_error(&self, source: io::Error) -> InstallError {
        InstallError::Launch {
            tool: self.tool,
            source,
        }
    }

    /// Run the package manager with `args`, appending everything it prints
    /// to `log`, and wait for it. Polls so a forced interrupt can kill it.
    fn run(&self, args: Vec<String>, log: &InstallLog) -> Result<(), InstallError> {
        let command_line = format!("{} {}", self.program.to_string_lossy(), args.join(" "));
        emit(Level::Debug, "package.run", &format!("running {}", command_line), None);
        let log_error = |source| InstallError::Log { source };
        log.note(&format!("$ {}", command_line)).map_err(log_error)?;

        let stdout = log.writer().map_err(log_error)?;
        let stderr = log.writer().map_err(log_error)?;

        let mut expression = cmd(self.program.clone(), args)
            .stdout_file(stdout)
            .stderr_file(stderr)
            .unchecked();
        // Without -y the tool may prompt, and a background process group
        // reading the terminal is stopped by SIGTTIN, which try_wait never
        // reports. Only a child with stdin closed leaves the foreground
        // group, so that a terminal Ctrl+C reaches nothing but the latch.
        if self.options.assume_yes {
            expression = expression
                .env("DEBIAN_FRONTEND", "noninteractive")
                .stdin_null()
                .before_spawn(|command| {
                    command.process_group(0);
                    Ok(())
                });
        }

        let handle = expression.start().map_err(|e| self.launch_error(e))?;

        loop {
            if let Some(output) = handle.try_wait().map_err(|e| self.launch_error(e))? {
                if output.status.success() {
                    return Ok(());
                }
                return Err(InstallError::Failed {
                    tool: self.tool,
                    code: output.status.code(),
                });
            }

            if self.latch.is_forced() {
                emit(
                    Level::Warn,
                    "package.kill",
                    &format!("Killing {}", self.tool),
                    None,
                );
                let _ = handle.kill();
                let _ = handle.wait();
                let _ = log.note(&format!("$ killed {}", self.tool));
                return Err(InstallError::ForcedInterrupt { tool: self.tool });
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl PackageInstaller for AptInstaller {
    fn reinstall(&self, packages: &[String], log: &InstallLog) -> Result<(), InstallError> {
        if packages.is_empty() {
            return Ok(());
        }

        // Refresh once per installer; a failed refresh is retried next time
        if !self.options.skip_apt_update && !self.lists_refreshed.get() {
            self.run(self.tool.update_args(), log)?;
            self.lists_refreshed.set(true);
        }

        self.run(
            self.tool
                .install_args(packages, true, self.options.assume_yes),
            log,
        )
    }

    fn fix_broken(&self, log: &InstallLog) -> Result<(), InstallError> {
        self.run(self.tool.fix_broken_args(self.options.assume_yes), log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Instant;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn installer(program: &str, options: InstallOptions) -> AptInstaller {
        AptInstaller::new(PackageTool::AptGet, options, Arc::new(InterruptLatch::new()))
            .with_program(program)
    }

    /// Executable shell script standing in for the package manager.
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn skip_update() -> InstallOptions {
        InstallOptions {
            assume_yes: true,
            skip_apt_update: true,
        }
    }

    #[test]
    fn test_zero_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let apt = installer("true", skip_update());

        apt.reinstall(&names(&["bash", "coreutils"]), &log).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("$ true install --reinstall --assume-yes bash coreutils"));
    }

    #[test]
    fn test_non_zero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let apt = installer("false", skip_update());

        let err = apt.reinstall(&names(&["bash"]), &log).unwrap_err();
        assert!(matches!(
            err,
            InstallError::Failed {
                tool: PackageTool::AptGet,
                code: Some(1)
            }
        ));
        assert_eq!(err.to_string(), "apt-get exited with code 1");
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let apt = installer("/nonexistent/reinstall-all/apt-get", skip_update());

        let err = apt.reinstall(&names(&["bash"]), &log).unwrap_err();
        assert!(matches!(err, InstallError::Launch { .. }));
    }

    #[test]
    fn test_lists_refreshed_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let apt = installer("true", InstallOptions::default());

        apt.reinstall(&names(&["bash"]), &log).unwrap();
        apt.reinstall(&names(&["dash"]), &log).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let commands: Vec<&str> = contents.lines().filter(|l| l.starts_with("$ ")).collect();
        assert_eq!(
            commands,
            vec![
                "$ true update",
                "$ true install --reinstall bash",
                "$ true install --reinstall dash",
            ]
        );
    }

    #[test]
    fn test_failed_refresh_fails_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let apt = installer("false", InstallOptions::default());

        assert!(apt.reinstall(&names(&["bash"]), &log).is_err());
        assert!(apt.reinstall(&names(&["bash"]), &log).is_err());

        let contents = fs::read_to_string(log.path()).unwrap();
        let updates = contents.lines().filter(|l| *l == "$ false update").count();
        assert_eq!(updates, 2);
        assert!(!contents.contains("install --reinstall"));
    }

    #[test]
    fn test_fix_broken_command() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let apt = installer("true", skip_update());

        apt.fix_broken(&log).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("$ true --fix-broken install --assume-yes"));
    }

    #[test]
    fn test_empty_batch_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let apt = installer("false", InstallOptions::default());

        apt.reinstall(&[], &log).unwrap();
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "");
    }

    #[test]
    fn test_log_write_failure_is_not_a_launch_error() {
        let file = fs::OpenOptions::new().write(true).open("/dev/full").unwrap();
        let log = InstallLog::from_file(PathBuf::from("/dev/full"), file);
        let apt = installer("true", skip_update());

        let err = apt.reinstall(&names(&["bash"]), &log).unwrap_err();

        assert!(matches!(err, InstallError::Log { .. }));
        assert!(err.to_string().starts_with("failed to write install log"));
    }

    #[test]
    fn test_second_interrupt_kills_running_tool() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let program = script(dir.path(), "slow-apt", "exec sleep 30");
        let latch = Arc::new(InterruptLatch::new());
        let apt = AptInstaller::new(PackageTool::AptGet, skip_update(), latch.clone())
            .with_program(&program);

        let interrupter = {
            let latch = latch.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                latch.request();
                latch.request();
            })
        };

        let started = Instant::now();
        let err = apt.reinstall(&names(&["bash"]), &log).unwrap_err();
        interrupter.join().unwrap();

        assert!(matches!(
            err,
            InstallError::ForcedInterrupt {
                tool: PackageTool::AptGet
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.lines().any(|l| l == "$ killed apt-get"));
    }

    #[test]
    fn test_single_interrupt_lets_tool_finish() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let program = script(dir.path(), "short-apt", "sleep 1");
        let latch = Arc::new(InterruptLatch::new());
        latch.request();
        let apt = AptInstaller::new(PackageTool::AptGet, skip_update(), latch.clone())
            .with_program(&program);

        apt.reinstall(&names(&["bash"]), &log).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(!contents.contains("killed"));
    }

    #[test]
    fn test_prompting_tool_stays_in_foreground_group() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        // Fails when the script leads its own process group, which is where
        // a terminal read would stop it.
        let program = script(
            dir.path(),
            "prompting-apt",
            "read -r _pid _comm _state _ppid pgrp _rest < /proc/$$/stat\n[ \"$pgrp\" != \"$$\" ]",
        );
        let interactive = InstallOptions {
            assume_yes: false,
            skip_apt_update: true,
        };
        let apt = installer(program.to_str().unwrap(), interactive);

        apt.fix_broken(&log).unwrap();
        apt.reinstall(&names(&["bash"]), &log).unwrap();
    }

    #[test]
    fn test_assume_yes_closes_stdin_for_readers() {
        let dir = tempfile::tempdir().unwrap();
        let log = InstallLog::create(dir.path()).unwrap();
        let program = script(
            dir.path(),
            "reading-apt",
            "if read -r answer; then exit 3; fi\n[ \"$DEBIAN_FRONTEND\" = noninteractive ]",
        );
        let apt = installer(program.to_str().unwrap(), skip_update());

        let started = Instant::now();
        apt.reinstall(&names(&["bash"]), &log).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
