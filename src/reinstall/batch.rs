//! Adaptive batch installation.
//!
//! Reinstalling thousands of packages in one package manager call tends to
//! trip over ordering problems that never show up in smaller runs. A batch
//! that fails is therefore split into `split_count` equal groups plus one
//! singleton per remainder package, and the pieces are queued behind the
//! pending work. A single package that still fails gets one dependency
//! repair and one retry before it is recorded as failed.
//!
//! Work items are ranges into the caller's package list. Splitting a range
//! always yields contiguous sub-ranges, so the range is both the package
//! list of an item and what progress output reports.

use std::collections::VecDeque;
use std::io;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::common::interrupt::InterruptLatch;
use crate::common::package::{InstallError, InstallLog, PackageInstaller};
use crate::common::progress;
use crate::ui::prelude::*;

/// Number of groups a failed batch is split into unless configured otherwise
pub const DEFAULT_SPLIT_COUNT: usize = 4;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("at least 2 packages are needed for a batch install, got {count}")]
    TooFewPackages { count: usize },

    #[error("split count must be at least 2, got {split_count}")]
    SplitCountTooSmall { split_count: usize },

    #[error("aborted after a second interrupt")]
    ForcedInterrupt,

    #[error("failed to create install log in {}: {source}", dir.display())]
    Log {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The package manager could not be started at all.
    #[error(transparent)]
    Install(InstallError),
}

/// Result of one batch run.
///
/// Every input package ends up in exactly one of `installed` (counted),
/// `failed` or `unresolved`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Number of packages handed to the run
    pub attempted: usize,
    /// Number of packages reinstalled successfully
    pub installed: usize,
    /// Packages that failed on their own even after a dependency repair
    pub failed: Vec<String>,
    /// Packages never settled because the run was interrupted
    pub unresolved: Vec<String>,
    pub interrupted: bool,
    pub log_path: Option<PathBuf>,
}

/// Split `range` into `split_count` groups of `len / split_count` packages,
/// followed by one single-package range per remainder package.
///
/// Groups that would be empty (range shorter than `split_count`) are left
/// out.
pub fn split(range: Range<usize>, split_count: usize) -> Vec<Range<usize>> {
    let len = range.len();
    let group = len / split_count;
    let full = group * split_count;

    let mut children = Vec::with_capacity(split_count + len - full);
    if group > 0 {
        children.extend((0..split_count).map(|i| {
            let start = range.start + i * group;
            start..start + group
        }));
    }
    children.extend((range.start + full..range.end).map(|i| i..i + 1));
    children
}

enum Isolation {
    Installed,
    Failed,
    /// Interrupted before the repair and retry could start
    Abandoned,
}

/// Installs package lists through a [`PackageInstaller`], splitting batches
/// that fail.
#[derive(Debug)]
pub struct BatchInstaller<I> {
    installer: I,
    latch: Arc<InterruptLatch>,
    split_count: usize,
    log_dir: PathBuf,
}

impl<I: PackageInstaller> BatchInstaller<I> {
    pub fn new(installer: I, latch: Arc<InterruptLatch>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            installer,
            latch,
            split_count: DEFAULT_SPLIT_COUNT,
            log_dir: log_dir.into(),
        }
    }

    pub fn with_split_count(mut self, split_count: usize) -> Result<Self, BatchError> {
        if split_count < 2 {
            return Err(BatchError::SplitCountTooSmall { split_count });
        }
        self.split_count = split_count;
        Ok(self)
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Reinstall `packages`, at least two of them, splitting on failure.
    pub fn install_batch(&self, packages: &[String]) -> Result<BatchOutcome, BatchError> {
        if packages.len() < 2 {
            return Err(BatchError::TooFewPackages {
                count: packages.len(),
            });
        }
        self.run(packages)
    }

    /// Reinstall one package, with the same repair and retry a batch gives
    /// an isolated failure.
    pub fn install_single(&self, package: &str) -> Result<BatchOutcome, BatchError> {
        self.run(&[package.to_string()])
    }

    fn open_log(&self) -> Result<InstallLog, BatchError> {
        let log = InstallLog::create(&self.log_dir).map_err(|source| BatchError::Log {
            dir: self.log_dir.clone(),
            source,
        })?;
        let path = log.path().display();
        emit(
            Level::Info,
            "reinstall.log",
            &format!("logging to {} (use 'tail -f {}' to follow the output)", path, path),
            Some(json!({ "path": log.path() })),
        );
        Ok(log)
    }

    fn run(&self, packages: &[String]) -> Result<BatchOutcome, BatchError> {
        let log = self.open_log()?;
        let mut outcome = BatchOutcome {
            attempted: packages.len(),
            log_path: Some(log.path().to_path_buf()),
            ..BatchOutcome::default()
        };

        let mut queue: VecDeque<Range<usize>> = VecDeque::from([0..packages.len()]);

        while let Some(range) = queue.pop_front() {
            if self.latch.is_forced() {
                return Err(BatchError::ForcedInterrupt);
            }
            if self.latch.is_requested() {
                queue.push_front(range);
                outcome.interrupted = true;
                break;
            }

            let batch = &packages[range.clone()];
            emit(
                Level::Info,
                "reinstall.interval",
                &format!("installing interval {} to {}", range.start, range.end),
                Some(json!({ "begin": range.start, "end": range.end })),
            );

            if self.attempt(batch, &log)? {
                outcome.installed += batch.len();
                continue;
            }

            if batch.len() > 1 {
                let children = split(range.clone(), self.split_count);
                emit(
                    Level::Warn,
                    "reinstall.split",
                    &format!(
                        "interval {} to {} failed, retrying as {} smaller batches",
                        range.start,
                        range.end,
                        children.len()
                    ),
                    None,
                );
                queue.extend(children);
                continue;
            }

            match self.isolate(batch, &log)? {
                Isolation::Installed => outcome.installed += 1,
                Isolation::Failed => {
                    emit(
                        Level::Error,
                        "reinstall.failed",
                        &format!("{} could not be reinstalled", batch[0]),
                        Some(json!({ "package": batch[0] })),
                    );
                    outcome.failed.push(batch[0].clone());
                }
                Isolation::Abandoned => {
                    queue.push_front(range);
                    outcome.interrupted = true;
                    break;
                }
            }
        }

        outcome.unresolved = queue
            .into_iter()
            .flat_map(|range| packages[range].iter().cloned())
            .collect();
        Ok(outcome)
    }

    /// One package manager invocation. `Ok(false)` means the batch failed
    /// and should be split or isolated.
    fn attempt(&self, batch: &[String], log: &InstallLog) -> Result<bool, BatchError> {
        let spinner = progress::create_spinner(format!(
            "Reinstalling {} package{}",
            batch.len(),
            if batch.len() == 1 { "" } else { "s" }
        ));
        let result = self.installer.reinstall(batch, log);
        spinner.finish_and_clear();

        if self.latch.is_forced() {
            return Err(BatchError::ForcedInterrupt);
        }

        match result {
            Ok(()) => Ok(true),
            Err(err @ InstallError::Failed { .. }) => {
                emit(Level::Debug, "reinstall.attempt", &err.to_string(), None);
                Ok(false)
            }
            Err(InstallError::ForcedInterrupt { .. }) => Err(BatchError::ForcedInterrupt),
            Err(err @ (InstallError::Launch { .. } | InstallError::Log { .. })) => {
                Err(BatchError::Install(err))
            }
        }
    }

    fn isolate(&self, batch: &[String], log: &InstallLog) -> Result<Isolation, BatchError> {
        if self.latch.is_requested() {
            return Ok(Isolation::Abandoned);
        }

        emit(
            Level::Warn,
            "reinstall.isolated",
            &format!(
                "{} failed on its own, repairing broken dependencies before one more try",
                batch[0]
            ),
            None,
        );

        match self.installer.fix_broken(log) {
            Ok(()) => {}
            Err(InstallError::ForcedInterrupt { .. }) => return Err(BatchError::ForcedInterrupt),
            Err(err) => emit(
                Level::Debug,
                "reinstall.repair",
                &format!("dependency repair did not succeed: {}", err),
                None,
            ),
        }

        if self.latch.is_forced() {
            return Err(BatchError::ForcedInterrupt);
        }
        if self.latch.is_requested() {
            return Ok(Isolation::Abandoned);
        }

        if self.attempt(batch, log)? {
            Ok(Isolation::Installed)
        } else {
            Ok(Isolation::Failed)
        }
    }
}
