//! Reinstall every installed package: essential packages first, then the
//! rest, each group through the adaptive [`BatchInstaller`].

pub mod batch;
pub mod installed;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::common::config::Config;
use crate::common::distro::OperatingSystem;
use crate::common::interrupt::InterruptLatch;
use crate::common::package::{AptInstaller, InstallOptions, PackageInstaller, PackageTool};
use crate::ui::prelude::*;

pub use batch::{BatchError, BatchInstaller, BatchOutcome};
pub use installed::{DpkgDatabase, InstalledSet, collect_installed};

/// Everything a reinstall run needs, resolved from config and CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ReinstallSettings {
    pub tool: PackageTool,
    pub tool_path: Option<PathBuf>,
    pub options: InstallOptions,
    pub split_count: usize,
    pub log_dir: PathBuf,
}

impl ReinstallSettings {
    /// Command line flags can only switch options on.
    pub fn from_config(config: &Config, assume_yes: bool, skip_apt_update: bool) -> Self {
        Self {
            tool: config.tool,
            tool_path: config.tool_path.clone(),
            options: InstallOptions {
                assume_yes: assume_yes || config.assume_yes,
                skip_apt_update: skip_apt_update || config.skip_apt_update,
            },
            split_count: config.split_count,
            log_dir: config.log_dir(),
        }
    }
}

/// Totals over both package groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub installed: usize,
    pub failed: Vec<String>,
    pub unresolved: usize,
    pub interrupted: bool,
    pub logs: Vec<PathBuf>,
}

impl Summary {
    fn add(&mut self, outcome: BatchOutcome) {
        self.installed += outcome.installed;
        self.failed.extend(outcome.failed);
        self.unresolved += outcome.unresolved.len();
        self.interrupted |= outcome.interrupted;
        self.logs.extend(outcome.log_path);
    }
}

/// Reinstall all installed packages on this machine.
pub fn reinstall_all(settings: &ReinstallSettings, latch: Arc<InterruptLatch>) -> Result<Summary> {
    let os = OperatingSystem::detect();
    if !os.is_debian_based() {
        anyhow::bail!(
            "Reinstalling packages is only supported on Debian-based systems ({} detected)",
            os.name()
        );
    }

    let set = collect_installed(&DpkgDatabase, sudo::check())
        .context("Failed to list installed packages")?;
    if set.is_empty() {
        anyhow::bail!("The package database lists no installed packages");
    }

    let mut installer = AptInstaller::new(settings.tool, settings.options, latch.clone());
    if let Some(program) = &settings.tool_path {
        installer = installer.with_program(program);
    }
    let batch = BatchInstaller::new(installer, latch.clone(), &settings.log_dir)
        .with_split_count(settings.split_count)?;

    let summary = install_groups(&batch, &set, &latch)?;
    report(&summary);
    Ok(summary)
}

/// Install the essential group, then the rest unless an interrupt arrived
/// in between.
pub fn install_groups<I: PackageInstaller>(
    batch: &BatchInstaller<I>,
    set: &InstalledSet,
    latch: &InterruptLatch,
) -> Result<Summary, BatchError> {
    let mut summary = Summary {
        total: set.len(),
        ..Summary::default()
    };

    emit(
        Level::Info,
        "reinstall.essential",
        &format!("installing {} essential packages", set.essential.len()),
        None,
    );
    summary.add(install_group(batch, &set.essential)?);

    if latch.is_requested() {
        if !set.other.is_empty() {
            emit(
                Level::Warn,
                "reinstall.skipped",
                &format!(
                    "interrupted, skipping the {} remaining packages",
                    set.other.len()
                ),
                None,
            );
            summary.unresolved += set.other.len();
            summary.interrupted = true;
        }
        return Ok(summary);
    }

    emit(
        Level::Info,
        "reinstall.remaining",
        &format!("installing {} remaining packages", set.other.len()),
        None,
    );
    summary.add(install_group(batch, &set.other)?);
    Ok(summary)
}

fn install_group<I: PackageInstaller>(
    batch: &BatchInstaller<I>,
    packages: &[String],
) -> Result<BatchOutcome, BatchError> {
    match packages {
        [] => Ok(BatchOutcome::default()),
        [package] => batch.install_single(package),
        _ => batch.install_batch(packages),
    }
}

fn report(summary: &Summary) {
    let clean = summary.failed.is_empty() && summary.unresolved == 0;
    emit(
        if clean { Level::Success } else { Level::Warn },
        "reinstall.summary",
        &format!(
            "installed {} of {} packages",
            summary.installed, summary.total
        ),
        serde_json::to_value(summary).ok(),
    );

    if !summary.failed.is_empty() {
        emit(
            Level::Error,
            "reinstall.failed_packages",
            &format!(
                "{} package{} could not be reinstalled even on their own: {}",
                summary.failed.len(),
                if summary.failed.len() == 1 { "" } else { "s" },
                summary.failed.join(" ")
            ),
            None,
        );
    }

    if summary.unresolved > 0 {
        emit(
            Level::Warn,
            "reinstall.unresolved",
            &format!(
                "{} packages were not reinstalled because the run was interrupted",
                summary.unresolved
            ),
            None,
        );
    }

    for log in &summary.logs {
        emit(
            Level::Info,
            "reinstall.log_file",
            &format!("package manager output: {}", log.display()),
            None,
        );
    }
}
