mod common;
mod reinstall;
mod ui;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use crate::common::config::Config;
use crate::common::interrupt::{InterruptLatch, InterruptRequest};
use crate::reinstall::ReinstallSettings;
use crate::ui::prelude::*;

/// Reinstall every installed package, essential packages first. Batches that
/// fail are split into smaller batches until the broken packages are found.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Do not refresh the package lists before reinstalling
    #[arg(long)]
    skip_apt_update: bool,

    /// Answer yes to every package manager prompt
    #[arg(short = 'y', long)]
    assume_yes: bool,
}

/// First Ctrl+C lets the running batch finish, the second aborts.
async fn listen_ctrl_c(latch: Arc<InterruptLatch>) {
    while let Ok(()) = tokio::signal::ctrl_c().await {
        match latch.request() {
            InterruptRequest::Latched => emit(
                Level::Warn,
                "interrupt.latched",
                "Interrupt received, finishing the current batch. Press Ctrl+C again to abort.",
                None,
            ),
            InterruptRequest::Forced => emit(
                Level::Error,
                "interrupt.forced",
                "Second interrupt received, aborting.",
                None,
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    ui::init(config.output, config.color && std::io::stdout().is_terminal());
    ui::set_debug_mode(config.debug);

    let settings = ReinstallSettings::from_config(&config, cli.assume_yes, cli.skip_apt_update);
    emit(
        Level::Debug,
        "settings",
        &format!("{:?}", settings),
        None,
    );

    let latch = Arc::new(InterruptLatch::new());
    tokio::spawn(listen_ctrl_c(latch.clone()));

    tokio::task::spawn_blocking(move || reinstall::reinstall_all(&settings, latch))
        .await
        .context("Reinstall task panicked")??;

    Ok(())
}
