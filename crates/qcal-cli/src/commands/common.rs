//! Shared helpers for CLI commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use qcal_hal::JobProgress;
use qcal_state::{Machine, NodeStore, StateError, default_state_path, default_storage_root};

use crate::StoreArgs;

/// State file from the flag or environment, else the default.
pub fn state_path(args: &StoreArgs) -> Result<PathBuf> {
    match &args.state {
        Some(path) => Ok(path.clone()),
        None => Ok(default_state_path()?),
    }
}

/// Node store from the flag or environment, else the default.
pub fn node_store(args: &StoreArgs) -> Result<NodeStore> {
    let root = match &args.storage {
        Some(path) => path.clone(),
        None => default_storage_root()?,
    };
    debug!("node store: {}", root.display());
    Ok(NodeStore::new(root))
}

/// Load the machine state, pointing at `qcal state init` when there is none.
pub async fn load_machine(args: &StoreArgs) -> Result<(Machine, PathBuf)> {
    let path = state_path(args)?;
    debug!("machine state: {}", path.display());
    match Machine::load(&path).await {
        Ok(machine) => Ok((machine, path)),
        Err(StateError::StateNotFound(_)) => anyhow::bail!(
            "No machine state at {}. Create one with `qcal state init`.",
            path.display()
        ),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to load machine state: {}", path.display()))
        }
    }
}

/// Progress bar over all averaging iterations of a job.
pub fn progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} averages ({eta})")?
            .progress_chars("=>-"),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(bar)
}

/// Move `bar` to the reported progress.
pub fn update_progress(bar: &ProgressBar, progress: &JobProgress) {
    bar.set_length(progress.shots * progress.blocks);
    bar.set_position(progress.blocks_done * progress.shots + progress.n.min(progress.shots));
}

/// Green check line.
pub fn print_done(message: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), message);
}
