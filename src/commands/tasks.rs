// src/commands/tasks.rs

//! Legacy cleanup task files

use super::resolve_root;
use anyhow::{Context, Result};
use norma::relocate::{apply_tasks, load_tasks, save_tasks, tasks_from_records};
use norma::{Checkpoint, Settings};
use std::path::{Path, PathBuf};

/// Apply a task file
pub fn cmd_tasks_apply(file: &Path) -> Result<()> {
    let tasks = load_tasks(file).with_context(|| format!("Cannot load {}", file.display()))?;
    let applied = apply_tasks(&tasks)?;
    println!("Applied {} tasks from {}", applied, file.display());
    Ok(())
}

/// Write the relocations a checkpoint is waiting for as a task file
pub fn cmd_tasks_export(
    root: &Path,
    output: &Path,
    workdir: Option<PathBuf>,
    settings: &Settings,
) -> Result<()> {
    let root = resolve_root(root)?;
    let work_dir = workdir.unwrap_or_else(|| settings.work_dir_for(&root));
    let checkpoint = Checkpoint::load(&work_dir)
        .with_context(|| format!("Cannot read the checkpoint in {}", work_dir.display()))?;

    let tasks = tasks_from_records(&checkpoint.into_records());
    save_tasks(output, &tasks)?;
    println!("Wrote {} tasks to {}", tasks.len(), output.display());
    Ok(())
}
