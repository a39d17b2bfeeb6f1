// src/commands/relocate.rs

//! The `relocate` command: finish a run from its checkpoint

use super::resolve_root;
use anyhow::{Context, Result};
use norma::lock::WorkDirLock;
use norma::{Checkpoint, Settings};
use std::path::PathBuf;

pub fn cmd_relocate(root: PathBuf, workdir: Option<PathBuf>, settings: Settings) -> Result<()> {
    let root = resolve_root(&root)?;
    let work_dir = workdir.unwrap_or_else(|| settings.work_dir_for(&root));

    let _lock = WorkDirLock::acquire(&work_dir)?;
    if !Checkpoint::exists(&work_dir) {
        println!("No checkpoint in {}, nothing to relocate.", work_dir.display());
        return Ok(());
    }

    let relocation = norma::relocate_checkpoint(&root, &work_dir)
        .with_context(|| format!("Cannot relocate from {}", work_dir.display()))?;
    let failed_file = relocation.errors.flush(&work_dir)?;

    println!(
        "Relocated {} records ({} failed)",
        relocation.relocated, relocation.failed
    );
    if !relocation.errors.is_empty() {
        println!(
            "{} errors recorded in {}",
            relocation.errors.len(),
            failed_file.display()
        );
    }
    Ok(())
}
