// src/commands/mod.rs
//! Command handlers for the norma CLI

mod check;
mod policy;
mod process;
pub mod progress;
mod relocate;
mod tasks;

pub use check::cmd_check;
pub use policy::{cmd_policy_extend, cmd_policy_generate, cmd_policy_test, cmd_policy_validate};
pub use process::cmd_process;
pub use relocate::cmd_relocate;
pub use tasks::{cmd_tasks_apply, cmd_tasks_export};

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

/// Canonical scan root, refusing anything that is not a directory
pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        bail!("Root folder {} does not exist", root.display());
    }
    Ok(root.canonicalize()?)
}
