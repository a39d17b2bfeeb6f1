// src/relocate/mod.rs

//! Relocation and cleanup
//!
//! Converted files wait in their scratch directory until [`finalize`] moves
//! them next to their originals. The collision rule from [`crate::hash`]
//! decides the final name, so two runs over the same input always produce
//! the same file names.
//!
//! A move that fails leaves its scratch directory untouched; the record goes
//! to the failed list for manual recovery.

mod tasks;

pub use tasks::{CleanupOp, apply_tasks, load_tasks, save_tasks, tasks_from_records};

use crate::checkpoint::{Protocol, path_key};
use crate::hash;
use crate::record::{ErrorKind, FileRecord, RecordStatus};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SOURCE: &str = "filehandler";

/// Records after relocation
#[derive(Debug, Default)]
pub struct Finalized {
    /// Every record that reached its final state, moved or not
    pub relocated: Vec<FileRecord>,
    /// Records whose move failed; their scratch state is intact
    pub failed: Vec<FileRecord>,
}

/// Move a file, falling back to copy and remove across filesystems
pub fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !source.is_file() {
                return Err(rename_err);
            }
            debug!(
                "rename {} failed ({}), copying instead",
                source.display(),
                rename_err
            );
            fs::copy(source, target)?;
            fs::remove_file(source)
        }
    }
}

/// Remove every empty directory below and including `dir`, deepest first
///
/// Returns how many directories were removed.
pub fn prune_empty_dirs(dir: &Path) -> usize {
    prune_empty_dirs_keeping(dir, &[])
}

/// Like [`prune_empty_dirs`], but `keep` and its ancestors stay in place
pub fn prune_empty_dirs_keeping(dir: &Path, keep: &[PathBuf]) -> usize {
    if !dir.is_dir() {
        return 0;
    }
    let mut removed = 0;
    for entry in WalkDir::new(dir)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| !keep.iter().any(|k| k.starts_with(e.path())))
    {
        // remove_dir refuses non-empty directories
        if fs::remove_dir(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

/// Final path for a relocated file, with the collision rule applied
///
/// The original itself does not count as a collision when it is about to
/// be deleted.
pub fn target_path(
    destination: &Path,
    file_name: &Path,
    hash: &str,
    replaces: Option<&Path>,
) -> PathBuf {
    let target = destination.join(file_name);
    if replaces.is_some_and(|original| original == target) {
        return target;
    }
    hash::resolve_collision(&target, hash)
}

/// Move every record carrying a cleanup task into place
///
/// Records without a task pass through unchanged. When an original is
/// deleted, its entry in `already_processed` is dropped as well.
pub fn finalize(
    records: Vec<FileRecord>,
    already_processed: &mut Protocol,
    root: &Path,
    work_dir: &Path,
) -> Finalized {
    let mut out = Finalized::default();

    for mut record in records {
        let Some(task) = record.cleanup.clone() else {
            out.relocated.push(record);
            continue;
        };

        let Some(file_name) = task.source.file_name().map(PathBuf::from) else {
            record.log_error(ErrorKind::MoveFailed, SOURCE, "cleanup source has no file name");
            record.status = RecordStatus::RelocationFailed;
            out.failed.push(record);
            continue;
        };

        let replaces = task.delete_original.then_some(task.original.as_path());
        let target = target_path(&task.destination, &file_name, &task.hash, replaces);
        let takes_original_name = task.delete_original && target == task.original;

        if takes_original_name {
            if let Err(e) = remove_original(&task.original) {
                warn!("Cannot delete {}: {}", task.original.display(), e);
                record.log_error(
                    ErrorKind::MoveFailed,
                    SOURCE,
                    format!("original could not be deleted: {}", e),
                );
                record.status = RecordStatus::RelocationFailed;
                out.failed.push(record);
                continue;
            }
        }

        if let Err(e) = move_file(&task.source, &target) {
            warn!("Cannot move {}: {}", task.source.display(), e);
            record.log_error(
                ErrorKind::MoveFailed,
                SOURCE,
                format!("move to {} failed: {}", display_relative(&target, root), e),
            );
            record.status = RecordStatus::RelocationFailed;
            out.failed.push(record);
            continue;
        }

        if task.delete_original {
            if takes_original_name {
                record.log(
                    SOURCE,
                    format!("replaced original {}", display_relative(&task.original, root)),
                );
            } else if let Err(e) = remove_original(&task.original) {
                warn!("Cannot delete {}: {}", task.original.display(), e);
                record.log(SOURCE, format!("original could not be deleted: {}", e));
            } else {
                record.log(
                    SOURCE,
                    format!("deleted original {}", display_relative(&task.original, root)),
                );
            }
            if let Ok(rel) = task.original.strip_prefix(root) {
                already_processed.remove(&path_key(rel));
            }
        }

        if let Err(e) = fs::remove_dir_all(&task.scratch_dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Cannot remove {}: {}", task.scratch_dir.display(), e);
            }
        }

        debug!("Relocated {} -> {}", task.source.display(), target.display());
        record.relative_path = target
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file_name.clone());
        record.path = target;
        record.destination = None;
        record.cleanup = None;
        record.added = true;
        record.status = RecordStatus::Relocated;
        out.relocated.push(record);
    }

    let kept: Vec<PathBuf> = out
        .failed
        .iter()
        .filter_map(|r| r.cleanup.as_ref().map(|t| t.scratch_dir.clone()))
        .collect();
    let pruned = prune_empty_dirs_keeping(&work_dir.join("scratch"), &kept);
    if pruned > 0 {
        debug!("Pruned {} empty scratch directories", pruned);
    }
    info!(
        "Relocation finished: {} final, {} failed",
        out.relocated.len(),
        out.failed.len()
    );
    out
}

fn remove_original(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
