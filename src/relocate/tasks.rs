// src/relocate/tasks.rs

//! Legacy cleanup task files
//!
//! Older tooling hands relocation to a separate step through a JSON array
//! of single-key objects:
//!
//! ```json
//! [
//!   {"mv": ["/work/scratch/clip_abc123/clip.mp4", "/data/videos/clip.mp4"]},
//!   {"rm": ["/data/videos/clip.avi", "/work/scratch/clip_abc123"]}
//! ]
//! ```
//!
//! `mv` moves a file, `rm` deletes a file and then a whole directory; an
//! empty path skips that half of an `rm`. Tasks run strictly in array order
//! and the first failure stops the list.

use super::{move_file, target_path};
use crate::error::{Error, Result};
use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One legacy task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupOp {
    /// Move `source` to `destination`
    Mv(PathBuf, PathBuf),
    /// Delete `file`, then remove `dir` recursively
    Rm(PathBuf, PathBuf),
}

/// Read a task file
pub fn load_tasks(path: &Path) -> Result<Vec<CleanupOp>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a task file
pub fn save_tasks(path: &Path, tasks: &[CleanupOp]) -> Result<()> {
    let json = serde_json::to_string_pretty(tasks)?;
    fs::write(path, json)?;
    Ok(())
}

/// Run tasks in order; returns how many were applied
pub fn apply_tasks(tasks: &[CleanupOp]) -> Result<usize> {
    for (index, task) in tasks.iter().enumerate() {
        debug!("Task {}: {:?}", index, task);
        match task {
            CleanupOp::Mv(source, destination) => {
                move_file(source, destination).map_err(|e| {
                    Error::IoError(format!(
                        "task {}: cannot move {} to {}: {}",
                        index,
                        source.display(),
                        destination.display(),
                        e
                    ))
                })?;
            }
            CleanupOp::Rm(file, dir) => {
                if !file.as_os_str().is_empty() {
                    fs::remove_file(file).map_err(|e| {
                        Error::IoError(format!(
                            "task {}: cannot delete {}: {}",
                            index,
                            file.display(),
                            e
                        ))
                    })?;
                }
                if dir.as_os_str().is_empty() {
                    continue;
                }
                match fs::remove_dir_all(dir) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => {
                        return Err(Error::IoError(format!(
                            "task {}: cannot remove {}: {}",
                            index,
                            dir.display(),
                            e
                        )));
                    }
                    _ => {}
                }
            }
        }
    }
    info!("Applied {} cleanup tasks", tasks.len());
    Ok(tasks.len())
}

/// Express the pending relocations of a record set as legacy tasks
///
/// Each record with a cleanup task yields an `mv`, followed by an `rm` of
/// its scratch directory and, when the original goes away, the original.
pub fn tasks_from_records(records: &[FileRecord]) -> Vec<CleanupOp> {
    let mut tasks = Vec::new();
    for task in records.iter().filter_map(|r| r.cleanup.as_ref()) {
        let Some(file_name) = task.source.file_name() else {
            continue;
        };
        let replaces = task.delete_original.then_some(task.original.as_path());
        let target = target_path(&task.destination, Path::new(file_name), &task.hash, replaces);

        if task.delete_original && target == task.original {
            // Delete first, the converted file takes the original's place
            tasks.push(CleanupOp::Rm(task.original.clone(), PathBuf::new()));
            tasks.push(CleanupOp::Mv(task.source.clone(), target));
            tasks.push(CleanupOp::Rm(PathBuf::new(), task.scratch_dir.clone()));
            continue;
        }

        tasks.push(CleanupOp::Mv(task.source.clone(), target));
        let original = if task.delete_original {
            task.original.clone()
        } else {
            PathBuf::new()
        };
        tasks.push(CleanupOp::Rm(original, task.scratch_dir.clone()));
    }
    tasks
}
