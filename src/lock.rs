// src/lock.rs

//! Exclusive lock on a working directory
//!
//! Two runs sharing a working directory would fight over the checkpoint and
//! the scratch area, so every run that writes there holds
//! `<work_dir>/norma.lock` (`flock(LOCK_EX)`) until it ends. The holder's PID
//! is written into the lock file to help whoever finds it busy.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the lock inside the working directory
pub const LOCK_FILE: &str = "norma.lock";

/// Held lock; released on drop
#[derive(Debug)]
pub struct WorkDirLock {
    /// Kept open to keep the lock
    file: File,
    path: PathBuf,
}

impl WorkDirLock {
    /// Take the lock without waiting
    ///
    /// Fails with a configuration error naming the holder when another
    /// process already runs in this working directory.
    pub fn acquire(work_dir: &Path) -> Result<Self> {
        fs::create_dir_all(work_dir)?;
        let path = work_dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                let holder = Self::holder_pid(work_dir)
                    .map(|pid| format!(" (pid {})", pid))
                    .unwrap_or_default();
                return Err(Error::Config(format!(
                    "{} is in use by another run{}",
                    work_dir.display(),
                    holder
                )));
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to lock {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        info!("Acquired lock {}", path.display());
        Ok(Self { file, path })
    }

    /// PID recorded by the current or last holder
    pub fn holder_pid(work_dir: &Path) -> Option<u32> {
        fs::read_to_string(work_dir.join(LOCK_FILE))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDirLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        debug!("Released lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");

        let lock = WorkDirLock::acquire(&work).unwrap();
        assert!(lock.path().exists());
        assert_eq!(WorkDirLock::holder_pid(&work), Some(std::process::id()));
        drop(lock);

        assert!(WorkDirLock::holder_pid(&work).is_none());
        let again = WorkDirLock::acquire(&work);
        assert!(again.is_ok());
    }

    #[test]
    fn test_second_run_is_refused() {
        let temp = TempDir::new().unwrap();
        let _held = WorkDirLock::acquire(temp.path()).unwrap();
        let err = WorkDirLock::acquire(temp.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("in use"));
    }
}
