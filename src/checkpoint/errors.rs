// src/checkpoint/errors.rs

//! Run-wide table of per-file failures

use super::path_key;
use crate::record::{ErrorKind, FileRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the error table inside the working directory
pub const FAILED_FILE: &str = "failed.json";

/// One failure, pointing at the file it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    /// Relative path of the file
    pub path: String,
    pub source: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Every failure of a run, in the order it happened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorTable {
    entries: Vec<ErrorEntry>,
}

impl ErrorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the tagged log entries of each record into the table
    pub fn collect<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        for record in records {
            let path = path_key(&record.relative_path);
            for entry in &record.processing_log {
                if let Some(kind) = entry.kind {
                    self.entries.push(ErrorEntry {
                        kind,
                        path: path.clone(),
                        source: entry.source.clone(),
                        message: entry.message.clone(),
                        timestamp: entry.timestamp,
                    });
                }
            }
        }
        self.entries.sort_by_key(|e| e.timestamp);
    }

    /// Take over every entry of another table, keeping time order
    pub fn append(&mut self, other: ErrorTable) {
        self.entries.extend(other.entries);
        self.entries.sort_by_key(|e| e.timestamp);
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries of one kind
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Write the table to `<work_dir>/failed.json`
    pub fn flush(&self, work_dir: &Path) -> crate::Result<PathBuf> {
        let path = work_dir.join(FAILED_FILE);
        fs::create_dir_all(work_dir)?;
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        if !self.is_empty() {
            info!("{} failures written to {}", self.len(), path.display());
        }
        Ok(path)
    }
}
