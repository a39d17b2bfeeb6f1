// src/checkpoint/protocol.rs

//! The durable protocol of finalized records
//!
//! Keyed by final position below the scan root. Removed files and failed
//! relocations live under `_REMOVED/` and `_FAILED/` prefixes so they never
//! shadow a file that really sits at that path. Paths are stored relative
//! to the root, lineage included.

use super::{CheckpointError, HashedJson, path_key};
use crate::record::{FileRecord, RecordStatus};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the protocol inside the working directory
pub const PROTOCOL_FILE: &str = "protocol.json";

/// Protocol key for a record
///
/// A failed relocation never reached its name, so it is keyed by the file
/// it was converted from.
pub fn protocol_key(record: &FileRecord) -> String {
    match record.status {
        RecordStatus::Removed => format!("_REMOVED/{}", path_key(&record.relative_path)),
        RecordStatus::RelocationFailed => {
            let source = record
                .derived_from
                .as_deref()
                .map_or(&record.relative_path, |s| &s.relative_path);
            format!("_FAILED/{}", path_key(source))
        }
        _ => path_key(&record.relative_path),
    }
}

/// Finalized records across all runs
#[derive(Debug, Clone, Default)]
pub struct Protocol {
    store: Option<HashedJson>,
    records: BTreeMap<String, FileRecord>,
    /// (relative path, hash) of every record and ancestor
    seen: HashSet<(String, String)>,
}

impl Protocol {
    pub fn path(work_dir: &Path) -> PathBuf {
        work_dir.join(PROTOCOL_FILE)
    }

    /// Load and verify; a missing protocol is an empty one
    pub fn load_or_empty(work_dir: &Path) -> Result<Self, CheckpointError> {
        let store = HashedJson::new(Self::path(work_dir));
        let records: BTreeMap<String, FileRecord> = match store.load() {
            Ok(records) => records,
            Err(e) if e.is_no_file() => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        let mut protocol = Self {
            store: Some(store),
            records,
            seen: HashSet::new(),
        };
        protocol.reindex();
        Ok(protocol)
    }

    fn reindex(&mut self) {
        self.seen = self
            .records
            .values()
            .flat_map(|r| std::iter::once(r).chain(r.lineage()))
            .map(|r| (path_key(&r.relative_path), r.hash.clone()))
            .collect();
    }

    /// Whether a file with this relative path and content was recorded,
    /// either as a final record or as the source of one
    pub fn contains(&self, relative_path: &str, hash: &str) -> bool {
        self.seen
            .contains(&(relative_path.to_string(), hash.to_string()))
    }

    /// Whether a file needs no further processing
    ///
    /// Skipped and failed records are retried, so a changed policy or a
    /// fixed tool can pick them up on the next run.
    pub fn is_settled(&self, relative_path: &str, hash: &str) -> bool {
        if !self.contains(relative_path, hash) {
            return false;
        }
        match self.records.get(relative_path) {
            Some(r) if r.hash == hash => !matches!(
                r.status,
                RecordStatus::Skipped
                    | RecordStatus::ConversionFailed
                    | RecordStatus::PendingConversion
            ),
            // Recorded as an ancestor of a derivative
            _ => true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FileRecord> {
        self.records.get(key)
    }

    /// Drop an entry, returning it
    pub fn remove(&mut self, key: &str) -> Option<FileRecord> {
        let removed = self.records.remove(key);
        if removed.is_some() {
            self.reindex();
        }
        removed
    }

    /// Add finalized records, replacing entries with the same key
    ///
    /// Records are stored with paths relative to `root`.
    pub fn merge<I>(&mut self, records: I, root: &Path)
    where
        I: IntoIterator<Item = FileRecord>,
    {
        for record in records {
            let record = record.relativized(root);
            for r in std::iter::once(&record).chain(record.lineage()) {
                self.seen.insert((path_key(&r.relative_path), r.hash.clone()));
            }
            self.records.insert(protocol_key(&record), record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.records.iter()
    }

    /// Write the protocol back to the working directory it came from
    pub fn save(&self) -> Result<(), CheckpointError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.write(&self.records)?;
        info!(
            "Protocol with {} records written to {}",
            self.records.len(),
            store.path().display()
        );
        Ok(())
    }
}
