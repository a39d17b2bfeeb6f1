// src/checkpoint/mod.rs

//! Hash-verified JSON persistence
//!
//! Every durable file is written next to a companion `<file>.sha256` holding
//! the SHA-256 of its bytes. Loading recomputes the digest and refuses a
//! file that was changed behind our back, so relocation never acts on an
//! unverifiable record set.
//!
//! Three files live in the working directory:
//!
//! - `checkpoint.json`: records between processing and relocation
//! - `protocol.json`: every finalized record, merged across runs
//! - `failed.json`: the run's error table (plain JSON, for humans)

mod errors;
mod protocol;

pub use errors::{ErrorEntry, ErrorTable, FAILED_FILE};
pub use protocol::{PROTOCOL_FILE, Protocol, protocol_key};

use crate::hash;
use crate::record::FileRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// File name of the checkpoint inside the working directory
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Key prefix of removed files
pub const REMOVED_AREA: &str = "_REMOVED";

/// Key prefix of conversions waiting in scratch
pub const SCRATCH_AREA: &str = "_SCRATCH";

/// Loading or storing a hash-verified file failed
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("{} does not exist", .0.display())]
    NoFile(PathBuf),

    #[error("hash file for {} is missing", .0.display())]
    NoHash(PathBuf),

    #[error("{} was modified: expected sha256 {expected}, found {actual}", .path.display())]
    Modified {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Two records share the checkpoint key {0}")]
    DuplicateKey(String),
}

impl CheckpointError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the file simply does not exist yet
    pub fn is_no_file(&self) -> bool {
        matches!(self, Self::NoFile(_))
    }
}

/// Key for a path: forward slashes regardless of platform
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// A JSON file guarded by a `<file>.sha256` companion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedJson {
    path: PathBuf,
}

impl HashedJson {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the companion digest file
    pub fn hash_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Serialize `value` and replace the file and its digest
    ///
    /// Both files are written to a temporary name, synced, and renamed into
    /// place.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| CheckpointError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
        }

        let digest = hash::sha256_bytes(&json);
        write_atomic(&self.path, &json)?;
        write_atomic(&self.hash_path(), digest.as_bytes())?;
        debug!("Wrote {} ({} bytes)", self.path.display(), json.len());
        Ok(())
    }

    /// Read the raw bytes after checking them against the digest
    pub fn read_verified(&self) -> Result<Vec<u8>, CheckpointError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckpointError::NoFile(self.path.clone()));
            }
            Err(e) => return Err(CheckpointError::io(&self.path, e)),
        };

        let hash_path = self.hash_path();
        let expected = match fs::read_to_string(&hash_path) {
            Ok(s) => s.trim().to_lowercase(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckpointError::NoHash(self.path.clone()));
            }
            Err(e) => return Err(CheckpointError::io(&hash_path, e)),
        };

        hash::verify_sha256(&data, &expected).map_err(|e| CheckpointError::Modified {
            path: self.path.clone(),
            expected: e.expected,
            actual: e.actual,
        })?;
        Ok(data)
    }

    /// Read, verify and deserialize
    pub fn load<T: DeserializeOwned>(&self) -> Result<T, CheckpointError> {
        let data = self.read_verified()?;
        serde_json::from_slice(&data).map_err(|e| CheckpointError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Delete the file and its digest; missing files are fine
    pub fn remove(&self) -> Result<(), CheckpointError> {
        for path in [self.path.clone(), self.hash_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CheckpointError::io(&path, e)),
            }
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(CheckpointError::io(path, e));
    }
    Ok(())
}

/// Records waiting for relocation, keyed by their current location
#[derive(Debug, Clone)]
pub struct Checkpoint {
    store: HashedJson,
    records: BTreeMap<String, FileRecord>,
}

impl Checkpoint {
    /// Path of the checkpoint inside a working directory
    pub fn path(work_dir: &Path) -> PathBuf {
        work_dir.join(CHECKPOINT_FILE)
    }

    /// Empty checkpoint bound to a working directory
    pub fn new(work_dir: &Path) -> Self {
        Self {
            store: HashedJson::new(Self::path(work_dir)),
            records: BTreeMap::new(),
        }
    }

    pub fn exists(work_dir: &Path) -> bool {
        Self::path(work_dir).exists()
    }

    /// Load and verify; every failure is reported, including `NoFile`
    pub fn load(work_dir: &Path) -> Result<Self, CheckpointError> {
        let store = HashedJson::new(Self::path(work_dir));
        let records = store.load()?;
        Ok(Self { store, records })
    }

    /// Load and verify; a missing checkpoint means nothing is in flight
    pub fn load_or_empty(work_dir: &Path) -> Result<Self, CheckpointError> {
        match Self::load(work_dir) {
            Err(e) if e.is_no_file() => Ok(Self::new(work_dir)),
            other => other,
        }
    }

    /// Add a record; a key that is already taken is refused
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        record: FileRecord,
    ) -> Result<(), CheckpointError> {
        match self.records.entry(key.into()) {
            Entry::Occupied(taken) => Err(CheckpointError::DuplicateKey(taken.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FileRecord> {
        self.records.get(key)
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

    pub fn into_records(self) -> Vec<FileRecord> {
        self.records.into_values().collect()
    }

    pub fn save(&self) -> Result<(), CheckpointError> {
        self.store.write(&self.records)?;
        info!(
            "Checkpoint with {} records written to {}",
            self.records.len(),
            self.store.path().display()
        );
        Ok(())
    }

    /// Delete the checkpoint once its records are finalized
    pub fn discard(&self) -> Result<(), CheckpointError> {
        self.store.remove()
    }
}

/// Checkpoint key for a record
///
/// Records still below the root are keyed by their relative path. Removed
/// files and conversions waiting in scratch carry an area prefix, and a
/// conversion is keyed by the file it came from, so two derivatives bound
/// for the same name stay apart.
pub fn checkpoint_key(record: &FileRecord) -> String {
    if record.removed {
        return format!("{}/{}", REMOVED_AREA, path_key(&record.relative_path));
    }
    if record.cleanup.is_some() {
        let source = record
            .derived_from
            .as_deref()
            .map_or(&record.relative_path, |s| &s.relative_path);
        return format!("{}/{}", SCRATCH_AREA, path_key(source));
    }
    path_key(&record.relative_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CleanupTask, ErrorKind, FormatMatch, RecordStatus};
    use tempfile::TempDir;

    fn converted_chain(depth: usize) -> FileRecord {
        let mut rec = FileRecord::new(
            PathBuf::from("in/clip.avi"),
            PathBuf::from("in/clip.avi"),
            100,
            hash::sha256_bytes(b"0"),
        );
        rec.format_id = Some("fmt/5".to_string());
        rec.matches.push(FormatMatch {
            ns: "pronom".to_string(),
            id: "fmt/5".to_string(),
            ..Default::default()
        });
        rec.log("ffmpeg", "non monotonically increasing dts");

        for level in 1..=depth {
            let hash = hash::sha256_bytes(level.to_string().as_bytes());
            let mut next = FileRecord::new(
                PathBuf::from(format!("/work/scratch/clip_{}/clip.mp4", &hash[..6])),
                PathBuf::from("in/clip.mp4"),
                50,
                hash.clone(),
            );
            next.format_id = Some("fmt/199".to_string());
            next.added = true;
            next.log_error(ErrorKind::ConvFailed, "ffmpeg", "first attempt failed");
            next.cleanup = Some(CleanupTask {
                source: next.path.clone(),
                destination: PathBuf::from("/data/in"),
                scratch_dir: PathBuf::from(format!("/work/scratch/clip_{}", &hash[..6])),
                relative_path: PathBuf::from("in/clip.mp4"),
                hash,
                delete_original: level % 2 == 0,
                original: PathBuf::from("/data/in/clip.avi"),
            });
            next.derived_from = Some(Box::new(rec));
            rec = next;
        }
        rec
    }

    #[test]
    fn test_round_trip_with_deep_lineage() {
        let temp = TempDir::new().unwrap();
        let mut checkpoint = Checkpoint::new(temp.path());
        let deep = converted_chain(5);
        checkpoint.insert("scratch/clip.mp4", deep.clone()).unwrap();
        checkpoint.insert("in/a.pdf", converted_chain(0)).unwrap();
        checkpoint.save().unwrap();

        let loaded = Checkpoint::load(temp.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        let back = loaded.get("scratch/clip.mp4").unwrap();
        assert_eq!(back, &deep);
        assert_eq!(back.lineage().count(), 5);
        assert_eq!(back.root_source().format_id.as_deref(), Some("fmt/5"));
    }

    #[test]
    fn test_flipped_byte_is_modified() {
        let temp = TempDir::new().unwrap();
        let mut checkpoint = Checkpoint::new(temp.path());
        checkpoint.insert("a", converted_chain(1)).unwrap();
        checkpoint.save().unwrap();

        let path = Checkpoint::path(temp.path());
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            Checkpoint::load(temp.path()),
            Err(CheckpointError::Modified { .. })
        ));
        assert!(matches!(
            Checkpoint::load_or_empty(temp.path()),
            Err(CheckpointError::Modified { .. })
        ));
    }

    #[test]
    fn test_missing_hash_and_missing_file() {
        let temp = TempDir::new().unwrap();
        let mut checkpoint = Checkpoint::new(temp.path());
        checkpoint.insert("a", converted_chain(0)).unwrap();
        checkpoint.save().unwrap();

        let store = HashedJson::new(Checkpoint::path(temp.path()));
        fs::remove_file(store.hash_path()).unwrap();
        assert!(matches!(
            Checkpoint::load(temp.path()),
            Err(CheckpointError::NoHash(_))
        ));

        fs::remove_file(store.path()).unwrap();
        assert!(matches!(
            Checkpoint::load(temp.path()),
            Err(CheckpointError::NoFile(_))
        ));
        assert!(Checkpoint::load_or_empty(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_companion_digest_content() {
        let temp = TempDir::new().unwrap();
        let store = HashedJson::new(temp.path().join("x.json"));
        store.write(&vec![1, 2, 3]).unwrap();

        assert_eq!(store.hash_path(), temp.path().join("x.json.sha256"));
        let digest = fs::read_to_string(store.hash_path()).unwrap();
        assert_eq!(digest, hash::sha256_bytes(&fs::read(store.path()).unwrap()));

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        store.remove().unwrap();
        assert!(!store.exists());
        store.remove().unwrap();
    }

    #[test]
    fn test_keys_by_area() {
        let mut accepted = FileRecord::new(
            PathBuf::from("/data/removed/x.bin"),
            PathBuf::from("removed/x.bin"),
            1,
            "00".to_string(),
        );
        accepted.status = RecordStatus::AcceptedAsIs;
        assert_eq!(checkpoint_key(&accepted), "removed/x.bin");

        let mut removed = FileRecord::new(
            PathBuf::from("/data.norma/removed/x.bin"),
            PathBuf::from("x.bin"),
            1,
            "11".to_string(),
        );
        removed.mark_removed();
        assert_eq!(checkpoint_key(&removed), "_REMOVED/x.bin");

        let converted = converted_chain(1);
        assert_eq!(checkpoint_key(&converted), "_SCRATCH/in/clip.avi");
    }

    #[test]
    fn test_duplicate_key_is_refused() {
        let temp = TempDir::new().unwrap();
        let mut checkpoint = Checkpoint::new(temp.path());
        checkpoint.insert("in/a.pdf", converted_chain(0)).unwrap();

        let err = checkpoint.insert("in/a.pdf", converted_chain(1)).unwrap_err();
        assert!(matches!(err, CheckpointError::DuplicateKey(ref k) if k == "in/a.pdf"));
        assert_eq!(checkpoint.len(), 1);
        assert!(checkpoint.get("in/a.pdf").unwrap().derived_from.is_none());
    }
}
