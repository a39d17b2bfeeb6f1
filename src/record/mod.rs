// src/record/mod.rs

//! File records: identity, identification, history and lineage of one file
//!
//! A [`FileRecord`] describes one physical file at one point in time. It is
//! created at discovery, annotated by the inspector and decision engine, and
//! handed by value from stage to stage. A conversion produces a *new* record
//! for the derivative that owns the original through `derived_from`, so the
//! full provenance of any file in the protocol is a walk down that chain.

use crate::hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One candidate format reported by the identification engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatMatch {
    /// Registry namespace (e.g. "pronom")
    #[serde(default)]
    pub ns: String,
    /// Format identifier, or "UNKNOWN" when nothing matched
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub basis: String,
    #[serde(default)]
    pub warning: String,
}

impl FormatMatch {
    /// Whether the engine settled on a concrete format
    pub fn is_resolved(&self) -> bool {
        !self.id.is_empty() && !self.id.eq_ignore_ascii_case("unknown")
    }
}

/// Per-file failure categories
///
/// These never abort a run. They are appended to the record's own log and
/// to the run-wide error table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ErrorKind {
    /// No usable format id could be recovered
    PuidFail,
    /// A prober reported unrecoverable corruption
    Integrity,
    /// Format has no policy rule
    NotInPolicies,
    /// Converter produced no output
    ConvFailed,
    /// Converter output is not one of the expected formats
    NotExpectedFmt,
    /// A move to the removed area or final destination failed
    MoveFailed,
    /// An in-place rename failed
    RenameFailed,
}

/// Where a record stands in the processing state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Discovered,
    Identified,
    /// Operating-system artifact, silently dropped
    Ignored,
    Removed,
    Skipped,
    #[serde(rename = "accepted")]
    AcceptedAsIs,
    PendingConversion,
    Converted,
    ConversionFailed,
    Relocated,
    RelocationFailed,
}

impl RecordStatus {
    /// Whether the record has left the pipeline for good
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Ignored
                | Self::Removed
                | Self::Skipped
                | Self::AcceptedAsIs
                | Self::ConversionFailed
                | Self::Relocated
                | Self::RelocationFailed
        )
    }
}

/// A single processing log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Component or tool that wrote the entry
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
}

/// Technical metadata captured by one probing tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub tool: String,
    pub data: serde_json::Value,
}

impl MediaInfo {
    /// Video and audio codec names from an ffprobe-style `streams` array
    pub fn codec_pair(&self) -> (Option<String>, Option<String>) {
        let streams = match self.data.get("streams").and_then(|s| s.as_array()) {
            Some(s) => s,
            None => return (None, None),
        };

        let codec_of = |kind: &str| {
            streams
                .iter()
                .find(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some(kind))
                .and_then(|s| s.get("codec_name"))
                .and_then(|c| c.as_str())
                .map(str::to_string)
        };

        (codec_of("video"), codec_of("audio"))
    }
}

/// Hand-off from conversion to relocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupTask {
    /// Converted file inside the scratch directory
    pub source: PathBuf,
    /// Directory the converted file must end up in
    pub destination: PathBuf,
    /// Scratch directory to remove once the move succeeded
    pub scratch_dir: PathBuf,
    /// Intended position under the scan root
    pub relative_path: PathBuf,
    /// Hash of the converted file
    pub hash: String,
    /// Delete the original after a successful move
    pub delete_original: bool,
    /// Absolute path of the original file
    pub original: PathBuf,
}

/// One file's identity, identification, history and lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// SHA-256 of the bytes, computed once at discovery
    pub hash: String,

    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub matches: Vec<FormatMatch>,
    #[serde(default)]
    pub identification_errors: String,

    #[serde(default)]
    pub pending_conversion: bool,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub added: bool,
    #[serde(default)]
    pub status: RecordStatus,

    #[serde(default)]
    pub processing_log: Vec<LogEntry>,
    #[serde(default)]
    pub media_info: Vec<MediaInfo>,

    #[serde(default)]
    pub derived_from: Option<Box<FileRecord>>,

    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub cleanup: Option<CleanupTask>,
}

impl FileRecord {
    /// Create an empty record for a path with a known hash
    pub fn new(path: PathBuf, relative_path: PathBuf, size: u64, hash: String) -> Self {
        Self {
            path,
            relative_path,
            size,
            modified: None,
            hash,
            format_id: None,
            matches: Vec::new(),
            identification_errors: String::new(),
            pending_conversion: false,
            removed: false,
            added: false,
            status: RecordStatus::Discovered,
            processing_log: Vec::new(),
            media_info: Vec::new(),
            derived_from: None,
            destination: None,
            cleanup: None,
        }
    }

    /// Stat and hash a file on disk
    ///
    /// `root` is the scan root; the relative path is taken against it. Files
    /// outside the root keep their file name as relative path.
    pub fn from_path(root: &Path, path: &Path) -> crate::Result<Self> {
        let metadata = fs::metadata(path)?;
        let hash = hash::sha256_file(path)?;
        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());

        let mut record = Self::new(path.to_path_buf(), relative_path, metadata.len(), hash);
        record.modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        Ok(record)
    }

    /// Append an informational log entry
    pub fn log(&mut self, source: &str, message: impl Into<String>) {
        self.processing_log.push(LogEntry {
            source: source.to_string(),
            message: message.into(),
            kind: None,
            timestamp: Utc::now(),
        });
    }

    /// Append a failure log entry tagged with its kind
    pub fn log_error(&mut self, kind: ErrorKind, source: &str, message: impl Into<String>) {
        self.processing_log.push(LogEntry {
            source: source.to_string(),
            message: message.into(),
            kind: Some(kind),
            timestamp: Utc::now(),
        });
    }

    /// Error kinds recorded so far, oldest first
    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.processing_log.iter().filter_map(|e| e.kind).collect()
    }

    /// Store a metadata snapshot; a tool that already reported is ignored
    ///
    /// Returns whether the snapshot was stored.
    pub fn add_media_info(&mut self, info: MediaInfo) -> bool {
        if self.media_info.iter().any(|m| m.tool == info.tool) {
            return false;
        }
        self.media_info.push(info);
        true
    }

    /// Snapshot written by a given tool
    pub fn media_info_for(&self, tool: &str) -> Option<&MediaInfo> {
        self.media_info.iter().find(|m| m.tool == tool)
    }

    /// Mark as removed; a removed record never carries relocation intent
    pub fn mark_removed(&mut self) {
        self.removed = true;
        self.pending_conversion = false;
        self.destination = None;
        self.cleanup = None;
        self.status = RecordStatus::Removed;
    }

    /// Top identification match, if any
    pub fn top_match(&self) -> Option<&FormatMatch> {
        self.matches.first()
    }

    /// Mime type of the top match
    pub fn mime(&self) -> &str {
        self.top_match().map(|m| m.mime.as_str()).unwrap_or("")
    }

    /// First six hex characters of the content hash
    pub fn hash_prefix(&self) -> &str {
        hash::hash_prefix(&self.hash)
    }

    /// Walk the `derived_from` chain, starting with the direct source
    pub fn lineage(&self) -> Lineage<'_> {
        Lineage {
            next: self.derived_from.as_deref(),
        }
    }

    /// Oldest ancestor, or the record itself when it has no source
    pub fn root_source(&self) -> &FileRecord {
        self.lineage().last().unwrap_or(self)
    }

    /// Copy with `path` rewritten relative to `root` for the protocol
    ///
    /// Applies to the whole lineage so no absolute scan path leaks into
    /// durable files.
    pub fn relativized(&self, root: &Path) -> FileRecord {
        let mut copy = self.clone();
        copy.path = match self.path.strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) if self.path.is_absolute() => self.relative_path.clone(),
            Err(_) => self.path.clone(),
        };
        copy.derived_from = self
            .derived_from
            .as_ref()
            .map(|source| Box::new(source.relativized(root)));
        copy
    }

    /// Key used in checkpoint and protocol files
    pub fn key(&self) -> String {
        self.relative_path.to_string_lossy().replace('\\', "/")
    }
}

/// Iterator over a record's ancestors
pub struct Lineage<'a> {
    next: Option<&'a FileRecord>,
}

impl<'a> Iterator for Lineage<'a> {
    type Item = &'a FileRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.derived_from.as_deref();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, hash: &str) -> FileRecord {
        FileRecord::new(
            PathBuf::from(format!("/root/{}", name)),
            PathBuf::from(name),
            10,
            hash.to_string(),
        )
    }

    #[test]
    fn test_from_path_hashes_and_relativizes() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("sub");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.txt");
        fs::write(&file, b"hello world").unwrap();

        let rec = FileRecord::from_path(temp.path(), &file).unwrap();
        assert_eq!(rec.relative_path, PathBuf::from("sub/a.txt"));
        assert_eq!(rec.size, 11);
        assert_eq!(rec.hash, hash::sha256_bytes(b"hello world"));
        assert!(rec.modified.is_some());
        assert_eq!(rec.status, RecordStatus::Discovered);
    }

    #[test]
    fn test_media_info_written_once_per_tool() {
        let mut rec = record("a.mp4", "abc");
        let first = MediaInfo {
            tool: "ffprobe".to_string(),
            data: serde_json::json!({"n": 1}),
        };
        let second = MediaInfo {
            tool: "ffprobe".to_string(),
            data: serde_json::json!({"n": 2}),
        };
        assert!(rec.add_media_info(first));
        assert!(!rec.add_media_info(second));
        assert_eq!(rec.media_info.len(), 1);
        assert_eq!(rec.media_info_for("ffprobe").unwrap().data["n"], 1);
    }

    #[test]
    fn test_mark_removed_clears_destination() {
        let mut rec = record("a.gif", "abc");
        rec.destination = Some(PathBuf::from("/root"));
        rec.pending_conversion = true;
        rec.mark_removed();
        assert!(rec.removed);
        assert!(rec.destination.is_none());
        assert!(!rec.pending_conversion);
        assert_eq!(rec.status, RecordStatus::Removed);
    }

    #[test]
    fn test_lineage_walk() {
        let grandparent = record("a.wmf", "111");
        let mut parent = record("a.gif", "222");
        parent.derived_from = Some(Box::new(grandparent));
        let mut child = record("a.tif", "333");
        child.derived_from = Some(Box::new(parent));

        let hashes: Vec<&str> = child.lineage().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, vec!["222", "111"]);
        assert_eq!(child.root_source().hash, "111");

        let lonely = record("b.txt", "444");
        assert_eq!(lonely.root_source().hash, "444");
    }

    #[test]
    fn test_relativized_covers_lineage() {
        let parent = record("dir/a.avi", "111");
        let mut child = record("dir/a.mp4", "222");
        child.derived_from = Some(Box::new(parent));

        let rel = child.relativized(Path::new("/root"));
        assert_eq!(rel.path, PathBuf::from("dir/a.mp4"));
        assert_eq!(
            rel.derived_from.as_ref().unwrap().path,
            PathBuf::from("dir/a.avi")
        );
    }

    #[test]
    fn test_codec_pair() {
        let info = MediaInfo {
            tool: "ffprobe".to_string(),
            data: serde_json::json!({
                "streams": [
                    {"codec_type": "audio", "codec_name": "aac"},
                    {"codec_type": "video", "codec_name": "h264"}
                ]
            }),
        };
        assert_eq!(
            info.codec_pair(),
            (Some("h264".to_string()), Some("aac".to_string()))
        );
    }

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(ErrorKind::PuidFail.to_string(), "PUIDFAIL");
        assert_eq!(ErrorKind::NotExpectedFmt.to_string(), "NOTEXPECTEDFMT");
        assert_eq!(
            serde_json::to_string(&ErrorKind::NotInPolicies).unwrap(),
            "\"NOTINPOLICIES\""
        );
        assert_eq!(
            "CONVFAILED".parse::<ErrorKind>().unwrap(),
            ErrorKind::ConvFailed
        );
    }

    #[test]
    fn test_status_serializes_accepted() {
        assert_eq!(
            serde_json::to_string(&RecordStatus::AcceptedAsIs).unwrap(),
            "\"accepted\""
        );
        assert!(RecordStatus::AcceptedAsIs.is_terminal());
        assert!(!RecordStatus::PendingConversion.is_terminal());
    }
}
