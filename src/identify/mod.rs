// src/identify/mod.rs

//! Format identification
//!
//! The identification engine is external. [`Siegfried`] drives the `sf`
//! binary and parses its JSON report; tests plug in their own
//! [`Identifier`]. Either way, files come back in the engine's enumeration
//! order, which is the order the pipeline processes them in.

use crate::error::{Error, Result};
use crate::record::{ErrorKind, FileRecord, FormatMatch, RecordStatus};
use crate::tools::runner;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const SOURCE: &str = "identification";

/// What the engine reported for one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identification {
    pub path: PathBuf,
    pub errors: String,
    pub matches: Vec<FormatMatch>,
}

/// An identification engine
pub trait Identifier {
    /// Identify a file, or every file below a directory
    fn identify(&self, path: &Path) -> Result<Vec<Identification>>;
}

/// How a format id was obtained from the matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The top match names a format
    Resolved(String),
    /// The top match was unresolved; the id was parsed from its warning
    Fallback(String),
    /// No id could be recovered
    Failed,
}

fn format_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(?:x-)?fmt/\d+\b").expect("valid format id regex"))
}

/// Decide the format id of a set of matches
pub fn resolve_format(matches: &[FormatMatch]) -> Resolution {
    let Some(top) = matches.first() else {
        return Resolution::Failed;
    };
    if top.is_resolved() {
        return Resolution::Resolved(top.id.clone());
    }
    match format_id_pattern().find(&top.warning) {
        Some(m) => Resolution::Fallback(m.as_str().to_string()),
        None => Resolution::Failed,
    }
}

/// Whether a match warns that the file extension disagrees with the content
pub fn is_extension_mismatch(m: &FormatMatch) -> bool {
    m.warning.to_lowercase().contains("extension mismatch")
}

/// Copy an identification onto a record and settle its format id
///
/// On failure the record keeps `format_id = None` and carries a `PUIDFAIL`
/// log entry; the decision engine removes such records.
pub fn apply_identification(record: &mut FileRecord, ident: Identification) {
    record.matches = ident.matches;
    record.identification_errors = ident.errors;
    record.status = RecordStatus::Identified;

    match resolve_format(&record.matches) {
        Resolution::Resolved(id) => record.format_id = Some(id),
        Resolution::Fallback(id) => {
            record.log(
                SOURCE,
                format!("FALLBACK: format id {} taken from identification warning", id),
            );
            record.format_id = Some(id);
        }
        Resolution::Failed => {
            let detail = record
                .top_match()
                .map(|m| m.warning.clone())
                .filter(|w| !w.is_empty())
                .unwrap_or_else(|| "no matches".to_string());
            record.log_error(
                ErrorKind::PuidFail,
                SOURCE,
                format!("no format id could be determined: {}", detail),
            );
            record.format_id = None;
        }
    }
}

/// Identify everything below `root` and build records in engine order
///
/// Files that vanish or cannot be read between identification and hashing
/// are reported and left out.
pub fn discover(identifier: &dyn Identifier, root: &Path) -> Result<Vec<FileRecord>> {
    let identifications = identifier.identify(root)?;
    info!("Identified {} files under {}", identifications.len(), root.display());

    let mut records = Vec::with_capacity(identifications.len());
    for ident in identifications {
        let path = if ident.path.is_absolute() {
            ident.path.clone()
        } else {
            root.join(&ident.path)
        };
        match FileRecord::from_path(root, &path) {
            Ok(mut record) => {
                apply_identification(&mut record, ident);
                records.push(record);
            }
            Err(e) => warn!("Cannot read {}: {}", path.display(), e),
        }
    }
    Ok(records)
}

/// Identify a single file (used to verify converter output)
pub fn identify_file(identifier: &dyn Identifier, root: &Path, path: &Path) -> Result<FileRecord> {
    let mut found = identifier.identify(path)?;
    let ident = match found.len() {
        0 => {
            return Err(Error::Identification(format!(
                "no result for {}",
                path.display()
            )));
        }
        _ => found.swap_remove(0),
    };
    let mut record = FileRecord::from_path(root, path)?;
    apply_identification(&mut record, ident);
    Ok(record)
}

/// The siegfried (`sf`) identification engine
#[derive(Debug, Clone)]
pub struct Siegfried {
    binary: String,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct SfReport {
    #[serde(default)]
    files: Vec<SfFile>,
}

#[derive(Debug, Deserialize)]
struct SfFile {
    filename: PathBuf,
    #[serde(default)]
    errors: String,
    #[serde(default)]
    matches: Vec<FormatMatch>,
}

impl Siegfried {
    pub fn new(binary: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Parse an `sf -json` report
    pub fn parse_report(json: &str) -> Result<Vec<Identification>> {
        let report: SfReport = serde_json::from_str(json)
            .map_err(|e| Error::Identification(format!("unreadable sf report: {}", e)))?;
        Ok(report
            .files
            .into_iter()
            .map(|f| Identification {
                path: f.filename,
                errors: f.errors,
                matches: f.matches,
            })
            .collect())
    }
}

impl Default for Siegfried {
    fn default() -> Self {
        Self::new("sf", None)
    }
}

impl Identifier for Siegfried {
    fn identify(&self, path: &Path) -> Result<Vec<Identification>> {
        let args = [
            std::ffi::OsStr::new("-json"),
            std::ffi::OsStr::new("-coe"),
            path.as_os_str(),
        ];
        let run = runner::run(&self.binary, &args, self.timeout)?;
        if !run.success && run.stdout.trim().is_empty() {
            return Err(Error::Identification(format!(
                "{} exited with {:?}: {}",
                self.binary,
                run.exit_code,
                run.stderr.trim()
            )));
        }
        debug!("sf reported {} bytes of JSON", run.stdout.len());
        Self::parse_report(&run.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn m(id: &str, warning: &str) -> FormatMatch {
        FormatMatch {
            ns: "pronom".to_string(),
            id: id.to_string(),
            warning: warning.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_format() {
        assert_eq!(
            resolve_format(&[m("fmt/18", "")]),
            Resolution::Resolved("fmt/18".to_string())
        );
        assert_eq!(
            resolve_format(&[m(
                "UNKNOWN",
                "no match; possibilities based on extension are x-fmt/111, fmt/1"
            )]),
            Resolution::Fallback("x-fmt/111".to_string())
        );
        assert_eq!(resolve_format(&[m("UNKNOWN", "no match")]), Resolution::Failed);
        assert_eq!(resolve_format(&[]), Resolution::Failed);
    }

    #[test]
    fn test_extension_mismatch() {
        assert!(is_extension_mismatch(&m("fmt/43", "extension mismatch")));
        assert!(!is_extension_mismatch(&m("fmt/43", "")));
    }

    #[test]
    fn test_parse_report() {
        let json = r#"{
            "siegfried": "1.11.0",
            "files": [
                {"filename": "/data/a.pdf", "filesize": 10, "errors": "",
                 "matches": [{"ns": "pronom", "id": "fmt/18", "format": "Acrobat PDF 1.4",
                              "version": "1.4", "mime": "application/pdf",
                              "basis": "extension match pdf", "warning": ""}]},
                {"filename": "/data/b.bin", "filesize": 3, "errors": "empty source",
                 "matches": [{"ns": "pronom", "id": "UNKNOWN", "warning": "no match"}]}
            ]
        }"#;
        let found = Siegfried::parse_report(json).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].path, PathBuf::from("/data/a.pdf"));
        assert_eq!(found[0].matches[0].mime, "application/pdf");
        assert_eq!(found[1].errors, "empty source");
        assert!(!found[1].matches[0].is_resolved());
    }

    #[test]
    fn test_parse_report_rejects_garbage() {
        assert!(matches!(
            Siegfried::parse_report("not json"),
            Err(Error::Identification(_))
        ));
    }

    #[test]
    fn test_apply_identification_puidfail() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.bin");
        std::fs::write(&path, b"??").unwrap();
        let mut record = FileRecord::from_path(temp.path(), &path).unwrap();

        apply_identification(
            &mut record,
            Identification {
                path: path.clone(),
                errors: String::new(),
                matches: vec![m("UNKNOWN", "no match")],
            },
        );
        assert!(record.format_id.is_none());
        assert_eq!(record.error_kinds(), vec![ErrorKind::PuidFail]);
        assert_eq!(record.status, RecordStatus::Identified);
    }

    #[test]
    fn test_apply_identification_fallback_logs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, b"hi").unwrap();
        let mut record = FileRecord::from_path(temp.path(), &path).unwrap();

        apply_identification(
            &mut record,
            Identification {
                path,
                errors: String::new(),
                matches: vec![m("UNKNOWN", "possibilities based on extension are x-fmt/111")],
            },
        );
        assert_eq!(record.format_id.as_deref(), Some("x-fmt/111"));
        assert!(record.processing_log[0].message.starts_with("FALLBACK"));
    }
}
