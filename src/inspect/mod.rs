// src/inspect/mod.rs

//! Integrity inspector
//!
//! Runs the prober that governs a file's format and sorts the outcome into
//! three buckets:
//!
//! - **fatal**: the diagnostics contain a phrase known to mean unrecoverable
//!   corruption; the file will be removed
//! - **warning**: the tool complained about something else; the file goes on
//!   but the complaint is logged
//! - **clean**: nothing to report, or no prober exists for the format
//!
//! Known-bad phrases live in a [`FailureCatalog`], a plain data table that
//! only ever grows.

use crate::policy::PolicyRule;
use crate::record::{ErrorKind, FileRecord, MediaInfo};
use crate::tools::{self, ProbeOutput, ToolRegistry};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const SOURCE: &str = "integrity";

/// Built-in phrases per tool that indicate a broken file
const BUILTIN_SIGNATURES: &[(&str, &[&str])] = &[
    (
        "ffmpeg",
        &[
            "moov atom not found",
            "invalid data found when processing input",
            "could not find codec parameters",
            "no frame!",
            "error while decoding stream",
            "header missing",
            "truncating packet",
            "end of file",
        ],
    ),
    (
        "magick",
        &[
            "improper image header",
            "corrupt image",
            "insufficient image data",
            "premature end of",
            "negative or zero image size",
            "not a jpeg file",
            "unexpected end-of-file",
            "read error",
        ],
    ),
];

/// Append-only table of per-tool corruption phrases
#[derive(Debug, Clone, Default)]
pub struct FailureCatalog {
    signatures: BTreeMap<String, Vec<String>>,
}

impl FailureCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the built-in phrases
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for (tool, phrases) in BUILTIN_SIGNATURES {
            for phrase in *phrases {
                catalog.add(tool, phrase);
            }
        }
        catalog
    }

    /// Add a phrase for a tool; duplicates are ignored
    pub fn add(&mut self, tool: &str, phrase: &str) {
        let phrase = phrase.trim().to_lowercase();
        if phrase.is_empty() {
            return;
        }
        let entry = self.signatures.entry(tool.to_string()).or_default();
        if !entry.contains(&phrase) {
            entry.push(phrase);
        }
    }

    /// Add every phrase from a tool -> phrases map
    pub fn extend<'a, I, P>(&mut self, extra: I)
    where
        I: IntoIterator<Item = (&'a String, P)>,
        P: IntoIterator<Item = &'a String>,
    {
        for (tool, phrases) in extra {
            for phrase in phrases {
                self.add(tool, phrase);
            }
        }
    }

    /// First known-bad phrase found in a tool's diagnostics
    pub fn find(&self, tool: &str, diagnostics: &str) -> Option<&str> {
        let haystack = diagnostics.to_lowercase();
        self.signatures
            .get(tool)?
            .iter()
            .find(|phrase| haystack.contains(phrase.as_str()))
            .map(String::as_str)
    }

    pub fn phrases(&self, tool: &str) -> &[String] {
        self.signatures.get(tool).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Outcome of inspecting one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    /// Tool that probed the file, if any
    pub tool: Option<String>,
    pub fatal: bool,
    /// Diagnostics worth logging (empty when clean)
    pub warning: String,
    pub media_info: Option<MediaInfo>,
}

impl IntegrityReport {
    /// Nothing was checked or nothing was found
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        !self.fatal && self.warning.is_empty()
    }
}

/// Prober name for a record under a rule
///
/// The rule's `bin` wins; without one the coarse mime family decides.
pub fn select_prober(record: &FileRecord, rule: Option<&PolicyRule>) -> Option<String> {
    match rule {
        Some(rule) if !rule.bin.is_empty() => Some(rule.bin.clone()),
        _ => tools::tool_for_mime(record.mime()).map(str::to_string),
    }
}

/// Probe a record's file and annotate the record with the result
///
/// The file on disk is never modified. A prober that cannot be run is
/// logged and treated as clean so a missing tool never destroys data.
pub fn inspect(
    record: &mut FileRecord,
    rule: Option<&PolicyRule>,
    registry: &ToolRegistry,
    catalog: &FailureCatalog,
) -> IntegrityReport {
    let Some(tool_name) = select_prober(record, rule) else {
        return IntegrityReport::clean();
    };
    let Some(tool) = registry.get(&tool_name) else {
        debug!("No prober registered as '{}'", tool_name);
        return IntegrityReport::clean();
    };

    let output = match tool.probe(&record.path) {
        Ok(Some(output)) => output,
        Ok(None) => return IntegrityReport::clean(),
        Err(e) => {
            warn!("Probe of {} with {} failed: {}", record.path.display(), tool_name, e);
            record.log(SOURCE, format!("{} could not probe the file: {}", tool_name, e));
            return IntegrityReport {
                tool: Some(tool_name),
                ..IntegrityReport::clean()
            };
        }
    };

    let mut report = IntegrityReport {
        tool: Some(tool_name.clone()),
        fatal: false,
        warning: output.diagnostics.clone(),
        media_info: output.media_info.clone(),
    };

    if let Some(info) = output.media_info {
        record.add_media_info(info);
    }

    if let Some(phrase) = catalog.find(&tool_name, &output.diagnostics) {
        report.fatal = true;
        debug!("{}: fatal signature '{}'", record.path.display(), phrase);
        record.log_error(ErrorKind::Integrity, &tool_name, output.diagnostics);
    } else if !output.diagnostics.is_empty() {
        record.log(&tool_name, output.diagnostics);
    }

    report
}

/// Store the prober's metadata snapshot without classifying its diagnostics
///
/// Used when integrity tests are off but a rule still needs stream
/// information for its codec check. Returns whether a snapshot was stored.
pub fn collect_media_info(
    record: &mut FileRecord,
    rule: Option<&PolicyRule>,
    registry: &ToolRegistry,
) -> bool {
    let Some(tool) = select_prober(record, rule).and_then(|name| registry.get(&name)) else {
        return false;
    };
    match tool.probe(&record.path) {
        Ok(Some(ProbeOutput {
            media_info: Some(info),
            ..
        })) => record.add_media_info(info),
        Ok(_) => false,
        Err(e) => {
            debug!("No media info for {}: {}", record.path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::record::FormatMatch;
    use crate::tools::{ConversionRequest, ExternalTool, ToolRun};
    use std::path::{Path, PathBuf};

    struct Scripted {
        name: &'static str,
        diagnostics: &'static str,
    }

    impl ExternalTool for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self, _path: &Path) -> Result<Option<ProbeOutput>> {
            Ok(Some(ProbeOutput {
                diagnostics: self.diagnostics.to_string(),
                media_info: Some(MediaInfo {
                    tool: "ffprobe".to_string(),
                    data: serde_json::json!({"streams": []}),
                }),
            }))
        }

        fn convert(&self, _request: &ConversionRequest<'_>) -> Result<ToolRun> {
            Ok(ToolRun::default())
        }
    }

    fn registry(diagnostics: &'static str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Scripted {
            name: "ffmpeg",
            diagnostics,
        }));
        registry
    }

    fn video_record() -> FileRecord {
        let mut rec = FileRecord::new(
            PathBuf::from("/data/clip.mp4"),
            PathBuf::from("clip.mp4"),
            100,
            "abcdef0123".to_string(),
        );
        rec.matches.push(FormatMatch {
            id: "fmt/199".to_string(),
            mime: "video/mp4".to_string(),
            ..Default::default()
        });
        rec
    }

    #[test]
    fn test_catalog_is_case_insensitive_and_deduplicated() {
        let mut catalog = FailureCatalog::new();
        catalog.add("ffmpeg", "Moov Atom Not Found");
        catalog.add("ffmpeg", "moov atom not found");
        assert_eq!(catalog.phrases("ffmpeg").len(), 1);
        assert_eq!(
            catalog.find("ffmpeg", "[mov] MOOV ATOM NOT FOUND"),
            Some("moov atom not found")
        );
        assert!(catalog.find("magick", "moov atom not found").is_none());
    }

    #[test]
    fn test_catalog_extend_from_settings() {
        let mut extra = BTreeMap::new();
        extra.insert("magick".to_string(), vec!["bogus marker".to_string()]);
        let mut catalog = FailureCatalog::builtin();
        let before = catalog.phrases("magick").len();
        catalog.extend(&extra);
        assert_eq!(catalog.phrases("magick").len(), before + 1);
    }

    #[test]
    fn test_fatal_signature() {
        let mut rec = video_record();
        let report = inspect(
            &mut rec,
            None,
            &registry("moov atom not found"),
            &FailureCatalog::builtin(),
        );
        assert!(report.fatal);
        assert_eq!(report.tool.as_deref(), Some("ffmpeg"));
        assert_eq!(rec.error_kinds(), vec![ErrorKind::Integrity]);
        assert_eq!(rec.media_info.len(), 1);
    }

    #[test]
    fn test_warning_is_logged_but_not_fatal() {
        let mut rec = video_record();
        let report = inspect(
            &mut rec,
            None,
            &registry("Application provided invalid, non monotonically increasing dts"),
            &FailureCatalog::builtin(),
        );
        assert!(!report.fatal);
        assert!(!report.warning.is_empty());
        assert!(rec.error_kinds().is_empty());
        assert_eq!(rec.processing_log.len(), 1);
    }

    #[test]
    fn test_clean_probe() {
        let mut rec = video_record();
        let report = inspect(&mut rec, None, &registry(""), &FailureCatalog::builtin());
        assert!(report.is_clean());
        assert!(rec.processing_log.is_empty());
    }

    #[test]
    fn test_unmapped_format_is_clean() {
        let mut rec = video_record();
        rec.matches[0].mime = "application/pdf".to_string();
        let report = inspect(
            &mut rec,
            None,
            &registry("moov atom not found"),
            &FailureCatalog::builtin(),
        );
        assert!(report.is_clean());
        assert!(report.tool.is_none());
    }

    #[test]
    fn test_collect_media_info_ignores_diagnostics() {
        let mut rec = video_record();
        assert!(collect_media_info(&mut rec, None, &registry("moov atom not found")));
        assert!(rec.error_kinds().is_empty());
        assert!(rec.media_info_for("ffprobe").is_some());
        // Second snapshot from the same tool is dropped
        assert!(!collect_media_info(&mut rec, None, &registry("")));
    }

    #[test]
    fn test_rule_bin_overrides_mime() {
        let rec = video_record();
        let mut rule = PolicyRule::blank("x");
        rule.bin = "magick".to_string();
        assert_eq!(select_prober(&rec, Some(&rule)).as_deref(), Some("magick"));
        assert_eq!(select_prober(&rec, None).as_deref(), Some("ffmpeg"));

        let blank = PolicyRule::blank("y");
        assert_eq!(select_prober(&rec, Some(&blank)).as_deref(), Some("ffmpeg"));
    }
}
