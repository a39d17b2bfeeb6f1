// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! Test files describe themselves: the first line is the format id the
//! fake identifier reports ("?" for nothing), and further `key: value`
//! lines feed the fake identifier and prober:
//!
//! ```text
//! fmt/5
//! mime: video/x-msvideo
//! warning: extension mismatch
//! diag: moov atom not found
//! video: mpeg4
//! ```

#![allow(dead_code)]

use norma::identify::{Identification, Identifier};
use norma::record::{FormatMatch, MediaInfo};
use norma::tools::{ConversionRequest, ExternalTool, ProbeOutput, ToolRun};
use norma::{Policies, Settings, ToolRegistry};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

fn field<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(": "))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.trim())
}

/// Identifier reading the format id from the file itself
pub struct SelfDescribing;

impl SelfDescribing {
    fn identify_one(path: &Path) -> norma::Result<Identification> {
        let content = fs::read_to_string(path)?;
        let first = content.lines().next().unwrap_or("?").trim();
        let id = if first == "?" { "UNKNOWN" } else { first };
        Ok(Identification {
            path: path.to_path_buf(),
            errors: String::new(),
            matches: vec![FormatMatch {
                ns: "pronom".to_string(),
                id: id.to_string(),
                mime: field(&content, "mime").unwrap_or_default().to_string(),
                warning: field(&content, "warning").unwrap_or_default().to_string(),
                ..Default::default()
            }],
        })
    }
}

impl Identifier for SelfDescribing {
    fn identify(&self, path: &Path) -> norma::Result<Vec<Identification>> {
        if !path.is_dir() {
            return Ok(vec![Self::identify_one(path)?]);
        }
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files.iter().map(|f| Self::identify_one(f)).collect()
    }
}

/// Stand-in for ffmpeg: probes from the file's own fields and writes an
/// output that identifies as `produces`
pub struct FakeFfmpeg {
    /// Format id written into converted files; `None` writes nothing
    pub produces: Option<&'static str>,
}

impl ExternalTool for FakeFfmpeg {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn probe(&self, path: &Path) -> norma::Result<Option<ProbeOutput>> {
        let content = fs::read_to_string(path)?;
        let mut streams = Vec::new();
        for kind in ["video", "audio"] {
            if let Some(codec) = field(&content, kind) {
                streams.push(serde_json::json!({"codec_type": kind, "codec_name": codec}));
            }
        }
        Ok(Some(ProbeOutput {
            diagnostics: field(&content, "diag").unwrap_or_default().to_string(),
            media_info: Some(MediaInfo {
                tool: "ffprobe".to_string(),
                data: serde_json::json!({ "streams": streams }),
            }),
        }))
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> norma::Result<ToolRun> {
        if let Some(format) = self.produces {
            let name = request
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            fs::write(
                request.output,
                format!("{}\nvideo: h264\nconverted from {}\n", format, name),
            )?;
        }
        Ok(ToolRun {
            command_line: format!(
                "ffmpeg -i {} {} {}",
                request.input.display(),
                request.args,
                request.output.display()
            ),
            success: self.produces.is_some(),
            ..Default::default()
        })
    }
}

/// Registry holding only the fake ffmpeg
pub fn registry(produces: Option<&'static str>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(FakeFfmpeg { produces }));
    tools
}

/// Parse and validate a policy the way a run would
pub fn policies(json: &str, tools: &ToolRegistry) -> Policies {
    let policies = Policies::from_json(json).unwrap();
    policies.validate(tools).unwrap();
    policies
}

/// Scan root and working directory in a fresh temp dir
///
/// Returns (TempDir, root, work_dir) - keep the TempDir alive to prevent cleanup.
pub fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("batch");
    fs::create_dir_all(&root).unwrap();
    let root = root.canonicalize().unwrap();
    let work = temp.path().canonicalize().unwrap().join("batch.work");
    (temp, root, work)
}

/// Write a test file below the root, creating parents
pub fn put(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Settings for tests: no integrity tests, explicit working directory
pub fn settings(work: &Path) -> Settings {
    Settings {
        integrity_tests: false,
        work_dir: Some(work.to_path_buf()),
        ..Settings::default()
    }
}

/// Conversion rule from fmt/5 (AVI) to fmt/199 (MPEG-4)
pub const AVI_TO_MP4: &str = r#"{
    "fmt/5": {
        "format_name": "Audio/Video Interleaved Format",
        "bin": "ffmpeg",
        "accepted": false,
        "target_container": "mp4",
        "processing_args": "-c:v libx264 -c:a aac",
        "expected": ["fmt/199"],
        "remove_original": true
    }
}"#;
