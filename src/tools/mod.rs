// src/tools/mod.rs

//! Registry of external probing and conversion tools
//!
//! Policy rules name a tool in their `bin` field. The registry maps that
//! name to an [`ExternalTool`]; the inspector and the conversion coordinator
//! only ever talk to the trait, so supporting a new tool means registering
//! one more implementation.

mod builtin;
pub mod runner;

pub use builtin::{Ffmpeg, ImageMagick, LibreOffice};
pub use runner::{ToolRun, strip_paths};

use crate::error::Result;
use crate::record::MediaInfo;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Diagnostics produced by a prober
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeOutput {
    /// Warnings and errors the tool printed while decoding the file
    pub diagnostics: String,
    /// Technical metadata snapshot, when the tool provides one
    pub media_info: Option<MediaInfo>,
}

/// Everything a converter needs for one file
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub input: &'a Path,
    /// Where the converted file is expected to appear
    pub output: &'a Path,
    pub scratch_dir: &'a Path,
    pub target_container: &'a str,
    /// Policy-supplied arguments
    pub args: &'a str,
}

/// A tool that can inspect and/or convert files
pub trait ExternalTool: Send + Sync {
    /// Name used in policy files
    fn name(&self) -> &str;

    /// Executables the tool needs on PATH
    fn binaries(&self) -> Vec<&str> {
        vec![self.name()]
    }

    /// Decode the file and report diagnostics; `None` if the tool cannot probe
    fn probe(&self, path: &Path) -> Result<Option<ProbeOutput>>;

    /// Convert `request.input`, writing `request.output`
    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ToolRun>;
}

/// Tool name -> implementation, read-only once populated
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn ExternalTool>>,
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with ffmpeg, ImageMagick and LibreOffice
    pub fn with_builtin(timeout: Option<Duration>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Ffmpeg::new(timeout)));
        registry.register(Box::new(ImageMagick::new(timeout)));
        registry.register(Box::new(LibreOffice::new(timeout)));
        registry
    }

    /// Add or replace a tool
    pub fn register(&mut self, tool: Box<dyn ExternalTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ExternalTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Executables of registered tools that are not on PATH
    pub fn missing_binaries(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .tools
            .values()
            .flat_map(|t| t.binaries())
            .filter(|bin| which::which(bin).is_err())
            .map(str::to_string)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

/// Pick a prober from a coarse mime family
pub fn tool_for_mime(mime: &str) -> Option<&'static str> {
    match mime.split('/').next().unwrap_or("") {
        "image" => Some("magick"),
        "audio" | "video" => Some("ffmpeg"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl ExternalTool for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn binaries(&self) -> Vec<&str> {
            vec!["norma-noop-binary-that-does-not-exist"]
        }

        fn probe(&self, _path: &Path) -> Result<Option<ProbeOutput>> {
            Ok(None)
        }

        fn convert(&self, _request: &ConversionRequest<'_>) -> Result<ToolRun> {
            Ok(ToolRun::default())
        }
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ToolRegistry::with_builtin(None);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["ffmpeg", "magick", "soffice"]);
        assert!(registry.contains("ffmpeg"));
        assert!(!registry.contains(""));
    }

    #[test]
    fn test_register_custom_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Noop));
        assert!(registry.get("noop").is_some());
        assert_eq!(
            registry.missing_binaries(),
            vec!["norma-noop-binary-that-does-not-exist".to_string()]
        );
    }

    #[test]
    fn test_tool_for_mime() {
        assert_eq!(tool_for_mime("image/tiff"), Some("magick"));
        assert_eq!(tool_for_mime("video/mp4"), Some("ffmpeg"));
        assert_eq!(tool_for_mime("audio/x-wav"), Some("ffmpeg"));
        assert_eq!(tool_for_mime("application/pdf"), None);
        assert_eq!(tool_for_mime(""), None);
    }
}
