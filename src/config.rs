// src/config.rs

//! Run settings
//!
//! Built once at startup from an optional TOML file, then adjusted by
//! command-line flags and passed by reference to every stage. Nothing
//! mutates it afterwards.
//!
//! ```toml
//! strict = false
//! keep_originals = true
//! integrity_tests = true
//! identifier = "/usr/local/bin/sf"
//! tool_timeout_secs = 3600
//! system_formats = ["fmt/394", "fmt/682"]
//!
//! [failure_signatures]
//! ffmpeg = ["non-existing pps"]
//! ```

use crate::error::{Error, Result};
use crate::inspect::FailureCatalog;
use crate::policy::FormatRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Format ids of operating-system artifacts (Thumbs.db, .DS_Store)
pub const DEFAULT_SYSTEM_FORMATS: &[&str] = &["fmt/394", "fmt/682"];

/// Suffix of the default working directory, placed next to the scan root
pub const WORK_DIR_SUFFIX: &str = ".norma";

fn default_true() -> bool {
    true
}

fn default_identifier() -> String {
    "sf".to_string()
}

fn default_system_formats() -> Vec<String> {
    DEFAULT_SYSTEM_FORMATS.iter().map(|s| s.to_string()).collect()
}

/// Everything a run needs to know besides the policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Remove files whose format has no rule instead of skipping them
    pub strict: bool,
    /// Disposition written into generated rules
    #[serde(default = "default_true")]
    pub keep_originals: bool,
    /// Overrides every rule's `remove_original` when set
    pub remove_originals: Option<bool>,
    #[serde(default = "default_true")]
    pub integrity_tests: bool,
    #[serde(default = "default_true")]
    pub convert: bool,
    #[serde(default = "default_true")]
    pub relocate: bool,
    /// Working directory; `<root>.norma` when unset
    pub work_dir: Option<PathBuf>,
    /// The siegfried binary
    #[serde(default = "default_identifier")]
    pub identifier: String,
    /// Kill external tools after this many seconds; wait forever when unset
    pub tool_timeout_secs: Option<u64>,
    #[serde(default = "default_system_formats")]
    pub system_formats: Vec<String>,
    /// Extra corruption phrases per tool
    pub failure_signatures: BTreeMap<String, Vec<String>>,
    /// JSON table overriding built-in format metadata
    pub formats_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strict: false,
            keep_originals: true,
            remove_originals: None,
            integrity_tests: true,
            convert: true,
            relocate: true,
            work_dir: None,
            identifier: default_identifier(),
            tool_timeout_secs: None,
            system_formats: default_system_formats(),
            failure_signatures: BTreeMap::new(),
            formats_file: None,
        }
    }
}

impl Settings {
    /// Default settings file: `<config dir>/norma/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("norma").join("config.toml"))
    }

    /// Parse a TOML settings file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load an explicit file, or the default one if it exists, or defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!("Loading settings from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Working directory for a scan root
    pub fn work_dir_for(&self, root: &Path) -> PathBuf {
        if let Some(dir) = &self.work_dir {
            return dir.clone();
        }
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        root.with_file_name(format!("{}{}", name, WORK_DIR_SUFFIX))
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    /// Built-in corruption phrases plus the configured ones
    pub fn failure_catalog(&self) -> FailureCatalog {
        let mut catalog = FailureCatalog::builtin();
        catalog.extend(&self.failure_signatures);
        catalog
    }

    /// Built-in format metadata, overlaid with `formats_file` if set
    pub fn format_registry(&self) -> Result<FormatRegistry> {
        match &self.formats_file {
            Some(path) => FormatRegistry::with_overrides(path),
            None => Ok(FormatRegistry::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(!s.strict);
        assert!(s.integrity_tests && s.convert && s.relocate);
        assert_eq!(s.identifier, "sf");
        assert!(s.tool_timeout().is_none());
        assert_eq!(s.system_formats, vec!["fmt/394", "fmt/682"]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            concat!(
                "strict = true\ntool_timeout_secs = 60\n\n",
                "[failure_signatures]\nffmpeg = [\"Non-Existing PPS\"]\n",
            ),
        )
        .unwrap();

        let s = Settings::load(&path).unwrap();
        assert!(s.strict);
        assert!(s.keep_originals);
        assert!(s.convert);
        assert_eq!(s.tool_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(s.system_formats.len(), 2);
        assert!(
            s.failure_catalog()
                .find("ffmpeg", "[h264] non-existing pps 0 referenced")
                .is_some()
        );
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "strict = maybe").unwrap();
        assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_work_dir_for() {
        let s = Settings::default();
        assert_eq!(
            s.work_dir_for(Path::new("/archive/batch1")),
            PathBuf::from("/archive/batch1.norma")
        );
        let custom = Settings {
            work_dir: Some(PathBuf::from("/tmp/w")),
            ..Settings::default()
        };
        assert_eq!(custom.work_dir_for(Path::new("/archive/batch1")), PathBuf::from("/tmp/w"));
    }
}
