// src/policy/formats.rs

//! Format metadata: display names and canonical extensions per format id

use super::defaults::BUILTIN_FORMATS;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Metadata for one format id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Read-only table of known formats
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: BTreeMap<String, FormatInfo>,
}

impl FormatRegistry {
    /// Registry seeded from the built-in table
    pub fn builtin() -> Self {
        let formats = BUILTIN_FORMATS
            .iter()
            .map(|f| {
                (
                    f.id.to_string(),
                    FormatInfo {
                        name: f.name.to_string(),
                        extensions: f.extensions.iter().map(|e| e.to_string()).collect(),
                    },
                )
            })
            .collect();
        Self { formats }
    }

    /// Built-in table overlaid with entries from a JSON file
    ///
    /// The file is an object keyed by format id; its entries replace
    /// built-in ones with the same id.
    pub fn with_overrides(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read formats file {}: {}", path.display(), e))
        })?;
        let extra: BTreeMap<String, FormatInfo> = serde_json::from_str(&content)?;

        let mut registry = Self::builtin();
        registry.formats.extend(extra);
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&FormatInfo> {
        self.formats.get(id)
    }

    /// Display name, if known
    pub fn name(&self, id: &str) -> Option<&str> {
        self.get(id).map(|f| f.name.as_str())
    }

    /// The single extension a format maps to
    ///
    /// `None` when the format is unknown or has several candidates; callers
    /// must not guess in that case.
    pub fn canonical_extension(&self, id: &str) -> Option<&str> {
        match self.get(id).map(|f| f.extensions.as_slice()) {
            Some([only]) => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canonical_extension() {
        let reg = FormatRegistry::builtin();
        assert_eq!(reg.canonical_extension("fmt/18"), Some("pdf"));
        assert_eq!(reg.canonical_extension("fmt/43"), None);
        assert_eq!(reg.canonical_extension("fmt/99999"), None);
    }

    #[test]
    fn test_overrides_replace_builtin() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("formats.json");
        fs::write(
            &path,
            r#"{"fmt/43": {"name": "JPEG", "extensions": ["jpg"]},
                "fmt/9000": {"name": "Custom", "extensions": ["cst"]}}"#,
        )
        .unwrap();

        let reg = FormatRegistry::with_overrides(&path).unwrap();
        assert_eq!(reg.canonical_extension("fmt/43"), Some("jpg"));
        assert_eq!(reg.name("fmt/9000"), Some("Custom"));
        assert_eq!(reg.canonical_extension("fmt/18"), Some("pdf"));
    }
}
