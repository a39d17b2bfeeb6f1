// src/policy/mod.rs

//! Policy store: per-format acceptance and conversion rules
//!
//! A policy file is a JSON object keyed by format id:
//!
//! ```json
//! {
//!   "fmt/18": { "format_name": "Acrobat PDF 1.4", "bin": "", "accepted": true },
//!   "fmt/5": {
//!     "bin": "ffmpeg",
//!     "accepted": false,
//!     "target_container": "mp4",
//!     "processing_args": "-c:v libx264 -c:a aac",
//!     "expected": ["fmt/199"],
//!     "remove_original": true
//!   }
//! }
//! ```
//!
//! Policies are validated as a whole before any file is touched. A run that
//! starts with an invalid policy stops with every problem listed.

mod defaults;
mod formats;

pub use defaults::{BuiltinFormat, BUILTIN_FORMATS, builtin};
pub use formats::{FormatInfo, FormatRegistry};

use crate::record::FileRecord;
use crate::tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Characters that may never appear in `processing_args`
pub const FORBIDDEN_ARG_CHARS: &[char] = &[';'];

/// Policy loading and validation errors
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to read policy file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{format}: unknown tool '{tool}'")]
    UnknownTool { format: String, tool: String },

    #[error("{format}: missing required field '{field}'")]
    MissingField { format: String, field: &'static str },

    #[error("{format}: forbidden character '{character}' in processing_args")]
    ForbiddenCharacter { format: String, character: char },

    #[error("Policy validation failed:\n{}", list_problems(.0))]
    Invalid(Vec<PolicyError>),
}

fn list_problems(problems: &[PolicyError]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Codec pair an accepted container must carry to stay as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl CodecRequirement {
    /// Whether the observed codecs meet the requirement
    ///
    /// A required stream that is absent counts as a mismatch.
    pub fn is_satisfied_by(&self, video: Option<&str>, audio: Option<&str>) -> bool {
        let matches = |want: &Option<String>, got: Option<&str>| match want {
            None => true,
            Some(w) => got.is_some_and(|g| g.eq_ignore_ascii_case(w)),
        };
        matches(&self.video, video) && matches(&self.audio, audio)
    }
}

/// Rule for one format id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default)]
    pub format_name: String,
    /// Tool governing inspection/conversion; empty means none
    pub bin: String,
    pub accepted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_args: Option<String>,
    /// Format ids the converter output must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_original: Option<bool>,
    /// Add a log entry to accepted files even when nothing happened to them
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_log: bool,
    /// Codec pair required for an accepted container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codecs: Option<CodecRequirement>,
}

impl PolicyRule {
    /// Accept-verbatim rule with no tool, flagged for manual review
    pub fn blank(format_name: impl Into<String>) -> Self {
        Self {
            format_name: format_name.into(),
            bin: String::new(),
            accepted: true,
            target_container: None,
            processing_args: None,
            expected: None,
            remove_original: None,
            force_log: false,
            codecs: None,
        }
    }

    /// Whether the rule can send a file to the converter
    pub fn may_convert(&self) -> bool {
        !self.accepted || self.codecs.is_some()
    }

    /// Whether a converter output format satisfies the rule
    pub fn expects(&self, format_id: &str) -> bool {
        self.expected
            .as_ref()
            .is_some_and(|e| e.iter().any(|id| id == format_id))
    }

    pub fn removes_original(&self) -> bool {
        self.remove_original.unwrap_or(false)
    }

    pub fn args(&self) -> &str {
        self.processing_args.as_deref().unwrap_or("")
    }

    fn problems(&self, format: &str, tools: &ToolRegistry) -> Vec<PolicyError> {
        let mut problems = Vec::new();

        if !self.bin.is_empty() && !tools.contains(&self.bin) {
            problems.push(PolicyError::UnknownTool {
                format: format.to_string(),
                tool: self.bin.clone(),
            });
        }

        if self.may_convert() {
            let missing = [
                ("target_container", self.target_container.is_none()),
                ("processing_args", self.processing_args.is_none()),
                ("expected", self.expected.is_none()),
                ("remove_original", self.remove_original.is_none()),
            ];
            for (field, absent) in missing {
                if absent {
                    problems.push(PolicyError::MissingField {
                        format: format.to_string(),
                        field,
                    });
                }
            }
        }

        if let Some(args) = &self.processing_args {
            for &character in FORBIDDEN_ARG_CHARS {
                if args.contains(character) {
                    problems.push(PolicyError::ForbiddenCharacter {
                        format: format.to_string(),
                        character,
                    });
                }
            }
        }

        problems
    }
}

/// Formats discovered in a scan: id -> display name
pub type DiscoveredFormats = BTreeMap<String, String>;

/// Collect the format ids present in a set of records
pub fn discovered_formats(records: &[FileRecord]) -> DiscoveredFormats {
    let mut found = DiscoveredFormats::new();
    for record in records {
        if let Some(id) = &record.format_id {
            let name = record
                .matches
                .iter()
                .find(|m| &m.id == id)
                .map(|m| m.format.clone())
                .unwrap_or_default();
            found.entry(id.clone()).or_insert(name);
        }
    }
    found
}

/// Result of generating or extending a policy
#[derive(Debug, Clone, Default)]
pub struct Generated {
    pub policies: Policies,
    /// Format ids that received a blank rule and need a human decision
    pub needs_review: Vec<String>,
}

/// The full policy map, keyed by format id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policies {
    rules: BTreeMap<String, PolicyRule>,
}

impl Policies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a policy file
    pub fn load(path: &Path, tools: &ToolRegistry) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let policies = Self::from_json(&content)?;
        policies.validate(tools)?;
        info!("Loaded {} policies from {}", policies.len(), path.display());
        Ok(policies)
    }

    /// Parse without validating
    pub fn from_json(content: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!("Saved {} policies to {}", self.len(), path.display());
        Ok(())
    }

    /// Check every rule, reporting all problems at once
    pub fn validate(&self, tools: &ToolRegistry) -> Result<(), PolicyError> {
        let problems: Vec<PolicyError> = self
            .rules
            .iter()
            .flat_map(|(format, rule)| rule.problems(format, tools))
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::Invalid(problems))
        }
    }

    /// Propose rules for discovered formats
    ///
    /// Formats with a built-in default get it. Others become blank rules
    /// listed in `needs_review`, except in strict mode where they are left
    /// out so that the run rejects them.
    pub fn generate_defaults(
        discovered: &DiscoveredFormats,
        strict: bool,
        keep_original_default: bool,
    ) -> Generated {
        let mut generated = Generated::default();
        generated.policies.add_missing(
            discovered,
            strict,
            keep_original_default,
            &mut generated.needs_review,
        );
        generated
    }

    /// Add rules for newly discovered formats; existing rules are kept
    pub fn extend(
        mut self,
        discovered: &DiscoveredFormats,
        strict: bool,
        keep_original_default: bool,
    ) -> Generated {
        let mut needs_review = Vec::new();
        self.add_missing(discovered, strict, keep_original_default, &mut needs_review);
        Generated {
            policies: self,
            needs_review,
        }
    }

    /// Blank rule for every discovered format
    pub fn blank(discovered: &DiscoveredFormats) -> Self {
        let rules = discovered
            .iter()
            .map(|(id, name)| (id.clone(), PolicyRule::blank(name.clone())))
            .collect();
        Self { rules }
    }

    fn add_missing(
        &mut self,
        discovered: &DiscoveredFormats,
        strict: bool,
        keep_original_default: bool,
        needs_review: &mut Vec<String>,
    ) {
        for (id, name) in discovered {
            if self.rules.contains_key(id) {
                continue;
            }
            match builtin(id) {
                Some(row) => {
                    self.rules.insert(id.clone(), row.to_rule(keep_original_default));
                }
                None if strict => {
                    debug!("No default for {} ({}), left out in strict mode", id, name);
                }
                None => {
                    warn!("No default for {} ({}), added blank rule for review", id, name);
                    self.rules.insert(id.clone(), PolicyRule::blank(name.clone()));
                    needs_review.push(id.clone());
                }
            }
        }
    }

    pub fn get(&self, format_id: &str) -> Option<&PolicyRule> {
        self.rules.get(format_id)
    }

    pub fn contains(&self, format_id: &str) -> bool {
        self.rules.contains_key(format_id)
    }

    pub fn insert(&mut self, format_id: impl Into<String>, rule: PolicyRule) {
        self.rules.insert(format_id.into(), rule);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PolicyRule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
