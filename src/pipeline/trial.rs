// src/pipeline/trial.rs

//! Trial conversions before a real run
//!
//! Converts the smallest file of every format a policy would convert into
//! a test area of the working directory. Originals are never touched and
//! nothing is written to the checkpoint or the protocol; the outputs stay
//! in the test area for inspection.

use super::Pipeline;
use crate::convert::{self, ConversionContext, ConversionOutcome};
use crate::error::{Error, Result};
use crate::identify;
use crate::lock::WorkDirLock;
use crate::record::{ErrorKind, FileRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// Name of the test area inside the working directory
pub const TEST_DIR: &str = "test";

/// What the trial conversion produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialOutcome {
    Converted {
        /// Output inside the test area
        output: PathBuf,
        format_id: String,
        command: String,
    },
    Failed {
        kind: ErrorKind,
        command: String,
        log: String,
    },
}

/// Trial conversion of one format
#[derive(Debug, Clone)]
pub struct PolicyTrial {
    pub format_id: String,
    /// Smallest file of the format, relative to the root
    pub sample: PathBuf,
    pub sample_size: u64,
    /// Files of this format below the root
    pub files: usize,
    pub total_size: u64,
    pub elapsed: Duration,
    pub outcome: TrialOutcome,
}

impl PolicyTrial {
    /// Time converting every file of the format would take at the sample's rate
    pub fn estimate(&self) -> Option<Duration> {
        if !matches!(self.outcome, TrialOutcome::Converted { .. }) || self.sample_size == 0 {
            return None;
        }
        Some(
            self.elapsed
                .mul_f64(self.total_size as f64 / self.sample_size as f64),
        )
    }
}

impl Pipeline<'_> {
    /// Convert one sample per format the policy would convert
    ///
    /// With `only`, just that format is tried; it must have files below the
    /// root and a conversion rule.
    pub fn test_policies(&self, only: Option<&str>) -> Result<Vec<PolicyTrial>> {
        let _lock = WorkDirLock::acquire(&self.work_dir)?;
        let records = identify::discover(self.identifier, &self.root)?;

        let mut by_format: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();
        for record in records {
            if record.path.starts_with(&self.work_dir) {
                continue;
            }
            let Some(id) = record.format_id.clone() else {
                continue;
            };
            if only.is_some_and(|o| o != id) {
                continue;
            }
            if self.policies.get(&id).is_some_and(|rule| !rule.accepted) {
                by_format.entry(id).or_default().push(record);
            }
        }

        if let Some(id) = only {
            if by_format.is_empty() {
                return Err(Error::Config(format!(
                    "{} has no conversion rule or no files below {}",
                    id,
                    self.root.display()
                )));
            }
        }

        let test_dir = self.work_dir.join(TEST_DIR);
        let ctx = ConversionContext {
            root: &self.root,
            work_dir: &test_dir,
            tools: self.tools,
            identifier: self.identifier,
            remove_originals: Some(false),
        };

        self.progress.set_length(by_format.len() as u64);
        let mut trials = Vec::with_capacity(by_format.len());
        for (format_id, files) in by_format {
            let Some(rule) = self.policies.get(&format_id) else {
                continue;
            };
            let total_size = files.iter().map(|r| r.size).sum();
            let count = files.len();
            let Some(sample) = files.into_iter().min_by_key(|r| r.size) else {
                continue;
            };

            self.progress.set_message(&format_id);
            info!("Testing {} with {}", format_id, sample.relative_path.display());
            let sample_path = sample.relative_path.clone();
            let sample_size = sample.size;

            let start = Instant::now();
            let outcome = match convert::convert(sample, rule, &ctx) {
                ConversionOutcome::Converted { derived, command } => TrialOutcome::Converted {
                    output: derived
                        .cleanup
                        .map(|task| task.source)
                        .unwrap_or(derived.path),
                    format_id: derived.format_id.unwrap_or_default(),
                    command,
                },
                ConversionOutcome::Failed {
                    kind, command, log, ..
                } => TrialOutcome::Failed { kind, command, log },
            };

            trials.push(PolicyTrial {
                format_id,
                sample: sample_path,
                sample_size,
                files: count,
                total_size,
                elapsed: start.elapsed(),
                outcome,
            });
            self.progress.increment(1);
        }

        self.progress
            .finish_with_message(&format!("{} formats tested", trials.len()));
        Ok(trials)
    }
}
