// src/pipeline/mod.rs

//! The processing pipeline
//!
//! A run is a fixed sequence of stages, each consuming the previous stage's
//! output by value:
//!
//! ```text
//! discover -> triage -> convert_all -> checkpoint -> relocate
//! ```
//!
//! Everything between triage and relocation is held in memory; the
//! checkpoint written before relocation is the only state that survives a
//! crash, and the next run relocates it before discovering anything new.

mod trial;

pub use trial::{PolicyTrial, TEST_DIR, TrialOutcome};

use crate::checkpoint::{Checkpoint, ErrorTable, Protocol, checkpoint_key, path_key};
use crate::config::Settings;
use crate::convert::{self, ConversionContext, ConversionOutcome};
use crate::decision::{self, Action, DecisionContext};
use crate::error::{Error, Result};
use crate::identify::{self, Identifier};
use crate::inspect::{self, FailureCatalog, IntegrityReport};
use crate::lock::WorkDirLock;
use crate::policy::{FormatRegistry, Policies};
use crate::progress::{ProgressTracker, SilentProgress};
use crate::record::{ErrorKind, FileRecord, RecordStatus};
use crate::relocate;
use crate::tools::ToolRegistry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SOURCE: &str = "filehandler";

/// Name of the removed-files area inside the working directory
pub const REMOVED_DIR: &str = "removed";

/// Records sorted by what triage decided
#[derive(Debug, Default)]
pub struct Triage {
    pub accepted: Vec<FileRecord>,
    pub pending: Vec<FileRecord>,
    pub removed: Vec<FileRecord>,
    pub skipped: Vec<FileRecord>,
    /// Operating-system artifacts; never written anywhere
    pub ignored: Vec<FileRecord>,
}

impl Triage {
    pub fn len(&self) -> usize {
        self.accepted.len()
            + self.pending.len()
            + self.removed.len()
            + self.skipped.len()
            + self.ignored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of the conversion stage
#[derive(Debug, Default)]
pub struct Conversions {
    /// Derived records, each carrying its original in `derived_from`
    pub converted: Vec<FileRecord>,
    /// Originals whose conversion failed, untouched on disk
    pub failed: Vec<FileRecord>,
}

/// Output of the relocation stage
#[derive(Debug, Default)]
pub struct Relocation {
    pub relocated: usize,
    pub failed: usize,
    pub errors: ErrorTable,
    /// Relative paths of the derivatives moved into place
    pub derived: Vec<String>,
}

/// Counters of a complete run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records relocated from a leftover checkpoint before discovery
    pub resumed: usize,
    pub discovered: usize,
    pub accepted: usize,
    pub removed: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub converted: usize,
    pub conversion_failed: usize,
    /// Conversions left pending because conversion is disabled
    pub pending: usize,
    pub relocated: usize,
    pub relocation_failed: usize,
    /// Entries in the error table
    pub errors: usize,
    /// Relative paths of the derivatives this run moved into place
    pub derived: Vec<String>,
}

/// One configured run over a scan root
pub struct Pipeline<'a> {
    root: PathBuf,
    work_dir: PathBuf,
    settings: &'a Settings,
    policies: &'a Policies,
    tools: &'a ToolRegistry,
    identifier: &'a dyn Identifier,
    catalog: FailureCatalog,
    formats: FormatRegistry,
    progress: Box<dyn ProgressTracker>,
    /// Finalized files to process again, keyed by relative path
    revisit: HashSet<String>,
}

impl<'a> Pipeline<'a> {
    /// Prepare a run; fails before touching any file when the root is unusable
    pub fn new(
        root: &Path,
        settings: &'a Settings,
        policies: &'a Policies,
        tools: &'a ToolRegistry,
        identifier: &'a dyn Identifier,
    ) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        let work_dir = settings.work_dir_for(&root);

        Ok(Self {
            root,
            work_dir,
            settings,
            policies,
            tools,
            identifier,
            catalog: settings.failure_catalog(),
            formats: settings.format_registry()?,
            progress: Box::new(SilentProgress::new()),
            revisit: HashSet::new(),
        })
    }

    /// Report stage progress through a tracker
    pub fn with_progress(mut self, progress: Box<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    /// Process these finalized files again under this run's policy
    ///
    /// Used to chain policies: the derivatives of one pass are the input of
    /// the next, and keep their lineage.
    pub fn revisiting<I>(mut self, relative_paths: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.revisit.extend(relative_paths);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Identify and hash every file below the root
    ///
    /// Files the protocol already settled, and anything inside the working
    /// directory, are left out. A revisited file takes over the lineage of
    /// its protocol entry.
    pub fn discover(&self, protocol: &Protocol) -> Result<Vec<FileRecord>> {
        self.progress.set_message("identifying files");
        let records = identify::discover(self.identifier, &self.root)?;
        let total = records.len();

        let mut fresh = Vec::with_capacity(total);
        for mut record in records {
            if record.path.starts_with(&self.work_dir) {
                continue;
            }
            let key = path_key(&record.relative_path);
            if self.revisit.contains(&key) {
                if let Some(previous) = protocol.get(&key).filter(|p| p.hash == record.hash) {
                    record.derived_from = previous.derived_from.clone();
                }
                debug!("{} processed again", key);
            } else if protocol.is_settled(&key, &record.hash) {
                debug!("{} already processed", key);
                continue;
            }
            fresh.push(record);
        }

        if fresh.len() < total {
            info!("{} of {} files already processed", total - fresh.len(), total);
        }
        Ok(fresh)
    }

    /// Inspect each record and carry out its decision
    pub fn triage(&self, records: Vec<FileRecord>) -> Triage {
        let ctx = DecisionContext {
            strict: self.settings.strict,
            system_formats: &self.settings.system_formats,
            formats: &self.formats,
        };
        let removed_dir = self.work_dir.join(REMOVED_DIR);
        let mut triage = Triage::default();

        self.progress.set_length(records.len() as u64);
        for mut record in records {
            self.progress
                .set_message(&record.relative_path.to_string_lossy());
            let integrity = self.check_integrity(&mut record);
            let decision = decision::decide(&record, self.policies, &integrity, &ctx);

            for note in decision.notes {
                record.log(SOURCE, note);
            }
            if let Some(plan) = &decision.rename {
                decision::apply_rename(&mut record, plan, &self.root);
            }

            record.status = decision::status_for(decision.action);
            match decision.action {
                Action::Ignore => {
                    debug!("Ignoring system file {}", record.relative_path.display());
                    triage.ignored.push(record);
                }
                Action::Remove(kind) => {
                    decision::apply_removal(&mut record, kind, &removed_dir);
                    triage.removed.push(record);
                }
                Action::Skip => triage.skipped.push(record),
                Action::Accept => {
                    let logged = record
                        .format_id
                        .as_deref()
                        .and_then(|id| self.policies.get(id))
                        .is_some_and(|rule| rule.force_log);
                    if logged {
                        record.log(SOURCE, "accepted as is");
                    }
                    triage.accepted.push(record);
                }
                Action::Convert => {
                    record.pending_conversion = true;
                    triage.pending.push(record);
                }
            }
            self.progress.increment(1);
        }

        self.progress.finish_with_message(&format!(
            "{} accepted, {} to convert, {} removed, {} skipped",
            triage.accepted.len(),
            triage.pending.len(),
            triage.removed.len(),
            triage.skipped.len()
        ));
        triage
    }

    /// Probe a record when integrity tests are on
    ///
    /// With tests off, a rule that checks codecs still gets its metadata
    /// snapshot.
    fn check_integrity(&self, record: &mut FileRecord) -> IntegrityReport {
        let Some(format_id) = record.format_id.clone() else {
            return IntegrityReport::clean();
        };
        if self.settings.system_formats.contains(&format_id) {
            return IntegrityReport::clean();
        }
        let rule = self.policies.get(&format_id);

        if self.settings.integrity_tests {
            return inspect::inspect(record, rule, self.tools, &self.catalog);
        }
        if rule.is_some_and(|r| r.codecs.is_some()) {
            inspect::collect_media_info(record, rule, self.tools);
        }
        IntegrityReport::clean()
    }

    /// Convert every pending record
    pub fn convert_all(&self, pending: Vec<FileRecord>) -> Conversions {
        let ctx = ConversionContext {
            root: &self.root,
            work_dir: &self.work_dir,
            tools: self.tools,
            identifier: self.identifier,
            remove_originals: self.settings.remove_originals,
        };
        let mut out = Conversions::default();

        self.progress.set_length(pending.len() as u64);
        for mut record in pending {
            self.progress
                .set_message(&record.relative_path.to_string_lossy());
            let rule = record.format_id.as_deref().and_then(|id| self.policies.get(id));
            let Some(rule) = rule else {
                record.log_error(ErrorKind::ConvFailed, "conversion", "no rule for the format");
                record.status = RecordStatus::ConversionFailed;
                record.pending_conversion = false;
                out.failed.push(record);
                self.progress.increment(1);
                continue;
            };

            match convert::convert(record, rule, &ctx) {
                ConversionOutcome::Converted { mut derived, .. } => {
                    if let Some(original) = derived.derived_from.as_mut() {
                        original.status = RecordStatus::Converted;
                        original.pending_conversion = false;
                    }
                    out.converted.push(derived);
                }
                ConversionOutcome::Failed {
                    mut original,
                    kind,
                    command,
                    log,
                } => {
                    if !command.is_empty() {
                        original.log(&rule.bin, format!("command: {}", command));
                    }
                    let message = if log.is_empty() {
                        format!("{} produced no usable output", rule.bin)
                    } else {
                        log
                    };
                    original.log_error(kind, "conversion", message);
                    original.status = RecordStatus::ConversionFailed;
                    original.pending_conversion = false;
                    out.failed.push(original);
                }
            }
            self.progress.increment(1);
        }

        self.progress.finish_with_message(&format!(
            "{} converted, {} failed",
            out.converted.len(),
            out.failed.len()
        ));
        out
    }

    /// Persist everything awaiting relocation
    pub fn write_checkpoint<I>(&self, records: I) -> Result<Checkpoint>
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let mut checkpoint = Checkpoint::new(&self.work_dir);
        for record in records {
            checkpoint.insert(checkpoint_key(&record), record)?;
        }
        checkpoint.save()?;
        Ok(checkpoint)
    }

    /// Relocate whatever the checkpoint holds
    pub fn relocate(&self) -> Result<Relocation> {
        relocate_checkpoint(&self.root, &self.work_dir)
    }

    /// Run every enabled stage, resuming an interrupted run first
    ///
    /// The error table of the whole run, resumed records included, is
    /// written to `failed.json` at the end.
    pub fn run(&self) -> Result<RunSummary> {
        let _lock = WorkDirLock::acquire(&self.work_dir)?;
        let mut errors = ErrorTable::new();
        let mut summary = self.run_stages(&mut errors)?;
        summary.errors = errors.len();
        errors.flush(&self.work_dir)?;
        Ok(summary)
    }

    fn run_stages(&self, errors: &mut ErrorTable) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if Checkpoint::exists(&self.work_dir) {
            if !self.settings.relocate {
                return Err(Error::Config(format!(
                    "{} holds records of an earlier run; relocate them first",
                    self.work_dir.display()
                )));
            }
            info!("Found a checkpoint from an interrupted run, relocating it first");
            let resumed = self.relocate()?;
            summary.resumed = resumed.relocated + resumed.failed;
            errors.append(resumed.errors);
        }

        let protocol = Protocol::load_or_empty(&self.work_dir)?;
        let records = self.discover(&protocol)?;
        summary.discovered = records.len();
        if records.is_empty() {
            info!("Nothing new under {}", self.root.display());
            return Ok(summary);
        }

        let triage = self.triage(records);
        summary.accepted = triage.accepted.len();
        summary.removed = triage.removed.len();
        summary.skipped = triage.skipped.len();
        summary.ignored = triage.ignored.len();

        let mut awaiting = Vec::with_capacity(triage.len());
        awaiting.extend(triage.accepted);
        awaiting.extend(triage.removed);
        awaiting.extend(triage.skipped);

        if self.settings.convert {
            let conversions = self.convert_all(triage.pending);
            summary.converted = conversions.converted.len();
            summary.conversion_failed = conversions.failed.len();
            awaiting.extend(conversions.converted);
            awaiting.extend(conversions.failed);
        } else {
            summary.pending = triage.pending.len();
            awaiting.extend(triage.pending);
        }

        self.write_checkpoint(awaiting)?;

        if !self.settings.relocate {
            info!(
                "Relocation disabled; checkpoint left in {}",
                self.work_dir.display()
            );
            return Ok(summary);
        }

        let relocation = self.relocate()?;
        summary.relocated = relocation.relocated;
        summary.relocation_failed = relocation.failed;
        summary.derived = relocation.derived;
        errors.append(relocation.errors);
        Ok(summary)
    }
}

/// Finalize a verified checkpoint into the protocol
///
/// A checkpoint that is missing is treated as empty. One that lost its
/// digest or no longer matches it stops here, before any file moves. The
/// returned error table is left for the caller to flush.
pub fn relocate_checkpoint(root: &Path, work_dir: &Path) -> Result<Relocation> {
    let checkpoint = Checkpoint::load_or_empty(work_dir)?;
    let mut protocol = Protocol::load_or_empty(work_dir)?;

    let records = checkpoint.clone().into_records();
    info!("Relocating {} records", records.len());
    let finalized = relocate::finalize(records, &mut protocol, root, work_dir);

    let mut errors = ErrorTable::new();
    errors.collect(
        finalized
            .relocated
            .iter()
            .chain(finalized.failed.iter())
            .flat_map(|r| std::iter::once(r).chain(r.lineage())),
    );

    let derived = finalized
        .relocated
        .iter()
        .filter(|r| r.derived_from.is_some() && r.status == RecordStatus::Relocated)
        .map(|r| path_key(&r.relative_path))
        .collect();
    let relocation = Relocation {
        relocated: finalized.relocated.len(),
        failed: finalized.failed.len(),
        errors,
        derived,
    };
    if relocation.failed > 0 {
        warn!(
            "{} files could not be relocated; their scratch copies were kept",
            relocation.failed
        );
    }

    protocol.merge(finalized.relocated, root);
    protocol.merge(finalized.failed, root);
    protocol.save()?;
    checkpoint.discard()?;

    Ok(relocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::identify::Identification;
    use crate::policy::PolicyRule;
    use crate::record::FormatMatch;
    use std::fs;
    use tempfile::TempDir;

    /// Format id is the first line of the file; "?" means unidentified
    struct FirstLine;

    impl Identifier for FirstLine {
        fn identify(&self, path: &Path) -> Result<Vec<Identification>> {
            let files: Vec<PathBuf> = if path.is_dir() {
                let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .collect();
                files.sort();
                files
            } else {
                vec![path.to_path_buf()]
            };

            files
                .into_iter()
                .map(|file| {
                    let content = fs::read_to_string(&file)?;
                    let id = content.lines().next().unwrap_or("").to_string();
                    let matches = if id == "?" {
                        vec![FormatMatch {
                            id: "UNKNOWN".to_string(),
                            ..Default::default()
                        }]
                    } else {
                        vec![FormatMatch {
                            id,
                            ..Default::default()
                        }]
                    };
                    Ok(Identification {
                        path: file,
                        errors: String::new(),
                        matches,
                    })
                })
                .collect()
        }
    }

    fn settings(work: &Path) -> Settings {
        Settings {
            integrity_tests: false,
            work_dir: Some(work.to_path_buf()),
            ..Settings::default()
        }
    }

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("batch");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("docs/report.pdf"), "fmt/18\n").unwrap();
        fs::write(root.join("docs/Thumbs.db"), "fmt/682\n").unwrap();
        fs::write(root.join("mystery.bin"), "?\n").unwrap();
        fs::write(root.join("notes.xyz"), "fmt/999\n").unwrap();
        let work = temp.path().join("work");
        (temp, root, work)
    }

    fn accepting_policy() -> Policies {
        let mut policies = Policies::new();
        let mut rule = PolicyRule::blank("Acrobat PDF 1.4");
        rule.accepted = true;
        policies.insert("fmt/18", rule);
        policies
    }

    #[test]
    fn test_triage_buckets() {
        let (_temp, root, work) = fixture();
        let settings = settings(&work);
        let policies = accepting_policy();
        let tools = ToolRegistry::new();
        let pipeline = Pipeline::new(&root, &settings, &policies, &tools, &FirstLine).unwrap();

        let records = pipeline.discover(&Protocol::default()).unwrap();
        assert_eq!(records.len(), 4);

        let triage = pipeline.triage(records);
        assert_eq!(triage.accepted.len(), 1);
        assert_eq!(triage.ignored.len(), 1);
        assert_eq!(triage.removed.len(), 1);
        assert_eq!(triage.skipped.len(), 1);
        assert!(triage.pending.is_empty());

        let removed = &triage.removed[0];
        assert_eq!(removed.error_kinds(), vec![ErrorKind::PuidFail]);
        assert!(removed.path.starts_with(work.join(REMOVED_DIR)));
        assert!(!root.join("mystery.bin").exists());

        // System files stay where they are
        assert!(root.join("docs/Thumbs.db").exists());
    }

    #[test]
    fn test_strict_removes_unknown_formats() {
        let (_temp, root, work) = fixture();
        let settings = Settings {
            strict: true,
            ..settings(&work)
        };
        let policies = accepting_policy();
        let tools = ToolRegistry::new();
        let pipeline = Pipeline::new(&root, &settings, &policies, &tools, &FirstLine).unwrap();

        let records = pipeline.discover(&Protocol::default()).unwrap();
        let triage = pipeline.triage(records);
        assert!(triage.skipped.is_empty());
        let kinds: Vec<_> = triage
            .removed
            .iter()
            .flat_map(|r| r.error_kinds())
            .collect();
        assert!(kinds.contains(&ErrorKind::NotInPolicies));
    }

    #[test]
    fn test_run_writes_protocol_and_is_idempotent() {
        let (_temp, root, work) = fixture();
        let settings = settings(&work);
        let policies = accepting_policy();
        let tools = ToolRegistry::new();
        let pipeline = Pipeline::new(&root, &settings, &policies, &tools, &FirstLine).unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.relocated, 3);
        assert!(!Checkpoint::exists(&work));

        let protocol = Protocol::load_or_empty(&work).unwrap();
        assert_eq!(protocol.len(), 3);
        assert!(protocol.get("docs/report.pdf").is_some());
        assert!(protocol.get("_REMOVED/mystery.bin").is_some());

        // Skipped files are retried, the rest is settled
        let again = pipeline.run().unwrap();
        assert_eq!(again.discovered, 2);
        assert_eq!(again.skipped, 1);
    }

    #[test]
    fn test_no_relocate_leaves_checkpoint_for_resume() {
        let (_temp, root, work) = fixture();
        let policies = accepting_policy();
        let tools = ToolRegistry::new();

        let held = Settings {
            relocate: false,
            ..settings(&work)
        };
        let pipeline = Pipeline::new(&root, &held, &policies, &tools, &FirstLine).unwrap();
        pipeline.run().unwrap();
        assert!(Checkpoint::exists(&work));
        assert!(pipeline.run().is_err());

        let relocation = relocate_checkpoint(pipeline.root(), &work).unwrap();
        assert_eq!(relocation.relocated, 3);
        assert!(!Checkpoint::exists(&work));
        assert_eq!(relocation.errors.count(ErrorKind::PuidFail), 1);
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::default();
        let policies = Policies::new();
        let tools = ToolRegistry::new();
        let result = Pipeline::new(
            &temp.path().join("absent"),
            &settings,
            &policies,
            &tools,
            &FirstLine,
        );
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }
}
