// src/decision/mod.rs

//! Decision engine
//!
//! Turns an identified record, its integrity report and the policy into one
//! [`Action`]. [`decide`] only reads; the `apply_*` functions carry out the
//! file-level side effects (in-place rename, move to the removed area) and
//! record their failures on the record instead of aborting.
//!
//! Rule order:
//!
//! 1. no format id: remove (`PUIDFAIL`)
//! 2. operating-system artifact: ignore, before any policy lookup
//! 3. fatal integrity result: remove (`INTEGRITY`)
//! 4. format not in policy: remove (`NOTINPOLICIES`) when strict, else skip
//! 5. extension mismatch: plan a rename when exactly one extension fits
//! 6. accepted and codec requirement met: accept as is
//! 7. anything else: convert

use crate::hash;
use crate::identify::is_extension_mismatch;
use crate::inspect::IntegrityReport;
use crate::policy::{FormatRegistry, Policies};
use crate::record::{ErrorKind, FileRecord, RecordStatus};
use crate::relocate::move_file;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SOURCE: &str = "filehandler";

/// Read-only inputs shared by every decision
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub strict: bool,
    /// Format ids of operating-system artifacts
    pub system_formats: &'a [String],
    pub formats: &'a FormatRegistry,
}

/// What happens to a record next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignore,
    Remove(ErrorKind),
    Skip,
    Accept,
    Convert,
}

/// In-place rename fixing a wrong extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub from: PathBuf,
    /// Desired name; the collision rule is applied when the plan runs
    pub to: PathBuf,
}

/// Outcome of [`decide`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub rename: Option<RenamePlan>,
    /// Log lines to append to the record
    pub notes: Vec<String>,
}

impl Decision {
    fn new(action: Action) -> Self {
        Self {
            action,
            rename: None,
            notes: Vec::new(),
        }
    }
}

/// Decide what to do with an identified record
pub fn decide(
    record: &FileRecord,
    policies: &Policies,
    integrity: &IntegrityReport,
    ctx: &DecisionContext<'_>,
) -> Decision {
    let Some(format_id) = record.format_id.as_deref() else {
        return Decision::new(Action::Remove(ErrorKind::PuidFail));
    };

    if ctx.system_formats.iter().any(|f| f == format_id) {
        return Decision::new(Action::Ignore);
    }

    if integrity.fatal {
        return Decision::new(Action::Remove(ErrorKind::Integrity));
    }

    let Some(rule) = policies.get(format_id) else {
        if ctx.strict {
            return Decision::new(Action::Remove(ErrorKind::NotInPolicies));
        }
        let mut decision = Decision::new(Action::Skip);
        decision
            .notes
            .push(format!("SKIPPED: {} is not in the policies", format_id));
        return decision;
    };

    let mut decision = Decision::new(Action::Accept);

    if record.top_match().is_some_and(is_extension_mismatch) {
        match ctx.formats.canonical_extension(format_id) {
            Some(ext) => {
                decision.rename = Some(RenamePlan {
                    from: record.path.clone(),
                    to: record.path.with_extension(ext),
                });
            }
            None => decision.notes.push(format!(
                "extension mismatch for {}; several or no extensions possible, review manually",
                format_id
            )),
        }
    }

    if !rule.accepted {
        decision.action = Action::Convert;
        return decision;
    }

    if let Some(required) = &rule.codecs {
        match record.media_info_for("ffprobe").map(|m| m.codec_pair()) {
            Some((video, audio)) => {
                if !required.is_satisfied_by(video.as_deref(), audio.as_deref()) {
                    decision.notes.push(format!(
                        "codecs {}/{} do not match the required pair, converting",
                        video.as_deref().unwrap_or("none"),
                        audio.as_deref().unwrap_or("none")
                    ));
                    decision.action = Action::Convert;
                }
            }
            None => decision
                .notes
                .push("no stream information available, codec check skipped".to_string()),
        }
    }

    decision
}

/// Rename a record's file in place per plan
///
/// A rename that fails leaves the record at its old path with a
/// `RENAMEFAILED` entry; returns whether the file moved.
pub fn apply_rename(record: &mut FileRecord, plan: &RenamePlan, root: &Path) -> bool {
    if plan.to == plan.from {
        return true;
    }
    let target = hash::resolve_collision(&plan.to, &record.hash);

    match std::fs::rename(&plan.from, &target) {
        Ok(()) => {
            debug!("Renamed {} -> {}", plan.from.display(), target.display());
            record.log(
                SOURCE,
                format!(
                    "renamed {} to {}",
                    file_name(&plan.from),
                    file_name(&target)
                ),
            );
            if let Ok(rel) = target.strip_prefix(root) {
                record.relative_path = rel.to_path_buf();
            } else {
                record.relative_path.set_file_name(file_name(&target));
            }
            record.path = target;
            true
        }
        Err(e) => {
            warn!("Cannot rename {}: {}", plan.from.display(), e);
            record.log_error(
                ErrorKind::RenameFailed,
                SOURCE,
                format!("rename to {} failed: {}", file_name(&target), e),
            );
            false
        }
    }
}

/// Move a record's file into the removed area and mark it removed
///
/// The file keeps its relative position below `removed_dir`. A failed move
/// is logged as `MOVEFAILED`; the record counts as removed either way.
pub fn apply_removal(record: &mut FileRecord, kind: ErrorKind, removed_dir: &Path) {
    if !record.error_kinds().contains(&kind) {
        let message = match kind {
            ErrorKind::NotInPolicies => {
                "NOTINPOLICIES: format is not in the policies (strict mode)"
            }
            ErrorKind::PuidFail => "no format id could be determined",
            _ => "file removed",
        };
        record.log_error(kind, SOURCE, message);
    }

    let target = hash::resolve_collision(&removed_dir.join(&record.relative_path), &record.hash);
    match move_file(&record.path, &target) {
        Ok(()) => {
            debug!("Moved {} to {}", record.path.display(), target.display());
            record.path = target;
        }
        Err(e) => {
            warn!("Cannot move {} to removed area: {}", record.path.display(), e);
            record.log_error(
                ErrorKind::MoveFailed,
                SOURCE,
                format!("move to removed area failed: {}", e),
            );
        }
    }
    record.mark_removed();
}

/// Status a record takes on for an action
pub fn status_for(action: Action) -> RecordStatus {
    match action {
        Action::Ignore => RecordStatus::Ignored,
        Action::Remove(_) => RecordStatus::Removed,
        Action::Skip => RecordStatus::Skipped,
        Action::Accept => RecordStatus::AcceptedAsIs,
        Action::Convert => RecordStatus::PendingConversion,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
