// src/convert/mod.rs

//! Conversion coordinator
//!
//! Runs the converter a policy rule names inside a scratch directory of its
//! own, re-identifies the output and either promotes it to a derived record
//! or reports why not. There are exactly two outcomes; the source record is
//! never modified by a failed conversion.

use crate::identify::{self, Identifier};
use crate::policy::PolicyRule;
use crate::record::{CleanupTask, ErrorKind, FileRecord, RecordStatus};
use crate::tools::{ConversionRequest, ToolRegistry, strip_paths};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Shared inputs of every conversion in a run
pub struct ConversionContext<'a> {
    pub root: &'a Path,
    pub work_dir: &'a Path,
    pub tools: &'a ToolRegistry,
    pub identifier: &'a dyn Identifier,
    /// Global override of the rules' `remove_original`
    pub remove_originals: Option<bool>,
}

/// Result of converting one record
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Converted {
        derived: FileRecord,
        command: String,
    },
    Failed {
        original: FileRecord,
        kind: ErrorKind,
        command: String,
        log: String,
    },
}

impl ConversionOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }
}

/// Scratch directory for a record:
/// `<work_dir>/scratch/<relative dir>/<file name>_<hash6>`
///
/// Mirroring the relative path keeps two sources apart even when they share
/// stem and content.
pub fn scratch_dir(work_dir: &Path, record: &FileRecord) -> PathBuf {
    let name = record
        .relative_path
        .file_name()
        .or_else(|| record.path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = record.relative_path.parent().unwrap_or(Path::new(""));
    work_dir
        .join("scratch")
        .join(parent)
        .join(format!("{}_{}", name, record.hash_prefix()))
}

/// Where the converter is expected to write its output
pub fn expected_output(scratch: &Path, record: &FileRecord, target_container: &str) -> PathBuf {
    let stem = record
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    scratch.join(format!("{}.{}", stem, target_container))
}

fn failed(
    original: FileRecord,
    kind: ErrorKind,
    command: String,
    log: String,
) -> ConversionOutcome {
    ConversionOutcome::Failed {
        original,
        kind,
        command,
        log,
    }
}

/// Convert one record according to its rule
pub fn convert(
    record: FileRecord,
    rule: &PolicyRule,
    ctx: &ConversionContext<'_>,
) -> ConversionOutcome {
    let Some(target_container) = rule.target_container.as_deref() else {
        let log = "rule has no target container".to_string();
        return failed(record, ErrorKind::ConvFailed, String::new(), log);
    };
    let Some(tool) = ctx.tools.get(&rule.bin) else {
        let log = format!("no converter registered as '{}'", rule.bin);
        return failed(record, ErrorKind::ConvFailed, String::new(), log);
    };

    let scratch = scratch_dir(ctx.work_dir, &record);
    let output = expected_output(&scratch, &record, target_container);
    if let Err(e) = fs::create_dir_all(&scratch) {
        let log = format!("cannot create scratch directory: {}", e);
        return failed(record, ErrorKind::ConvFailed, String::new(), log);
    }
    // Leftover from an earlier attempt must not pass as fresh output
    if let Err(e) = fs::remove_file(&output) {
        if e.kind() != io::ErrorKind::NotFound {
            let log = format!("cannot remove stale output {}: {}", output.display(), e);
            return failed(record, ErrorKind::ConvFailed, String::new(), log);
        }
    }

    let request = ConversionRequest {
        input: &record.path,
        output: &output,
        scratch_dir: &scratch,
        target_container,
        args: rule.args(),
    };
    info!("Converting {} with {}", record.relative_path.display(), rule.bin);

    let source_dir = record.path.parent().unwrap_or(ctx.root).to_path_buf();
    let strip = [scratch.as_path(), source_dir.as_path(), ctx.root];
    let (command, log) = match tool.convert(&request) {
        Ok(run) => (
            strip_paths(&run.command_line, &strip),
            strip_paths(run.combined().trim(), &strip),
        ),
        Err(e) => {
            warn!("{} failed on {}: {}", rule.bin, record.path.display(), e);
            (String::new(), strip_paths(&e.to_string(), &strip))
        }
    };

    if !output.is_file() {
        debug!("Expected output {} is missing", output.display());
        return failed(record, ErrorKind::ConvFailed, command, log);
    }

    let mut derived = match identify::identify_file(ctx.identifier, ctx.root, &output) {
        Ok(derived) => derived,
        Err(e) => {
            let log = format!("{}\ncannot identify output: {}", log, e);
            let log = log.trim().to_string();
            return failed(record, ErrorKind::ConvFailed, command, log);
        }
    };

    let produced = derived.format_id.clone().unwrap_or_default();
    if !rule.expects(&produced) {
        info!(
            "{}: output identified as '{}', expected one of {:?}",
            record.relative_path.display(),
            produced,
            rule.expected.as_deref().unwrap_or_default()
        );
        let log = format!("{}\noutput identified as '{}'", log, produced);
        let log = log.trim().to_string();
        return failed(record, ErrorKind::NotExpectedFmt, command, log);
    }

    let output_name = output
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_default();
    let relative_path = record.relative_path.with_file_name(&output_name);
    let delete_original = ctx.remove_originals.unwrap_or(rule.removes_original());

    if !command.is_empty() {
        derived.log(&rule.bin, format!("command: {}", command));
    }
    if !log.is_empty() {
        derived.log(&rule.bin, log);
    }

    derived.relative_path = relative_path.clone();
    derived.added = true;
    derived.status = RecordStatus::Converted;
    derived.destination = Some(source_dir.clone());
    derived.cleanup = Some(CleanupTask {
        source: output.clone(),
        destination: source_dir,
        scratch_dir: scratch,
        relative_path,
        hash: derived.hash.clone(),
        delete_original,
        original: record.path.clone(),
    });
    derived.derived_from = Some(Box::new(record.relativized(ctx.root)));

    ConversionOutcome::Converted { derived, command }
}
