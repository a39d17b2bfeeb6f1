// src/lib.rs

//! Norma: policy-driven normalization for digital preservation
//!
//! Identifies every file below a directory, decides per a declarative policy
//! whether to accept, remove or convert it, runs the converters, verifies
//! what they produced and moves the results into place.
//!
//! # Architecture
//!
//! - Records: one `FileRecord` per file, carrying its full history and lineage
//! - Policies: a JSON table keyed by format id, validated before any file I/O
//! - Tools: external probers and converters behind one `ExternalTool` trait
//! - Stages: discover, triage, convert, checkpoint, relocate, each returning
//!   its output by value
//! - Bookkeeping: checkpoint and protocol are JSON files with a `.sha256`
//!   companion, so tampering or truncation stops a resume

pub mod checkpoint;
pub mod config;
pub mod convert;
pub mod decision;
mod error;
pub mod hash;
pub mod identify;
pub mod inspect;
pub mod lock;
pub mod pipeline;
pub mod policy;
pub mod progress;
pub mod record;
pub mod relocate;
pub mod tools;

pub use checkpoint::{Checkpoint, CheckpointError, ErrorTable, HashedJson, Protocol};
pub use config::Settings;
pub use error::{Error, Result};
pub use identify::{Identifier, Siegfried};
pub use pipeline::{Pipeline, PolicyTrial, RunSummary, relocate_checkpoint};
pub use policy::{PolicyError, PolicyRule, Policies};
pub use progress::{LogProgress, ProgressTracker, SilentProgress};
pub use record::{ErrorKind, FileRecord, RecordStatus};
pub use tools::{ExternalTool, ToolRegistry};
