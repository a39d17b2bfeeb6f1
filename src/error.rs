// src/error.rs

//! Crate-wide error type
//!
//! Only failures that must stop a run surface as `Error`. Per-file problems
//! (identification, integrity, conversion, relocation) are recorded as
//! [`ErrorKind`](crate::record::ErrorKind) tags on the record instead.

use crate::checkpoint::CheckpointError;
use crate::policy::PolicyError;
use thiserror::Error;

/// Errors that abort an operation
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Identification failed: {0}")]
    Identification(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;
