// src/cli/tasks.rs
//! Legacy cleanup task commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum TasksCommands {
    /// Apply a task file in order, stopping at the first failure
    Apply {
        /// JSON task file
        file: PathBuf,
    },

    /// Write the pending relocations of a checkpoint as a task file
    Export {
        /// Directory the run processed
        root: PathBuf,

        /// Task file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Working directory (default: <ROOT>.norma)
        #[arg(short, long, value_name = "DIR")]
        workdir: Option<PathBuf>,
    },
}
