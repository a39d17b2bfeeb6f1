// src/cli/mod.rs
//! CLI definitions for norma
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `process` - Run the full pipeline over a directory
//! - `relocate` - Finish an interrupted or held-back run from its checkpoint
//! - `policy` - Generate, extend, validate and test policy files
//! - `tasks` - Legacy cleanup task files
//! - `check` - Report missing external tools

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod policy;
mod tasks;

pub use policy::PolicyCommands;
pub use tasks::TasksCommands;

#[derive(Parser)]
#[command(name = "norma")]
#[command(author = "Norma Contributors")]
#[command(version)]
#[command(
    about = "Policy-driven normalization pipeline for digital preservation",
    long_about = None
)]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: <config dir>/norma/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify, triage, convert and relocate every file below ROOT
    Process(ProcessArgs),

    /// Relocate the records left in the checkpoint of an earlier run
    Relocate {
        /// Directory the earlier run processed
        root: PathBuf,

        /// Working directory (default: <ROOT>.norma)
        #[arg(short, long, value_name = "DIR")]
        workdir: Option<PathBuf>,
    },

    /// Policy file management
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Legacy cleanup task files
    #[command(subcommand)]
    Tasks(TasksCommands),

    /// Check that the external tools are installed
    Check,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Directory to process
    pub root: PathBuf,

    /// Policy file; repeat to apply several policies one after another,
    /// each to the derivatives of the one before
    #[arg(short, long, value_name = "FILE", required = true)]
    pub policy: Vec<PathBuf>,

    /// Run integrity tests (on unless disabled in the settings file)
    #[arg(long, conflicts_with = "no_integrity")]
    pub integrity: bool,

    /// Skip integrity tests
    #[arg(long)]
    pub no_integrity: bool,

    /// Stop after triage; files to convert stay pending
    #[arg(long)]
    pub no_convert: bool,

    /// Stop before relocation; the checkpoint is kept for `norma relocate`
    #[arg(long)]
    pub no_relocate: bool,

    /// Remove files whose format has no rule instead of skipping them
    #[arg(long)]
    pub strict: bool,

    /// Delete every original after its conversion was relocated
    #[arg(long, conflicts_with = "keep_originals")]
    pub remove_originals: bool,

    /// Keep every original, whatever the rules say
    #[arg(long)]
    pub keep_originals: bool,

    /// Working directory (default: <ROOT>.norma)
    #[arg(short, long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,
}
