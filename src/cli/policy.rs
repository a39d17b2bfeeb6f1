// src/cli/policy.rs
//! Policy file commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Write a policy for the formats found below ROOT
    Generate {
        /// Directory to scan
        root: PathBuf,

        /// Policy file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Leave formats without a built-in default out of the policy
        #[arg(long)]
        strict: bool,

        /// Generated conversion rules keep the original
        #[arg(long, conflicts_with = "remove_originals")]
        keep_originals: bool,

        /// Generated conversion rules delete the original
        #[arg(long)]
        remove_originals: bool,

        /// Accept every format as is (blank rules only)
        #[arg(long, conflicts_with = "strict")]
        blank: bool,
    },

    /// Add rules for formats found below ROOT that the policy lacks
    Extend {
        /// Directory to scan
        root: PathBuf,

        /// Policy file to update in place
        #[arg(short, long, value_name = "FILE")]
        policy: PathBuf,

        /// Leave formats without a built-in default out of the policy
        #[arg(long)]
        strict: bool,
    },

    /// Validate a policy file without processing anything
    Validate {
        /// Policy file
        file: PathBuf,
    },

    /// Convert the smallest file of each format the policy would convert
    ///
    /// Outputs land in the test area of the working directory; originals,
    /// checkpoint and protocol are left alone.
    Test {
        /// Directory to sample
        root: PathBuf,

        /// Policy file
        #[arg(short, long, value_name = "FILE")]
        policy: PathBuf,

        /// Only test this format id
        #[arg(long, value_name = "ID")]
        format: Option<String>,

        /// Working directory (default: <ROOT>.norma)
        #[arg(short, long, value_name = "DIR")]
        workdir: Option<PathBuf>,
    },
}
