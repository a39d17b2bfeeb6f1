// src/commands/progress.rs
//! Terminal progress display for pipeline stages

use indicatif::{ProgressBar, ProgressStyle};
use norma::{LogProgress, ProgressTracker, SilentProgress};
use std::io::IsTerminal;

/// Progress bar that restarts for every stage
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} {wide_msg}")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        Self { bar }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.bar.reset();
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn length(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_and_clear();
        println!("{}", message);
    }

    fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

/// Bar on a terminal, log lines otherwise, nothing when quiet
pub fn tracker(name: &str, quiet: bool) -> Box<dyn ProgressTracker> {
    if quiet {
        Box::new(SilentProgress::new())
    } else if std::io::stderr().is_terminal() {
        Box::new(CliProgress::new())
    } else {
        Box::new(LogProgress::new(name))
    }
}
