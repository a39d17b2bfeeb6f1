// src/tools/runner.rs

//! Blocking execution of external tools
//!
//! Tools run without a shell. Output of both streams is captured; when a
//! timeout is configured the child is killed once it expires, otherwise the
//! call blocks until the tool exits.

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Captured result of one tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolRun {
    /// Human-readable command line, for logs
    pub command_line: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ToolRun {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Render a command line for logging
pub fn command_line<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        let arg = arg.as_ref().to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(&arg);
            line.push('"');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

/// Run a program to completion and capture its output
pub fn run<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    timeout: Option<Duration>,
) -> Result<ToolRun> {
    let line = command_line(program, args);
    debug!("Executing: {}", line);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::ToolNotFound(program.to_string()),
            _ => Error::CommandFailed(format!("Failed to spawn '{}': {}", program, e)),
        })?;

    // Drain both pipes on their own threads so a chatty tool cannot block
    // on a full pipe while we wait for it.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => match child.wait_timeout(limit)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::CommandFailed(format!(
                    "'{}' timed out after {} seconds",
                    line,
                    limit.as_secs()
                )));
            }
        },
    };

    let stdout = stdout_reader.map(join_reader).unwrap_or_default();
    let stderr = stderr_reader.map(join_reader).unwrap_or_default();

    Ok(ToolRun {
        command_line: line,
        stdout,
        stderr,
        exit_code: status.code(),
        success: status.success(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Remove absolute working paths from tool output
///
/// Logs end up in the protocol, which must not depend on where the scan
/// root or scratch area happened to live.
pub fn strip_paths(text: &str, paths: &[&Path]) -> String {
    let mut out = text.to_string();
    let mut needles: Vec<String> = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .collect();
    // Longest first so a scratch dir inside the root is not half-replaced
    needles.sort_by_key(|p| std::cmp::Reverse(p.len()));

    for needle in needles {
        let with_sep = format!("{}{}", needle, std::path::MAIN_SEPARATOR);
        out = out.replace(&with_sep, "").replace(&needle, "");
    }
    out
}
