// src/commands/check.rs

//! The `check` command: are the external tools installed?

use anyhow::{Result, bail};
use norma::{Settings, ToolRegistry};

pub fn cmd_check(settings: &Settings) -> Result<()> {
    let tools = ToolRegistry::with_builtin(settings.tool_timeout());
    let mut missing = tools.missing_binaries();
    if which::which(&settings.identifier).is_err() {
        missing.push(settings.identifier.clone());
    }

    for name in tools.names() {
        println!("tool {}", name);
    }
    if missing.is_empty() {
        println!("All external programs found.");
        return Ok(());
    }
    for bin in &missing {
        println!("missing: {}", bin);
    }
    bail!("{} external programs are missing", missing.len());
}
