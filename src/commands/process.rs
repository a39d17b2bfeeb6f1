// src/commands/process.rs

//! The `process` command: one full pipeline run

use super::progress;
use super::resolve_root;
use crate::cli::ProcessArgs;
use anyhow::{Context, Result, bail};
use norma::{Pipeline, Policies, RunSummary, Settings, Siegfried, ToolRegistry};
use std::path::Path;
use tracing::info;

/// Fold command-line flags into the loaded settings
pub fn apply_flags(settings: &mut Settings, args: &ProcessArgs) {
    if args.integrity {
        settings.integrity_tests = true;
    }
    if args.no_integrity {
        settings.integrity_tests = false;
    }
    if args.no_convert {
        settings.convert = false;
    }
    if args.no_relocate {
        settings.relocate = false;
    }
    if args.strict {
        settings.strict = true;
    }
    if args.remove_originals {
        settings.remove_originals = Some(true);
    }
    if args.keep_originals {
        settings.remove_originals = Some(false);
    }
    if let Some(dir) = &args.workdir {
        settings.work_dir = Some(dir.clone());
    }
}

/// A chain hands each pass's derivatives to the next, so every pass must
/// convert and relocate
pub fn check_chain(settings: &Settings, policies: usize) -> Result<()> {
    if policies > 1 && !(settings.convert && settings.relocate) {
        bail!("Chaining {} policies needs conversion and relocation enabled", policies);
    }
    Ok(())
}

/// Run the pipeline over a directory, once per policy file
pub fn cmd_process(args: ProcessArgs, mut settings: Settings, quiet: bool) -> Result<()> {
    let root = resolve_root(&args.root)?;
    apply_flags(&mut settings, &args);
    check_chain(&settings, args.policy.len())?;

    let tools = ToolRegistry::with_builtin(settings.tool_timeout());
    let chain = args
        .policy
        .iter()
        .map(|path| {
            Policies::load(path, &tools)
                .with_context(|| format!("Invalid policy file {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let identifier = Siegfried::new(settings.identifier.clone(), settings.tool_timeout());

    let mut derived = Vec::new();
    for (path, policies) in args.policy.iter().zip(&chain) {
        let pipeline = Pipeline::new(&root, &settings, policies, &tools, &identifier)?
            .revisiting(derived)
            .with_progress(progress::tracker("process", quiet));
        info!(
            "Processing {} with {} (working directory {})",
            root.display(),
            path.display(),
            pipeline.work_dir().display()
        );

        let summary = pipeline.run()?;
        if !quiet {
            if chain.len() > 1 {
                println!("{}:", path.display());
            }
            print_summary(&summary, pipeline.work_dir());
        }
        derived = summary.derived;
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, work_dir: &Path) {
    if summary.resumed > 0 {
        println!("Resumed:    {} records from an interrupted run", summary.resumed);
    }
    println!("Discovered: {}", summary.discovered);
    println!("Accepted:   {}", summary.accepted);
    println!(
        "Converted:  {} ({} failed)",
        summary.converted, summary.conversion_failed
    );
    if summary.pending > 0 {
        println!("Pending:    {} (conversion disabled)", summary.pending);
    }
    println!("Removed:    {}", summary.removed);
    println!("Skipped:    {}", summary.skipped);
    if summary.ignored > 0 {
        println!("Ignored:    {} system files", summary.ignored);
    }
    println!(
        "Relocated:  {} ({} failed)",
        summary.relocated, summary.relocation_failed
    );
    if summary.errors > 0 {
        println!(
            "{} errors recorded in {}",
            summary.errors,
            work_dir.join(norma::checkpoint::FAILED_FILE).display()
        );
    }
}
