// src/commands/policy.rs

//! Policy generation, extension and validation

use super::progress;
use super::resolve_root;
use anyhow::{Context, Result, bail};
use norma::identify;
use norma::pipeline::{PolicyTrial, TrialOutcome};
use norma::policy::{self, DiscoveredFormats, Generated};
use norma::{Pipeline, PolicyError, Policies, Settings, Siegfried, ToolRegistry};
use std::path::{Path, PathBuf};

fn scan_formats(root: &Path, settings: &Settings) -> Result<DiscoveredFormats> {
    let root = resolve_root(root)?;
    let identifier = Siegfried::new(settings.identifier.clone(), settings.tool_timeout());
    let records = identify::discover(&identifier, &root)
        .with_context(|| format!("Cannot identify files below {}", root.display()))?;
    let discovered = policy::discovered_formats(&records);
    println!(
        "Found {} formats in {} files",
        discovered.len(),
        records.len()
    );
    Ok(discovered)
}

fn report_review(generated: &Generated) {
    if generated.needs_review.is_empty() {
        return;
    }
    println!(
        "{} formats have no default and were accepted as is; review them:",
        generated.needs_review.len()
    );
    for id in &generated.needs_review {
        println!("  {}", id);
    }
}

/// Write a policy for the formats found below a directory
pub fn cmd_policy_generate(
    root: &Path,
    output: &Path,
    strict: bool,
    keep_originals: Option<bool>,
    blank: bool,
    settings: &Settings,
) -> Result<()> {
    let discovered = scan_formats(root, settings)?;

    if blank {
        let policies = Policies::blank(&discovered);
        policies.save(output)?;
        println!("Wrote {} blank rules to {}", policies.len(), output.display());
        return Ok(());
    }

    let keep = keep_originals.unwrap_or(settings.keep_originals);
    let generated = Policies::generate_defaults(&discovered, strict || settings.strict, keep);
    generated.policies.save(output)?;
    println!(
        "Wrote {} rules to {}",
        generated.policies.len(),
        output.display()
    );
    report_review(&generated);
    Ok(())
}

/// Add rules for newly found formats to an existing policy file
pub fn cmd_policy_extend(
    root: &Path,
    policy_path: &Path,
    strict: bool,
    settings: &Settings,
) -> Result<()> {
    let tools = ToolRegistry::with_builtin(settings.tool_timeout());
    let existing = Policies::load(policy_path, &tools)
        .with_context(|| format!("Invalid policy file {}", policy_path.display()))?;
    let before = existing.len();

    let discovered = scan_formats(root, settings)?;
    let strict = strict || settings.strict;
    let generated = existing.extend(&discovered, strict, settings.keep_originals);
    generated.policies.save(policy_path)?;

    println!(
        "Added {} rules to {}",
        generated.policies.len() - before,
        policy_path.display()
    );
    report_review(&generated);
    Ok(())
}

/// Validate a policy file and list every problem
pub fn cmd_policy_validate(file: &Path, settings: &Settings) -> Result<()> {
    let tools = ToolRegistry::with_builtin(settings.tool_timeout());
    match Policies::load(file, &tools) {
        Ok(policies) => {
            println!("{}: {} rules, valid", file.display(), policies.len());
            Ok(())
        }
        Err(PolicyError::Invalid(problems)) => {
            for problem in &problems {
                println!("  {}", problem);
            }
            bail!("{} has {} problems", file.display(), problems.len());
        }
        Err(e) => Err(e.into()),
    }
}

fn report_trial(trial: &PolicyTrial, work_dir: &Path) {
    println!(
        "{} ({} files, sample {})",
        trial.format_id,
        trial.files,
        trial.sample.display()
    );
    match &trial.outcome {
        TrialOutcome::Converted {
            output,
            format_id,
            command,
        } => {
            println!("  {}", command);
            println!(
                "  produced {} in {}",
                format_id,
                output.strip_prefix(work_dir).unwrap_or(output).display()
            );
            if let Some(estimate) = trial.estimate() {
                println!(
                    "  converting all files would take about {:.1} min",
                    estimate.as_secs_f64() / 60.0
                );
            }
        }
        TrialOutcome::Failed { kind, command, log } => {
            if !command.is_empty() {
                println!("  {}", command);
            }
            println!("  {}: {}", kind, log);
        }
    }
}

/// Convert one sample per format into the test area
pub fn cmd_policy_test(
    root: &Path,
    policy_path: &Path,
    format: Option<&str>,
    workdir: Option<PathBuf>,
    mut settings: Settings,
    quiet: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    if let Some(dir) = workdir {
        settings.work_dir = Some(dir);
    }
    let tools = ToolRegistry::with_builtin(settings.tool_timeout());
    let policies = Policies::load(policy_path, &tools)
        .with_context(|| format!("Invalid policy file {}", policy_path.display()))?;
    let identifier = Siegfried::new(settings.identifier.clone(), settings.tool_timeout());

    let pipeline = Pipeline::new(&root, &settings, &policies, &tools, &identifier)?
        .with_progress(progress::tracker("test", quiet));
    let trials = pipeline.test_policies(format)?;
    if trials.is_empty() {
        println!("No files below {} need conversion", root.display());
        return Ok(());
    }

    let failed = trials
        .iter()
        .filter(|t| matches!(t.outcome, TrialOutcome::Failed { .. }))
        .count();
    for trial in &trials {
        report_trial(trial, pipeline.work_dir());
    }
    if failed > 0 {
        bail!("{} of {} trial conversions failed", failed, trials.len());
    }
    Ok(())
}
