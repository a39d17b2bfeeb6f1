// src/main.rs

use anyhow::Result;
use clap::Parser;
use norma::Settings;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, PolicyCommands, TasksCommands};

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let settings = Settings::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Process(args) => commands::cmd_process(args, settings, cli.quiet),
        Commands::Relocate { root, workdir } => commands::cmd_relocate(root, workdir, settings),
        Commands::Policy(PolicyCommands::Generate {
            root,
            output,
            strict,
            keep_originals,
            remove_originals,
            blank,
        }) => {
            let keep = if keep_originals {
                Some(true)
            } else if remove_originals {
                Some(false)
            } else {
                None
            };
            commands::cmd_policy_generate(&root, &output, strict, keep, blank, &settings)
        }
        Commands::Policy(PolicyCommands::Extend {
            root,
            policy,
            strict,
        }) => commands::cmd_policy_extend(&root, &policy, strict, &settings),
        Commands::Policy(PolicyCommands::Validate { file }) => {
            commands::cmd_policy_validate(&file, &settings)
        }
        Commands::Policy(PolicyCommands::Test {
            root,
            policy,
            format,
            workdir,
        }) => commands::cmd_policy_test(
            &root,
            &policy,
            format.as_deref(),
            workdir,
            settings,
            cli.quiet,
        ),
        Commands::Tasks(TasksCommands::Apply { file }) => commands::cmd_tasks_apply(&file),
        Commands::Tasks(TasksCommands::Export {
            root,
            output,
            workdir,
        }) => commands::cmd_tasks_export(&root, &output, workdir, &settings),
        Commands::Check => commands::cmd_check(&settings),
    }
}
