// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: scan root
fn root_arg() -> Arg {
    Arg::new("root")
        .required(true)
        .value_name("ROOT")
        .help("Directory to process")
}

/// Common argument: working directory
fn workdir_arg() -> Arg {
    Arg::new("workdir")
        .short('w')
        .long("workdir")
        .value_name("DIR")
        .help("Working directory (default: <ROOT>.norma)")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("norma")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Norma Contributors")
        .about("Policy-driven normalization pipeline for digital preservation")
        .arg(flag("verbose", "Show debug output").short('v'))
        .arg(flag("quiet", "Only show warnings and errors").short('q'))
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Settings file (default: <config dir>/norma/config.toml)"),
        )
        .subcommand(
            Command::new("process")
                .about("Identify, triage, convert and relocate every file below ROOT")
                .arg(root_arg())
                .arg(
                    Arg::new("policy")
                        .short('p')
                        .long("policy")
                        .required(true)
                        .action(ArgAction::Append)
                        .value_name("FILE")
                        .help("Policy file; repeat to chain policies"),
                )
                .arg(flag("integrity", "Run integrity tests"))
                .arg(flag("no-integrity", "Skip integrity tests"))
                .arg(flag("no-convert", "Stop after triage"))
                .arg(flag("no-relocate", "Stop before relocation"))
                .arg(flag("strict", "Remove files whose format has no rule"))
                .arg(flag("remove-originals", "Delete every converted original"))
                .arg(flag("keep-originals", "Keep every converted original"))
                .arg(workdir_arg()),
        )
        .subcommand(
            Command::new("relocate")
                .about("Relocate the records left in the checkpoint of an earlier run")
                .arg(root_arg())
                .arg(workdir_arg()),
        )
        .subcommand(
            Command::new("policy")
                .about("Policy file management")
                .subcommand(
                    Command::new("generate")
                        .about("Write a policy for the formats found below ROOT")
                        .arg(root_arg())
                        .arg(
                            Arg::new("output")
                                .short('o')
                                .long("output")
                                .required(true)
                                .value_name("FILE"),
                        )
                        .arg(flag("strict", "Leave formats without a default out"))
                        .arg(flag("keep-originals", "Generated rules keep the original"))
                        .arg(flag("remove-originals", "Generated rules delete the original"))
                        .arg(flag("blank", "Accept every format as is")),
                )
                .subcommand(
                    Command::new("extend")
                        .about("Add rules for formats the policy lacks")
                        .arg(root_arg())
                        .arg(
                            Arg::new("policy")
                                .short('p')
                                .long("policy")
                                .required(true)
                                .value_name("FILE"),
                        )
                        .arg(flag("strict", "Leave formats without a default out")),
                )
                .subcommand(
                    Command::new("validate")
                        .about("Validate a policy file")
                        .arg(Arg::new("file").required(true).value_name("FILE")),
                )
                .subcommand(
                    Command::new("test")
                        .about("Convert one sample per format into the test area")
                        .arg(root_arg())
                        .arg(
                            Arg::new("policy")
                                .short('p')
                                .long("policy")
                                .required(true)
                                .value_name("FILE"),
                        )
                        .arg(
                            Arg::new("format")
                                .long("format")
                                .value_name("ID")
                                .help("Only test this format id"),
                        )
                        .arg(workdir_arg()),
                ),
        )
        .subcommand(
            Command::new("tasks")
                .about("Legacy cleanup task files")
                .subcommand(
                    Command::new("apply")
                        .about("Apply a task file in order")
                        .arg(Arg::new("file").required(true).value_name("FILE")),
                )
                .subcommand(
                    Command::new("export")
                        .about("Write the pending relocations of a checkpoint as tasks")
                        .arg(root_arg())
                        .arg(
                            Arg::new("output")
                                .short('o')
                                .long("output")
                                .required(true)
                                .value_name("FILE"),
                        )
                        .arg(workdir_arg()),
                ),
        )
        .subcommand(Command::new("check").about("Check that the external tools are installed"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("norma.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
