use std::path::PathBuf;

use anyhow::{bail, Result};
use astnorm_cli::{check_file, list_rules, normalize_file, summarize, write_document, NormalizeOptions};
use astnorm_core::init_tracing;
use clap::{Arg, ArgAction, ArgMatches, Command};

fn cli() -> Command {
    let input = Arg::new("input")
        .value_name("INPUT")
        .help("Document with the tree and its symbol table (JSON)")
        .required(true)
        .index(1);

    Command::new("astnorm")
        .version(astnorm_core::VERSION)
        .about("Normalizes type-checked Go syntax trees into a canonical subset")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("normalize")
                .about("Run the rule pipeline over a document")
                .arg(input.clone())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("PATH")
                        .help("Write the normalized document here instead of stdout"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("PATH")
                        .help("Pipeline configuration file (JSON)"),
                )
                .arg(
                    Arg::new("disable")
                        .long("disable")
                        .value_name("RULE")
                        .help("Skip a rule; may be repeated")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("verify")
                        .long("verify")
                        .help("Check each rule's post-condition after its pass")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("keep-going")
                        .long("keep-going")
                        .help("Restore and continue after a failed pass")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Report invariant violations without rewriting")
                .arg(input),
        )
        .subcommand(Command::new("rules").about("List rules in default order"))
}

fn normalize_options(matches: &ArgMatches) -> NormalizeOptions {
    NormalizeOptions {
        input: matches
            .get_one::<String>("input")
            .map(PathBuf::from)
            .unwrap_or_default(),
        output: matches.get_one::<String>("output").map(PathBuf::from),
        config: matches.get_one::<String>("config").map(PathBuf::from),
        disable: matches
            .get_many::<String>("disable")
            .map(|names| names.cloned().collect())
            .unwrap_or_default(),
        verify: matches.get_flag("verify"),
        keep_going: matches.get_flag("keep-going"),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    init_tracing();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("normalize", sub)) => {
            let options = normalize_options(sub);
            let (document, report) = normalize_file(&options)?;
            write_document(&document, options.output.as_deref())?;
            eprintln!("{}", summarize(&report));
            if !report.success() {
                bail!("{} pass(es) did not complete", report.failed().count().max(1));
            }
        }
        Some(("check", sub)) => {
            let input = sub
                .get_one::<String>("input")
                .map(PathBuf::from)
                .unwrap_or_default();
            let violations = check_file(&input)?;
            for violation in &violations {
                println!("{}", violation);
            }
            if !violations.is_empty() {
                bail!("{} invariant violation(s)", violations.len());
            }
            println!("{}: normalized", input.display());
        }
        Some(("rules", _)) => print!("{}", list_rules()),
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}
