pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "h2pc",
    about = "H2PC agent operator CLI",
    long_about = "Inspect agent configuration, run readiness checks, and dry-run prompt templates.",
    after_help = "Examples:\n  h2pc doctor --json\n  h2pc config\n  h2pc render --input batch.jsonl"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, prompt template, and completion backend selection")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Render the configured prompt template against a batch read from a file")]
    Render {
        #[arg(long, help = "JSON array of messages, or one JSON message per line")]
        input: PathBuf,
        #[arg(long, help = "Template path overriding prompt.path")]
        template: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Render { input, template } => commands::render::run(&input, template),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
