pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "bitrix-mcp-ctl",
    about = "Bitrix24 MCP operator CLI",
    long_about = "Inspect the tool catalog and effective configuration, and check portal readiness.",
    after_help = "Examples:\n  bitrix-mcp-ctl tools --json\n  bitrix-mcp-ctl config --config bitrix-mcp.toml\n  bitrix-mcp-ctl doctor"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "List every tool the server exposes with its parameters")]
    Tools {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config {
        #[arg(long, help = "Config file to inspect instead of the default locations")]
        config: Option<PathBuf>,
    },
    #[command(about = "Validate config and check that the portal answers through the client")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Tools { json } => commands::tools::run(json),
        Command::Config { config } => commands::config::run(config),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
