//! dirsync CLI
//!
//! Runs differential sync of a directory service into a local replica.
//!
//! # Commands
//!
//! - `run` - Sync continuously until the process is stopped
//! - `once` - Sync until caught up, print a summary, then exit
//! - `token` - Show or reset the stored continuation token
//! - `version` - Show version information

mod commands;
mod http_client;
mod settings;

use clap::{Parser, Subcommand};
use settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Differential directory sync.
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON settings file
    #[arg(global = true, short, long, default_value = "dirsync.json")]
    config: PathBuf,

    /// Tenant domain, overriding the settings file
    #[arg(global = true, short, long)]
    tenant: Option<String>,

    /// Polling interval in seconds, overriding the settings file
    #[arg(global = true, short, long)]
    poll_interval: Option<u64>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync continuously
    Run,

    /// Sync until caught up, then exit
    Once {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Inspect or reset the continuation token
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Print the stored continuation token
    Show,

    /// Delete the stored token so the next sync starts from scratch
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    execute(&cli)
}

fn execute(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Version needs no settings file
    let settings = || -> Result<Settings, settings::SettingsError> {
        Ok(Settings::load(&cli.config)?.with_overrides(cli.tenant.clone(), cli.poll_interval))
    };

    match &cli.command {
        Commands::Run => commands::run::run(&settings()?)?,
        Commands::Once { format } => commands::once::run(&settings()?, format)?,
        Commands::Token { command } => match command {
            TokenCommands::Show => commands::token::show(&settings()?)?,
            TokenCommands::Reset => commands::token::reset(&settings()?)?,
        },
        Commands::Version => {
            println!("dirsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("dirsync engine v{}", dirsync_engine::VERSION);
        }
    }

    Ok(())
}
