//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod helpers;
mod login;
mod scrape;
mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

pub use scrape::RunArgs;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Resumable alumni profile harvester")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: discover alumni-harvest.* in the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape profiles for every name in the input file
    Run(RunArgs),

    /// Show checkpoint size and where the next run will resume
    Status,

    /// Print the last checkpointed records as JSON
    Results {
        /// Number of records to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Launch the browser and report whether the session is signed in
    CheckLogin {
        /// Try to sign in with the configured credentials when signed out
        #[arg(long)]
        login: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Run(args) => scrape::cmd_run(settings, args).await,
        Commands::Status => state::cmd_status(&settings).await,
        Commands::Results { limit } => state::cmd_results(&settings, limit).await,
        Commands::CheckLogin { login } => login::cmd_check_login(&settings, login).await,
    }
}
