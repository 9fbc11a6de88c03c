//! sweepgate - balance-gated Solana workflow controller
//!
//! # WARNING
//! - `transfer` moves the wallet's entire balance (minus a small fee buffer)
//!   to the configured destination. Transfers cannot be undone.
//! - `simulate` is cosmetic only and never touches the ledger.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

// Use the library crate
use sweepgate::cli::commands;
use sweepgate::config::Config;
use sweepgate::ledger::{check_keypair_file, keypair_path_from_env};

/// Balance-gated workflow controller
#[derive(Parser)]
#[command(name = "sweepgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sweepgate.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wallet balance once
    Balance,

    /// Poll the wallet balance until interrupted
    Watch,

    /// Run the eligibility gate and the simulated stage sequence (no funds move)
    Simulate {
        /// Destination address to validate
        #[arg(long)]
        destination: String,

        /// Amount in SOL
        #[arg(long)]
        amount: String,
    },

    /// Sweep the wallet balance to the configured destination
    Transfer {
        /// Sign without the confirmation prompt
        #[arg(long)]
        force: bool,

        /// Compute the transfer amount only, don't sign or send
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sweepgate=info".parse()?),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Everything except `config` signs or reads as the wallet
    if !matches!(cli.command, Commands::Config) {
        if let Err(e) = startup_checks() {
            error!("Startup checks failed: {}", e);
            std::process::exit(1);
        }
    }

    // Execute command
    let result = match cli.command {
        Commands::Balance => commands::balance(&config).await,
        Commands::Watch => commands::watch(&config).await,
        Commands::Simulate {
            destination,
            amount,
        } => commands::simulate(&config, &destination, &amount).await,
        Commands::Transfer { force, dry_run } => {
            commands::transfer(&config, force, dry_run).await
        }
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Perform startup safety checks
fn startup_checks() -> Result<()> {
    info!("Performing startup checks...");

    let keypair_path = keypair_path_from_env()?;
    check_keypair_file(&keypair_path)?;

    info!("Startup checks passed");
    Ok(())
}
