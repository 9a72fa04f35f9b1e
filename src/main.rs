//! Balance Sweeper - moves an exposed account's funds to a secure wallet
//!
//! # WARNING
//! - Every sweep sends the ENTIRE balance (minus fees) to the target address.
//! - Double-check the target; transfers cannot be reversed.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Use the library crate
use balance_sweeper::cli::{commands, interactive};
use balance_sweeper::config::Config;

/// Balance Sweeper - threshold-triggered EVM balance sweeper
#[derive(Parser)]
#[command(name = "sweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sweeper.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the balance and sweep above the threshold (default)
    Start {
        /// Sweep destination (defaults to the configured target)
        #[arg(long)]
        target: Option<String>,

        /// Threshold in ETH (defaults to sweep.burn_threshold_eth)
        #[arg(long)]
        threshold: Option<String>,
    },

    /// Menu-driven operation
    Interactive,

    /// Show the monitored account's balance
    Balance,

    /// Sweep the balance once
    Burn {
        /// Sweep destination (defaults to the configured target)
        target: Option<String>,

        /// Return once the node accepts the transaction
        #[arg(long)]
        no_wait: bool,
    },

    /// Sweep into several targets in staggered chunks
    Batch {
        /// Destination addresses
        #[arg(required = true)]
        targets: Vec<String>,

        /// Return once the node accepts each transaction
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop everything and sweep at the emergency fee multiplier
    Emergency {
        /// Sweep destination (defaults to the configured target)
        target: Option<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show network and wallet stats
    Stats,

    /// Show current configuration (secrets masked)
    Config,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("balance_sweeper=info".parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.json_logs)?;

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let command = cli.command.unwrap_or(Commands::Start {
        target: None,
        threshold: None,
    });

    if let Commands::Config = command {
        return commands::show_config(&config);
    }

    let app = match commands::App::connect(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match command {
        Commands::Start { target, threshold } => {
            commands::start(&app, target.as_deref(), threshold.as_deref()).await
        }
        Commands::Interactive => interactive::run(&app).await,
        Commands::Balance => commands::balance(&app).await,
        Commands::Burn { target, no_wait } => {
            commands::burn(&app, target.as_deref(), no_wait).await
        }
        Commands::Batch { targets, no_wait } => commands::batch(&app, &targets, no_wait).await,
        Commands::Emergency { target, force } => {
            commands::emergency(&app, target.as_deref(), force).await
        }
        Commands::Stats => commands::stats(&app).await,
        Commands::Config => commands::show_config(&app.config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Shutdown complete");
    Ok(())
}
