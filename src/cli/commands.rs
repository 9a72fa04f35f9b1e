//! CLI command implementations

use anyhow::Result;
use dialoguer::Confirm;
use ethers::types::Address;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::batch::{chunk_sizes, BatchScheduler, TargetOutcome};
use crate::config::{parse_address, Config};
use crate::emergency::EmergencyController;
use crate::ledger::{EvmLedger, LedgerClient};
use crate::monitor::{MonitorLoop, MonitorOptions};
use crate::sweep::{BurnOptions, BurnOutcome, SweepEngine};
use crate::units::{format_ether, format_gwei, parse_ether};

/// Wired-up sweeper components
pub struct App {
    pub config: Config,
    pub engine: Arc<SweepEngine>,
    pub monitor: MonitorLoop,
    pub batch: BatchScheduler,
    pub emergency: EmergencyController,
}

impl App {
    /// Connect to the configured node and build every component
    pub async fn connect(config: Config) -> Result<Self> {
        info!("Connecting to network...");
        let ledger = EvmLedger::connect(&config.network, config.wallet.private_key.as_deref()).await?;
        let ledger: Arc<dyn LedgerClient> = Arc::new(ledger);
        Ok(Self::with_ledger(config, ledger)?)
    }

    pub fn with_ledger(config: Config, ledger: Arc<dyn LedgerClient>) -> crate::Result<Self> {
        let engine = Arc::new(SweepEngine::new(
            ledger,
            &config.fee_config()?,
            config.sweep_config()?,
        ));
        let monitor = MonitorLoop::new(engine.clone(), config.monitor_config()?);
        let batch = BatchScheduler::new(engine.clone(), config.batch_config());
        let emergency = EmergencyController::new(engine.clone(), config.emergency_config());

        Ok(Self {
            config,
            engine,
            monitor,
            batch,
            emergency,
        })
    }
}

/// Optional address argument
pub(crate) fn parse_target(target: Option<&str>) -> Result<Option<Address>> {
    Ok(target.map(parse_address).transpose()?)
}

/// Print what a sweep did
pub(crate) fn report_outcome(outcome: Option<&BurnOutcome>) {
    match outcome {
        None => println!("Balance too low to burn"),
        Some(BurnOutcome::Submitted {
            transaction,
            handle,
        }) => {
            println!("\nTransaction sent: {:?}", handle.tx_hash);
            println!("Amount:    {} ETH", format_ether(transaction.value));
            println!("Gas price: {} gwei", format_gwei(transaction.gas_price));
            println!("Nonce:     {}", transaction.nonce);
        }
        Some(BurnOutcome::Confirmed {
            transaction,
            receipt,
        }) => {
            println!("\nTransaction confirmed: {:?}", receipt.tx_hash);
            println!("Amount:    {} ETH", format_ether(transaction.value));
            println!("Block:     {}", receipt.block_number);
            println!("Gas used:  {}", receipt.gas_used);
        }
    }
}

/// Monitor until Ctrl-C / SIGTERM
pub async fn start(app: &App, target: Option<&str>, threshold: Option<&str>) -> Result<()> {
    let target = parse_target(target)?;
    let threshold = threshold.map(parse_ether).transpose()?;

    let session = app
        .monitor
        .start(target, MonitorOptions { threshold })?
        .ok_or_else(|| anyhow::anyhow!("Monitoring is already active"))?;

    println!("\nMonitoring balance");
    println!("Target:    {:?}", session.target());
    println!("Threshold: {} ETH", format_ether(session.threshold()));
    println!("Press Ctrl-C to stop\n");

    shutdown_signal().await;
    info!("Received shutdown signal");

    let status = session.status();
    session.join().await;
    info!(
        cycles = status.cycles,
        sweeps = status.sweeps_triggered,
        pending = app.engine.pending().len(),
        "Sweeper stopped"
    );

    Ok(())
}

/// Show the signer's balance
pub async fn balance(app: &App) -> Result<()> {
    let account = app.engine.account()?;
    let balance = app.engine.balance().await?;
    println!("\nAccount: {:?}", account);
    println!("Balance: {} ETH", format_ether(balance));
    Ok(())
}

/// Sweep once
pub async fn burn(app: &App, target: Option<&str>, no_wait: bool) -> Result<()> {
    let target = parse_target(target)?;
    let options = BurnOptions {
        wait_for_confirmation: !no_wait,
    };

    let outcome = app.engine.execute_burn(target, options).await?;
    report_outcome(outcome.as_ref());
    Ok(())
}

/// Sweep into several targets
pub async fn batch(app: &App, targets: &[String], no_wait: bool) -> Result<()> {
    let targets = targets
        .iter()
        .map(|t| parse_address(t))
        .collect::<crate::Result<Vec<_>>>()?;
    if targets.is_empty() {
        anyhow::bail!("No targets given");
    }

    let chunks = chunk_sizes(targets.len(), app.config.batch.batch_size);
    info!(targets = targets.len(), chunks = ?chunks, "Batch plan");

    let options = BurnOptions {
        wait_for_confirmation: !no_wait,
    };
    let results = app.batch.batch_burn(&targets, options).await;

    println!("\n=== BATCH RESULTS ===\n");
    for result in &results {
        match result {
            TargetOutcome::Swept {
                target,
                chunk,
                outcome,
            } => match outcome {
                Some(outcome) => println!(
                    "[chunk {}] {:?}: {} ({} ETH)",
                    chunk,
                    target,
                    if outcome.is_confirmed() { "confirmed" } else { "sent" },
                    format_ether(outcome.transaction().value)
                ),
                None => println!("[chunk {}] {:?}: skipped (balance too low)", chunk, target),
            },
            TargetOutcome::Failed {
                target,
                chunk,
                reason,
            } => println!("[chunk {}] {:?}: FAILED {}", chunk, target, reason),
        }
    }

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        warn!(failed, "Some batch targets failed");
    }
    Ok(())
}

/// Emergency sweep at the elevated multiplier
pub async fn emergency(app: &App, target: Option<&str>, force: bool) -> Result<()> {
    let target = parse_target(target)?;

    if !force {
        let confirmed = Confirm::new()
            .with_prompt("Sweep the entire balance now at the emergency fee? This cannot be undone.")
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Emergency burn cancelled by user");
            return Ok(());
        }
    }

    let outcome = app.emergency.emergency_burn_all(None, target).await?;
    report_outcome(outcome.as_ref());
    Ok(())
}

/// Network and wallet summary
pub async fn stats(app: &App) -> Result<()> {
    let stats = app.engine.network_stats().await?;
    println!("\n=== NETWORK STATS ===\n");
    println!("{}", stats);
    println!("Pending:       {}", app.engine.pending().len());
    Ok(())
}

/// List tracked pending transactions
pub fn pending(app: &App) -> Result<()> {
    let snapshot = app.engine.pending().snapshot();
    if snapshot.is_empty() {
        println!("No pending transactions");
        return Ok(());
    }

    println!("\n=== PENDING TRANSACTIONS ===\n");
    for item in snapshot {
        println!(
            "{:?}  {} ETH -> {:?}  nonce {}  age {}s",
            item.tx_hash,
            format_ether(item.entry.amount),
            item.entry.target,
            item.entry.nonce,
            item.age.num_seconds()
        );
    }
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
}
