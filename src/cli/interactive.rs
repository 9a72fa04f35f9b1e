//! Interactive menu

use anyhow::Result;
use dialoguer::{Confirm, Input, Select};
use tracing::{error, info};

use super::commands::{self, parse_target, report_outcome, App};
use crate::monitor::{MonitorOptions, MonitorSession};
use crate::sweep::BurnOptions;
use crate::units::format_ether;

const MENU: &[&str] = &[
    "Check balance",
    "Execute single burn",
    "Start monitoring",
    "Stop monitoring",
    "Emergency burn all",
    "Network stats",
    "Pending transactions",
    "Exit",
];

/// Blocking prompt run off the async workers
async fn prompt<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

async fn ask_target() -> Result<Option<ethers::types::Address>> {
    let input: String = prompt(|| {
        Input::<String>::new()
            .with_prompt("Target address (empty for default)")
            .allow_empty(true)
            .interact_text()
    })
    .await?;
    let input = input.trim();
    parse_target((!input.is_empty()).then_some(input))
}

/// Run the menu until the operator exits
pub async fn run(app: &App) -> Result<()> {
    let mut session: Option<MonitorSession> = None;

    loop {
        let choice = prompt(|| {
            Select::new()
                .with_prompt("Balance sweeper")
                .items(MENU)
                .default(0)
                .interact()
        })
        .await?;

        let result = match choice {
            0 => commands::balance(app).await,
            1 => single_burn(app).await,
            2 => start_monitoring(app, &mut session).await,
            3 => {
                match session.take() {
                    Some(active) => active.join().await,
                    None => println!("Not monitoring"),
                }
                Ok(())
            }
            4 => emergency(app, session.as_mut()).await,
            5 => commands::stats(app).await,
            6 => commands::pending(app),
            _ => break,
        };

        if let Err(e) = result {
            error!("Command failed: {}", e);
        }
    }

    if let Some(active) = session.take() {
        active.join().await;
    }
    info!("Goodbye");
    Ok(())
}

async fn single_burn(app: &App) -> Result<()> {
    let target = ask_target().await?;
    let wait = prompt(|| {
        Confirm::new()
            .with_prompt("Wait for confirmation?")
            .default(true)
            .interact()
    })
    .await?;

    let outcome = app
        .engine
        .execute_burn(
            target,
            BurnOptions {
                wait_for_confirmation: wait,
            },
        )
        .await?;
    report_outcome(outcome.as_ref());
    Ok(())
}

async fn start_monitoring(app: &App, session: &mut Option<MonitorSession>) -> Result<()> {
    if session.as_ref().is_some_and(|s| s.is_active()) {
        println!("Already monitoring");
        return Ok(());
    }

    let target = ask_target().await?;
    let threshold: String = prompt(|| {
        Input::<String>::new()
            .with_prompt("Threshold in ETH (empty for default)")
            .allow_empty(true)
            .interact_text()
    })
    .await?;
    let threshold = match threshold.trim() {
        "" => None,
        value => Some(crate::units::parse_ether(value)?),
    };

    match app.monitor.start(target, MonitorOptions { threshold })? {
        Some(started) => {
            println!(
                "Monitoring {:?} above {} ETH",
                started.target(),
                format_ether(started.threshold())
            );
            *session = Some(started);
        }
        None => println!("Already monitoring"),
    }
    Ok(())
}

async fn emergency(app: &App, session: Option<&mut MonitorSession>) -> Result<()> {
    let confirmed = prompt(|| {
        Confirm::new()
            .with_prompt("EMERGENCY: sweep everything now at the emergency fee?")
            .default(false)
            .interact()
    })
    .await?;
    if !confirmed {
        println!("Cancelled");
        return Ok(());
    }

    let target = ask_target().await?;
    let outcome = app.emergency.emergency_burn_all(session, target).await?;
    report_outcome(outcome.as_ref());
    Ok(())
}
