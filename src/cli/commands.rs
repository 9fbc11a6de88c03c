//! CLI command implementations

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use solana_sdk::native_token::lamports_to_sol;
use solana_sdk::signature::{Keypair, Signer};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::display::{format_balance, format_sol, render_notification, shorten};
use crate::config::Config;
use crate::executor::TransferExecutor;
use crate::ledger::{keypair_path_from_env, KeypairSigner, LedgerClient, RpcLedger, TransactionSigner};
use crate::simulator::{SimulationOutcome, StageSimulator};
use crate::status::Notification;
use crate::workflow::{Controller, ControllerConfig};

/// Load the signing keypair from `KEYPAIR_PATH`
pub fn load_keypair() -> Result<Keypair> {
    let keypair_path = keypair_path_from_env()?;
    KeypairSigner::load_keypair(&keypair_path).context("Failed to load keypair")
}

fn build_ledger(config: &Config) -> Arc<RpcLedger> {
    Arc::new(RpcLedger::new(
        &config.rpc,
        config.transfer.confirm_poll_interval(),
        config.transfer.confirm_timeout(),
    ))
}

/// Build a controller without transfer capability
fn build_controller(
    config: &Config,
    ledger: Arc<RpcLedger>,
) -> (Controller, mpsc::UnboundedReceiver<Notification>) {
    let controller_config = ControllerConfig {
        poll_interval: config.monitor.poll_interval(),
        gate: config.gate.policy(),
    };

    Controller::new(
        ledger,
        StageSimulator::new(config.simulator.plan()),
        controller_config,
    )
}

/// Print notifications until the channel closes
fn spawn_printer(mut notifications: mpsc::UnboundedReceiver<Notification>) {
    tokio::spawn(async move {
        while let Some(n) = notifications.recv().await {
            if let Some(line) = render_notification(&n) {
                println!("{}", line);
            }
        }
    });
}

/// Wait for the first balance poll to land (or the RPC timeout)
async fn await_first_poll(controller: &Controller, config: &Config) {
    let mut balance_rx = controller.session().subscribe_balance();
    if balance_rx.borrow_and_update().is_known() {
        return;
    }
    let timeout = Duration::from_millis(config.rpc.timeout_ms);
    if tokio::time::timeout(timeout, balance_rx.changed()).await.is_err() {
        warn!("No balance reading within {}ms", config.rpc.timeout_ms);
    }
}

/// Show the balance of the configured wallet once
pub async fn balance(config: &Config) -> Result<()> {
    let keypair = load_keypair()?;
    let ledger = build_ledger(config);

    let lamports = ledger
        .get_balance(&keypair.pubkey())
        .await
        .map_err(|e| anyhow::anyhow!("Balance query failed: {}", e))?;

    println!("\n=== BALANCE ===\n");
    println!("Account: {}", keypair.pubkey());
    println!("Balance: {}", format_sol(lamports_to_sol(lamports)));
    println!("Lamports: {}", lamports);
    println!(
        "Eligible: {}",
        if lamports_to_sol(lamports) >= config.gate.min_balance_sol {
            "yes"
        } else {
            "no"
        }
    );

    Ok(())
}

/// Watch the wallet balance until interrupted
pub async fn watch(config: &Config) -> Result<()> {
    let keypair = load_keypair()?;
    let account = keypair.pubkey();
    let ledger = build_ledger(config);

    let (mut controller, notifications) = build_controller(config, ledger);
    spawn_printer(notifications);

    controller.connect(account)?;
    let mut balance_rx = controller.session().subscribe_balance();

    println!(
        "Watching {} every {}s (Ctrl+C to stop)",
        shorten(&account.to_string(), 4, 4),
        config.monitor.poll_interval_secs
    );

    loop {
        tokio::select! {
            changed = balance_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let balance = *balance_rx.borrow_and_update();
                println!("{}  {}", chrono::Local::now().format("%H:%M:%S"), format_balance(&balance));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    controller.teardown();
    Ok(())
}

/// Run the eligibility gate and the simulated stage sequence
pub async fn simulate(config: &Config, destination: &str, amount: &str) -> Result<()> {
    let keypair = load_keypair()?;
    let account = keypair.pubkey();
    let ledger = build_ledger(config);

    let (mut controller, notifications) = build_controller(config, ledger);
    spawn_printer(notifications);

    controller.connect(account)?;
    await_first_poll(&controller, config).await;
    println!("Balance: {}", format_balance(&controller.balance()));

    let outcome = tokio::select! {
        outcome = controller.start_simulated_workflow(destination, amount) => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };

    controller.teardown();

    match outcome {
        Some(Ok(SimulationOutcome::Completed)) => Ok(()),
        Some(Ok(SimulationOutcome::Cancelled { at })) => {
            warn!("Simulation cancelled at {}", at);
            Ok(())
        }
        Some(Err(rejection)) => anyhow::bail!("Not eligible: {}", rejection),
        None => {
            info!("Interrupted");
            Ok(())
        }
    }
}

/// Sweep the wallet balance (minus the fee buffer) to the configured destination
pub async fn transfer(config: &Config, force: bool, dry_run: bool) -> Result<()> {
    let keypair = load_keypair()?;
    let account = keypair.pubkey();
    let ledger = build_ledger(config);

    let signer: Arc<dyn TransactionSigner> = if force {
        Arc::new(KeypairSigner::unattended(keypair))
    } else {
        Arc::new(KeypairSigner::interactive(keypair))
    };

    let executor = TransferExecutor::new(
        ledger.clone(),
        signer,
        config.transfer.destination()?,
        config.transfer.safety_buffer_lamports,
    );

    let (controller, notifications) = build_controller(config, ledger);
    let mut controller = controller.with_executor(executor);
    spawn_printer(notifications);

    controller.connect(account)?;
    await_first_poll(&controller, config).await;

    let balance = controller.balance();
    match balance.lamports() {
        None => anyhow::bail!("Balance unknown; refusing to transfer"),
        Some(0) => anyhow::bail!("Balance is zero; nothing to transfer"),
        Some(_) => {}
    }

    let executor = controller
        .executor()
        .ok_or_else(|| anyhow::anyhow!("Transfer executor not configured"))?;
    println!("\n=== SWEEP ===\n");
    println!("From: {}", account);
    println!("To:   {}", executor.destination());
    println!("Balance: {}", format_balance(&balance));
    println!(
        "Fee buffer: {} lamports stays in the account",
        executor.safety_buffer_lamports()
    );

    if dry_run {
        let plan = executor
            .plan(Some(account))
            .await
            .map_err(|e| anyhow::anyhow!("Planning failed: {}", e))?;
        println!("\n=== DRY RUN ===");
        println!("Would send {} ({} lamports)", format_sol(plan.sol()), plan.lamports);
        controller.teardown();
        return Ok(());
    }

    let result = controller.execute_transfer().await;
    controller.teardown();

    match result {
        Ok(submission) => {
            println!("\n=== TRANSFER SUCCESSFUL ===");
            println!("Amount: {} lamports", submission.lamports);
            println!("To: {}", submission.destination);
            println!("Signature: {}", submission.signature);
            Ok(())
        }
        Err(e) => {
            error!("Transfer failed: {}", e);
            if let Some(signature) = e.submitted_signature() {
                println!("Submitted but unconfirmed: {}", signature);
            } else if e.is_user_rejection() {
                println!("Transfer cancelled; nothing was sent");
            } else if e.is_retryable() {
                println!("Nothing was sent; the error looks transient, try again");
            }
            anyhow::bail!("Transfer failed: {}", e)
        }
    }
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
