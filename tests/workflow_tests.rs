mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use tokio::sync::mpsc;

use common::{settle, MockLedger, MockSigner};
use sweepgate::error::Error;
use sweepgate::executor::{TransferExecutor, DEFAULT_SAFETY_BUFFER_LAMPORTS};
use sweepgate::gate::Rejection;
use sweepgate::ledger::TransactionSigner;
use sweepgate::session::Balance;
use sweepgate::simulator::{SimulationOutcome, Stage, StagePlan, StageSimulator};
use sweepgate::status::{Notification, NotificationKind, STAGE_ID, TRANSFER_ID};
use sweepgate::workflow::{Controller, ControllerConfig};

const POLL: Duration = Duration::from_secs(10);

struct Harness {
    controller: Controller,
    notifications: mpsc::UnboundedReceiver<Notification>,
    ledger: Arc<MockLedger>,
    signer: Arc<MockSigner>,
    sweep_destination: Pubkey,
}

impl Harness {
    fn new(ledger: Arc<MockLedger>) -> Self {
        let signer = MockSigner::new();
        let sweep_destination = Pubkey::new_unique();
        let executor = TransferExecutor::new(
            ledger.clone(),
            signer.clone(),
            sweep_destination,
            DEFAULT_SAFETY_BUFFER_LAMPORTS,
        );

        let (controller, notifications) = Controller::new(
            ledger.clone(),
            StageSimulator::new(StagePlan::default()),
            ControllerConfig {
                poll_interval: POLL,
                ..ControllerConfig::default()
            },
        );

        Self {
            controller: controller.with_executor(executor),
            notifications,
            ledger,
            signer,
            sweep_destination,
        }
    }

    async fn connected(ledger: Arc<MockLedger>) -> Self {
        let mut harness = Self::new(ledger);
        let account = harness.signer.pubkey();
        harness.controller.connect(account).unwrap();
        settle().await;
        harness
    }

    fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }
}

#[tokio::test(start_paused = true)]
async fn test_scenario_below_threshold_rejects_without_transfer() {
    let mut h = Harness::connected(MockLedger::with_sol(500.0)).await;
    assert_eq!(h.controller.balance().sol(), Some(500.0));

    let destination = Pubkey::new_unique().to_string();
    let result = h.controller.start_simulated_workflow(&destination, "200").await;

    assert!(matches!(result, Err(Rejection::BelowThreshold { .. })));
    assert_eq!(h.controller.stage(), Stage::Idle);
    assert_eq!(h.ledger.network_calls_after_balance(), 0);

    let notifications = h.drain();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Error);
    assert_eq!(notifications[0].id.as_deref(), Some(STAGE_ID));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_eligible_simulation_completes() {
    let mut h = Harness::connected(MockLedger::with_sol(1500.0)).await;
    let mut stages = h.controller.session().subscribe_stage();

    let destination = Pubkey::new_unique().to_string();
    let started = tokio::time::Instant::now();
    let outcome = h
        .controller
        .start_simulated_workflow(&destination, "200")
        .await
        .unwrap();

    assert_eq!(outcome, SimulationOutcome::Completed);
    assert_eq!(h.controller.stage(), Stage::Complete);
    assert!(started.elapsed() >= StagePlan::default().total());
    assert!(stages.has_changed().unwrap());
    assert_eq!(*stages.borrow_and_update(), Stage::Complete);

    // The cosmetic path never builds a transaction
    assert_eq!(h.ledger.network_calls_after_balance(), 0);

    let successes: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Success)
        .collect();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].message, Stage::Complete.message());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_transfer_uses_fixed_destination() {
    let h = Harness::connected(MockLedger::with_sol(1500.0)).await;

    // The user-entered destination only feeds the gate
    let entered = Pubkey::new_unique();
    h.controller
        .check_eligibility(&entered.to_string(), "200")
        .unwrap();

    let result = h.controller.execute_transfer().await.unwrap();
    let expected = 1_500_000_000_000 - 50_000;

    assert_eq!(result.lamports, expected);
    assert_eq!(result.destination, h.sweep_destination);

    let submitted = h.ledger.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].message.instructions.len(), 1);
    assert_eq!(
        submitted[0].message.instructions[0].data,
        system_instruction::transfer(&h.signer.pubkey(), &h.sweep_destination, expected).data
    );
    assert!(!submitted[0].message.account_keys.contains(&entered));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_zero_balance_transfer_fails_early() {
    let mut h = Harness::connected(MockLedger::with_lamports(0)).await;
    assert_eq!(h.controller.balance().lamports(), Some(0));

    let err = h.controller.execute_transfer().await.unwrap_err();
    assert!(matches!(err, Error::InsufficientBalance { .. }));
    assert_eq!(h.ledger.network_calls_after_balance(), 0);

    let notifications = h.drain();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].id.as_deref(), Some(TRANSFER_ID));
}

#[tokio::test(start_paused = true)]
async fn test_gate_reads_latest_poll() {
    let h = Harness::connected(MockLedger::with_sol(500.0)).await;
    let destination = Pubkey::new_unique().to_string();

    assert!(matches!(
        h.controller.check_eligibility(&destination, "200"),
        Err(Rejection::BelowThreshold { .. })
    ));

    h.ledger.set_sol(1500.0);
    tokio::time::sleep(POLL).await;
    settle().await;

    let accepted = h.controller.check_eligibility(&destination, "200").unwrap();
    assert_eq!(accepted.balance_sol, 1500.0);
}

#[tokio::test(start_paused = true)]
async fn test_polls_on_fixed_cadence_and_stable_balance_is_quiet() {
    let h = Harness::connected(MockLedger::with_sol(1500.0)).await;
    let mut balance = h.controller.session().subscribe_balance();
    balance.borrow_and_update();

    assert_eq!(h.ledger.balance_calls.load(Ordering::SeqCst), 1);

    for _ in 0..3 {
        tokio::time::sleep(POLL).await;
        settle().await;
    }

    assert_eq!(h.ledger.balance_calls.load(Ordering::SeqCst), 4);
    assert!(!balance.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_query_failure_degrades_to_unknown_and_recovers() {
    let h = Harness::connected(MockLedger::with_sol(1500.0)).await;

    h.ledger.fail_balance("connection reset");
    tokio::time::sleep(POLL).await;
    settle().await;
    assert_eq!(h.controller.balance(), Balance::Unknown);

    h.ledger.set_lamports(0);
    tokio::time::sleep(POLL).await;
    settle().await;
    assert_eq!(h.controller.balance().lamports(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_polling() {
    let mut h = Harness::connected(MockLedger::with_sol(1500.0)).await;
    assert!(h.controller.balance().is_known());

    h.controller.disconnect();
    assert_eq!(h.controller.balance(), Balance::Unknown);
    assert_eq!(h.controller.session().account(), None);

    let calls = h.ledger.balance_calls.load(Ordering::SeqCst);
    tokio::time::sleep(POLL * 3).await;
    assert_eq!(h.ledger.balance_calls.load(Ordering::SeqCst), calls);

    let destination = Pubkey::new_unique().to_string();
    assert_eq!(
        h.controller.check_eligibility(&destination, "1"),
        Err(Rejection::NoWallet)
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_mid_poll_discards_result() {
    let ledger = MockLedger::with_sol(1500.0);
    ledger.set_balance_delay(Duration::from_secs(5));
    let mut h = Harness::connected(ledger).await;
    let mut balance = h.controller.session().subscribe_balance();

    // First query is in flight
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.ledger.balance_calls.load(Ordering::SeqCst), 1);

    h.controller.teardown();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.controller.balance(), Balance::Unknown);
    assert!(!balance.has_changed().unwrap());
    assert_eq!(h.ledger.balance_calls.load(Ordering::SeqCst), 1);
    assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_mid_sequence_silences_simulation() {
    let mut h = Harness::connected(MockLedger::with_sol(1500.0)).await;
    let destination = Pubkey::new_unique().to_string();
    let session = h.controller.session().clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(4500)).await;
        session.teardown();
    });

    let outcome = h
        .controller
        .start_simulated_workflow(&destination, "200")
        .await
        .unwrap();
    assert_eq!(outcome, SimulationOutcome::Cancelled { at: Stage::Bridging });

    h.drain();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.controller.stage(), Stage::Bridging);
    assert!(h.drain().is_empty());

    assert!(matches!(
        h.controller.execute_transfer().await,
        Err(Error::SessionClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_paths_run_side_by_side() {
    let h = Harness::connected(MockLedger::with_sol(1500.0)).await;
    let destination = Pubkey::new_unique().to_string();

    let (simulated, transferred) = tokio::join!(
        h.controller.start_simulated_workflow(&destination, "1500"),
        h.controller.execute_transfer(),
    );

    assert_eq!(simulated.unwrap(), SimulationOutcome::Completed);
    assert!(transferred.unwrap().confirmed);
    assert_eq!(h.ledger.submitted().len(), 1);
    assert_eq!(h.controller.stage(), Stage::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_rerun_starts_from_first_stage() {
    let h = Harness::connected(MockLedger::with_sol(1500.0)).await;
    let destination = Pubkey::new_unique().to_string();

    h.controller
        .start_simulated_workflow(&destination, "1")
        .await
        .unwrap();
    assert_eq!(h.controller.stage(), Stage::Complete);

    let mut stages = h.controller.session().subscribe_stage();
    stages.borrow_and_update();

    let run = h.controller.start_simulated_workflow(&destination, "1");
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => panic!("sequence finished too early"),
        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
    }
    assert_eq!(h.controller.stage(), Stage::Eligibility);

    assert_eq!(run.await.unwrap(), SimulationOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_runs_keep_stage_forward_only() {
    let h = Harness::connected(MockLedger::with_sol(1500.0)).await;
    let destination = Pubkey::new_unique().to_string();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut stages = h.controller.session().subscribe_stage();
    stages.borrow_and_update();
    let recorder = seen.clone();
    tokio::spawn(async move {
        while stages.changed().await.is_ok() {
            let stage = *stages.borrow_and_update();
            recorder.lock().unwrap().push(stage);
        }
    });

    let (first, second) = tokio::join!(
        h.controller.start_simulated_workflow(&destination, "1"),
        async {
            // Lands inside the first run's routing stage
            tokio::time::sleep(Duration::from_millis(3000)).await;
            h.controller.start_simulated_workflow(&destination, "1").await
        },
    );
    settle().await;

    assert_eq!(first.unwrap(), SimulationOutcome::Cancelled { at: Stage::Routing });
    assert_eq!(second.unwrap(), SimulationOutcome::Completed);
    assert_eq!(h.controller.stage(), Stage::Complete);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.iter().filter(|s| **s == Stage::Complete).count(), 1);
    assert_eq!(seen.last(), Some(&Stage::Complete));
    for pair in seen.windows(2) {
        let reset = matches!(pair[1], Stage::Idle | Stage::Eligibility);
        assert!(pair[1] > pair[0] || reset, "stage went backwards: {:?}", seen);
    }

    // Nothing from the superseded run lands afterwards
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.controller.stage(), Stage::Complete);
}
