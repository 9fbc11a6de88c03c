//! Workflow controller
//!
//! Owns the session and wires the components together. Exactly two entry
//! points act on user intent:
//!
//! - [`Controller::start_simulated_workflow`] runs the gate and then the
//!   cosmetic stage sequence; it never touches the ledger.
//! - [`Controller::execute_transfer`] runs the sweep transfer.
//!
//! The two paths share only the session; neither reads the other's state.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::executor::{SubmissionResult, TransferExecutor};
use crate::gate::{self, Accepted, GatePolicy, Rejection};
use crate::ledger::LedgerClient;
use crate::monitor::BalanceMonitor;
use crate::session::{Balance, Session};
use crate::simulator::{SimulationOutcome, Stage, StageSimulator};
use crate::status::{Notification, STAGE_ID};

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
    pub gate: GatePolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            gate: GatePolicy::default(),
        }
    }
}

/// Session-scoped workflow controller
pub struct Controller {
    session: Arc<Session>,
    ledger: Arc<dyn LedgerClient>,
    executor: Option<TransferExecutor>,
    simulator: StageSimulator,
    config: ControllerConfig,
    monitor: Option<BalanceMonitor>,
    /// Cancellation handle of the most recent simulated run
    active_run: Mutex<Option<CancellationToken>>,
}

impl Controller {
    /// Create a controller and the receiver for its notifications
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        simulator: StageSimulator,
        config: ControllerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (session, notifications) = Session::new();

        let controller = Self {
            session: Arc::new(session),
            ledger,
            executor: None,
            simulator,
            config,
            monitor: None,
            active_run: Mutex::new(None),
        };

        (controller, notifications)
    }

    /// Attach the transfer executor; without one `execute_transfer` fails
    pub fn with_executor(mut self, executor: TransferExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn executor(&self) -> Option<&TransferExecutor> {
        self.executor.as_ref()
    }

    pub fn balance(&self) -> Balance {
        self.session.balance()
    }

    /// Connect an account and start watching its balance
    pub fn connect(&mut self, account: Pubkey) -> Result<()> {
        if self.session.is_torn_down() {
            return Err(Error::SessionClosed);
        }

        if self.session.account() == Some(account) {
            return Ok(());
        }

        self.stop_monitor();

        info!("Connected account {}", account);
        self.session.set_account(Some(account));
        self.monitor = Some(BalanceMonitor::start(
            self.session.clone(),
            self.ledger.clone(),
            account,
            self.config.poll_interval,
        ));

        Ok(())
    }

    /// Disconnect the account; polling stops and the balance becomes unknown
    pub fn disconnect(&mut self) {
        if let Some(account) = self.session.account() {
            info!("Disconnected account {}", account);
        }
        self.stop_monitor();
        self.session.set_account(None);
    }

    fn stop_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    /// Run the eligibility gate against the balance as it is right now
    pub fn check_eligibility(
        &self,
        destination: &str,
        amount_input: &str,
    ) -> std::result::Result<Accepted, Rejection> {
        gate::validate(
            self.session.account().as_ref(),
            &self.session.balance(),
            destination,
            gate::parse_amount(amount_input),
            &self.config.gate,
        )
    }

    /// Gate the action, then run the simulated stage sequence.
    ///
    /// A rejection is reported once on the status channel and returned; the
    /// sequence itself cannot fail, only be cancelled. An accepted call
    /// supersedes a run still in progress: the older run returns
    /// `Cancelled` and the stage restarts from `Idle`.
    pub async fn start_simulated_workflow(
        &self,
        destination: &str,
        amount_input: &str,
    ) -> std::result::Result<SimulationOutcome, Rejection> {
        let run_id = Uuid::new_v4();

        let accepted = match self.check_eligibility(destination, amount_input) {
            Ok(accepted) => accepted,
            Err(rejection) => {
                info!(%run_id, "Simulated workflow rejected: {}", rejection);
                self.session.status().error(Some(STAGE_ID), rejection.to_string());
                return Err(rejection);
            }
        };

        info!(
            %run_id,
            "Simulated workflow accepted: {} SOL toward {} (balance {} SOL)",
            accepted.request.requested_sol, accepted.request.destination, accepted.balance_sol
        );

        let run_cancel = self.session.cancel_token().child_token();
        if let Some(previous) = self.active_run.lock().await.replace(run_cancel.clone()) {
            if !previous.is_cancelled() {
                debug!(%run_id, "Superseding simulated run still in progress");
                previous.cancel();
            }
        }

        let outcome = self
            .simulator
            .run(
                self.session.stage_sender(),
                self.session.status(),
                &run_cancel,
            )
            .await;

        info!(%run_id, "Simulated workflow finished: {:?}", outcome);
        Ok(outcome)
    }

    /// Sweep the connected account to the configured destination.
    ///
    /// Tearing down the session abandons the wait; a transaction that was
    /// already submitted is not recalled.
    pub async fn execute_transfer(&self) -> Result<SubmissionResult> {
        let run_id = Uuid::new_v4();
        if self.session.is_torn_down() {
            return Err(Error::SessionClosed);
        }

        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| Error::Config("no transfer destination configured".into()))?;

        info!(%run_id, "Transfer requested to {}", executor.destination());

        let cancel = self.session.cancel_token();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(%run_id, "Session torn down during transfer; result discarded");
                Err(Error::SessionClosed)
            }
            result = executor.execute(self.session.account(), self.session.status()) => result,
        }
    }

    pub fn stage(&self) -> Stage {
        self.session.stage()
    }

    /// End the session: stop polling, clear timers, silence notifications
    pub fn teardown(&mut self) {
        self.session.teardown();
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.session.teardown();
    }
}
