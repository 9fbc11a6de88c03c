//! Balance monitor
//!
//! Polls the connected account's balance on a fixed cadence and publishes it
//! on the session's balance channel.
//!
//! A failed query degrades the balance to `Unknown` (never zero) and polling
//! continues. Stopping the monitor, or tearing down the session, abandons any
//! in-flight query so its result is never applied.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ledger::LedgerClient;
use crate::session::{Balance, BalanceSnapshot, Session};

/// Handle to a running balance poller
pub struct BalanceMonitor {
    account: Pubkey,
    session: Arc<Session>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BalanceMonitor {
    /// Start polling `account`. The first poll runs immediately.
    pub fn start<L>(
        session: Arc<Session>,
        ledger: Arc<L>,
        account: Pubkey,
        poll_interval: Duration,
    ) -> Self
    where
        L: LedgerClient + ?Sized + 'static,
    {
        info!(
            "Starting balance monitor for {} ({}s interval)",
            account,
            poll_interval.as_secs_f64()
        );

        let cancel = session.cancel_token().child_token();
        let task_cancel = cancel.clone();
        let task_session = session.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    result = ledger.get_balance(&account) => result,
                };

                if task_cancel.is_cancelled() {
                    break;
                }
                apply_poll(task_session.balance_sender(), &account, result);
            }

            debug!("Balance monitor for {} stopped", account);
        });

        Self {
            account,
            session,
            cancel,
            task,
        }
    }

    pub fn account(&self) -> Pubkey {
        self.account
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop polling and reset the balance to unknown
    pub fn stop(self) {
        info!("Stopping balance monitor for {}", self.account);
        self.cancel.cancel();
        self.task.abort();

        if !self.session.is_torn_down() {
            self.session.balance_sender().send_if_modified(|b| {
                let changed = b.is_known();
                *b = Balance::Unknown;
                changed
            });
        }
    }
}

impl Drop for BalanceMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Apply one poll result to the balance channel.
///
/// Returns whether subscribers were notified. An unchanged lamport amount
/// refreshes the snapshot timestamp silently.
pub(crate) fn apply_poll(
    state: &watch::Sender<Balance>,
    account: &Pubkey,
    result: Result<u64>,
) -> bool {
    match result {
        Ok(lamports) => {
            debug!("Balance of {}: {} lamports", account, lamports);
            state.send_if_modified(|current| {
                let changed = current.lamports() != Some(lamports);
                *current = Balance::Known(BalanceSnapshot::now(lamports));
                changed
            })
        }
        Err(e) => {
            warn!("Balance query for {} failed: {}", account, e);
            state.send_if_modified(|current| {
                let changed = current.is_known();
                *current = Balance::Unknown;
                changed
            })
        }
    }
}
