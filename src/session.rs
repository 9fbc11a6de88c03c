//! Session context
//!
//! Connection and balance state live here rather than in globals. Every
//! component receives the session explicitly, and every suspension point is
//! tied to its cancellation token so tearing the session down silences all of
//! them at once.

use chrono::{DateTime, Utc};
use solana_sdk::native_token::lamports_to_sol;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::simulator::Stage;
use crate::status::{Notification, StatusChannel};

/// Latest observed balance of the connected account
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceSnapshot {
    pub lamports: u64,
    pub observed_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn now(lamports: u64) -> Self {
        Self {
            lamports,
            observed_at: Utc::now(),
        }
    }

    /// Balance in SOL
    pub fn sol(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }
}

/// Observed balance. `Unknown` covers "not connected" and "query failed";
/// a real zero balance is `Known` with zero lamports.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Balance {
    #[default]
    Unknown,
    Known(BalanceSnapshot),
}

impl Balance {
    pub fn lamports(&self) -> Option<u64> {
        match self {
            Balance::Known(s) => Some(s.lamports),
            Balance::Unknown => None,
        }
    }

    pub fn sol(&self) -> Option<f64> {
        match self {
            Balance::Known(s) => Some(s.sol()),
            Balance::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Balance::Known(_))
    }
}

/// Shared session state
pub struct Session {
    account: watch::Sender<Option<Pubkey>>,
    balance: watch::Sender<Balance>,
    stage: watch::Sender<Stage>,
    status: StatusChannel,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session and the receiver for its notifications
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let cancel = CancellationToken::new();
        let (status, notifications) = StatusChannel::new(cancel.clone());

        let session = Self {
            account: watch::Sender::new(None),
            balance: watch::Sender::new(Balance::Unknown),
            stage: watch::Sender::new(Stage::Idle),
            status,
            cancel,
        };

        (session, notifications)
    }

    pub fn account(&self) -> Option<Pubkey> {
        *self.account.borrow()
    }

    pub fn set_account(&self, account: Option<Pubkey>) {
        self.account.send_replace(account);
    }

    /// Latest balance; always read fresh, never cached by callers
    pub fn balance(&self) -> Balance {
        *self.balance.borrow()
    }

    pub(crate) fn balance_sender(&self) -> &watch::Sender<Balance> {
        &self.balance
    }

    pub fn subscribe_balance(&self) -> watch::Receiver<Balance> {
        self.balance.subscribe()
    }

    pub fn stage(&self) -> Stage {
        *self.stage.borrow()
    }

    pub(crate) fn stage_sender(&self) -> &watch::Sender<Stage> {
        &self.stage
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<Stage> {
        self.stage.subscribe()
    }

    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    /// Token cancelled on teardown; components derive child tokens from it
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// End the session. Pending timers and in-flight queries are abandoned and
    /// no further state updates or notifications are published.
    pub fn teardown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Tearing down session");
            self.cancel.cancel();
        }
    }
}
