//! User-facing status channel
//!
//! Ephemeral notifications consumed by the presentation layer. Notifications
//! sharing an id replace each other (a loading spinner turning into a success
//! message); the channel stops emitting once the owning session is torn down.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Notification id used by the stage simulator
pub const STAGE_ID: &str = "stage";
/// Notification id used for sub-step progress during the bridging stage
pub const PROGRESS_ID: &str = "progress";
/// Notification id used by the transfer executor
pub const TRANSFER_ID: &str = "transfer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Loading,
    Success,
    Error,
    Dismiss,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::Info => "info",
            NotificationKind::Loading => "loading",
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Dismiss => "dismiss",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub id: Option<String>,
    pub message: String,
}

/// Sender half of the status channel
#[derive(Debug, Clone)]
pub struct StatusChannel {
    tx: mpsc::UnboundedSender<Notification>,
    closed: CancellationToken,
}

impl StatusChannel {
    /// Create a channel whose emissions stop when `closed` is cancelled
    pub fn new(closed: CancellationToken) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, closed }, rx)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NotificationKind::Info, None, message.into());
    }

    pub fn loading(&self, id: &str, message: impl Into<String>) {
        self.emit(NotificationKind::Loading, Some(id), message.into());
    }

    pub fn success(&self, id: Option<&str>, message: impl Into<String>) {
        self.emit(NotificationKind::Success, id, message.into());
    }

    pub fn error(&self, id: Option<&str>, message: impl Into<String>) {
        self.emit(NotificationKind::Error, id, message.into());
    }

    pub fn dismiss(&self, id: &str) {
        self.emit(NotificationKind::Dismiss, Some(id), String::new());
    }

    fn emit(&self, kind: NotificationKind, id: Option<&str>, message: String) {
        if self.closed.is_cancelled() {
            trace!("Dropping {} notification after teardown", kind);
            return;
        }

        debug!("[{}] {}", kind, message);

        // A dropped receiver just means nobody is rendering
        let _ = self.tx.send(Notification {
            kind,
            id: id.map(str::to_string),
            message,
        });
    }
}
