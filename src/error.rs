//! Error types for the workflow controller

use solana_sdk::signature::Signature;
use thiserror::Error;

use crate::gate::Rejection;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the workflow controller
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Insecure keypair permissions: {0}")]
    InsecureKeypair(String),

    // Session errors
    #[error("No wallet connected")]
    NoWallet,

    #[error("Session has been torn down")]
    SessionClosed,

    // Eligibility gate
    #[error(transparent)]
    Rejected(#[from] Rejection),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Balance query failed: {0}")]
    BalanceQueryFailed(String),

    // Transfer errors
    #[error("Insufficient balance after fees: {balance_lamports} lamports available, {buffer_lamports} lamports reserved")]
    InsufficientBalance {
        balance_lamports: u64,
        buffer_lamports: u64,
    },

    #[error("Failed to fetch recent blockhash: {0}")]
    BlockReferenceFetchFailed(String),

    #[error("Signing declined: {0}")]
    SigningDeclined(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Transaction submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Transaction {signature} unconfirmed: block height exceeded {last_valid_block_height}")]
    ConfirmationTimedOut {
        signature: Signature,
        last_valid_block_height: u64,
    },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is transient.
    ///
    /// Nothing in the transfer path retries on its own; this only tells the
    /// caller whether asking the user to try again makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::BalanceQueryFailed(_) | Error::BlockReferenceFetchFailed(_)
        )
    }

    /// Check if the user (or the gate on their behalf) stopped the action
    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self,
            Error::NoWallet | Error::Rejected(_) | Error::SigningDeclined(_)
        )
    }

    /// Signature of a transaction that reached the network, if any
    pub fn submitted_signature(&self) -> Option<&Signature> {
        match self {
            Error::ConfirmationTimedOut { signature, .. } => Some(signature),
            _ => None,
        }
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
