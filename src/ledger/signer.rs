//! Transaction signing
//!
//! The core hands a fully built, unsigned transaction to the signer and gets
//! back a submission signature. Key material never leaves the signer.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dialoguer::Confirm;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use tracing::{debug, info};

use super::{LedgerClient, SendOptions};
use crate::error::{Error, Result};

/// Keypair path from `KEYPAIR_PATH`
pub fn keypair_path_from_env() -> Result<String> {
    std::env::var("KEYPAIR_PATH").map_err(|_| Error::MissingEnvVar("KEYPAIR_PATH".into()))
}

/// Refuse keypair files that are missing or readable by group or others
pub fn check_keypair_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::InvalidKeypair(format!("{}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(Error::InsecureKeypair(format!(
                "{} has mode {:o}; run 'chmod 600 {}'",
                path.display(),
                mode & 0o777,
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    Ok(())
}

/// Authority that signs and submits transactions
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// The account this signer controls
    fn pubkey(&self) -> Pubkey;

    /// Authorize `transaction` and submit it through `ledger`
    async fn sign_and_send(
        &self,
        transaction: Transaction,
        ledger: &dyn LedgerClient,
        options: &SendOptions,
    ) -> Result<Signature>;
}

/// Signer backed by a local keypair
pub struct KeypairSigner {
    keypair: Arc<Keypair>,
    require_approval: bool,
}

impl KeypairSigner {
    /// Signer that asks for confirmation on the terminal before signing
    pub fn interactive(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            require_approval: true,
        }
    }

    /// Signer that signs without asking
    pub fn unattended(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            require_approval: false,
        }
    }

    /// Load a keypair from a JSON keypair file
    pub fn load_keypair<P: AsRef<Path>>(path: P) -> Result<Keypair> {
        let path = path.as_ref();
        read_keypair_file(path)
            .map_err(|e| Error::InvalidKeypair(format!("{}: {}", path.display(), e)))
    }

    async fn approve(&self, transaction: &Transaction) -> Result<()> {
        if !self.require_approval {
            return Ok(());
        }

        let prompt = format!(
            "Sign and send transaction ({} instruction(s), fee payer {})? This cannot be undone.",
            transaction.message.instructions.len(),
            self.keypair.pubkey()
        );

        let approved = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(prompt).default(false).interact()
        })
        .await
        .map_err(|e| Error::SigningDeclined(format!("approval prompt failed: {}", e)))?
        .map_err(|e| Error::SigningDeclined(format!("approval prompt failed: {}", e)))?;

        if approved {
            Ok(())
        } else {
            Err(Error::SigningDeclined("user declined to sign".into()))
        }
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_and_send(
        &self,
        mut transaction: Transaction,
        ledger: &dyn LedgerClient,
        options: &SendOptions,
    ) -> Result<Signature> {
        self.approve(&transaction).await?;

        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| Error::SigningFailed(e.to_string()))?;

        debug!("Signed transaction {}", transaction.signatures[0]);

        let signature = ledger.submit_transaction(&transaction, options).await?;
        info!("Submitted transaction {}", signature);

        Ok(signature)
    }
}
