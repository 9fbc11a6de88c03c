//! Sweep transfer execution
//!
//! Moves the connected account's balance, minus a fee buffer, to the fixed
//! sweep destination. This is the only irreversible operation in the crate
//! and it never retries: every failure is reported once and the caller
//! decides what to do next.

use std::sync::Arc;

use solana_sdk::native_token::lamports_to_sol;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::gate::parse_address;
use crate::ledger::{LedgerClient, SendOptions, TransactionSigner};
use crate::status::{StatusChannel, TRANSFER_ID};

/// Default lamports kept back for network fees
pub const DEFAULT_SAFETY_BUFFER_LAMPORTS: u64 = 50_000;

/// What a sweep would do, computed from a fresh balance read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub from: Pubkey,
    pub to: Pubkey,
    pub balance_lamports: u64,
    pub lamports: u64,
}

impl TransferPlan {
    pub fn sol(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }
}

/// Outcome of a submitted sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionResult {
    pub signature: Signature,
    pub confirmed: bool,
    pub lamports: u64,
    pub destination: Pubkey,
}

/// Amount left after reserving the fee buffer
pub fn amount_to_send(balance_lamports: u64, safety_buffer_lamports: u64) -> u64 {
    balance_lamports.saturating_sub(safety_buffer_lamports)
}

/// Transfer executor for sweep transfers
pub struct TransferExecutor {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn TransactionSigner>,
    destination: Pubkey,
    safety_buffer_lamports: u64,
    send_options: SendOptions,
}

impl TransferExecutor {
    /// Create a new transfer executor
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn TransactionSigner>,
        destination: Pubkey,
        safety_buffer_lamports: u64,
    ) -> Self {
        Self {
            ledger,
            signer,
            destination,
            safety_buffer_lamports,
            send_options: SendOptions::default(),
        }
    }

    /// Create an executor from a textual destination, parsed the same way the
    /// eligibility gate parses addresses
    pub fn with_destination_str(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn TransactionSigner>,
        destination: &str,
        safety_buffer_lamports: u64,
    ) -> Result<Self> {
        let destination = parse_address(destination)?;
        Ok(Self::new(ledger, signer, destination, safety_buffer_lamports))
    }

    pub fn destination(&self) -> Pubkey {
        self.destination
    }

    pub fn safety_buffer_lamports(&self) -> u64 {
        self.safety_buffer_lamports
    }

    /// Read the balance and compute the sweep amount. No transaction is built.
    pub async fn plan(&self, account: Option<Pubkey>) -> Result<TransferPlan> {
        let from = account.ok_or(Error::NoWallet)?;

        let balance_lamports = self.ledger.get_balance(&from).await?;
        let lamports = amount_to_send(balance_lamports, self.safety_buffer_lamports);

        if lamports == 0 {
            return Err(Error::InsufficientBalance {
                balance_lamports,
                buffer_lamports: self.safety_buffer_lamports,
            });
        }

        debug!(
            "Sweep plan: {} of {} lamports from {} to {}",
            lamports, balance_lamports, from, self.destination
        );

        Ok(TransferPlan {
            from,
            to: self.destination,
            balance_lamports,
            lamports,
        })
    }

    /// Plan, sign, submit and confirm a sweep, reporting the outcome on
    /// `status`
    pub async fn execute(
        &self,
        account: Option<Pubkey>,
        status: &StatusChannel,
    ) -> Result<SubmissionResult> {
        let result = match self.plan(account).await {
            Ok(plan) => self.submit(&plan, status).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(submission) => status.success(
                Some(TRANSFER_ID),
                format!("Transfer complete: {}", submission.signature),
            ),
            Err(e) => {
                error!("Transfer failed: {}", e);
                status.error(Some(TRANSFER_ID), failure_message(e));
            }
        }

        result
    }

    /// Submit a planned sweep
    pub async fn submit(&self, plan: &TransferPlan, status: &StatusChannel) -> Result<SubmissionResult> {
        info!(
            "Executing transfer: {} lamports from {} to {}",
            plan.lamports, plan.from, plan.to
        );

        // Blockhashes expire, so this is fetched only now, right before signing
        let reference = self.ledger.latest_block_reference().await?;

        let instruction = system_instruction::transfer(&plan.from, &plan.to, plan.lamports);
        let mut transaction = Transaction::new_with_payer(&[instruction], Some(&plan.from));
        transaction.message.recent_blockhash = reference.blockhash;

        let signature = self
            .signer
            .sign_and_send(transaction, self.ledger.as_ref(), &self.send_options)
            .await?;

        status.loading(TRANSFER_ID, "Transferring SOL…");

        let confirmed = self.ledger.confirm_transaction(&signature, &reference).await?;
        if !confirmed {
            warn!(
                "Transaction {} not confirmed before block height {}",
                signature, reference.last_valid_block_height
            );
            return Err(Error::ConfirmationTimedOut {
                signature,
                last_valid_block_height: reference.last_valid_block_height,
            });
        }

        info!(
            "Transfer complete: {} lamports to {} (sig: {})",
            plan.lamports, plan.to, signature
        );

        Ok(SubmissionResult {
            signature,
            confirmed,
            lamports: plan.lamports,
            destination: plan.to,
        })
    }
}

/// User-facing message for a failed transfer
pub fn failure_message(e: &Error) -> String {
    match e {
        Error::NoWallet => "Connect your wallet first.".to_string(),
        Error::InsufficientBalance { .. } => "Insufficient balance after fees.".to_string(),
        Error::BalanceQueryFailed(_) => "Could not read your balance. Try again.".to_string(),
        Error::BlockReferenceFetchFailed(_) => {
            "Could not fetch a recent blockhash. Try again.".to_string()
        }
        Error::SigningDeclined(_) => "Transaction was not signed.".to_string(),
        Error::SigningFailed(_) => "The wallet could not sign for this account.".to_string(),
        Error::SubmissionRejected(reason) => format!("Transaction rejected: {}", reason),
        Error::ConfirmationTimedOut { signature, .. } => {
            format!("Transaction {} is unconfirmed; check an explorer before retrying.", signature)
        }
        other => format!("Transfer failed: {}", other),
    }
}
