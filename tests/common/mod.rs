//! In-memory ledger and signer used by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::native_token::sol_to_lamports;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;

use sweepgate::error::{Error, Result};
use sweepgate::ledger::{BlockReference, LedgerClient, SendOptions, TransactionSigner};

pub const LAST_VALID_BLOCK_HEIGHT: u64 = 1_000;

pub struct MockLedger {
    balance: Mutex<std::result::Result<u64, String>>,
    balance_delay: Mutex<Duration>,
    pub balance_calls: AtomicUsize,
    pub blockhash_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub fail_blockhash: AtomicBool,
    pub reject_submission: AtomicBool,
    pub confirms: AtomicBool,
    pub submitted: Mutex<Vec<Transaction>>,
    pub blockhashes: Mutex<Vec<Hash>>,
}

impl MockLedger {
    pub fn with_lamports(lamports: u64) -> Arc<Self> {
        Arc::new(Self {
            balance: Mutex::new(Ok(lamports)),
            balance_delay: Mutex::new(Duration::ZERO),
            balance_calls: AtomicUsize::new(0),
            blockhash_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            fail_blockhash: AtomicBool::new(false),
            reject_submission: AtomicBool::new(false),
            confirms: AtomicBool::new(true),
            submitted: Mutex::new(Vec::new()),
            blockhashes: Mutex::new(Vec::new()),
        })
    }

    pub fn with_sol(sol: f64) -> Arc<Self> {
        Self::with_lamports(sol_to_lamports(sol))
    }

    pub fn set_lamports(&self, lamports: u64) {
        *self.balance.lock().unwrap() = Ok(lamports);
    }

    pub fn set_sol(&self, sol: f64) {
        self.set_lamports(sol_to_lamports(sol));
    }

    pub fn fail_balance(&self, reason: &str) {
        *self.balance.lock().unwrap() = Err(reason.to_string());
    }

    pub fn set_balance_delay(&self, delay: Duration) {
        *self.balance_delay.lock().unwrap() = delay;
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn network_calls_after_balance(&self) -> usize {
        self.blockhash_calls.load(Ordering::SeqCst)
            + self.submitted.lock().unwrap().len()
            + self.confirm_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, _account: &Pubkey) -> Result<u64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.balance_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.balance
            .lock()
            .unwrap()
            .clone()
            .map_err(Error::BalanceQueryFailed)
    }

    async fn latest_block_reference(&self) -> Result<BlockReference> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_blockhash.load(Ordering::SeqCst) {
            return Err(Error::BlockReferenceFetchFailed("node unavailable".into()));
        }

        let blockhash = Hash::new_unique();
        self.blockhashes.lock().unwrap().push(blockhash);
        Ok(BlockReference {
            blockhash,
            last_valid_block_height: LAST_VALID_BLOCK_HEIGHT,
        })
    }

    async fn submit_transaction(
        &self,
        transaction: &Transaction,
        _options: &SendOptions,
    ) -> Result<Signature> {
        if self.reject_submission.load(Ordering::SeqCst) {
            return Err(Error::SubmissionRejected("Blockhash not found".into()));
        }
        self.submitted.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn confirm_transaction(
        &self,
        _signature: &Signature,
        _reference: &BlockReference,
    ) -> Result<bool> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.confirms.load(Ordering::SeqCst))
    }
}

/// Signer that approves or declines without prompting
pub struct MockSigner {
    keypair: Keypair,
    pub declines: AtomicBool,
    pub sign_requests: AtomicUsize,
}

impl MockSigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            keypair: Keypair::new(),
            declines: AtomicBool::new(false),
            sign_requests: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_and_send(
        &self,
        mut transaction: Transaction,
        ledger: &dyn LedgerClient,
        options: &SendOptions,
    ) -> Result<Signature> {
        self.sign_requests.fetch_add(1, Ordering::SeqCst);
        if self.declines.load(Ordering::SeqCst) {
            return Err(Error::SigningDeclined("user rejected the request".into()));
        }

        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| Error::SigningDeclined(e.to_string()))?;
        ledger.submit_transaction(&transaction, options).await
    }
}

/// Let spawned tasks run under a paused clock
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
