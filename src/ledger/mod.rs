//! Ledger access
//!
//! The core only talks to the ledger through [`LedgerClient`] and to the key
//! holder through [`TransactionSigner`]. Production implementations wrap the
//! nonblocking Solana RPC client and a local keypair.

pub mod rpc;
pub mod signer;

use async_trait::async_trait;
use solana_sdk::commitment_config::CommitmentLevel;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use crate::error::Result;

pub use rpc::RpcLedger;
pub use signer::{check_keypair_file, keypair_path_from_env, KeypairSigner, TransactionSigner};

/// A recent blockhash and the last block height at which it is still valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Options forwarded with a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub preflight_commitment: CommitmentLevel,
    pub skip_preflight: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            preflight_commitment: CommitmentLevel::Confirmed,
            skip_preflight: false,
        }
    }
}

/// Read and write access to the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balance of `account` in lamports
    async fn get_balance(&self, account: &Pubkey) -> Result<u64>;

    /// Latest blockhash with its validity horizon
    async fn latest_block_reference(&self) -> Result<BlockReference>;

    /// Submit an already signed transaction
    async fn submit_transaction(
        &self,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature>;

    /// Wait for `signature` to confirm. Returns `false` once the block height
    /// passes the reference's horizon without confirmation.
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        reference: &BlockReference,
    ) -> Result<bool>;
}
