//! RPC-backed ledger client

use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::{debug, warn};

use super::{BlockReference, LedgerClient, SendOptions};
use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// Consecutive failed status or height queries before confirmation gives up
const MAX_CONSECUTIVE_QUERY_FAILURES: u32 = 5;

/// Ledger client over JSON-RPC
pub struct RpcLedger {
    rpc_client: RpcClient,
    commitment: CommitmentConfig,
    confirm_poll_interval: Duration,
    confirm_timeout: Duration,
}

impl RpcLedger {
    /// Create a new RPC ledger client
    pub fn new(config: &RpcConfig, confirm_poll_interval: Duration, confirm_timeout: Duration) -> Self {
        let rpc_client = RpcClient::new_with_timeout_and_commitment(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
            config.commitment_config(),
        );

        Self::with_client(rpc_client, confirm_poll_interval, confirm_timeout)
    }

    /// Wrap an existing client; its commitment applies to blockhash and
    /// confirmation queries
    pub fn with_client(
        rpc_client: RpcClient,
        confirm_poll_interval: Duration,
        confirm_timeout: Duration,
    ) -> Self {
        let commitment = rpc_client.commitment();
        Self {
            rpc_client,
            commitment,
            confirm_poll_interval,
            confirm_timeout,
        }
    }

    pub fn endpoint(&self) -> String {
        self.rpc_client.url()
    }

    async fn poll_confirmation(
        &self,
        signature: &Signature,
        reference: &BlockReference,
    ) -> Result<bool> {
        let mut failures = 0u32;

        loop {
            match self
                .rpc_client
                .get_signature_status_with_commitment(signature, self.commitment)
                .await
            {
                Ok(Some(Ok(()))) => return Ok(true),
                Ok(Some(Err(e))) => {
                    return Err(Error::SubmissionRejected(format!(
                        "transaction {} failed: {}",
                        signature, e
                    )))
                }
                Ok(None) => failures = 0,
                Err(e) => {
                    failures += 1;
                    warn!("Signature status query failed for {}: {}", signature, e);
                }
            }

            match self
                .rpc_client
                .get_block_height_with_commitment(self.commitment)
                .await
            {
                Ok(height) if height > reference.last_valid_block_height => {
                    debug!(
                        "Block height {} passed horizon {} for {}",
                        height, reference.last_valid_block_height, signature
                    );
                    return Ok(false);
                }
                Ok(_) => {}
                Err(e) => {
                    failures += 1;
                    warn!("Block height query failed: {}", e);
                }
            }

            if failures >= MAX_CONSECUTIVE_QUERY_FAILURES {
                warn!(
                    "Giving up on confirming {} after {} failed queries",
                    signature, failures
                );
                return Ok(false);
            }

            tokio::time::sleep(self.confirm_poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn get_balance(&self, account: &Pubkey) -> Result<u64> {
        let response = self
            .rpc_client
            .get_balance_with_commitment(account, CommitmentConfig::confirmed())
            .await
            .map_err(|e| Error::BalanceQueryFailed(e.to_string()))?;

        Ok(response.value)
    }

    async fn latest_block_reference(&self) -> Result<BlockReference> {
        let (blockhash, last_valid_block_height) = self
            .rpc_client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(|e| Error::BlockReferenceFetchFailed(e.to_string()))?;

        debug!(
            "Fetched blockhash {} (valid through height {})",
            blockhash, last_valid_block_height
        );

        Ok(BlockReference {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn submit_transaction(
        &self,
        transaction: &Transaction,
        options: &SendOptions,
    ) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.preflight_commitment),
            // No node-side rebroadcast
            max_retries: Some(0),
            ..Default::default()
        };

        self.rpc_client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(|e| Error::SubmissionRejected(e.to_string()))
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        reference: &BlockReference,
    ) -> Result<bool> {
        match tokio::time::timeout(self.confirm_timeout, self.poll_confirmation(signature, reference))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Confirmation of {} still pending after {:?}",
                    signature, self.confirm_timeout
                );
                Ok(false)
            }
        }
    }
}
