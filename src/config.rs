//! Configuration loading and validation

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::pubkey::Pubkey;

use crate::gate::{parse_address, GatePolicy, DEFAULT_MIN_BALANCE_SOL};
use crate::simulator::StagePlan;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_commitment")]
    pub commitment: Commitment,
}

impl RpcConfig {
    pub fn commitment_config(&self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.commitment.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl From<Commitment> for CommitmentLevel {
    fn from(c: Commitment) -> Self {
        match c {
            Commitment::Processed => CommitmentLevel::Processed,
            Commitment::Confirmed => CommitmentLevel::Confirmed,
            Commitment::Finalized => CommitmentLevel::Finalized,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Seconds between balance polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Minimum balance in SOL before any action is allowed
    #[serde(default = "default_min_balance_sol")]
    pub min_balance_sol: f64,
}

impl GateConfig {
    pub fn policy(&self) -> GatePolicy {
        GatePolicy {
            min_balance_sol: self.min_balance_sol,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_balance_sol: default_min_balance_sol(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Fixed sweep destination. Must be set before transfers are possible.
    #[serde(default)]
    pub destination: String,
    /// Lamports left behind to cover network fees
    #[serde(default = "default_safety_buffer_lamports")]
    pub safety_buffer_lamports: u64,
    /// Milliseconds between confirmation status polls
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
    /// Upper bound on the confirmation wait; about 150 blocks at 400ms
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
}

impl TransferConfig {
    /// Parsed sweep destination
    pub fn destination(&self) -> Result<Pubkey> {
        if self.destination.trim().is_empty() {
            anyhow::bail!(
                "transfer.destination is not set (use SWEEPGATE__TRANSFER__DESTINATION or the config file)"
            );
        }
        parse_address(&self.destination)
            .with_context(|| format!("Invalid transfer.destination: {}", self.destination))
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            destination: String::new(),
            safety_buffer_lamports: default_safety_buffer_lamports(),
            confirm_poll_ms: default_confirm_poll_ms(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
        }
    }
}

/// Dwell times (milliseconds) for the simulated stage sequence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_eligibility_ms")]
    pub eligibility_ms: u64,
    #[serde(default = "default_routing_ms")]
    pub routing_ms: u64,
    #[serde(default = "default_bridging_ms")]
    pub bridging_ms: u64,
    #[serde(default = "default_bridging_step_ms")]
    pub bridging_step_ms: u64,
    #[serde(default = "default_finalizing_ms")]
    pub finalizing_ms: u64,
    /// Upper bound of random extra delay added to each stage
    #[serde(default)]
    pub jitter_ms: u64,
}

impl SimulatorConfig {
    pub fn plan(&self) -> StagePlan {
        StagePlan {
            eligibility: Duration::from_millis(self.eligibility_ms),
            routing: Duration::from_millis(self.routing_ms),
            bridging: Duration::from_millis(self.bridging_ms),
            bridging_step: Duration::from_millis(self.bridging_step_ms),
            finalizing: Duration::from_millis(self.finalizing_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            eligibility_ms: default_eligibility_ms(),
            routing_ms: default_routing_ms(),
            bridging_ms: default_bridging_ms(),
            bridging_step_ms: default_bridging_step_ms(),
            finalizing_ms: default_finalizing_ms(),
            jitter_ms: 0,
        }
    }
}

// Default value functions

fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.devnet.solana.com".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_commitment() -> Commitment {
    Commitment::Confirmed
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_min_balance_sol() -> f64 {
    DEFAULT_MIN_BALANCE_SOL
}

fn default_safety_buffer_lamports() -> u64 {
    50_000
}

fn default_confirm_poll_ms() -> u64 {
    500
}

fn default_confirm_timeout_secs() -> u64 {
    90
}

fn default_eligibility_ms() -> u64 { 1600 }
fn default_routing_ms() -> u64 { 2200 }
fn default_bridging_ms() -> u64 { 2400 }
fn default_bridging_step_ms() -> u64 { 300 }
fn default_finalizing_ms() -> u64 { 2000 }

impl Config {
    /// Load configuration from file and environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("rpc.commitment", "confirmed")?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SWEEPGATE_)
            .add_source(
                config::Environment::with_prefix("SWEEPGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }

        if self.monitor.poll_interval_secs == 0 {
            anyhow::bail!("monitor.poll_interval_secs must be positive");
        }

        if !self.gate.min_balance_sol.is_finite() || self.gate.min_balance_sol < 0.0 {
            anyhow::bail!("gate.min_balance_sol must be a non-negative number");
        }

        // An unset destination only disables transfers; a malformed one is an error
        if !self.transfer.destination.trim().is_empty() {
            self.transfer.destination()?;
        }

        if self.transfer.confirm_poll_ms == 0 {
            anyhow::bail!("transfer.confirm_poll_ms must be positive");
        }

        if self.transfer.confirm_timeout_secs == 0 {
            anyhow::bail!("transfer.confirm_timeout_secs must be positive");
        }

        if self.simulator.bridging_step_ms == 0 {
            anyhow::bail!("simulator.bridging_step_ms must be positive");
        }

        Ok(())
    }
}
