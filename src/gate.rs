//! Eligibility gate
//!
//! Pure validation run at the moment the user acts. Checks short-circuit in a
//! fixed order: wallet, threshold, destination, amount, balance.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::session::Balance;

/// Default minimum balance (in SOL) required to pass the gate
pub const DEFAULT_MIN_BALANCE_SOL: f64 = 1000.0;

/// Why the gate refused an action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("Connect your wallet first.")]
    NoWallet,

    #[error("Requires at least {minimum} SOL to start (balance: {})", fmt_balance(.balance))]
    BelowThreshold { balance: Option<f64>, minimum: f64 },

    #[error("Destination address is invalid: {0}")]
    InvalidDestination(String),

    #[error("Enter a valid SOL amount.")]
    InvalidAmount,

    #[error("Amount {requested} SOL exceeds your balance of {available} SOL.")]
    InsufficientBalance { requested: f64, available: f64 },
}

fn fmt_balance(balance: &Option<f64>) -> String {
    match balance {
        Some(b) => format!("{} SOL", b),
        None => "unknown".to_string(),
    }
}

/// Gate thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct GatePolicy {
    pub min_balance_sol: f64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            min_balance_sol: DEFAULT_MIN_BALANCE_SOL,
        }
    }
}

/// A validated request. Never mutated after acceptance.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub destination: Pubkey,
    pub requested_sol: f64,
}

/// Accepted gate decision
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub account: Pubkey,
    pub balance_sol: f64,
    pub request: TransferRequest,
}

/// Parse a base58 account address.
///
/// Shared by the gate and the transfer executor so both agree on what a
/// valid address is.
pub fn parse_address(input: &str) -> Result<Pubkey, Rejection> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Rejection::InvalidDestination("address is empty".into()));
    }

    let bytes = bs58::decode(trimmed)
        .into_vec()
        .map_err(|e| Rejection::InvalidDestination(e.to_string()))?;

    let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        Rejection::InvalidDestination(format!("expected 32 bytes, got {}", b.len()))
    })?;

    Ok(Pubkey::new_from_array(bytes))
}

/// Strip everything but digits and '.' from typed amount input
pub fn sanitize_amount_input(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// Parse a typed amount; anything unparsable (including empty) is NaN
pub fn parse_amount(input: &str) -> f64 {
    sanitize_amount_input(input).parse::<f64>().unwrap_or(f64::NAN)
}

/// Validate a user action against the latest known balance
pub fn validate(
    account: Option<&Pubkey>,
    balance: &Balance,
    destination: &str,
    requested_sol: f64,
    policy: &GatePolicy,
) -> Result<Accepted, Rejection> {
    let account = account.ok_or(Rejection::NoWallet)?;

    let balance_sol = match balance.sol() {
        Some(b) if b >= policy.min_balance_sol => b,
        other => {
            return Err(Rejection::BelowThreshold {
                balance: other,
                minimum: policy.min_balance_sol,
            })
        }
    };

    let destination = parse_address(destination)?;

    if !requested_sol.is_finite() || requested_sol <= 0.0 {
        return Err(Rejection::InvalidAmount);
    }

    if requested_sol > balance_sol {
        return Err(Rejection::InsufficientBalance {
            requested: requested_sol,
            available: balance_sol,
        });
    }

    Ok(Accepted {
        account: *account,
        balance_sol,
        request: TransferRequest {
            destination,
            requested_sol,
        },
    })
}
