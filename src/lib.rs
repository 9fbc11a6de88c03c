//! sweepgate library
//!
//! Observes a Solana account's balance, gates user actions behind a minimum
//! balance, and drives two independent effects: a cosmetic stage simulation
//! and a fee-aware sweep transfer to a fixed destination.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod ledger;
pub mod monitor;
pub mod session;
pub mod simulator;
pub mod status;
pub mod workflow;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use workflow::Controller;
