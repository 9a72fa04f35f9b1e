//! Balance Sweeper Library
//!
//! Watches an exposed EVM account and sweeps its balance into a secure
//! wallet whenever it crosses a threshold.

pub mod batch;
pub mod cli;
pub mod config;
pub mod emergency;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod sweep;
pub mod units;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
