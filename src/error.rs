//! Error types for the balance sweeper

use ethers::types::TxHash;
use thiserror::Error;

use crate::units::Wei;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the balance sweeper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Connection errors
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Block subscription failed: {0}")]
    Subscription(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    // Sweep errors
    #[error("Insufficient balance: {balance} wei cannot cover fee cost of {fee_cost} wei")]
    InsufficientBalance { balance: Wei, fee_cost: Wei },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Transaction {tx_hash:?} not confirmed within {timeout_ms}ms")]
    TransactionTimeout { tx_hash: TxHash, timeout_ms: u64 },

    #[error("Transaction {0:?} reverted")]
    TransactionReverted(TxHash),

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Rpc(_) | Error::Connection(_))
    }

    /// Check if this error is a configuration problem that needs an operator
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::InvalidKey(_) | Error::InvalidAddress(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
