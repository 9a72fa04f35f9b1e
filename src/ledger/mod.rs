//! Ledger client abstraction
//!
//! The sweep core reaches the network only through [`LedgerClient`].
//!
//! ```text
//! SweepEngine ─┬─ FeeEstimator ──────┐
//!              └─ TransactionBuilder ┴─→ LedgerClient ─┬─ EvmLedger (HTTP JSON-RPC)
//!                                                      └─ block_stream (WebSocket newHeads)
//! ```

pub mod block_stream;
pub mod evm;
#[cfg(test)]
pub mod mock;
pub mod subscription;

use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, TxHash};

use crate::error::Result;
use crate::sweep::types::SweepTransaction;
use crate::units::Wei;

pub use block_stream::BlockStreamConfig;
pub use evm::EvmLedger;
pub use subscription::BlockSubscription;

/// Gas units consumed by a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Handle to a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    pub tx_hash: TxHash,
    pub nonce: u64,
}

/// Mined transaction summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    /// False when the transaction was mined but reverted
    pub success: bool,
}

/// Capabilities the sweep core needs from a ledger network
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the configured signer, if any
    fn signer_address(&self) -> Option<Address>;

    async fn chain_id(&self) -> Result<u64>;

    async fn get_balance(&self, account: Address) -> Result<Wei>;

    /// Current network fee price per gas unit
    async fn get_fee_price(&self) -> Result<Wei>;

    async fn get_block_number(&self) -> Result<u64>;

    /// Nonce including transactions still in the mempool
    async fn get_pending_nonce(&self, account: Address) -> Result<u64>;

    /// Live gas estimate for sending `amount` to `to` from the signer
    async fn estimate_transfer_cost(&self, to: Address, amount: Wei) -> Result<u64>;

    /// Open a new-block notification feed
    async fn subscribe_blocks(&self) -> Result<BlockSubscription>;

    /// Sign and submit a sweep transaction
    async fn submit(&self, tx: &SweepTransaction) -> Result<TxHandle>;

    /// Wait for the transaction to be mined, bounded by `timeout`.
    /// Expiry does not cancel the submission.
    async fn wait_confirmation(&self, handle: &TxHandle, timeout: Duration) -> Result<Receipt>;
}
