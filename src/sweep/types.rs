//! Core sweep types

use ethers::types::{Address, TxHash};

use crate::ledger::{Receipt, TxHandle};
use crate::units::Wei;

/// Lifecycle of a sweep transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Assembled, not yet handed to the network
    Built,
    /// Accepted by the node
    Submitted,
    /// Mined successfully
    Confirmed,
    /// Rejected, reverted, or never sent
    Failed,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Built => write!(f, "built"),
            TxStatus::Submitted => write!(f, "submitted"),
            TxStatus::Confirmed => write!(f, "confirmed"),
            TxStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A transfer that drains the account net of its own fee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTransaction {
    /// Destination (secure) account
    pub to: Address,

    /// Amount sent: balance minus `gas_limit * gas_price`
    pub value: Wei,

    /// Fee price per gas unit
    pub gas_price: Wei,

    /// Fee-unit limit
    pub gas_limit: u64,

    /// Pending-state nonce of the sending account
    pub nonce: u64,

    pub status: TxStatus,
}

impl SweepTransaction {
    /// Maximum fee this transaction can consume
    pub fn fee_cost(&self) -> Wei {
        self.gas_limit as Wei * self.gas_price
    }
}

/// Per-call options for a sweep
#[derive(Debug, Clone, Copy, Default)]
pub struct BurnOptions {
    /// Block until the transaction is mined or the confirmation timeout elapses
    pub wait_for_confirmation: bool,
}

impl BurnOptions {
    pub fn confirmed() -> Self {
        Self {
            wait_for_confirmation: true,
        }
    }
}

/// Result of a sweep that reached the network
#[derive(Debug, Clone)]
pub enum BurnOutcome {
    /// Submitted without waiting for confirmation
    Submitted {
        transaction: SweepTransaction,
        handle: TxHandle,
    },
    /// Submitted and mined
    Confirmed {
        transaction: SweepTransaction,
        receipt: Receipt,
    },
}

impl BurnOutcome {
    pub fn transaction(&self) -> &SweepTransaction {
        match self {
            BurnOutcome::Submitted { transaction, .. } => transaction,
            BurnOutcome::Confirmed { transaction, .. } => transaction,
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        match self {
            BurnOutcome::Submitted { handle, .. } => handle.tx_hash,
            BurnOutcome::Confirmed { receipt, .. } => receipt.tx_hash,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, BurnOutcome::Confirmed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::GWEI;

    #[test]
    fn test_fee_cost() {
        let tx = SweepTransaction {
            to: Address::zero(),
            value: 1,
            gas_price: 20 * GWEI,
            gas_limit: 21_000,
            nonce: 0,
            status: TxStatus::Built,
        };
        assert_eq!(tx.fee_cost(), 420_000 * GWEI);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TxStatus::Submitted.to_string(), "submitted");
        assert_eq!(TxStatus::Confirmed.to_string(), "confirmed");
    }
}
