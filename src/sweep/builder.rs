//! Sweep transaction assembly

use std::sync::Arc;

use ethers::types::Address;
use tracing::{debug, warn};

use super::fees::FeeEstimator;
use super::types::{SweepTransaction, TxStatus};
use crate::error::{Error, Result};
use crate::ledger::{LedgerClient, TRANSFER_GAS};
use crate::units::Wei;

/// Amount left after reserving the full fee, or `InsufficientBalance`
pub fn compute_sweep_amount(balance: Wei, gas_price: Wei, gas_limit: u64) -> Result<Wei> {
    let fee_cost = (gas_limit as Wei).saturating_mul(gas_price);
    match balance.checked_sub(fee_cost) {
        Some(amount) if amount > 0 => Ok(amount),
        _ => Err(Error::InsufficientBalance { balance, fee_cost }),
    }
}

/// Builds transfers that move an account's whole balance net of fees
pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerClient>,
    fees: Arc<FeeEstimator>,
    estimate_gas: bool,
}

impl TransactionBuilder {
    pub fn new(ledger: Arc<dyn LedgerClient>, fees: Arc<FeeEstimator>, estimate_gas: bool) -> Self {
        Self {
            ledger,
            fees,
            estimate_gas,
        }
    }

    /// Assemble a sweep of `account` into `target`.
    ///
    /// The balance is read here rather than passed in, so the amount reflects
    /// the latest state at build time.
    pub async fn build(&self, account: Address, target: Address) -> Result<SweepTransaction> {
        let balance = self.ledger.get_balance(account).await?;
        let gas_price = self.fees.estimate().await;
        let gas_limit = self.gas_limit(target, balance, gas_price).await;

        let value = compute_sweep_amount(balance, gas_price, gas_limit)?;
        let nonce = self.ledger.get_pending_nonce(account).await?;

        debug!(
            balance,
            value,
            gas_price,
            gas_limit,
            nonce,
            "Built sweep transaction"
        );

        Ok(SweepTransaction {
            to: target,
            value,
            gas_price,
            gas_limit,
            nonce,
            status: TxStatus::Built,
        })
    }

    /// Standard transfer cost, or a live estimate for the amount that would
    /// be sent at that cost. Estimating the full balance leaves nothing for
    /// gas and the node rejects it.
    async fn gas_limit(&self, target: Address, balance: Wei, gas_price: Wei) -> u64 {
        if !self.estimate_gas {
            return TRANSFER_GAS;
        }
        let Ok(amount) = compute_sweep_amount(balance, gas_price, TRANSFER_GAS) else {
            return TRANSFER_GAS;
        };
        match self.ledger.estimate_transfer_cost(target, amount).await {
            Ok(gas) => gas,
            Err(e) => {
                warn!(error = %e, "Gas estimation failed, using standard transfer cost");
                TRANSFER_GAS
            }
        }
    }
}
