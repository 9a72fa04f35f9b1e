//! Sweep execution
//!
//! Drives one sweep end to end: minimum-balance gate, build, submit, track,
//! optionally wait for the receipt. Nonce conflicts rebuild the whole
//! transaction against a freshly read pending nonce, a bounded number of times.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use tracing::{error, info, warn};

use super::builder::TransactionBuilder;
use super::fees::{FeeConfig, FeeEstimator};
use super::pending::PendingRegistry;
use super::types::{BurnOptions, BurnOutcome, TxStatus};
use crate::error::{Error, Result};
use crate::ledger::LedgerClient;
use crate::units::{format_ether, format_gwei, Wei};

/// Upper bound on submission attempts per sweep
pub const MAX_SUBMIT_ATTEMPTS: u32 = 3;

/// Sweep engine configuration
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Balances at or below this are left alone
    pub minimum_balance: Wei,

    /// Bound on the confirmation wait
    pub confirmation_timeout: Duration,

    /// Attempts per sweep when the node reports a nonce conflict (1..=3)
    pub max_submit_attempts: u32,

    /// Destination used when a call does not name one
    pub default_target: Option<Address>,

    /// Ask the node for a gas estimate instead of the fixed transfer cost
    pub estimate_gas: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            minimum_balance: crate::units::ETHER / 1000,
            confirmation_timeout: Duration::from_secs(30),
            max_submit_attempts: 2,
            default_target: None,
            estimate_gas: false,
        }
    }
}

/// Network summary for the stats command
#[derive(Debug, Clone)]
pub struct NetworkStats {
    pub chain_id: u64,
    pub block_number: u64,
    pub fee_price: Wei,
    pub signer: Option<Address>,
    pub balance: Option<Wei>,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Chain ID:      {}", self.chain_id)?;
        writeln!(f, "Current block: {}", self.block_number)?;
        writeln!(f, "Gas price:     {} gwei", format_gwei(self.fee_price))?;
        match self.balance {
            Some(balance) => writeln!(f, "Balance:       {} ETH", format_ether(balance))?,
            None => writeln!(f, "Balance:       N/A")?,
        }
        match self.signer {
            Some(signer) => write!(f, "Wallet:        {:?}", signer),
            None => write!(f, "Wallet:        N/A"),
        }
    }
}

/// Executes sweeps against a ledger
pub struct SweepEngine {
    ledger: Arc<dyn LedgerClient>,
    fees: Arc<FeeEstimator>,
    builder: TransactionBuilder,
    pending: PendingRegistry,
    config: SweepConfig,
}

impl SweepEngine {
    pub fn new(ledger: Arc<dyn LedgerClient>, fee_config: &FeeConfig, config: SweepConfig) -> Self {
        let fees = Arc::new(FeeEstimator::new(ledger.clone(), fee_config));
        let builder = TransactionBuilder::new(ledger.clone(), fees.clone(), config.estimate_gas);
        Self {
            ledger,
            fees,
            builder,
            pending: PendingRegistry::new(),
            config,
        }
    }

    pub fn fees(&self) -> &FeeEstimator {
        &self.fees
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Explicit target, else the configured default
    pub fn resolve_target(&self, target: Option<Address>) -> Result<Address> {
        target
            .or(self.config.default_target)
            .ok_or_else(|| Error::Config("Target address not provided".to_string()))
    }

    /// The signing account
    pub fn account(&self) -> Result<Address> {
        self.ledger
            .signer_address()
            .ok_or_else(|| Error::Config("Wallet not initialized: no private key".to_string()))
    }

    pub async fn balance(&self) -> Result<Wei> {
        let account = self.account()?;
        self.ledger.get_balance(account).await
    }

    pub async fn network_stats(&self) -> Result<NetworkStats> {
        let chain_id = self.ledger.chain_id().await?;
        let block_number = self.ledger.get_block_number().await?;
        let fee_price = self.ledger.get_fee_price().await?;
        let signer = self.ledger.signer_address();
        let balance = match signer {
            Some(account) => Some(self.ledger.get_balance(account).await?),
            None => None,
        };

        Ok(NetworkStats {
            chain_id,
            block_number,
            fee_price,
            signer,
            balance,
        })
    }

    /// Sweep the signer's balance into `target` (or the default target).
    ///
    /// Returns `Ok(None)` when the balance does not exceed the minimum.
    pub async fn execute_burn(
        &self,
        target: Option<Address>,
        options: BurnOptions,
    ) -> Result<Option<BurnOutcome>> {
        let account = self.account()?;
        let target = self.resolve_target(target)?;
        let max_attempts = self.config.max_submit_attempts.clamp(1, MAX_SUBMIT_ATTEMPTS);

        let mut attempt = 1;
        loop {
            match self.try_burn(account, target, options).await {
                Err(Error::NonceConflict(reason)) if attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        reason = %reason,
                        "Nonce conflict, rebuilding with fresh nonce"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    error!(to = ?target, error = %e, "Burn transaction failed");
                    return Err(e);
                }
                Ok(outcome) => return Ok(outcome),
            }
        }
    }

    /// One build-submit-track attempt
    async fn try_burn(
        &self,
        account: Address,
        target: Address,
        options: BurnOptions,
    ) -> Result<Option<BurnOutcome>> {
        let balance = self.ledger.get_balance(account).await?;
        if balance <= self.config.minimum_balance {
            info!(
                balance = %format_ether(balance),
                minimum = %format_ether(self.config.minimum_balance),
                "Balance too low to burn"
            );
            return Ok(None);
        }

        let mut transaction = self.builder.build(account, target).await?;

        info!(
            to = ?target,
            amount = %format_ether(transaction.value),
            gas_price_gwei = %format_gwei(transaction.gas_price),
            gas_limit = transaction.gas_limit,
            nonce = transaction.nonce,
            "Executing balance burn"
        );

        let handle = self.ledger.submit(&transaction).await?;
        transaction.status = TxStatus::Submitted;
        self.pending
            .register(handle.tx_hash, transaction.value, target, handle.nonce);

        info!(tx_hash = ?handle.tx_hash, "Transaction sent");

        if !options.wait_for_confirmation {
            return Ok(Some(BurnOutcome::Submitted {
                transaction,
                handle,
            }));
        }

        info!("Waiting for confirmation...");
        let receipt = self
            .ledger
            .wait_confirmation(&handle, self.config.confirmation_timeout)
            .await?;

        // Mined either way, so the entry is no longer pending
        self.pending.confirm(&handle.tx_hash);

        if !receipt.success {
            return Err(Error::TransactionReverted(handle.tx_hash));
        }

        transaction.status = TxStatus::Confirmed;
        info!(
            block = receipt.block_number,
            gas_used = receipt.gas_used,
            "Transaction confirmed"
        );

        Ok(Some(BurnOutcome::Confirmed {
            transaction,
            receipt,
        }))
    }
}
