//! Fee price estimation
//!
//! Takes the network's current fee price, accelerates it by an integer
//! percentage and clamps the result to a configured ceiling. Integer
//! percentages keep the arithmetic exact on large wei values.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ledger::LedgerClient;
use crate::units::{format_gwei, Wei, GWEI};

/// Price used when the network fee query fails
pub const FALLBACK_FEE_PRICE: Wei = 20 * GWEI;

/// Fee estimator configuration
#[derive(Debug, Clone)]
pub struct FeeConfig {
    /// Acceleration multiplier as a percentage (150 = 1.5x)
    pub multiplier_pct: u32,

    /// Ceiling for the accelerated price
    pub max_fee_price: Wei,

    /// Price used when the ledger cannot report one
    pub fallback_fee_price: Wei,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            multiplier_pct: 150,
            max_fee_price: 200 * GWEI,
            fallback_fee_price: FALLBACK_FEE_PRICE,
        }
    }
}

/// Apply `pct` to `base` and clamp to `cap`
pub fn accelerate(base: Wei, multiplier_pct: u32, cap: Wei) -> Wei {
    let accelerated = base.saturating_mul(multiplier_pct as Wei) / 100;
    if accelerated > cap {
        cap
    } else {
        accelerated
    }
}

/// Bounded, accelerated fee price source
pub struct FeeEstimator {
    ledger: Arc<dyn LedgerClient>,
    multiplier_pct: AtomicU32,
    max_fee_price: Wei,
    fallback_fee_price: Wei,
}

impl FeeEstimator {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: &FeeConfig) -> Self {
        Self {
            ledger,
            multiplier_pct: AtomicU32::new(config.multiplier_pct),
            max_fee_price: config.max_fee_price,
            fallback_fee_price: config.fallback_fee_price,
        }
    }

    /// Current fee price to bid. Never fails: a failed query yields the
    /// fallback price.
    pub async fn estimate(&self) -> Wei {
        match self.ledger.get_fee_price().await {
            Ok(base) => {
                let multiplier_pct = self.multiplier_pct();
                let price = accelerate(base, multiplier_pct, self.max_fee_price);
                if price == self.max_fee_price {
                    debug!(
                        base = %format_gwei(base),
                        cap = %format_gwei(self.max_fee_price),
                        "Fee price clamped to maximum"
                    );
                }
                price
            }
            Err(e) => {
                warn!(error = %e, "Failed to get fee price, using fallback");
                self.fallback_fee_price.min(self.max_fee_price)
            }
        }
    }

    pub fn multiplier_pct(&self) -> u32 {
        self.multiplier_pct.load(Ordering::SeqCst)
    }

    pub fn max_fee_price(&self) -> Wei {
        self.max_fee_price
    }

    /// Swap in a temporary multiplier; the previous one comes back when the
    /// returned guard is dropped, on every exit path.
    pub fn override_multiplier(&self, multiplier_pct: u32) -> MultiplierOverride<'_> {
        let previous = self.multiplier_pct.swap(multiplier_pct, Ordering::SeqCst);
        MultiplierOverride {
            estimator: self,
            previous,
        }
    }
}

/// Scope guard returned by [`FeeEstimator::override_multiplier`]
pub struct MultiplierOverride<'a> {
    estimator: &'a FeeEstimator,
    previous: u32,
}

impl MultiplierOverride<'_> {
    /// Multiplier that will be restored
    pub fn previous(&self) -> u32 {
        self.previous
    }
}

impl Drop for MultiplierOverride<'_> {
    fn drop(&mut self) {
        self.estimator
            .multiplier_pct
            .store(self.previous, Ordering::SeqCst);
        debug!(multiplier_pct = self.previous, "Fee multiplier restored");
    }
}
