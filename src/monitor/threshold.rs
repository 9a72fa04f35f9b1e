//! Threshold-triggered sweeping

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::types::Address;
use tracing::{debug, warn};

use crate::error::Result;
use crate::sweep::{BurnOptions, BurnOutcome, SweepEngine};
use crate::units::{format_ether, Wei};

/// What a threshold check did
#[derive(Debug)]
pub enum CheckOutcome {
    /// Balance at or under the threshold
    BelowThreshold,
    /// Another sweep from this check is still running
    InFlight,
    /// A sweep ran; `None` when the engine found nothing worth sending
    Swept(Option<BurnOutcome>),
}

/// Sweeps into a fixed target whenever the balance exceeds the threshold.
///
/// At most one sweep per check runs at a time; overlapping calls return
/// [`CheckOutcome::InFlight`].
pub struct ThresholdCheck {
    engine: Arc<SweepEngine>,
    target: Address,
    threshold: Wei,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ThresholdCheck {
    pub fn new(engine: Arc<SweepEngine>, target: Address, threshold: Wei) -> Self {
        Self {
            engine,
            target,
            threshold,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn threshold(&self) -> Wei {
        self.threshold
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub async fn check_and_burn(&self, balance: Wei) -> Result<CheckOutcome> {
        if balance <= self.threshold {
            return Ok(CheckOutcome::BelowThreshold);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sweep already in flight, skipping check");
            return Ok(CheckOutcome::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        warn!(
            balance = %format_ether(balance),
            threshold = %format_ether(self.threshold),
            "Balance above threshold, triggering burn"
        );

        let outcome = self
            .engine
            .execute_burn(Some(self.target), BurnOptions::confirmed())
            .await?;
        Ok(CheckOutcome::Swept(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::ledger::mock::{Confirmation, MockLedger};
    use crate::sweep::{FeeConfig, SweepConfig};
    use crate::units::ETHER;

    fn check(ledger: Arc<MockLedger>, threshold: Wei) -> ThresholdCheck {
        let engine = Arc::new(SweepEngine::new(
            ledger,
            &FeeConfig::default(),
            SweepConfig::default(),
        ));
        ThresholdCheck::new(engine, Address::from_low_u64_be(0x5AFE), threshold)
    }

    #[tokio::test]
    async fn test_below_threshold_does_nothing() {
        let ledger = Arc::new(MockLedger::new().with_balance(ETHER));
        let check = check(ledger.clone(), ETHER);

        let outcome = check.check_and_burn(ETHER).await.unwrap();
        assert!(matches!(outcome, CheckOutcome::BelowThreshold));
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_above_threshold_sweeps_with_confirmation() {
        let ledger = Arc::new(MockLedger::new().with_balance(2 * ETHER));
        let check = check(ledger.clone(), ETHER);

        let outcome = check.check_and_burn(2 * ETHER).await.unwrap();
        match outcome {
            CheckOutcome::Swept(Some(burn)) => assert!(burn.is_confirmed()),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(ledger.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_submit_once() {
        let ledger = Arc::new(
            MockLedger::new()
                .with_balance(2 * ETHER)
                .with_confirmation(Confirmation::After(Duration::from_millis(50))),
        );
        let check = check(ledger.clone(), ETHER);

        let (first, second) = tokio::join!(
            check.check_and_burn(2 * ETHER),
            check.check_and_burn(2 * ETHER)
        );

        let outcomes = [first.unwrap(), second.unwrap()];
        let swept = outcomes
            .iter()
            .filter(|o| matches!(o, CheckOutcome::Swept(_)))
            .count();
        let in_flight = outcomes
            .iter()
            .filter(|o| matches!(o, CheckOutcome::InFlight))
            .count();
        assert_eq!((swept, in_flight), (1, 1));
        assert_eq!(ledger.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_guard_released_after_failure() {
        let ledger = Arc::new(
            MockLedger::new()
                .with_balance(2 * ETHER)
                .fail_next_submit(crate::Error::InsufficientFunds("rejected".into())),
        );
        let check = check(ledger.clone(), ETHER);

        assert!(check.check_and_burn(2 * ETHER).await.is_err());
        let outcome = check.check_and_burn(2 * ETHER).await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Swept(Some(_))));
    }
}
