//! Emergency sweep
//!
//! Halts monitoring and sweeps everything at an elevated fee multiplier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::types::Address;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::monitor::MonitorSession;
use crate::sweep::{BurnOptions, BurnOutcome, SweepEngine};

/// Emergency configuration
#[derive(Debug, Clone)]
pub struct EmergencyConfig {
    /// Fee multiplier for the emergency sweep, as a percentage
    pub fee_multiplier_pct: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            fee_multiplier_pct: 300,
        }
    }
}

/// Clears the emergency flag on every exit path
struct EmergencyFlag<'a>(&'a AtomicBool);

impl<'a> EmergencyFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for EmergencyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct EmergencyController {
    engine: Arc<SweepEngine>,
    config: EmergencyConfig,
    active: AtomicBool,
}

impl EmergencyController {
    pub fn new(engine: Arc<SweepEngine>, config: EmergencyConfig) -> Self {
        Self {
            engine,
            config,
            active: AtomicBool::new(false),
        }
    }

    /// Whether an emergency sweep is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop `session` (if any) and sweep into `target` at the emergency fee
    /// multiplier, waiting for confirmation.
    ///
    /// A monitor sweep already in flight finishes before the multiplier is
    /// raised. The normal multiplier is restored whether or not the sweep
    /// succeeds.
    pub async fn emergency_burn_all(
        &self,
        mut session: Option<&mut MonitorSession>,
        target: Option<Address>,
    ) -> Result<Option<BurnOutcome>> {
        warn!("EMERGENCY BURN MODE ACTIVATED");
        let _flag = EmergencyFlag::raise(&self.active);

        let target = self.engine.resolve_target(target).map_err(|_| {
            Error::Config("Target address not provided for emergency burn".to_string())
        })?;

        if let Some(session) = session.as_deref_mut() {
            session.enter_emergency();
            session.wait_stopped().await;
        }

        let result = {
            let multiplier = self
                .engine
                .fees()
                .override_multiplier(self.config.fee_multiplier_pct);
            info!(
                from_pct = multiplier.previous(),
                to_pct = self.config.fee_multiplier_pct,
                "Emergency fee multiplier applied"
            );
            self.engine
                .execute_burn(Some(target), BurnOptions::confirmed())
                .await
        };

        if let Some(session) = session {
            session.stop();
        }

        match &result {
            Ok(_) => info!("Emergency burn completed successfully"),
            Err(e) => error!(error = %e, "Emergency burn failed"),
        }
        result
    }
}
