//! Balance monitoring
//!
//! [`MonitorLoop::start`] spawns a control task that watches the signer's
//! balance and sweeps it into the target whenever it crosses the threshold.
//! Only one session per loop may be active at a time.

mod runner;
pub mod session;
pub mod threshold;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::sweep::SweepEngine;
use crate::units::{format_ether, Wei};

use runner::Runner;
pub use session::{MonitorSession, SessionState, SessionStatus, TransportMode};
pub use threshold::{CheckOutcome, ThresholdCheck};

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between poll cycles
    pub recheck_interval: Duration,

    /// Requested transport; the session may still end up polling
    pub use_push: bool,

    /// Default sweep trigger
    pub burn_threshold: Wei,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            recheck_interval: Duration::from_millis(3000),
            use_push: true,
            burn_threshold: crate::units::ETHER / 1000,
        }
    }
}

/// Per-session overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorOptions {
    pub threshold: Option<Wei>,
}

/// Starts and tracks monitoring sessions
pub struct MonitorLoop {
    engine: Arc<SweepEngine>,
    config: MonitorConfig,
    /// Id of the active session, 0 when none
    active: Arc<AtomicU64>,
    next_id: AtomicU64,
}

impl MonitorLoop {
    pub fn new(engine: Arc<SweepEngine>, config: MonitorConfig) -> Self {
        Self {
            engine,
            config,
            active: Arc::new(AtomicU64::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) != 0
    }

    /// Start a session sweeping into `target` (or the configured default).
    ///
    /// Returns `Ok(None)` without side effects when a session is already
    /// active. A missing signer or target is an error.
    pub fn start(
        &self,
        target: Option<Address>,
        options: MonitorOptions,
    ) -> Result<Option<MonitorSession>> {
        let account = self.engine.account()?;
        let target = self.engine.resolve_target(target)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if self
            .active
            .compare_exchange(0, id, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Already monitoring");
            return Ok(None);
        }

        let threshold = options.threshold.unwrap_or(self.config.burn_threshold);
        let transport = if self.config.use_push {
            TransportMode::Push
        } else {
            TransportMode::Poll
        };

        info!(
            session = id,
            to = ?target,
            threshold = %format_ether(threshold),
            %transport,
            "Starting balance monitoring"
        );

        let (status, _) = watch::channel(SessionStatus::active(transport));
        let status = Arc::new(status);
        let cancel = CancellationToken::new();

        let runner = Runner {
            engine: self.engine.clone(),
            check: ThresholdCheck::new(self.engine.clone(), target, threshold),
            account,
            interval: self.config.recheck_interval,
            cancel: cancel.clone(),
            status: status.clone(),
        };
        let task = tokio::spawn(runner.run(self.config.use_push));

        Ok(Some(MonitorSession {
            id,
            active_slot: self.active.clone(),
            cancel,
            status,
            task: Some(task),
            target,
            threshold,
        }))
    }
}
