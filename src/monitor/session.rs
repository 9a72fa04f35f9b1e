//! Monitoring session handle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ethers::types::Address;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::units::Wei;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Emergency,
}

/// How balance checks are being triggered right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// New-block notifications
    Push,
    /// Fixed-interval polling
    Poll,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Push => write!(f, "push"),
            TransportMode::Poll => write!(f, "poll"),
        }
    }
}

/// Published session status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub transport: TransportMode,
    /// Completed balance checks
    pub cycles: u64,
    /// Checks that sent a sweep
    pub sweeps_triggered: u64,
    pub last_block: Option<u64>,
}

impl SessionStatus {
    pub(crate) fn active(transport: TransportMode) -> Self {
        Self {
            state: SessionState::Active,
            transport,
            cycles: 0,
            sweeps_triggered: 0,
            last_block: None,
        }
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle stops the session.
pub struct MonitorSession {
    pub(crate) id: u64,
    pub(crate) active_slot: Arc<AtomicU64>,
    pub(crate) cancel: CancellationToken,
    pub(crate) status: Arc<watch::Sender<SessionStatus>>,
    pub(crate) task: Option<JoinHandle<()>>,
    pub(crate) target: Address,
    pub(crate) threshold: Wei,
}

impl MonitorSession {
    pub fn target(&self) -> Address {
        self.target
    }

    pub fn threshold(&self) -> Wei {
        self.threshold
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.status.borrow().state == SessionState::Active
    }

    /// Stop monitoring.
    ///
    /// Cancels the pending tick or block wait and frees the loop for a new
    /// session. A sweep already running is left to finish; its result is
    /// dropped.
    pub fn stop(&self) {
        self.halt(SessionState::Idle);
    }

    /// Mark the session as pre-empted by an emergency sweep and halt it.
    /// The caller returns it to Idle with [`MonitorSession::stop`].
    pub fn enter_emergency(&self) {
        self.halt(SessionState::Emergency);
    }

    fn halt(&self, state: SessionState) {
        let was_running = !self.cancel.is_cancelled();
        self.cancel.cancel();
        let _ = self
            .active_slot
            .compare_exchange(self.id, 0, Ordering::SeqCst, Ordering::SeqCst);
        self.status.send_modify(|status| status.state = state);
        if was_running {
            info!(session = self.id, "Monitoring stopped");
        }
    }

    /// Wait for the control task to exit, including a sweep it already
    /// started. Call after halting the session.
    pub async fn wait_stopped(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Stop and wait for the control task to exit
    pub async fn join(mut self) {
        self.stop();
        self.wait_stopped().await;
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(slot: Arc<AtomicU64>, id: u64) -> MonitorSession {
        let (status, _) = watch::channel(SessionStatus::active(TransportMode::Poll));
        MonitorSession {
            id,
            active_slot: slot,
            cancel: CancellationToken::new(),
            status: Arc::new(status),
            task: None,
            target: Address::zero(),
            threshold: 0,
        }
    }

    #[test]
    fn test_stop_releases_own_slot() {
        let slot = Arc::new(AtomicU64::new(1));
        let session = session(slot.clone(), 1);

        session.stop();
        assert_eq!(slot.load(Ordering::SeqCst), 0);
        assert_eq!(session.status().state, SessionState::Idle);
        assert!(session.cancel.is_cancelled());
    }

    #[test]
    fn test_stop_leaves_newer_session_slot() {
        let slot = Arc::new(AtomicU64::new(2));
        let stale = session(slot.clone(), 1);

        stale.stop();
        assert_eq!(slot.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emergency_then_idle() {
        let slot = Arc::new(AtomicU64::new(3));
        let session = session(slot.clone(), 3);

        session.enter_emergency();
        assert_eq!(session.status().state, SessionState::Emergency);
        assert_eq!(slot.load(Ordering::SeqCst), 0);

        session.stop();
        assert_eq!(session.status().state, SessionState::Idle);
    }

    #[test]
    fn test_drop_stops() {
        let slot = Arc::new(AtomicU64::new(4));
        let session = session(slot.clone(), 4);
        let status = session.subscribe_status();

        drop(session);
        assert_eq!(slot.load(Ordering::SeqCst), 0);
        assert_eq!(status.borrow().state, SessionState::Idle);
    }
}
