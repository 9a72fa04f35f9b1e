//! Session control task
//!
//! One task per session. Push mode waits on new-block notifications and
//! drops back to polling, for the rest of the session, when the feed cannot
//! be opened or closes. Cycles run to completion inside the task, so they
//! never overlap.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::{SessionStatus, TransportMode};
use super::threshold::{CheckOutcome, ThresholdCheck};
use crate::ledger::BlockSubscription;
use crate::sweep::SweepEngine;
use crate::units::{format_ether, Wei};

pub(crate) struct Runner {
    pub engine: Arc<SweepEngine>,
    pub check: ThresholdCheck,
    pub account: Address,
    pub interval: Duration,
    pub cancel: CancellationToken,
    pub status: Arc<watch::Sender<SessionStatus>>,
}

impl Runner {
    pub async fn run(self, use_push: bool) {
        if use_push {
            match self.open_feed().await {
                Some(subscription) => {
                    info!("Using push monitoring (new block notifications)");
                    if self.run_push(subscription).await {
                        return;
                    }
                }
                None if self.cancel.is_cancelled() => return,
                None => {}
            }
            self.status
                .send_modify(|status| status.transport = TransportMode::Poll);
            info!("Falling back to polling");
        }

        self.run_poll().await;
    }

    async fn open_feed(&self) -> Option<BlockSubscription> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.engine.ledger().subscribe_blocks() => match result {
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    warn!(error = %e, "Push monitoring unavailable");
                    None
                }
            },
        }
    }

    /// Returns `true` when the session was stopped, `false` when the feed
    /// closed underneath it.
    async fn run_push(&self, mut subscription: BlockSubscription) -> bool {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => None,
                block = subscription.next_block() => Some(block),
            };

            let Some(next) = next else {
                subscription.unsubscribe();
                return true;
            };
            let Some(block) = next else {
                warn!("Block feed closed");
                return false;
            };

            let (block, coalesced) = subscription.coalesce(block);
            if coalesced > 0 {
                debug!(block, coalesced, "Coalesced queued block notifications");
            }

            self.run_cycle(Some(block)).await;
        }
    }

    async fn run_poll(&self) {
        info!(interval_ms = self.interval.as_millis() as u64, "Using polling monitoring");
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            self.run_cycle(None).await;

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Balance plus, in poll mode, the current height. `None` when the
    /// balance read fails.
    async fn read_state(&self, block: Option<u64>) -> Option<(Wei, Option<u64>)> {
        let ledger = self.engine.ledger();
        let balance = match ledger.get_balance(self.account).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(error = %e, "Monitoring error");
                return None;
            }
        };

        let block = match block {
            Some(block) => Some(block),
            None => match ledger.get_block_number().await {
                Ok(block) => Some(block),
                Err(e) => {
                    debug!(error = %e, "Block height unavailable");
                    None
                }
            },
        };

        Some((balance, block))
    }

    /// Read the balance and run the threshold check. Failures are logged and
    /// the session carries on. A stop during the reads ends the cycle before
    /// any sweep starts.
    async fn run_cycle(&self, block: Option<u64>) {
        let reads = tokio::select! {
            _ = self.cancel.cancelled() => None,
            reads = self.read_state(block) => Some(reads),
        };
        let Some(Some((balance, block))) = reads else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }

        info!(block = ?block, balance = %format_ether(balance), "Balance check");

        let result = self.check.check_and_burn(balance).await;

        if self.cancel.is_cancelled() {
            debug!("Session stopped during check, discarding result");
            return;
        }

        let swept = match result {
            Ok(CheckOutcome::Swept(Some(outcome))) => {
                info!(tx_hash = ?outcome.tx_hash(), "Threshold sweep completed");
                true
            }
            Ok(_) => false,
            Err(e) => {
                error!(error = %e, "Monitoring error");
                false
            }
        };

        self.status.send_modify(|status| {
            status.cycles += 1;
            if swept {
                status.sweeps_triggered += 1;
            }
            if block.is_some() {
                status.last_block = block;
            }
        });
    }
}
