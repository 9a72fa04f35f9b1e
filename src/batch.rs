//! Multi-target batch sweeping
//!
//! Targets are processed in fixed-size chunks. Attempts inside a chunk start
//! staggered and run concurrently; the next chunk waits for every attempt of
//! the previous one to settle. One target failing never affects the others.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use futures::future::join_all;
use tracing::{error, info};

use crate::sweep::{BurnOptions, BurnOutcome, SweepEngine};

/// Batch scheduling configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Targets per chunk
    pub batch_size: usize,

    /// Start delay between consecutive attempts in a chunk
    pub stagger: Duration,

    /// Pause between chunks
    pub chunk_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            stagger: Duration::from_millis(100),
            chunk_delay: Duration::from_millis(1000),
        }
    }
}

/// Result for one target of a batch
#[derive(Debug)]
pub enum TargetOutcome {
    /// The sweep ran; `outcome` is `None` when the balance was under the minimum
    Swept {
        target: Address,
        chunk: usize,
        outcome: Option<BurnOutcome>,
    },
    Failed {
        target: Address,
        chunk: usize,
        reason: String,
    },
}

impl TargetOutcome {
    pub fn target(&self) -> Address {
        match self {
            TargetOutcome::Swept { target, .. } | TargetOutcome::Failed { target, .. } => *target,
        }
    }

    pub fn chunk(&self) -> usize {
        match self {
            TargetOutcome::Swept { chunk, .. } | TargetOutcome::Failed { chunk, .. } => *chunk,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TargetOutcome::Swept { .. })
    }
}

/// Sizes of the chunks `total` targets split into
pub fn chunk_sizes(total: usize, batch_size: usize) -> Vec<usize> {
    let batch_size = batch_size.max(1);
    (0..total)
        .step_by(batch_size)
        .map(|start| batch_size.min(total - start))
        .collect()
}

/// Fans sweeps out over many targets
pub struct BatchScheduler {
    engine: Arc<SweepEngine>,
    config: BatchConfig,
}

impl BatchScheduler {
    pub fn new(engine: Arc<SweepEngine>, config: BatchConfig) -> Self {
        Self { engine, config }
    }

    /// Sweep into each target; one outcome per target, in input order
    pub async fn batch_burn(&self, targets: &[Address], options: BurnOptions) -> Vec<TargetOutcome> {
        let batch_size = self.config.batch_size.max(1);
        let chunk_count = targets.len().div_ceil(batch_size);

        info!(
            targets = targets.len(),
            chunks = chunk_count,
            batch_size,
            "Starting batch burn"
        );

        let mut results = Vec::with_capacity(targets.len());

        for (chunk, addresses) in targets.chunks(batch_size).enumerate() {
            let attempts = addresses.iter().enumerate().map(|(index, &target)| {
                let engine = self.engine.clone();
                let delay = self.config.stagger * index as u32;
                async move {
                    tokio::time::sleep(delay).await;
                    match engine.execute_burn(Some(target), options).await {
                        Ok(outcome) => TargetOutcome::Swept {
                            target,
                            chunk,
                            outcome,
                        },
                        Err(e) => {
                            error!(to = ?target, error = %e, "Failed to burn to target");
                            TargetOutcome::Failed {
                                target,
                                chunk,
                                reason: e.to_string(),
                            }
                        }
                    }
                }
            });

            results.extend(join_all(attempts).await);

            if chunk + 1 < chunk_count {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "Batch burn finished"
        );

        results
    }
}
