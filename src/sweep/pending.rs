//! Registry of submitted, unconfirmed sweeps

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use ethers::types::{Address, TxHash};
use tracing::{debug, info};

use crate::units::Wei;

/// A sweep the node accepted but that is not known to be mined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub submitted_at: DateTime<Utc>,
    pub amount: Wei,
    pub target: Address,
    pub nonce: u64,
}

/// Point-in-time view of a pending entry
#[derive(Debug, Clone)]
pub struct PendingSnapshot {
    pub tx_hash: TxHash,
    pub entry: PendingEntry,
    pub age: ChronoDuration,
}

/// Pending transactions keyed by hash.
///
/// Entries leave only on confirmation; a confirmation timeout keeps them so
/// the operator can follow up.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: DashMap<TxHash, PendingEntry>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn register(&self, tx_hash: TxHash, amount: Wei, target: Address, nonce: u64) {
        self.entries.insert(
            tx_hash,
            PendingEntry {
                submitted_at: Utc::now(),
                amount,
                target,
                nonce,
            },
        );
        debug!(?tx_hash, nonce, "Tracking pending sweep");
    }

    /// Drop a confirmed entry
    pub fn confirm(&self, tx_hash: &TxHash) -> Option<PendingEntry> {
        let removed = self.entries.remove(tx_hash).map(|(_, entry)| entry);
        if removed.is_some() {
            info!(?tx_hash, "Pending sweep confirmed");
        }
        removed
    }

    pub fn get(&self, tx_hash: &TxHash) -> Option<PendingEntry> {
        self.entries.get(tx_hash).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries with their current age, oldest first
    pub fn snapshot(&self) -> Vec<PendingSnapshot> {
        let now = Utc::now();
        let mut snapshot: Vec<PendingSnapshot> = self
            .entries
            .iter()
            .map(|item| PendingSnapshot {
                tx_hash: *item.key(),
                entry: item.value().clone(),
                age: now.signed_duration_since(item.value().submitted_at),
            })
            .collect();
        snapshot.sort_by_key(|s| s.entry.submitted_at);
        snapshot
    }

    /// Entries older than `max_age`
    pub fn stale(&self, max_age: ChronoDuration) -> Vec<PendingSnapshot> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.age > max_age)
            .collect()
    }
}
