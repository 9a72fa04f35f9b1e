//! New-block notification handle

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

/// Receiving end of a new-block feed.
///
/// Dropping the handle (or calling [`BlockSubscription::unsubscribe`]) cancels
/// the producer.
pub struct BlockSubscription {
    blocks: mpsc::Receiver<u64>,
    cancel: CancellationToken,
}

impl BlockSubscription {
    pub fn new(blocks: mpsc::Receiver<u64>, cancel: CancellationToken) -> Self {
        Self { blocks, cancel }
    }

    /// Next block number; `None` once the feed has closed
    pub async fn next_block(&mut self) -> Option<u64> {
        self.blocks.recv().await
    }

    /// Block number already buffered, without waiting
    pub fn try_next_block(&mut self) -> Option<u64> {
        match self.blocks.try_recv() {
            Ok(block) => Some(block),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain everything buffered and return the newest block with the count
    /// of notifications folded into it.
    pub fn coalesce(&mut self, latest: u64) -> (u64, usize) {
        let mut latest = latest;
        let mut skipped = 0;
        while let Some(block) = self.try_next_block() {
            latest = latest.max(block);
            skipped += 1;
        }
        (latest, skipped)
    }

    pub fn unsubscribe(self) {}
}

impl Drop for BlockSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_coalesce_keeps_latest() {
        let (tx, rx) = mpsc::channel(8);
        let mut subscription = BlockSubscription::new(rx, CancellationToken::new());

        for block in [10, 11, 12, 13] {
            tx.send(block).await.unwrap();
        }

        let first = subscription.next_block().await.unwrap();
        assert_eq!(first, 10);
        assert_eq!(subscription.coalesce(first), (13, 3));
        assert_eq!(subscription.try_next_block(), None);
    }

    #[tokio::test]
    async fn test_drop_cancels_producer() {
        let (_tx, rx) = mpsc::channel::<u64>(1);
        let cancel = CancellationToken::new();
        let subscription = BlockSubscription::new(rx, cancel.clone());

        assert!(!cancel.is_cancelled());
        subscription.unsubscribe();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_feed_yields_none() {
        let (tx, rx) = mpsc::channel::<u64>(1);
        let mut subscription = BlockSubscription::new(rx, CancellationToken::new());
        drop(tx);
        assert_eq!(subscription.next_block().await, None);
    }
}
