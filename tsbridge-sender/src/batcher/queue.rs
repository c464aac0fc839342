//! Bounded work queue shared by the producer and the worker pool.
//!
//! The queue is the only structure shared between a `send` call and the
//! workers. A full queue suspends the producer until a worker takes an item,
//! which is what throttles fast producers to the pace of the store.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tsbridge_core::{BatchResult, Destination, PointBatch};

use super::metrics::SenderMetrics;

/// Error types for queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue no longer accepts items; the rejected item is handed back
    #[error("Queue is closed")]
    Closed(Box<WorkItem>),
}

/// One batch waiting to be sent, with where it goes and who wants the result
#[derive(Debug)]
pub struct WorkItem {
    /// The points to write
    pub batch: PointBatch,
    /// Metric and tags shared by every batch of the call
    pub destination: Arc<Destination>,
    /// Write endpoint for this call
    pub url: Arc<str>,
    /// Timeout of each write request
    pub timeout: Duration,
    /// Result queue of the `send` call that produced this item, keyed by batch index
    results: mpsc::UnboundedSender<(usize, BatchResult)>,
}

impl WorkItem {
    pub fn new(
        batch: PointBatch,
        destination: Arc<Destination>,
        url: Arc<str>,
        timeout: Duration,
        results: mpsc::UnboundedSender<(usize, BatchResult)>,
    ) -> Self {
        Self {
            batch,
            destination,
            url,
            timeout,
            results,
        }
    }

    /// Hand the outcome of this batch back to its `send` call
    pub fn complete(self, result: BatchResult) {
        // the caller only goes away once every item has reported
        let _ = self.results.send((self.batch.index(), result));
    }

    /// Report this batch as dropped without being sent
    pub fn abandon(self, metrics: &SenderMetrics, reason: &str) {
        let points = self.batch.len();
        metrics.record_abandoned(points);
        let message = format!("batch {} abandoned: {}", self.batch.index(), reason);
        self.complete(BatchResult::aborted_batch(points as u64, message));
    }
}

/// Bounded multi-consumer FIFO of [`WorkItem`]s
pub struct WorkQueue {
    /// Producer side; taken out when the queue is closed
    sender: StdMutex<Option<mpsc::Sender<WorkItem>>>,
    /// Consumer side, shared by all workers
    receiver: Mutex<mpsc::Receiver<WorkItem>>,
    /// Maximum number of waiting items
    capacity: usize,
    /// Metrics for monitoring
    metrics: Arc<SenderMetrics>,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize, metrics: Arc<SenderMetrics>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sender: StdMutex::new(Some(tx)),
            receiver: Mutex::new(rx),
            capacity: capacity.max(1),
            metrics,
        }
    }

    /// Get a producer handle, unless the queue was closed
    pub fn producer(&self) -> Option<mpsc::Sender<WorkItem>> {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Push an item, waiting while the queue is full
    ///
    /// Dropping the returned future before it completes drops the item
    /// without enqueueing it.
    pub async fn push(&self, producer: &mpsc::Sender<WorkItem>, item: WorkItem) -> Result<(), QueueError> {
        let permit = match producer.reserve().await {
            Ok(permit) => permit,
            Err(_) => return Err(QueueError::Closed(Box::new(item))),
        };
        // counted before the send so a fast worker never sees a negative depth
        self.metrics.record_queued();
        permit.send(item);
        tracing::trace!(queue_depth = self.metrics.queue_depth(), "Batch enqueued");
        Ok(())
    }

    /// Take the next item, waiting until one is available
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<WorkItem> {
        let item = self.receiver.lock().await.recv().await?;
        self.metrics.record_dequeued();
        Some(item)
    }

    /// Remove every waiting item without blocking on new ones
    pub async fn drain(&self) -> Vec<WorkItem> {
        let mut receiver = self.receiver.lock().await;
        let mut items = Vec::new();
        while let Ok(item) = receiver.try_recv() {
            self.metrics.record_dequeued();
            items.push(item);
        }
        items
    }

    /// Stop accepting items; workers exit once the queue is drained
    ///
    /// Returns `true` if this call closed the queue.
    pub fn close(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .map(|s| s.is_none())
            .unwrap_or(true)
    }

    /// Get current queue depth
    pub fn depth(&self) -> u64 {
        self.metrics.queue_depth()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
