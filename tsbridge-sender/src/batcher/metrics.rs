//! Metrics for the batch sender.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tsbridge_core::BatchResult;

/// Metrics for monitoring sender performance
///
/// Counters accumulate over the lifetime of a sender, across `send` calls.
#[derive(Debug, Default)]
pub struct SenderMetrics {
    /// Batches produced by splitting input points
    pub batches_created: AtomicU64,

    /// Batches currently waiting in the work queue
    pub batches_queued: AtomicU64,

    /// Batches currently being sent by a worker
    pub batches_in_flight: AtomicU64,

    /// Batches fully accepted by the store
    pub batches_succeeded: AtomicU64,

    /// Batches still reporting failures after the last attempt
    pub batches_failed: AtomicU64,

    /// Batches dropped without being sent because of an abort
    pub batches_abandoned: AtomicU64,

    /// Write requests issued, retries included
    pub attempts: AtomicU64,

    /// Write requests issued after a failed attempt
    pub retries: AtomicU64,

    /// Points accepted by the store
    pub points_succeeded: AtomicU64,

    /// Points rejected by the store or never delivered
    pub points_failed: AtomicU64,

    /// Total send time in milliseconds (for averaging)
    pub total_send_ms: AtomicU64,

    /// Maximum queue depth observed
    pub max_queue_depth: AtomicU64,
}

impl SenderMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record batches produced by a split
    pub fn record_created(&self, batches: usize) {
        self.batches_created.fetch_add(batches as u64, Ordering::Relaxed);
    }

    /// Record a batch entering the queue
    pub fn record_queued(&self) {
        let queued = self.batches_queued.fetch_add(1, Ordering::Relaxed) + 1;
        // Update max queue depth if needed
        let mut current_max = self.max_queue_depth.load(Ordering::Relaxed);
        while queued > current_max {
            match self.max_queue_depth.compare_exchange_weak(
                current_max,
                queued,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_max = x,
            }
        }
    }

    /// Record a batch leaving the queue
    pub fn record_dequeued(&self) {
        self.batches_queued.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a batch starting its send attempts
    pub fn record_started(&self) {
        self.batches_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one write request
    pub fn record_attempt(&self, retry: bool) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if retry {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the final outcome of a batch
    pub fn record_finished(&self, result: &BatchResult, send_time: Duration) {
        self.batches_in_flight.fetch_sub(1, Ordering::Relaxed);
        if result.failed == 0 {
            self.batches_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.points_succeeded.fetch_add(result.success, Ordering::Relaxed);
        self.points_failed.fetch_add(result.failed, Ordering::Relaxed);
        self.total_send_ms
            .fetch_add(send_time.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a batch dropped because of an abort
    pub fn record_abandoned(&self, points: usize) {
        self.batches_abandoned.fetch_add(1, Ordering::Relaxed);
        self.points_failed.fetch_add(points as u64, Ordering::Relaxed);
    }

    /// Get current queue depth
    pub fn queue_depth(&self) -> u64 {
        self.batches_queued.load(Ordering::Relaxed)
    }

    /// Get current in-flight count
    pub fn in_flight(&self) -> u64 {
        self.batches_in_flight.load(Ordering::Relaxed)
    }

    /// Calculate average send time per batch in milliseconds
    pub fn avg_send_ms(&self) -> f64 {
        let finished = self.batches_succeeded.load(Ordering::Relaxed)
            + self.batches_failed.load(Ordering::Relaxed);
        if finished == 0 {
            return 0.0;
        }
        self.total_send_ms.load(Ordering::Relaxed) as f64 / finished as f64
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_created: self.batches_created.load(Ordering::Relaxed),
            batches_queued: self.batches_queued.load(Ordering::Relaxed),
            batches_in_flight: self.batches_in_flight.load(Ordering::Relaxed),
            batches_succeeded: self.batches_succeeded.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            batches_abandoned: self.batches_abandoned.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            points_succeeded: self.points_succeeded.load(Ordering::Relaxed),
            points_failed: self.points_failed.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            avg_send_ms: self.avg_send_ms(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub batches_created: u64,
    pub batches_queued: u64,
    pub batches_in_flight: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
    pub batches_abandoned: u64,
    pub attempts: u64,
    pub retries: u64,
    pub points_succeeded: u64,
    pub points_failed: u64,
    pub max_queue_depth: u64,
    pub avg_send_ms: f64,
}
