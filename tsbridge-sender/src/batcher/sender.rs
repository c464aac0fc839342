//! The batch sender.
//!
//! A sender splits a point sequence into batches and writes every batch with
//! up to [`MAX_ATTEMPTS`](super::attempt::MAX_ATTEMPTS) attempts. With one
//! worker it sends batches one after the other over a single session. With
//! more it feeds a bounded [`WorkQueue`] drained by a fixed pool of workers,
//! each holding its own session. The pool is started once and serves every
//! `send` call until the sender is closed, aborted or dropped.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use tsbridge_core::{
    put_url, split_batches, BatchResult, BatchTransport, Destination, Point, PointBatch, Tags,
};

use super::attempt::send_batch;
use super::config::SenderConfig;
use super::metrics::SenderMetrics;
use super::queue::{QueueError, WorkItem, WorkQueue};
use super::worker::Worker;
use crate::error::SendError;

/// Lifecycle of a sender
///
/// `Created -> Running -> Sending* -> Draining -> Idle`. `Aborted` can be
/// entered from any state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderState {
    /// No batch sent yet and no worker started
    Created,
    /// Ready to send
    Running,
    /// At least one `send` call in progress
    Sending,
    /// Closed, workers finishing queued batches
    Draining,
    /// Closed and every worker has exited
    Idle,
    /// Aborted: no new batch will be started
    Aborted,
}

enum Mode<T: BatchTransport> {
    Synchronous {
        session: T,
    },
    Concurrent {
        queue: Arc<WorkQueue>,
        tracker: TaskTracker,
        workers: usize,
    },
}

/// Splits points into batches and writes them to the store
pub struct BatchSender<T: BatchTransport> {
    config: SenderConfig,
    mode: Mode<T>,
    cancel: CancellationToken,
    done: AtomicBool,
    running: AtomicBool,
    joined: AtomicBool,
    active_sends: AtomicUsize,
    metrics: Arc<SenderMetrics>,
}

impl<T: BatchTransport> BatchSender<T> {
    /// Create a sender writing through `transport`
    ///
    /// In concurrent mode the worker pool is spawned on the current Tokio
    /// runtime, so this must be called from within one.
    pub fn new(config: SenderConfig, transport: T) -> Result<Self, SendError> {
        config.validate().map_err(SendError::InvalidArgument)?;

        let metrics = Arc::new(SenderMetrics::new());
        let cancel = CancellationToken::new();

        let mode = if config.is_concurrent() {
            let runtime = Handle::try_current().map_err(|e| SendError::Runtime(e.to_string()))?;
            let queue = Arc::new(WorkQueue::new(config.queue_capacity, metrics.clone()));
            let tracker = TaskTracker::new();
            let workers = config.effective_workers();

            for id in 0..workers {
                let worker = Worker {
                    id,
                    transport: transport.session(),
                    queue: queue.clone(),
                    cancel: cancel.clone(),
                    metrics: metrics.clone(),
                };
                tracker.spawn_on(worker.run(), &runtime);
            }
            tracker.close();

            info!(
                workers,
                queue_capacity = config.queue_capacity,
                host = %config.host,
                port = config.port,
                "Sender worker pool started"
            );
            Mode::Concurrent {
                queue,
                tracker,
                workers,
            }
        } else {
            debug!(host = %config.host, port = config.port, "Synchronous sender created");
            Mode::Synchronous { session: transport }
        };

        Ok(Self {
            running: AtomicBool::new(matches!(mode, Mode::Concurrent { .. })),
            config,
            mode,
            cancel,
            done: AtomicBool::new(false),
            joined: AtomicBool::new(false),
            active_sends: AtomicUsize::new(0),
            metrics,
        })
    }

    /// Write `points` to `metric` with `tags`
    ///
    /// Partial failures are reported in the returned [`BatchResult`], never
    /// as an error. Every point ends up counted in either `success` or
    /// `failed`, including batches dropped by an abort.
    #[instrument(skip(self, tags, points), fields(metric = %metric))]
    pub async fn send(
        &self,
        metric: &str,
        tags: &Tags,
        points: impl Into<Arc<[Point]>>,
        max_points_per_batch: usize,
        timeout: Duration,
    ) -> Result<BatchResult, SendError> {
        if metric.trim().is_empty() {
            return Err(SendError::invalid("metric must not be empty"));
        }
        let batch_size = NonZeroUsize::new(max_points_per_batch)
            .ok_or_else(|| SendError::invalid("max_points_per_batch must be > 0"))?;
        if timeout.is_zero() {
            return Err(SendError::invalid("timeout must be > 0"));
        }
        if self.cancel.is_cancelled() {
            return Err(SendError::Aborted);
        }
        if self.done.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }

        let started = Instant::now();
        let _active = ActiveSend::enter(&self.active_sends);
        self.running.store(true, Ordering::Release);

        let batches = split_batches(points, batch_size);
        self.metrics.record_created(batches.len());
        let destination = Destination::new(metric, tags.clone());
        let url = put_url(&self.config.host, self.config.port, timeout);
        debug!(batches = batches.len(), "Sending batches");

        let result = match &self.mode {
            Mode::Synchronous { session } => {
                self.send_sequential(session, &destination, &url, batches, timeout)
                    .await
            }
            Mode::Concurrent { queue, tracker, .. } => {
                self.send_pooled(queue, tracker, destination, url, batches, timeout)
                    .await
            }
        };
        let result = result.finish(started.elapsed());

        info!(
            success = result.success,
            failed = result.failed,
            timeouts = result.timeouts,
            duration_ms = result.duration.as_millis() as u64,
            "Send finished"
        );
        Ok(result)
    }

    /// Write `points` to `destination` with the configured batch size and timeout
    pub async fn write(
        &self,
        destination: &Destination,
        points: impl Into<Arc<[Point]>>,
    ) -> Result<BatchResult, SendError> {
        self.send(
            &destination.metric,
            &destination.tags,
            points,
            self.config.max_points_per_batch,
            self.config.timeout,
        )
        .await
    }

    async fn send_sequential(
        &self,
        session: &T,
        destination: &Destination,
        url: &str,
        batches: Vec<PointBatch>,
        timeout: Duration,
    ) -> BatchResult {
        let mut result = BatchResult::new();

        for batch in batches {
            if self.cancel.is_cancelled() {
                self.metrics.record_abandoned(batch.len());
                result.merge(abandoned(batch.index(), batch.len(), "sender aborted"));
                continue;
            }
            result.merge(send_batch(session, url, destination, &batch, timeout, &self.metrics).await);
        }

        result
    }

    async fn send_pooled(
        &self,
        queue: &WorkQueue,
        tracker: &TaskTracker,
        destination: Destination,
        url: String,
        batches: Vec<PointBatch>,
        timeout: Duration,
    ) -> BatchResult {
        let sizes: Vec<usize> = batches.iter().map(PointBatch::len).collect();
        let mut collected = Collected::new(sizes.len());
        let destination = Arc::new(destination);
        let url: Arc<str> = Arc::from(url);
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();

        if let Some(producer) = queue.producer() {
            for batch in batches {
                let item = WorkItem::new(
                    batch,
                    destination.clone(),
                    url.clone(),
                    timeout,
                    results_tx.clone(),
                );
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    pushed = queue.push(&producer, item) => {
                        if let Err(QueueError::Closed(item)) = pushed {
                            item.abandon(&self.metrics, "sender closed");
                            break;
                        }
                    }
                }
            }
        }
        drop(results_tx);

        let aborted = loop {
            tokio::select! {
                biased;
                received = results_rx.recv() => match received {
                    Some((index, partial)) => collected.add(index, partial),
                    None => break false,
                },
                _ = self.cancel.cancelled() => break true,
            }
        };

        if aborted {
            // in-flight sends finish before their worker exits
            tracker.wait().await;
            for item in queue.drain().await {
                item.abandon(&self.metrics, "sender aborted");
            }
            while let Ok((index, partial)) = results_rx.try_recv() {
                collected.add(index, partial);
            }
        }

        collected.finish(&sizes, &self.metrics)
    }

    /// Stop starting new batches
    ///
    /// Sends already in flight run to completion. Batches still queued are
    /// reported as failed by the `send` call that produced them.
    pub fn abort(&self) {
        if !self.cancel.is_cancelled() {
            warn!(
                queued = self.queue_depth(),
                in_flight = self.metrics.in_flight(),
                "Sender aborted"
            );
        }
        self.cancel.cancel();
    }

    /// Abort unless the sender was already closed or aborted
    ///
    /// Returns `true` if this call aborted the sender.
    pub fn kill(&self) -> bool {
        if self.done.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            return false;
        }
        self.abort();
        true
    }

    /// Stop accepting `send` calls; workers exit once the queue is drained
    pub fn close(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Mode::Concurrent { queue, .. } = &self.mode {
            queue.close();
        }
        debug!("Sender closed");
    }

    /// Close the sender and wait for every worker to exit
    ///
    /// Bounded by `join_timeout` when one is configured.
    pub async fn wait(&self) -> Result<(), SendError> {
        match self.config.join_timeout {
            Some(limit) => self.wait_timeout(limit).await,
            None => {
                self.close();
                self.join().await;
                Ok(())
            }
        }
    }

    /// Close the sender and wait at most `limit` for the workers to exit
    ///
    /// On expiry the sender is aborted and [`SendError::JoinTimeout`] is
    /// returned; workers still in flight are left to finish on their own.
    pub async fn wait_timeout(&self, limit: Duration) -> Result<(), SendError> {
        self.close();
        match tokio::time::timeout(limit, self.join()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(limit_ms = limit.as_millis() as u64, "Workers did not stop in time");
                self.abort();
                Err(SendError::JoinTimeout(limit))
            }
        }
    }

    async fn join(&self) {
        if let Mode::Concurrent { queue, tracker, .. } = &self.mode {
            tracker.wait().await;
            for item in queue.drain().await {
                item.abandon(&self.metrics, "sender stopped");
            }
            debug!("Worker pool joined");
        }
        self.joined.store(true, Ordering::Release);
    }

    /// Whether no batch is waiting for a worker
    pub fn is_queue_empty(&self) -> bool {
        self.queue_depth() == 0
    }

    /// Number of batches waiting for a worker
    pub fn queue_depth(&self) -> u64 {
        match &self.mode {
            Mode::Synchronous { .. } => 0,
            Mode::Concurrent { queue, .. } => queue.depth(),
        }
    }

    /// Number of workers, 1 in synchronous mode
    pub fn workers(&self) -> usize {
        match &self.mode {
            Mode::Synchronous { .. } => 1,
            Mode::Concurrent { workers, .. } => *workers,
        }
    }

    pub fn is_concurrent(&self) -> bool {
        matches!(self.mode, Mode::Concurrent { .. })
    }

    pub fn state(&self) -> SenderState {
        if self.cancel.is_cancelled() {
            SenderState::Aborted
        } else if self.done.load(Ordering::Acquire) {
            if self.joined.load(Ordering::Acquire) {
                SenderState::Idle
            } else {
                SenderState::Draining
            }
        } else if self.active_sends.load(Ordering::Acquire) > 0 {
            SenderState::Sending
        } else if self.running.load(Ordering::Acquire) {
            SenderState::Running
        } else {
            SenderState::Created
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SenderMetrics> {
        &self.metrics
    }
}

impl<T: BatchTransport> Drop for BatchSender<T> {
    fn drop(&mut self) {
        // idle workers would otherwise wait on the queue forever
        if let Mode::Concurrent { queue, .. } = &self.mode {
            queue.close();
        }
    }
}

/// Counts a `send` call as active for as long as it lives
struct ActiveSend<'a>(&'a AtomicUsize);

impl<'a> ActiveSend<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ActiveSend<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Per-call result accumulator for the worker pool
struct Collected {
    result: BatchResult,
    reported: Vec<bool>,
}

impl Collected {
    fn new(batches: usize) -> Self {
        Self {
            result: BatchResult::new(),
            reported: vec![false; batches],
        }
    }

    fn add(&mut self, index: usize, partial: BatchResult) {
        if let Some(seen) = self.reported.get_mut(index) {
            *seen = true;
        }
        self.result.merge(partial);
    }

    /// Count every batch that never reported back as abandoned
    fn finish(mut self, sizes: &[usize], metrics: &SenderMetrics) -> BatchResult {
        for (index, (&size, seen)) in sizes.iter().zip(&self.reported).enumerate() {
            if !seen {
                metrics.record_abandoned(size);
                self.result.merge(abandoned(index, size, "sender aborted"));
            }
        }
        self.result
    }
}

fn abandoned(index: usize, points: usize, reason: &str) -> BatchResult {
    BatchResult::aborted_batch(points as u64, format!("batch {} abandoned: {}", index, reason))
}
