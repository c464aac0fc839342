//! Up-to-three-attempt send of one batch, shared by both sender modes.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use tsbridge_core::{
    BatchResult, BatchTransport, Destination, PointBatch, PutRequest, PutSummary, TransportError,
};

use super::metrics::SenderMetrics;

/// Number of write requests issued for one batch before giving up
pub const MAX_ATTEMPTS: usize = 3;

/// Send `batch`, retrying until the store reports no failed point
///
/// The outcome of the last attempt is returned as-is: a batch that still
/// fails after [`MAX_ATTEMPTS`] only contributes its own failure counters.
pub async fn send_batch<T: BatchTransport>(
    transport: &T,
    url: &str,
    destination: &Destination,
    batch: &PointBatch,
    timeout: Duration,
    metrics: &SenderMetrics,
) -> BatchResult {
    let started = Instant::now();
    metrics.record_started();

    let result = match PutRequest::encode(url, destination, batch, timeout) {
        Ok(request) => attempt(transport, &request, batch.index(), metrics).await,
        Err(e) => BatchResult::transport_failure(batch.len() as u64, &e),
    };

    metrics.record_finished(&result, started.elapsed());
    result
}

async fn attempt<T: BatchTransport>(
    transport: &T,
    request: &PutRequest,
    batch_index: usize,
    metrics: &SenderMetrics,
) -> BatchResult {
    let mut outcome: Result<PutSummary, TransportError> =
        Err(TransportError::connection("no attempt made"));

    for attempt in 1..=MAX_ATTEMPTS {
        metrics.record_attempt(attempt > 1);
        outcome = transport.put(request).await;

        match &outcome {
            Ok(summary) if summary.is_complete() => {
                debug!(
                    batch = batch_index,
                    attempt,
                    success = summary.stored(request.point_count as u64),
                    "Batch written"
                );
                break;
            }
            Ok(summary) => {
                warn!(
                    batch = batch_index,
                    attempt,
                    failed = summary.failed,
                    "Store rejected points"
                );
            }
            Err(e) => {
                warn!(batch = batch_index, attempt, error = %e, "Batch write failed");
            }
        }
    }

    match outcome {
        Ok(summary) => BatchResult {
            success: summary.stored(request.point_count as u64),
            timeouts: summary.timeouts,
            errors: summary.errors,
            failed: summary.failed,
            duration: Duration::ZERO,
        },
        Err(e) => BatchResult::transport_failure(request.point_count as u64, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;
    use tsbridge_core::{split_batches, Point, Tags};

    /// Transport replaying a fixed list of answers
    struct Scripted {
        answers: Mutex<VecDeque<Result<PutSummary, TransportError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<PutSummary, TransportError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl BatchTransport for Scripted {
        fn session(&self) -> Self {
            Self::new(Vec::new())
        }

        async fn put(&self, request: &PutRequest) -> Result<PutSummary, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PutSummary::accepted(request.point_count as u64)))
        }
    }

    fn batch(n: usize) -> PointBatch {
        let points: Vec<Point> = (0..n).map(|i| Point::new(i as i64, 0.0)).collect();
        split_batches(points, NonZeroUsize::new(n).unwrap()).remove(0)
    }

    async fn run(transport: &Scripted, metrics: &SenderMetrics) -> BatchResult {
        let destination = Destination::new("m", Tags::new());
        send_batch(transport, "http://x/api/put", &destination, &batch(4), Duration::from_secs(1), metrics).await
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let transport = Scripted::new(vec![]);
        let metrics = SenderMetrics::new();

        let result = run(&transport, &metrics).await;
        assert_eq!(result, BatchResult::succeeded(4));
        assert_eq!(transport.calls(), 1);
        assert_eq!(metrics.snapshot().retries, 0);
    }

    #[tokio::test]
    async fn test_retry_stops_once_nothing_fails() {
        let transport = Scripted::new(vec![
            Err(TransportError::Timeout(1000)),
            Ok(PutSummary::rejected(4, "busy")),
            Ok(PutSummary::accepted(4)),
        ]);
        let metrics = SenderMetrics::new();

        let result = run(&transport, &metrics).await;
        assert_eq!(result.success, 4);
        assert_eq!(result.timeouts, 0);
        assert!(result.errors.is_empty());
        assert_eq!(transport.calls(), 3);
        assert_eq!(metrics.snapshot().retries, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_attempts() {
        let transport = Scripted::new(vec![
            Ok(PutSummary::rejected(4, "first")),
            Ok(PutSummary::rejected(4, "second")),
            Ok(PutSummary::rejected(4, "third")),
            Ok(PutSummary::accepted(4)),
        ]);
        let metrics = SenderMetrics::new();

        let result = run(&transport, &metrics).await;
        assert_eq!(transport.calls(), MAX_ATTEMPTS);
        assert_eq!(result.failed, 4);
        assert_eq!(result.errors, vec!["third"]);
        assert_eq!(metrics.snapshot().batches_failed, 1);
    }

    #[tokio::test]
    async fn test_bare_failed_count_derives_success() {
        let bare = |json: &str| -> Result<PutSummary, TransportError> {
            Ok(serde_json::from_str(json).unwrap())
        };
        let transport = Scripted::new(vec![bare(r#"{"failed": 0}"#)]);
        let metrics = SenderMetrics::new();

        let result = run(&transport, &metrics).await;
        assert_eq!(result.success, 4);
        assert_eq!(result.failed, 0);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_final_transport_error_counts_whole_batch() {
        let transport = Scripted::new(vec![
            Err(TransportError::connection("refused")),
            Err(TransportError::connection("refused")),
            Err(TransportError::Timeout(1000)),
        ]);
        let metrics = SenderMetrics::new();

        let result = run(&transport, &metrics).await;
        assert_eq!(result.failed, 4);
        assert_eq!(result.timeouts, 1);
        assert_eq!(result.errors.len(), 1);
    }
}
