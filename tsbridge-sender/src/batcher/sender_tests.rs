//! Tests for the batch sender, against an in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tsbridge_core::{
    BatchTransport, Destination, Point, PutRequest, PutSummary, Tags, TransportError,
};

use super::*;
use crate::error::SendError;

/// How the fake store answers, keyed by the first timestamp of a batch
#[derive(Default)]
struct Behaviour {
    /// Batches answered with every point rejected
    reject: HashSet<i64>,
    /// Batches failing with a timeout this many times before succeeding
    flaky: Mutex<HashMap<i64, usize>>,
    /// Batch whose write panics
    panic_on: Option<i64>,
    /// Every write waits for a permit
    gate: Option<Arc<Semaphore>>,
    /// Answer every write with only `{"failed": n}`
    bare_failed: Option<u64>,
}

#[derive(Clone)]
struct MockStore {
    behaviour: Arc<Behaviour>,
    calls: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl MockStore {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour: Arc::new(behaviour),
            calls: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn healthy() -> Self {
        Self::new(Behaviour::default())
    }

    fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let store = Self::new(Behaviour {
            gate: Some(gate.clone()),
            ..Behaviour::default()
        });
        (store, gate)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

fn first_timestamp(request: &PutRequest) -> i64 {
    let records: Vec<serde_json::Value> = serde_json::from_slice(&request.body).unwrap();
    records[0]["timestamp"].as_i64().unwrap()
}

#[async_trait]
impl BatchTransport for MockStore {
    fn session(&self) -> Self {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        self.clone()
    }

    async fn put(&self, request: &PutRequest) -> Result<PutSummary, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.behaviour.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let first = first_timestamp(request);
        if self.behaviour.panic_on == Some(first) {
            panic!("store exploded on batch at {}", first);
        }
        if self.behaviour.reject.contains(&first) {
            return Ok(PutSummary::rejected(
                request.point_count as u64,
                format!("rejected batch at {}", first),
            ));
        }
        if let Some(failed) = self.behaviour.bare_failed {
            return Ok(serde_json::from_str(&format!(r#"{{"failed": {}}}"#, failed)).unwrap());
        }
        {
            let mut flaky = self.behaviour.flaky.lock().unwrap();
            if let Some(left) = flaky.get_mut(&first) {
                if *left > 0 {
                    *left -= 1;
                    return Err(TransportError::Timeout(10));
                }
            }
        }
        Ok(PutSummary::accepted(request.point_count as u64))
    }
}

fn points(n: usize) -> Vec<Point> {
    (0..n).map(|i| Point::new(i as i64, i as f64 * 0.5)).collect()
}

fn concurrent(workers: usize, queue_capacity: usize) -> SenderConfig {
    SenderConfig {
        worker_count: workers,
        queue_capacity,
        ..SenderConfig::default()
    }
}

const TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_sync_send_all_succeed() {
    let store = MockStore::healthy();
    let sender = BatchSender::new(SenderConfig::synchronous(), store.clone()).unwrap();
    assert_eq!(sender.state(), SenderState::Created);

    let result = sender
        .send("sys.cpu.user", &Tags::new(), points(25), 10, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.success, 25);
    assert_eq!(result.failed, 0);
    assert_eq!(result.timeouts, 0);
    assert!(result.errors.is_empty());
    assert_eq!(store.calls(), 3);
    assert_eq!(store.sessions(), 0, "synchronous mode reuses the given session");
    assert_eq!(sender.state(), SenderState::Running);
    assert!(sender.is_queue_empty());
}

#[tokio::test]
async fn test_sync_failing_batch_does_not_stop_others() {
    let store = MockStore::new(Behaviour {
        reject: HashSet::from([10]),
        ..Behaviour::default()
    });
    let sender = BatchSender::new(SenderConfig::synchronous(), store.clone()).unwrap();

    let result = sender
        .send("sys.cpu.user", &Tags::new(), points(25), 10, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.success, 15);
    assert_eq!(result.failed, 10);
    assert_eq!(result.errors, vec!["rejected batch at 10"]);
    // two clean batches plus three attempts for the rejected one
    assert_eq!(store.calls(), 5);
    assert_eq!(sender.metrics().snapshot().batches_failed, 1);
}

#[tokio::test]
async fn test_bare_summary_counts_accepted_points() {
    let store = MockStore::new(Behaviour {
        bare_failed: Some(0),
        ..Behaviour::default()
    });
    let sender = BatchSender::new(SenderConfig::synchronous(), store.clone()).unwrap();

    let result = sender
        .send("sys.cpu.user", &Tags::new(), points(25), 10, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.success, 25);
    assert_eq!(result.failed, 0);
    assert_eq!(result.total_points(), 25);
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn test_bare_summary_with_failures() {
    let store = MockStore::new(Behaviour {
        bare_failed: Some(3),
        ..Behaviour::default()
    });
    let sender = BatchSender::new(concurrent(2, 4), store.clone()).unwrap();

    let result = sender
        .send("sys.cpu.user", &Tags::new(), points(25), 10, TIMEOUT)
        .await
        .unwrap();

    // batches of 10, 10 and 5, each losing 3 points on every attempt
    assert_eq!(result.success, 7 + 7 + 2);
    assert_eq!(result.failed, 9);
    assert_eq!(result.total_points(), 25);
    assert_eq!(store.calls(), 3 * MAX_ATTEMPTS);
}

#[tokio::test]
async fn test_concurrent_send_aggregates_every_batch() {
    let store = MockStore::new(Behaviour {
        flaky: Mutex::new(HashMap::from([(30, 1), (70, 2)])),
        ..Behaviour::default()
    });
    let sender = BatchSender::new(concurrent(4, 8), store.clone()).unwrap();
    assert!(sender.is_concurrent());
    assert_eq!(store.sessions(), sender.workers());

    let result = sender
        .send("sys.mem", &Tags::new(), points(100), 10, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(result.success, 100);
    assert_eq!(result.failed, 0);
    assert!(result.errors.is_empty());
    assert_eq!(store.calls(), 13);
    assert_eq!(sender.metrics().snapshot().retries, 3);
    assert!(sender.is_queue_empty());
}

#[tokio::test]
async fn test_pool_is_reused_across_sends() {
    let store = MockStore::healthy();
    let sender = BatchSender::new(concurrent(2, 4), store.clone()).unwrap();
    let sessions = store.sessions();

    for _ in 0..3 {
        let result = sender
            .send("sys.disk", &Tags::new(), points(30), 7, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(result.success, 30);
    }

    assert_eq!(store.sessions(), sessions);
    assert_eq!(sender.metrics().snapshot().batches_created, 15);
}

#[tokio::test]
async fn test_full_queue_blocks_producer() {
    let (store, gate) = MockStore::gated();
    let sender = Arc::new(BatchSender::new(concurrent(2, 1), store.clone()).unwrap());

    let producer = sender.clone();
    let handle = tokio::spawn(async move {
        producer
            .send("sys.net", &Tags::new(), points(10), 1, TIMEOUT)
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished(), "producer should wait on the full queue");
    assert_eq!(store.calls(), sender.workers());
    assert_eq!(sender.queue_depth(), 1);
    assert_eq!(sender.state(), SenderState::Sending);

    gate.add_permits(100);
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.success, 10);
    assert!(sender.metrics().snapshot().max_queue_depth <= 1);
    assert_eq!(sender.state(), SenderState::Running);
}

#[tokio::test]
async fn test_abort_accounts_for_every_point() {
    let (store, gate) = MockStore::gated();
    let sender = Arc::new(BatchSender::new(concurrent(2, 2), store.clone()).unwrap());

    let producer = sender.clone();
    let handle = tokio::spawn(async move {
        producer
            .send("sys.net", &Tags::new(), points(10), 1, TIMEOUT)
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    sender.abort();
    gate.add_permits(100);

    let result = handle.await.unwrap().unwrap();
    // only the batches already in flight were written
    assert_eq!(result.success as usize, sender.workers());
    assert_eq!(result.success + result.failed, 10);
    assert!(result.errors.iter().all(|e| e.contains("abandoned")));
    assert_eq!(store.calls(), sender.workers());
    assert_eq!(sender.state(), SenderState::Aborted);

    let again = sender
        .send("sys.net", &Tags::new(), points(1), 1, TIMEOUT)
        .await;
    assert_eq!(again, Err(SendError::Aborted));
}

#[tokio::test]
async fn test_send_after_abort_fails() {
    let sender = BatchSender::new(SenderConfig::synchronous(), MockStore::healthy()).unwrap();
    sender.abort();
    assert_eq!(sender.state(), SenderState::Aborted);

    let result = sender
        .send("sys.cpu", &Tags::new(), points(5), 1, TIMEOUT)
        .await;
    assert_eq!(result, Err(SendError::Aborted));
}

#[tokio::test]
async fn test_kill_only_once() {
    let sender = BatchSender::new(concurrent(2, 4), MockStore::healthy()).unwrap();
    assert!(sender.kill());
    assert!(!sender.kill());
    assert_eq!(sender.state(), SenderState::Aborted);

    let closed = BatchSender::new(concurrent(2, 4), MockStore::healthy()).unwrap();
    closed.close();
    assert!(!closed.kill());
    assert_eq!(closed.state(), SenderState::Draining);
}

#[tokio::test]
async fn test_worker_panic_becomes_failure() {
    let store = MockStore::new(Behaviour {
        panic_on: Some(10),
        ..Behaviour::default()
    });
    let sender = BatchSender::new(concurrent(2, 4), store).unwrap();

    let result = sender
        .send("sys.cpu", &Tags::new(), points(30), 10, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.success, 20);
    assert_eq!(result.failed, 10);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("panicked"));
    assert_eq!(sender.metrics().in_flight(), 0);

    // the pool survives
    let result = sender
        .send("sys.cpu", &Tags::new(), points(5), 10, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.success, 5);
}

#[tokio::test]
async fn test_wait_joins_pool() {
    let sender = BatchSender::new(concurrent(3, 4), MockStore::healthy()).unwrap();
    let result = sender
        .send("sys.cpu", &Tags::new(), points(12), 4, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.success, 12);

    sender.wait().await.unwrap();
    assert_eq!(sender.state(), SenderState::Idle);

    let after = sender
        .send("sys.cpu", &Tags::new(), points(1), 1, TIMEOUT)
        .await;
    assert_eq!(after, Err(SendError::Closed));
}

#[tokio::test]
async fn test_wait_timeout_escalates_to_abort() {
    let (store, gate) = MockStore::gated();
    let sender = Arc::new(BatchSender::new(concurrent(2, 1), store).unwrap());

    let producer = sender.clone();
    let handle = tokio::spawn(async move {
        producer
            .send("sys.net", &Tags::new(), points(6), 1, TIMEOUT)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let limit = Duration::from_millis(50);
    assert_eq!(sender.wait_timeout(limit).await, Err(SendError::JoinTimeout(limit)));
    assert_eq!(sender.state(), SenderState::Aborted);

    gate.add_permits(100);
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.success + result.failed, 6);
}

#[tokio::test]
async fn test_invalid_arguments() {
    let sender = BatchSender::new(SenderConfig::synchronous(), MockStore::healthy()).unwrap();

    let empty_metric = sender.send(" ", &Tags::new(), points(3), 10, TIMEOUT).await;
    assert!(matches!(empty_metric, Err(SendError::InvalidArgument(_))));

    let zero_batch = sender.send("m", &Tags::new(), points(3), 0, TIMEOUT).await;
    assert!(matches!(zero_batch, Err(SendError::InvalidArgument(_))));

    let zero_timeout = sender.send("m", &Tags::new(), points(3), 10, Duration::ZERO).await;
    assert!(matches!(zero_timeout, Err(SendError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_empty_input_sends_nothing() {
    let store = MockStore::healthy();
    let sender = BatchSender::new(concurrent(2, 4), store.clone()).unwrap();

    let result = sender
        .send("m", &Tags::new(), Vec::<Point>::new(), 10, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(result.total_points(), 0);
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_write_uses_configured_batch_size() {
    let store = MockStore::healthy();
    let config = SenderConfig {
        max_points_per_batch: 4,
        ..SenderConfig::synchronous()
    };
    let sender = BatchSender::new(config, store.clone()).unwrap();

    let destination = Destination::new("sys.cpu", Tags::from([("host".to_string(), "a".to_string())]));
    let result = sender.write(&destination, points(10)).await.unwrap();
    assert_eq!(result.success, 10);
    assert_eq!(store.calls(), 3);
}

#[test]
fn test_pool_needs_runtime() {
    let result = BatchSender::new(concurrent(4, 4), MockStore::healthy());
    assert!(matches!(result, Err(SendError::Runtime(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let config = SenderConfig {
        queue_capacity: 0,
        ..SenderConfig::default()
    };
    let result = BatchSender::new(config, MockStore::healthy());
    assert!(matches!(result, Err(SendError::InvalidArgument(_))));
}
