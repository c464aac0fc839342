//! Pool worker: pops work items and sends them until done or aborted.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use tsbridge_core::{BatchResult, BatchTransport};

use super::attempt::send_batch;
use super::metrics::SenderMetrics;
use super::queue::{WorkItem, WorkQueue};

/// Everything one worker owns
pub(crate) struct Worker<T: BatchTransport> {
    pub id: usize,
    /// Session of this worker, never shared with another worker
    pub transport: T,
    pub queue: Arc<WorkQueue>,
    pub cancel: CancellationToken,
    pub metrics: Arc<SenderMetrics>,
}

impl<T: BatchTransport> Worker<T> {
    /// Worker loop
    ///
    /// Exits when the queue is closed and drained, or as soon as the abort
    /// token fires. A send already in flight always runs to completion.
    pub async fn run(self) {
        debug!(worker = self.id, "Worker started");
        let mut processed = 0u64;

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = self.queue.pop() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let result = self.process(&item).await;
            item.complete(result);
            processed += 1;
        }

        debug!(
            worker = self.id,
            processed,
            aborted = self.cancel.is_cancelled(),
            "Worker stopped"
        );
    }

    async fn process(&self, item: &WorkItem) -> BatchResult {
        let send = send_batch(
            &self.transport,
            &item.url,
            &item.destination,
            &item.batch,
            item.timeout,
            &self.metrics,
        );

        match AssertUnwindSafe(send).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    worker = self.id,
                    batch = item.batch.index(),
                    panic = %message,
                    "Send path panicked"
                );
                let result = BatchResult::aborted_batch(
                    item.batch.len() as u64,
                    format!("batch {} failed: worker panicked: {}", item.batch.index(), message),
                );
                self.metrics.record_finished(&result, Duration::ZERO);
                result
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
