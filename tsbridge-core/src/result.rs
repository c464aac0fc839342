//! Aggregated outcome of a batch write call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Counters and error messages collected while sending batches
///
/// Partial results are combined with [`BatchResult::merge`], which is
/// commutative and associative for `timeouts`, `failed`, `success` and the
/// multiset of `errors`. `duration` is not merged: the aggregator that owns
/// the call sets it once with [`BatchResult::finish`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub timeouts: u64,
    pub errors: Vec<String>,
    pub failed: u64,
    pub success: u64,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result of a batch that was fully accepted
    pub fn succeeded(points: u64) -> Self {
        Self {
            success: points,
            ..Self::default()
        }
    }

    /// Result of a batch that never got a usable response
    pub fn transport_failure(points: u64, error: &TransportError) -> Self {
        Self {
            timeouts: u64::from(error.is_timeout()),
            errors: vec![error.to_string()],
            failed: points,
            ..Self::default()
        }
    }

    /// Result of a batch whose send path broke down without a transport error
    pub fn aborted_batch(points: u64, reason: impl Into<String>) -> Self {
        Self {
            errors: vec![reason.into()],
            failed: points,
            ..Self::default()
        }
    }

    /// Fold another partial result into this one
    pub fn merge(&mut self, other: BatchResult) {
        self.timeouts += other.timeouts;
        self.errors.extend(other.errors);
        self.failed += other.failed;
        self.success += other.success;
    }

    /// Stamp the wall-clock duration of the whole call
    pub fn finish(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Whether every point was accepted and nothing timed out
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.timeouts == 0 && self.errors.is_empty()
    }

    /// Total points accounted for
    pub fn total_points(&self) -> u64 {
        self.success + self.failed
    }

    /// Accepted points per second, if a duration was recorded
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.duration.as_secs_f64();
        (secs > 0.0).then(|| self.success as f64 / secs)
    }
}

impl Extend<BatchResult> for BatchResult {
    fn extend<I: IntoIterator<Item = BatchResult>>(&mut self, iter: I) {
        for partial in iter {
            self.merge(partial);
        }
    }
}

impl FromIterator<BatchResult> for BatchResult {
    fn from_iter<I: IntoIterator<Item = BatchResult>>(iter: I) -> Self {
        let mut total = BatchResult::new();
        total.extend(iter);
        total
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
