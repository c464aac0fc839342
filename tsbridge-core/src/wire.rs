//! Batch-write contract of the remote store.
//!
//! A write is a JSON array with one record per point:
//!
//! ```json
//! [{"metric": "sys.cpu", "timestamp": 1000, "value": 0.5, "tags": {"host": "a"}}]
//! ```
//!
//! and the store answers with a summary carrying at least `failed`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TransportError;
use crate::point::PointBatch;

/// Tag set attached to every point of a series
pub type Tags = BTreeMap<String, String>;

/// Where the points of a write go: a metric and its tag set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub metric: String,
    pub tags: Tags,
}

impl Destination {
    pub fn new(metric: impl Into<String>, tags: Tags) -> Self {
        Self {
            metric: metric.into(),
            tags,
        }
    }
}

/// One point as written on the wire
#[derive(Debug, Serialize)]
pub struct PutRecord<'a> {
    pub metric: &'a str,
    pub timestamp: i64,
    pub value: f64,
    pub tags: &'a Tags,
}

/// Summary returned by the store for one write
///
/// Only `failed` is guaranteed by every store; a missing `success` is
/// derived from the size of the write with [`PutSummary::stored`]. Other
/// missing counters default to zero. Detailed error entries are kept as
/// their JSON text so that any store flavour can be reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PutSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<u64>,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub timeouts: u64,
    #[serde(default, deserialize_with = "errors_as_strings")]
    pub errors: Vec<String>,
}

impl PutSummary {
    /// Summary of a write where every point was stored
    pub fn accepted(points: u64) -> Self {
        Self {
            success: Some(points),
            ..Self::default()
        }
    }

    /// Summary of a write where every point was rejected
    pub fn rejected(points: u64, error: impl Into<String>) -> Self {
        Self {
            success: Some(0),
            failed: points,
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    /// Points stored out of a write of `points`
    pub fn stored(&self, points: u64) -> u64 {
        self.success
            .unwrap_or_else(|| points.saturating_sub(self.failed))
    }

    /// The write needs no retry
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

fn errors_as_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Object(map) => match map.get("error") {
                Some(serde_json::Value::String(s)) => s.clone(),
                _ => serde_json::Value::Object(map).to_string(),
            },
            other => other.to_string(),
        })
        .collect())
}

/// A fully encoded write, ready to be handed to a transport
///
/// The body is encoded once and reused verbatim by every retry.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub point_count: usize,
    pub timeout: Duration,
}

impl PutRequest {
    /// Encode `batch` for `destination`
    pub fn encode(
        url: impl Into<String>,
        destination: &Destination,
        batch: &PointBatch,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let records: Vec<PutRecord<'_>> = batch
            .points()
            .iter()
            .map(|point| PutRecord {
                metric: &destination.metric,
                timestamp: point.timestamp,
                value: point.value,
                tags: &destination.tags,
            })
            .collect();

        let body = serde_json::to_vec(&records).map_err(|e| TransportError::Encode(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            body,
            point_count: batch.len(),
            timeout,
        })
    }
}

/// Write endpoint of the store at `host:port`
///
/// `details` asks for per-point errors and `sync_timeout` bounds how long the
/// store waits for the write to be persisted.
pub fn put_url(host: &str, port: u16, timeout: Duration) -> String {
    format!(
        "http://{}:{}/api/put?details&sync&sync_timeout={}",
        host,
        port,
        timeout.as_millis()
    )
}
