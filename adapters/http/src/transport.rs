//! Batch writes over HTTP.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};
use tsbridge_core::{BatchTransport, PutRequest, PutSummary, TransportError};

use crate::{request_error, HttpConfig};

/// Writes encoded batches with `POST` requests
///
/// Each value owns one HTTP client, i.e. one connection pool. Opening a
/// [`session`](BatchTransport::session) builds a fresh client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let client = config.client()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    fn session(&self) -> Self {
        match self.config.client() {
            Ok(client) => Self {
                client,
                config: self.config.clone(),
            },
            Err(e) => {
                warn!(error = %e, "Could not open a new HTTP session, sharing the existing one");
                self.clone()
            }
        }
    }

    #[instrument(skip(self, request), fields(url = %request.url, points = request.point_count))]
    async fn put(&self, request: &PutRequest) -> Result<PutSummary, TransportError> {
        let response = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| request_error(e, request.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(e, request.timeout))?;

        let summary = interpret(status, &body, request.point_count as u64)?;
        debug!(
            status = %status,
            success = summary.success,
            failed = summary.failed,
            "Put answered"
        );
        Ok(summary)
    }
}

/// Turn a `/api/put` answer into a summary
///
/// A 2xx without body means every point was stored. A JSON summary
/// carrying a `failed` count is honoured even on a 4xx, which is how the
/// store reports partially rejected writes.
fn interpret(status: StatusCode, body: &str, points: u64) -> Result<PutSummary, TransportError> {
    if status.is_success() {
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(PutSummary::accepted(points));
        }
        return serde_json::from_str(body).map_err(|e| {
            TransportError::decode(format!("invalid put summary: {}", e))
        });
    }

    if status.is_client_error() {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            if value.get("failed").is_some() {
                if let Ok(summary) = serde_json::from_value::<PutSummary>(value) {
                    return Ok(summary);
                }
            }
        }
    }

    Err(TransportError::status(status.as_u16(), body))
}
