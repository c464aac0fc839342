//! HTTP adapters for an OpenTSDB-style time-series store.
//!
//! [`HttpTransport`] performs batch writes against `/api/put`, and
//! [`HttpMetadataProvider`] reads per-series metadata for the chunk planner.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tsbridge_core::TransportError;

mod metadata;
mod transport;

pub use metadata::HttpMetadataProvider;
pub use transport::HttpTransport;

/// Client-wide timeout used when none is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP adapter configuration
///
/// Every field is optional so that values read from the environment can be
/// layered under values given on the command line with [`HttpConfig::merge`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HttpConfig {
    /// Base URL of the metadata API
    /// Example: "http://tdm:8180/TemporalDataManagerWebApp/webapi"
    pub metadata_url: Option<String>,

    /// Upper bound on any request, in seconds
    /// Batch writes also carry their own, usually shorter, timeout
    /// Default: 30
    pub request_timeout_secs: Option<u64>,

    /// Connection establishment timeout, in seconds
    /// Default: none (bounded by the request timeout)
    pub connect_timeout_secs: Option<u64>,
}

impl HttpConfig {
    /// Read configuration from environment variables
    ///
    /// # Example
    /// ```
    /// use tsbridge_adapters_http::HttpConfig;
    ///
    /// let config = HttpConfig::from_env();
    /// println!("Current config: {:?}", config);
    /// ```
    pub fn from_env() -> Self {
        Self {
            metadata_url: env::var("TSBRIDGE_METADATA_URL").ok(),
            request_timeout_secs: env::var("TSBRIDGE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            connect_timeout_secs: env::var("TSBRIDGE_HTTP_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Generate shell export commands for the configured values
    ///
    /// # Example
    /// ```
    /// use tsbridge_adapters_http::HttpConfig;
    ///
    /// let config = HttpConfig {
    ///     request_timeout_secs: Some(60),
    ///     ..HttpConfig::default()
    /// };
    /// assert_eq!(config.to_env_exports(), "export TSBRIDGE_HTTP_TIMEOUT_SECS=60");
    /// ```
    pub fn to_env_exports(&self) -> String {
        let mut exports = Vec::new();

        if let Some(ref val) = self.metadata_url {
            exports.push(format!("export TSBRIDGE_METADATA_URL=\"{}\"", val));
        }
        if let Some(val) = self.request_timeout_secs {
            exports.push(format!("export TSBRIDGE_HTTP_TIMEOUT_SECS={}", val));
        }
        if let Some(val) = self.connect_timeout_secs {
            exports.push(format!("export TSBRIDGE_HTTP_CONNECT_TIMEOUT_SECS={}", val));
        }

        exports.join("\n")
    }

    /// Check if any configuration values are set
    pub fn is_empty(&self) -> bool {
        self.metadata_url.is_none()
            && self.request_timeout_secs.is_none()
            && self.connect_timeout_secs.is_none()
    }

    /// Merge another config into this one, preferring values from `other`
    pub fn merge(&mut self, other: &HttpConfig) {
        if other.metadata_url.is_some() {
            self.metadata_url = other.metadata_url.clone();
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.connect_timeout_secs.is_some() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Build a new HTTP client, with its own connection pool
    pub fn client(&self) -> Result<Client, TransportError> {
        let mut builder = Client::builder().timeout(self.request_timeout());
        if let Some(secs) = self.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| TransportError::connection(format!("failed to build HTTP client: {}", e)))
    }
}

/// Map a reqwest failure onto the transport error taxonomy
pub(crate) fn request_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout.as_millis() as u64)
    } else if error.is_decode() {
        TransportError::decode(error.to_string())
    } else {
        TransportError::connection(error.to_string())
    }
}
