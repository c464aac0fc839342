//! Series metadata read from the metadata API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, instrument};
use tsbridge_core::{MetadataError, MetadataProvider, MetadataRecord};

use crate::{request_error, HttpConfig};

/// One `{name, value}` metadata entry
#[derive(Debug, Deserialize)]
struct MetadataEntry {
    name: String,
    value: serde_json::Value,
}

impl MetadataEntry {
    fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Reads metadata entries with `GET {base}/metadata/list/json?tsuid={series}`
#[derive(Debug, Clone)]
pub struct HttpMetadataProvider {
    client: Client,
    base_url: String,
    config: HttpConfig,
}

impl HttpMetadataProvider {
    /// Create a provider from the configured metadata URL
    pub fn new(config: HttpConfig) -> Result<Self, MetadataError> {
        let base_url = config
            .metadata_url
            .clone()
            .ok_or_else(|| MetadataError::Transport("no metadata URL configured".to_string()))?;
        let client = config
            .client()
            .map_err(|e| MetadataError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadataProvider {
    #[instrument(skip(self))]
    async fn record(&self, series: &str) -> Result<MetadataRecord, MetadataError> {
        let url = format!("{}/metadata/list/json", self.base_url);
        debug!(url = %url, "Fetching metadata");

        let response = self
            .client
            .get(&url)
            .query(&[("tsuid", series)])
            .send()
            .await
            .map_err(|e| MetadataError::Transport(request_error(e, self.config.request_timeout()).to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MetadataError::not_found(series));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Metadata store returned error");
            return Err(MetadataError::Transport(format!(
                "metadata store returned status {}: {}",
                status, body
            )));
        }

        let entries: Vec<MetadataEntry> = response
            .json()
            .await
            .map_err(|e| MetadataError::Transport(format!("invalid metadata list: {}", e)))?;
        debug!(count = entries.len(), "Found metadata entries");

        let values: Vec<(String, String)> = entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.value_text()))
            .collect();
        MetadataRecord::from_entries(
            series,
            values.iter().map(|(name, value)| (name.as_str(), value.as_str())),
        )
    }
}
