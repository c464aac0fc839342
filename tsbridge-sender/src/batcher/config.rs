//! Configuration for the batch sender.

use std::time::Duration;

/// Configuration for the batch sender
#[derive(Debug, Clone, PartialEq)]
pub struct SenderConfig {
    /// Host of the time-series store
    pub host: String,

    /// Port of the time-series store
    pub port: u16,

    /// Maximum number of batches waiting in the work queue
    /// A full queue blocks the producer (backpressure)
    pub queue_capacity: usize,

    /// Number of workers sending batches in parallel
    /// 0 or 1 selects the synchronous mode
    pub worker_count: usize,

    /// Maximum number of points per write request
    /// Dictated by the store's own request size limit
    pub max_points_per_batch: usize,

    /// Timeout of one write request
    pub timeout: Duration,

    /// Upper bound on the worker join during shutdown
    /// None waits for stuck workers indefinitely
    pub join_timeout: Option<Duration>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4242,
            queue_capacity: 100,
            worker_count: 4,
            max_points_per_batch: 10_000,
            timeout: Duration::from_secs(10),
            join_timeout: None,
        }
    }
}

impl SenderConfig {
    /// Create config sending one batch at a time over a single session
    pub fn synchronous() -> Self {
        Self {
            queue_capacity: 1,
            worker_count: 1,
            ..Self::default()
        }
    }

    /// Create config optimized for bulk imports
    pub fn high_throughput() -> Self {
        Self {
            queue_capacity: 1000,
            worker_count: 16,
            max_points_per_batch: 50_000,
            timeout: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TSBRIDGE_HOST") {
            config.host = val;
        }

        if let Ok(val) = std::env::var("TSBRIDGE_PORT") {
            if let Ok(n) = val.parse() {
                config.port = n;
            }
        }

        if let Ok(val) = std::env::var("TSBRIDGE_QUEUE_CAPACITY") {
            if let Ok(n) = val.parse() {
                config.queue_capacity = n;
            }
        }

        if let Ok(val) = std::env::var("TSBRIDGE_WORKERS") {
            if let Ok(n) = val.parse() {
                config.worker_count = n;
            }
        }

        if let Ok(val) = std::env::var("TSBRIDGE_BATCH_SIZE") {
            if let Ok(n) = val.parse() {
                config.max_points_per_batch = n;
            }
        }

        if let Ok(val) = std::env::var("TSBRIDGE_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                config.timeout = Duration::from_millis(n);
            }
        }

        if let Ok(val) = std::env::var("TSBRIDGE_JOIN_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                config.join_timeout = Some(Duration::from_millis(n));
            }
        }

        config
    }

    /// Whether this config selects the worker pool
    pub fn is_concurrent(&self) -> bool {
        self.worker_count > 1
    }

    /// Number of workers actually started: capped by the available parallelism
    pub fn effective_workers(&self) -> usize {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.worker_count.min(parallelism).max(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be > 0".to_string());
        }
        if self.max_points_per_batch == 0 {
            return Err("max_points_per_batch must be > 0".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SenderConfig::default();
        assert_eq!(config.port, 4242);
        assert_eq!(config.worker_count, 4);
        assert!(config.is_concurrent());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_synchronous_config() {
        let config = SenderConfig::synchronous();
        assert!(!config.is_concurrent());
        assert_eq!(config.effective_workers(), 1);

        let config = SenderConfig {
            worker_count: 0,
            ..SenderConfig::default()
        };
        assert!(!config.is_concurrent());
    }

    #[test]
    fn test_high_throughput_config() {
        let config = SenderConfig::high_throughput();
        assert_eq!(config.worker_count, 16);
        assert_eq!(config.queue_capacity, 1000);
        assert!(config.effective_workers() <= 16);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = SenderConfig::default();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = SenderConfig::default();
        config.max_points_per_batch = 0;
        assert!(config.validate().is_err());

        let mut config = SenderConfig::default();
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
