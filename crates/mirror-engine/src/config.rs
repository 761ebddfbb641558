use serde::Deserialize;
use std::time::Duration;

// Engine configuration. Plain values with serde defaults so deployments can
// override any subset from their config files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Verify the topic entity exists (and is a topic) before subscribing.
    pub check_topic_exists: bool,
    // Emit per-subscription counters and latency histograms.
    pub metrics_enabled: bool,
    // Log a per-subscription status line at most this often; 0 disables.
    pub status_interval_ms: u64,
    pub retriever: RetrieverConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_topic_exists: true,
            metrics_enabled: true,
            status_interval_ms: 0,
            retriever: RetrieverConfig::default(),
        }
    }
}

impl EngineConfig {
    pub(crate) fn status_interval(&self) -> Option<Duration> {
        if self.status_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.status_interval_ms))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    // Rows fetched per storage page.
    pub max_page_size: usize,
    // Bounded retry budget for transient storage errors.
    pub max_retries: u32,
    // Base backoff between retries; grows linearly with the attempt.
    pub retry_backoff_ms: u64,
    // Pause between pages on the throttled (primary drain) path.
    pub throttle_interval_ms: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            max_page_size: 1_000,
            max_retries: 3,
            retry_backoff_ms: 250,
            throttle_interval_ms: 100,
        }
    }
}

impl RetrieverConfig {
    pub(crate) fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub(crate) fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_production_shaped() {
        let config = EngineConfig::default();
        assert!(config.check_topic_exists);
        assert!(config.metrics_enabled);
        assert_eq!(config.status_interval(), None);
        assert_eq!(config.retriever.max_page_size, 1_000);
        assert_eq!(config.retriever.max_retries, 3);
    }

    #[test]
    fn status_interval_zero_disables_reporting() {
        let mut config = EngineConfig::default();
        config.status_interval_ms = 5_000;
        assert_eq!(config.status_interval(), Some(Duration::from_secs(5)));
        config.status_interval_ms = 0;
        assert_eq!(config.status_interval(), None);
    }
}
