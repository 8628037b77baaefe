//! Engine configuration.
//!
//! All tuning knobs are plain fields so a host application (or a test) can
//! adjust them before wiring the engine together. The base URL can also come
//! from the `TASKCAL_API_URL` environment variable.

/// Default backend URL used when no override is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

/// Configuration shared by the client, engine, and action layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the task backend.
    pub api_base_url: String,
    /// Page size used by the pagination aggregator.
    pub page_size: usize,
    /// Attempt cap for the resilient HTTP client.
    pub max_attempts: u32,
    /// Base delay for the linear retry backoff (multiplied by attempt number).
    pub retry_base_delay_ms: u64,
    /// Grace window before a scheduled deletion commits.
    pub undo_grace_ms: u64,
    /// Background sync interval when the last pass succeeded.
    pub base_sync_interval_ms: u64,
    /// Ceiling for the background sync backoff.
    pub max_sync_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let api_base_url =
            std::env::var("TASKCAL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self {
            api_base_url,
            page_size: 100,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            undo_grace_ms: 5000,
            base_sync_interval_ms: 120_000,
            max_sync_interval_ms: 600_000,
        }
    }
}

impl SyncConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration pointing at an explicit backend URL.
    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            api_base_url: url.into(),
            ..Self::default()
        }
    }

    /// Full URL for an API endpoint path.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}
