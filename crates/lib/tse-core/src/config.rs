use std::time::Duration;

use thiserror::Error;
use tse_store::schema::{DEFAULT_UPSTREAM_BASE_URL, PATH_LISTING};

use crate::fetcher::RetryPolicy;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_HISTORY_SPAN_DAYS: u32 = 366;
pub const DEFAULT_HISTORY_DAYS: u32 = 30;
pub const DEFAULT_DISAMBIGUATION_THRESHOLD: f64 = 0.7;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {name} value: {value}")]
    InvalidSetting { name: &'static str, value: String },
}

/// Upstream endpoint and request policy.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub listing_path: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            listing_path: PATH_LISTING.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Policy knobs for the resolution and normalization pipeline, injected at
/// construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub upstream: UpstreamConfig,
    /// Period of the background catalog refresh; `None` disables it.
    pub refresh_interval: Option<Duration>,
    pub call_timeout: Duration,
    pub max_history_span_days: u32,
    pub default_history_days: u32,
    pub disambiguation_threshold: f64,
    pub default_search_limit: usize,
    pub remote_search_fallback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            refresh_interval: Some(DEFAULT_REFRESH_INTERVAL),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_history_span_days: DEFAULT_MAX_HISTORY_SPAN_DAYS,
            default_history_days: DEFAULT_HISTORY_DAYS,
            disambiguation_threshold: DEFAULT_DISAMBIGUATION_THRESHOLD,
            default_search_limit: DEFAULT_SEARCH_LIMIT,
            remote_search_fallback: true,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.upstream.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_listing_path(mut self, listing_path: impl Into<String>) -> Self {
        self.upstream.listing_path = listing_path.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.upstream.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.upstream.retry = retry;
        self
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, refresh_interval: Option<Duration>) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn with_max_history_span_days(mut self, days: u32) -> Self {
        self.max_history_span_days = days;
        self
    }

    #[must_use]
    pub fn with_default_history_days(mut self, days: u32) -> Self {
        self.default_history_days = days;
        self
    }

    #[must_use]
    pub fn with_disambiguation_threshold(mut self, threshold: f64) -> Self {
        self.disambiguation_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_default_search_limit(mut self, limit: usize) -> Self {
        self.default_search_limit = limit;
        self
    }

    #[must_use]
    pub fn with_remote_search_fallback(mut self, enabled: bool) -> Self {
        self.remote_search_fallback = enabled;
        self
    }

    /// Checks that every policy value is usable.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidSetting` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.upstream.base_url.trim();
        if base_url.is_empty()
            || !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            return Err(invalid("upstream_base_url", &self.upstream.base_url));
        }
        if !self.upstream.listing_path.starts_with('/') {
            return Err(invalid("listing_path", &self.upstream.listing_path));
        }
        if self.upstream.retry.max_attempts == 0 {
            return Err(invalid("retry_max_attempts", "0"));
        }
        if self.upstream.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "0"));
        }
        if self.refresh_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(invalid("refresh_interval", "0"));
        }
        if self.call_timeout.is_zero() {
            return Err(invalid("call_timeout", "0"));
        }
        if self.max_history_span_days == 0 {
            return Err(invalid("max_history_span_days", "0"));
        }
        if self.default_history_days == 0 || self.default_history_days > self.max_history_span_days {
            return Err(invalid(
                "default_history_days",
                &self.default_history_days.to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.disambiguation_threshold) {
            return Err(invalid(
                "disambiguation_threshold",
                &self.disambiguation_threshold.to_string(),
            ));
        }
        if self.default_search_limit == 0 {
            return Err(invalid("default_search_limit", "0"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        name,
        value: value.to_string(),
    }
}
