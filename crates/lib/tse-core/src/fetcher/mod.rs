//! Outbound fetches against the upstream exchange data source.
//!
//! Every request is bounded by a timeout, retried with exponential backoff on
//! transient failures, and coalesced per (payload kind, key) so concurrent
//! callers share one upstream request.

mod coalesce;
mod retry;
mod transport;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use tse_store::models::DateRange;
use tse_store::schema;

pub use coalesce::InflightRegistry;
pub use retry::{RetryPolicy, is_retryable_status};
pub use transport::{
    ReqwestTransport,
    TransportError,
    TransportFuture,
    TransportResponse,
    UpstreamTransport,
};

use crate::config::UpstreamConfig;

/// Kind of upstream payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Listing,
    Search,
    Snapshot,
    History,
}

impl PayloadKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Search => "search",
            Self::Snapshot => "snapshot",
            Self::History => "history",
        }
    }

    /// Top-level key holding the records in the upstream body.
    #[must_use]
    pub const fn root_key(self) -> &'static str {
        match self {
            Self::Listing => schema::ROOT_LISTING,
            Self::Search => schema::ROOT_SEARCH,
            Self::Snapshot => schema::ROOT_SNAPSHOT,
            Self::History => schema::ROOT_HISTORY,
        }
    }

    const fn is_keyed_by_instrument(self) -> bool {
        matches!(self, Self::Snapshot | Self::History)
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unparsed upstream body, opaque until handed to the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub kind: PayloadKind,
    pub key: String,
    pub body: Arc<Value>,
}

impl RawPayload {
    pub fn new(kind: PayloadKind, key: impl Into<String>, body: Value) -> Self {
        Self {
            kind,
            key: key.into(),
            body: Arc::new(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("upstream has no {kind} data for {key}")]
    InstrumentNotFound { kind: PayloadKind, key: String },

    #[error("upstream unavailable for {target} after {attempts} attempt(s): {message}")]
    UpstreamUnavailable {
        target: String,
        attempts: u32,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    kind: PayloadKind,
    key: String,
}

/// Fetches raw payloads for snapshot, history, listing, and search requests.
#[derive(Clone)]
pub struct MarketDataFetcher {
    client: Arc<UpstreamClient>,
    inflight: InflightRegistry<FetchKey, RawPayload, FetchError>,
}

impl MarketDataFetcher {
    pub fn new(transport: Arc<dyn UpstreamTransport>, config: UpstreamConfig) -> Self {
        Self {
            client: Arc::new(UpstreamClient { transport, config }),
            inflight: InflightRegistry::new(),
        }
    }

    /// Fetches the latest closing-price snapshot for an instrument.
    ///
    /// # Errors
    /// Returns `FetchError::InstrumentNotFound` when upstream has no record for
    /// the identifier, or `FetchError::UpstreamUnavailable` once retries are
    /// exhausted.
    pub async fn fetch_snapshot(&self, identifier: &str) -> Result<RawPayload, FetchError> {
        self.fetch(PayloadKind::Snapshot, identifier, schema::snapshot_path(identifier))
            .await
    }

    /// Fetches the daily history for an instrument.
    ///
    /// Upstream serves the complete daily list; `range` is applied by the
    /// caller after normalization, so all ranges for one identifier share a
    /// single in-flight request.
    ///
    /// # Errors
    /// Same as [`Self::fetch_snapshot`].
    pub async fn fetch_history(
        &self,
        identifier: &str,
        range: DateRange,
    ) -> Result<RawPayload, FetchError> {
        debug!(identifier, start = %range.start, end = %range.end, "fetching history");
        self.fetch(PayloadKind::History, identifier, schema::history_path(identifier, 0))
            .await
    }

    /// Fetches the full instrument listing used to build the catalog.
    ///
    /// # Errors
    /// Returns `FetchError::UpstreamUnavailable` once retries are exhausted.
    pub async fn fetch_listing(&self) -> Result<RawPayload, FetchError> {
        let path = self.client.config.listing_path.clone();
        self.fetch(PayloadKind::Listing, "", path).await
    }

    /// Queries the upstream instrument search endpoint.
    ///
    /// # Errors
    /// Returns `FetchError::UpstreamUnavailable` once retries are exhausted.
    pub async fn fetch_search(&self, query: &str) -> Result<RawPayload, FetchError> {
        let query = sanitize_path_segment(query);
        let path = schema::search_path(&query);
        self.fetch(PayloadKind::Search, &query, path).await
    }

    /// Number of distinct upstream requests currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.in_flight()
    }

    async fn fetch(
        &self,
        kind: PayloadKind,
        key: &str,
        path: String,
    ) -> Result<RawPayload, FetchError> {
        let fetch_key = FetchKey {
            kind,
            key: key.to_string(),
        };
        let client = self.client.clone();
        let key = key.to_string();
        self.inflight
            .run(fetch_key, move || async move {
                client.fetch_with_retry(kind, &key, &path).await
            })
            .await
    }
}

struct UpstreamClient {
    transport: Arc<dyn UpstreamTransport>,
    config: UpstreamConfig,
}

enum AttemptError {
    Retryable(String),
    Fatal(FetchError),
}

impl UpstreamClient {
    async fn fetch_with_retry(
        &self,
        kind: PayloadKind,
        key: &str,
        path: &str,
    ) -> Result<RawPayload, FetchError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let retry = self.config.retry;
        let attempts = retry.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt - 1);
                debug!(%kind, key, attempt, ?delay, "retrying upstream request");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(kind, key, &url, attempt + 1).await {
                Ok(payload) => return Ok(payload),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(message)) => {
                    warn!(%kind, key, attempt = attempt + 1, error = %message, "upstream request failed");
                    last_error = message;
                }
            }
        }

        Err(FetchError::UpstreamUnavailable {
            target: describe_target(kind, key),
            attempts,
            message: last_error,
        })
    }

    async fn attempt(
        &self,
        kind: PayloadKind,
        key: &str,
        url: &str,
        attempt: u32,
    ) -> Result<RawPayload, AttemptError> {
        let timeout = self.config.request_timeout;
        let response = match tokio::time::timeout(timeout, self.transport.get(url, timeout)).await {
            Err(_) => {
                return Err(AttemptError::Retryable(format!(
                    "request timed out after {} ms",
                    timeout.as_millis()
                )));
            }
            Ok(Err(err)) => return Err(AttemptError::Retryable(err.to_string())),
            Ok(Ok(response)) => response,
        };

        if response.status == 404 {
            return Err(AttemptError::Fatal(FetchError::InstrumentNotFound {
                kind,
                key: key.to_string(),
            }));
        }
        if is_retryable_status(response.status) {
            return Err(AttemptError::Retryable(format!("HTTP {}", response.status)));
        }
        if !response.is_success() {
            return Err(AttemptError::Fatal(FetchError::UpstreamUnavailable {
                target: describe_target(kind, key),
                attempts: attempt,
                message: format!("HTTP {}", response.status),
            }));
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|err| AttemptError::Retryable(format!("malformed response body: {err}")))?;

        match root_state(&body, kind.root_key()) {
            RootState::Present => Ok(RawPayload::new(kind, key, body)),
            RootState::Empty if kind.is_keyed_by_instrument() => {
                Err(AttemptError::Fatal(FetchError::InstrumentNotFound {
                    kind,
                    key: key.to_string(),
                }))
            }
            RootState::Empty if kind == PayloadKind::Search => Ok(RawPayload::new(kind, key, body)),
            RootState::Empty => Err(AttemptError::Retryable(format!(
                "response is missing '{}'",
                kind.root_key()
            ))),
        }
    }
}

enum RootState {
    Present,
    Empty,
}

fn root_state(body: &Value, root: &str) -> RootState {
    match body.get(root) {
        None | Some(Value::Null) => RootState::Empty,
        Some(Value::Array(items)) if items.is_empty() => RootState::Empty,
        Some(_) => RootState::Present,
    }
}

fn describe_target(kind: PayloadKind, key: &str) -> String {
    if key.is_empty() {
        kind.to_string()
    } else {
        format!("{kind} {key}")
    }
}

fn sanitize_path_segment(query: &str) -> String {
    query
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\' | '?' | '#' | '%') { ' ' } else { ch })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
