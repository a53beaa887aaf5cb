//! Error taxonomy surfaced by the query service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tse_store::models::SearchHit;

use crate::fetcher::FetchError;
use crate::normalizer::MalformedData;

/// Failure of a query-service call.
///
/// Every variant carries enough context (query text, identifier, range) to be
/// diagnosed by the caller without server logs.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("no instrument matches '{query}'")]
    NotFound { query: String },

    #[error("'{query}' matches {} instruments; pick one by symbol", .candidates.len())]
    Ambiguous {
        query: String,
        candidates: Vec<SearchHit>,
    },

    #[error("upstream has no data for instrument {identifier}")]
    InstrumentNotFound { identifier: String },

    #[error("upstream unavailable for {target} after {attempts} attempt(s): {message}")]
    UpstreamUnavailable {
        target: String,
        attempts: u32,
        message: String,
    },

    #[error("{operation} exceeded its deadline of {deadline_ms} ms")]
    Timeout { operation: String, deadline_ms: u64 },

    #[error("malformed upstream data for {identifier}: {detail}")]
    MalformedData {
        identifier: String,
        #[source]
        detail: MalformedData,
    },

    #[error("invalid date range {start}..{end}: {reason}")]
    InvalidRange {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl QueryError {
    /// Machine-readable error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Ambiguous { .. } => "ambiguous",
            Self::InstrumentNotFound { .. } => "instrument_not_found",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::MalformedData { .. } => "malformed_data",
            Self::InvalidRange { .. } => "invalid_range",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Structured diagnostic context for the caller.
    #[must_use]
    pub fn context(&self) -> Value {
        match self {
            Self::NotFound { query } => json!({ "query": query }),
            Self::Ambiguous { query, candidates } => {
                let candidates: Vec<Value> = candidates
                    .iter()
                    .map(|hit| {
                        json!({
                            "identifier": hit.instrument.identifier,
                            "symbol": hit.instrument.symbol,
                            "name": hit.instrument.name,
                            "score": hit.score,
                        })
                    })
                    .collect();
                json!({ "query": query, "candidates": candidates })
            }
            Self::InstrumentNotFound { identifier } => json!({ "identifier": identifier }),
            Self::UpstreamUnavailable {
                target,
                attempts,
                message,
            } => json!({ "target": target, "attempts": attempts, "message": message }),
            Self::Timeout {
                operation,
                deadline_ms,
            } => json!({ "operation": operation, "deadline_ms": deadline_ms }),
            Self::MalformedData { identifier, detail } => json!({
                "identifier": identifier,
                "record": detail.record,
                "field": detail.field,
                "reason": detail.reason,
            }),
            Self::InvalidRange { start, end, reason } => json!({
                "start": start.to_string(),
                "end": end.to_string(),
                "reason": reason,
            }),
            Self::InvalidInput(message) => json!({ "message": message }),
        }
    }

    pub(crate) fn malformed(identifier: &str, detail: MalformedData) -> Self {
        Self::MalformedData {
            identifier: identifier.to_string(),
            detail,
        }
    }
}

impl From<FetchError> for QueryError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InstrumentNotFound { key, .. } => Self::InstrumentNotFound { identifier: key },
            FetchError::UpstreamUnavailable {
                target,
                attempts,
                message,
            } => Self::UpstreamUnavailable {
                target,
                attempts,
                message,
            },
        }
    }
}

/// Non-fatal condition raised when the catalog could not be refreshed and
/// queries are answered from the previous listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CatalogStale {
    pub reason: String,
    pub since: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
}

impl CatalogStale {
    pub const KIND: &'static str = "catalog_stale";
}

impl std::fmt::Display for CatalogStale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "catalog is stale since {}: {}", self.since, self.reason)
    }
}
