use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use tse_store::models::{Instrument, SearchHit};

use super::MarketControlPlane;
use crate::error::{CatalogStale, QueryError};
use crate::fetcher::FetchError;
use crate::normalizer::normalize_listing;
use crate::resolver::{self, text::FoldedText};

/// Ranked hits plus any catalog warning raised since the last call.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<CatalogStale>,
}

impl MarketControlPlane {
    /// Searches the catalog for instruments matching `query`.
    ///
    /// When the catalog has no match and remote fallback is enabled, the
    /// upstream search endpoint is consulted and its results merged into the
    /// catalog before searching again.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidInput` for a non-positive `limit`, the
    /// upstream failure when the fallback search could not be completed, and
    /// `Timeout` when the deadline passes first.
    pub async fn search_stock(
        &self,
        query: &str,
        limit: Option<i64>,
        deadline: Option<Duration>,
    ) -> Result<SearchOutcome, QueryError> {
        let limit = limit
            .unwrap_or_else(|| i64::try_from(self.config.default_search_limit).unwrap_or(i64::MAX));

        let hits = self
            .with_deadline("search_stock", deadline, async {
                let hits = resolver::search(&*self.catalog.all().await, query, limit)?;
                if !hits.is_empty() || !self.discover(query).await? {
                    return Ok(hits);
                }
                resolver::search(&*self.catalog.all().await, query, limit)
            })
            .await?;

        Ok(SearchOutcome {
            hits,
            warning: self.catalog.take_warning(),
        })
    }

    /// Resolves a symbol or name to exactly one instrument.
    pub(crate) async fn resolve(&self, query: &str) -> Result<Instrument, QueryError> {
        if FoldedText::new(query).is_empty() {
            return Err(QueryError::InvalidInput(String::from(
                "symbol_or_name must not be blank",
            )));
        }
        let threshold = self.config.disambiguation_threshold;
        let not_found = match resolver::resolve_one(&*self.catalog.all().await, query, threshold) {
            Err(err @ QueryError::NotFound { .. }) => err,
            other => return other.map(|hit| hit.instrument),
        };
        if !self.discover(query).await? {
            return Err(not_found);
        }
        resolver::resolve_one(&*self.catalog.all().await, query, threshold).map(|hit| hit.instrument)
    }

    /// Asks the upstream search endpoint for `query` and merges what it
    /// finds. Returns whether anything was found; an upstream failure is an
    /// error, never an empty result.
    async fn discover(&self, query: &str) -> Result<bool, QueryError> {
        if !self.config.remote_search_fallback || FoldedText::new(query).is_empty() {
            return Ok(false);
        }
        let found = self.remote_search(query).await?;
        if found.is_empty() {
            return Ok(false);
        }
        let count = found.len();
        let added = self.catalog.merge(found).await;
        debug!(query, count, added, "remote search found instruments");
        Ok(true)
    }

    async fn remote_search(&self, query: &str) -> Result<Vec<Instrument>, QueryError> {
        let raw = match self.fetcher.fetch_search(query).await {
            Ok(raw) => raw,
            Err(FetchError::InstrumentNotFound { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        normalize_listing(&raw).map_err(|detail| QueryError::malformed(&raw.key, detail))
    }
}
