use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tse_store::models::Instrument;

use crate::catalog::Catalog;
use crate::config::PipelineConfig;
use crate::error::{CatalogStale, QueryError};
use crate::fetcher::{MarketDataFetcher, UpstreamTransport};

pub mod quotes;
pub mod search;

pub use search::SearchOutcome;

/// Result of a query that first resolved a symbol or name to an instrument.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub instrument: Instrument,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<CatalogStale>,
}

/// Orchestrates resolution, fetching, and normalization for the three
/// externally visible queries. Holds no per-call state.
#[derive(Clone)]
pub struct MarketControlPlane {
    catalog: Catalog,
    fetcher: MarketDataFetcher,
    config: Arc<PipelineConfig>,
}

impl MarketControlPlane {
    pub fn new(catalog: Catalog, fetcher: MarketDataFetcher, config: PipelineConfig) -> Self {
        Self {
            catalog,
            fetcher,
            config: Arc::new(config),
        }
    }

    /// Wires a fetcher and an empty catalog over `transport`.
    pub fn from_transport(transport: Arc<dyn UpstreamTransport>, config: PipelineConfig) -> Self {
        let fetcher = MarketDataFetcher::new(transport, config.upstream.clone());
        let catalog = Catalog::new(fetcher.clone());
        Self::new(catalog, fetcher, config)
    }

    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub const fn fetcher(&self) -> &MarketDataFetcher {
        &self.fetcher
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Starts the background catalog refresh at the configured interval.
    /// Returns `None` when periodic refresh is disabled.
    pub fn spawn_catalog_refresher(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.config
            .refresh_interval
            .map(|interval| self.catalog.clone().spawn_refresher(interval))
    }

    /// Runs `future` under the caller's deadline, or the configured call
    /// timeout when none is given.
    async fn with_deadline<T>(
        &self,
        operation: &str,
        deadline: Option<Duration>,
        future: impl Future<Output = Result<T, QueryError>>,
    ) -> Result<T, QueryError> {
        let deadline = deadline.unwrap_or(self.config.call_timeout);
        tokio::time::timeout(deadline, future)
            .await
            .map_err(|_| QueryError::Timeout {
                operation: operation.to_string(),
                deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}
