use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tse_store::models::Instrument;

use crate::error::{CatalogStale, QueryError};
use crate::fetcher::MarketDataFetcher;
use crate::normalizer::normalize_listing;
use crate::resolver::SearchKeys;

/// One catalog instrument with its precomputed search keys.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub instrument: Instrument,
    pub(crate) keys: SearchKeys,
}

/// Immutable view of the catalog at one point in time.
///
/// Entries are ordered by identifier; identifiers are unique.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    entries: Vec<CatalogEntry>,
    positions: HashMap<String, usize>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Builds a snapshot; when an identifier repeats, the later record wins.
    #[must_use]
    pub fn from_instruments(instruments: Vec<Instrument>) -> Self {
        let mut unique: HashMap<String, Instrument> = HashMap::with_capacity(instruments.len());
        for instrument in instruments {
            unique.insert(instrument.identifier.clone(), instrument);
        }

        let mut entries: Vec<CatalogEntry> = unique
            .into_values()
            .map(|instrument| CatalogEntry {
                keys: SearchKeys::new(&instrument),
                instrument,
            })
            .collect();
        entries.sort_by(|left, right| left.instrument.identifier.cmp(&right.instrument.identifier));

        let positions = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.instrument.identifier.clone(), index))
            .collect();

        Self {
            entries,
            positions,
            refreshed_at: None,
        }
    }

    #[must_use]
    fn with_refreshed_at(mut self, refreshed_at: Option<DateTime<Utc>>) -> Self {
        self.refreshed_at = refreshed_at;
        self
    }

    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&Instrument> {
        self.positions
            .get(identifier)
            .map(|index| &self.entries[*index].instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.entries.iter().map(|entry| &entry.instrument)
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time of the last successful listing refresh, if any.
    #[must_use]
    pub const fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

/// Summary of catalog state for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStatus {
    pub instruments: usize,
    pub active: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub stale: Option<CatalogStale>,
}

/// In-memory index of every known instrument, rebuilt from the upstream
/// listing.
///
/// Readers take an `Arc` of the current snapshot and never observe a
/// partially built catalog. A failed refresh keeps the previous snapshot and
/// marks the catalog stale until the next success.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    fetcher: MarketDataFetcher,
    current: RwLock<Arc<CatalogSnapshot>>,
    /// Serializes snapshot rebuilds so a merge never races a refresh.
    rebuild_gate: tokio::sync::Mutex<()>,
    health: Mutex<CatalogHealth>,
}

#[derive(Default)]
struct CatalogHealth {
    stale: Option<CatalogStale>,
    warned: bool,
}

impl Catalog {
    pub fn new(fetcher: MarketDataFetcher) -> Self {
        Self::with_snapshot(fetcher, CatalogSnapshot::default())
    }

    /// Starts from a prebuilt snapshot instead of an empty catalog.
    pub fn with_snapshot(fetcher: MarketDataFetcher, snapshot: CatalogSnapshot) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                fetcher,
                current: RwLock::new(Arc::new(snapshot)),
                rebuild_gate: tokio::sync::Mutex::new(()),
                health: Mutex::new(CatalogHealth::default()),
            }),
        }
    }

    /// Rebuilds the catalog from the upstream listing.
    ///
    /// Instruments missing from the new listing are kept and marked inactive.
    /// Returns the number of instruments in the new catalog.
    ///
    /// # Errors
    /// Returns the fetch or normalization failure; the previous catalog stays
    /// in place and is flagged stale.
    pub async fn refresh(&self) -> Result<usize, QueryError> {
        let listing = match self.load_listing().await {
            Ok(listing) => listing,
            Err(err) => {
                self.mark_stale(&err).await;
                return Err(err);
            }
        };

        let _gate = self.inner.rebuild_gate.lock().await;
        let previous = self.all().await;
        let listed = listing.len();
        let present: HashSet<&str> = listing
            .iter()
            .map(|instrument| instrument.identifier.as_str())
            .collect();
        let retired: Vec<Instrument> = previous
            .instruments()
            .filter(|instrument| !present.contains(instrument.identifier.as_str()))
            .map(|instrument| instrument.clone().inactive())
            .collect();
        let retired_count = retired.len();
        let mut instruments = listing;
        instruments.extend(retired);

        let snapshot =
            CatalogSnapshot::from_instruments(instruments).with_refreshed_at(Some(Utc::now()));
        let total = snapshot.len();
        self.swap(snapshot).await;
        self.clear_stale();

        info!(listed, retired = retired_count, total, "catalog refreshed");
        Ok(total)
    }

    /// Upserts instruments discovered outside the listing, such as through
    /// upstream search. Returns how many were new to the catalog.
    pub async fn merge(&self, discovered: Vec<Instrument>) -> usize {
        if discovered.is_empty() {
            return 0;
        }
        let _gate = self.inner.rebuild_gate.lock().await;
        let previous = self.all().await;
        let added = discovered
            .iter()
            .filter(|instrument| previous.get(&instrument.identifier).is_none())
            .count();

        let mut instruments: Vec<Instrument> = previous.instruments().cloned().collect();
        instruments.extend(discovered);
        let snapshot = CatalogSnapshot::from_instruments(instruments)
            .with_refreshed_at(previous.refreshed_at());
        let total = snapshot.len();
        self.swap(snapshot).await;

        debug!(added, total, "merged discovered instruments");
        added
    }

    /// Current snapshot; safe to hold across a concurrent refresh.
    pub async fn all(&self) -> Arc<CatalogSnapshot> {
        self.inner.current.read().await.clone()
    }

    /// Looks up an instrument by its upstream identifier.
    ///
    /// # Errors
    /// Returns `QueryError::NotFound` when the identifier is unknown.
    pub async fn lookup(&self, identifier: &str) -> Result<Instrument, QueryError> {
        self.all()
            .await
            .get(identifier)
            .cloned()
            .ok_or_else(|| QueryError::NotFound {
                query: identifier.to_string(),
            })
    }

    /// Returns the stale condition the first time it is asked for in each
    /// stale episode, then `None` until the catalog goes stale again.
    pub fn take_warning(&self) -> Option<CatalogStale> {
        let mut health = self.health();
        if health.warned {
            return None;
        }
        let stale = health.stale.clone()?;
        health.warned = true;
        Some(stale)
    }

    pub async fn status(&self) -> CatalogStatus {
        let snapshot = self.all().await;
        let stale = self.health().stale.clone();
        CatalogStatus {
            instruments: snapshot.len(),
            active: snapshot.instruments().filter(|instrument| instrument.active).count(),
            refreshed_at: snapshot.refreshed_at(),
            stale,
        }
    }

    /// Refreshes the catalog every `interval` until the task is aborted.
    /// The first refresh happens one interval after spawning.
    pub fn spawn_refresher(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let catalog = self;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = catalog.refresh().await {
                    warn!(error = %err, "scheduled catalog refresh failed");
                }
            }
        })
    }

    /// Snapshots are built before this is called; the write lock only
    /// covers the pointer swap.
    async fn swap(&self, snapshot: CatalogSnapshot) {
        *self.inner.current.write().await = Arc::new(snapshot);
    }

    async fn load_listing(&self) -> Result<Vec<Instrument>, QueryError> {
        let raw = self.inner.fetcher.fetch_listing().await?;
        normalize_listing(&raw).map_err(|detail| QueryError::malformed("listing", detail))
    }

    async fn mark_stale(&self, err: &QueryError) {
        let last_success = self.all().await.refreshed_at();
        let mut health = self.health();
        if let Some(stale) = health.stale.as_mut() {
            stale.reason = err.to_string();
            return;
        }
        warn!(error = %err, "catalog refresh failed; serving previous catalog");
        health.stale = Some(CatalogStale {
            reason: err.to_string(),
            since: Utc::now(),
            last_success,
        });
        health.warned = false;
    }

    fn clear_stale(&self) {
        let mut health = self.health();
        if health.stale.take().is_some() {
            info!("catalog recovered");
        }
        health.warned = false;
    }

    fn health(&self) -> std::sync::MutexGuard<'_, CatalogHealth> {
        self.inner.health.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
