//! Market-data resolution and normalization pipeline for the Tehran Stock
//! Exchange.
//!
//! The crate resolves free-text symbols and names against an in-memory
//! instrument catalog, fetches raw payloads from the TSETMC CDN with retry and
//! request coalescing, and normalizes them into the typed records defined in
//! `tse-store`. [`control::MarketControlPlane`] ties the pieces together behind
//! the three query operations.

pub mod catalog;
pub mod config;
pub mod control;
pub mod error;
pub mod fetcher;
pub mod normalizer;
pub mod resolver;

pub use catalog::{Catalog, CatalogSnapshot, CatalogStatus};
pub use config::{ConfigError, PipelineConfig, UpstreamConfig};
pub use control::{MarketControlPlane, Resolved, SearchOutcome};
pub use error::{CatalogStale, QueryError};
