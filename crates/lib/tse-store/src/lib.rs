//! Market data models and schema helpers for tse-mcp.
//!
//! This crate defines the canonical record shapes shared by the catalog,
//! normalizer, query service, and MCP tool surface, plus the upstream TSETMC
//! endpoint and field names the normalizer reads.

pub mod models;
pub mod schema;

pub use models::*;
