//! MCP tool modules.
//!
//! Tools are grouped by domain: market queries and contextual help.

pub mod market;
mod context;
