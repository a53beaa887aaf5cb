//! Daemon entry point for the TSE MCP server.
//!
//! Loads configuration from arguments and the environment, warms the
//! instrument catalog, and serves MCP over stdio or streamable HTTP.

mod bootstrap;
mod config;

use tracing::info;
use tracing_subscriber::EnvFilter;
use tse_mcp::server::{serve_stdio, serve_streamable_http};

use crate::bootstrap::{build_control, warm_catalog};
use crate::config::{DaemonConfig, LogFormat, Transport};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = DaemonConfig::from_args()?;
    init_tracing(config.log_format)?;

    let control = build_control(&config);
    let refresher = warm_catalog(&control).await;

    info!(transport = ?config.transport, "starting tse-mcpd");
    let served = match config.transport {
        Transport::Stdio => serve_stdio(control).await,
        Transport::Http => serve_streamable_http(control, config.http.clone()).await,
    };

    if let Some(refresher) = refresher {
        refresher.abort();
    }
    served
}

/// Logs go to stderr; stdout carries the stdio transport.
fn init_tracing(format: LogFormat) -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_env("TSE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}
