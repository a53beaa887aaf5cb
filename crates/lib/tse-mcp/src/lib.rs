//! MCP server implementation for tse-mcp.
//!
//! This crate wires the market control plane into rmcp tool handlers and
//! exposes the MCP-facing API surface for instrument search, snapshots, and
//! daily history.

mod helpers;
mod tools;
pub mod server;

use std::sync::Arc;

use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use serde_json::json;
use tse_core::MarketControlPlane;

const SERVER_INSTRUCTIONS: &str = r"tse-mcp answers questions about instruments listed on the Tehran Stock Exchange (TSETMC).

Workflow:
1. Find an instrument with `search_stock` (symbol, Persian name, Latin name, or ISIN).
   Arabic and Persian spellings, Persian digits, and zero-width joiners are all accepted.
2. Fetch the latest trading snapshot with `get_stock_info`.
3. Fetch daily sessions with `get_stock_history`, optionally bounded by `start_date`/`end_date`.

Notes:
- Dates may be Gregorian (`2024-01-01`) or Jalali (`1402/10/11`); both are returned on every record.
- When a name matches several instruments equally well the error lists the candidates; retry with a symbol.
- Prices are in Rials. Missing values are null, never zero.
- A `warning` field means the instrument catalog could not be refreshed and results come from the previous listing.
- Use `help` for the command list and `health` for catalog status.";

/// MCP server wrapper around the market control plane and tool routers.
#[derive(Clone)]
pub struct TseMcp {
    tool_router: ToolRouter<Self>,
    control: Arc<MarketControlPlane>,
}

impl TseMcp {
    /// Creates a new server owning the control plane.
    #[must_use]
    pub fn new(control: MarketControlPlane) -> Self {
        Self::with_control(Arc::new(control))
    }

    /// Creates a new server using a shared control plane handle.
    #[must_use]
    pub fn with_control(control: Arc<MarketControlPlane>) -> Self {
        let tool_router =
            Self::tool_router_core() + Self::tool_router_market() + Self::tool_router_context();
        Self {
            tool_router,
            control,
        }
    }

    pub(crate) fn control(&self) -> &MarketControlPlane {
        &self.control
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl TseMcp {
    #[tool(description = "Health check. Returns 'ok' with instrument catalog status.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        let catalog = self.control.catalog().status().await;
        Ok(CallToolResult::success(vec![Content::json(json!({
            "status": "ok",
            "catalog": catalog,
        }))?]))
    }
}

#[tool_handler]
impl ServerHandler for TseMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tse_core::PipelineConfig;
    use tse_core::fetcher::ReqwestTransport;

    fn server() -> TseMcp {
        TseMcp::new(MarketControlPlane::from_transport(
            Arc::new(ReqwestTransport::new()),
            PipelineConfig::default(),
        ))
    }

    #[test]
    fn routers_register_every_tool() {
        let names: Vec<String> = server()
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        for expected in [
            "health",
            "search_stock",
            "get_stock_info",
            "get_stock_history",
            "help",
            "dates_help",
        ] {
            assert!(names.iter().any(|name| name == expected), "missing {expected}");
        }
    }

    #[test]
    fn server_info_enables_tools() {
        let info = server().get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap_or_default().contains("search_stock"));
    }
}
