use std::time::Duration;

use chrono::NaiveDate;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tse_core::QueryError;
use tse_core::normalizer::parse_date_text;

use crate::{TseMcp, helpers};

/// Parameters for searching instruments by symbol, name, or alias.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchStockParams {
    /// Symbol, company name, Latin name, or ISIN. Persian or Arabic script.
    pub query: String,
    /// Maximum number of hits; defaults to the server setting.
    pub limit: Option<i64>,
    /// Overall deadline for the call in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Parameters for fetching the latest trading snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetStockInfoParams {
    pub symbol_or_name: String,
    /// Overall deadline for the call in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Parameters for fetching daily trading history.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetStockHistoryParams {
    pub symbol_or_name: String,
    /// First session date, `YYYY-MM-DD` (Gregorian) or `YYYY/MM/DD` (Jalali).
    pub start_date: Option<String>,
    /// Last session date; defaults to today in Tehran.
    pub end_date: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[tool_router(router = tool_router_market, vis = "pub")]
impl TseMcp {
    #[tool(description = "Search TSE instruments by symbol, name, alias, or ISIN. Returns ranked hits with scores.")]
    async fn search_stock(
        &self,
        Parameters(params): Parameters<SearchStockParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let deadline = parse_deadline(params.timeout_ms).map_err(helpers::map_err)?;
        let outcome = self
            .control()
            .search_stock(&params.query, params.limit, deadline)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(outcome)?]))
    }

    #[tool(description = "Fetch the latest trading snapshot (prices, volume, value, change) for one instrument.")]
    async fn get_stock_info(
        &self,
        Parameters(params): Parameters<GetStockInfoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let deadline = parse_deadline(params.timeout_ms).map_err(helpers::map_err)?;
        let info = self
            .control()
            .get_stock_info(&params.symbol_or_name, deadline)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(info)?]))
    }

    #[tool(description = "Fetch daily OHLC history for one instrument between start_date and end_date (Gregorian or Jalali).")]
    async fn get_stock_history(
        &self,
        Parameters(params): Parameters<GetStockHistoryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let deadline = parse_deadline(params.timeout_ms).map_err(helpers::map_err)?;
        let start =
            parse_optional_date("start_date", params.start_date.as_deref()).map_err(helpers::map_err)?;
        let end =
            parse_optional_date("end_date", params.end_date.as_deref()).map_err(helpers::map_err)?;
        let history = self
            .control()
            .get_stock_history(&params.symbol_or_name, start, end, deadline)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(history)?]))
    }
}

fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, QueryError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    parse_date_text(value)
        .map(Some)
        .map_err(|reason| QueryError::InvalidInput(format!("{field} '{value}': {reason}")))
}

fn parse_deadline(timeout_ms: Option<u64>) -> Result<Option<Duration>, QueryError> {
    match timeout_ms {
        Some(0) => Err(QueryError::InvalidInput(String::from(
            "timeout_ms must be greater than zero",
        ))),
        other => Ok(other.map(Duration::from_millis)),
    }
}
