use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::TseMcp;

/// Payload listing the MCP commands this server answers.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HelpCommands {
    pub commands: Vec<String>,
}

impl Default for HelpCommands {
    fn default() -> Self {
        Self {
            commands: vec![
                "help - List the MCP commands this server answers.".to_string(),
                "health - Report server status and instrument catalog freshness.".to_string(),
                "search_stock - Rank instruments matching a symbol, name, alias, or ISIN."
                    .to_string(),
                "get_stock_info - Latest trading snapshot for one instrument.".to_string(),
                "get_stock_history - Daily sessions for one instrument within a date range."
                    .to_string(),
                "dates_help - Accepted date formats and how ranges default.".to_string(),
            ],
        }
    }
}

#[tool_router(router = tool_router_context, vis = "pub")]
impl TseMcp {
    #[tool(description = "List the MCP commands this server answers.")]
    async fn help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::json(HelpCommands::default())?]))
    }

    #[tool(description = "Describes accepted date formats and how history ranges default.")]
    async fn dates_help(&self) -> Result<CallToolResult, ErrorData> {
        let config = self.control().config();
        Ok(CallToolResult::success(vec![Content::text(format!(
r"
1. Dates may be written as:
    - Gregorian: 2024-01-01, 2024/01/01, or 20240101.
    - Jalali (Solar Hijri): 1402/10/11 or 14021011. Years below 1700 are read as Jalali.
    - Persian and Arabic-Indic digits are accepted: ۱۴۰۲/۱۰/۱۱.
2. Every returned record carries both `date` (Gregorian) and `jalali_date`.
3. get_stock_history ranges:
    - end_date defaults to today on the Tehran clock (UTC+03:30).
    - start_date defaults to {} days ending at end_date.
    - Ranges longer than {} days, or with start_date after end_date, are rejected.
4. Weekends (Thursday/Friday) and holidays have no sessions; they are simply absent.
",
            config.default_history_days, config.max_history_span_days,
        ))]))
    }
}
