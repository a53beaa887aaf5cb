use std::borrow::Cow;

use rmcp::ErrorData;
use rmcp::model::ErrorCode;
use serde_json::json;
use tse_core::QueryError;

pub(crate) fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

/// Maps a query failure onto an MCP error carrying `{ kind, message, context }`.
pub(crate) fn map_err(err: QueryError) -> ErrorData {
    let code = match &err {
        QueryError::NotFound { .. } | QueryError::InstrumentNotFound { .. } => {
            ErrorCode::RESOURCE_NOT_FOUND
        }
        QueryError::Ambiguous { .. }
        | QueryError::InvalidRange { .. }
        | QueryError::InvalidInput(_) => ErrorCode::INVALID_PARAMS,
        QueryError::UpstreamUnavailable { .. }
        | QueryError::Timeout { .. }
        | QueryError::MalformedData { .. } => ErrorCode::INTERNAL_ERROR,
    };
    let message = err.to_string();
    let mut error = mcp_err(code, message.clone());
    error.data = Some(json!({
        "kind": err.kind(),
        "message": message,
        "context": err.context(),
    }));
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_resource_not_found() {
        let err = map_err(QueryError::NotFound {
            query: "zzz".to_string(),
        });
        assert_eq!(err.code, ErrorCode::RESOURCE_NOT_FOUND);
        let data = err.data.expect("data");
        assert_eq!(data["kind"], "not_found");
        assert_eq!(data["context"]["query"], "zzz");
    }

    #[test]
    fn invalid_input_maps_to_invalid_params() {
        let err = map_err(QueryError::InvalidInput("limit must be positive".to_string()));
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(err.message, "invalid input: limit must be positive");
    }

    #[test]
    fn upstream_failures_map_to_internal_error() {
        let err = map_err(QueryError::UpstreamUnavailable {
            target: "snapshot 1".to_string(),
            attempts: 4,
            message: "HTTP 503".to_string(),
        });
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(err.data.expect("data")["context"]["attempts"], 4);
    }
}
