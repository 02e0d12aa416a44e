//! Helpers shared by the dispatcher and the tools

use std::error::Error;

use serde::Serialize;
use serde_json::{json, Value};

use crate::protocol::{INTERNAL_ERROR, INVALID_PARAMS};
use crate::query::QueryError;
use crate::tools::InvalidArgument;
use crate::types::McpResult;

/// Extract tool arguments from `tools/call` params
pub fn extract_arguments(params: &Value) -> Value {
    params.get("arguments").cloned().unwrap_or_else(|| json!({}))
}

pub fn extract_tool_name(params: &Value) -> Option<&str> {
    params.get("name").and_then(|v| v.as_str())
}

/// Wrap text as MCP text content
pub fn text_response(text: String) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": text
        }]
    })
}

/// Pretty JSON of `value` as MCP text content
pub fn json_response<T: Serialize>(value: &T) -> McpResult<Value> {
    Ok(text_response(serde_json::to_string_pretty(value)?))
}

/// JSON-RPC code for a failed tool call
///
/// Bad arguments and rejected filters are the caller's fault; anything else
/// is internal.
pub fn error_code(err: &(dyn Error + Send + Sync + 'static)) -> i32 {
    if err.downcast_ref::<InvalidArgument>().is_some() {
        return INVALID_PARAMS;
    }
    match err.downcast_ref::<QueryError>() {
        Some(QueryError::InvalidFilter(_)) => INVALID_PARAMS,
        _ => INTERNAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::McpResult;

    #[test]
    fn test_error_code_mapping() {
        let bad_arg: McpResult<()> = Err(InvalidArgument("missing runId".into()).into());
        assert_eq!(error_code(bad_arg.unwrap_err().as_ref()), INVALID_PARAMS);

        let bad_filter: McpResult<()> = Err(QueryError::InvalidFilter("range".into()).into());
        assert_eq!(error_code(bad_filter.unwrap_err().as_ref()), INVALID_PARAMS);

        let unavailable: McpResult<()> = Err(QueryError::StoreUnavailable.into());
        assert_eq!(error_code(unavailable.unwrap_err().as_ref()), INTERNAL_ERROR);

        let other: McpResult<()> = Err("boom".into());
        assert_eq!(error_code(other.unwrap_err().as_ref()), INTERNAL_ERROR);
    }

    #[test]
    fn test_extract_helpers() {
        let params = json!({"name": "list_runs"});
        assert_eq!(extract_tool_name(&params), Some("list_runs"));
        assert_eq!(extract_arguments(&params), json!({}));
    }
}
