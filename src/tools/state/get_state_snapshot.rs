//! State snapshot tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::{McpTool, Tool};
use crate::query::QueryEngine;
use crate::server::json_response;
use crate::tools::args;
use crate::types::{McpResult, SnapshotRequest};

/// Tool for reconstructing positions, indicators and active orders at a timestamp
pub struct GetStateSnapshotTool {
    engine: Arc<QueryEngine>,
}

impl GetStateSnapshotTool {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for GetStateSnapshotTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "get_state_snapshot",
            "Reconstruct positions, latest indicator values, active orders and P&L as of a timestamp",
            json!({
                "type": "object",
                "properties": {
                    "timestamp": {
                        "type": ["string", "integer"],
                        "description": "Point in time (RFC 3339 or epoch ms), inclusive"
                    },
                    "symbol": {"type": "string", "description": "Restrict to one security"},
                    "includeIndicators": {"type": "boolean", "default": true},
                    "includeActiveOrders": {"type": "boolean", "default": true},
                    "runId": {"type": "string"}
                },
                "required": ["timestamp"]
            }),
        )
    }

    fn execute(&self, params: Value) -> McpResult<Value> {
        let request = SnapshotRequest {
            run_id: args::optional_str(&params, "runId")?.map(str::to_string),
            timestamp: args::required_timestamp(&params, "timestamp")?,
            symbol: args::optional_str(&params, "symbol")?.map(str::to_string),
            include_indicators: args::bool_or(&params, "includeIndicators", true)?,
            include_active_orders: args::bool_or(&params, "includeActiveOrders", true)?,
        };

        let snapshot = self.engine.state_snapshot(&request)?;
        json_response(&snapshot)
    }
}
