//! State delta tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::{McpTool, Tool};
use crate::query::QueryEngine;
use crate::server::json_response;
use crate::tools::args;
use crate::types::McpResult;

pub struct GetStateDeltaTool {
    engine: Arc<QueryEngine>,
}

impl GetStateDeltaTool {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for GetStateDeltaTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "get_state_delta",
            "Field-by-field change in positions, indicators, active orders and P&L between two timestamps",
            json!({
                "type": "object",
                "properties": {
                    "fromTimestamp": {"type": ["string", "integer"]},
                    "toTimestamp": {"type": ["string", "integer"]},
                    "symbol": {"type": "string"},
                    "runId": {"type": "string"}
                },
                "required": ["fromTimestamp", "toTimestamp"]
            }),
        )
    }

    fn execute(&self, params: Value) -> McpResult<Value> {
        let from = args::required_timestamp(&params, "fromTimestamp")?;
        let to = args::required_timestamp(&params, "toTimestamp")?;
        let run_id = args::optional_str(&params, "runId")?;
        let symbol = args::optional_str(&params, "symbol")?;

        let delta = self.engine.state_delta(run_id, from, to, symbol)?;
        json_response(&delta)
    }
}
