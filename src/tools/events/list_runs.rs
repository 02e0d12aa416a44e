//! List runs tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::{McpTool, Tool};
use crate::query::QueryEngine;
use crate::server::json_response;
use crate::types::McpResult;

/// Tool for listing runs with their event statistics
pub struct ListRunsTool {
    engine: Arc<QueryEngine>,
}

impl ListRunsTool {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for ListRunsTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "list_runs",
            "List simulation runs in the trace store with event counts and time spans",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        )
    }

    fn execute(&self, _params: Value) -> McpResult<Value> {
        let runs = self.engine.list_runs()?;
        json_response(&runs)
    }
}
