//! Filtered event scan tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::{McpTool, Tool};
use crate::query::QueryEngine;
use crate::server::json_response;
use crate::tools::args;
use crate::types::{Category, EventFilter, McpResult, Severity};

/// Tool for paging through events filtered by kind, severity, category and time
pub struct GetEventsByKindTool {
    engine: Arc<QueryEngine>,
}

impl GetEventsByKindTool {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for GetEventsByKindTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "get_events_by_kind",
            "Get events ordered by timestamp, filtered by event type, severity, category and time range",
            json!({
                "type": "object",
                "properties": {
                    "eventType": {
                        "description": "Event type or list of event types (omit for all)",
                        "oneOf": [
                            {"type": "string"},
                            {"type": "array", "items": {"type": "string"}}
                        ]
                    },
                    "runId": {"type": "string", "description": "Restrict to one run"},
                    "severity": {
                        "type": "string",
                        "enum": ["error", "warning", "info", "debug"]
                    },
                    "category": {
                        "type": "string",
                        "enum": ["execution", "market_data", "indicators", "risk", "performance"]
                    },
                    "startTime": {
                        "type": ["string", "integer"],
                        "description": "Inclusive lower bound (RFC 3339 or epoch ms)"
                    },
                    "endTime": {
                        "type": ["string", "integer"],
                        "description": "Inclusive upper bound (RFC 3339 or epoch ms)"
                    },
                    "page": {"type": "integer", "default": 0},
                    "pageSize": {"type": "integer", "default": 100, "maximum": 1000}
                },
                "required": []
            }),
        )
    }

    fn execute(&self, params: Value) -> McpResult<Value> {
        let filter = EventFilter {
            run_id: args::optional_str(&params, "runId")?.map(str::to_string),
            kinds: args::kinds(&params, "eventType")?,
            severity: args::parse_enum::<Severity>(&params, "severity")?,
            category: args::parse_enum::<Category>(&params, "category")?,
            time_range: args::time_range(&params)?,
        };
        let pagination = args::pagination(&params, self.engine.limits())?;

        let page = self.engine.query_events(&filter, pagination)?;
        json_response(&page)
    }
}
