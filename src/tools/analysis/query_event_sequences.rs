//! Causal chain tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::{McpTool, Tool};
use crate::query::QueryEngine;
use crate::server::json_response;
use crate::tools::args;
use crate::types::{EventKind, McpResult, SequenceQuery};

/// Tool for following parent links from a root event, or from every root
pub struct QueryEventSequencesTool {
    engine: Arc<QueryEngine>,
}

impl QueryEventSequencesTool {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for QueryEventSequencesTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "query_event_sequences",
            "Follow causal parent links from a root event (or every root) and report each chain's events and completeness against a pattern",
            json!({
                "type": "object",
                "properties": {
                    "rootEventId": {
                        "type": "string",
                        "description": "Start from this event; omit to discover parentless roots"
                    },
                    "rootKind": {
                        "type": "string",
                        "description": "Only discover roots of this event type"
                    },
                    "pattern": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Event types a chain must contain to be complete"
                    },
                    "includeIncomplete": {"type": "boolean", "default": true},
                    "maxDepth": {"type": "integer", "default": 10, "maximum": 100},
                    "runId": {"type": "string"},
                    "page": {"type": "integer", "default": 0},
                    "pageSize": {"type": "integer", "default": 100, "maximum": 1000}
                },
                "required": []
            }),
        )
    }

    fn execute(&self, params: Value) -> McpResult<Value> {
        let mut query = match args::optional_str(&params, "rootEventId")? {
            Some(root) => SequenceQuery::from_root(root),
            None => SequenceQuery::discover(),
        };
        query.run_id = args::optional_str(&params, "runId")?.map(str::to_string);
        query.root_kind = args::parse_enum::<EventKind>(&params, "rootKind")?;
        query.pattern = args::kinds(&params, "pattern")?;
        query.include_incomplete = args::bool_or(&params, "includeIncomplete", true)?;
        query.max_depth = args::optional_usize(&params, "maxDepth")?;
        query.pagination = args::pagination(&params, self.engine.limits())?;

        let result = self.engine.query_sequences(&query)?;
        json_response(&result)
    }
}
