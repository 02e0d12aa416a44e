//! Entity reference scan tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::{McpTool, Tool};
use crate::query::QueryEngine;
use crate::server::json_response;
use crate::tools::args;
use crate::types::{EntityFilter, EntityType, McpResult};

/// Tool for finding every event that mentions an order, symbol, position or indicator
pub struct GetEventsByEntityTool {
    engine: Arc<QueryEngine>,
}

impl GetEventsByEntityTool {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for GetEventsByEntityTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "get_events_by_entity",
            "Get events whose payload references an entity (order, symbol, position, indicator)",
            json!({
                "type": "object",
                "properties": {
                    "entityType": {
                        "type": "string",
                        "enum": ["order", "symbol", "position", "indicator"]
                    },
                    "entityValue": {
                        "type": "string",
                        "description": "Entity key, e.g. an order id or ticker"
                    },
                    "eventTypes": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Restrict to these event types"
                    },
                    "runId": {"type": "string"},
                    "page": {"type": "integer", "default": 0},
                    "pageSize": {"type": "integer", "default": 100, "maximum": 1000}
                },
                "required": ["entityType", "entityValue"]
            }),
        )
    }

    fn execute(&self, params: Value) -> McpResult<Value> {
        let entity_type = args::required_enum::<EntityType>(&params, "entityType")?;
        let value = args::required_str(&params, "entityValue")?;

        let mut filter = EntityFilter::new(entity_type, value)
            .with_kinds(args::kinds(&params, "eventTypes")?);
        filter.run_id = args::optional_str(&params, "runId")?.map(str::to_string);
        let pagination = args::pagination(&params, self.engine.limits())?;

        let page = self.engine.query_by_entity(&filter, pagination)?;
        json_response(&page)
    }
}
