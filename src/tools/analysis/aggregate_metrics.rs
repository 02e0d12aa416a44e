//! Aggregate metrics tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::protocol::{McpTool, Tool};
use crate::query::QueryEngine;
use crate::server::json_response;
use crate::tools::args;
use crate::types::{AggregateFunction, AggregateRequest, EventKind, McpResult};

/// Tool for count/sum/avg/min/max/stddev over a numeric payload field
pub struct AggregateMetricsTool {
    engine: Arc<QueryEngine>,
}

impl AggregateMetricsTool {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

impl Tool for AggregateMetricsTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "aggregate_metrics",
            "Aggregate a numeric payload field across events of one type. Non-numeric values are excluded and counted.",
            json!({
                "type": "object",
                "properties": {
                    "eventType": {"type": "string"},
                    "fieldPath": {
                        "type": "string",
                        "description": "Payload field, e.g. 'price' or 'fill.price'"
                    },
                    "aggregations": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["count", "sum", "avg", "min", "max", "stddev"]
                        },
                        "description": "Functions to compute (omit for all)"
                    },
                    "runId": {"type": "string"},
                    "startTime": {"type": ["string", "integer"]},
                    "endTime": {"type": ["string", "integer"]}
                },
                "required": ["eventType", "fieldPath"]
            }),
        )
    }

    fn execute(&self, params: Value) -> McpResult<Value> {
        let kind = args::required_enum::<EventKind>(&params, "eventType")?;
        let field_path = args::required_str(&params, "fieldPath")?;

        let mut request = AggregateRequest::new(kind, field_path)
            .with_functions(args::enum_list::<AggregateFunction>(&params, "aggregations")?)
            .with_time_range(args::time_range(&params)?);
        request.run_id = args::optional_str(&params, "runId")?.map(str::to_string);

        let result = self.engine.aggregate(&request)?;
        json_response(&result)
    }
}
