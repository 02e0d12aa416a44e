//! MCP tools over the query engine
//!
//! - Event tools (3): run listing, filtered scan, entity scan
//! - Analysis tools (2): aggregation, causal chains
//! - State tools (2): snapshot, delta
//! - Status tools (1): lifecycle state

pub mod analysis;
pub mod args;
pub mod events;
pub mod state;
pub mod status;

use std::sync::Arc;

use crate::lifecycle::StateMachine;
use crate::query::QueryEngine;
use crate::server::McpServer;

pub use analysis::{AggregateMetricsTool, QueryEventSequencesTool};
pub use args::InvalidArgument;
pub use events::{GetEventsByEntityTool, GetEventsByKindTool, ListRunsTool};
pub use state::{GetStateDeltaTool, GetStateSnapshotTool};
pub use status::GetServerStatusTool;

/// Register every tool with the server
pub fn register_all_tools(
    server: &mut McpServer,
    engine: Arc<QueryEngine>,
    machine: Arc<StateMachine>,
) {
    server.register_tool(Box::new(ListRunsTool::new(engine.clone())));
    server.register_tool(Box::new(GetEventsByKindTool::new(engine.clone())));
    server.register_tool(Box::new(GetEventsByEntityTool::new(engine.clone())));

    server.register_tool(Box::new(AggregateMetricsTool::new(engine.clone())));
    server.register_tool(Box::new(QueryEventSequencesTool::new(engine.clone())));

    server.register_tool(Box::new(GetStateSnapshotTool::new(engine.clone())));
    server.register_tool(Box::new(GetStateDeltaTool::new(engine.clone())));

    server.register_tool(Box::new(GetServerStatusTool::new(
        engine.store().clone(),
        machine,
    )));
}
