//! Server status tool

use std::sync::Arc;

use serde_json::{json, Value};

use crate::event_store::StoreHandle;
use crate::lifecycle::{ServerStatus, StateMachine};
use crate::protocol::{McpTool, Tool};
use crate::server::json_response;
use crate::types::McpResult;

/// Tool reporting lifecycle state and whether the store connection is open
pub struct GetServerStatusTool {
    store: Arc<StoreHandle>,
    machine: Arc<StateMachine>,
}

impl GetServerStatusTool {
    pub fn new(store: Arc<StoreHandle>, machine: Arc<StateMachine>) -> Self {
        Self { store, machine }
    }
}

impl Tool for GetServerStatusTool {
    fn definition(&self) -> McpTool {
        McpTool::new(
            "get_server_status",
            "Report the server's lifecycle state, store path, connection and pid",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        )
    }

    fn execute(&self, _params: Value) -> McpResult<Value> {
        let status = ServerStatus::current(
            self.machine.current(),
            self.store.path(),
            self.store.is_attached(),
        );
        json_response(&status)
    }
}
