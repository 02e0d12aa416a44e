//! MCP tool framing

use serde::Serialize;
use serde_json::Value;

use crate::types::McpResult;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool definition returned by `tools/list`
#[derive(Serialize, Debug, Clone)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl McpTool {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Name and version reported in the `initialize` handshake
#[derive(Clone, Debug)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self::new("trace-query", env!("CARGO_PKG_VERSION"))
    }
}

/// A callable tool. Implementations are registered with the server by name.
pub trait Tool: Send + Sync {
    fn definition(&self) -> McpTool;

    /// Run with the call's `arguments` object; the result is the MCP content value
    fn execute(&self, params: Value) -> McpResult<Value>;

    fn name(&self) -> String {
        self.definition().name
    }
}
