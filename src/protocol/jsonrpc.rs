//! JSON-RPC 2.0 envelope types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Incoming request or notification
#[derive(Deserialize, Debug, Clone)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == "2.0"
    }

    /// Notifications carry no id and never get a response
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Id named by a `notifications/cancelled` message
    pub fn cancelled_request_id(&self) -> Option<&Value> {
        if self.method != "notifications/cancelled" {
            return None;
        }
        self.params.as_ref()?.get("requestId")
    }
}

#[derive(Serialize, Debug)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn new(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub id: Value,
    pub error: ErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Value, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            error: ErrorObject::new(code, message, data),
        }
    }

    pub fn parse_error(details: String) -> Self {
        Self::new(
            Value::Null,
            PARSE_ERROR,
            "Parse error".to_string(),
            Some(json!({ "details": details })),
        )
    }

    pub fn invalid_request(id: Value, details: &str) -> Self {
        Self::new(
            id,
            INVALID_REQUEST,
            "Invalid Request".to_string(),
            Some(json!({ "details": details })),
        )
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::new(
            id,
            METHOD_NOT_FOUND,
            "Method not found".to_string(),
            Some(json!({ "method": method })),
        )
    }

    pub fn invalid_params(id: Value, details: String) -> Self {
        Self::new(
            id,
            INVALID_PARAMS,
            "Invalid params".to_string(),
            Some(json!({ "details": details })),
        )
    }

    pub fn internal_error(id: Value, details: String) -> Self {
        Self::new(
            id,
            INTERNAL_ERROR,
            "Internal error".to_string(),
            Some(json!({ "details": details })),
        )
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            code,
            message,
            data,
        }
    }
}
