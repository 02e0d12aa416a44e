//! JSON-RPC 2.0 server over line-delimited stdio
//!
//! One request per line, one response per line. Lines that arrive while a
//! request is being handled are queued; a `notifications/cancelled` in the
//! queue drops the queued request it names without a response.

mod handlers;

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpTool, ServerInfo, Tool, PROTOCOL_VERSION,
};
use crate::types::McpResult;

pub use handlers::*;

/// A parsed input line
enum Incoming {
    Request(JsonRpcRequest),
    Malformed(String),
}

fn parse_line(line: &str) -> Incoming {
    match serde_json::from_str(line) {
        Ok(req) => Incoming::Request(req),
        Err(e) => Incoming::Malformed(e.to_string()),
    }
}

fn id_key(id: &Value) -> String {
    id.to_string()
}

pub struct McpServer {
    server_info: ServerInfo,
    tools: HashMap<String, Box<dyn Tool>>,
}

impl McpServer {
    pub fn new() -> Self {
        Self::with_info(ServerInfo::default())
    }

    pub fn with_info(info: ServerInfo) -> Self {
        Self {
            server_info: info,
            tools: HashMap::new(),
        }
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) -> &mut Self {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
        self
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Serve stdin/stdout until stdin closes
    pub fn run(&self) -> McpResult<()> {
        self.serve(io::stdin(), io::stdout())
    }

    /// Serve `input` until EOF, writing responses to `output`
    pub fn serve<R: Read, W: Write>(&self, input: R, output: W) -> McpResult<()> {
        let mut reader = BufReader::new(input);
        let mut writer = BufWriter::new(output);
        let mut queue: VecDeque<String> = VecDeque::new();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            queue.push_back(line);
            while reader.buffer().contains(&b'\n') {
                let mut next = String::new();
                reader.read_line(&mut next)?;
                queue.push_back(next);
            }

            let batch: Vec<Incoming> = queue
                .drain(..)
                .filter(|l| !l.trim().is_empty())
                .map(|l| parse_line(l.trim()))
                .collect();
            for response in self.handle_batch(batch)? {
                writeln!(writer, "{}", response)?;
                writer.flush()?;
            }
        }
        writer.flush()?;
        info!("input closed");
        Ok(())
    }

    fn handle_batch(&self, batch: Vec<Incoming>) -> McpResult<Vec<String>> {
        let mut cancelled: HashSet<String> = batch
            .iter()
            .filter_map(|incoming| match incoming {
                Incoming::Request(req) => req.cancelled_request_id().map(id_key),
                Incoming::Malformed(_) => None,
            })
            .collect();

        let mut responses = Vec::new();
        for incoming in batch {
            if let Incoming::Request(req) = &incoming {
                if let Some(id) = &req.id {
                    if cancelled.remove(&id_key(id)) {
                        debug!(id = %id, method = %req.method, "request cancelled");
                        continue;
                    }
                }
            }
            if let Some(response) = self.handle(incoming)? {
                responses.push(response);
            }
        }
        Ok(responses)
    }

    /// Handle one line; `None` for notifications
    pub fn handle_line(&self, line: &str) -> McpResult<Option<String>> {
        self.handle(parse_line(line.trim()))
    }

    fn handle(&self, incoming: Incoming) -> McpResult<Option<String>> {
        let request = match incoming {
            Incoming::Request(req) => req,
            Incoming::Malformed(details) => {
                return encode(&JsonRpcError::parse_error(details)).map(Some);
            }
        };

        if !request.is_valid() {
            let id = request.id.unwrap_or(Value::Null);
            return encode(&JsonRpcError::invalid_request(id, "jsonrpc must be '2.0'")).map(Some);
        }

        let id = match request.id.clone() {
            Some(id) => id,
            None => {
                debug!(method = %request.method, "notification");
                return Ok(None);
            }
        };

        debug!(method = %request.method, id = %id, "request");
        let response = match request.method.as_str() {
            "initialize" => encode(&JsonRpcResponse::new(id, self.initialize_result())),
            "ping" => encode(&JsonRpcResponse::new(id, json!({}))),
            "tools/list" => encode(&JsonRpcResponse::new(id, self.tools_list_result())),
            "tools/call" => self.handle_tool_call(id, request.params),
            // Notifications sent with an id still get no result body
            "notifications/initialized" | "notifications/cancelled" => return Ok(None),
            other => encode(&JsonRpcError::method_not_found(id, other)),
        }?;
        Ok(Some(response))
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": self.server_info.name,
                "version": self.server_info.version
            }
        })
    }

    fn tools_list_result(&self) -> Value {
        let mut tools: Vec<McpTool> = self.tools.values().map(|t| t.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        json!({ "tools": tools })
    }

    fn handle_tool_call(&self, id: Value, params: Option<Value>) -> McpResult<String> {
        let params = match params {
            Some(p) => p,
            None => {
                return encode(&JsonRpcError::invalid_params(id, "missing params".to_string()))
            }
        };
        let tool_name = match extract_tool_name(&params) {
            Some(name) => name,
            None => {
                return encode(&JsonRpcError::invalid_params(id, "missing tool name".to_string()))
            }
        };
        let tool = match self.tools.get(tool_name) {
            Some(tool) => tool,
            None => {
                return encode(&JsonRpcError::invalid_params(
                    id,
                    format!("unknown tool '{}'", tool_name),
                ))
            }
        };

        match tool.execute(extract_arguments(&params)) {
            Ok(result) => encode(&JsonRpcResponse::new(id, result)),
            Err(e) => {
                let code = error_code(e.as_ref());
                warn!(tool = tool_name, code, error = %e, "tool call failed");
                encode(&JsonRpcError::new(
                    id,
                    code,
                    "Tool execution error".to_string(),
                    Some(json!({ "details": e.to_string() })),
                ))
            }
        }
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

fn encode<T: Serialize>(message: &T) -> McpResult<String> {
    Ok(serde_json::to_string(message)?)
}
