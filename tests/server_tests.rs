//! RPC tests: in-process dispatch and the server binary over stdio

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use trace_query::event_store::StoreHandle;
use trace_query::ingest::{EventRecorder, PipelineConfig};
use trace_query::lifecycle::StateMachine;
use trace_query::query::QueryEngine;
use trace_query::server::McpServer;
use trace_query::tools::register_all_tools;
use trace_query::types::{EventKind, NewEvent, Run, Timestamp};

fn seed(path: &Path) {
    let run = Run::new(
        "run-1",
        Timestamp::from_millis(1_709_285_400_000),
        Timestamp::from_millis(1_709_289_000_000),
        "cfg",
    );
    let recorder = EventRecorder::begin_run(path, &run, PipelineConfig::default()).unwrap();
    recorder.write_event(NewEvent::new(
        "ind-1",
        "run-1",
        Timestamp::from_millis(1_709_285_400_000),
        EventKind::IndicatorCalculation,
        json!({"indicator_name": "sma_20", "symbol": "AAPL", "value": 181.2}),
    ));
    recorder.write_event(NewEvent::new(
        "rej-1",
        "run-1",
        Timestamp::from_millis(1_709_285_401_000),
        EventKind::OrderRejection,
        json!({"order_id": "o-9", "symbol": "AAPL", "reason": "insufficient buying power"}),
    ));
    recorder.finish();
}

fn call(id: i64, tool: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": tool, "arguments": arguments}
    })
}

fn tool_payload(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

fn in_process_server(path: &Path) -> McpServer {
    let handle = StoreHandle::detached(path);
    handle.attach().unwrap();
    let engine = Arc::new(QueryEngine::new(Arc::new(handle)));
    let mut server = McpServer::new();
    register_all_tools(&mut server, engine, Arc::new(StateMachine::new()));
    server
}

fn exchange(server: &McpServer, requests: &[Value]) -> Vec<Value> {
    let input: String = requests.iter().map(|r| format!("{r}\n")).collect();
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_tools_over_in_process_transport() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    seed(&path);
    let server = in_process_server(&path);

    let responses = exchange(
        &server,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
            call(2, "list_runs", json!({})),
            call(3, "get_events_by_entity", json!({"entityType": "order", "entityValue": "o-9"})),
            call(4, "get_state_snapshot", json!({"timestamp": 1709285402000i64, "symbol": "AAPL"})),
        ],
    );
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["result"]["tools"].as_array().unwrap().len(), 8);

    let runs = tool_payload(&responses[1]);
    assert_eq!(runs["runs"][0]["runId"], "run-1");
    assert_eq!(runs["runs"][0]["eventCount"], 2);

    let entity = tool_payload(&responses[2]);
    assert_eq!(entity["events"][0]["eventId"], "rej-1");
    assert_eq!(entity["metadata"]["returnedCount"], 1);

    let snapshot = tool_payload(&responses[3]);
    assert_eq!(snapshot["indicators"][0]["indicatorName"], "sma_20");
    assert_eq!(snapshot["activeOrders"].as_array().unwrap().len(), 0);
}

#[test]
fn test_invalid_arguments_use_invalid_params_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    seed(&path);
    let server = in_process_server(&path);

    let responses = exchange(
        &server,
        &[
            call(1, "get_events_by_entity", json!({"entityType": "account", "entityValue": "x"})),
            call(2, "aggregate_metrics", json!({"eventType": "market_data", "fieldPath": "a..b"})),
            call(3, "get_state_delta", json!({"fromTimestamp": "soon", "toTimestamp": 0})),
            call(4, "query_event_sequences", json!({"rootEventId": "missing"})),
            call(5, "get_events_by_kind", json!({"eventType": "market_data", "page": 9223372036854775808u64})),
            call(6, "list_runs", json!({})),
        ],
    );
    assert_eq!(responses[0]["error"]["code"], -32602);
    assert_eq!(responses[1]["error"]["code"], -32602);
    assert_eq!(responses[2]["error"]["code"], -32602);
    assert_eq!(responses[3]["error"]["code"], -32603);
    assert_eq!(responses[4]["error"]["code"], -32602);
    assert_eq!(tool_payload(&responses[5])["runs"][0]["runId"], "run-1");
}

#[test]
fn test_server_binary_over_stdio() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    seed(&path);

    let mut child = Command::new(env!("CARGO_BIN_EXE_trace-query-server"))
        .arg(&path)
        .arg("--runtime-dir")
        .arg(dir.path().join("rt"))
        .arg("--instance")
        .arg("stdio")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut roundtrip = |request: Value| -> Value {
        writeln!(stdin, "{request}").unwrap();
        stdin.flush().unwrap();
        let mut line = String::new();
        stdout.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    };

    let init = roundtrip(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}));
    assert_eq!(init["result"]["serverInfo"]["name"], "trace-query");

    let events = roundtrip(call(2, "get_events_by_kind", json!({"eventType": "indicator_calculation"})));
    assert_eq!(tool_payload(&events)["events"][0]["eventId"], "ind-1");

    let status = roundtrip(call(3, "get_server_status", json!({})));
    let status = tool_payload(&status);
    assert_eq!(status["state"], "running");
    assert_eq!(status["connected"], true);
    assert_eq!(status["pid"], child.id());

    drop(roundtrip);
    drop(stdin);
    let exit = child.wait().unwrap();
    assert!(exit.success());
}
