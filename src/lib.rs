//! Trace Query Server
//!
//! Append-only event log for simulation runs, stored in an embedded SQLite
//! database, with a long-lived query server speaking JSON-RPC 2.0 (MCP tool
//! framing) over stdio.
//!
//! # Modules
//!
//! - `types`: events, runs, payloads, query requests and results
//! - `event_store`: SQLite store, swappable handle, cleanup with retries
//! - `ingest`: batching pipeline and the producer-facing recorder
//! - `query`: filtered, entity, causal-chain, aggregation and state queries
//! - `lifecycle`: single-instance server, detached spawn, store watcher
//! - `protocol`, `server`, `tools`: the RPC surface
//! - `validation`: soft payload checks applied at write time
//! - `config`, `utils`: configuration, timestamps, atomic writes, logging
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trace_query::event_store::StoreHandle;
//! use trace_query::lifecycle::StateMachine;
//! use trace_query::tools::register_all_tools;
//! use trace_query::{McpServer, QueryEngine};
//!
//! fn main() -> trace_query::McpResult<()> {
//!     let store = Arc::new(StoreHandle::detached("run.db"));
//!     store.attach()?;
//!     let engine = Arc::new(QueryEngine::new(store));
//!     let mut server = McpServer::new();
//!     register_all_tools(&mut server, engine, Arc::new(StateMachine::new()));
//!     server.run()
//! }
//! ```

pub mod config;
pub mod event_store;
pub mod ingest;
pub mod lifecycle;
pub mod protocol;
pub mod query;
pub mod server;
pub mod tools;
pub mod types;
pub mod utils;
pub mod validation;

pub use config::ServerConfig;
pub use event_store::{EventStore, StoreError, StoreHandle};
pub use ingest::{EventRecorder, IngestionPipeline, PipelineConfig};
pub use lifecycle::{LifecycleError, LifecycleManager, LifecycleState};
pub use protocol::{McpTool, ServerInfo, Tool};
pub use query::{QueryEngine, QueryError, QueryLimits};
pub use server::McpServer;
pub use types::{EventKind, EventRecord, McpResult, NewEvent, Run, Timestamp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");
