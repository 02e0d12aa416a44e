//! Event Store Module
//!
//! This module provides the persistence layer for run traces:
//! - `EventStore`: SQLite-backed append-only event log (WAL mode)
//! - `StoreHandle`: reconnectable connection shared by the query side
//! - `cleanup_store`: all-or-none removal of a store and its sidecar files
//!
//! # Architecture
//!
//! ```text
//! Write Path (producer process):
//! ┌──────────┐    ┌────────────────────┐    ┌──────────────────────┐
//! │ Recorder │───►│ IngestionPipeline  │───►│ write_batch()        │
//! │          │    │ size / timer flush │    │ one tx, INSERT OR    │
//! └──────────┘    └────────────────────┘    │ IGNORE by event_id   │
//!                                           └──────────────────────┘
//! Read Path (query server):
//! ┌──────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │ RPC request  │───►│ StoreHandle  │───►│ indexed SELECT  │
//! │              │    │ read guard   │    │ ORDER BY ts,seq │
//! └──────────────┘    └──────────────┘    └─────────────────┘
//! ```

mod cleanup;
mod handle;
mod store;

pub use cleanup::{cleanup_store, store_files, CleanupPolicy, CleanupReport};
pub use handle::StoreHandle;
pub use store::{EventStore, StoreError, StoreResult};
pub(crate) use store::{read_event_row, EVENT_COLUMNS};
