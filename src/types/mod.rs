//! Data types for the trace query server
//!
//! This module contains the core data structures shared by the store, the
//! query engine, the ingestion pipeline and the RPC tools.

mod aggregate;
mod event;
mod payload;
mod query;
mod run;
mod sequence;
mod state;
mod timestamp;

pub use aggregate::{AggregateFunction, AggregateRequest, AggregateResult};
pub use event::{Category, EventKind, EventRecord, NewEvent, Severity, UnknownVariant};
pub use payload::{
    EventPayload, IndicatorPayload, MarketDataPayload, OrderRejectionPayload,
    PositionUpdatePayload, RiskEventPayload, StateChangePayload, TradeExecutionPayload,
    TERMINAL_ORDER_STATES,
};
pub use query::{
    EntityFilter, EntityType, EventFilter, EventPage, Pagination, QueryMetadata, TimeRange,
};
pub use run::{Run, RunList, RunSummary};
pub use sequence::{EventChain, SequenceQuery, SequenceResult};
pub use state::{
    ActiveOrder, IndicatorDelta, IndicatorValue, OrderChanges, PnlSummary, PositionDelta,
    PositionState, SnapshotRequest, StateDelta, StateSnapshot,
};
pub use timestamp::{Timestamp, TimestampError};

/// Result type for MCP tool operations
pub type McpResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
