//! Query Engine - read-only views over the event log
//!
//! All reads go through the shared `StoreHandle`, so a reconnect drains
//! in-flight queries and queries issued while the store is released fail fast
//! with `QueryError::StoreUnavailable`.

mod aggregate;
mod chain;
mod filter;
mod state;

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::event_store::{EventStore, StoreError, StoreHandle};
use crate::types::{
    AggregateRequest, AggregateResult, EntityFilter, EventFilter, EventPage, Pagination,
    QueryMetadata, RunList, SequenceQuery, SequenceResult, SnapshotRequest, StateDelta,
    StateSnapshot, Timestamp,
};
use crate::utils::elapsed_ms;

pub use aggregate::normalize_field_path;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors returned by the query engine
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Rejected before touching the store
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store is not available (released for cleanup or not yet created)")]
    StoreUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::Store(StoreError::Sqlite(err))
    }
}

/// Page size and chain depth bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub default_max_depth: usize,
    pub max_depth_cap: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
            default_max_depth: 10,
            max_depth_cap: 100,
        }
    }
}

impl QueryLimits {
    /// Substitute the default for a zero page size and cap oversized pages.
    /// Pages whose offset does not fit a SQLite integer are rejected.
    pub fn clamp_pagination(&self, pagination: Pagination) -> QueryResult<Pagination> {
        let page_size = match pagination.page_size {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        };
        let clamped = Pagination::new(pagination.page, page_size);
        if clamped.checked_offset().is_none() {
            return Err(QueryError::InvalidFilter(format!(
                "page {} is out of range",
                pagination.page
            )));
        }
        Ok(clamped)
    }

    pub fn clamp_depth(&self, max_depth: Option<usize>) -> usize {
        max_depth
            .unwrap_or(self.default_max_depth)
            .min(self.max_depth_cap)
    }
}

/// Read side of the store
pub struct QueryEngine {
    store: Arc<StoreHandle>,
    limits: QueryLimits,
}

impl QueryEngine {
    pub fn new(store: Arc<StoreHandle>) -> Self {
        Self::with_limits(store, QueryLimits::default())
    }

    pub fn with_limits(store: Arc<StoreHandle>, limits: QueryLimits) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &Arc<StoreHandle> {
        &self.store
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Run `f` under the store's read guard
    pub(crate) fn with_store<T>(
        &self,
        f: impl FnOnce(&EventStore) -> QueryResult<T>,
    ) -> QueryResult<T> {
        self.store
            .with_store(f)
            .unwrap_or(Err(QueryError::StoreUnavailable))
    }

    /// All runs in the store with event statistics
    pub fn list_runs(&self) -> QueryResult<RunList> {
        let started = Instant::now();
        let runs = self.with_store(|store| Ok(store.list_runs()?))?;
        let metadata = QueryMetadata::single(runs.len(), elapsed_ms(started));
        debug!(runs = runs.len(), "listed runs");
        Ok(RunList { runs, metadata })
    }

    /// Filtered scan ordered by timestamp, then sequence id
    pub fn query_events(
        &self,
        filter: &EventFilter,
        pagination: Pagination,
    ) -> QueryResult<EventPage> {
        filter::query_events(self, filter, pagination)
    }

    /// Events whose payload names the given entity
    pub fn query_by_entity(
        &self,
        filter: &EntityFilter,
        pagination: Pagination,
    ) -> QueryResult<EventPage> {
        filter::query_by_entity(self, filter, pagination)
    }

    /// Causal chains from one root, or from every discovered root
    pub fn query_sequences(&self, query: &SequenceQuery) -> QueryResult<SequenceResult> {
        chain::query_sequences(self, query)
    }

    /// Numeric aggregates of a payload field
    pub fn aggregate(&self, request: &AggregateRequest) -> QueryResult<AggregateResult> {
        aggregate::aggregate(self, request)
    }

    /// Reconstruct positions, indicators and active orders as of a timestamp
    pub fn state_snapshot(&self, request: &SnapshotRequest) -> QueryResult<StateSnapshot> {
        state::state_snapshot(self, request)
    }

    /// Field-wise difference between the snapshots at `from` and `to`
    pub fn state_delta(
        &self,
        run_id: Option<&str>,
        from: Timestamp,
        to: Timestamp,
        symbol: Option<&str>,
    ) -> QueryResult<StateDelta> {
        state::state_delta(self, run_id, from, to, symbol)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::NewEvent;

    /// Engine over an in-memory store seeded with `events`
    pub fn engine_with(events: Vec<NewEvent>) -> QueryEngine {
        let store = EventStore::open_in_memory().unwrap();
        store.write_batch(&events).unwrap();
        QueryEngine::new(Arc::new(StoreHandle::from_store(store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_pagination() {
        let limits = QueryLimits::default();
        assert_eq!(limits.clamp_pagination(Pagination::new(2, 0)).unwrap().page_size, 100);
        assert_eq!(limits.clamp_pagination(Pagination::new(0, 5000)).unwrap().page_size, 1000);
        assert_eq!(
            limits.clamp_pagination(Pagination::new(3, 25)).unwrap(),
            Pagination::new(3, 25)
        );
    }

    #[test]
    fn test_clamp_pagination_rejects_offsets_past_i64() {
        let limits = QueryLimits::default();
        let err = limits.clamp_pagination(Pagination::new(1 << 63, 1)).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
        assert!(limits.clamp_pagination(Pagination::new(usize::MAX, 1000)).is_err());
        let last = (i64::MAX as usize) / 1000;
        assert!(limits.clamp_pagination(Pagination::new(last, 1000)).is_ok());
    }

    #[test]
    fn test_clamp_depth() {
        let limits = QueryLimits::default();
        assert_eq!(limits.clamp_depth(None), 10);
        assert_eq!(limits.clamp_depth(Some(500)), 100);
        assert_eq!(limits.clamp_depth(Some(2)), 2);
    }

    #[test]
    fn test_detached_store_fails_fast() {
        let engine = QueryEngine::new(Arc::new(StoreHandle::detached("/nonexistent/trace.db")));
        let err = engine.list_runs().unwrap_err();
        assert!(matches!(err, QueryError::StoreUnavailable));
    }
}
