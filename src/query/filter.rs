//! Filtered and entity-reference scans

use std::time::Instant;

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;

use crate::event_store::{read_event_row, EVENT_COLUMNS};
use crate::types::{
    EntityFilter, EventFilter, EventKind, EventPage, EventRecord, Pagination, QueryMetadata,
    TimeRange,
};
use crate::utils::elapsed_ms;

use super::{QueryEngine, QueryError, QueryResult};

/// Accumulates `AND`-joined predicates with positional parameters
#[derive(Debug, Default)]
pub(super) struct WhereClause {
    predicates: Vec<String>,
    params: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: &str, value: SqlValue) -> &mut Self {
        self.params.push(value);
        self.predicates
            .push(predicate.replace('?', &format!("?{}", self.params.len())));
        self
    }

    /// Predicate with no parameters
    pub fn push_raw(&mut self, predicate: &str) -> &mut Self {
        self.predicates.push(predicate.to_string());
        self
    }

    pub fn run(&mut self, run_id: Option<&str>) -> &mut Self {
        if let Some(run_id) = run_id {
            self.push("run_id = ?", SqlValue::Text(run_id.to_string()));
        }
        self
    }

    pub fn kinds(&mut self, kinds: &[EventKind]) -> &mut Self {
        match kinds {
            [] => {}
            [kind] => {
                self.push("kind = ?", SqlValue::Text(kind.as_str().to_string()));
            }
            many => {
                let start = self.params.len();
                let slots: Vec<String> = (1..=many.len())
                    .map(|i| format!("?{}", start + i))
                    .collect();
                self.params
                    .extend(many.iter().map(|k| SqlValue::Text(k.as_str().to_string())));
                self.predicates
                    .push(format!("kind IN ({})", slots.join(", ")));
            }
        }
        self
    }

    pub fn time_range(&mut self, range: &TimeRange) -> &mut Self {
        if let Some(start) = range.start {
            self.push("ts_us >= ?", SqlValue::Integer(start.as_micros()));
        }
        if let Some(end) = range.end {
            self.push("ts_us <= ?", SqlValue::Integer(end.as_micros()));
        }
        self
    }

    /// Payload field at a JSON path, compared as text so numeric ids match too
    pub fn payload_equals(&mut self, path: &str, value: &str) -> &mut Self {
        let idx = self.next_index();
        self.params.push(SqlValue::Text(path.to_string()));
        self.params.push(SqlValue::Text(value.to_string()));
        self.predicates.push(format!(
            "CAST(json_extract(payload, ?{}) AS TEXT) = ?{}",
            idx,
            idx + 1
        ));
        self
    }

    /// ` WHERE ...`, or empty when there are no predicates
    pub fn sql(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn next_index(&self) -> usize {
        self.params.len() + 1
    }
}

pub(super) fn validate_time_range(range: &TimeRange) -> QueryResult<()> {
    if range.is_valid() {
        Ok(())
    } else {
        Err(QueryError::InvalidFilter(
            "startTime must not be after endTime".to_string(),
        ))
    }
}

/// Count matching rows, then read one page ordered by (timestamp, sequence id)
pub(super) fn fetch_page(
    conn: &Connection,
    clause: &WhereClause,
    pagination: Pagination,
) -> rusqlite::Result<(Vec<EventRecord>, u64)> {
    let where_sql = clause.sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM events{}", where_sql),
        params_from_iter(clause.params().iter()),
        |row| row.get(0),
    )?;

    let limit_idx = clause.next_index();
    let sql = format!(
        "SELECT {} FROM events{} ORDER BY ts_us ASC, seq ASC LIMIT ?{} OFFSET ?{}",
        EVENT_COLUMNS,
        where_sql,
        limit_idx,
        limit_idx + 1
    );
    let mut params: Vec<SqlValue> = clause.params().to_vec();
    params.push(SqlValue::Integer(pagination.page_size as i64));
    params.push(SqlValue::Integer(pagination.checked_offset().unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), read_event_row)?;
    let events = rows.collect::<Result<Vec<_>, _>>()?;
    Ok((events, total as u64))
}

pub fn query_events(
    engine: &QueryEngine,
    filter: &EventFilter,
    pagination: Pagination,
) -> QueryResult<EventPage> {
    let started = Instant::now();
    validate_time_range(&filter.time_range)?;
    let pagination = engine.limits().clamp_pagination(pagination)?;

    let mut clause = WhereClause::new();
    clause
        .run(filter.run_id.as_deref())
        .kinds(&filter.kinds)
        .time_range(&filter.time_range);
    if let Some(severity) = filter.severity {
        clause.push("severity = ?", SqlValue::Text(severity.as_str().to_string()));
    }
    if let Some(category) = filter.category {
        clause.push("category = ?", SqlValue::Text(category.as_str().to_string()));
    }

    let (events, total) = engine.with_store(|store| {
        Ok(store.read(|conn| fetch_page(conn, &clause, pagination))?)
    })?;
    let metadata = QueryMetadata::paged(pagination, events.len(), total, elapsed_ms(started));
    Ok(EventPage { events, metadata })
}

pub fn query_by_entity(
    engine: &QueryEngine,
    filter: &EntityFilter,
    pagination: Pagination,
) -> QueryResult<EventPage> {
    let started = Instant::now();
    if filter.value.trim().is_empty() {
        return Err(QueryError::InvalidFilter(
            "entityValue must not be empty".to_string(),
        ));
    }
    let pagination = engine.limits().clamp_pagination(pagination)?;

    let mut clause = WhereClause::new();
    clause.run(filter.run_id.as_deref()).kinds(&filter.kinds);
    clause.payload_equals(filter.entity_type.payload_path(), filter.value.trim());

    let (events, total) = engine.with_store(|store| {
        Ok(store.read(|conn| fetch_page(conn, &clause, pagination))?)
    })?;
    let metadata = QueryMetadata::paged(pagination, events.len(), total, elapsed_ms(started));
    Ok(EventPage { events, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_support::engine_with;
    use crate::types::{EntityType, NewEvent, Severity, Timestamp};
    use serde_json::json;

    fn fixture() -> Vec<NewEvent> {
        vec![
            NewEvent::new("m1", "run-1", Timestamp::from_micros(30), EventKind::MarketData, json!({"symbol": "AAPL", "price": 187.0})),
            NewEvent::new("t1", "run-1", Timestamp::from_micros(10), EventKind::TradeExecution, json!({"order_id": "o-1", "symbol": "AAPL", "quantity": 5, "price": 187.1})),
            NewEvent::new("t2", "run-1", Timestamp::from_micros(10), EventKind::TradeExecution, json!({"order_id": 42, "symbol": "MSFT", "quantity": 3, "price": 402.0}))
                .with_severity(Severity::Warning),
            NewEvent::new("x1", "run-2", Timestamp::from_micros(5), EventKind::MarketData, json!({"symbol": "AAPL", "price": 10.0})),
        ]
    }

    #[test]
    fn test_where_clause_numbering() {
        let mut clause = WhereClause::new();
        clause
            .run(Some("r"))
            .kinds(&[EventKind::MarketData, EventKind::RiskEvent])
            .time_range(&TimeRange::new(Some(Timestamp::from_micros(1)), None));
        assert_eq!(
            clause.sql(),
            " WHERE run_id = ?1 AND kind IN (?2, ?3) AND ts_us >= ?4"
        );
        assert_eq!(clause.next_index(), 5);
    }

    #[test]
    fn test_orders_by_timestamp_then_sequence() {
        let engine = engine_with(fixture());
        let page = engine
            .query_events(&EventFilter::for_run("run-1"), Pagination::default())
            .unwrap();
        let ids: Vec<&str> = page.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "m1"]);
        assert_eq!(page.metadata.total_count, Some(3));
        assert!(!page.metadata.has_more);
    }

    #[test]
    fn test_kind_and_severity_filters() {
        let engine = engine_with(fixture());
        let filter = EventFilter::default()
            .with_kind(EventKind::TradeExecution)
            .with_severity(Severity::Warning);
        let page = engine.query_events(&filter, Pagination::default()).unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].event_id, "t2");
    }

    #[test]
    fn test_inverted_time_range_is_rejected() {
        let engine = engine_with(fixture());
        let filter = EventFilter::default().with_time_range(TimeRange::new(
            Some(Timestamp::from_micros(20)),
            Some(Timestamp::from_micros(10)),
        ));
        let err = engine.query_events(&filter, Pagination::default()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }

    #[test]
    fn test_out_of_range_pages_are_rejected() {
        let engine = engine_with(fixture());
        let err = engine
            .query_events(&EventFilter::default(), Pagination::new(1 << 63, 1))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));

        let err = engine
            .query_by_entity(
                &EntityFilter::new(EntityType::Order, "o-1"),
                Pagination::new(usize::MAX, 1000),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }

    #[test]
    fn test_far_page_is_empty() {
        let engine = engine_with(fixture());
        let page = engine
            .query_events(&EventFilter::default(), Pagination::new(1 << 40, 1000))
            .unwrap();
        assert!(page.events.is_empty());
        assert!(!page.metadata.has_more);
    }

    #[test]
    fn test_pagination_reports_has_more() {
        let engine = engine_with(fixture());
        let page = engine
            .query_events(&EventFilter::default(), Pagination::new(0, 3))
            .unwrap();
        assert_eq!(page.events.len(), 3);
        assert_eq!(page.metadata.total_count, Some(4));
        assert!(page.metadata.has_more);

        let rest = engine
            .query_events(&EventFilter::default(), Pagination::new(1, 3))
            .unwrap();
        assert_eq!(rest.events.len(), 1);
        assert!(!rest.metadata.has_more);
    }

    #[test]
    fn test_entity_matches_text_and_numeric_keys() {
        let engine = engine_with(fixture());
        let by_symbol = engine
            .query_by_entity(
                &EntityFilter::new(EntityType::Symbol, "AAPL").in_run("run-1"),
                Pagination::default(),
            )
            .unwrap();
        let ids: Vec<&str> = by_symbol.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "m1"]);

        let by_order = engine
            .query_by_entity(&EntityFilter::new(EntityType::Order, "42"), Pagination::default())
            .unwrap();
        assert_eq!(by_order.events.len(), 1);
        assert_eq!(by_order.events[0].event_id, "t2");
    }

    #[test]
    fn test_entity_kind_filter_and_empty_value() {
        let engine = engine_with(fixture());
        let page = engine
            .query_by_entity(
                &EntityFilter::new(EntityType::Symbol, "AAPL").with_kinds(vec![EventKind::MarketData]),
                Pagination::default(),
            )
            .unwrap();
        assert_eq!(page.events.len(), 2);

        let err = engine
            .query_by_entity(&EntityFilter::new(EntityType::Symbol, " "), Pagination::default())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }
}
