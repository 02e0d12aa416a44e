//! Causal chain traversal over parent references

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::event_store::{read_event_row, EVENT_COLUMNS};
use crate::types::{
    EventChain, EventKind, EventRecord, Pagination, QueryMetadata, SequenceQuery, SequenceResult,
};
use crate::utils::elapsed_ms;

use super::filter::{fetch_page, WhereClause};
use super::{QueryEngine, QueryError, QueryResult};

/// Parent ids per `IN (...)` lookup
const PARENT_CHUNK: usize = 500;

/// Children of any of `parents`, optionally within one run
fn children_of(
    conn: &Connection,
    parents: &[String],
    run_id: Option<&str>,
) -> rusqlite::Result<Vec<EventRecord>> {
    let mut children = Vec::new();
    for chunk in parents.chunks(PARENT_CHUNK) {
        let slots: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
        let mut params: Vec<SqlValue> = chunk.iter().cloned().map(SqlValue::Text).collect();
        let mut sql = format!(
            "SELECT {} FROM events WHERE parent_event_id IN ({})",
            EVENT_COLUMNS,
            slots.join(", ")
        );
        if let Some(run_id) = run_id {
            params.push(SqlValue::Text(run_id.to_string()));
            sql.push_str(&format!(" AND run_id = ?{}", params.len()));
        }
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), read_event_row)?;
        for row in rows {
            children.push(row?);
        }
    }
    Ok(children)
}

fn find_event(
    conn: &Connection,
    event_id: &str,
    run_id: Option<&str>,
) -> rusqlite::Result<Option<EventRecord>> {
    let mut clause = WhereClause::new();
    clause
        .push("event_id = ?", SqlValue::Text(event_id.to_string()))
        .run(run_id);
    let sql = format!("SELECT {} FROM events{}", EVENT_COLUMNS, clause.sql());
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params_from_iter(clause.params().iter()), read_event_row)?;
    rows.next().transpose()
}

/// Breadth-first walk from `root`, at most `max_depth` levels down
///
/// The depth cap bounds the walk; an event already in the chain is not
/// expanded a second time.
fn build_chain(
    conn: &Connection,
    root: EventRecord,
    run_id: Option<&str>,
    max_depth: usize,
    pattern: &[EventKind],
) -> rusqlite::Result<EventChain> {
    let mut seen: HashSet<String> = HashSet::from([root.event_id.clone()]);
    let mut frontier = vec![root.event_id.clone()];
    let mut events = Vec::new();
    let mut depth = 0;

    while depth < max_depth && !frontier.is_empty() {
        let children = children_of(conn, &frontier, run_id)?;
        frontier = Vec::with_capacity(children.len());
        for child in children {
            if seen.insert(child.event_id.clone()) {
                frontier.push(child.event_id.clone());
                events.push(child);
            }
        }
        if !frontier.is_empty() {
            depth += 1;
        }
    }

    let truncated = !frontier.is_empty() && !children_of(conn, &frontier, run_id)?.is_empty();

    events.sort_by_key(|e| (e.timestamp, e.sequence_id));

    let kinds: BTreeSet<EventKind> = std::iter::once(root.kind)
        .chain(events.iter().map(|e| e.kind))
        .collect();
    let mut missing_kinds: Vec<EventKind> = Vec::new();
    for kind in pattern {
        if !kinds.contains(kind) && !missing_kinds.contains(kind) {
            missing_kinds.push(*kind);
        }
    }

    Ok(EventChain {
        root,
        events,
        depth,
        kinds: kinds.into_iter().collect(),
        complete: missing_kinds.is_empty(),
        missing_kinds,
        truncated,
    })
}

fn root_clause(query: &SequenceQuery) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.push_raw("parent_event_id IS NULL").run(query.run_id.as_deref());
    if let Some(kind) = query.root_kind {
        clause.kinds(&[kind]);
    }
    clause
}

pub fn query_sequences(engine: &QueryEngine, query: &SequenceQuery) -> QueryResult<SequenceResult> {
    let started = Instant::now();
    let limits = engine.limits();
    let pagination = limits.clamp_pagination(query.pagination)?;
    let max_depth = limits.clamp_depth(query.max_depth);
    let run_id = query.run_id.as_deref();

    let (chains, total) = engine.with_store(|store| {
        if let Some(root_id) = &query.root_event_id {
            let root = store
                .read(|conn| find_event(conn, root_id, run_id))?
                .ok_or_else(|| QueryError::NotFound(format!("event '{}'", root_id)))?;
            let chain = store.read(|conn| build_chain(conn, root, run_id, max_depth, &query.pattern))?;
            let chains = if query.include_incomplete || chain.complete {
                vec![chain]
            } else {
                Vec::new()
            };
            let total = chains.len() as u64;
            return Ok((chains, total));
        }

        let clause = root_clause(query);
        if query.include_incomplete {
            let (roots, total) = store.read(|conn| fetch_page(conn, &clause, pagination))?;
            let chains = store.read(|conn| {
                roots
                    .into_iter()
                    .map(|root| build_chain(conn, root, run_id, max_depth, &query.pattern))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?;
            return Ok((chains, total));
        }

        // Completeness is only known after traversal, so page over complete chains
        let all_roots = store.read(|conn| {
            fetch_page(conn, &clause, Pagination::new(0, i64::MAX as usize)).map(|(roots, _)| roots)
        })?;
        let skip = pagination.offset();
        let mut complete = 0usize;
        let mut chains = Vec::new();
        store.read(|conn| {
            for root in all_roots {
                let chain = build_chain(conn, root, run_id, max_depth, &query.pattern)?;
                if !chain.complete {
                    continue;
                }
                if complete >= skip && chains.len() < pagination.page_size {
                    chains.push(chain);
                }
                complete += 1;
            }
            Ok(())
        })?;
        Ok((chains, complete as u64))
    })?;

    debug!(chains = chains.len(), total, max_depth, "sequence query");
    let metadata = QueryMetadata::sequences(pagination, chains.len(), total, elapsed_ms(started));
    Ok(SequenceResult { chains, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_support::engine_with;
    use crate::types::{NewEvent, Timestamp};
    use serde_json::json;

    fn event(id: &str, ts: i64, kind: EventKind, parent: Option<&str>) -> NewEvent {
        let event = NewEvent::new(id, "run-1", Timestamp::from_micros(ts), kind, json!({"order_id": "o-1"}));
        match parent {
            Some(parent) => event.with_parent(parent),
            None => event,
        }
    }

    fn order_chain() -> Vec<NewEvent> {
        vec![
            event("order", 1, EventKind::StateChange, None),
            event("fill", 2, EventKind::TradeExecution, Some("order")),
            event("pos", 3, EventKind::PositionUpdate, Some("fill")),
            event("risk", 4, EventKind::RiskEvent, Some("pos")),
            event("tick", 5, EventKind::MarketData, None),
        ]
    }

    #[test]
    fn test_depth_limit_and_truncation() {
        let engine = engine_with(order_chain());

        let one = engine
            .query_sequences(&SequenceQuery::from_root("order").with_max_depth(1))
            .unwrap();
        let chain = &one.chains[0];
        assert_eq!(chain.events.len(), 1);
        assert_eq!(chain.depth, 1);
        assert!(chain.truncated);

        let all = engine
            .query_sequences(&SequenceQuery::from_root("order"))
            .unwrap();
        let chain = &all.chains[0];
        let ids: Vec<&str> = chain.events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["fill", "pos", "risk"]);
        assert_eq!(chain.depth, 3);
        assert!(!chain.truncated);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let engine = engine_with(order_chain());
        let err = engine
            .query_sequences(&SequenceQuery::from_root("nope"))
            .unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)));
    }

    #[test]
    fn test_completeness_against_pattern() {
        let engine = engine_with(order_chain());
        let query = SequenceQuery::from_root("order")
            .with_max_depth(1)
            .with_pattern(vec![EventKind::TradeExecution, EventKind::PositionUpdate]);
        let chain = &engine.query_sequences(&query).unwrap().chains[0];
        assert!(!chain.complete);
        assert_eq!(chain.missing_kinds, vec![EventKind::PositionUpdate]);
        assert_eq!(chain.kinds, vec![EventKind::TradeExecution, EventKind::StateChange]);

        let complete_only = engine.query_sequences(&query.clone().complete_only()).unwrap();
        assert!(complete_only.chains.is_empty());
        assert_eq!(complete_only.metadata.total_sequences, Some(0));
    }

    #[test]
    fn test_discovery_pages_over_roots() {
        let engine = engine_with(order_chain());

        let result = engine.query_sequences(&SequenceQuery::discover()).unwrap();
        assert_eq!(result.metadata.total_sequences, Some(2));
        let roots: Vec<&str> = result.chains.iter().map(|c| c.root.event_id.as_str()).collect();
        assert_eq!(roots, vec!["order", "tick"]);

        let by_kind = engine
            .query_sequences(&SequenceQuery::discover().with_root_kind(EventKind::MarketData))
            .unwrap();
        assert_eq!(by_kind.chains.len(), 1);
        assert_eq!(by_kind.chains[0].root.event_id, "tick");

        let complete = engine
            .query_sequences(
                &SequenceQuery::discover()
                    .with_pattern(vec![EventKind::RiskEvent])
                    .complete_only(),
            )
            .unwrap();
        assert_eq!(complete.metadata.total_sequences, Some(1));
        assert_eq!(complete.chains[0].root.event_id, "order");
    }

    #[test]
    fn test_cycle_terminates() {
        let engine = engine_with(vec![
            event("a", 1, EventKind::StateChange, Some("b")),
            event("b", 2, EventKind::StateChange, Some("a")),
        ]);
        let result = engine
            .query_sequences(&SequenceQuery::from_root("a").with_max_depth(50))
            .unwrap();
        let chain = &result.chains[0];
        assert_eq!(chain.events.len(), 1);
        assert!(chain.depth <= 50);
    }
}
