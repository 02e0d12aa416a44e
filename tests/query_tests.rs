//! Query engine tests against stores built through the recorder

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use trace_query::event_store::StoreHandle;
use trace_query::ingest::{EventRecorder, PipelineConfig};
use trace_query::query::{QueryEngine, QueryError};
use trace_query::types::{
    AggregateFunction, AggregateRequest, EntityFilter, EntityType, EventFilter, EventKind,
    NewEvent, Pagination, Run, SequenceQuery, SnapshotRequest, TimeRange, Timestamp,
};

const BASE_US: i64 = 1_709_285_400_000_000;

fn ts(ms: i64) -> Timestamp {
    Timestamp::from_micros(BASE_US + ms * 1_000)
}

fn run(run_id: &str) -> Run {
    Run::new(run_id, ts(0), ts(60_000), Run::hash_config(&json!({"strategy": "test"})))
}

fn engine_for(path: &Path) -> QueryEngine {
    let handle = StoreHandle::detached(path);
    assert!(handle.attach().unwrap());
    QueryEngine::new(Arc::new(handle))
}

/// Ten orders across two securities; each gets a placement, a fill, and
/// (for the even ones) a position update caused by the fill.
fn record_ten_trades(path: &Path) {
    let recorder = EventRecorder::begin_run(path, &run("run-a"), PipelineConfig::default()).unwrap();
    for i in 0..10i64 {
        let symbol = if i % 2 == 0 { "AAPL" } else { "MSFT" };
        let order_id = format!("ord-{i}");
        let base = i * 1_000;

        recorder.write_event(NewEvent::new(
            format!("place-{i}"),
            "run-a",
            ts(base),
            EventKind::StateChange,
            json!({"order_id": order_id, "symbol": symbol, "component": "order",
                   "from_state": "new", "to_state": "submitted"}),
        ));
        recorder.write_event(
            NewEvent::new(
                format!("fill-{i}"),
                "run-a",
                ts(base + 100),
                EventKind::TradeExecution,
                json!({"order_id": order_id, "symbol": symbol, "side": "buy",
                       "quantity": 10, "price": 100.0 + i as f64, "status": "filled"}),
            )
            .with_parent(format!("place-{i}")),
        );
        if i % 2 == 0 {
            recorder.write_event(
                NewEvent::new(
                    format!("pos-{i}"),
                    "run-a",
                    ts(base + 200),
                    EventKind::PositionUpdate,
                    json!({"symbol": symbol, "quantity": 10 * (i / 2 + 1),
                           "average_price": 100.0, "realized_pnl": 0.0,
                           "unrealized_pnl": i as f64}),
                )
                .with_parent(format!("fill-{i}")),
            );
        }
    }
    let stats = recorder.finish();
    assert_eq!(stats.written, 25);
    assert_eq!(stats.pending, 0);
}

#[test]
fn test_chain_depth_limits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    record_ten_trades(&path);
    let engine = engine_for(&path);

    let shallow = engine
        .query_sequences(&SequenceQuery::from_root("place-4").with_max_depth(1))
        .unwrap();
    assert_eq!(shallow.chains.len(), 1);
    let chain = &shallow.chains[0];
    assert_eq!(chain.events.len(), 1);
    assert_eq!(chain.events[0].event_id, "fill-4");
    assert!(chain.truncated);

    let deeper = engine
        .query_sequences(&SequenceQuery::from_root("place-4").with_max_depth(2))
        .unwrap();
    let chain = &deeper.chains[0];
    let ids: Vec<&str> = chain.events.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["fill-4", "pos-4"]);
    assert_eq!(chain.depth, 2);
    assert!(!chain.truncated);
}

#[test]
fn test_pattern_completeness_across_discovered_roots() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    record_ten_trades(&path);
    let engine = engine_for(&path);

    let pattern = vec![EventKind::TradeExecution, EventKind::PositionUpdate];
    let all = engine
        .query_sequences(&SequenceQuery::discover().with_pattern(pattern.clone()))
        .unwrap();
    assert_eq!(all.metadata.total_sequences, Some(10));
    assert_eq!(all.chains.iter().filter(|c| c.complete).count(), 5);

    let complete = engine
        .query_sequences(
            &SequenceQuery::discover()
                .with_pattern(pattern)
                .complete_only()
                .with_pagination(Pagination::new(0, 2)),
        )
        .unwrap();
    assert_eq!(complete.chains.len(), 2);
    assert_eq!(complete.metadata.total_sequences, Some(5));
    assert!(complete.metadata.has_more);
    assert!(complete.chains.iter().all(|c| c.missing_kinds.is_empty()));
}

#[test]
fn test_filtered_scan_orders_and_pages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    record_ten_trades(&path);
    let engine = engine_for(&path);

    let filter = EventFilter::for_run("run-a").with_kind(EventKind::TradeExecution);
    let first = engine.query_events(&filter, Pagination::new(0, 4)).unwrap();
    assert_eq!(first.metadata.total_count, Some(10));
    assert_eq!(first.events.len(), 4);
    assert!(first.metadata.has_more);
    assert!(first
        .events
        .windows(2)
        .all(|w| (w[0].timestamp, w[0].sequence_id) < (w[1].timestamp, w[1].sequence_id)));

    let last = engine.query_events(&filter, Pagination::new(2, 4)).unwrap();
    assert_eq!(last.events.len(), 2);
    assert!(!last.metadata.has_more);

    let windowed = engine
        .query_events(
            &EventFilter::for_run("run-a")
                .with_time_range(TimeRange::new(Some(ts(1_000)), Some(ts(1_999)))),
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(windowed.events.len(), 2);

    let err = engine
        .query_events(
            &EventFilter::default().with_time_range(TimeRange::new(Some(ts(10)), Some(ts(1)))),
            Pagination::default(),
        )
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidFilter(_)));
}

#[test]
fn test_entity_scan_and_aggregate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    record_ten_trades(&path);
    let engine = engine_for(&path);

    let order = engine
        .query_by_entity(&EntityFilter::new(EntityType::Order, "ord-3"), Pagination::default())
        .unwrap();
    let ids: Vec<&str> = order.events.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["place-3", "fill-3"]);

    let msft_fills = engine
        .query_by_entity(
            &EntityFilter::new(EntityType::Symbol, "MSFT")
                .with_kinds(vec![EventKind::TradeExecution]),
            Pagination::default(),
        )
        .unwrap();
    assert_eq!(msft_fills.metadata.total_count, Some(5));

    let prices = engine
        .aggregate(
            &AggregateRequest::new(EventKind::TradeExecution, "price")
                .in_run("run-a")
                .with_functions(vec![
                    AggregateFunction::Count,
                    AggregateFunction::Min,
                    AggregateFunction::Max,
                    AggregateFunction::Avg,
                ]),
        )
        .unwrap();
    assert_eq!(prices.count, Some(10));
    assert_eq!(prices.min, Some(100.0));
    assert_eq!(prices.max, Some(109.0));
    assert_eq!(prices.avg, Some(104.5));
}

#[test]
fn test_snapshot_tracks_positions_and_orders() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    record_ten_trades(&path);
    let engine = engine_for(&path);

    // Order 9 is placed at 9000ms and filled at 9100ms
    let before_fill = engine.state_snapshot(&SnapshotRequest::at(ts(9_050))).unwrap();
    let active: Vec<&str> = before_fill
        .active_orders
        .as_ref()
        .unwrap()
        .iter()
        .map(|o| o.order_id.as_str())
        .collect();
    assert_eq!(active, vec!["ord-9"]);

    let end = engine.state_snapshot(&SnapshotRequest::at(ts(60_000))).unwrap();
    assert!(end.active_orders.as_ref().unwrap().is_empty());
    let aapl = end.positions.iter().find(|p| p.symbol == "AAPL").unwrap();
    assert_eq!(aapl.quantity, 50.0);
    assert_eq!(aapl.unrealized_pnl, 8.0);

    let delta = engine.state_delta(Some("run-a"), ts(0), ts(60_000), Some("AAPL")).unwrap();
    assert_eq!(delta.positions.len(), 1);
    assert_eq!(delta.positions[0].quantity_change, 50.0);
    assert_eq!(delta.total_pnl_change, delta.realized_pnl_change + delta.unrealized_pnl_change);
}

#[test]
fn test_second_run_sees_no_events_from_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trace.db");
    record_ten_trades(&path);

    let recorder = EventRecorder::begin_run(&path, &run("run-b"), PipelineConfig::default()).unwrap();
    recorder.write_event(NewEvent::new(
        "b-1",
        "run-b",
        ts(5),
        EventKind::MarketData,
        json!({"symbol": "AAPL", "price": 101.0}),
    ));
    recorder.finish();

    let engine = engine_for(&path);
    let old = engine
        .query_events(&EventFilter::for_run("run-a"), Pagination::default())
        .unwrap();
    assert!(old.events.is_empty());

    let new = engine
        .query_events(&EventFilter::for_run("run-b"), Pagination::default())
        .unwrap();
    assert_eq!(new.events.len(), 1);

    let runs = engine.list_runs().unwrap();
    let ids: Vec<&str> = runs.runs.iter().map(|r| r.run.run_id.as_str()).collect();
    assert_eq!(ids, vec!["run-b"]);
    assert_eq!(runs.runs[0].event_count, 1);
}
