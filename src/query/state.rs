//! Point-in-time state reconstruction and deltas

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use crate::event_store::{read_event_row, EVENT_COLUMNS};
use crate::types::{
    ActiveOrder, EventKind, EventPayload, EventRecord, IndicatorDelta, IndicatorValue,
    OrderChanges, PnlSummary, PositionDelta, PositionState, QueryMetadata, SnapshotRequest,
    StateDelta, StateSnapshot, TimeRange, Timestamp,
};
use crate::utils::elapsed_ms;

use super::filter::WhereClause;
use super::{QueryEngine, QueryResult};

/// Kinds that contribute to reconstructed state
const STATE_KINDS: [EventKind; 5] = [
    EventKind::PositionUpdate,
    EventKind::IndicatorCalculation,
    EventKind::TradeExecution,
    EventKind::OrderRejection,
    EventKind::StateChange,
];

#[derive(Debug, Default)]
struct OrderTrack {
    symbol: Option<String>,
    active: Option<ActiveOrder>,
    resolved: bool,
}

/// State folded from the event log in (timestamp, sequence id) order
#[derive(Debug, Default)]
struct StateBuilder {
    positions: BTreeMap<String, PositionState>,
    indicators: BTreeMap<(String, String), IndicatorValue>,
    orders: BTreeMap<String, OrderTrack>,
    scanned: u64,
}

impl StateBuilder {
    fn apply(&mut self, event: &EventRecord) {
        self.scanned += 1;
        let payload = EventPayload::decode(event.kind, &event.payload);

        match &payload {
            EventPayload::PositionUpdate(update) => {
                let key = match update.symbol.as_ref().or(update.position_id.as_ref()) {
                    Some(key) => key.clone(),
                    None => return,
                };
                let position = self
                    .positions
                    .entry(key.clone())
                    .or_insert_with(|| PositionState {
                        symbol: key,
                        ..Default::default()
                    });
                if update.position_id.is_some() {
                    position.position_id = update.position_id.clone();
                }
                if let Some(quantity) = update.quantity {
                    position.quantity = quantity;
                }
                if let Some(price) = update.average_price {
                    position.average_price = price;
                }
                if let Some(pnl) = update.realized_pnl {
                    position.realized_pnl = pnl;
                }
                if let Some(pnl) = update.unrealized_pnl {
                    position.unrealized_pnl = pnl;
                }
                position.last_updated = Some(event.timestamp);
            }
            EventPayload::IndicatorCalculation(indicator) => {
                if let (Some(name), Some(value)) = (&indicator.indicator_name, indicator.value) {
                    let symbol = indicator.symbol.clone().unwrap_or_default();
                    self.indicators.insert(
                        (name.clone(), symbol.clone()),
                        IndicatorValue {
                            indicator_name: name.clone(),
                            symbol,
                            value,
                            timestamp: event.timestamp,
                        },
                    );
                }
            }
            _ => {}
        }

        if let Some(order_id) = payload.order_id() {
            self.apply_order(order_id, &payload, event);
        }
    }

    fn apply_order(&mut self, order_id: &str, payload: &EventPayload, event: &EventRecord) {
        let track = self.orders.entry(order_id.to_string()).or_default();
        if let Some(symbol) = payload.symbol() {
            track.symbol = Some(symbol.to_string());
        }
        if track.resolved {
            return;
        }
        if payload.resolves_order() {
            track.resolved = true;
            track.active = None;
            return;
        }

        let status = match payload {
            EventPayload::StateChange(change) => change.to_state.clone(),
            EventPayload::TradeExecution(fill) => fill.status.clone(),
            _ => None,
        }
        .unwrap_or_else(|| event.kind.to_string());

        track.active = Some(ActiveOrder {
            order_id: order_id.to_string(),
            symbol: track.symbol.clone(),
            last_status: status,
            last_event_id: event.event_id.clone(),
            last_updated: event.timestamp,
        });
    }

    fn finish(self, request: &SnapshotRequest, started: Instant) -> StateSnapshot {
        let symbol = request.symbol.as_deref();
        let matches = |s: &str| symbol.map_or(true, |want| want == s);

        let positions: Vec<PositionState> = self
            .positions
            .into_values()
            .filter(|p| matches(&p.symbol))
            .collect();

        let indicators: Vec<IndicatorValue> = self
            .indicators
            .into_values()
            .filter(|i| matches(&i.symbol))
            .collect();

        let active_orders: Vec<ActiveOrder> = self
            .orders
            .into_values()
            .filter_map(|track| {
                let mut order = track.active?;
                order.symbol = track.symbol;
                Some(order)
            })
            .filter(|o| symbol.is_none() || o.symbol.as_deref() == symbol)
            .collect();

        let realized: f64 = positions.iter().map(|p| p.realized_pnl).sum();
        let unrealized: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();

        let indicators = request.include_indicators.then_some(indicators);
        let active_orders = request.include_active_orders.then_some(active_orders);
        let returned = positions.len()
            + indicators.as_ref().map_or(0, Vec::len)
            + active_orders.as_ref().map_or(0, Vec::len);

        StateSnapshot {
            timestamp: request.timestamp,
            symbol: request.symbol.clone(),
            positions,
            indicators,
            active_orders,
            pnl: PnlSummary {
                realized,
                unrealized,
                total: realized + unrealized,
            },
            events_scanned: self.scanned,
            metadata: QueryMetadata::single(returned, elapsed_ms(started)),
        }
    }
}

pub fn state_snapshot(engine: &QueryEngine, request: &SnapshotRequest) -> QueryResult<StateSnapshot> {
    let started = Instant::now();

    let mut clause = WhereClause::new();
    clause
        .run(request.run_id.as_deref())
        .kinds(&STATE_KINDS)
        .time_range(&TimeRange::new(None, Some(request.timestamp)));
    let sql = format!(
        "SELECT {} FROM events{} ORDER BY ts_us ASC, seq ASC",
        EVENT_COLUMNS,
        clause.sql()
    );

    let builder = engine.with_store(|store| {
        Ok(store.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(clause.params().iter()), read_event_row)?;
            let mut builder = StateBuilder::default();
            for row in rows {
                builder.apply(&row?);
            }
            Ok(builder)
        })?)
    })?;

    Ok(builder.finish(request, started))
}

fn diff_positions(from: &[PositionState], to: &[PositionState]) -> Vec<PositionDelta> {
    let before: BTreeMap<&str, &PositionState> = from.iter().map(|p| (p.symbol.as_str(), p)).collect();
    let after: BTreeMap<&str, &PositionState> = to.iter().map(|p| (p.symbol.as_str(), p)).collect();
    let symbols: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();
    let zero = PositionState::default();

    symbols
        .into_iter()
        .map(|symbol| {
            let a = before.get(symbol).copied().unwrap_or(&zero);
            let b = after.get(symbol).copied().unwrap_or(&zero);
            PositionDelta {
                symbol: symbol.to_string(),
                quantity_change: b.quantity - a.quantity,
                average_price_change: b.average_price - a.average_price,
                realized_pnl_change: b.realized_pnl - a.realized_pnl,
                unrealized_pnl_change: b.unrealized_pnl - a.unrealized_pnl,
            }
        })
        .collect()
}

fn diff_indicators(from: &[IndicatorValue], to: &[IndicatorValue]) -> Vec<IndicatorDelta> {
    let key = |i: &IndicatorValue| (i.indicator_name.clone(), i.symbol.clone());
    let before: BTreeMap<(String, String), f64> = from.iter().map(|i| (key(i), i.value)).collect();
    let after: BTreeMap<(String, String), f64> = to.iter().map(|i| (key(i), i.value)).collect();
    let keys: BTreeSet<&(String, String)> = before.keys().chain(after.keys()).collect();

    keys.into_iter()
        .map(|k| {
            let from = before.get(k).copied();
            let to = after.get(k).copied();
            IndicatorDelta {
                indicator_name: k.0.clone(),
                symbol: k.1.clone(),
                from,
                to,
                change: from.zip(to).map(|(a, b)| b - a),
            }
        })
        .collect()
}

fn diff_orders(from: &[ActiveOrder], to: &[ActiveOrder]) -> OrderChanges {
    let before: BTreeSet<&str> = from.iter().map(|o| o.order_id.as_str()).collect();
    let after: BTreeSet<&str> = to.iter().map(|o| o.order_id.as_str()).collect();
    OrderChanges {
        opened: after.difference(&before).map(|s| s.to_string()).collect(),
        resolved: before.difference(&after).map(|s| s.to_string()).collect(),
    }
}

pub fn state_delta(
    engine: &QueryEngine,
    run_id: Option<&str>,
    from: Timestamp,
    to: Timestamp,
    symbol: Option<&str>,
) -> QueryResult<StateDelta> {
    let started = Instant::now();

    let request = |at: Timestamp| {
        let mut request = SnapshotRequest::at(at);
        request.run_id = run_id.map(str::to_string);
        request.symbol = symbol.map(str::to_string);
        request
    };
    let before = state_snapshot(engine, &request(from))?;
    let after = state_snapshot(engine, &request(to))?;

    let positions = diff_positions(&before.positions, &after.positions);
    let indicators = diff_indicators(
        before.indicators.as_deref().unwrap_or_default(),
        after.indicators.as_deref().unwrap_or_default(),
    );
    let orders = diff_orders(
        before.active_orders.as_deref().unwrap_or_default(),
        after.active_orders.as_deref().unwrap_or_default(),
    );

    let realized_pnl_change = after.pnl.realized - before.pnl.realized;
    let unrealized_pnl_change = after.pnl.unrealized - before.pnl.unrealized;
    let returned = positions.len() + indicators.len() + orders.opened.len() + orders.resolved.len();

    Ok(StateDelta {
        from,
        to,
        symbol: symbol.map(str::to_string),
        positions,
        indicators,
        orders,
        realized_pnl_change,
        unrealized_pnl_change,
        total_pnl_change: realized_pnl_change + unrealized_pnl_change,
        metadata: QueryMetadata::single(returned, elapsed_ms(started)),
    })
}
