//! Derived point-in-time state views
//!
//! None of these are persisted; they are rebuilt from the event log on demand.

use serde::{Deserialize, Serialize};

use super::{QueryMetadata, Timestamp};

/// Position in one security as of a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub symbol: String,
    #[serde(rename = "positionId", skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    pub quantity: f64,
    #[serde(rename = "averagePrice")]
    pub average_price: f64,
    #[serde(rename = "realizedPnl")]
    pub realized_pnl: f64,
    #[serde(rename = "unrealizedPnl")]
    pub unrealized_pnl: f64,
    #[serde(rename = "lastUpdated", skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

/// Latest value of one indicator for one security
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    #[serde(rename = "indicatorName")]
    pub indicator_name: String,
    /// Empty when the indicator is not security-specific
    pub symbol: String,
    pub value: f64,
    pub timestamp: Timestamp,
}

/// An order with no terminal-resolution event yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Last reported state, or the kind of the last event when no state given
    #[serde(rename = "lastStatus")]
    pub last_status: String,
    #[serde(rename = "lastEventId")]
    pub last_event_id: String,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Timestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub realized: f64,
    pub unrealized: f64,
    pub total: f64,
}

/// Request for a state reconstruction
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRequest {
    pub run_id: Option<String>,
    pub timestamp: Timestamp,
    pub symbol: Option<String>,
    pub include_indicators: bool,
    pub include_active_orders: bool,
}

impl SnapshotRequest {
    pub fn at(timestamp: Timestamp) -> Self {
        Self {
            run_id: None,
            timestamp,
            symbol: None,
            include_indicators: true,
            include_active_orders: true,
        }
    }

    pub fn for_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn in_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Sorted by symbol
    pub positions: Vec<PositionState>,
    /// Sorted by (indicator, symbol); absent when not requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<Vec<IndicatorValue>>,
    /// Sorted by order id; absent when not requested
    #[serde(rename = "activeOrders", skip_serializing_if = "Option::is_none")]
    pub active_orders: Option<Vec<ActiveOrder>>,
    pub pnl: PnlSummary,
    #[serde(rename = "eventsScanned")]
    pub events_scanned: u64,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionDelta {
    pub symbol: String,
    #[serde(rename = "quantityChange")]
    pub quantity_change: f64,
    #[serde(rename = "averagePriceChange")]
    pub average_price_change: f64,
    #[serde(rename = "realizedPnlChange")]
    pub realized_pnl_change: f64,
    #[serde(rename = "unrealizedPnlChange")]
    pub unrealized_pnl_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDelta {
    #[serde(rename = "indicatorName")]
    pub indicator_name: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<f64>,
    /// Present only when the indicator has a value at both ends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderChanges {
    /// Active at the later timestamp but not the earlier one
    pub opened: Vec<String>,
    /// Active at the earlier timestamp but not the later one
    pub resolved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub from: Timestamp,
    pub to: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub positions: Vec<PositionDelta>,
    pub indicators: Vec<IndicatorDelta>,
    pub orders: OrderChanges,
    #[serde(rename = "realizedPnlChange")]
    pub realized_pnl_change: f64,
    #[serde(rename = "unrealizedPnlChange")]
    pub unrealized_pnl_change: f64,
    #[serde(rename = "totalPnlChange")]
    pub total_pnl_change: f64,
    pub metadata: QueryMetadata,
}
