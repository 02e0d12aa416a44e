//! Kind-tagged payload union
//!
//! On disk a payload is an open JSON document so new fields and kinds never
//! need a migration. At the API boundary each kind gets a typed view; every
//! field is optional because producers are free to omit what they don't know.
//! Fields are read one at a time: a value of the wrong shape reads as absent
//! and never costs the rest of the payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EventKind;

/// Per-field readers that accept the shapes producers actually send
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Strings as-is; numeric and boolean ids in their JSON spelling
    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Numbers, or strings that parse as a finite number
    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let parsed = match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(parsed.filter(|v| v.is_finite()))
    }
}

/// `to_state` values that end an order's life
pub const TERMINAL_ORDER_STATES: &[&str] = &["filled", "cancelled", "canceled", "rejected", "expired"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeExecutionPayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub side: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub commission: Option<f64>,
    /// Quantity still open on the order after this fill
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub remaining_quantity: Option<f64>,
    /// `filled` or `partially_filled`
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub status: Option<String>,
}

impl TradeExecutionPayload {
    /// A fill completes its order unless it says otherwise
    pub fn completes_order(&self) -> bool {
        if let Some(status) = &self.status {
            return status.eq_ignore_ascii_case("filled");
        }
        match self.remaining_quantity {
            Some(remaining) => remaining.abs() < f64::EPSILON,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRejectionPayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorPayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub indicator_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionUpdatePayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub position_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub average_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub realized_pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub unrealized_pnl: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateChangePayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub from_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub to_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub reason: Option<String>,
}

impl StateChangePayload {
    /// Only a resolved state counts; `closing` and friends are intents
    pub fn resolves_order(&self) -> bool {
        self.to_state.as_deref().is_some_and(|state| {
            TERMINAL_ORDER_STATES
                .iter()
                .any(|t| t.eq_ignore_ascii_case(state))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataPayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub ask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEventPayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub limit: Option<f64>,
}

/// Typed payload, tagged by the event's kind
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    TradeExecution(TradeExecutionPayload),
    OrderRejection(OrderRejectionPayload),
    IndicatorCalculation(IndicatorPayload),
    PositionUpdate(PositionUpdatePayload),
    StateChange(StateChangePayload),
    MarketData(MarketDataPayload),
    RiskEvent(RiskEventPayload),
}

impl EventPayload {
    /// Typed view of the stored document for `kind`
    ///
    /// A document that is not an object decodes to an all-empty view.
    pub fn decode(kind: EventKind, value: &Value) -> Self {
        match kind {
            EventKind::TradeExecution => Self::TradeExecution(view(value)),
            EventKind::OrderRejection => Self::OrderRejection(view(value)),
            EventKind::IndicatorCalculation => Self::IndicatorCalculation(view(value)),
            EventKind::PositionUpdate => Self::PositionUpdate(view(value)),
            EventKind::StateChange => Self::StateChange(view(value)),
            EventKind::MarketData => Self::MarketData(view(value)),
            EventKind::RiskEvent => Self::RiskEvent(view(value)),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::TradeExecution(_) => EventKind::TradeExecution,
            Self::OrderRejection(_) => EventKind::OrderRejection,
            Self::IndicatorCalculation(_) => EventKind::IndicatorCalculation,
            Self::PositionUpdate(_) => EventKind::PositionUpdate,
            Self::StateChange(_) => EventKind::StateChange,
            Self::MarketData(_) => EventKind::MarketData,
            Self::RiskEvent(_) => EventKind::RiskEvent,
        }
    }

    /// Encode back to the open JSON document
    pub fn to_value(&self) -> Value {
        let encoded = match self {
            Self::TradeExecution(p) => serde_json::to_value(p),
            Self::OrderRejection(p) => serde_json::to_value(p),
            Self::IndicatorCalculation(p) => serde_json::to_value(p),
            Self::PositionUpdate(p) => serde_json::to_value(p),
            Self::StateChange(p) => serde_json::to_value(p),
            Self::MarketData(p) => serde_json::to_value(p),
            Self::RiskEvent(p) => serde_json::to_value(p),
        };
        encoded.unwrap_or(Value::Null)
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::TradeExecution(p) => p.symbol.as_deref(),
            Self::OrderRejection(p) => p.symbol.as_deref(),
            Self::IndicatorCalculation(p) => p.symbol.as_deref(),
            Self::PositionUpdate(p) => p.symbol.as_deref(),
            Self::StateChange(p) => p.symbol.as_deref(),
            Self::MarketData(p) => p.symbol.as_deref(),
            Self::RiskEvent(p) => p.symbol.as_deref(),
        }
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::TradeExecution(p) => p.order_id.as_deref(),
            Self::OrderRejection(p) => p.order_id.as_deref(),
            Self::StateChange(p) => p.order_id.as_deref(),
            _ => None,
        }
    }

    /// Whether this event terminally resolves the order it refers to
    pub fn resolves_order(&self) -> bool {
        match self {
            Self::TradeExecution(p) => p.completes_order(),
            Self::OrderRejection(_) => true,
            Self::StateChange(p) => p.resolves_order(),
            _ => false,
        }
    }
}

fn view<T: DeserializeOwned + Default>(value: &Value) -> T {
    T::deserialize(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_tolerates_missing_and_extra_fields() {
        let payload = EventPayload::decode(
            EventKind::TradeExecution,
            &json!({"order_id": "o-1", "price": 101.5, "venue": "SIM"}),
        );

        match &payload {
            EventPayload::TradeExecution(p) => {
                assert_eq!(p.order_id.as_deref(), Some("o-1"));
                assert_eq!(p.price, Some(101.5));
                assert!(p.quantity.is_none());
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(payload.kind(), EventKind::TradeExecution);
        assert_eq!(payload.to_value(), json!({"order_id": "o-1", "price": 101.5}));
    }

    #[test]
    fn test_wrong_field_type_reads_as_absent() {
        let payload = EventPayload::decode(
            EventKind::PositionUpdate,
            &json!({"symbol": "AAPL", "quantity": "ten", "realized_pnl": 5.0}),
        );
        match payload {
            EventPayload::PositionUpdate(p) => {
                assert_eq!(p.symbol.as_deref(), Some("AAPL"));
                assert!(p.quantity.is_none());
                assert_eq!(p.realized_pnl, Some(5.0));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_numeric_ids_and_numeric_strings() {
        let payload = EventPayload::decode(
            EventKind::PositionUpdate,
            &json!({"position_id": 7, "quantity": "10", "average_price": "NaN"}),
        );
        match payload {
            EventPayload::PositionUpdate(p) => {
                assert_eq!(p.position_id.as_deref(), Some("7"));
                assert_eq!(p.quantity, Some(10.0));
                assert!(p.average_price.is_none());
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let fill = EventPayload::decode(EventKind::TradeExecution, &json!({"order_id": 42}));
        assert_eq!(fill.order_id(), Some("42"));

        let odd = EventPayload::decode(EventKind::StateChange, &json!("filled"));
        assert_eq!(odd, EventPayload::StateChange(StateChangePayload::default()));
    }

    #[test]
    fn test_fill_completion_rules() {
        let full = TradeExecutionPayload::default();
        assert!(full.completes_order());

        let partial = TradeExecutionPayload {
            remaining_quantity: Some(5.0),
            ..Default::default()
        };
        assert!(!partial.completes_order());

        let flagged = TradeExecutionPayload {
            status: Some("partially_filled".to_string()),
            remaining_quantity: Some(0.0),
            ..Default::default()
        };
        assert!(!flagged.completes_order());
    }

    #[test]
    fn test_close_intent_does_not_resolve_order() {
        let closing = EventPayload::decode(
            EventKind::StateChange,
            &json!({"order_id": "o-9", "to_state": "closing"}),
        );
        assert!(!closing.resolves_order());

        let cancelled = EventPayload::decode(
            EventKind::StateChange,
            &json!({"order_id": "o-9", "to_state": "Cancelled"}),
        );
        assert!(cancelled.resolves_order());

        let rejection = EventPayload::decode(EventKind::OrderRejection, &json!({}));
        assert!(rejection.resolves_order());
    }
}
