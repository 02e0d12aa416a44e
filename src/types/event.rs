//! Event types for the run trace log
//!
//! Events are immutable, append-only records of what happened during a
//! simulation run. The store assigns each one a monotonically increasing
//! sequence id; producers assign the externally visible event id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Timestamp;

/// Error for a wire name that is not part of a closed enumeration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} '{value}' (expected one of: {expected})")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
    pub expected: String,
}

impl UnknownVariant {
    fn new(field: &'static str, value: &str, expected: &[&str]) -> Self {
        Self {
            field,
            value: value.to_string(),
            expected: expected.join(", "),
        }
    }
}

/// Lowercase, trim, and accept `-` or space in place of `_`
fn normalize(text: &str) -> String {
    text.trim().to_ascii_lowercase().replace(|c: char| c == '-' || c == ' ', "_")
}

/// Closed set of event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A (partial or complete) fill of an order
    TradeExecution,
    /// An order refused by the simulated venue or a pre-trade check
    OrderRejection,
    /// An indicator value computed for a security
    IndicatorCalculation,
    /// Position quantity / price / P&L changed
    PositionUpdate,
    /// A component or order moved between states
    StateChange,
    /// A market data tick or bar
    MarketData,
    /// A risk limit or rule fired
    RiskEvent,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::TradeExecution,
        EventKind::OrderRejection,
        EventKind::IndicatorCalculation,
        EventKind::PositionUpdate,
        EventKind::StateChange,
        EventKind::MarketData,
        EventKind::RiskEvent,
    ];

    const NAMES: [&'static str; 7] = [
        "trade_execution",
        "order_rejection",
        "indicator_calculation",
        "position_update",
        "state_change",
        "market_data",
        "risk_event",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TradeExecution => "trade_execution",
            EventKind::OrderRejection => "order_rejection",
            EventKind::IndicatorCalculation => "indicator_calculation",
            EventKind::PositionUpdate => "position_update",
            EventKind::StateChange => "state_change",
            EventKind::MarketData => "market_data",
            EventKind::RiskEvent => "risk_event",
        }
    }

    /// Category used when the producer does not supply one
    pub fn default_category(&self) -> Category {
        match self {
            EventKind::TradeExecution
            | EventKind::OrderRejection
            | EventKind::PositionUpdate
            | EventKind::StateChange => Category::Execution,
            EventKind::IndicatorCalculation => Category::Indicators,
            EventKind::MarketData => Category::MarketData,
            EventKind::RiskEvent => Category::Risk,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "trade_execution" | "trade" | "fill" => Ok(EventKind::TradeExecution),
            "order_rejection" | "rejection" => Ok(EventKind::OrderRejection),
            "indicator_calculation" | "indicator" => Ok(EventKind::IndicatorCalculation),
            "position_update" | "position" => Ok(EventKind::PositionUpdate),
            "state_change" => Ok(EventKind::StateChange),
            "market_data" | "market_data_event" => Ok(EventKind::MarketData),
            "risk_event" | "risk" => Ok(EventKind::RiskEvent),
            _ => Err(UnknownVariant::new("event type", s, &EventKind::NAMES)),
        }
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl Severity {
    const NAMES: [&'static str; 4] = ["error", "warning", "info", "debug"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "debug" => Ok(Severity::Debug),
            _ => Err(UnknownVariant::new("severity", s, &Severity::NAMES)),
        }
    }
}

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Execution,
    MarketData,
    Indicators,
    Risk,
    Performance,
}

impl Category {
    const NAMES: [&'static str; 5] = [
        "execution",
        "market_data",
        "indicators",
        "risk",
        "performance",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Execution => "execution",
            Category::MarketData => "market_data",
            Category::Indicators => "indicators",
            Category::Risk => "risk",
            Category::Performance => "performance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "execution" => Ok(Category::Execution),
            "market_data" => Ok(Category::MarketData),
            "indicators" | "indicator" => Ok(Category::Indicators),
            "risk" => Ok(Category::Risk),
            "performance" => Ok(Category::Performance),
            _ => Err(UnknownVariant::new("category", s, &Category::NAMES)),
        }
    }
}

/// An event as handed to the store by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    pub timestamp: Timestamp,
    #[serde(rename = "eventType")]
    pub kind: EventKind,
    #[serde(default)]
    pub severity: Severity,
    pub category: Category,
    pub payload: Value,
    #[serde(rename = "parentEventId", default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    #[serde(
        rename = "validationErrors",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub validation_errors: Vec<String>,
}

impl NewEvent {
    /// Create an event with `info` severity and the kind's default category
    pub fn new(
        event_id: impl Into<String>,
        run_id: impl Into<String>,
        timestamp: Timestamp,
        kind: EventKind,
        payload: Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            run_id: run_id.into(),
            timestamp,
            kind,
            severity: Severity::Info,
            category: kind.default_category(),
            payload,
            parent_event_id: None,
            validation_errors: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_event_id: impl Into<String>) -> Self {
        self.parent_event_id = Some(parent_event_id.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_validation_errors(mut self, errors: Vec<String>) -> Self {
        self.validation_errors = errors;
        self
    }
}

/// An event read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Store-assigned, monotonically increasing
    #[serde(rename = "sequenceId")]
    pub sequence_id: i64,
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    pub timestamp: Timestamp,
    #[serde(rename = "eventType")]
    pub kind: EventKind,
    pub severity: Severity,
    pub category: Category,
    pub payload: Value,
    #[serde(rename = "parentEventId", default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    #[serde(
        rename = "validationErrors",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub validation_errors: Vec<String>,
}

impl EventRecord {
    /// String value of a top-level payload field
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}
