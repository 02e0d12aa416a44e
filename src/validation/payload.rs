//! Required payload fields per event kind, checked softly at write time

use serde_json::Value;

use crate::types::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
}

/// Fields each kind is expected to carry
pub const REQUIRED_FIELDS: &[(EventKind, &[(&str, FieldType)])] = &[
    (
        EventKind::TradeExecution,
        &[
            ("order_id", FieldType::Text),
            ("symbol", FieldType::Text),
            ("quantity", FieldType::Number),
            ("price", FieldType::Number),
        ],
    ),
    (
        EventKind::OrderRejection,
        &[("order_id", FieldType::Text), ("reason", FieldType::Text)],
    ),
    (
        EventKind::IndicatorCalculation,
        &[
            ("indicator_name", FieldType::Text),
            ("value", FieldType::Number),
        ],
    ),
    (
        EventKind::PositionUpdate,
        &[("symbol", FieldType::Text), ("quantity", FieldType::Number)],
    ),
    (EventKind::StateChange, &[("to_state", FieldType::Text)]),
    (
        EventKind::MarketData,
        &[("symbol", FieldType::Text), ("price", FieldType::Number)],
    ),
    (EventKind::RiskEvent, &[("rule", FieldType::Text)]),
];

/// Required fields for one kind
pub fn required_fields(kind: EventKind) -> &'static [(&'static str, FieldType)] {
    REQUIRED_FIELDS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// Check a payload against its kind's schema
///
/// Returns human-readable issues; an empty list means the payload is clean.
/// Issues never block a write, they are stored alongside the event.
pub fn validate_payload(kind: EventKind, payload: &Value) -> Vec<String> {
    let Some(object) = payload.as_object() else {
        return vec![format!("{} payload is not a JSON object", kind)];
    };

    required_fields(kind)
        .iter()
        .filter_map(|(field, expected)| match (object.get(*field), expected) {
            (None, _) | (Some(Value::Null), _) => {
                Some(format!("{} payload is missing '{}'", kind, field))
            }
            (Some(Value::Number(_)), FieldType::Number) => None,
            (Some(Value::String(_)), FieldType::Text) => None,
            // Numeric ids are common enough to accept as text
            (Some(Value::Number(_)), FieldType::Text) => None,
            (Some(other), FieldType::Number) => Some(format!(
                "{} payload field '{}' should be numeric, got {}",
                kind, field, other
            )),
            (Some(other), FieldType::Text) => Some(format!(
                "{} payload field '{}' should be text, got {}",
                kind, field, other
            )),
        })
        .collect()
}

/// Merge producer-supplied issues with write-time issues, dropping duplicates
pub fn merge_issues(mut existing: Vec<String>, found: Vec<String>) -> Vec<String> {
    for issue in found {
        if !existing.contains(&issue) {
            existing.push(issue);
        }
    }
    existing
}
