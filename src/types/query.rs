//! Query filter, pagination and result types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Category, EventKind, EventRecord, Severity, Timestamp, UnknownVariant};

/// Inclusive time bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start: Option<Timestamp>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
}

impl TimeRange {
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A range whose start is after its end is malformed
    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
}

impl Pagination {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }

    /// Row offset, if it fits a SQLite integer
    pub fn checked_offset(&self) -> Option<i64> {
        self.page
            .checked_mul(self.page_size)
            .and_then(|offset| i64::try_from(offset).ok())
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 100,
        }
    }
}

/// Filter for the plain filtered scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub run_id: Option<String>,
    /// Empty means every kind
    pub kinds: Vec<EventKind>,
    pub severity: Option<Severity>,
    pub category: Option<Category>,
    pub time_range: TimeRange,
}

impl EventFilter {
    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }
}

/// Named entity keys that can be matched inside payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Order,
    Symbol,
    Position,
    Indicator,
}

impl EntityType {
    /// JSON path of the payload field holding this entity's key
    pub fn payload_path(&self) -> &'static str {
        match self {
            EntityType::Order => "$.order_id",
            EntityType::Symbol => "$.symbol",
            EntityType::Position => "$.position_id",
            EntityType::Indicator => "$.indicator_name",
        }
    }

    /// Top-level payload field name
    pub fn payload_field(&self) -> &'static str {
        &self.payload_path()[2..]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityType::Order => "order",
            EntityType::Symbol => "symbol",
            EntityType::Position => "position",
            EntityType::Indicator => "indicator",
        })
    }
}

impl FromStr for EntityType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" | "order_id" | "orderid" => Ok(EntityType::Order),
            "symbol" | "security" | "ticker" => Ok(EntityType::Symbol),
            "position" | "position_id" | "positionid" => Ok(EntityType::Position),
            "indicator" | "indicator_name" | "indicatorname" => Ok(EntityType::Indicator),
            _ => Err(UnknownVariant {
                field: "entity type",
                value: s.to_string(),
                expected: "order, symbol, position, indicator".to_string(),
            }),
        }
    }
}

/// Filter for the entity-reference scan
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFilter {
    pub run_id: Option<String>,
    pub entity_type: EntityType,
    pub value: String,
    /// Empty means every kind
    pub kinds: Vec<EventKind>,
}

impl EntityFilter {
    pub fn new(entity_type: EntityType, value: impl Into<String>) -> Self {
        Self {
            run_id: None,
            entity_type,
            value: value.into(),
            kinds: Vec::new(),
        }
    }

    pub fn in_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = kinds;
        self
    }
}

/// Metadata block attached to every query response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub page: usize,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
    #[serde(rename = "returnedCount")]
    pub returned_count: usize,
    #[serde(rename = "totalCount", skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(rename = "totalSequences", skip_serializing_if = "Option::is_none")]
    pub total_sequences: Option<u64>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    #[serde(rename = "queryTimeMs")]
    pub query_time_ms: f64,
}

impl QueryMetadata {
    /// Metadata for a paged listing
    pub fn paged(pagination: Pagination, returned: usize, total: u64, query_time_ms: f64) -> Self {
        let has_more = (pagination.offset().saturating_add(returned) as u64) < total;
        Self {
            page: pagination.page,
            page_size: pagination.page_size,
            returned_count: returned,
            total_count: Some(total),
            total_sequences: None,
            has_more,
            query_time_ms,
        }
    }

    /// Metadata for a paged listing of chains
    pub fn sequences(
        pagination: Pagination,
        returned: usize,
        total: u64,
        query_time_ms: f64,
    ) -> Self {
        Self {
            total_count: None,
            total_sequences: Some(total),
            ..Self::paged(pagination, returned, total, query_time_ms)
        }
    }

    /// Metadata for an unpaged result
    pub fn single(returned: usize, query_time_ms: f64) -> Self {
        Self {
            page: 0,
            page_size: returned,
            returned_count: returned,
            total_count: Some(returned as u64),
            total_sequences: None,
            has_more: false,
            query_time_ms,
        }
    }
}

/// One page of events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<EventRecord>,
    pub metadata: QueryMetadata,
}
