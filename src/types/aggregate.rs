//! Aggregation request and result types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{EventKind, QueryMetadata, TimeRange, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Stddev,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 6] = [
        AggregateFunction::Count,
        AggregateFunction::Sum,
        AggregateFunction::Avg,
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::Stddev,
    ];
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Stddev => "stddev",
        })
    }
}

impl FromStr for AggregateFunction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" | "mean" | "average" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "stddev" | "std" | "stdev" => Ok(AggregateFunction::Stddev),
            _ => Err(UnknownVariant {
                field: "aggregation",
                value: s.to_string(),
                expected: "count, sum, avg, min, max, stddev".to_string(),
            }),
        }
    }
}

/// Aggregate a numeric payload field across events of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub run_id: Option<String>,
    pub kind: EventKind,
    /// `price`, `fill.price` or `$.fill.price`
    pub field_path: String,
    /// Empty means every function
    pub functions: Vec<AggregateFunction>,
    pub time_range: TimeRange,
}

impl AggregateRequest {
    pub fn new(kind: EventKind, field_path: impl Into<String>) -> Self {
        Self {
            run_id: None,
            kind,
            field_path: field_path.into(),
            functions: Vec::new(),
            time_range: TimeRange::unbounded(),
        }
    }

    pub fn with_functions(mut self, functions: Vec<AggregateFunction>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn in_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn wants(&self, function: AggregateFunction) -> bool {
        self.functions.is_empty() || self.functions.contains(&function)
    }
}

/// Aggregation output; only the requested functions are populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    #[serde(rename = "eventType")]
    pub kind: EventKind,
    #[serde(rename = "fieldPath")]
    pub field_path: String,
    /// Every event of the kind in range, numeric value or not
    #[serde(rename = "matchedEvents")]
    pub matched_events: u64,
    /// Events whose value at the path was missing or non-numeric
    #[serde(rename = "excludedValues")]
    pub excluded_values: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stddev: Option<f64>,
    pub metadata: QueryMetadata,
}
