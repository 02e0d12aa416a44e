//! Numeric aggregation over a payload field

use std::time::Instant;

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use crate::types::{AggregateFunction, AggregateRequest, AggregateResult, QueryMetadata};
use crate::utils::elapsed_ms;

use super::filter::{validate_time_range, WhereClause};
use super::{QueryEngine, QueryError, QueryResult};

/// Turn `price`, `fill.price` or `$.fill.price` into a JSON path
///
/// Only identifier characters, dots and array subscripts are accepted.
pub fn normalize_field_path(field_path: &str) -> QueryResult<String> {
    let trimmed = field_path.trim();
    let body = trimmed
        .strip_prefix("$.")
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);

    let invalid = || QueryError::InvalidFilter(format!("invalid field path '{}'", field_path));

    if body.is_empty() || body.starts_with('.') || body.ends_with('.') || body.contains("..") {
        return Err(invalid());
    }
    if !body
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
    {
        return Err(invalid());
    }

    if body.starts_with('[') {
        Ok(format!("${}", body))
    } else {
        Ok(format!("$.{}", body))
    }
}

/// Streaming mean and variance (Welford)
#[derive(Debug, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Sample standard deviation; zero for a single value
    fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

pub fn aggregate(engine: &QueryEngine, request: &AggregateRequest) -> QueryResult<AggregateResult> {
    let started = Instant::now();
    validate_time_range(&request.time_range)?;
    let path = normalize_field_path(&request.field_path)?;

    let mut clause = WhereClause::new();
    clause
        .run(request.run_id.as_deref())
        .kinds(&[request.kind])
        .time_range(&request.time_range);

    let path_idx = clause.next_index();
    let sql = format!(
        "SELECT json_type(payload, ?{idx}), json_extract(payload, ?{idx}) FROM events{}",
        clause.sql(),
        idx = path_idx
    );
    let mut params: Vec<SqlValue> = clause.params().to_vec();
    params.push(SqlValue::Text(path.clone()));

    let (matched, acc) = engine.with_store(|store| {
        Ok(store.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut matched = 0u64;
            let mut acc = Accumulator::default();
            while let Some(row) = rows.next()? {
                matched += 1;
                let json_type: Option<String> = row.get(0)?;
                if matches!(json_type.as_deref(), Some("integer") | Some("real")) {
                    let value: f64 = row.get(1)?;
                    if value.is_finite() {
                        acc.push(value);
                    }
                }
            }
            Ok((matched, acc))
        })?)
    })?;

    let has_values = acc.count > 0;
    let pick = |function: AggregateFunction, value: f64| {
        (request.wants(function) && has_values).then_some(value)
    };

    Ok(AggregateResult {
        kind: request.kind,
        field_path: path,
        matched_events: matched,
        excluded_values: matched - acc.count,
        count: request.wants(AggregateFunction::Count).then_some(acc.count),
        sum: pick(AggregateFunction::Sum, acc.sum),
        avg: pick(AggregateFunction::Avg, acc.sum / acc.count.max(1) as f64),
        min: pick(AggregateFunction::Min, acc.min),
        max: pick(AggregateFunction::Max, acc.max),
        stddev: pick(AggregateFunction::Stddev, acc.stddev()),
        metadata: QueryMetadata::single(1, elapsed_ms(started)),
    })
}
