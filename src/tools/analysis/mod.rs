//! Aggregation and causal-chain tools

mod aggregate_metrics;
mod query_event_sequences;

pub use aggregate_metrics::AggregateMetricsTool;
pub use query_event_sequences::QueryEventSequencesTool;
