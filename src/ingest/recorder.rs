//! Producer-side facade over the store and the ingestion pipeline

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::event_store::{cleanup_store, CleanupPolicy, EventStore, StoreError, StoreResult};
use crate::types::{Category, EventKind, NewEvent, Run, Severity, Timestamp};
use crate::validation::{merge_issues, validate_payload};

use super::pipeline::{IngestionPipeline, PipelineConfig, PipelineStats};

/// An event as a producer with only strings at hand would report it
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEvent<'a> {
    pub event_id: &'a str,
    pub run_id: &'a str,
    /// RFC 3339 or epoch milliseconds
    pub timestamp: &'a str,
    pub kind: &'a str,
    pub severity: &'a str,
    pub category: &'a str,
    pub payload_json: &'a str,
    pub parent_event_id: Option<&'a str>,
    /// JSON array of strings
    pub validation_errors_json: Option<&'a str>,
}

/// Fire-and-forget event recorder for one run's store
pub struct EventRecorder {
    store: Arc<EventStore>,
    pipeline: IngestionPipeline,
}

impl EventRecorder {
    /// Record into an existing or new store at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: PipelineConfig) -> StoreResult<Self> {
        let store = Arc::new(EventStore::open(path)?);
        Ok(Self::from_store(store, config))
    }

    pub fn from_store(store: Arc<EventStore>, config: PipelineConfig) -> Self {
        let pipeline = IngestionPipeline::new(store.clone(), config);
        Self { store, pipeline }
    }

    /// Remove any previous store at `path`, create a fresh one and record `run`
    ///
    /// A query server holding the store must have released it first.
    pub fn begin_run<P: AsRef<Path>>(
        path: P,
        run: &Run,
        config: PipelineConfig,
    ) -> StoreResult<Self> {
        let path = path.as_ref();
        let report = cleanup_store(path, CleanupPolicy::default());
        if !report.success {
            return Err(StoreError::Cleanup {
                path: path.to_path_buf(),
                reason: report.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let recorder = Self::open(path, config)?;
        recorder.create_run(run)?;
        info!(run_id = %run.run_id, path = %path.display(), "run started");
        Ok(recorder)
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn create_run(&self, run: &Run) -> StoreResult<()> {
        self.store.create_run(run)
    }

    /// Validate and buffer an event
    pub fn write_event(&self, mut event: NewEvent) {
        let issues = validate_payload(event.kind, &event.payload);
        if !issues.is_empty() {
            let reported = std::mem::take(&mut event.validation_errors);
            event.validation_errors = merge_issues(reported, issues);
        }
        self.pipeline.write(event);
    }

    /// Decode a string-typed event and buffer it
    ///
    /// Unknown kinds and unreadable timestamps drop the event. Other
    /// problems are recorded on the event as validation issues.
    pub fn write_raw(&self, raw: RawEvent<'_>) {
        let kind: EventKind = match raw.kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(event_id = %raw.event_id, error = %e, "dropping event");
                return;
            }
        };
        let timestamp = match Timestamp::parse(raw.timestamp) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(event_id = %raw.event_id, error = %e, "dropping event");
                return;
            }
        };

        let mut issues = Vec::new();

        let payload = match serde_json::from_str::<Value>(raw.payload_json) {
            Ok(payload) => payload,
            Err(e) => {
                issues.push(format!("payload is not valid JSON: {}", e));
                json!({ "raw": raw.payload_json })
            }
        };

        let severity: Severity = if raw.severity.trim().is_empty() {
            Severity::default()
        } else {
            raw.severity.parse().unwrap_or_else(|e| {
                issues.push(format!("{}", e));
                Severity::default()
            })
        };

        let category: Category = if raw.category.trim().is_empty() {
            kind.default_category()
        } else {
            raw.category.parse().unwrap_or_else(|e| {
                issues.push(format!("{}", e));
                kind.default_category()
            })
        };

        let mut reported = Vec::new();
        if let Some(text) = raw.validation_errors_json.filter(|t| !t.trim().is_empty()) {
            match serde_json::from_str::<Vec<String>>(text) {
                Ok(list) => reported = list,
                Err(_) => issues.push(format!("unreadable validation errors: {}", text)),
            }
        }

        let mut event = NewEvent::new(raw.event_id, raw.run_id, timestamp, kind, payload)
            .with_severity(severity)
            .with_category(category)
            .with_validation_errors(merge_issues(reported, issues));
        if let Some(parent) = raw.parent_event_id.filter(|p| !p.is_empty()) {
            event = event.with_parent(parent);
        }

        self.write_event(event);
    }

    pub fn flush(&self) -> bool {
        self.pipeline.flush()
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Final flush; the recorder accepts no events afterwards
    pub fn finish(self) -> PipelineStats {
        self.pipeline.close()
    }
}
