//! Ingestion - the producer side of the event log
//!
//! `EventRecorder` is what a simulation talks to. It validates payloads and
//! hands events to the `IngestionPipeline`, which batches them into store
//! transactions without ever surfacing a write failure to the producer.

mod pipeline;
mod recorder;

pub use pipeline::{EventSink, IngestionPipeline, PipelineConfig, PipelineStats};
pub use recorder::{EventRecorder, RawEvent};
