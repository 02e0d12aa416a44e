//! Buffered, batched writes into the store
//!
//! Events collect in one mutex-guarded buffer and are handed to the sink as a
//! single transaction when the buffer reaches the batch size, when the flush
//! timer fires, or on an explicit flush. The mutex is held for the whole sink
//! write, so the three triggers never overlap.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::event_store::{EventStore, StoreResult};
use crate::types::NewEvent;

/// Destination of flushed batches
pub trait EventSink: Send + Sync {
    /// Persist the whole batch or nothing
    fn write_batch(&self, events: &[NewEvent]) -> StoreResult<usize>;
}

impl EventSink for EventStore {
    fn write_batch(&self, events: &[NewEvent]) -> StoreResult<usize> {
        EventStore::write_batch(self, events)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Buffer length that forces a flush
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    /// Attempts at the final flush during close
    pub shutdown_flush_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            flush_interval: Duration::from_secs(30),
            shutdown_flush_attempts: 3,
        }
    }
}

impl PipelineConfig {
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

/// Counters reported by `IngestionPipeline::stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Events accepted by `write`
    pub written: u64,
    /// Events in committed batches
    pub flushed: u64,
    /// Committed batches
    pub batches: u64,
    #[serde(rename = "failedFlushes")]
    pub failed_flushes: u64,
    /// Buffered plus awaiting retry
    pub pending: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Size,
    Timer,
    Explicit,
    Shutdown,
}

impl FlushTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Explicit => "explicit",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

#[derive(Default)]
struct Buffer {
    events: Vec<NewEvent>,
    /// Batch whose write failed; retried unchanged before anything newer
    failed: Option<Vec<NewEvent>>,
    /// Buffer length at which the size trigger retries a failed batch
    retry_at: usize,
}

struct Shared {
    sink: Arc<dyn EventSink>,
    config: PipelineConfig,
    buffer: Mutex<Buffer>,
    closed: AtomicBool,
    written: AtomicU64,
    flushed: AtomicU64,
    batches: AtomicU64,
    failed_flushes: AtomicU64,
}

impl Shared {
    fn write_to_sink(&self, batch: &[NewEvent], trigger: FlushTrigger) -> bool {
        match self.sink.write_batch(batch) {
            Ok(inserted) => {
                self.flushed.fetch_add(batch.len() as u64, Ordering::Relaxed);
                self.batches.fetch_add(1, Ordering::Relaxed);
                debug!(batch_size = batch.len(), inserted, trigger = trigger.as_str(), "batch flushed");
                true
            }
            Err(e) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                warn!(
                    batch_size = batch.len(),
                    trigger = trigger.as_str(),
                    error = %e,
                    "batch write failed, retaining for retry"
                );
                false
            }
        }
    }

    /// Write the retained batch, then the buffer; caller holds the lock
    fn flush_locked(&self, buffer: &mut Buffer, trigger: FlushTrigger) -> bool {
        if let Some(batch) = buffer.failed.take() {
            if !self.write_to_sink(&batch, trigger) {
                buffer.failed = Some(batch);
                buffer.retry_at = buffer.events.len() + self.config.max_batch_size;
                return false;
            }
        }
        if buffer.events.is_empty() {
            return true;
        }
        let batch = std::mem::take(&mut buffer.events);
        if self.write_to_sink(&batch, trigger) {
            true
        } else {
            buffer.failed = Some(batch);
            buffer.retry_at = self.config.max_batch_size;
            false
        }
    }

    fn flush(&self, trigger: FlushTrigger) -> bool {
        let mut buffer = self.buffer.lock();
        self.flush_locked(&mut buffer, trigger)
    }
}

/// Asynchronous-to-the-producer event writer
pub struct IngestionPipeline {
    shared: Arc<Shared>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionPipeline {
    /// Create a pipeline; the flush timer runs when a tokio runtime is present
    pub fn new(sink: Arc<dyn EventSink>, config: PipelineConfig) -> Self {
        let shared = Arc::new(Shared {
            sink,
            config,
            buffer: Mutex::new(Buffer::default()),
            closed: AtomicBool::new(false),
            written: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
        });

        let ticker = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(run_ticker(Arc::downgrade(&shared), config.flush_interval))),
            Err(_) => {
                debug!("no async runtime, timer flush disabled");
                None
            }
        };

        Self {
            shared,
            ticker: Mutex::new(ticker),
        }
    }

    pub fn config(&self) -> PipelineConfig {
        self.shared.config
    }

    /// Buffer one event; never fails from the producer's point of view
    pub fn write(&self, event: NewEvent) {
        if self.shared.closed.load(Ordering::Acquire) {
            warn!(event_id = %event.event_id, "pipeline closed, dropping event");
            return;
        }

        let mut buffer = self.shared.buffer.lock();
        buffer.events.push(event);
        self.shared.written.fetch_add(1, Ordering::Relaxed);

        // A failed batch is retried at most once per further batch of writes
        let threshold = if buffer.failed.is_some() {
            buffer.retry_at
        } else {
            self.shared.config.max_batch_size
        };
        if buffer.events.len() >= threshold {
            self.shared.flush_locked(&mut buffer, FlushTrigger::Size);
        }
    }

    /// Flush now; returns whether everything buffered is committed
    pub fn flush(&self) -> bool {
        self.shared.flush(FlushTrigger::Explicit)
    }

    pub fn stats(&self) -> PipelineStats {
        let pending = {
            let buffer = self.shared.buffer.lock();
            buffer.events.len() + buffer.failed.as_ref().map_or(0, Vec::len)
        };
        PipelineStats {
            written: self.shared.written.load(Ordering::Relaxed),
            flushed: self.shared.flushed.load(Ordering::Relaxed),
            batches: self.shared.batches.load(Ordering::Relaxed),
            failed_flushes: self.shared.failed_flushes.load(Ordering::Relaxed),
            pending: pending as u64,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop the timer and perform the final synchronous flush
    ///
    /// Idempotent. Events still failing after the last attempt are dropped
    /// with an error log.
    pub fn close(&self) -> PipelineStats {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return self.stats();
        }
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }

        let attempts = self.shared.config.shutdown_flush_attempts.max(1);
        for attempt in 1..=attempts {
            if self.shared.flush(FlushTrigger::Shutdown) {
                break;
            }
            if attempt < attempts {
                thread::sleep(Duration::from_millis(100 * attempt as u64));
            }
        }

        let stats = self.stats();
        if stats.pending > 0 {
            error!(lost = stats.pending, "final flush failed, events not persisted");
        } else {
            info!(written = stats.written, batches = stats.batches, "ingestion pipeline closed");
        }
        stats
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_ticker(shared: Weak<Shared>, period: Duration) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    timer.tick().await;

    loop {
        timer.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        let result = tokio::task::spawn_blocking(move || shared.flush(FlushTrigger::Timer)).await;
        if let Err(e) = result {
            warn!(error = %e, "timer flush task failed");
        }
    }
}
