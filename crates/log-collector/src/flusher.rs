// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decides when buffered records are written to the object store.
//!
//! Three triggers end up in the same flush path:
//! 1. **Size**: [`LogFlusher::maybe_flush`] after every append, once the
//!    buffer holds at least `threshold` records
//! 2. **Timer**: [`LogFlusher::start_periodic_flush`] every flush interval
//! 3. **Explicit**: [`LogFlusher::flush_now`], e.g. after test-log generation
//!
//! Flushes are serialized by their own lock, so at most one upload is in
//! flight. The buffer lock is only held while the snapshot is taken; appends
//! keep landing in the (now empty) buffer during the upload.
//!
//! Delivery is best effort: a batch whose upload fails is logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::LogBuffer;
use crate::error::CollectorError;
use crate::object_store::{BatchWriter, FlushBatch};

/// What a single flush invocation did.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing to flush, or the size threshold no longer held.
    Skipped,
    Persisted {
        object_name: String,
        record_count: usize,
    },
    /// The batch could not be stored and its records were discarded.
    Dropped {
        object_name: Option<String>,
        record_count: usize,
        error: CollectorError,
    },
}

impl FlushOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, FlushOutcome::Persisted { .. })
    }
}

pub struct LogFlusher {
    buffer: Arc<LogBuffer>,
    writer: Arc<dyn BatchWriter + Send + Sync>,
    threshold: usize,
    flush_lock: Mutex<()>,
    // Set while a size-triggered flush task is queued or running.
    flush_pending: AtomicBool,
}

impl LogFlusher {
    pub fn new(
        buffer: Arc<LogBuffer>,
        writer: Arc<dyn BatchWriter + Send + Sync>,
        threshold: usize,
    ) -> Self {
        LogFlusher {
            buffer,
            writer,
            threshold: threshold.max(1),
            flush_lock: Mutex::new(()),
            flush_pending: AtomicBool::new(false),
        }
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Flushes if the buffer has reached the threshold.
    ///
    /// The size is checked again once the flush lock is held, so callers that
    /// queued behind a flush which already drained the buffer do nothing.
    pub async fn maybe_flush(&self) -> FlushOutcome {
        if self.buffer.size() < self.threshold {
            return FlushOutcome::Skipped;
        }

        let _guard = self.flush_lock.lock().await;
        if self.buffer.size() < self.threshold {
            debug!("Buffer already drained by a concurrent flush");
            return FlushOutcome::Skipped;
        }
        self.flush_locked().await
    }

    /// Runs [`LogFlusher::maybe_flush`] in the background unless a
    /// size-triggered flush is already pending, in which case that one will
    /// pick up the records. Returns the handle of the spawned task, if any.
    pub fn spawn_maybe_flush(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.try_mark_pending() {
            return None;
        }
        let flusher = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                flusher.maybe_flush().await;
                flusher.flush_pending.store(false, Ordering::Release);
                // Appends that crossed the threshold while the flag was still
                // set did not spawn a task of their own.
                if flusher.buffer.size() < flusher.threshold || !flusher.try_mark_pending() {
                    break;
                }
            }
        }))
    }

    fn try_mark_pending(&self) -> bool {
        self.flush_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flushes whatever is buffered, waiting for any in-flight flush first.
    pub async fn flush_now(&self) -> FlushOutcome {
        let _guard = self.flush_lock.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> FlushOutcome {
        let records = self.buffer.snapshot_and_clear();
        if records.is_empty() {
            return FlushOutcome::Skipped;
        }
        let record_count = records.len();

        let batch = match FlushBatch::new(records) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to serialize {record_count} logs, dropping them: {e}");
                return FlushOutcome::Dropped {
                    object_name: None,
                    record_count,
                    error: e,
                };
            }
        };

        match self.writer.write_batch(&batch).await {
            Ok(()) => {
                info!("Saved {record_count} logs to {}", batch.object_name());
                FlushOutcome::Persisted {
                    object_name: batch.object_name().to_string(),
                    record_count,
                }
            }
            Err(e) => {
                error!("Error saving logs to {}: {e}", batch.object_name());
                warn!("Dropped {record_count} logs after failed upload");
                FlushOutcome::Dropped {
                    object_name: Some(batch.object_name().to_string()),
                    record_count,
                    error: e,
                }
            }
        }
    }

    /// Calls [`LogFlusher::flush_now`] every `period` until `cancel` fires,
    /// then drains the buffer one last time.
    pub async fn start_periodic_flush(&self, period: Duration, cancel: CancellationToken) {
        let mut flush_interval = interval(period);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Periodic flush cancelled, draining buffer");
                    self.flush_now().await;
                    break;
                }
                _ = flush_interval.tick() => {
                    debug!("Periodic flush of {} buffered logs", self.buffer.size());
                    self.flush_now().await;
                }
            }
        }
    }

    /// Spawns [`LogFlusher::start_periodic_flush`] on the runtime.
    pub fn spawn_periodic_flush(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let flusher = Arc::clone(self);
        tokio::spawn(async move {
            flusher.start_periodic_flush(period, cancel).await;
        })
    }
}
