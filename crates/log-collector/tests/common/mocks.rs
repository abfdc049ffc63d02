// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fake object store writers for testing the flush path without a store

use async_trait::async_trait;
use log_collector::{
    error::CollectorError,
    object_store::{BatchWriter, FlushBatch},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Writer that keeps every batch it is given
#[derive(Default)]
pub struct RecordingWriter {
    batches: Mutex<Vec<FlushBatch>>,
}

impl RecordingWriter {
    pub fn batches(&self) -> Vec<FlushBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn record_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(FlushBatch::len).sum()
    }
}

#[async_trait]
impl BatchWriter for RecordingWriter {
    async fn write_batch(&self, batch: &FlushBatch) -> Result<(), CollectorError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

/// Writer whose store is always down
#[derive(Default)]
pub struct UnavailableWriter {
    attempts: AtomicUsize,
}

impl UnavailableWriter {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchWriter for UnavailableWriter {
    async fn write_batch(&self, _batch: &FlushBatch) -> Result<(), CollectorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CollectorError::StoreUnavailable(
            "connection refused".to_string(),
        ))
    }
}
