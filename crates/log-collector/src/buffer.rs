// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::log_record::LogRecord;

/// In-memory, insertion-ordered sequence of records awaiting a flush.
///
/// The lock is only held to push or to swap the whole sequence out, never
/// across an upload.
#[derive(Debug, Default)]
pub struct LogBuffer {
    records: Mutex<Vec<LogRecord>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns the new length.
    pub fn append(&self, record: LogRecord) -> usize {
        let mut records = self.lock();
        records.push(record);
        records.len()
    }

    /// Appends records in order and returns the new length.
    pub fn extend(&self, batch: impl IntoIterator<Item = LogRecord>) -> usize {
        let mut records = self.lock();
        records.extend(batch);
        records.len()
    }

    /// Takes every buffered record, leaving the buffer empty.
    pub fn snapshot_and_clear(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.lock())
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the Vec half-written, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
