//! Record Guard
//!
//! Scoped access to a record. Dropping the guard flushes the record once,
//! whether the scope ends normally or by unwinding. An aborted process
//! never flushes.

use std::ops::{Deref, DerefMut};

use super::{FlushOutcome, RecordStore};
use crate::error::Result;
use crate::record::ReplicatedRecord;

/// A looked-up or constructed record bound to the store it flushes to
pub struct RecordGuard<'a> {
    store: &'a RecordStore,
    record: ReplicatedRecord,
}

impl<'a> RecordGuard<'a> {
    pub(crate) fn new(store: &'a RecordStore, record: ReplicatedRecord) -> Self {
        Self { store, record }
    }

    /// Flush now instead of waiting for the guard to drop
    pub fn flush(&mut self) -> Result<FlushOutcome> {
        self.store.flush(&mut self.record)
    }
}

impl Deref for RecordGuard<'_> {
    type Target = ReplicatedRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl DerefMut for RecordGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.record
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.flush(&mut self.record) {
            tracing::error!("Deferred flush of record {} failed: {}", self.record.id(), e);
        }
    }
}
