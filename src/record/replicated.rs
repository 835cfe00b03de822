//! Replicated record
//!
//! The in-memory side of a record: its fields plus what is needed to tell
//! whether the groups already hold the current content.

use serde_json::Value;
use std::collections::BTreeMap;

use super::id::RecordId;

/// Field map of a record
pub type Fields = BTreeMap<String, Value>;

/// A named mapping of values replicated to every server group.
///
/// The record is dirty (needs a flush) whenever no flushed snapshot is
/// held or the snapshot differs from the current fields. `set` always
/// drops the snapshot, so a write is never skipped because a change went
/// unnoticed.
#[derive(Debug, Clone)]
pub struct ReplicatedRecord {
    id: RecordId,
    last_commit_time: Option<i64>,
    fields: Fields,
    flushed: Option<Fields>,
}

impl ReplicatedRecord {
    /// A record that has never been flushed
    pub fn new(id: RecordId, fields: Fields) -> Self {
        Self {
            id,
            last_commit_time: None,
            fields,
            flushed: None,
        }
    }

    /// A record reconstructed from a stored copy; dirty until marked clean
    pub(crate) fn from_parts(id: RecordId, last_commit_time: Option<i64>, fields: Fields) -> Self {
        Self {
            id,
            last_commit_time,
            fields,
            flushed: None,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Seconds since epoch of the last flush, `None` before the first one
    pub fn last_commit_time(&self) -> Option<i64> {
        self.last_commit_time
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Value under `key`, if any
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Insert or overwrite `key`; always marks the record dirty
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
        self.flushed = None;
    }

    /// Remove `key`, returning its value; always marks the record dirty
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.flushed = None;
        self.fields.remove(key)
    }

    /// Whether the next flush has to write
    pub fn is_dirty(&self) -> bool {
        match &self.flushed {
            Some(snapshot) => snapshot != &self.fields,
            None => true,
        }
    }

    /// Record the current fields as persisted on every group
    pub(crate) fn mark_clean(&mut self) {
        self.flushed = Some(self.fields.clone());
    }

    pub(crate) fn set_last_commit_time(&mut self, time: Option<i64>) {
        self.last_commit_time = time;
    }
}
