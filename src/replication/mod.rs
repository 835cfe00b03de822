//! Replication Module
//!
//! Replicates records to every configured server group. A lookup reads
//! all groups and keeps the copy with the newest commit time; a flush
//! writes the record back to all groups when it changed.
//!
//! This is last-writer-wins by wall-clock time, not consensus: writers on
//! different hosts are assumed to have synchronized clocks, a flush is not
//! atomic across groups, and a group that missed a write stays stale until
//! some later flush of the same record reaches it.

mod clock;
mod guard;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::RecordGuard;

use std::cmp::Ordering;

use crate::config::WolfCacheConfig;
use crate::error::Result;
use crate::memcache;
use crate::record::{envelope, Fields, RecordId, ReplicatedRecord};
use crate::store::{CacheStore, Expiry};

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing changed since the last flush; no group was written
    Clean,
    /// The record was written; `failed` groups missed the write
    Written { written: usize, failed: usize },
}

/// Entry point for replicated records.
///
/// Built once per process from the server groups and immutable afterwards;
/// pass it to whatever needs records rather than keeping it in a global.
pub struct RecordStore {
    groups: Vec<Box<dyn CacheStore>>,
    expiry: Expiry,
    clock: Box<dyn Clock>,
}

impl RecordStore {
    /// Create a store over `groups`, stamping commits with the system clock
    pub fn new(groups: Vec<Box<dyn CacheStore>>, expiry: Expiry) -> Self {
        Self {
            groups,
            expiry,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the commit clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Connect-on-demand memcached groups from configuration
    pub fn from_config(config: &WolfCacheConfig) -> Result<Self> {
        let groups = memcache::groups_from_config(config)?
            .into_iter()
            .map(|group| Box::new(group) as Box<dyn CacheStore>)
            .collect();
        Ok(Self::new(groups, config.expiry()))
    }

    /// Find record `id` in the groups, returning the freshest copy.
    ///
    /// # Panics
    ///
    /// If `id` is not a valid record id.
    ///
    /// # Errors
    ///
    /// `Error::Integrity` if any group holds something other than a record
    /// envelope for `id`. Callers should treat it as fatal.
    pub fn lookup(&self, id: &str) -> Result<Option<RecordGuard<'_>>> {
        let id = RecordId::new(id);
        Ok(self
            .load(&id)?
            .map(|record| RecordGuard::new(self, record)))
    }

    /// Create a record that has never been written
    ///
    /// # Panics
    ///
    /// If `id` is not a valid record id.
    pub fn construct(&self, id: &str, fields: Fields) -> RecordGuard<'_> {
        let id = RecordId::new(id);
        RecordGuard::new(self, ReplicatedRecord::new(id, fields))
    }

    /// Look up `id`, constructing an empty record when no group has it
    pub fn lookup_or_construct(&self, id: &str) -> Result<RecordGuard<'_>> {
        match self.lookup(id)? {
            Some(guard) => Ok(guard),
            None => Ok(self.construct(id, Fields::new())),
        }
    }

    /// Run `f` on record `id` (found or new) and flush when it returns
    pub fn with_record<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ReplicatedRecord) -> T,
    ) -> Result<T> {
        let mut guard = self.lookup_or_construct(id)?;
        let output = f(&mut guard);
        guard.flush()?;
        Ok(output)
    }

    /// Read every group and resolve the freshest copy of `id`.
    ///
    /// The result is left dirty when any group failed to answer, had no
    /// value, or held an older copy, so the next flush rewrites all
    /// groups. Equal commit times count as consistent; the first copy seen
    /// is kept without comparing contents.
    pub fn load(&self, id: &RecordId) -> Result<Option<ReplicatedRecord>> {
        let mut freshest: Option<ReplicatedRecord> = None;
        let mut needs_rewrite = false;

        for group in &self.groups {
            let bytes = match group.get(id.as_str()) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    tracing::debug!("{}: no copy of record {}", group.name(), id);
                    needs_rewrite = true;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{}: lookup of record {} failed: {}", group.name(), id, e);
                    needs_rewrite = true;
                    continue;
                }
            };

            let candidate = match envelope::decode(id, &bytes) {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::error!("{}: {}", group.name(), e);
                    return Err(e);
                }
            };

            let ordering = freshest
                .as_ref()
                .map(|current| candidate.last_commit_time().cmp(&current.last_commit_time()));

            match ordering {
                None => freshest = Some(candidate),
                Some(Ordering::Greater) => {
                    needs_rewrite = true;
                    freshest = Some(candidate);
                }
                Some(Ordering::Less) => needs_rewrite = true,
                Some(Ordering::Equal) => {}
            }
        }

        let Some(mut record) = freshest else {
            return Ok(None);
        };

        if needs_rewrite {
            tracing::debug!("Record {} is out of sync across groups; will rewrite", id);
        } else {
            record.mark_clean();
        }

        Ok(Some(record))
    }

    /// Write `record` to every group if it changed since the last flush.
    ///
    /// Groups that fail to take the write are logged and skipped; nothing
    /// is retried. Calling this again without changes writes nothing.
    pub fn flush(&self, record: &mut ReplicatedRecord) -> Result<FlushOutcome> {
        if !record.is_dirty() {
            tracing::trace!("Record {} unchanged; skipping flush", record.id());
            return Ok(FlushOutcome::Clean);
        }

        let previous = record.last_commit_time();
        record.set_last_commit_time(Some(self.clock.now()));
        let blob = match envelope::encode(record) {
            Ok(blob) => blob,
            Err(e) => {
                record.set_last_commit_time(previous);
                return Err(e);
            }
        };
        record.mark_clean();

        let mut written = 0;
        let mut failed = 0;
        for group in &self.groups {
            match group.set(record.id().as_str(), &blob, self.expiry) {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!("{}: write of record {} lost: {}", group.name(), record.id(), e);
                    failed += 1;
                }
            }
        }

        tracing::debug!(
            "Flushed record {} to {}/{} groups",
            record.id(),
            written,
            self.groups.len()
        );

        Ok(FlushOutcome::Written { written, failed })
    }
}
