//! WolfCache - Replicated Write-Back Cache Records
//!
//! Keeps small named records (sessions, per-user state) replicated across
//! several independent memcached server groups, so losing one group does
//! not lose the data.
//!
//! # Architecture
//!
//! Every record is written once to each group. A lookup reads all groups
//! and keeps the copy with the newest commit time; a record that is out of
//! sync anywhere is rewritten to every group on its next flush. Flushes
//! happen when the record's guard goes out of scope, and only when the
//! record changed.
//!
//! # Features
//!
//! - Last-writer-wins resolution by commit timestamp
//! - Self-healing of groups that were down or stale during a lookup
//! - Write-back on scope exit with change detection
//! - Weighted key distribution and failover inside a group
//! - LZ4 compression of large values
//!
//! ```no_run
//! use wolfcache::{RecordStore, WolfCacheConfig};
//!
//! let config = WolfCacheConfig::from_file("wolfcache.toml".as_ref())?;
//! let store = RecordStore::from_config(&config)?;
//!
//! let mut session = store.lookup_or_construct("sess01")?;
//! session.set("user", "alice");
//! // flushed to every group when `session` is dropped
//! # Ok::<(), wolfcache::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod memcache;
pub mod record;
pub mod replication;
pub mod store;

pub use config::WolfCacheConfig;
pub use error::{Error, Result};
pub use record::{Fields, RecordId, ReplicatedRecord};
pub use replication::{FlushOutcome, RecordGuard, RecordStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfCacheConfig;
    pub use crate::error::{Error, Result};
    pub use crate::record::{Fields, RecordId, ReplicatedRecord};
    pub use crate::replication::{Clock, FlushOutcome, RecordGuard, RecordStore};
    pub use crate::store::{CacheStore, Expiry, MemoryStore};
}
