//! Store Module
//!
//! The per-group key/value seam the record store replicates through.
//! A `CacheStore` is one independent server group: the caller never
//! chooses which physical server inside the group holds a key.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;

/// Largest relative exptime memcached accepts; larger values are read
/// by the server as absolute Unix timestamps.
pub const MAX_RELATIVE_EXPIRY: u64 = 60 * 60 * 24 * 30;

/// Expiry policy for written values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Keep the value until it is evicted
    Never,
    /// Expire this many seconds after the write
    After(u64),
}

impl Expiry {
    /// Wire exptime for a write happening at `now` (seconds since epoch)
    pub fn exptime(&self, now: i64) -> u32 {
        match *self {
            Expiry::Never => 0,
            Expiry::After(secs) if secs <= MAX_RELATIVE_EXPIRY => secs as u32,
            Expiry::After(secs) => {
                let absolute = (now.max(0) as u64).saturating_add(secs);
                absolute.min(u32::MAX as u64) as u32
            }
        }
    }
}

/// One server group, addressed as a single key/value store
pub trait CacheStore: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Fetch the value stored under `key`, `None` if absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`
    fn set(&self, key: &str, value: &[u8], expiry: Expiry) -> Result<()>;
}

impl<T: CacheStore + ?Sized> CacheStore for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8], expiry: Expiry) -> Result<()> {
        (**self).set(key, value, expiry)
    }
}
