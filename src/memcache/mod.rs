//! Memcached Module
//!
//! Blocking memcached client: the text protocol, single-server
//! connections, and weighted server groups.

pub mod protocol;
mod server;
mod group;

#[cfg(test)]
pub(crate) mod fake;

pub use server::Server;
pub use group::{Compression, ServerGroup, ServerStatus};

use crate::config::WolfCacheConfig;
use crate::error::Result;

/// Build one `ServerGroup` per configured group, in configuration order
pub fn groups_from_config(config: &WolfCacheConfig) -> Result<Vec<ServerGroup>> {
    config
        .groups
        .iter()
        .enumerate()
        .map(|(index, group)| ServerGroup::from_config(index, group, &config.client))
        .collect()
}
