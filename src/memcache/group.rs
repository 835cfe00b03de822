//! Server Group
//!
//! A logical memcached cluster. Keys are spread over the group's servers
//! by weight; when the chosen server fails the key is rehashed onto the
//! next server. Large values are LZ4-compressed on the way in.

use std::collections::HashSet;

use super::protocol::FLAG_COMPRESSED;
use super::server::Server;
use crate::config::{ClientConfig, GroupConfig};
use crate::error::{Error, Result};
use crate::store::{CacheStore, Expiry};

/// Upper bound on rehash attempts when looking for a live server
const MAX_FAILOVER_ATTEMPTS: usize = 20;

/// Result of probing one server
#[derive(Debug)]
pub struct ServerStatus {
    pub address: String,
    pub weight: u32,
    pub version: Result<String>,
}

/// Compression settings applied to written values
#[derive(Debug, Clone, Copy)]
pub struct Compression {
    /// Values larger than this many bytes are compressed (0 disables)
    pub threshold: usize,
    /// Minimum fraction of space compression must save to be kept
    pub min_savings: f64,
}

impl From<&ClientConfig> for Compression {
    fn from(client: &ClientConfig) -> Self {
        Self {
            threshold: client.compress_threshold,
            min_savings: client.compress_min_savings,
        }
    }
}

/// One server group backed by memcached
pub struct ServerGroup {
    name: String,
    servers: Vec<Server>,
    /// Each server index repeated `weight` times
    buckets: Vec<usize>,
    compression: Compression,
}

impl ServerGroup {
    /// Create a group from already-built servers
    pub fn new(name: String, servers: Vec<Server>, compression: Compression) -> Result<Self> {
        let buckets: Vec<usize> = servers
            .iter()
            .enumerate()
            .flat_map(|(index, server)| std::iter::repeat(index).take(server.weight() as usize))
            .collect();

        if buckets.is_empty() {
            return Err(Error::Config(format!("{} has no weighted servers", name)));
        }

        Ok(Self {
            name,
            servers,
            buckets,
            compression,
        })
    }

    /// Build the group at `index` of the configuration
    pub fn from_config(index: usize, group: &GroupConfig, client: &ClientConfig) -> Result<Self> {
        let retry_interval = client.retry_interval();
        let servers = group
            .servers
            .iter()
            .map(|s| {
                let address = format!("{}:{}", s.hostname, s.resolved_port()?);
                Ok(Server::new(address, s.weight, s.timeout(), retry_interval))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(group.display_name(index), servers, Compression::from(client))
    }

    /// Probe every server in the group with `version`
    pub fn probe(&self) -> Vec<ServerStatus> {
        self.servers
            .iter()
            .map(|server| ServerStatus {
                address: server.address().to_string(),
                weight: server.weight(),
                version: server.version(),
            })
            .collect()
    }

    /// Server index for `key` on the given failover attempt
    fn select(&self, key: &str, attempt: usize) -> usize {
        let hash = if attempt == 0 {
            crc32fast::hash(key.as_bytes())
        } else {
            crc32fast::hash(format!("{}{}", attempt, key).as_bytes())
        };
        let bucket = ((hash >> 16) & 0x7fff) as usize % self.buckets.len();
        self.buckets[bucket]
    }

    /// Run `op` on the server owning `key`, failing over on connection errors.
    ///
    /// Server replies and rejected keys are returned from the first server
    /// that produced them; another server would answer the same.
    fn with_failover<T>(&self, key: &str, op: impl Fn(&Server) -> Result<T>) -> Result<T> {
        let mut tried = HashSet::new();
        let mut last_error = None;

        for attempt in 0..MAX_FAILOVER_ATTEMPTS {
            if tried.len() == self.servers.len() {
                break;
            }

            let index = self.select(key, attempt);
            if !tried.insert(index) {
                continue;
            }

            let server = &self.servers[index];
            if !server.is_available() {
                tracing::debug!("{}: skipping {} (marked down)", self.name, server.address());
                continue;
            }

            match op(server) {
                Ok(value) => return Ok(value),
                Err(
                    e @ (Error::ServerError { .. } | Error::NotStored(_) | Error::InvalidKey(_)),
                ) => return Err(e),
                Err(e) => {
                    tracing::warn!("{}: {} failed: {}", self.name, server.address(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NoServerAvailable(self.name.clone())))
    }

    /// Compress `data` when it is large enough and compression pays off
    fn encode(&self, data: &[u8]) -> (u32, Vec<u8>) {
        if self.compression.threshold > 0 && data.len() > self.compression.threshold {
            let compressed = lz4_flex::compress_prepend_size(data);
            let limit = data.len() as f64 * (1.0 - self.compression.min_savings);
            if (compressed.len() as f64) < limit {
                return (FLAG_COMPRESSED, compressed);
            }
        }
        (0, data.to_vec())
    }

    fn decode(&self, flags: u32, data: Vec<u8>) -> Result<Vec<u8>> {
        if flags & FLAG_COMPRESSED == 0 {
            return Ok(data);
        }
        lz4_flex::decompress_size_prepended(&data)
            .map_err(|e| Error::Compression(format!("{}: {}", self.name, e)))
    }
}

impl CacheStore for ServerGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.with_failover(key, |server| server.get(key))? {
            Some(value) => self.decode(value.flags, value.data).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], expiry: Expiry) -> Result<()> {
        let (flags, data) = self.encode(value);
        let exptime = expiry.exptime(chrono::Utc::now().timestamp());
        self.with_failover(key, |server| server.set(key, flags, exptime, &data))
    }
}
