//! WolfCache Configuration
//!
//! This module provides the configuration structures for the replicated
//! record store: the memcached server groups, the expiry policy, client
//! tuning and logging.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::Expiry;

/// Environment variable consulted for the default memcached port
pub const PORT_ENV_VAR: &str = "WOLFCACHE_MEMCACHE_PORT";

/// Port used when neither the server entry nor the environment sets one
pub const DEFAULT_PORT: u16 = 11211;

/// Main WolfCache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WolfCacheConfig {
    /// Expiry in seconds for written records (0 = never expire)
    #[serde(default)]
    pub expiry: i64,

    /// Server groups; every record is replicated once per group
    #[serde(default)]
    pub groups: Vec<GroupConfig>,

    /// Memcached client tuning
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One independent server group
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Display name used in logs (defaults to `group-<n>`)
    #[serde(default)]
    pub name: Option<String>,

    /// Physical servers sharing this group's key space
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// One physical memcached server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host name or IP address
    pub hostname: String,

    /// TCP port (defaults to $WOLFCACHE_MEMCACHE_PORT, then 11211)
    #[serde(default)]
    pub port: Option<u16>,

    /// Relative share of the group's keys
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Connect/read/write timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Memcached client tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Seconds a failed server is skipped before it is tried again
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Values larger than this many bytes are compressed (0 disables)
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold: usize,

    /// Minimum fraction of space compression must save to be kept
    #[serde(default = "default_compress_min_savings")]
    pub compress_min_savings: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_weight() -> u32 {
    1
}

fn default_timeout() -> u64 {
    3
}

fn default_retry_interval() -> u64 {
    15
}

fn default_compress_threshold() -> usize {
    20_000
}

fn default_compress_min_savings() -> f64 {
    0.2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl ClientConfig {
    /// Get the failed-server retry interval as Duration
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
            compress_threshold: default_compress_threshold(),
            compress_min_savings: default_compress_min_savings(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ServerConfig {
    /// Resolve the port, falling back to the environment and then 11211
    pub fn resolved_port(&self) -> crate::Result<u16> {
        if let Some(port) = self.port {
            return Ok(port);
        }

        match std::env::var(PORT_ENV_VAR) {
            Ok(value) => value.trim().parse::<u16>().map_err(|_| {
                crate::Error::Config(format!(
                    "{} must be a port number between 0 and 65535, got {:?}",
                    PORT_ENV_VAR, value
                ))
            }),
            Err(_) => Ok(DEFAULT_PORT),
        }
    }

    /// Get the server timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl GroupConfig {
    /// Name of the group at `index`, used in logs and status output
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("group-{}", index + 1))
    }
}

impl WolfCacheConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfCacheConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.groups.is_empty() {
            return Err(crate::Error::Config(
                "at least one server group must be configured".into(),
            ));
        }

        for (index, group) in self.groups.iter().enumerate() {
            let name = group.display_name(index);

            if group.servers.is_empty() {
                return Err(crate::Error::Config(format!(
                    "{} has no servers",
                    name
                )));
            }

            for server in &group.servers {
                if server.hostname.trim().is_empty() {
                    return Err(crate::Error::Config(format!(
                        "{}: server hostname cannot be empty",
                        name
                    )));
                }
                if server.weight == 0 {
                    return Err(crate::Error::Config(format!(
                        "{}: weight of {} must be a positive integer",
                        name, server.hostname
                    )));
                }
                if server.timeout == 0 {
                    return Err(crate::Error::Config(format!(
                        "{}: timeout of {} must be a positive integer",
                        name, server.hostname
                    )));
                }
                server.resolved_port()?;
            }
        }

        if self.expiry < 0 {
            return Err(crate::Error::Config(format!(
                "expiry must be 0 or a positive number of seconds, got {}",
                self.expiry
            )));
        }

        if !(0.0..1.0).contains(&self.client.compress_min_savings) {
            return Err(crate::Error::Config(format!(
                "client.compress_min_savings must be in [0, 1), got {}",
                self.client.compress_min_savings
            )));
        }

        Ok(())
    }

    /// Get the expiry policy for written records
    pub fn expiry(&self) -> Expiry {
        if self.expiry == 0 {
            Expiry::Never
        } else {
            Expiry::After(self.expiry as u64)
        }
    }

    /// Render a sample configuration file
    pub fn sample() -> String {
        r#"# WolfCache configuration

# Seconds until written records expire (0 = never)
expiry = 0

[client]
retry_interval_secs = 15
compress_threshold = 20000
compress_min_savings = 0.2

[logging]
level = "info"
format = "pretty"

[[groups]]
name = "primary"
servers = [
  { hostname = "127.0.0.1", port = 11211, weight = 1, timeout = 3 },
]

[[groups]]
name = "secondary"
servers = [
  { hostname = "127.0.0.1", port = 11212 },
]
"#
        .to_string()
    }
}

/// Configuration path used by the CLI when `--config` is not given
pub fn default_config_path() -> PathBuf {
    PathBuf::from("wolfcache.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
expiry = 3600

[[groups]]
name = "east"
servers = [
  { hostname = "10.0.0.1", port = 11211, weight = 2, timeout = 1 },
  { hostname = "10.0.0.2", port = 11211 },
]

[[groups]]
servers = [{ hostname = "10.0.1.1", port = 11311 }]
"#;

        let config = WolfCacheConfig::from_str(toml).unwrap();
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups[0].display_name(0), "east");
        assert_eq!(config.groups[1].display_name(1), "group-2");
        assert_eq!(config.groups[0].servers[0].weight, 2);
        assert_eq!(config.groups[0].servers[1].weight, 1);
        assert_eq!(config.groups[0].servers[1].timeout, 3);
        assert_eq!(config.expiry(), Expiry::After(3600));
        assert_eq!(config.client.compress_threshold, 20_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = WolfCacheConfig::from_str(&WolfCacheConfig::sample()).unwrap();
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.expiry(), Expiry::Never);
    }

    #[test]
    fn test_rejects_missing_groups() {
        let err = WolfCacheConfig::from_str("expiry = 0").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rejects_empty_group() {
        let toml = r#"
[[groups]]
servers = []
"#;
        assert!(WolfCacheConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_weight = r#"
[[groups]]
servers = [{ hostname = "a", port = 1, weight = 0 }]
"#;
        assert!(WolfCacheConfig::from_str(zero_weight).is_err());

        let zero_timeout = r#"
[[groups]]
servers = [{ hostname = "a", port = 1, timeout = 0 }]
"#;
        assert!(WolfCacheConfig::from_str(zero_timeout).is_err());

        let negative_expiry = r#"
expiry = -5
[[groups]]
servers = [{ hostname = "a", port = 1 }]
"#;
        assert!(WolfCacheConfig::from_str(negative_expiry).is_err());

        let blank_host = r#"
[[groups]]
servers = [{ hostname = "  ", port = 1 }]
"#;
        assert!(WolfCacheConfig::from_str(blank_host).is_err());
    }

    #[test]
    fn test_rejects_non_numeric_port() {
        let toml = r#"
[[groups]]
servers = [{ hostname = "a", port = "eleven" }]
"#;
        let err = WolfCacheConfig::from_str(toml).unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));

        let out_of_range = r#"
[[groups]]
servers = [{ hostname = "a", port = 70000 }]
"#;
        assert!(WolfCacheConfig::from_str(out_of_range).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wolfcache.toml");
        std::fs::write(&path, WolfCacheConfig::sample()).unwrap();

        let config = WolfCacheConfig::from_file(&path).unwrap();
        assert_eq!(config.groups[1].display_name(1), "secondary");

        let missing = WolfCacheConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(crate::Error::Config(_))));
    }
}
