//! WolfCache - Replicated Write-Back Cache Records
//!
//! Command line access to records replicated across memcached server
//! groups, plus configuration and liveness checks.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfcache::config::{default_config_path, LoggingConfig, WolfCacheConfig};
use wolfcache::error::{Error, Result};
use wolfcache::memcache;
use wolfcache::store::CacheStore;
use wolfcache::{RecordId, RecordStore};

/// WolfCache - Replicated Write-Back Cache Records
#[derive(Parser)]
#[command(name = "wolfcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a record (or one of its fields) as JSON
    Get {
        /// Record id ([0-9a-z]+)
        #[arg(value_parser = parse_record_id)]
        id: String,

        /// Only print this field
        key: Option<String>,
    },

    /// Set one field of a record, creating the record if needed
    Set {
        /// Record id ([0-9a-z]+)
        #[arg(value_parser = parse_record_id)]
        id: String,

        /// Field name
        key: String,

        /// Field value as JSON (plain text is stored as a string)
        value: String,
    },

    /// Probe every server in every group
    Status,

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfcache.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = cli.log_level.as_deref();
    let result = match cli.command {
        Commands::Init { output, force } => {
            init_logging(&LoggingConfig::default(), level);
            run_init(output, force)
        }
        Commands::Get { id, key } => load_config(&cli.config, level)
            .and_then(|config| run_get(&config, &id, key.as_deref())),
        Commands::Set { id, key, value } => load_config(&cli.config, level)
            .and_then(|config| run_set(&config, &id, key, &value)),
        Commands::Status => load_config(&cli.config, level).and_then(|config| run_status(&config)),
        Commands::Validate => load_config(&cli.config, level)
            .and_then(|config| run_validate(&config, &cli.config)),
    };

    if let Err(e) = result {
        if e.is_fatal() {
            tracing::error!("Fatal: {}", e);
        } else {
            tracing::error!("{}", e);
        }
        std::process::exit(e.exit_code());
    }
}

/// Load configuration and start logging with its settings
fn load_config(path: &Path, level_override: Option<&str>) -> Result<WolfCacheConfig> {
    match WolfCacheConfig::from_file(path) {
        Ok(config) => {
            init_logging(&config.logging, level_override);
            tracing::debug!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        Err(e) => {
            init_logging(&LoggingConfig::default(), level_override);
            tracing::error!("Failed to load configuration from {:?}", path);
            Err(e)
        }
    }
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(logging.level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_record_id(id: &str) -> std::result::Result<String, String> {
    RecordId::parse(id)
        .map(|id| id.to_string())
        .ok_or_else(|| format!("{:?} is not a record id (expected [0-9a-z]+)", id))
}

/// Print a record or one field
fn run_get(config: &WolfCacheConfig, id: &str, key: Option<&str>) -> Result<()> {
    let store = RecordStore::from_config(config)?;

    let Some(record) = store.lookup(id)? else {
        eprintln!("Record {} not found in any group", id);
        return Ok(());
    };

    let output = match key {
        Some(key) => serde_json::to_string_pretty(record.get(key).unwrap_or(&Value::Null))?,
        None => serde_json::to_string_pretty(record.fields())?,
    };
    println!("{}", output);

    if let Some(time) = record.last_commit_time() {
        tracing::info!("Record {} last committed at {}", id, time);
    }
    Ok(())
}

/// Set one field and flush on exit
fn run_set(config: &WolfCacheConfig, id: &str, key: String, value: &str) -> Result<()> {
    let store = RecordStore::from_config(config)?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

    let mut record = store.lookup_or_construct(id)?;
    record.set(key, value);
    let outcome = record.flush()?;
    println!("{:?}", outcome);
    Ok(())
}

/// Probe all servers
fn run_status(config: &WolfCacheConfig) -> Result<()> {
    let groups = memcache::groups_from_config(config)?;
    let mut down = 0;

    for group in &groups {
        println!("{}", group.name());
        for status in group.probe() {
            match status.version {
                Ok(version) => println!(
                    "  ✓ {:<24} weight {:<3} memcached {}",
                    status.address, status.weight, version
                ),
                Err(e) => {
                    down += 1;
                    println!("  ✗ {:<24} weight {:<3} {}", status.address, status.weight, e);
                }
            }
        }
    }

    if down > 0 {
        tracing::warn!("{} server(s) unreachable", down);
    }
    Ok(())
}

fn run_validate(config: &WolfCacheConfig, path: &Path) -> Result<()> {
    println!("✓ Configuration is valid: {}", path.display());
    match config.expiry {
        0 => println!("  Expiry: never"),
        secs => println!("  Expiry: {}s", secs),
    }
    for (index, group) in config.groups.iter().enumerate() {
        println!(
            "  {}: {} server(s)",
            group.display_name(index),
            group.servers.len()
        );
        for server in &group.servers {
            println!(
                "    {}:{} weight {} timeout {}s",
                server.hostname,
                server.resolved_port()?,
                server.weight,
                server.timeout
            );
        }
    }
    Ok(())
}

fn run_init(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        )));
    }

    std::fs::write(&output, WolfCacheConfig::sample())?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to list your memcached server groups.");
    println!("Then check it with: wolfcache --config {} status", output.display());

    Ok(())
}
