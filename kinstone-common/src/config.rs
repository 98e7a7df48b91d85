//! Configuration loading and database path resolution
//!
//! Every field has a compiled default, so a missing config file is never fatal.

use crate::time::millis_to_duration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the database path
pub const DATABASE_ENV_VAR: &str = "KINSTONE_DATABASE";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "KINSTONE_CONFIG";

/// Top-level service configuration (TOML)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    /// SQLite database file. `None` falls through to env/OS default.
    pub database_path: Option<PathBuf>,
    /// HTTP listen address
    pub bind_addr: String,
    /// Capacity given to new inventories when the request does not name one
    pub default_inventory_capacity: i64,
    pub database: DatabaseConfig,
    pub locks: LockConfig,
    pub logging: LoggingConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            bind_addr: "127.0.0.1:5780".to_string(),
            default_inventory_capacity: 50,
            database: DatabaseConfig::default(),
            locks: LockConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Maximum pooled connections
    pub max_connections: u32,
    /// SQLite busy_timeout - time to wait for the write lock before erroring
    pub busy_timeout_ms: u64,
    /// Time to wait for a free pooled connection
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout_ms: 5000,
            acquire_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        millis_to_duration(self.busy_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        millis_to_duration(self.acquire_timeout_ms)
    }
}

/// Entry lock table settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    /// How long an operation waits for another to release an entry
    pub wait_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5000,
        }
    }
}

impl LockConfig {
    pub fn wait_timeout(&self) -> Duration {
        millis_to_duration(self.wait_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive (RUST_LOG wins when set)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FusionConfig {
    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections < 1 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.default_inventory_capacity < 1 {
            return Err(Error::Config(
                "default_inventory_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
///
/// A missing file yields defaults with a warning. A file that exists but
/// cannot be read or parsed is an error.
pub fn load_config(path: &Path) -> Result<FusionConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using compiled defaults",
            path.display()
        );
        return Ok(FusionConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: FusionConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write configuration to a TOML file, creating parent directories
pub fn write_config(config: &FusionConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolve the config file location
///
/// Priority: command-line argument, environment variable, OS config dir.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .map(|d| d.join("kinstone").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("kinstone.toml"))
}

/// Resolve the database file location
///
/// Priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &FusionConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.database_path {
        return path.clone();
    }

    default_database_path()
}

/// Get OS-dependent default database path
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("kinstone").join("kinstone.db"))
        .unwrap_or_else(|| PathBuf::from("./kinstone_data/kinstone.db"))
}
