//! # Configuration
//!
//! Settings for the orchestrator, the background worker and the local store.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PANTRY_DEVICE_ID=abc-123                                           │
//! │     PANTRY_SYNC_MODE=manual                                            │
//! │     PANTRY_DB_PATH=/data/pantry.db                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pantry/pantry.toml (Linux)                               │
//! │     ~/Library/Application Support/app.pantry.pantry/pantry.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, auto-generated device_id                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Kitchen tablet"
//!
//! [sync]
//! mode = "auto"          # auto | manual | disabled
//! batch_size = 100
//! fan_out = 4
//! poll_interval_secs = 30
//! max_attempts = 10
//!
//! [inventory]
//! default_window_days = 3
//!
//! [database]
//! path = "pantry.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pantry_core::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// How the background worker drives sync.
///
/// ```text
/// AUTO      interval ticks + connectivity edges + explicit triggers
/// MANUAL    connectivity edges + explicit triggers only
/// DISABLED  worker never drains; writes still enqueue metadata
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Disabled,
}

impl SyncMode {
    /// Returns true if the worker polls on an interval.
    pub fn polls(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }

    /// Returns true if sync is enabled at all.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Disabled)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "manual" => Ok(SyncMode::Manual),
            "disabled" | "off" => Ok(SyncMode::Disabled),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, disabled",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Pantry device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Drain and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// Records collected per drain, per state.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Items pushed concurrently during a drain.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// Interval between worker drains (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Failed attempts after which a record is left alone.
    /// Set to 0 to retry forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for retry delays (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_batch_size() -> u32 {
    100
}
fn default_fan_out() -> usize {
    4
}
fn default_poll_interval() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    300
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            batch_size: default_batch_size(),
            fan_out: default_fan_out(),
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// =============================================================================
// Inventory Settings
// =============================================================================

/// Defaults for expiry views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,

    #[serde(default = "default_max_window_days")]
    pub max_window_days: u32,
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}
fn default_max_window_days() -> u32 {
    MAX_WINDOW_DAYS
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            default_window_days: default_window_days(),
            max_window_days: default_max_window_days(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Local store location and pool size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Relative paths resolve against the platform data dir.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pantry.db")
}
fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Builds the pool configuration for `pantry_db::Database::new`.
    pub fn to_db_config(&self) -> pantry_db::DbConfig {
        let path = if self.path.is_absolute() {
            self.path.clone()
        } else {
            PantryConfig::project_dirs()
                .map(|dirs| dirs.data_dir().join(&self.path))
                .unwrap_or_else(|| self.path.clone())
        };
        pantry_db::DbConfig::new(path).max_connections(self.max_connections)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PantryConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl PantryConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (pantry.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig("batch_size must be greater than 0".into()));
        }

        if self.sync.fan_out == 0 {
            return Err(SyncError::InvalidConfig("fan_out must be greater than 0".into()));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.initial_backoff_ms > self.sync.max_backoff_secs.saturating_mul(1000) {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_secs".into(),
            ));
        }

        if self.inventory.max_window_days > MAX_WINDOW_DAYS {
            return Err(SyncError::InvalidConfig(format!(
                "max_window_days must be at most {}",
                MAX_WINDOW_DAYS
            )));
        }

        if self.inventory.default_window_days > self.inventory.max_window_days {
            return Err(SyncError::InvalidConfig(
                "default_window_days must not exceed max_window_days".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("PANTRY_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("PANTRY_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(mode) = std::env::var("PANTRY_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Ok(interval) = std::env::var("PANTRY_POLL_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.sync.poll_interval_secs = secs;
            }
        }

        if let Ok(fan_out) = std::env::var("PANTRY_SYNC_FAN_OUT") {
            if let Ok(n) = fan_out.parse::<usize>() {
                self.sync.fan_out = n;
            }
        }

        if let Ok(path) = std::env::var("PANTRY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("app", "pantry", "pantry")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("pantry.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!("MANUAL".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!("off".parse::<SyncMode>().unwrap(), SyncMode::Disabled);
        assert!("sometimes".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = PantryConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.sync.mode, SyncMode::Auto);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.inventory.default_window_days, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PantryConfig::default();

        config.device.id = String::new();
        assert!(matches!(config.validate(), Err(SyncError::MissingDeviceId)));

        config.device.id = "test".to_string();
        config.sync.fan_out = 0;
        assert!(config.validate().is_err());

        config.sync.fan_out = 2;
        config.inventory.default_window_days = 400;
        assert!(config.validate().is_err());

        config.inventory.default_window_days = 7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PantryConfig = toml::from_str(
            r#"
            [device]
            id = "kitchen"

            [sync]
            mode = "manual"
            fan_out = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.device.name, "Pantry device");
        assert_eq!(config.sync.mode, SyncMode::Manual);
        assert_eq!(config.sync.fan_out, 8);
        assert_eq!(config.sync.max_attempts, 10);
        assert_eq!(config.database.path, PathBuf::from("pantry.db"));
    }

    #[test]
    fn test_toml_serialization() {
        let config = PantryConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[inventory]"));
    }
}
