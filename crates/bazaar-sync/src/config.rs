//! # Offline Configuration
//!
//! Tunables of the mutation queue, the sync engine and the cached resources.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BAZAAR_MAX_ATTEMPTS=8                                              │
//! │     BAZAAR_REFRESH_INTERVAL_SECS=120                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/bazaar-mobile/offline.toml (Linux)                       │
//! │     <app sandbox>/Library/Application Support/... (iOS)                │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [queue]
//! max_attempts = 5
//! retry_interval_secs = 30
//! completed_retention_hours = 24
//! inter_item_delay_ms = 250
//! retry_permanent_errors = true
//! storage_key = "offline.mutation_queue"
//!
//! [sync]
//! refresh_interval_secs = 300
//! event_capacity = 256
//!
//! [[resources]]
//! name = "listings"
//! max_size = 100
//! ttl_secs = 900
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use bazaar_core::DEFAULT_MAX_ATTEMPTS;
use bazaar_store::repository::DEFAULT_MUTATION_KEY;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Queue Settings
// =============================================================================

/// Mutation queue behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Upload attempts before a mutation is marked `failed`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Period of the background drain timer (seconds).
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// How long `completed` records are kept before pruning (hours).
    #[serde(default = "default_retention_hours")]
    pub completed_retention_hours: u64,

    /// Pause between two uploads of one drain pass (milliseconds).
    #[serde(default = "default_inter_item_delay")]
    pub inter_item_delay_ms: u64,

    /// Whether permanent (4xx) errors consume attempts like transient ones.
    /// `false` fails such mutations on the first rejection.
    #[serde(default = "default_true")]
    pub retry_permanent_errors: bool,

    /// Storage key of the persisted mutation list.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_retry_interval() -> u64 {
    30
}
fn default_retention_hours() -> u64 {
    24
}
fn default_inter_item_delay() -> u64 {
    250
}
fn default_true() -> bool {
    true
}
fn default_storage_key() -> String {
    DEFAULT_MUTATION_KEY.to_string()
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            max_attempts: default_max_attempts(),
            retry_interval_secs: default_retry_interval(),
            completed_retention_hours: default_retention_hours(),
            inter_item_delay_ms: default_inter_item_delay(),
            retry_permanent_errors: true,
            storage_key: default_storage_key(),
        }
    }
}

impl QueueSettings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.completed_retention_hours as i64)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync engine behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Period of the background refresh timer (seconds).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Events buffered per subscriber before the slowest one starts lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_refresh_interval() -> u64 {
    300
}
fn default_event_capacity() -> usize {
    256
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            refresh_interval_secs: default_refresh_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SyncSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

// =============================================================================
// Resource Settings
// =============================================================================

/// One server resource mirrored into a [`bazaar_core::BoundedCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSettings {
    pub name: String,

    /// Entry limit of the resource's cache.
    pub max_size: usize,

    /// Entry lifetime. Absent means entries never expire.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl ResourceSettings {
    pub fn new(name: impl Into<String>, max_size: usize, ttl_secs: Option<u64>) -> Self {
        ResourceSettings {
            name: name.into(),
            max_size,
            ttl_secs,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

fn default_resources() -> Vec<ResourceSettings> {
    vec![
        ResourceSettings::new("listings", 100, Some(15 * 60)),
        ResourceSettings::new("categories", 50, Some(24 * 60 * 60)),
        ResourceSettings::new("profile", 10, Some(6 * 60 * 60)),
        ResourceSettings::new("favorites", 100, Some(60 * 60)),
    ]
}

// =============================================================================
// Main Offline Configuration
// =============================================================================

/// Complete offline-layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineConfig {
    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceSettings>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        OfflineConfig {
            queue: QueueSettings::default(),
            sync: SyncSettings::default(),
            resources: default_resources(),
        }
    }
}

impl OfflineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (offline.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading offline config from file");
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
            warn!("Failed to load offline config: {}. Using defaults.", e);
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

        info!(?path, "Offline config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.queue.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.max_attempts must be greater than 0".into(),
            ));
        }

        if self.queue.retry_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.retry_interval_secs must be greater than 0".into(),
            ));
        }

        if self.queue.storage_key.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "queue.storage_key must not be empty".into(),
            ));
        }

        if self.sync.refresh_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.refresh_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.event_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.event_capacity must be greater than 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.name.trim().is_empty() {
                return Err(SyncError::InvalidConfig(
                    "resource name must not be empty".into(),
                ));
            }
            if !seen.insert(resource.name.as_str()) {
                return Err(SyncError::InvalidConfig(format!(
                    "resource '{}' is configured twice",
                    resource.name
                )));
            }
            if resource.max_size == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "resource '{}' max_size must be greater than 0",
                    resource.name
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("BAZAAR_MAX_ATTEMPTS") {
            match value.parse::<u32>() {
                Ok(n) => {
                    debug!(max_attempts = n, "Overriding max attempts from environment");
                    self.queue.max_attempts = n;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid BAZAAR_MAX_ATTEMPTS"),
            }
        }

        if let Some(value) = lookup("BAZAAR_RETRY_INTERVAL_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                self.queue.retry_interval_secs = secs;
            }
        }

        if let Some(value) = lookup("BAZAAR_RETENTION_HOURS") {
            if let Ok(hours) = value.parse::<u64>() {
                self.queue.completed_retention_hours = hours;
            }
        }

        if let Some(value) = lookup("BAZAAR_REFRESH_INTERVAL_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                debug!(secs, "Overriding refresh interval from environment");
                self.sync.refresh_interval_secs = secs;
            }
        }

        if let Some(key) = lookup("BAZAAR_STORAGE_KEY") {
            self.queue.storage_key = key;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bazaar", "mobile")
            .map(|dirs| dirs.config_dir().join("offline.toml"))
    }

    /// Returns the settings of `name`, if tracked.
    pub fn resource(&self, name: &str) -> Option<&ResourceSettings> {
        self.resources.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = OfflineConfig::default();
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.retry_interval(), Duration::from_secs(30));
        assert_eq!(config.queue.retention(), chrono::Duration::hours(24));
        assert!(config.queue.retry_permanent_errors);
        assert_eq!(config.queue.storage_key, "offline.mutation_queue");
        assert_eq!(config.sync.refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.resources.len(), 4);
        assert_eq!(
            config.resource("listings").and_then(|r| r.ttl()),
            Some(Duration::from_secs(900))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = OfflineConfig::default();
        config.queue.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = OfflineConfig::default();
        config.resources.push(ResourceSettings::new("listings", 10, None));
        assert!(config.validate().is_err());

        let mut config = OfflineConfig::default();
        config.resources[0].max_size = 0;
        assert!(config.validate().is_err());

        let mut config = OfflineConfig::default();
        config.sync.event_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("BAZAAR_MAX_ATTEMPTS", "8"),
            ("BAZAAR_RETRY_INTERVAL_SECS", "not-a-number"),
            ("BAZAAR_REFRESH_INTERVAL_SECS", "60"),
            ("BAZAAR_STORAGE_KEY", "test.queue"),
        ]
        .into_iter()
        .collect();

        let mut config = OfflineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.queue.max_attempts, 8);
        assert_eq!(config.queue.retry_interval_secs, 30);
        assert_eq!(config.sync.refresh_interval_secs, 60);
        assert_eq!(config.queue.storage_key, "test.queue");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OfflineConfig = toml::from_str(
            r#"
            [queue]
            max_attempts = 3

            [[resources]]
            name = "listings"
            max_size = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.inter_item_delay_ms, 250);
        assert_eq!(config.sync.event_capacity, 256);
        assert_eq!(config.resources, vec![ResourceSettings::new("listings", 20, None)]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("offline.toml");

        let mut config = OfflineConfig::default();
        config.queue.retry_permanent_errors = false;
        config.save(Some(path.clone())).unwrap();

        let loaded = OfflineConfig::load(Some(path)).unwrap();
        assert!(!loaded.queue.retry_permanent_errors);
        assert_eq!(loaded.resources, config.resources);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.toml");
        std::fs::write(&path, "[queue]\nmax_attempts = 0\n").unwrap();

        assert!(OfflineConfig::load(Some(path.clone())).is_err());
        assert_eq!(OfflineConfig::load_or_default(Some(path)), OfflineConfig::default());
    }
}
