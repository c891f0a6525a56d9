//! Configuration module for the handler runtime.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SLASHSYNC_` and use double
//! underscores to separate nested levels:
//! - `SLASHSYNC_WATCHER__POLL_INTERVAL_MS=250` sets `watcher.poll_interval_ms`
//! - `SLASHSYNC_UNITS__TRANSPILE=false` sets `units.transpile`
//! - `SLASHSYNC_PLATFORM__APPLICATION_ID=123` sets `platform.application_id`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default settings file name, looked up in the working directory.
pub const SETTINGS_FILE: &str = "slashsync.toml";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "SLASHSYNC_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Where handler units live and how they are loaded
    #[serde(default)]
    pub units: UnitsConfig,

    /// Change detection loop
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Manifest synchronization
    #[serde(default)]
    pub sync: SyncConfig,

    /// Remote platform access
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UnitsConfig {
    /// Directory holding command units
    #[serde(default = "default_commands_dir")]
    pub commands_dir: PathBuf,

    /// Directory holding event units
    #[serde(default = "default_events_dir")]
    pub events_dir: PathBuf,

    /// Materialize TOML units as transient JSON siblings before loading
    #[serde(default = "default_true")]
    pub transpile: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Start the polling loop after the initial load
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay between the end of one tick and the start of the next
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Targets whose manifest matches an already pushed one share that push
    #[serde(default = "default_true")]
    pub share_identical_manifests: bool,

    /// Push to every target after a successful manual registration
    #[serde(default = "default_true")]
    pub broadcast_on_register: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlatformConfig {
    /// REST API root
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Application id; discovered from the credential when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,

    /// Environment variable carrying the credential
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Local environment file the credential is persisted into
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Targets served by the dry-run platform
    #[serde(default)]
    pub dry_run_targets: Vec<TargetConfig>,
}

/// A deployment target declared in configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every module
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `"slashsync::sync" = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_commands_dir() -> PathBuf {
    PathBuf::from("commands")
}
fn default_events_dir() -> PathBuf {
    PathBuf::from("events")
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}
fn default_token_env() -> String {
    "TOKEN".to_string()
}
fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            units: UnitsConfig::default(),
            watcher: WatcherConfig::default(),
            sync: SyncConfig::default(),
            platform: PlatformConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            commands_dir: default_commands_dir(),
            events_dir: default_events_dir(),
            transpile: true,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            share_identical_manifests: true,
            broadcast_on_register: true,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            application_id: None,
            token_env: default_token_env(),
            env_file: default_env_file(),
            request_timeout_secs: default_request_timeout_secs(),
            dry_run_targets: vec![TargetConfig {
                id: "local".to_string(),
                name: "Local".to_string(),
            }],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, using `slashsync.toml` in the
    /// working directory when present.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(SETTINGS_FILE)
    }

    /// Load configuration from a specific file.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores stay
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file and the unit directories it names.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings::default();
        settings.save(&config_path)?;

        for dir in [&settings.units.commands_dir, &settings.units.events_dir] {
            std::fs::create_dir_all(dir)?;
        }

        Ok(config_path)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.watcher.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.units.commands_dir, PathBuf::from("commands"));
        assert_eq!(settings.units.events_dir, PathBuf::from("events"));
        assert!(settings.units.transpile);
        assert_eq!(settings.watcher.poll_interval_ms, 100);
        assert_eq!(settings.platform.token_env, "TOKEN");
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("slashsync.toml");

        let toml_content = r#"
version = 2

[units]
commands_dir = "bot/commands"
transpile = false

[watcher]
poll_interval_ms = 250

[sync]
share_identical_manifests = false

[[platform.dry_run_targets]]
id = "g1"
name = "First"

[[platform.dry_run_targets]]
id = "g2"

[logging.modules]
"slashsync::sync" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.units.commands_dir, PathBuf::from("bot/commands"));
        assert_eq!(settings.units.events_dir, PathBuf::from("events"));
        assert!(!settings.units.transpile);
        assert_eq!(settings.watcher.poll_interval_ms, 250);
        assert!(!settings.sync.share_identical_manifests);
        assert!(settings.sync.broadcast_on_register);
        assert_eq!(settings.platform.dry_run_targets.len(), 2);
        assert_eq!(settings.platform.dry_run_targets[1].name, "");
        assert_eq!(settings.logging.modules["slashsync::sync"], "debug");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("slashsync.toml");

        let mut settings = Settings::default();
        settings.watcher.poll_interval_ms = 42;
        settings.platform.application_id = Some("1234".to_string());

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watcher.poll_interval_ms, 42);
        assert_eq!(loaded.platform.application_id.as_deref(), Some("1234"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.watcher.poll_interval_ms, 100);
        assert_eq!(settings.platform.dry_run_targets[0].id, "local");
    }
}
