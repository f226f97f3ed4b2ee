use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::db::PullPolicy;

const DEFAULT_LOG_FILTER: &str = "versetrack=info";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Remote table API connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Project base URL (e.g., "https://abc.supabase.co")
    pub url: Option<String>,
    /// Static API key, sent as both `apikey` and bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Returns true if the remote is configured (has both url and api_key)
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }
}

/// Background sync tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// First retry delay after a failed push
    pub min_backoff_ms: u64,
    /// Retry delay ceiling
    pub max_backoff_ms: u64,
    /// Quiet period before a requested sync runs
    pub debounce_ms: u64,
    /// How often to check that the remote is reachable
    pub probe_interval_secs: u64,
    /// Pull every table when `run` starts
    pub pull_on_start: bool,
    /// What a pull does with rows that have unpushed local edits
    pub pull_policy: PullPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 10_000,
            max_backoff_ms: 18_000_000,
            debounce_ms: 500,
            probe_interval_secs: 30,
            pull_on_start: true,
            pull_policy: PullPolicy::default(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// tracing-subscriber filter directive
    pub log_filter: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    log_filter: Option<String>,
    remote: Option<RemoteConfig>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading overrides through `env` instead of the
    /// process environment.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_db_path = Self::default_data_dir().join("versetrack.db");

        // Start with defaults
        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut log_filter =
            ConfigValue::new(DEFAULT_LOG_FILTER.to_string(), ConfigSource::Default);
        let mut config_file = None;
        let mut remote = RemoteConfig::default();
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(filter) = file_config.log_filter {
                log_filter = ConfigValue::new(filter, ConfigSource::File);
            }
            if let Some(remote_config) = file_config.remote {
                remote = remote_config;
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Some(db_path) = env("VERSETRACK_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(filter) = env("VERSETRACK_LOG") {
            log_filter = ConfigValue::new(filter, ConfigSource::Environment);
        }
        if let Some(url) = env("VERSETRACK_REMOTE_URL") {
            remote.url = Some(url);
        }
        if let Some(key) = env("VERSETRACK_REMOTE_API_KEY") {
            remote.api_key = Some(key);
        }

        let config = Self {
            database_path,
            log_filter,
            config_file,
            remote,
            sync,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.min_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.min_backoff_ms must be greater than zero".to_string(),
            ));
        }
        if self.sync.max_backoff_ms < self.sync.min_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "sync.max_backoff_ms ({}) is below sync.min_backoff_ms ({})",
                self.sync.max_backoff_ms, self.sync.min_backoff_ms
            )));
        }
        if self.sync.probe_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.probe_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/versetrack/
    /// - macOS: ~/Library/Application Support/versetrack/
    /// - Windows: %APPDATA%/versetrack/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("versetrack")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/versetrack/
    /// - macOS: ~/Library/Application Support/versetrack/
    /// - Windows: %APPDATA%/versetrack/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("versetrack")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
