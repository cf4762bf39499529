use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub analytics: AnalyticsConfig,
    pub suggestions: SuggestionConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    /// Largest single record the store accepts, if bounded
    pub quota_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Maximum number of events kept in the persisted log
    pub max_events: usize,
    /// Events older than this many days are dropped on every write
    pub retention_days: i64,
    /// Quiet period before buffered events are written out
    pub batch_delay_ms: u64,
    /// Write attempts per batch before it is discarded
    pub max_flush_attempts: u32,
    /// Share of the oldest events evicted after a quota failure
    pub eviction_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    /// Maximum number of cached suggestion lists
    pub cache_capacity: usize,
    /// Seconds a cached list stays valid
    pub cache_ttl_secs: u64,
    /// Shorter inputs (after trimming) get no suggestions
    pub min_query_length: usize,
    /// How far back search history is mined for suggestions
    pub history_window_days: i64,
    /// Result limit used by `SuggestionEngine::default_options`
    pub default_max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub ansi: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("search-intelligence");

        Self {
            path: data_dir.join("store.db"),
            pool_size: 4,
            quota_bytes: None,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            retention_days: 30,
            batch_delay_ms: 100,
            max_flush_attempts: 3,
            eviction_fraction: 0.25,
        }
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            cache_ttl_secs: 300, // 5 minutes
            min_query_length: 2,
            history_window_days: 30,
            default_max_results: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl AnalyticsConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl SuggestionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl AppConfig {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_file_path())
    }

    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        if config_path.exists() {
            let config_content = fs::read_to_string(&config_path)?;
            let config: AppConfig = toml::from_str(&config_content)
                .map_err(|e| AppError::Configuration(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            default_config.save_to(&config_path)?;
            Ok(default_config)
        }
    }

    pub fn save_to(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Configuration(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, config_content)?;
        Ok(())
    }

    /// Get path to configuration file
    pub fn config_file_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("search-intelligence")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.pool_size == 0 {
            return Err(AppError::Configuration("Storage pool size must be greater than 0".to_string()));
        }

        if self.analytics.max_events == 0 {
            return Err(AppError::Configuration("Max events must be greater than 0".to_string()));
        }

        if self.analytics.batch_delay_ms == 0 {
            return Err(AppError::Configuration("Batch delay must be greater than 0".to_string()));
        }

        if self.analytics.max_flush_attempts == 0 {
            return Err(AppError::Configuration("Flush attempts must be greater than 0".to_string()));
        }

        if !(0.0..1.0).contains(&self.analytics.eviction_fraction) || self.analytics.eviction_fraction == 0.0 {
            return Err(AppError::Configuration("Eviction fraction must be in (0, 1)".to_string()));
        }

        if self.suggestions.cache_capacity == 0 {
            return Err(AppError::Configuration("Cache capacity must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Ensure the storage directory exists
    pub fn prepare_storage_dir(&self) -> Result<()> {
        if let Some(parent) = self.storage.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
