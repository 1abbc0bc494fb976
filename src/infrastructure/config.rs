//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional config file, then `XKCD_SYNC__SECTION__KEY` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::domain::ExcludedComics;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub xkcd: XkcdConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Remote archive and sync behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XkcdConfig {
    /// Base URL serving `info.0.json` records
    pub comic_base_url: String,

    /// Base URL serving `/comics/<file>` images
    pub image_base_url: String,

    /// Comic numbers never fetched nor cached
    pub excluded_comic_numbers: ExcludedComics,

    /// Ids per fetch/persist batch; also the per-batch concurrency bound
    pub batch_size: usize,

    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub initial_delay_minutes: u64,
    pub interval_minutes: u64,
}

/// S3-compatible object storage (Garage, MinIO, AWS)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub credentials: StorageCredentials,
    pub presign_expiry_seconds: u64,
    pub force_path_style: bool,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://data/xkcd.db`
    pub url: String,
    pub max_connections: u32,
}

/// HTTP client settings shared by the comic and image clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_seconds: u64,
    pub response_timeout_seconds: u64,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub max_requests_per_second: u32,
    pub pool_max_idle_per_host: usize,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,

    /// Directory for log files, relative to the working directory
    pub log_directory: String,
    pub file_name: String,

    /// "daily" or "never"
    pub rotation: String,
}

impl Default for XkcdConfig {
    fn default() -> Self {
        Self {
            comic_base_url: defaults::COMIC_BASE_URL.to_string(),
            image_base_url: defaults::IMAGE_BASE_URL.to_string(),
            excluded_comic_numbers: ExcludedComics::new(defaults::EXCLUDED_COMIC_NUMBERS.iter().copied()),
            batch_size: defaults::BATCH_SIZE,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay_minutes: defaults::SCHEDULER_INITIAL_DELAY_MINUTES,
            interval_minutes: defaults::SCHEDULER_INTERVAL_MINUTES,
        }
    }
}

impl SchedulerConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_minutes * 60)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::STORAGE_ENDPOINT.to_string(),
            region: defaults::STORAGE_REGION.to_string(),
            bucket: defaults::STORAGE_BUCKET.to_string(),
            credentials: StorageCredentials::default(),
            presign_expiry_seconds: defaults::PRESIGN_EXPIRY_SECONDS,
            force_path_style: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            connect_timeout_seconds: defaults::CONNECT_TIMEOUT_SECONDS,
            response_timeout_seconds: defaults::RESPONSE_TIMEOUT_SECONDS,
            follow_redirects: true,
            max_redirects: defaults::MAX_REDIRECTS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            pool_max_idle_per_host: defaults::POOL_MAX_IDLE_PER_HOST,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_directory: defaults::LOG_DIRECTORY.to_string(),
            file_name: defaults::LOG_FILE_NAME.to_string(),
            rotation: defaults::LOG_ROTATION.to_string(),
        }
    }
}

impl AppConfig {
    /// Environment variable prefix, e.g. `XKCD_SYNC__STORAGE__BUCKET`
    pub const ENV_PREFIX: &'static str = "XKCD_SYNC";

    /// Load defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            info!("Loading configuration from: {:?}", path);
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("xkcd.excluded_comic_numbers")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.xkcd.batch_size == 0 {
            return Err(validation("xkcd.batch_size must be greater than 0"));
        }

        if self.xkcd.scheduler.interval_minutes == 0 {
            return Err(validation("xkcd.scheduler.interval_minutes must be greater than 0"));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(validation("storage.bucket must be set"));
        }

        if self.http.max_requests_per_second == 0 {
            return Err(validation("http.max_requests_per_second must be greater than 0"));
        }

        for (name, value) in [
            ("xkcd.comic_base_url", &self.xkcd.comic_base_url),
            ("xkcd.image_base_url", &self.xkcd.image_base_url),
        ] {
            url::Url::parse(value).map_err(|e| validation(&format!("{name} is not a valid URL ({value}): {e}")))?;
        }

        Ok(())
    }
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}

/// Default configuration values
pub mod defaults {
    /// Remote archive serving `info.0.json`
    pub const COMIC_BASE_URL: &str = "https://xkcd.com";

    /// Image host serving `/comics/<file>`
    pub const IMAGE_BASE_URL: &str = "https://imgs.xkcd.com";

    /// Comic 404 intentionally does not exist upstream
    pub const EXCLUDED_COMIC_NUMBERS: &[i32] = &[404];

    /// Ids per batch and per-batch fetch concurrency
    pub const BATCH_SIZE: usize = 100;

    pub const SCHEDULER_INITIAL_DELAY_MINUTES: u64 = 1;
    pub const SCHEDULER_INTERVAL_MINUTES: u64 = 60;

    pub const STORAGE_ENDPOINT: &str = "http://localhost:3900";
    pub const STORAGE_REGION: &str = "garage";
    pub const STORAGE_BUCKET: &str = "xkcd";
    pub const PRESIGN_EXPIRY_SECONDS: u64 = 3600;

    pub const DATABASE_URL: &str = "sqlite://data/xkcd.db";
    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const USER_AGENT: &str = "xkcd-sync/0.1";
    pub const CONNECT_TIMEOUT_SECONDS: u64 = 10;
    pub const RESPONSE_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_REDIRECTS: usize = 20;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 20;
    pub const POOL_MAX_IDLE_PER_HOST: usize = 20;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_DIRECTORY: &str = "logs";
    pub const LOG_FILE_NAME: &str = "xkcd-sync.log";
    pub const LOG_ROTATION: &str = "daily";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.xkcd.batch_size, 100);
        assert!(config.xkcd.excluded_comic_numbers.contains(404));
        assert_eq!(config.xkcd.scheduler.interval(), Duration::from_secs(3600));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = AppConfig::default();
        config.xkcd.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn blank_bucket_is_rejected() {
        let mut config = AppConfig::default();
        config.storage.bucket = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let mut config = AppConfig::default();
        config.xkcd.comic_base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn secret_key_is_redacted_in_debug_output() {
        let credentials = StorageCredentials {
            access_key: "GK123".into(),
            secret_key: "hunter2".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("GK123"));
        assert!(!rendered.contains("hunter2"));
    }
}
