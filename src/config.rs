use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

const ENV_PREFIX: &str = "EVENT_SEARCH";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Search cluster and index settings
    #[validate(nested)]
    pub elasticsearch: ElasticsearchSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::from_file(config_path)
    }

    /// Load the embedded defaults overridden by `path` (if it exists) and the
    /// environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().into_owned();

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&path).required(false))
            // Override with environment variables (prefix: EVENT_SEARCH__)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}

/// Settings the index coordinator reads once at startup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ElasticsearchSettings {
    /// Comma-separated cluster endpoints
    #[validate(length(min = 1))]
    pub connection_string: String,

    /// Shards for newly created indexes
    #[serde(default = "default_shards")]
    #[validate(range(min = 1))]
    pub number_of_shards: u32,

    /// Replicas for newly created indexes
    #[serde(default)]
    pub number_of_replicas: u32,

    /// Reindex outdated indexes during startup
    #[serde(default)]
    pub allow_migration: bool,

    /// Documents copied per reindex batch
    #[serde(default = "default_reindex_batch_size")]
    #[validate(range(min = 1))]
    pub reindex_batch_size: usize,
}

impl ElasticsearchSettings {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            number_of_shards: default_shards(),
            number_of_replicas: 0,
            allow_migration: false,
            reindex_batch_size: default_reindex_batch_size(),
        }
    }

    /// Cluster endpoints from the connection string
    pub fn endpoints(&self) -> Result<Vec<String>> {
        let endpoints: Vec<String> = self
            .connection_string
            .split(',')
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .map(str::to_string)
            .collect();

        if endpoints.is_empty() {
            return Err(AppError::Configuration(
                "elasticsearch.connection_string has no endpoints".to_string(),
            ));
        }
        Ok(endpoints)
    }
}

impl Default for ElasticsearchSettings {
    fn default() -> Self {
        Self::new("http://localhost:9200")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: default_true(),
        }
    }
}

fn default_shards() -> u32 {
    1
}

fn default_reindex_batch_size() -> usize {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
