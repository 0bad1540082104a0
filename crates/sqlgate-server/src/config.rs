//! Configuration system for the sqlgate server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, engine, guard, models, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use sqlgate_exec::Budget;
use sqlgate_guard::DefaultDataset;
use std::path::Path;
use thiserror::Error;

use crate::assumptions::AssumptionsConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid guard configuration: {0}")]
    Guard(#[from] sqlgate_guard::ConfigError),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Query engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the DuckDB database file
    pub database: String,

    /// Maximum rows materialized per query
    pub row_cap: usize,

    /// Scan ceiling in GiB; absent means unbounded
    pub max_scan_gb: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: "data/demo.duckdb".to_string(),
            row_cap: 200,
            max_scan_gb: Some(2.0),
        }
    }
}

/// Guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// `project.dataset` used to qualify partial table references
    pub default_dataset: String,

    /// Bare table names to allow; empty allows every table in the dataset
    pub allowed_tables: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            default_dataset: "demo.main".to_string(),
            allowed_tables: Vec::new(),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default_model: String,
    pub fallback_model: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_string(),
            fallback_model: "gpt-4o".to_string(),
            max_tokens: 1400,
        }
    }
}

/// Schema cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaCacheConfig {
    pub path: String,
    pub ttl_seconds: i64,
    pub max_columns_per_table: usize,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            path: ".cache/schema.json".to_string(),
            ttl_seconds: 24 * 3600,
            max_columns_per_table: 160,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub guard: GuardConfig,
    pub llm: LlmConfig,
    pub schema_cache: SchemaCacheConfig,
    pub assumptions: AssumptionsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SQLGATE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SQLGATE_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Ok(database) = std::env::var("SQLGATE_DATABASE") {
            self.engine.database = database;
        }
        if let Ok(max_gb) = std::env::var("SQLGATE_MAX_SCAN_GB") {
            match max_gb.trim() {
                "" | "none" => self.engine.max_scan_gb = None,
                value => {
                    if let Ok(gb) = value.parse() {
                        self.engine.max_scan_gb = Some(gb);
                    }
                }
            }
        }
        if let Ok(cap) = std::env::var("SQLGATE_ROW_CAP") {
            if let Ok(cap) = cap.parse() {
                self.engine.row_cap = cap;
            }
        }

        if let Ok(dataset) = std::env::var("SQLGATE_DEFAULT_DATASET") {
            self.guard.default_dataset = dataset;
        }

        if let Ok(model) = std::env::var("SQLGATE_MODEL") {
            self.llm.default_model = model;
        }
        if let Ok(model) = std::env::var("SQLGATE_FALLBACK_MODEL") {
            self.llm.fallback_model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Parse the guard's default dataset
    pub fn default_dataset(&self) -> Result<DefaultDataset, ConfigError> {
        Ok(self.guard.default_dataset.parse()?)
    }

    pub fn budget(&self) -> Budget {
        Budget::from(self.engine.max_scan_gb)
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}
