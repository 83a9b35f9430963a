use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

use crate::crypto;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_MARKETPLACE_BASE_URL: &str = "https://api.mercadolibre.com";
const DEFAULT_NOTIFICATION_TOPIC: &str = "marketplace_notifications";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Passphrase for the credential vault. Mandatory: startup fails when
    /// it is missing or empty — there is no built-in development fallback.
    /// Normalized into a 32-byte key via SHA-256 at startup.
    #[validate(length(min = 16))]
    pub encryption_key: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Database pool tuning
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Base URL of the marketplace order API
    #[serde(default = "default_marketplace_base_url")]
    pub marketplace_base_url: String,

    /// Request timeout for marketplace calls, in seconds
    #[serde(default = "default_marketplace_timeout_secs")]
    pub marketplace_timeout_secs: u64,

    /// Queue topic carrying inbound marketplace notifications
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,

    /// Delivery attempts before a message is dropped instead of requeued
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Capacity of the in-process domain event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Builds a config programmatically; used by tests and tools.
    pub fn new(database_url: String, encryption_key: String, environment: String) -> Self {
        Self {
            database_url,
            encryption_key,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            marketplace_base_url: default_marketplace_base_url(),
            marketplace_timeout_secs: default_marketplace_timeout_secs(),
            notification_topic: default_notification_topic(),
            max_delivery_attempts: default_max_delivery_attempts(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// The 32-byte vault key derived from the configured passphrase.
    pub fn derived_encryption_key(&self) -> [u8; crypto::KEY_LEN] {
        crypto::derive_key(&self.encryption_key)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_marketplace_base_url() -> String {
    DEFAULT_MARKETPLACE_BASE_URL.to_string()
}
fn default_marketplace_timeout_secs() -> u64 {
    10
}
fn default_notification_topic() -> String {
    DEFAULT_NOTIFICATION_TOPIC.to_string()
}
fn default_max_delivery_attempts() -> u32 {
    5
}
fn default_event_channel_capacity() -> usize {
    1024
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("stockflow_api={level}");
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://stockflow.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Check for the vault passphrase before deserialization so the operator
    // gets a clear message instead of a serde error. Refusing to start beats
    // silently encrypting tokens under a well-known default.
    if config.get_string("encryption_key").is_err() {
        error!("Encryption key is not configured. Set APP__ENCRYPTION_KEY with a strong passphrase (minimum 16 characters).");
        error!("Generate one with: openssl rand -base64 32");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "encryption_key is required but not configured. Set APP__ENCRYPTION_KEY environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
