use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration, layered from `config/default.toml`, an optional
/// per-environment file and `APP__*` environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL (postgres:// or sqlite://)
    pub database_url: String,

    /// JWT signing secret (minimum 64 characters)
    #[validate(length(min = 64))]
    pub jwt_secret: String,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    /// Token issuer claim
    #[serde(default = "default_issuer")]
    pub auth_issuer: String,

    /// Token audience claim
    #[serde(default = "default_audience")]
    pub auth_audience: String,

    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment: development, test or production
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter (trace/debug/info/warn/error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON (production convention)
    #[serde(default)]
    pub log_json: bool,

    /// Run migrations at startup
    #[serde(default = "default_auto_migrate")]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed CORS origins; empty means permissive
    /// in development and an error in production
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Maximum database connections in the pool
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
}

fn default_jwt_expiration() -> u64 {
    3600
}
fn default_issuer() -> String {
    "warehouse-api".to_string()
}
fn default_audience() -> String {
    "warehouse-clients".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_auto_migrate() -> bool {
    true
}
fn default_max_connections() -> u32 {
    10
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    /// Minimal constructor used by tests, bypassing the file/env layering.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: DEV_DEFAULT_JWT_SECRET.to_string(),
            jwt_expiration: default_jwt_expiration(),
            auth_issuer: default_issuer(),
            auth_audience: default_audience(),
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            db_max_connections: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration: defaults file, `config/{environment}.toml` when
/// present, then `APP__*` environment overrides.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let environment = std::env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", environment.clone())?
        .set_default("database_url", "sqlite://warehouse.db?mode=rwc")?;

    // Development keeps a baked-in secret so the server starts out of the box;
    // production must override it.
    if environment != "production" {
        builder = builder.set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?;
    }

    let default_file = Path::new(CONFIG_DIR).join("default.toml");
    if default_file.exists() {
        builder = builder.add_source(File::from(default_file));
    }
    let env_file = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
    if env_file.exists() {
        builder = builder.add_source(File::from(env_file));
    }

    let cfg: AppConfig = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()?;
    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

/// Initializes the global tracing subscriber. Call once, before anything logs.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
