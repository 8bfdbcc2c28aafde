use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Process configuration. Built once at start-up and handed to whatever needs
/// it; nothing reads the environment afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub app_name: String,
    pub host: String,
    pub port: u16,
    pub log_filter: String,
    /// `None` runs the server on the in-memory stores.
    pub database: Option<DatabaseConfig>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        // Same values an empty environment yields.
        Self {
            environment: Environment::Development,
            app_name: "boxoffice-api".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3001,
            log_filter: "info".to_string(),
            database: None,
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(86_400),
            cors_allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn split_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        fn number<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &'static str,
            default: T,
        ) -> Result<T, ConfigError> {
            match lookup(key).map(|v| v.trim().to_string()) {
                None => Ok(default),
                Some(v) if v.is_empty() => Ok(default),
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
            }
        }

        let secs = |key: &'static str, default: Duration| {
            number(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        let environment = match lookup("RUST_ENV").map(|v| v.trim().to_lowercase()) {
            None => Environment::Development,
            Some(v) if v.is_empty() || v == "development" || v == "dev" || v == "test" => {
                Environment::Development
            }
            Some(v) if v == "production" || v == "prod" => Environment::Production,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    key: "RUST_ENV",
                    value: v,
                })
            }
        };

        let database = match lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            None => None,
            Some(url) => Some(DatabaseConfig {
                url: url.trim().to_string(),
                max_connections: number(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
                acquire_timeout: secs("DATABASE_ACQUIRE_TIMEOUT_SECS", Duration::from_secs(5))?,
            }),
        };

        let cors_allowed_origins = match lookup("CORS_ALLOWED_ORIGINS") {
            Some(v) => split_origins(&v),
            None => defaults.cors_allowed_origins,
        };

        Ok(Self {
            environment,
            app_name: text("APP_NAME", defaults.app_name),
            host: text("HOST", defaults.host),
            port: number(&lookup, "PORT", defaults.port)?,
            log_filter: text("RUST_LOG", defaults.log_filter),
            database,
            access_token_ttl: secs("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl)?,
            refresh_token_ttl: secs("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl)?,
            cors_allowed_origins,
            request_timeout: secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
        })
    }
}
