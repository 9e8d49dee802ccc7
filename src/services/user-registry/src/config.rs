use crate::error::{AppError, Result};

use std::env;
use std::str::FromStr;
use user_registry_database::MongoConfig;

/// Largest accepted value for any MongoDB timeout setting (one hour)
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub mongodb: MongoConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::ConfigurationError(format!(
                "Invalid LOG_FORMAT: {} (expected pretty or json)",
                other
            ))),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        // Load environment-specific defaults
        let (default_host, default_log_level) = match environment.as_str() {
            "production" => ("0.0.0.0", "info"),
            "staging" => ("0.0.0.0", "debug"),
            _ => ("127.0.0.1", "debug"),
        };

        let defaults = MongoConfig::default();
        let mongodb = MongoConfig {
            url: lookup("MONGODB_URI")
                .or_else(|| lookup("MONGODB_URL"))
                .filter(|url| !url.trim().is_empty()),
            database: lookup("MONGODB_DATABASE").unwrap_or(defaults.database),
            collection: lookup("MONGODB_COLLECTION").unwrap_or(defaults.collection),
            server_selection_timeout_seconds: parse_or(
                &lookup,
                "MONGODB_SERVER_SELECTION_TIMEOUT_SECONDS",
                defaults.server_selection_timeout_seconds,
            )?,
            connect_timeout_seconds: parse_or(
                &lookup,
                "MONGODB_CONNECT_TIMEOUT_SECONDS",
                defaults.connect_timeout_seconds,
            )?,
            operation_timeout_seconds: parse_or(
                &lookup,
                "MONGODB_OPERATION_TIMEOUT_SECONDS",
                defaults.operation_timeout_seconds,
            )?,
            enforce_unique_email: parse_or(
                &lookup,
                "MONGODB_ENFORCE_UNIQUE_EMAIL",
                defaults.enforce_unique_email,
            )?,
        };

        let port = match lookup("USER_REGISTRY_PORT").or_else(|| lookup("PORT")) {
            Some(port) => port
                .parse()
                .map_err(|e| AppError::ConfigurationError(format!("Invalid port: {}", e)))?,
            None => 8000,
        };

        Ok(Config {
            host: lookup("USER_REGISTRY_HOST").unwrap_or_else(|| default_host.to_string()),
            port,
            environment,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| default_log_level.to_string()),
            log_format: lookup("LOG_FORMAT")
                .map(|format| format.parse::<LogFormat>())
                .transpose()?
                .unwrap_or(LogFormat::Pretty),
            mongodb,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(AppError::ConfigurationError(
                "Host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(AppError::ConfigurationError(format!(
                "Invalid port: {}",
                self.port
            )));
        }

        let timeouts = [
            (
                "MONGODB_SERVER_SELECTION_TIMEOUT_SECONDS",
                self.mongodb.server_selection_timeout_seconds,
            ),
            (
                "MONGODB_CONNECT_TIMEOUT_SECONDS",
                self.mongodb.connect_timeout_seconds,
            ),
            (
                "MONGODB_OPERATION_TIMEOUT_SECONDS",
                self.mongodb.operation_timeout_seconds,
            ),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(AppError::ConfigurationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
            if value > MAX_TIMEOUT_SECONDS {
                return Err(AppError::ConfigurationError(format!(
                    "{} must be at most {} seconds",
                    name, MAX_TIMEOUT_SECONDS
                )));
            }
        }

        if self.mongodb.database.is_empty() || self.mongodb.collection.is_empty() {
            return Err(AppError::ConfigurationError(
                "MongoDB database and collection names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigurationError(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
