// Typed server configuration

use crate::{ConfigError, ConfigManager, Result};
use keel_core::logging::{LogConfig, LogLevel};
use keel_core::{BindAddr, ServerSettings};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Environment prefix for server settings (`KEEL_PORT`, `KEEL_HOST`, ...)
pub const ENV_PREFIX: &str = "KEEL";

/// Settings for binding and running a server.
///
/// Sources are layered: built-in defaults, then an optional file, then
/// `KEEL_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: Option<u64>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_ms: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX);
        if let Some(path) = path {
            manager.load_file(path)?;
        }
        manager.load_env()?;
        Self::from_manager(&manager)
    }

    /// Build from an already populated manager, falling back to defaults
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            host: match manager.get_value("host") {
                Some(value) => string_value("host", value)?,
                None => defaults.host,
            },
            port: match manager.get_value("port") {
                Some(value) => number_value("port", value)?,
                None => defaults.port,
            },
            request_timeout_ms: match manager.get_value("request_timeout_ms") {
                Some(Value::Null) | None => defaults.request_timeout_ms,
                Some(value) => Some(number_value("request_timeout_ms", value)?),
            },
            log_level: match manager.get_value("log_level") {
                Some(value) => string_value("log_level", value)?,
                None => defaults.log_level,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }
        if LogLevel::from_str(&self.log_level).is_none() {
            return Err(ConfigError::invalid(
                "log_level",
                format!("unknown level {}", self.log_level),
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("request_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Transport settings for `Server::listen_with`
    pub fn to_settings(&self) -> ServerSettings {
        let settings = ServerSettings::new(BindAddr::Raw(format!("{}:{}", self.host, self.port)));
        match self.request_timeout() {
            Some(timeout) => settings.with_request_timeout(timeout),
            None => settings,
        }
    }

    /// Logging configuration at the configured level
    pub fn log_config(&self) -> LogConfig {
        LogConfig::new().level(LogLevel::from_str(&self.log_level).unwrap_or(LogLevel::Info))
    }
}

fn string_value(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ConfigError::invalid(key, format!("expected a string, got {}", other))),
    }
}

/// Numbers may arrive as JSON numbers (files) or strings (environment)
fn number_value<T>(key: &str, value: Value) -> Result<T>
where
    T: TryFrom<u64> + std::str::FromStr,
{
    let parsed = match &value {
        Value::Number(n) => n.as_u64().and_then(|n| T::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<T>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ConfigError::invalid(key, format!("{} is not a valid number", value)))
}
