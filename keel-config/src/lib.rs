// Configuration management for Keel servers

pub mod env;
pub mod error;
pub mod loader;
pub mod server;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use server::ServerConfig;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Merged key/value configuration store.
///
/// Later loads override earlier ones key by key. Cloning yields a handle to
/// the same store, so a manager registered in a scope can be shared by every
/// handler that injects it.
#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: None,
        }
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::new(RwLock::new(HashMap::new())),
            env_prefix: Some(prefix.into()),
        }
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let loader = EnvLoader::new(self.env_prefix.clone());
        let env_vars = loader.load()?;
        self.insert_strings(env_vars);
        Ok(())
    }

    /// Load configuration from an explicit set of variables, honouring the prefix
    pub fn load_env_from<I, K, V>(&self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let loader = EnvLoader::new(self.env_prefix.clone());
        self.insert_strings(loader.load_from(vars));
    }

    /// Load configuration from .env file
    pub fn load_dotenv(&self, path: Option<&str>) -> Result<()> {
        if let Some(path) = path {
            dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
        } else {
            dotenvy::dotenv().ok();
        }
        self.load_env()
    }

    /// Load a file, detecting the format from its extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let loader = ConfigLoader::auto(path.as_ref())?;
        self.merge_value(loader.load_file(path)?);
        Ok(())
    }

    /// Load a file in an explicit format
    pub fn load_file_as(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let loader = ConfigLoader::new(format);
        self.merge_value(loader.load_file(path)?);
        Ok(())
    }

    /// Load configuration from a string
    pub fn load_str(&self, content: &str, format: FileFormat) -> Result<()> {
        let loader = ConfigLoader::new(format);
        self.merge_value(loader.parse(content)?);
        Ok(())
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        self.config.write().insert(key.to_string(), json_value);
        Ok(())
    }

    /// Raw value for a key
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.config.read().get(key).cloned()
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get_value(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.config.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.config.read().keys().cloned().collect()
    }

    /// Copy every entry of `other` into this manager
    pub fn merge(&self, other: &ConfigManager) {
        if Arc::ptr_eq(&self.config, &other.config) {
            return;
        }
        let other_config = other.config.read().clone();
        self.config.write().extend(other_config);
    }

    /// Deserialize the whole store into a typed configuration
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        let json_value = serde_json::Value::Object(
            self.config
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        serde_json::from_value(json_value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    fn insert_strings(&self, values: HashMap<String, String>) {
        let mut config = self.config.write();
        for (key, value) in values {
            config.insert(key, serde_json::Value::String(value));
        }
    }

    fn merge_value(&self, data: serde_json::Value) {
        if let serde_json::Value::Object(map) = data {
            self.config.write().extend(map);
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let manager = ConfigManager::new();
        manager.set("test_key", "test_value").unwrap();

        let value: String = manager.get("test_key").unwrap();
        assert_eq!(value, "test_value");
    }

    #[test]
    fn test_get_or_default() {
        let manager = ConfigManager::new();

        let value: String = manager.get_or("missing_key", "default_value".to_string());
        assert_eq!(value, "default_value");
    }

    #[test]
    fn test_has_key() {
        let manager = ConfigManager::new();
        manager.set("existing_key", "value").unwrap();

        assert!(manager.has("existing_key"));
        assert!(!manager.has("missing_key"));
    }

    #[test]
    fn test_later_sources_override() {
        let manager = ConfigManager::with_prefix("KEEL");
        manager
            .load_str("host = \"file\"\nport = 9000", FileFormat::Toml)
            .unwrap();
        manager.load_env_from([("KEEL_HOST", "env")]);

        assert_eq!(manager.get_string("host").unwrap(), "env");
        assert_eq!(manager.get::<u16>("port").unwrap(), 9000);
    }

    #[test]
    fn test_merge() {
        let base = ConfigManager::new();
        base.set("a", 1).unwrap();
        let overlay = ConfigManager::new();
        overlay.set("a", 2).unwrap();
        overlay.set("b", true).unwrap();

        base.merge(&overlay);
        base.merge(&base.clone());

        assert_eq!(base.get::<i64>("a").unwrap(), 2);
        assert!(base.get_bool("b").unwrap());
        assert_eq!(base.keys().len(), 2);
    }

    #[test]
    fn test_extract() {
        #[derive(serde::Deserialize)]
        struct Feature {
            name: String,
            enabled: bool,
        }

        let manager = ConfigManager::new();
        manager.set("name", "beta").unwrap();
        manager.set("enabled", true).unwrap();

        let feature: Feature = manager.extract().unwrap();
        assert_eq!(feature.name, "beta");
        assert!(feature.enabled);
    }
}
