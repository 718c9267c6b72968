//! Layered configuration loading: built-in defaults, an optional config
//! file, then environment variables, each overriding the last — figment's
//! usual merge order.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized};
use figment::Figment;

use super::error::{ConfigError, ConfigResult};
use super::schema::AlloyConfig;

/// Environment variable prefix consulted for the final override layer
/// (e.g. `ALLOY_EVENT_BUS_MANAGER.MAX_QUEUE_SIZE`).
const ENV_PREFIX: &str = "ALLOY_";

/// Builds an [`AlloyConfig`] from built-in defaults, an optional file, and
/// environment variables, in that override order.
#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a loader with no file layer and the default `ALLOY_` env prefix.
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Adds a config file layer. Format is inferred from the extension
    /// (`.toml`, `.json`, `.yaml`/`.yml`); an unrecognized extension falls
    /// back to TOML.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Overrides the environment variable prefix consulted for the final layer.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Merges every configured layer and deserializes the result.
    pub fn load(self) -> ConfigResult<AlloyConfig> {
        let mut figment = Figment::from(Serialized::defaults(AlloyConfig::default()));

        if let Some(path) = &self.file {
            figment = merge_file(figment, path)?;
        }

        let prefix = if self.env_prefix.is_empty() {
            ENV_PREFIX
        } else {
            &self.env_prefix
        };
        figment = figment.merge(Env::prefixed(prefix).split("__"));

        figment.extract().map_err(ConfigError::from)
    }
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    if !path.exists() {
        return Ok(figment);
    }
    let merged = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => figment.merge(figment::providers::Json::file(path)),
        Some("yaml") | Some("yml") => figment.merge(figment::providers::Yaml::file(path)),
        _ => figment.merge(figment::providers::Toml::file(path)),
    };
    Ok(merged)
}

/// Loads the runtime configuration with no file layer, just defaults + env.
pub fn load_config() -> ConfigResult<AlloyConfig> {
    ConfigLoader::new().load()
}

/// Loads the runtime configuration with a specific file layer.
pub fn load_config_from_file(path: impl Into<PathBuf>) -> ConfigResult<AlloyConfig> {
    ConfigLoader::new().with_file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let config = load_config().unwrap();
        assert_eq!(config.event_bus_manager.max_queue_size, 1000);
        assert_eq!(config.event_bus_manager.thread_pool_size, 4);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config_from_file("/nonexistent/alloy.toml").unwrap();
        assert_eq!(config.event_bus_manager.max_queue_size, 1000);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alloy.toml");
        std::fs::write(
            &path,
            "[event_bus_manager]\nmax_queue_size = 42\npublish_timeout = 1.5\nthread_pool_size = 2\n",
        )
        .unwrap();

        let config = load_config_from_file(&path).unwrap();
        assert_eq!(config.event_bus_manager.max_queue_size, 42);
        assert_eq!(config.event_bus_manager.thread_pool_size, 2);
    }

    #[test]
    fn env_layer_overrides_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alloy.toml");
        std::fs::write(&path, "[event_bus_manager]\nmax_queue_size = 42\n").unwrap();

        std::env::set_var("ALLOY_TEST_ENV_LAYER__EVENT_BUS_MANAGER__MAX_QUEUE_SIZE", "7");
        let config = ConfigLoader::new()
            .with_file(&path)
            .with_env_prefix("ALLOY_TEST_ENV_LAYER__")
            .load()
            .unwrap();
        std::env::remove_var("ALLOY_TEST_ENV_LAYER__EVENT_BUS_MANAGER__MAX_QUEUE_SIZE");

        assert_eq!(config.event_bus_manager.max_queue_size, 7);
    }
}
