//! Runtime configuration schema.
//!
//! This is the ambient configuration the runtime itself needs to stand up
//! its collaborators — it is distinct from, and never confused with, the
//! per-plugin `config_schema` a manifest may declare, which belongs to the
//! out-of-scope [`alloy_core::collaborators::ConfigStore`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration, assembled by [`super::loader::ConfigLoader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlloyConfig {
    /// Event bus manager settings (§6).
    pub event_bus_manager: EventBusManagerConfig,
    /// Installer / plugin directory settings.
    pub installer: InstallerConfig,
    /// Known plugin repositories.
    pub repositories: RepositoriesConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for AlloyConfig {
    fn default() -> Self {
        Self {
            event_bus_manager: EventBusManagerConfig::default(),
            installer: InstallerConfig::default(),
            repositories: RepositoriesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration for the event bus (§6 `event_bus_manager.*` namespace).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusManagerConfig {
    /// Bounded channel capacity. Read-only once the bus is started.
    pub max_queue_size: usize,
    /// Default publish timeout, in seconds. Live-mutable via `reconfigure`.
    pub publish_timeout: f64,
    /// Number of worker tasks draining the shared queue. Read-only once started.
    pub thread_pool_size: usize,
}

impl Default for EventBusManagerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            publish_timeout: 5.0,
            thread_pool_size: 4,
        }
    }
}

/// Where the installer keeps installed plugins and its registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Directory each installed plugin gets a subdirectory under.
    pub plugins_dir: PathBuf,
    /// Whether `install`/`update` require a valid signature by default.
    pub require_signature: bool,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            require_signature: true,
        }
    }
}

fn default_plugins_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("alloy")
        .join("plugins")
}

/// A single configured repository entry, keyed by name in [`RepositoriesConfig::entries`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Base URL the embedding application's `RepositoryClient` implementation
    /// should talk to. Uninterpreted by this crate.
    pub url: String,
    /// Whether publishing is permitted against this repository.
    #[serde(default)]
    pub allow_publish: bool,
}

/// Named plugin repositories known to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RepositoriesConfig {
    /// Name of the repository used when a dependency URL omits one.
    pub default: String,
    /// All configured repositories, including `default`.
    pub entries: std::collections::HashMap<String, RepositoryEntry>,
}

/// Output format for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, single-line-per-event.
    #[default]
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"alloy_runtime=info"`.
    pub filter: String,
    /// Output encoding.
    pub format: LogFormat,
    /// Optional file to additionally log to, via a non-blocking appender.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}
