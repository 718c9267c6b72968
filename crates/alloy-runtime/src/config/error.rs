//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading the runtime's own configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Figment failed to merge or deserialize one of the configured layers.
    #[error("failed to load configuration: {0}")]
    Figment(String),

    /// A configured path was not valid (e.g. `plugins_dir` could not be created).
    #[error("invalid configuration path '{path}': {reason}")]
    InvalidPath {
        /// The offending path, rendered for display.
        path: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
