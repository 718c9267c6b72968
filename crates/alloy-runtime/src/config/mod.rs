//! Runtime configuration: the event bus, installer, repository, and logging
//! settings the embedding application supplies before standing up an
//! [`crate::AlloyRuntime`].

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_from_file, ConfigLoader};
pub use schema::{
    AlloyConfig, EventBusManagerConfig, InstallerConfig, LogFormat, LoggingConfig,
    RepositoriesConfig, RepositoryEntry,
};
