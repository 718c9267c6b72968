//! Alloy Runtime - lifecycle, installation, and host orchestration layer for
//! the Alloy plugin framework.
//!
//! This crate provides:
//! - Runtime configuration (`config`) layered from defaults, an optional
//!   file, and environment variables.
//! - The crate-wide error type (`error`) composing every layer's errors.
//! - The plugin host service locator (`host`), the single object a running
//!   plugin talks to for everything outside its own code.
//! - The plugin lifecycle state machine and hook dispatcher (`lifecycle`).
//! - The plugin installer (`installer`): install/uninstall/update and the
//!   on-disk installed-plugin registry.
//! - Logging configuration (`logging`).
//! - The top-level orchestrator (`runtime`) tying all of the above together.
//!
//! ```ignore
//! use alloy_runtime::AlloyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> alloy_runtime::AlloyResult<()> {
//!     let runtime = AlloyRuntime::builder().build().await?;
//!
//!     for plugin in runtime.loading_order().await? {
//!         let host = runtime.host_for(&plugin);
//!         // load the plugin's entry point against `host` ...
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod installer;
pub mod logging;
pub mod runtime;

pub use config::{
    AlloyConfig, ConfigError, ConfigLoader, ConfigResult, EventBusManagerConfig, InstallerConfig,
    LogFormat, LoggingConfig, RepositoriesConfig, RepositoryEntry,
};
pub use error::{
    AlloyError, AlloyResult, HostError, HostResult, InstallError, InstallResult, LifecycleError,
    LifecycleResult,
};
pub use host::{
    ApiRegistry, Cloud, DatabasePool, FileHelper, HostStatus, PluginHost, PluginHostBuilder,
    RemoteServices, Security, TaskFn, TaskManager, TaskScheduler, UiComponentRecord,
};
pub use lifecycle::{HookContext, HookFn, LifecycleManager, PluginState};
pub use installer::{HookResolver, InstallOptions, InstalledPluginRecord, Installer};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{AlloyRuntime, AlloyRuntimeBuilder};

// Re-export tracing for use by other crates.
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::AlloyConfig;
    pub use crate::error::{AlloyError, AlloyResult};
    pub use crate::host::{PluginHost, PluginHostBuilder};
    pub use crate::installer::{InstallOptions, Installer};
    pub use crate::lifecycle::{HookContext, LifecycleManager, PluginState};
    pub use crate::runtime::{AlloyRuntime, AlloyRuntimeBuilder};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
