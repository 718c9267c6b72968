//! Runtime-level error types: lifecycle, installation, and the crate-wide
//! [`AlloyError`] that composes every layer (§7).
//!
//! Manifest- and package-level errors live in `alloy-core::error`;
//! dependency- and extension-level errors live in `alloy-framework::error`.
//! This module adds the two kinds that only make sense once there is a
//! filesystem and a running lifecycle manager to talk about, then ties the
//! whole stack together the same way the original bot framework's transport
//! and adapter errors composed into one top-level enum.

use thiserror::Error;

use alloy_core::error::{EventBusError, ManifestError, PackageError};
use alloy_core::manifest::LifecycleHook;
use alloy_framework::error::{DependencyError, ExtensionError};

use crate::config::ConfigError;

/// Errors that can occur while driving a plugin through its lifecycle states.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// A state transition was requested that the state machine does not allow.
    #[error("plugin '{plugin}' cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The plugin name.
        plugin: String,
        /// Current state.
        from: super::lifecycle::PluginState,
        /// Requested state.
        to: super::lifecycle::PluginState,
    },

    /// A hook callable ran and returned an error.
    #[error("hook '{hook}' failed for plugin '{plugin}': {reason}")]
    HookFailed {
        /// The plugin name.
        plugin: String,
        /// Which hook failed.
        hook: LifecycleHook,
        /// The error message the hook callable returned.
        reason: String,
    },

    /// An operation referenced a plugin the lifecycle manager has no record of.
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    /// `wait_for_ui_ready` was asked to wait on a plugin that never reaches
    /// `UiReady` before the deadline.
    #[error("timed out waiting for plugin '{0}' to become UI-ready")]
    UiReadyTimeout(String),
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors that can occur while installing, updating, or removing a plugin.
#[derive(Debug, Clone, Error)]
pub enum InstallError {
    /// The plugin is already installed and `force` was not set.
    #[error("plugin '{0}' is already installed")]
    AlreadyInstalled(String),

    /// The plugin is not installed.
    #[error("plugin '{0}' is not installed")]
    NotInstalled(String),

    /// Uninstall was refused because other installed plugins still depend on it.
    #[error("cannot remove '{name}': required by {}", dependents.join(", "))]
    DependentsPresent {
        /// The plugin that was asked to be removed.
        name: String,
        /// Names of installed plugins that still depend on it.
        dependents: Vec<String>,
    },

    /// Signature verification failed or was required but no signature was present.
    #[error("signature verification failed for '{0}'")]
    VerificationFailed(String),

    /// An in-place update targeted a version that is not newer than the
    /// currently installed one; this is only a warning in the original
    /// contract, never a hard failure, so this variant exists for callers
    /// that opt into strict mode.
    #[error("update for '{name}' ({new_version}) is not newer than the installed version ({current_version})")]
    NotNewer {
        /// The plugin name.
        name: String,
        /// The version already installed.
        current_version: String,
        /// The version the update package declares.
        new_version: String,
    },

    /// The installed-plugin registry file could not be read or written.
    #[error("installed plugin registry I/O error: {0}")]
    RegistryIo(String),

    /// The registry file's contents could not be parsed as JSON.
    #[error("installed plugin registry is corrupt: {0}")]
    RegistryCorrupt(String),

    /// A package-level error surfaced while opening or extracting the package.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// A dependency-resolution error surfaced while installing.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// A lifecycle hook failed during install/uninstall/update.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Result type for installer operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// The crate-wide error type composing every layer of the plugin framework.
///
/// Mirrors the way the original bot framework folded `TransportError` and
/// `AdapterError` into one top-level `ApiError`: callers at the boundary
/// (a CLI, an HTTP handler) generally want one `?`-friendly type, while
/// internal code keeps using the narrower per-layer errors above.
#[derive(Debug, Clone, Error)]
pub enum AlloyError {
    /// An event bus operation failed.
    #[error(transparent)]
    EventBus(#[from] EventBusError),

    /// A manifest failed to parse or validate.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A package-level operation failed.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Dependency resolution failed.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// An extension registry operation failed.
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// An install/uninstall/update operation failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// A lifecycle operation failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Loading the runtime's own configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin host operation failed.
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result type for the crate-wide [`AlloyError`].
pub type AlloyResult<T> = Result<T, AlloyError>;

/// Errors that can occur while registering or executing a host-level task.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// No task is registered under this name.
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// The task ran and returned an error.
    #[error("task '{name}' failed: {reason}")]
    TaskFailed {
        /// The task name.
        name: String,
        /// The error message the task returned.
        reason: String,
    },
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
