//! Error types for dependency resolution (§4.4) and the extension registry (§4.5).
//!
//! Manifest- and package-level errors live in `alloy-core::error`; these
//! compose on top of them once multiple manifests are considered together.

use thiserror::Error;

use alloy_core::error::ManifestError;

/// Errors that can occur while resolving a plugin's dependency graph.
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    /// One or more required dependencies could not be found, locally or via
    /// a repository.
    #[error("missing required dependencies: {}", names.join(", "))]
    MissingDependency {
        /// Names of the missing dependencies.
        names: Vec<String>,
    },

    /// A dependency was found but its version does not satisfy the
    /// dependent's predicate.
    #[error("'{name}' requires version '{required}' but '{available}' is available")]
    IncompatibleVersion {
        /// The dependency's name.
        name: String,
        /// The predicate string that was not satisfied.
        required: String,
        /// The version that was actually available.
        available: String,
    },

    /// The dependency graph contains a cycle; `cycle` names the chain in
    /// traversal order, repeating the first node at the end.
    #[error("circular dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        /// The plugin names forming the cycle, first node repeated last.
        cycle: Vec<String>,
    },

    /// A version string or predicate failed to parse.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A dependency URL hint did not match the expected grammar.
    #[error("invalid dependency url '{0}'")]
    InvalidDependencyUrl(String),

    /// A manifest-level error surfaced while resolving.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Result type for dependency resolution.
pub type DependencyResult<T> = Result<T, DependencyError>;

/// Errors that can occur while registering or invoking extensions.
#[derive(Debug, Clone, Error)]
pub enum ExtensionError {
    /// No extension point `{provider}.{id}` has been registered.
    #[error("unknown extension point '{provider}.{id}'")]
    UnknownExtensionPoint {
        /// Declaring plugin name.
        provider: String,
        /// Extension point id.
        id: String,
    },

    /// An implementation's declared contract version is incompatible with
    /// the extension point's current version.
    #[error("implementation '{consumer}' of '{provider}.{id}' requires version '{required}' but point is at '{available}'")]
    IncompatibleContract {
        /// Declaring plugin name.
        provider: String,
        /// Extension point id.
        id: String,
        /// Implementing plugin name.
        consumer: String,
        /// Version required by the implementation.
        required: String,
        /// Version currently published by the point.
        available: String,
    },

    /// A required extension use was never satisfied.
    #[error("required extension use '{provider}.{id}' by '{consumer}' was never satisfied")]
    UnsatisfiedRequiredUse {
        /// Expected provider plugin name.
        provider: String,
        /// Expected extension point id.
        id: String,
        /// The consuming plugin name.
        consumer: String,
    },

    /// A manifest-level error surfaced while registering extensions.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Result type for extension registry operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
