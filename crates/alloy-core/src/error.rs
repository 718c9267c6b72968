//! Unified error types for the Alloy core data model.
//!
//! Each data-model component (event bus, manifest, package) owns its own
//! `thiserror`-derived enum. Framework-level errors (dependency resolution,
//! extension registry) are defined in `alloy-framework`; runtime-level errors
//! (lifecycle, install) are defined in `alloy-runtime`.

use thiserror::Error;

// =============================================================================
// Event Bus Errors
// =============================================================================

/// Errors that can occur while publishing or dispatching events.
#[derive(Debug, Clone, Error)]
pub enum EventBusError {
    /// The bus has not been started yet.
    #[error("event bus is not running (state: {state})")]
    NotRunning {
        /// Human-readable current state.
        state: &'static str,
    },

    /// The bounded queue was full and `publish_timeout` elapsed.
    #[error("publish timed out after {timeout_ms}ms: queue is full")]
    PublishTimeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The bus is draining or stopped and can no longer accept events.
    #[error("event bus is shutting down, event rejected")]
    ShuttingDown,

    /// Attempted to change a read-only field (`max_queue_size`, `thread_pool_size`)
    /// via `reconfigure`.
    #[error("field '{field}' is read-only at runtime")]
    ReadOnlyField {
        /// The offending field name.
        field: &'static str,
    },

    /// The main-thread executor collaborator was required but not configured.
    #[error("event '{event_type}' requires main-thread routing but no executor is configured")]
    NoMainThreadExecutor {
        /// The event type that required main-thread routing.
        event_type: String,
    },
}

// =============================================================================
// Manifest Errors
// =============================================================================

/// Errors that can occur while parsing or validating a plugin manifest.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The manifest JSON could not be parsed.
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    /// A required field was missing or empty.
    #[error("missing required field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The manifest's `name` field is not a valid identifier.
    #[error("invalid plugin name: {0}")]
    InvalidName(String),

    /// The author's email did not look like an email address.
    #[error("invalid author email: {0}")]
    InvalidEmail(String),

    /// The author's or homepage URL did not look like a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A version string could not be parsed as semver.
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion {
        /// The offending version string.
        version: String,
        /// Why parsing failed.
        reason: String,
    },

    /// An extension point id did not match the required pattern.
    #[error("invalid extension point id '{id}': must match ^[a-z][a-z0-9_.]{{2,63}}$")]
    InvalidExtensionPointId {
        /// The offending id.
        id: String,
    },

    /// A lifecycle hook's dotted path had fewer than two segments.
    #[error("invalid lifecycle hook path '{path}' for hook '{hook}': need at least two dotted segments")]
    InvalidHookPath {
        /// The hook kind this path was registered for.
        hook: String,
        /// The offending path.
        path: String,
    },

    /// A dependency specifier could not be parsed.
    #[error("invalid dependency specifier '{0}'")]
    InvalidDependency(String),
}

// =============================================================================
// Package Errors
// =============================================================================

/// Errors that can occur while creating, loading, or verifying a plugin package.
#[derive(Debug, Clone, Error)]
pub enum PackageError {
    /// The package's format could not be determined from its path.
    #[error("cannot determine package format from path: {0}")]
    UnknownFormat(String),

    /// The package is missing its manifest entry.
    #[error("package is missing manifest.json")]
    MissingManifest,

    /// An I/O error occurred while reading or writing package contents.
    #[error("package I/O error: {0}")]
    Io(String),

    /// The zip archive could not be read.
    #[error("zip archive error: {0}")]
    Zip(String),

    /// Integrity verification failed for one or more files.
    #[error("integrity check failed for {count} file(s), first offender: {first}")]
    IntegrityMismatch {
        /// Number of files whose hash did not match.
        count: usize,
        /// Relative path of the first mismatching file.
        first: String,
    },

    /// The manifest inside the package failed to parse or validate.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
}

impl From<std::io::Error> for PackageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Result type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;
