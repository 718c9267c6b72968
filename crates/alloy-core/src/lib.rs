//! # Alloy Core
//!
//! The core data model and runtime primitives of the Alloy plugin framework:
//! the immutable event record and bounded-queue [`EventBus`], the
//! manifest/semver data model plugins are described by, the package
//! container format plugins are distributed in, and the narrow collaborator
//! contracts (§6) the embedding application supplies concrete adapters for.
//!
//! ## Layout
//!
//! - [`event`] — [`Event`], [`Subscription`], and the worker-pool [`EventBus`].
//! - [`manifest`] — [`PluginManifest`] and the semver predicate grammar.
//! - [`package`] — package open/verify/extract and the hash-index integrity check.
//! - [`collaborators`] — logger factory, config store, main-thread executor,
//!   repository client, verifier, and UI integration traits.
//! - [`error`] — per-component `thiserror` enums and `Result` aliases.
//!
//! Dependency resolution, the extension registry, plugin lifecycle, and the
//! installer build on top of these primitives in `alloy-framework` and
//! `alloy-runtime`.

pub mod collaborators;
pub mod error;
pub mod event;
pub mod manifest;
pub mod package;

pub use collaborators::{
    ConfigListener, ConfigStore, Ed25519Verifier, Logger, LoggerFactory, MainThreadExecutor,
    RepositoryClient, RepositoryManager, RepositoryPluginVersion, RepositorySearchResult,
    UiElementHandle, UiIntegration, Verifier,
};
pub use error::{EventBusError, EventBusResult, ManifestError, ManifestResult, PackageError, PackageResult};
pub use event::{BusState, BusStatus, Event, EventBus, EventBusPatch, Subscription, SubscriptionCallback, WILDCARD};
pub use manifest::{
    LifecycleHook, PluginAuthor, PluginCapability, PluginDependency, PluginExtensionPoint,
    PluginExtensionUse, PluginManifest, RiskTier, VersionPredicate, is_extension_compatible,
    parse_version,
};
pub use package::{Package, PackageFormat, create as create_package};

/// Prelude for common imports.
pub mod prelude {
    pub use super::collaborators::*;
    pub use super::event::{Event, EventBus, Subscription, WILDCARD};
    pub use super::manifest::*;
    pub use super::package::{Package, PackageFormat};
}
