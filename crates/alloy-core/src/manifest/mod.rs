//! Plugin manifest schema and semver predicate grammar.
//!
//! - [`schema`] — [`PluginManifest`] and the records it's built from.
//! - [`version`] — the dependency/extension-point version predicate grammar.

pub mod schema;
pub mod version;

pub use schema::{
    LifecycleHook, PluginAuthor, PluginCapability, PluginDependency, PluginExtensionPoint,
    PluginExtensionUse, PluginManifest, RiskTier,
};
pub use version::{VersionPredicate, is_extension_compatible, parse_version};
