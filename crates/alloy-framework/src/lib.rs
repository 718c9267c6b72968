//! # Alloy Framework
//!
//! Cross-plugin coordination built on top of `alloy-core`'s data model: the
//! dependency graph and resolver (§4.4) and the extension point registry
//! (§4.5). Plugin lifecycle, installation, and the host service locator live
//! one layer up, in `alloy-runtime`, since they need a filesystem and a
//! persisted install record this crate deliberately has no opinion on.

pub mod dependency;
pub mod error;
pub mod extension;

pub use dependency::{resolve, DependencyGraph, DependencyNode, DependencyRef, ResolveInput, CORE_NODE};
pub use error::{DependencyError, DependencyResult, ExtensionError, ExtensionResult};
pub use extension::{ExtensionRegistry, InvocationResult, PendingUse, SharedExtensionRegistry};
