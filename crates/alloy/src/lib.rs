//! # Alloy
//!
//! A plugin framework core: a bounded, worker-pool event bus; manifest- and
//! semver-driven dependency resolution; an extension point registry; and a
//! plugin lifecycle manager, installer, and host service locator built on
//! top of them.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ EventBus    │────▶│ Lifecycle    │────▶│ PluginHost          │
//! │ (alloy-core)│     │ (alloy-runt.)│     │ (per-plugin facade) │
//! └────────────┘     └──────────────┘     └────────────────────┘
//!        ▲                    ▲
//!        │                    │
//! ┌────────────┐     ┌──────────────┐
//! │ Extension   │     │ Installer /  │
//! │ Registry    │     │ DependencyGraph │
//! │ (alloy-fwk) │     │ (alloy-fwk/runt.)│
//! └────────────┘     └──────────────┘
//! ```
//!
//! - [`alloy_core`] — the event bus, manifest/semver model, package format,
//!   and the collaborator contracts the embedding application implements.
//! - [`alloy_framework`] — dependency resolution and the extension registry.
//! - [`alloy_runtime`] — lifecycle, installer, host, config, and the
//!   top-level [`AlloyRuntime`](alloy_runtime::AlloyRuntime) orchestrator.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use alloy::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> AlloyResult<()> {
//!     let runtime = AlloyRuntime::builder()
//!         .config(load_config()?)
//!         .build()
//!         .await?;
//!
//!     for plugin in runtime.loading_order().await? {
//!         let host = runtime.host_for(&plugin);
//!         // load the plugin's entry point against `host` ...
//!     }
//!
//!     Ok(())
//! }
//! ```

pub use alloy_core;
pub use alloy_framework;
pub use alloy_runtime;

#[cfg(feature = "macros")]
pub use alloy_macros;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use alloy::prelude::*;
/// ```
pub mod prelude {
    // Event system.
    pub use alloy_core::event::{Event, EventBus, Subscription, WILDCARD};

    // Manifest and semver model.
    pub use alloy_core::manifest::{LifecycleHook, PluginCapability, PluginManifest, VersionPredicate};

    // Collaborator contracts the embedding application implements.
    pub use alloy_core::collaborators::{ConfigStore, LoggerFactory, MainThreadExecutor, UiIntegration, Verifier};

    // Dependency resolution and extension points.
    pub use alloy_framework::{resolve, DependencyGraph, ExtensionRegistry};

    // Runtime orchestration.
    pub use alloy_runtime::{
        AlloyConfig, AlloyError, AlloyResult, AlloyRuntime, AlloyRuntimeBuilder, LifecycleManager,
        PluginHost, PluginState,
    };
    pub use alloy_runtime::config::load_config;

    #[cfg(feature = "macros")]
    pub use alloy_macros::CapabilityInfo;
}
