//! Procedural macros for the Alloy plugin runtime.
//!
//! This crate provides:
//!
//! - `#[derive(CapabilityInfo)]` — generates per-variant metadata lookups
//!   (`token`, `risk_tier`, `description`, `from_token`) for a plugin
//!   capability enum, driven entirely by `#[capability(...)]` attributes.
//!
//! Capability tokens, risk tiers, and descriptions are data, not logic — this
//! derive exists purely so [`PluginCapability`](../alloy_core/manifest/schema/enum.PluginCapability.html)'s
//! thirteen variants don't need four hand-maintained, easily-desynced match
//! statements.
//!
//! ```rust,ignore
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, CapabilityInfo)]
//! pub enum PluginCapability {
//!     #[capability(token = "config.read", risk = "low", description = "Read configuration values")]
//!     ConfigRead,
//!     #[capability(token = "system.exec", risk = "high", description = "Execute system commands")]
//!     SystemExec,
//! }
//! ```

mod capability;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `token()`, `risk_tier()`, `description()`, and `from_token()` for a
/// fieldless enum whose variants carry `#[capability(token, risk, description)]`.
#[proc_macro_derive(CapabilityInfo, attributes(capability))]
pub fn derive_capability_info(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match capability::derive_capability_info(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
