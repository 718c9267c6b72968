//! External collaborator contracts (§6).
//!
//! The core never implements a GUI, a database pool, file I/O helpers, an
//! HTTP client, or a logging sink — it only defines the narrow traits below
//! and consumes `Arc<dyn Trait>` handles supplied by the embedding
//! application at construction time. The one exception is [`Ed25519Verifier`],
//! a concrete, swappable default [`Verifier`] implementation.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::PackageError;

// =============================================================================
// Logger factory
// =============================================================================

/// A structured logging sink for a single named component.
///
/// The sink itself (file, syslog, OTLP, ...) is out of scope; this trait is
/// the narrow contract the core talks to.
pub trait Logger: Send + Sync {
    /// Logs a message at `debug` level with optional structured fields.
    fn debug(&self, message: &str, fields: &HashMap<String, Value>);
    /// Logs a message at `info` level with optional structured fields.
    fn info(&self, message: &str, fields: &HashMap<String, Value>);
    /// Logs a message at `warning` level with optional structured fields.
    fn warning(&self, message: &str, fields: &HashMap<String, Value>);
    /// Logs a message at `error` level with optional structured fields.
    fn error(&self, message: &str, fields: &HashMap<String, Value>);
}

/// Produces a named [`Logger`] for a component (e.g. a plugin name).
pub trait LoggerFactory: Send + Sync {
    /// Returns a logger scoped to `name`.
    fn get_logger(&self, name: &str) -> std::sync::Arc<dyn Logger>;
}

// =============================================================================
// Config store
// =============================================================================

/// A listener invoked with `(key, new_value)` whenever a matching config path changes.
pub type ConfigListener = std::sync::Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// A layered configuration store external to the core.
pub trait ConfigStore: Send + Sync {
    /// Reads `path`, returning `default` if absent.
    fn get(&self, path: &str, default: Option<Value>) -> Option<Value>;
    /// Writes `value` at `path`.
    fn set(&self, path: &str, value: Value);
    /// Registers `listener` to be invoked for every path starting with `prefix`.
    fn register_listener(&self, prefix: &str, listener: ConfigListener);
}

// =============================================================================
// Main-thread executor
// =============================================================================

/// Runs submitted work on a single designated thread (typically the UI thread).
pub trait MainThreadExecutor: Send + Sync {
    /// Submits `task` to run on the main thread; does not wait for completion.
    fn run_on_main_thread(&self, task: BoxFuture<'static, ()>);
    /// Submits `task` to run on the main thread and blocks until it completes.
    fn run_on_main_thread_sync(&self, task: BoxFuture<'static, ()>);
    /// Returns whether the calling thread is the main thread.
    fn is_main_thread(&self) -> bool;
}

// =============================================================================
// Repository client
// =============================================================================

/// A single version entry returned by [`RepositoryClient::get_plugin_versions`].
#[derive(Debug, Clone)]
pub struct RepositoryPluginVersion {
    /// Semver string.
    pub version: String,
    /// Whether this version is yanked/deprecated.
    pub yanked: bool,
}

/// A summary record returned by [`RepositoryClient::search`].
#[derive(Debug, Clone)]
pub struct RepositorySearchResult {
    /// Plugin name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Latest published version.
    pub latest_version: String,
}

/// A single named plugin repository (e.g. a package index).
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Searches the repository for plugins matching `query`.
    async fn search(&self, query: &str) -> PackageResultAlias<Vec<RepositorySearchResult>>;
    /// Lists the known versions of `name`.
    async fn get_plugin_versions(&self, name: &str) -> PackageResultAlias<Vec<RepositoryPluginVersion>>;
    /// Downloads `name` (optionally pinned to `version`), returning the local package path.
    async fn download_plugin(&self, name: &str, version: Option<&str>) -> PackageResultAlias<PathBuf>;
    /// Publishes the package at `path`.
    async fn publish_plugin(&self, path: &PathBuf, notes: &str, public: bool) -> PackageResultAlias<()>;
}

type PackageResultAlias<T> = Result<T, PackageError>;

/// Aggregates multiple named [`RepositoryClient`]s with a chosen default.
pub struct RepositoryManager {
    repositories: HashMap<String, std::sync::Arc<dyn RepositoryClient>>,
    default_repository: String,
}

impl RepositoryManager {
    /// Creates a manager whose default repository is `default_repository`.
    pub fn new(default_repository: impl Into<String>) -> Self {
        Self {
            repositories: HashMap::new(),
            default_repository: default_repository.into(),
        }
    }

    /// Registers a named repository.
    pub fn register(&mut self, name: impl Into<String>, client: std::sync::Arc<dyn RepositoryClient>) {
        self.repositories.insert(name.into(), client);
    }

    /// Looks up a repository by name, falling back to the default when `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> Option<std::sync::Arc<dyn RepositoryClient>> {
        let key = name.unwrap_or(&self.default_repository);
        self.repositories.get(key).cloned()
    }

    /// Iterates repositories in registration order, the default first.
    pub fn search_order(&self) -> Vec<std::sync::Arc<dyn RepositoryClient>> {
        let mut out = Vec::new();
        if let Some(default) = self.repositories.get(&self.default_repository) {
            out.push(default.clone());
        }
        for (name, repo) in &self.repositories {
            if name != &self.default_repository {
                out.push(repo.clone());
            }
        }
        out
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Verifies a package's detached signature against its content.
///
/// This is the crate's stand-in for sandboxed isolation (an explicit
/// Non-goal): trust is established by signature, not by confinement.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Returns whether `content` (the package's integrity hash bytes) is
    /// validly signed by `signature_b64` (base64-encoded detached signature).
    async fn verify(&self, content: &[u8], signature_b64: &str) -> bool;
}

/// Default [`Verifier`] checking an Ed25519 detached signature.
///
/// `signature` in the manifest is base64-encoded; the signed content is the
/// SHA-256 integrity digest produced by [`crate::package`]'s hash index.
pub struct Ed25519Verifier {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl Ed25519Verifier {
    /// Builds a verifier from a 32-byte Ed25519 public key.
    pub fn new(verifying_key: ed25519_dalek::VerifyingKey) -> Self {
        Self { verifying_key }
    }

    /// Builds a verifier from a base64-encoded 32-byte public key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, PackageError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| PackageError::VerificationFailed(format!("invalid public key: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PackageError::VerificationFailed("public key must be 32 bytes".into()))?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&array)
            .map_err(|e| PackageError::VerificationFailed(format!("invalid public key: {e}")))?;
        Ok(Self::new(verifying_key))
    }
}

#[async_trait]
impl Verifier for Ed25519Verifier {
    async fn verify(&self, content: &[u8], signature_b64: &str) -> bool {
        use ed25519_dalek::Verifier as _;

        let Ok(sig_bytes) = base64::engine::general_purpose::STANDARD.decode(signature_b64) else {
            return false;
        };
        let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&sig_array);
        self.verifying_key.verify(content, &signature).is_ok()
    }
}

// =============================================================================
// UI Integration
// =============================================================================

/// Handle to an installed UI element, opaque to the core.
pub type UiElementHandle = String;

/// The UI-affecting surface a plugin may use once `on_ui_ready` has fired.
pub trait UiIntegration: Send + Sync {
    /// Finds an existing menu by path, if any.
    fn find_menu(&self, path: &str) -> Option<UiElementHandle>;
    /// Creates a new top-level menu.
    fn add_menu(&self, name: &str) -> UiElementHandle;
    /// Adds an action to an existing menu.
    fn add_menu_action(&self, menu: &UiElementHandle, label: &str) -> UiElementHandle;
    /// Creates a new toolbar.
    fn add_toolbar(&self, name: &str) -> UiElementHandle;
    /// Adds an action to an existing toolbar.
    fn add_toolbar_action(&self, toolbar: &UiElementHandle, label: &str) -> UiElementHandle;
    /// Adds a dockable widget, returning its handle.
    fn add_dock_widget(&self, name: &str) -> UiElementHandle;
    /// Adds a top-level page, returning its handle.
    fn add_page(&self, name: &str) -> UiElementHandle;
    /// Removes a previously added page.
    fn remove_page(&self, handle: &UiElementHandle);
    /// Removes every UI element owned by `plugin_name`.
    fn cleanup_plugin(&self, plugin_name: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use ed25519_dalek::Signer;
    use rand_core::OsRng;

    #[tokio::test]
    async fn ed25519_verifier_accepts_valid_signature_and_rejects_tampering() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let verifier = Ed25519Verifier::new(verifying_key);

        let content = b"integrity-digest-bytes";
        let signature = signing_key.sign(content);
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        assert!(verifier.verify(content, &sig_b64).await);
        assert!(!verifier.verify(b"tampered", &sig_b64).await);
    }
}
