//! Extension registry (§4.5): plugins publish extension points others can
//! fill, and declare uses of points published elsewhere.
//!
//! Grounded on the teacher's service-locator-style `ServiceEntry` table in
//! `alloy-framework/src/plugin/core.rs`, generalized from compile-time
//! `define_plugin!` entries to runtime manifest-declared points/uses, and
//! from a flat name table to the spec's `(provider, id)` composite key.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use alloy_core::manifest::{is_extension_compatible, parse_version, PluginExtensionPoint, PluginExtensionUse};

use crate::error::{ExtensionError, ExtensionResult};

/// A registered extension point, keyed by `(provider, id)`.
#[derive(Debug, Clone)]
struct RegisteredPoint {
    declaration: PluginExtensionPoint,
    provider: String,
}

/// A registered implementation of some extension point.
#[derive(Debug, Clone)]
struct RegisteredImplementation {
    consumer: String,
    declared_version: String,
    /// The callable path resolved per the naming rule (§4.5): one of
    /// `{provider}_{id}`, `implement_{provider}_{id}`, `extension_{provider}_{id}`.
    callable: String,
}

/// A use of an extension point not yet (or no longer) satisfied by a
/// registered implementation, keyed by `"{provider}.{id}"`.
#[derive(Debug, Clone)]
pub struct PendingUse {
    /// The declaration driving this pending use.
    pub declaration: PluginExtensionUse,
    /// The plugin that declared the use.
    pub consumer: String,
}

/// The result of invoking every implementation of an extension point.
///
/// Per-implementation failures are folded into the `"error"` key of that
/// implementation's own result map rather than aborting the whole
/// invocation — one broken plugin must not take down every other
/// implementation of a shared point.
pub type InvocationResult = HashMap<String, HashMap<String, Value>>;

/// A consumer's name-resolution callback, stored so a point that registers
/// *after* the consumer can still drain that consumer's pending uses.
type CallableResolver = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct State {
    points: HashMap<(String, String), RegisteredPoint>,
    implementations: HashMap<(String, String), Vec<RegisteredImplementation>>,
    pending_uses: HashMap<String, Vec<PendingUse>>,
    resolvers: HashMap<String, CallableResolver>,
}

/// Registry of extension points and their implementations.
///
/// Internally synchronized with a sync [`parking_lot::RwLock`] since no
/// registration or lookup path awaits — they only ever touch in-memory
/// maps, matching the concurrency split documented for the framework layer.
pub struct ExtensionRegistry {
    state: RwLock<State>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Registers every extension point and use declared by `manifest`,
    /// attempting to satisfy any pending uses the new points resolve and
    /// recording any uses this plugin declares that cannot yet be satisfied.
    ///
    /// Name resolution for implementations follows §4.5: a plugin
    /// implementing `{provider}.{id}` is expected to expose a callable named
    /// `{provider}_{id}`, `implement_{provider}_{id}`, or
    /// `extension_{provider}_{id}` — the first of these three that the
    /// caller reports as present (via `resolve_callable`) wins.
    pub fn register_plugin_extensions(
        &self,
        plugin: &str,
        points: &[PluginExtensionPoint],
        uses: &[PluginExtensionUse],
        resolve_callable: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> ExtensionResult<()> {
        let mut state = self.state.write();
        state.resolvers.insert(plugin.to_string(), Arc::new(resolve_callable));

        let mut drain_errors = Vec::new();
        for point in points {
            let key = (plugin.to_string(), point.id.clone());
            state.points.insert(
                key,
                RegisteredPoint {
                    declaration: point.clone(),
                    provider: plugin.to_string(),
                },
            );
            debug!(provider = plugin, point = %point.id, "extension point registered");
            if let Err(e) = Self::drain_pending(&mut state, plugin, &point.id) {
                drain_errors.push(e);
            }
        }
        if let Some(err) = drain_errors.into_iter().next() {
            return Err(err);
        }

        for use_ in uses {
            let key = (use_.provider.clone(), use_.id.clone());
            let candidates = [
                format!("{}_{}", use_.provider, use_.id),
                format!("implement_{}_{}", use_.provider, use_.id),
                format!("extension_{}_{}", use_.provider, use_.id),
            ];
            let callable = candidates.iter().find_map(|name| resolve_callable(name));

            match (state.points.get(&key), callable) {
                (Some(point), Some(callable)) => {
                    let required = parse_version(&use_.version).map_err(|e| {
                        ExtensionError::Manifest(alloy_core::error::ManifestError::InvalidVersion {
                            version: use_.version.clone(),
                            reason: e.to_string(),
                        })
                    })?;
                    let available = parse_version(&point.declaration.version).map_err(|e| {
                        ExtensionError::Manifest(alloy_core::error::ManifestError::InvalidVersion {
                            version: point.declaration.version.clone(),
                            reason: e.to_string(),
                        })
                    })?;
                    if !is_extension_compatible(&available, &required) {
                        if use_.required {
                            return Err(ExtensionError::IncompatibleContract {
                                provider: use_.provider.clone(),
                                id: use_.id.clone(),
                                consumer: plugin.to_string(),
                                required: use_.version.clone(),
                                available: point.declaration.version.clone(),
                            });
                        }
                        warn!(
                            consumer = plugin,
                            provider = %use_.provider,
                            id = %use_.id,
                            "optional extension use is contract-incompatible, leaving pending"
                        );
                        Self::push_pending(&mut state, use_, plugin);
                        continue;
                    }
                    let slot = state.implementations.entry(key).or_default();
                    slot.retain(|impl_| impl_.consumer != plugin);
                    slot.push(RegisteredImplementation {
                        consumer: plugin.to_string(),
                        declared_version: use_.version.clone(),
                        callable,
                    });
                }
                _ => {
                    Self::push_pending(&mut state, use_, plugin);
                }
            }
        }

        Ok(())
    }

    fn push_pending(state: &mut State, use_: &PluginExtensionUse, plugin: &str) {
        let pending_key = format!("{}.{}", use_.provider, use_.id);
        state.pending_uses.entry(pending_key).or_default().push(PendingUse {
            declaration: use_.clone(),
            consumer: plugin.to_string(),
        });
    }

    /// Drains the pending-use bucket for `(provider, id)`, which just
    /// registered, attempting to install each pending implementation (§4.5:
    /// "on success, drains the pending-use bucket for that key").
    ///
    /// A pending entry resolves once its consumer's stored name-resolution
    /// callback yields a candidate callable; entries whose consumer hasn't
    /// registered a resolver yet, or whose callable still can't be found,
    /// stay pending. A version mismatch warns and stays pending for an
    /// optional use, or raises (and is dropped) for a required one.
    fn drain_pending(state: &mut State, provider: &str, id: &str) -> ExtensionResult<()> {
        let point_key = (provider.to_string(), id.to_string());
        let Some(point) = state.points.get(&point_key) else {
            return Ok(());
        };
        let available = match parse_version(&point.declaration.version) {
            Ok(v) => v,
            Err(_) => return Ok(()),
        };
        let point_version = point.declaration.version.clone();

        let pending_key = format!("{provider}.{id}");
        let Some(pending_list) = state.pending_uses.remove(&pending_key) else {
            return Ok(());
        };

        let candidates = [
            format!("{provider}_{id}"),
            format!("implement_{provider}_{id}"),
            format!("extension_{provider}_{id}"),
        ];

        let mut still_pending = Vec::new();
        let mut first_error = None;

        for pending in pending_list {
            let resolver = state.resolvers.get(&pending.consumer).cloned();
            let callable = resolver.and_then(|r| candidates.iter().find_map(|c| r(c)));

            let Some(callable) = callable else {
                still_pending.push(pending);
                continue;
            };
            let Ok(required) = parse_version(&pending.declaration.version) else {
                still_pending.push(pending);
                continue;
            };

            if is_extension_compatible(&available, &required) {
                let slot = state.implementations.entry(point_key.clone()).or_default();
                slot.retain(|impl_| impl_.consumer != pending.consumer);
                slot.push(RegisteredImplementation {
                    consumer: pending.consumer.clone(),
                    declared_version: pending.declaration.version.clone(),
                    callable,
                });
                debug!(
                    consumer = %pending.consumer,
                    provider,
                    id,
                    "pending extension use resolved"
                );
            } else if pending.declaration.required {
                if first_error.is_none() {
                    first_error = Some(ExtensionError::IncompatibleContract {
                        provider: provider.to_string(),
                        id: id.to_string(),
                        consumer: pending.consumer.clone(),
                        required: pending.declaration.version.clone(),
                        available: point_version.clone(),
                    });
                }
            } else {
                warn!(
                    consumer = %pending.consumer,
                    provider,
                    id,
                    "pending optional extension use remains contract-incompatible"
                );
                still_pending.push(pending);
            }
        }

        if !still_pending.is_empty() {
            state.pending_uses.insert(pending_key, still_pending);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Removes every point and implementation contributed by `plugin`
    /// (called on disable/uninstall per §4.7).
    pub fn unregister_plugin_extensions(&self, plugin: &str) {
        let mut state = self.state.write();
        state.points.retain(|(provider, _), _| provider != plugin);
        state.resolvers.remove(plugin);
        for implementations in state.implementations.values_mut() {
            implementations.retain(|impl_| impl_.consumer != plugin);
        }
        state.implementations.retain(|_, v| !v.is_empty());
        for pending in state.pending_uses.values_mut() {
            pending.retain(|p| p.consumer != plugin);
        }
        state.pending_uses.retain(|_, v| !v.is_empty());
    }

    /// Lists every consumer currently registered against `(provider, id)`.
    pub fn implementations_of(&self, provider: &str, id: &str) -> Vec<String> {
        let state = self.state.read();
        state
            .implementations
            .get(&(provider.to_string(), id.to_string()))
            .map(|v| v.iter().map(|i| i.consumer.clone()).collect())
            .unwrap_or_default()
    }

    /// Extension point uses that have never been satisfied, across all plugins.
    pub fn pending_uses(&self) -> Vec<PendingUse> {
        self.state.read().pending_uses.values().flatten().cloned().collect()
    }

    /// Invokes every registered implementation of `(provider, id)` via
    /// `invoke`, which receives the implementation's resolved callable path
    /// and returns its raw result map. A failing `invoke` call does not
    /// abort the others — its error is recorded as `{"error": message}`
    /// under that implementation's consumer key.
    pub fn invoke_all(
        &self,
        provider: &str,
        id: &str,
        invoke: impl Fn(&str, &str) -> Result<HashMap<String, Value>, String>,
    ) -> ExtensionResult<InvocationResult> {
        let implementations = {
            let state = self.state.read();
            match state.implementations.get(&(provider.to_string(), id.to_string())) {
                Some(v) => v.clone(),
                None => {
                    return Err(ExtensionError::UnknownExtensionPoint {
                        provider: provider.to_string(),
                        id: id.to_string(),
                    });
                }
            }
        };

        let mut results = InvocationResult::new();
        for implementation in implementations {
            let outcome = invoke(&implementation.callable, &implementation.declared_version);
            let entry = match outcome {
                Ok(value) => value,
                Err(message) => {
                    warn!(
                        consumer = %implementation.consumer,
                        provider,
                        id,
                        error = %message,
                        "extension implementation failed"
                    );
                    let mut error_entry = HashMap::new();
                    error_entry.insert("error".to_string(), Value::String(message));
                    error_entry
                }
            };
            results.insert(implementation.consumer, entry);
        }
        Ok(results)
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry").finish_non_exhaustive()
    }
}

/// Convenience wrapper for sharing one registry across collaborators.
pub type SharedExtensionRegistry = Arc<ExtensionRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn point(provider_point_id: &str, version: &str) -> PluginExtensionPoint {
        PluginExtensionPoint {
            id: provider_point_id.to_string(),
            name: provider_point_id.to_string(),
            description: String::new(),
            interface: "iface".into(),
            version: version.to_string(),
            parameters: HashMap::new(),
        }
    }

    fn use_(provider: &str, id: &str, version: &str, required: bool) -> PluginExtensionUse {
        PluginExtensionUse {
            provider: provider.to_string(),
            id: id.to_string(),
            version: version.to_string(),
            required,
        }
    }

    #[test]
    fn matching_implementation_resolves_and_invokes() {
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions("storage", &[point("backend", "1.0.0")], &[], |_| None)
            .unwrap();
        registry
            .register_plugin_extensions(
                "sqlite_backend",
                &[],
                &[use_("storage", "backend", "1.0.0", true)],
                |name| (name == "storage_backend").then(|| name.to_string()),
            )
            .unwrap();

        assert_eq!(registry.implementations_of("storage", "backend"), vec!["sqlite_backend"]);

        let result = registry
            .invoke_all("storage", "backend", |callable, _version| {
                assert_eq!(callable, "storage_backend");
                let mut map = HashMap::new();
                map.insert("ok".to_string(), Value::Bool(true));
                Ok(map)
            })
            .unwrap();
        assert!(result["sqlite_backend"]["ok"].as_bool().unwrap());
    }

    #[test]
    fn pending_use_resolves_once_provider_loads_later() {
        // Scenario 6 (§8): consumer Q loads before provider P. Q's use sits
        // pending until P registers the point, at which point it installs
        // automatically and invoking the point yields Q's result.
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions(
                "q",
                &[],
                &[use_("p", "pt", "1.0.0", true)],
                |name| (name == "p_pt").then(|| name.to_string()),
            )
            .unwrap();
        assert_eq!(registry.pending_uses().len(), 1);
        assert!(registry.implementations_of("p", "pt").is_empty());

        registry
            .register_plugin_extensions("p", &[point("pt", "1.0.0")], &[], |_| None)
            .unwrap();

        assert!(registry.pending_uses().is_empty());
        assert_eq!(registry.implementations_of("p", "pt"), vec!["q"]);

        let result = registry
            .invoke_all("p", "pt", |callable, _version| {
                assert_eq!(callable, "p_pt");
                let mut map = HashMap::new();
                map.insert("ok".to_string(), Value::Bool(true));
                Ok(map)
            })
            .unwrap();
        assert!(result["q"]["ok"].as_bool().unwrap());
    }

    #[test]
    fn unloading_consumer_drops_its_pending_entries() {
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions(
                "q",
                &[],
                &[use_("p", "pt", "1.0.0", true)],
                |name| (name == "p_pt").then(|| name.to_string()),
            )
            .unwrap();
        assert_eq!(registry.pending_uses().len(), 1);

        registry.unregister_plugin_extensions("q");
        assert!(registry.pending_uses().is_empty());
    }

    #[test]
    fn unresolvable_use_becomes_pending() {
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions(
                "consumer",
                &[],
                &[use_("ghost", "point", "1.0.0", false)],
                |_| None,
            )
            .unwrap();
        assert_eq!(registry.pending_uses().len(), 1);
    }

    #[test]
    fn required_use_with_incompatible_contract_is_rejected() {
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions("storage", &[point("backend", "1.0.0")], &[], |_| None)
            .unwrap();

        let err = registry
            .register_plugin_extensions(
                "consumer",
                &[],
                &[use_("storage", "backend", "2.0.0", true)],
                |name| (name == "storage_backend").then(|| name.to_string()),
            )
            .unwrap_err();
        assert!(matches!(err, ExtensionError::IncompatibleContract { .. }));
    }

    #[test]
    fn failing_implementation_is_folded_into_error_key_not_aborted() {
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions("storage", &[point("backend", "1.0.0")], &[], |_| None)
            .unwrap();
        registry
            .register_plugin_extensions(
                "broken_backend",
                &[],
                &[use_("storage", "backend", "1.0.0", true)],
                |name| (name == "storage_backend").then(|| name.to_string()),
            )
            .unwrap();

        let result = registry
            .invoke_all("storage", "backend", |_, _| Err("boom".to_string()))
            .unwrap();
        assert_eq!(result["broken_backend"]["error"], Value::String("boom".to_string()));
    }

    #[test]
    fn reinstalling_a_consumer_replaces_its_prior_entry_not_appends() {
        // §4.5: "An implementation is keyed (point, consumer_name); reinstalling
        // a consumer replaces its prior entry." A plugin reload/update calls
        // register_plugin_extensions a second time for the same consumer name.
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions("storage", &[point("backend", "1.0.0")], &[], |_| None)
            .unwrap();
        registry
            .register_plugin_extensions(
                "sqlite_backend",
                &[],
                &[use_("storage", "backend", "1.0.0", true)],
                |name| (name == "storage_backend").then(|| name.to_string()),
            )
            .unwrap();
        registry
            .register_plugin_extensions(
                "sqlite_backend",
                &[],
                &[use_("storage", "backend", "1.0.0", true)],
                |name| (name == "storage_backend").then(|| name.to_string()),
            )
            .unwrap();

        assert_eq!(registry.implementations_of("storage", "backend"), vec!["sqlite_backend"]);

        let mut calls = 0;
        let result = registry
            .invoke_all("storage", "backend", |_, _| {
                calls += 1;
                let mut map = HashMap::new();
                map.insert("ok".to_string(), Value::Bool(true));
                Ok(map)
            })
            .unwrap();
        assert_eq!(calls, 1, "reinstalled consumer must be invoked once, not once per registration");
        assert!(result["sqlite_backend"]["ok"].as_bool().unwrap());
    }

    #[test]
    fn reinstalling_a_pending_consumer_replaces_its_prior_entry_not_appends() {
        // Same invariant, exercised via drain_pending: the consumer registers
        // its use twice before the provider ever loads, so both registrations
        // land in the pending bucket and are drained together.
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions(
                "q",
                &[],
                &[use_("p", "pt", "1.0.0", true)],
                |name| (name == "p_pt").then(|| name.to_string()),
            )
            .unwrap();
        registry
            .register_plugin_extensions(
                "q",
                &[],
                &[use_("p", "pt", "1.0.0", true)],
                |name| (name == "p_pt").then(|| name.to_string()),
            )
            .unwrap();

        registry
            .register_plugin_extensions("p", &[point("pt", "1.0.0")], &[], |_| None)
            .unwrap();

        assert_eq!(registry.implementations_of("p", "pt"), vec!["q"]);
        let mut calls = 0;
        registry
            .invoke_all("p", "pt", |_, _| {
                calls += 1;
                Ok(HashMap::new())
            })
            .unwrap();
        assert_eq!(calls, 1, "reinstalled pending consumer must resolve to a single implementation");
    }

    #[test]
    fn unregister_removes_points_and_implementations() {
        let registry = ExtensionRegistry::new();
        registry
            .register_plugin_extensions("storage", &[point("backend", "1.0.0")], &[], |_| None)
            .unwrap();
        registry
            .register_plugin_extensions(
                "sqlite_backend",
                &[],
                &[use_("storage", "backend", "1.0.0", true)],
                |name| (name == "storage_backend").then(|| name.to_string()),
            )
            .unwrap();

        registry.unregister_plugin_extensions("storage");
        assert!(registry.implementations_of("storage", "backend").is_empty());
    }
}
