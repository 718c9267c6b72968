//! Plugin Lifecycle Manager (§4.7).
//!
//! Drives each installed plugin through its state machine and runs the
//! lifecycle hooks a manifest declares. Hook callables are never resolved by
//! reflection: the embedding host resolves a manifest's dotted
//! `lifecycle_hooks` paths to real callables ahead of time (the same way
//! [`alloy_framework::ExtensionRegistry`] resolves extension implementations)
//! and registers them with [`LifecycleManager::register_hooks`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::warn;

use alloy_core::collaborators::{MainThreadExecutor, UiIntegration};
use alloy_core::manifest::LifecycleHook;

use crate::error::{LifecycleError, LifecycleResult};

/// A plugin's position in its lifecycle.
///
/// ```text
/// Discovered -> Loading -> Initializing -> Initialized -> UiReady -> Active
///      \            \             \               \            \       /
///       `---------------------------> Failed <-------------------------'
/// Active -> Disabling -> Inactive -> Discovered (on re-enable)
/// ```
///
/// `Failed` is reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Manifest has been read and validated but nothing has been loaded.
    Discovered,
    /// Entry point is being loaded into memory.
    Loading,
    /// `pre_enable`-adjacent setup is running.
    Initializing,
    /// Fully initialized, awaiting UI readiness.
    Initialized,
    /// `on_ui_ready` has fired; UI-affecting hooks may now run.
    UiReady,
    /// Running normally.
    Active,
    /// `pre_disable` has run; tearing down.
    Disabling,
    /// Disabled; may be re-enabled (returning to `Discovered`) or uninstalled.
    Inactive,
    /// Entered an unrecoverable error state from any other state.
    Failed,
}

fn is_allowed_transition(from: PluginState, to: PluginState) -> bool {
    use PluginState::*;
    if to == Failed {
        return true;
    }
    matches!(
        (from, to),
        (Discovered, Loading)
            | (Loading, Initializing)
            | (Initializing, Initialized)
            | (Initialized, UiReady)
            | (UiReady, Active)
            | (Active, Disabling)
            | (Disabling, Inactive)
            | (Inactive, Discovered)
    )
}

/// Context passed to a hook callable.
pub struct HookContext {
    /// The plugin the hook runs for.
    pub plugin: String,
    /// Which hook kind is running.
    pub hook: LifecycleHook,
    /// The UI integration surface, available once the plugin has reached
    /// `UiReady` or later; `None` otherwise.
    pub ui: Option<Arc<dyn UiIntegration>>,
}

/// A registered lifecycle hook callable.
pub type HookFn = Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Drives plugin state transitions and lifecycle hook execution.
///
/// Holds three separate locks — state, hook recursion guard, and
/// UI-integration records — so that running a hook never holds a lock a
/// re-entrant call into this manager would also need.
pub struct LifecycleManager {
    states: RwLock<HashMap<String, PluginState>>,
    hooks: RwLock<HashMap<String, HashMap<LifecycleHook, HookFn>>>,
    recursion_guard: Mutex<HashSet<String>>,
    ui_integrations: RwLock<HashMap<String, Arc<dyn UiIntegration>>>,
    ui_ready_notify: RwLock<HashMap<String, Arc<Notify>>>,
    main_thread: Option<Arc<dyn MainThreadExecutor>>,
}

impl LifecycleManager {
    /// Creates a manager. `main_thread` is consulted only for UI-affecting
    /// hooks (`post_enable`, `pre_disable`); pass `None` for headless hosts,
    /// in which case those hooks simply run inline.
    pub fn new(main_thread: Option<Arc<dyn MainThreadExecutor>>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
            recursion_guard: Mutex::new(HashSet::new()),
            ui_integrations: RwLock::new(HashMap::new()),
            ui_ready_notify: RwLock::new(HashMap::new()),
            main_thread,
        }
    }

    /// Registers a newly discovered plugin, starting it at [`PluginState::Discovered`].
    pub fn discover(&self, plugin: &str) {
        self.states.write().insert(plugin.to_string(), PluginState::Discovered);
    }

    /// Registers (or replaces) the resolved hook callables for `plugin`.
    pub fn register_hooks(&self, plugin: &str, hooks: HashMap<LifecycleHook, HookFn>) {
        self.hooks.write().insert(plugin.to_string(), hooks);
    }

    /// Removes all bookkeeping for `plugin`: state, hooks, and UI records.
    pub fn forget(&self, plugin: &str) {
        self.states.write().remove(plugin);
        self.hooks.write().remove(plugin);
        self.cleanup_ui(plugin);
    }

    /// The plugin's current state, if known.
    pub fn state(&self, plugin: &str) -> Option<PluginState> {
        self.states.read().get(plugin).copied()
    }

    /// Attempts a state transition, validating it against the state machine.
    pub fn transition(&self, plugin: &str, to: PluginState) -> LifecycleResult<()> {
        let mut states = self.states.write();
        let from = *states
            .get(plugin)
            .ok_or_else(|| LifecycleError::UnknownPlugin(plugin.to_string()))?;
        if !is_allowed_transition(from, to) {
            return Err(LifecycleError::InvalidTransition {
                plugin: plugin.to_string(),
                from,
                to,
            });
        }
        states.insert(plugin.to_string(), to);
        Ok(())
    }

    /// Runs `hook` for `plugin` if one is registered; a no-op (`Ok(())`)
    /// otherwise. Recursive invocation of the same `(plugin, hook)` pair is
    /// detected and suppressed with a warning rather than treated as an error.
    pub async fn run_hook(
        &self,
        plugin: &str,
        hook: LifecycleHook,
        ui: Option<Arc<dyn UiIntegration>>,
    ) -> LifecycleResult<()> {
        let hook_fn = {
            let hooks = self.hooks.read();
            hooks.get(plugin).and_then(|m| m.get(&hook)).cloned()
        };
        let Some(hook_fn) = hook_fn else {
            return Ok(());
        };
        self.invoke_hook_fn(plugin, hook, &hook_fn, ui).await
    }

    /// Runs a hook callable directly, without requiring it to have been
    /// registered via [`register_hooks`](Self::register_hooks) first. The
    /// installer uses this for `pre_install`/`post_install`, which must run
    /// against code the lifecycle manager has no prior record of.
    pub async fn invoke_hook_fn(
        &self,
        plugin: &str,
        hook: LifecycleHook,
        hook_fn: &HookFn,
        ui: Option<Arc<dyn UiIntegration>>,
    ) -> LifecycleResult<()> {
        let key = format!("{plugin}:{hook}");
        {
            let mut guard = self.recursion_guard.lock();
            if !guard.insert(key.clone()) {
                warn!(plugin, %hook, "recursive lifecycle hook invocation suppressed");
                return Ok(());
            }
        }
        let result = self.execute(plugin, hook, hook_fn, ui).await;
        self.recursion_guard.lock().remove(&key);
        result
    }

    async fn execute(
        &self,
        plugin: &str,
        hook: LifecycleHook,
        hook_fn: &HookFn,
        ui: Option<Arc<dyn UiIntegration>>,
    ) -> LifecycleResult<()> {
        let needs_main_thread = hook.is_ui_affecting()
            && self
                .main_thread
                .as_ref()
                .is_some_and(|executor| !executor.is_main_thread());

        if needs_main_thread {
            let executor = self.main_thread.clone().expect("checked above");
            let (tx, rx) = tokio::sync::oneshot::channel();
            let hook_fn = hook_fn.clone();
            let context = HookContext {
                plugin: plugin.to_string(),
                hook,
                ui,
            };
            let task: BoxFuture<'static, ()> = Box::pin(async move {
                let outcome = hook_fn(context).await;
                let _ = tx.send(outcome);
            });
            executor.run_on_main_thread_sync(task);
            return rx
                .await
                .unwrap_or_else(|_| Err("main-thread executor dropped the hook result".to_string()))
                .map_err(|reason| LifecycleError::HookFailed {
                    plugin: plugin.to_string(),
                    hook,
                    reason,
                });
        }

        let context = HookContext {
            plugin: plugin.to_string(),
            hook,
            ui,
        };
        hook_fn(context).await.map_err(|reason| LifecycleError::HookFailed {
            plugin: plugin.to_string(),
            hook,
            reason,
        })
    }

    /// Records the UI integration surface for `plugin`, notifying anyone
    /// blocked in [`wait_for_ui_ready`](Self::wait_for_ui_ready).
    pub fn set_ui_integration(&self, plugin: &str, ui: Arc<dyn UiIntegration>) {
        self.ui_integrations.write().insert(plugin.to_string(), ui);
        let notify = self.notify_for(plugin);
        notify.notify_waiters();
    }

    /// The UI integration surface for `plugin`, if `on_ui_ready` has fired.
    pub fn ui_integration(&self, plugin: &str) -> Option<Arc<dyn UiIntegration>> {
        self.ui_integrations.read().get(plugin).cloned()
    }

    fn notify_for(&self, plugin: &str) -> Arc<Notify> {
        if let Some(notify) = self.ui_ready_notify.read().get(plugin) {
            return notify.clone();
        }
        self.ui_ready_notify
            .write()
            .entry(plugin.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Waits until `plugin` reaches `UiReady` or later, or `timeout` elapses
    /// (waiting forever if `timeout` is `None`). Returns `true` if the
    /// plugin is ready, `false` on timeout.
    pub async fn wait_for_ui_ready(&self, plugin: &str, timeout: Option<Duration>) -> bool {
        if self.ui_integrations.read().contains_key(plugin) {
            return true;
        }
        let notify = self.notify_for(plugin);
        let wait = notify.notified();
        match timeout {
            Some(duration) => tokio::time::timeout(duration, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }

    /// Removes `plugin`'s UI integration record, if any. Idempotent: calling
    /// this on a plugin with no UI record is a no-op.
    pub fn cleanup_ui(&self, plugin: &str) {
        self.ui_integrations.write().remove(plugin);
        self.ui_ready_notify.write().remove(plugin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn valid_transitions_succeed_in_order() {
        let manager = LifecycleManager::new(None);
        manager.discover("echo");
        for state in [
            PluginState::Loading,
            PluginState::Initializing,
            PluginState::Initialized,
            PluginState::UiReady,
            PluginState::Active,
            PluginState::Disabling,
            PluginState::Inactive,
            PluginState::Discovered,
        ] {
            manager.transition("echo", state).unwrap();
            assert_eq!(manager.state("echo"), Some(state));
        }
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let manager = LifecycleManager::new(None);
        manager.discover("echo");
        let err = manager.transition("echo", PluginState::Active).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn failed_is_reachable_from_any_state() {
        let manager = LifecycleManager::new(None);
        manager.discover("echo");
        manager.transition("echo", PluginState::Loading).unwrap();
        manager.transition("echo", PluginState::Failed).unwrap();
        assert_eq!(manager.state("echo"), Some(PluginState::Failed));
    }

    #[tokio::test]
    async fn hook_with_no_registration_is_a_no_op() {
        let manager = LifecycleManager::new(None);
        manager.discover("echo");
        manager.run_hook("echo", LifecycleHook::PostEnable, None).await.unwrap();
    }

    #[tokio::test]
    async fn registered_hook_runs_and_reports_failure() {
        let manager = LifecycleManager::new(None);
        manager.discover("echo");
        let mut hooks = HashMap::new();
        hooks.insert(
            LifecycleHook::PreUninstall,
            Arc::new(|_ctx: HookContext| -> BoxFuture<'static, Result<(), String>> {
                Box::pin(async { Err("disk is on fire".to_string()) })
            }) as HookFn,
        );
        manager.register_hooks("echo", hooks);

        let err = manager
            .run_hook("echo", LifecycleHook::PreUninstall, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::HookFailed { .. }));
    }

    #[tokio::test]
    async fn recursive_hook_invocation_is_suppressed_not_errored() {
        let manager = Arc::new(LifecycleManager::new(None));
        let entered = Arc::new(AtomicBool::new(false));
        let inner_manager = manager.clone();
        let inner_entered = entered.clone();

        manager.discover("echo");
        let mut hooks = HashMap::new();
        hooks.insert(
            LifecycleHook::PostInstall,
            Arc::new(move |_ctx: HookContext| -> BoxFuture<'static, Result<(), String>> {
                let manager = inner_manager.clone();
                let entered = inner_entered.clone();
                Box::pin(async move {
                    entered.store(true, Ordering::SeqCst);
                    // Recursive call into the same (plugin, hook) pair.
                    manager.run_hook("echo", LifecycleHook::PostInstall, None).await.unwrap();
                    Ok(())
                })
            }) as HookFn,
        );
        manager.register_hooks("echo", hooks);

        manager.run_hook("echo", LifecycleHook::PostInstall, None).await.unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wait_for_ui_ready_resolves_once_integration_is_set() {
        let manager = Arc::new(LifecycleManager::new(None));
        manager.discover("echo");

        let waiter_manager = manager.clone();
        let waiter = tokio::spawn(async move { waiter_manager.wait_for_ui_ready("echo", None).await });

        tokio::task::yield_now().await;
        struct NoopUi;
        impl UiIntegration for NoopUi {
            fn find_menu(&self, _path: &str) -> Option<String> {
                None
            }
            fn add_menu(&self, _name: &str) -> String {
                String::new()
            }
            fn add_menu_action(&self, _menu: &String, _label: &str) -> String {
                String::new()
            }
            fn add_toolbar(&self, _name: &str) -> String {
                String::new()
            }
            fn add_toolbar_action(&self, _toolbar: &String, _label: &str) -> String {
                String::new()
            }
            fn add_dock_widget(&self, _name: &str) -> String {
                String::new()
            }
            fn add_page(&self, _name: &str) -> String {
                String::new()
            }
            fn remove_page(&self, _handle: &String) {}
            fn cleanup_plugin(&self, _plugin_name: &str) {}
        }
        manager.set_ui_integration("echo", Arc::new(NoopUi));

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_ui_ready_times_out_when_never_signaled() {
        let manager = LifecycleManager::new(None);
        manager.discover("echo");
        let ready = manager.wait_for_ui_ready("echo", Some(Duration::from_millis(20))).await;
        assert!(!ready);
    }

    #[test]
    fn cleanup_ui_is_idempotent() {
        let manager = LifecycleManager::new(None);
        manager.cleanup_ui("never-existed");
        manager.cleanup_ui("never-existed");
    }
}
