//! Top-level runtime orchestrator.
//!
//! Wires the event bus, the extension registry, the lifecycle manager, and
//! the installer into the single object an embedding application stands up
//! once at startup, the same way the original bot framework's runtime tied
//! its registry and transport layers together behind one facade.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use alloy_core::collaborators::{ConfigStore, LoggerFactory, MainThreadExecutor, RepositoryManager, Verifier};
use alloy_core::event::EventBus;
use alloy_core::manifest::PluginManifest;

use alloy_framework::dependency::{resolve, DependencyGraph, ResolveInput};
use alloy_framework::error::DependencyResult;
use alloy_framework::extension::ExtensionRegistry;

use crate::config::AlloyConfig;
use crate::error::{AlloyResult, InstallResult};
use crate::host::{
    ApiRegistry, Cloud, DatabasePool, FileHelper, PluginHost, PluginHostBuilder, RemoteServices,
    Security, TaskManager, TaskScheduler,
};
use crate::installer::{HookResolver, InstallOptions, InstalledPluginRecord, Installer};
use crate::lifecycle::LifecycleManager;

/// Builds an [`AlloyRuntime`], wiring in configuration and whichever
/// collaborators the embedding application has concrete adapters for. Every
/// collaborator is optional: a runtime with none of them wired in still
/// works, it just has nothing to hand out through [`AlloyRuntime::host_for`].
#[derive(Default)]
pub struct AlloyRuntimeBuilder {
    config: Option<AlloyConfig>,
    logger_factory: Option<Arc<dyn LoggerFactory>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    main_thread: Option<Arc<dyn MainThreadExecutor>>,
    verifier: Option<Arc<dyn Verifier>>,
    repositories: Option<Arc<RepositoryManager>>,
    file_helper: Option<Arc<dyn FileHelper>>,
    task_scheduler: Option<Arc<dyn TaskScheduler>>,
    database_pool: Option<Arc<dyn DatabasePool>>,
    remote_services: Option<Arc<dyn RemoteServices>>,
    security: Option<Arc<dyn Security>>,
    api_registry: Option<Arc<dyn ApiRegistry>>,
    cloud: Option<Arc<dyn Cloud>>,
    task_manager: Option<Arc<dyn TaskManager>>,
}

impl AlloyRuntimeBuilder {
    /// Starts a builder with no configuration or collaborators set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration. Defaults to [`AlloyConfig::default`] if unset.
    pub fn config(mut self, config: AlloyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the logger factory collaborator.
    pub fn logger_factory(mut self, factory: Arc<dyn LoggerFactory>) -> Self {
        self.logger_factory = Some(factory);
        self
    }

    /// Sets the config store collaborator.
    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(store);
        self
    }

    /// Sets the main-thread executor used to dispatch UI-affecting lifecycle
    /// hooks and event subscriptions registered from off the main thread.
    pub fn main_thread(mut self, executor: Arc<dyn MainThreadExecutor>) -> Self {
        self.main_thread = Some(executor);
        self
    }

    /// Sets the signature verifier used by the installer.
    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Sets the repository manager used for dependency fetches and publishing.
    pub fn repositories(mut self, repositories: Arc<RepositoryManager>) -> Self {
        self.repositories = Some(repositories);
        self
    }

    /// Sets the file helper collaborator, handed to every plugin's host.
    pub fn file_helper(mut self, helper: Arc<dyn FileHelper>) -> Self {
        self.file_helper = Some(helper);
        self
    }

    /// Sets the task scheduler collaborator, handed to every plugin's host.
    pub fn task_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.task_scheduler = Some(scheduler);
        self
    }

    /// Sets the database pool collaborator, handed to every plugin's host.
    pub fn database_pool(mut self, pool: Arc<dyn DatabasePool>) -> Self {
        self.database_pool = Some(pool);
        self
    }

    /// Sets the remote services collaborator, handed to every plugin's host.
    pub fn remote_services(mut self, services: Arc<dyn RemoteServices>) -> Self {
        self.remote_services = Some(services);
        self
    }

    /// Sets the security collaborator, handed to every plugin's host.
    pub fn security(mut self, security: Arc<dyn Security>) -> Self {
        self.security = Some(security);
        self
    }

    /// Sets the API registry collaborator, handed to every plugin's host.
    pub fn api_registry(mut self, registry: Arc<dyn ApiRegistry>) -> Self {
        self.api_registry = Some(registry);
        self
    }

    /// Sets the cloud services collaborator, handed to every plugin's host.
    pub fn cloud(mut self, cloud: Arc<dyn Cloud>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Sets the task manager collaborator, handed to every plugin's host.
    pub fn task_manager(mut self, manager: Arc<dyn TaskManager>) -> Self {
        self.task_manager = Some(manager);
        self
    }

    /// Loads the installed-plugin registry and stands up the runtime.
    ///
    /// Every previously installed, enabled plugin is registered with the
    /// lifecycle manager at [`PluginState::Discovered`](crate::lifecycle::PluginState::Discovered);
    /// nothing is loaded or activated here, that's [`AlloyRuntime::loading_order`]
    /// plus the embedding application's own load loop.
    pub async fn build(self) -> AlloyResult<AlloyRuntime> {
        let config = self.config.unwrap_or_default();

        let publish_timeout_ms = (config.event_bus_manager.publish_timeout * 1000.0).round() as u64;
        let event_bus = Arc::new(EventBus::new(
            config.event_bus_manager.max_queue_size,
            config.event_bus_manager.thread_pool_size,
            publish_timeout_ms,
            self.main_thread.clone(),
        ));
        event_bus.start().await;

        let extensions = Arc::new(ExtensionRegistry::new());
        let lifecycle = Arc::new(LifecycleManager::new(self.main_thread.clone()));
        let installer = Arc::new(
            Installer::load(
                config.installer.plugins_dir.clone(),
                lifecycle.clone(),
                self.verifier.clone(),
                self.repositories.clone(),
            )
            .await?,
        );

        Ok(AlloyRuntime {
            config,
            event_bus,
            extensions,
            lifecycle,
            installer,
            repositories: self.repositories,
            logger_factory: self.logger_factory,
            config_store: self.config_store,
            file_helper: self.file_helper,
            task_scheduler: self.task_scheduler,
            database_pool: self.database_pool,
            remote_services: self.remote_services,
            security: self.security,
            api_registry: self.api_registry,
            cloud: self.cloud,
            task_manager: self.task_manager,
            hosts: RwLock::new(HashMap::new()),
        })
    }
}

/// The single object an embedding application stands up once at startup.
///
/// Owns the event bus and extension registry directly, since nothing about
/// dispatching events or invoking extension implementations needs a
/// filesystem; coordinates the lifecycle manager and installer, which do.
pub struct AlloyRuntime {
    config: AlloyConfig,
    event_bus: Arc<EventBus>,
    extensions: Arc<ExtensionRegistry>,
    lifecycle: Arc<LifecycleManager>,
    installer: Arc<Installer>,
    repositories: Option<Arc<RepositoryManager>>,
    logger_factory: Option<Arc<dyn LoggerFactory>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    file_helper: Option<Arc<dyn FileHelper>>,
    task_scheduler: Option<Arc<dyn TaskScheduler>>,
    database_pool: Option<Arc<dyn DatabasePool>>,
    remote_services: Option<Arc<dyn RemoteServices>>,
    security: Option<Arc<dyn Security>>,
    api_registry: Option<Arc<dyn ApiRegistry>>,
    cloud: Option<Arc<dyn Cloud>>,
    task_manager: Option<Arc<dyn TaskManager>>,
    hosts: RwLock<HashMap<String, Arc<PluginHost>>>,
}

impl AlloyRuntime {
    /// Starts a builder.
    pub fn builder() -> AlloyRuntimeBuilder {
        AlloyRuntimeBuilder::new()
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &AlloyConfig {
        &self.config
    }

    /// The shared event bus.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// The shared extension registry.
    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// The lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// The installer.
    pub fn installer(&self) -> &Arc<Installer> {
        &self.installer
    }

    /// Builds (or returns a previously built) [`PluginHost`] for `plugin`,
    /// wiring in every collaborator this runtime was built with. Hosts are
    /// cached for the lifetime of the runtime so repeated calls for the same
    /// plugin return the same task/UI-component bookkeeping.
    pub fn host_for(&self, plugin: &str) -> Arc<PluginHost> {
        if let Some(host) = self.hosts.read().get(plugin) {
            return host.clone();
        }
        let mut builder = PluginHostBuilder::new();
        if let Some(v) = &self.logger_factory {
            builder = builder.logger_factory(v.clone());
        }
        if let Some(v) = &self.config_store {
            builder = builder.config_store(v.clone());
        }
        if let Some(v) = &self.file_helper {
            builder = builder.file_helper(v.clone());
        }
        if let Some(v) = &self.task_scheduler {
            builder = builder.task_scheduler(v.clone());
        }
        if let Some(v) = &self.database_pool {
            builder = builder.database_pool(v.clone());
        }
        if let Some(v) = &self.remote_services {
            builder = builder.remote_services(v.clone());
        }
        if let Some(v) = &self.security {
            builder = builder.security(v.clone());
        }
        if let Some(v) = &self.api_registry {
            builder = builder.api_registry(v.clone());
        }
        if let Some(v) = &self.cloud {
            builder = builder.cloud(v.clone());
        }
        if let Some(v) = &self.task_manager {
            builder = builder.task_manager(v.clone());
        }
        let host = Arc::new(builder.build(plugin, self.event_bus.clone(), self.extensions.clone()));
        self.hosts.write().insert(plugin.to_string(), host.clone());
        host
    }

    /// Installs the package at `package_path`. See [`Installer::install`].
    pub async fn install(
        &self,
        package_path: &Path,
        options: &InstallOptions,
        hook_resolver: &HookResolver<'_>,
    ) -> InstallResult<InstalledPluginRecord> {
        self.installer.install(package_path, options, hook_resolver).await
    }

    /// Computes a valid load order over every installed, enabled plugin.
    pub async fn loading_order(&self) -> InstallResult<Vec<String>> {
        self.installer.loading_order().await
    }

    /// Resolves the dependency graph installing `manifest` would require on
    /// top of the currently installed set, without installing anything.
    pub async fn resolve_dependencies(
        &self,
        manifest: &PluginManifest,
        resolve_transitives: bool,
    ) -> DependencyResult<DependencyGraph> {
        let installed = self.installer.installed().await;
        let installed_manifests: HashMap<String, PluginManifest> =
            installed.into_iter().map(|(name, record)| (name, record.manifest)).collect();
        let input = ResolveInput {
            root: manifest,
            installed: &installed_manifests,
            core_version: env!("CARGO_PKG_VERSION"),
            resolve_transitives,
            fetch_missing: false,
            repositories: self.repositories.clone(),
        };
        resolve(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_with_no_collaborators_still_builds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AlloyConfig::default();
        config.installer.plugins_dir = dir.path().to_path_buf();

        let runtime = AlloyRuntimeBuilder::new().config(config).build().await.unwrap();
        assert_eq!(runtime.loading_order().await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn host_for_is_cached_per_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AlloyConfig::default();
        config.installer.plugins_dir = dir.path().to_path_buf();

        let runtime = AlloyRuntimeBuilder::new().config(config).build().await.unwrap();
        let first = runtime.host_for("echo");
        first.register_task(
            "ping",
            Arc::new(|_args| Box::pin(async { Ok(serde_json::Value::String("pong".to_string())) })),
            serde_json::json!({}),
        );
        let second = runtime.host_for("echo");
        assert_eq!(second.status().registered_tasks, vec!["ping".to_string()]);
    }
}
