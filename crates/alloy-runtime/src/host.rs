//! Plugin Host Interface (§4.8).
//!
//! The single object a running plugin talks to: a service locator handing
//! out `Arc<dyn Trait>` handles to every external collaborator (§6) plus the
//! event bus this crate owns directly, along with the narrow pieces of
//! bookkeeping (task registration, UI component registration) that belong
//! to the host itself rather than to any one collaborator.
//!
//! The collaborators beyond §6's six named contracts — file helper, task
//! scheduler, database pool, remote services, security, API registry,
//! cloud, task manager — have no operations defined anywhere in this
//! crate's scope; they are modeled as empty marker traits so the host can
//! still hand out strongly-typed handles to them instead of erasing them
//! behind `dyn Any`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use alloy_core::collaborators::{ConfigStore, LoggerFactory};
use alloy_core::event::EventBus;

use alloy_framework::extension::ExtensionRegistry;

use crate::error::{HostError, HostResult};

/// Marker trait for a file I/O helper collaborator; no operations are
/// constrained by this crate.
pub trait FileHelper: Send + Sync {}
/// Marker trait for a background task scheduler collaborator.
pub trait TaskScheduler: Send + Sync {}
/// Marker trait for a database connection pool collaborator.
pub trait DatabasePool: Send + Sync {}
/// Marker trait for a remote-services client collaborator.
pub trait RemoteServices: Send + Sync {}
/// Marker trait for a security/permissions collaborator.
pub trait Security: Send + Sync {}
/// Marker trait for an API registry collaborator.
pub trait ApiRegistry: Send + Sync {}
/// Marker trait for a cloud-services collaborator.
pub trait Cloud: Send + Sync {}
/// Marker trait for a cross-plugin task manager collaborator.
pub trait TaskManager: Send + Sync {}

/// A task callable registered via [`PluginHost::register_task`].
pub type TaskFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

struct RegisteredTask {
    callable: TaskFn,
    properties: Value,
}

/// A UI component registration recorded via [`PluginHost::register_ui_component`].
#[derive(Debug, Clone)]
pub struct UiComponentRecord {
    /// The element handle returned by the UI integration collaborator.
    pub component: String,
    /// Caller-supplied classification (`"menu"`, `"dock_widget"`, ...).
    pub kind: String,
}

/// A snapshot of a host's own bookkeeping.
#[derive(Debug, Clone)]
pub struct HostStatus {
    /// The plugin this host was built for.
    pub plugin: String,
    /// Names of registered tasks.
    pub registered_tasks: Vec<String>,
    /// Registered UI components.
    pub ui_components: Vec<UiComponentRecord>,
}

/// Builds a [`PluginHost`], wiring in only the collaborators the embedding
/// application actually has.
#[derive(Default)]
pub struct PluginHostBuilder {
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
}

impl PluginHostBuilder {
    /// Starts a builder with no collaborators wired in.
    pub fn new() -> Self {
        Self::default()
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

    /// Sets the file helper collaborator.
    pub fn file_helper(mut self, helper: Arc<dyn FileHelper>) -> Self {
        self.file_helper = Some(helper);
        self
    }

    /// Sets the task scheduler collaborator.
    pub fn task_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.task_scheduler = Some(scheduler);
        self
    }

    /// Sets the database pool collaborator.
    pub fn database_pool(mut self, pool: Arc<dyn DatabasePool>) -> Self {
        self.database_pool = Some(pool);
        self
    }

    /// Sets the remote services collaborator.
    pub fn remote_services(mut self, services: Arc<dyn RemoteServices>) -> Self {
        self.remote_services = Some(services);
        self
    }

    /// Sets the security collaborator.
    pub fn security(mut self, security: Arc<dyn Security>) -> Self {
        self.security = Some(security);
        self
    }

    /// Sets the API registry collaborator.
    pub fn api_registry(mut self, registry: Arc<dyn ApiRegistry>) -> Self {
        self.api_registry = Some(registry);
        self
    }

    /// Sets the cloud services collaborator.
    pub fn cloud(mut self, cloud: Arc<dyn Cloud>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Sets the task manager collaborator.
    pub fn task_manager(mut self, manager: Arc<dyn TaskManager>) -> Self {
        self.task_manager = Some(manager);
        self
    }

    /// Finishes building a host scoped to `plugin`.
    pub fn build(self, plugin: impl Into<String>, event_bus: Arc<EventBus>, extensions: Arc<ExtensionRegistry>) -> PluginHost {
        PluginHost {
            plugin: plugin.into(),
            event_bus,
            extensions,
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
            tasks: RwLock::new(HashMap::new()),
            ui_components: RwLock::new(Vec::new()),
        }
    }
}

/// A plugin's single point of contact with everything outside its own code.
pub struct PluginHost {
    plugin: String,
    event_bus: Arc<EventBus>,
    extensions: Arc<ExtensionRegistry>,
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
    tasks: RwLock<HashMap<String, RegisteredTask>>,
    ui_components: RwLock<Vec<UiComponentRecord>>,
}

impl PluginHost {
    /// The plugin this host was built for.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// The event bus (owned directly by this crate, not an injected collaborator).
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// The extension registry (owned directly by this crate).
    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// The logger factory collaborator, if configured.
    pub fn logger_factory(&self) -> Option<&Arc<dyn LoggerFactory>> {
        self.logger_factory.as_ref()
    }

    /// The config store collaborator, if configured.
    pub fn config_store(&self) -> Option<&Arc<dyn ConfigStore>> {
        self.config_store.as_ref()
    }

    /// The file helper collaborator, if configured.
    pub fn file_helper(&self) -> Option<&Arc<dyn FileHelper>> {
        self.file_helper.as_ref()
    }

    /// The task scheduler collaborator, if configured.
    pub fn task_scheduler(&self) -> Option<&Arc<dyn TaskScheduler>> {
        self.task_scheduler.as_ref()
    }

    /// The database pool collaborator, if configured.
    pub fn database_pool(&self) -> Option<&Arc<dyn DatabasePool>> {
        self.database_pool.as_ref()
    }

    /// The remote services collaborator, if configured.
    pub fn remote_services(&self) -> Option<&Arc<dyn RemoteServices>> {
        self.remote_services.as_ref()
    }

    /// The security collaborator, if configured.
    pub fn security(&self) -> Option<&Arc<dyn Security>> {
        self.security.as_ref()
    }

    /// The API registry collaborator, if configured.
    pub fn api_registry(&self) -> Option<&Arc<dyn ApiRegistry>> {
        self.api_registry.as_ref()
    }

    /// The cloud services collaborator, if configured.
    pub fn cloud(&self) -> Option<&Arc<dyn Cloud>> {
        self.cloud.as_ref()
    }

    /// The task manager collaborator, if configured.
    pub fn task_manager(&self) -> Option<&Arc<dyn TaskManager>> {
        self.task_manager.as_ref()
    }

    /// Registers a named, callable task with arbitrary metadata.
    pub fn register_task(&self, name: impl Into<String>, callable: TaskFn, properties: Value) {
        self.tasks.write().insert(name.into(), RegisteredTask { callable, properties });
    }

    /// Runs a previously registered task by name.
    pub async fn execute_task(&self, name: &str, args: Vec<Value>) -> HostResult<Value> {
        let callable = {
            let tasks = self.tasks.read();
            tasks
                .get(name)
                .map(|task| task.callable.clone())
                .ok_or_else(|| HostError::UnknownTask(name.to_string()))?
        };
        callable(args).await.map_err(|reason| HostError::TaskFailed { name: name.to_string(), reason })
    }

    /// The declared properties of a registered task, if any.
    pub fn task_properties(&self, name: &str) -> Option<Value> {
        self.tasks.read().get(name).map(|task| task.properties.clone())
    }

    /// Records a UI component this plugin added, for later introspection via [`status`](Self::status).
    pub fn register_ui_component(&self, component: impl Into<String>, kind: impl Into<String>) {
        self.ui_components.write().push(UiComponentRecord {
            component: component.into(),
            kind: kind.into(),
        });
    }

    /// A snapshot of this host's own bookkeeping.
    pub fn status(&self) -> HostStatus {
        HostStatus {
            plugin: self.plugin.clone(),
            registered_tasks: self.tasks.read().keys().cloned().collect(),
            ui_components: self.ui_components.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::event::EventBus;

    #[tokio::test]
    async fn register_and_execute_task_round_trips() {
        let bus = Arc::new(EventBus::with_defaults(None));
        let extensions = Arc::new(ExtensionRegistry::default());
        let host = PluginHostBuilder::new().build("echo", bus, extensions);

        host.register_task(
            "ping",
            Arc::new(|_args| Box::pin(async { Ok(Value::String("pong".to_string())) })),
            serde_json::json!({"description": "replies pong"}),
        );

        let result = host.execute_task("ping", vec![]).await.unwrap();
        assert_eq!(result, Value::String("pong".to_string()));
        assert_eq!(host.status().registered_tasks, vec!["ping".to_string()]);
    }

    #[tokio::test]
    async fn executing_an_unregistered_task_fails() {
        let bus = Arc::new(EventBus::with_defaults(None));
        let extensions = Arc::new(ExtensionRegistry::default());
        let host = PluginHostBuilder::new().build("echo", bus, extensions);

        let err = host.execute_task("missing", vec![]).await.unwrap_err();
        assert!(matches!(err, HostError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn ui_components_accumulate_in_status() {
        let bus = Arc::new(EventBus::with_defaults(None));
        let extensions = Arc::new(ExtensionRegistry::default());
        let host = PluginHostBuilder::new().build("echo", bus, extensions);

        host.register_ui_component("menu-1", "menu");
        host.register_ui_component("dock-1", "dock_widget");

        let status = host.status();
        assert_eq!(status.ui_components.len(), 2);
    }
}
