//! Plugin Installer / Integrated Installer (§4.6).
//!
//! Owns the on-disk installed-plugin registry and the install/uninstall/
//! update contracts. Signature verification and dependency fetch are
//! delegated to the [`Verifier`] and [`RepositoryManager`] collaborators;
//! everything about where files live under `plugins_dir` and how the
//! registry JSON is shaped is this module's own concern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use alloy_core::collaborators::{RepositoryManager, UiIntegration, Verifier};
use alloy_core::manifest::{LifecycleHook, PluginManifest};
use alloy_core::package::Package;

use alloy_framework::dependency::{resolve, DependencyGraph, ResolveInput, CORE_NODE};

use crate::error::{InstallError, InstallResult};
use crate::lifecycle::{HookFn, LifecycleManager};

const REGISTRY_FILE: &str = "installed.json";

/// An installed plugin's bookkeeping entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPluginRecord {
    /// The plugin's manifest as installed.
    pub manifest: PluginManifest,
    /// Directory this plugin's files live under (`{plugins_dir}/{name}/`).
    pub install_path: PathBuf,
    /// Whether the plugin should be loaded on startup.
    pub enabled: bool,
    /// RFC 3339 install timestamp.
    pub installed_at: String,
}

/// Options controlling an install or update.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Overwrite an already-installed plugin of the same name.
    pub force: bool,
    /// Skip signature verification even if a [`Verifier`] is configured.
    pub skip_verification: bool,
    /// Whether the plugin should be enabled immediately after install.
    pub enable: bool,
    /// Resolve the dependency graph before installing.
    pub resolve_dependencies: bool,
    /// When resolving dependencies, also fetch ones that are not already installed.
    pub install_dependencies: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            force: false,
            skip_verification: false,
            enable: true,
            resolve_dependencies: true,
            install_dependencies: false,
        }
    }
}

/// A function that resolves a manifest's `lifecycle_hooks` path for `hook`
/// into a runnable callable, or `None` if it can't (e.g. the hook isn't
/// declared, or loading the code at install time isn't supported by the
/// embedding host).
pub type HookResolver<'a> = dyn Fn(&Path, LifecycleHook) -> Option<HookFn> + Send + Sync + 'a;

/// Installs, updates, and removes plugins under a single `plugins_dir`.
pub struct Installer {
    plugins_dir: PathBuf,
    registry: RwLock<HashMap<String, InstalledPluginRecord>>,
    lifecycle: Arc<LifecycleManager>,
    verifier: Option<Arc<dyn Verifier>>,
    repositories: Option<Arc<RepositoryManager>>,
}

impl Installer {
    /// Loads (or initializes) the registry under `plugins_dir`.
    pub async fn load(
        plugins_dir: PathBuf,
        lifecycle: Arc<LifecycleManager>,
        verifier: Option<Arc<dyn Verifier>>,
        repositories: Option<Arc<RepositoryManager>>,
    ) -> InstallResult<Self> {
        tokio::fs::create_dir_all(&plugins_dir)
            .await
            .map_err(|e| InstallError::RegistryIo(e.to_string()))?;
        let registry = read_registry(&plugins_dir).await?;
        for (name, record) in &registry {
            if record.enabled {
                Self::ensure_discovered(&lifecycle, name);
            }
        }
        Ok(Self {
            plugins_dir,
            registry: RwLock::new(registry),
            lifecycle,
            verifier,
            repositories,
        })
    }

    fn ensure_discovered(lifecycle: &LifecycleManager, name: &str) {
        if lifecycle.state(name).is_none() {
            lifecycle.discover(name);
        }
    }

    /// Every currently installed plugin's record, keyed by name.
    pub async fn installed(&self) -> HashMap<String, InstalledPluginRecord> {
        self.registry.read().await.clone()
    }

    /// Installs the package at `package_path`.
    ///
    /// 1. opens the package and validates its manifest
    /// 2. runs `pre_install` against the temp-extracted contents, if resolvable
    /// 3. optionally resolves dependencies, installing any `resolve()`
    ///    downloaded from a repository (`options.install_dependencies`)
    ///    before the root package proceeds
    /// 4. refuses an existing install unless `options.force`
    /// 5. verifies the signature unless `options.skip_verification`
    /// 6. atomically moves the package contents into `{plugins_dir}/{name}/`
    /// 7. records the plugin as `Discovered`, with `options.enable`
    /// 8. best-effort runs `post_install`
    pub async fn install(
        &self,
        package_path: &Path,
        options: &InstallOptions,
        hook_resolver: &HookResolver<'_>,
    ) -> InstallResult<InstalledPluginRecord> {
        let mut package = Package::load(package_path)?;
        let manifest = package.manifest().clone();
        let root = package.extract()?.to_path_buf();

        if let Some(hook_fn) = hook_resolver(&root, LifecycleHook::PreInstall) {
            self.lifecycle
                .invoke_hook_fn(&manifest.name, LifecycleHook::PreInstall, &hook_fn, None)
                .await?;
        }

        if options.resolve_dependencies {
            let installed = self.installed().await;
            let installed_manifests: HashMap<String, PluginManifest> =
                installed.into_iter().map(|(name, record)| (name, record.manifest)).collect();
            let input = ResolveInput {
                root: &manifest,
                installed: &installed_manifests,
                core_version: env!("CARGO_PKG_VERSION"),
                resolve_transitives: true,
                fetch_missing: options.install_dependencies,
                repositories: self.repositories.clone(),
            };
            let graph = resolve(input).await?;

            // §4.6 step 3: with install_dependencies=true, every dependency
            // resolve() had to download gets installed before the root
            // package proceeds, dependencies-of-dependencies first so each
            // nested resolve() below finds its own deps already installed.
            if options.install_dependencies {
                for name in graph.resolve_order()? {
                    if name == CORE_NODE || name == manifest.name || installed_manifests.contains_key(&name) {
                        continue;
                    }
                    let Some(path) = graph.node(&name).and_then(|node| node.fetched_package_path.clone()) else {
                        continue;
                    };
                    let dep_options = InstallOptions {
                        force: false,
                        skip_verification: options.skip_verification,
                        enable: true,
                        resolve_dependencies: true,
                        install_dependencies: true,
                    };
                    self.install_fetched_dependency(path, dep_options, hook_resolver).await?;
                }
            }
        }

        {
            let registry = self.registry.read().await;
            if registry.contains_key(&manifest.name) && !options.force {
                return Err(InstallError::AlreadyInstalled(manifest.name.clone()));
            }
        }

        if !options.skip_verification {
            self.verify(&package, &manifest).await?;
        }

        let install_path = self.plugins_dir.join(&manifest.name);
        move_into_place(&root, &install_path)
            .await
            .map_err(|e| InstallError::RegistryIo(e.to_string()))?;

        let record = InstalledPluginRecord {
            manifest: manifest.clone(),
            install_path,
            enabled: options.enable,
            installed_at: chrono::Utc::now().to_rfc3339(),
        };
        self.lifecycle.discover(&manifest.name);
        {
            let mut registry = self.registry.write().await;
            registry.insert(manifest.name.clone(), record.clone());
            write_registry(&self.plugins_dir, &registry).await?;
        }

        if let Some(hook_fn) = hook_resolver(&record.install_path, LifecycleHook::PostInstall) {
            if let Err(err) = self
                .lifecycle
                .invoke_hook_fn(&manifest.name, LifecycleHook::PostInstall, &hook_fn, None)
                .await
            {
                warn!(plugin = %manifest.name, error = %err, "post_install hook failed, install proceeds");
            }
        }

        info!(plugin = %manifest.name, version = %manifest.version, "plugin installed");
        Ok(record)
    }

    /// Installs a dependency package `resolve()` downloaded from a
    /// repository, going through the same contract as a direct
    /// [`install`](Self::install) call. Boxed because `install` is already
    /// async and calls this helper from within its own body; a direct
    /// recursive `async fn` call would give the future an unbounded size.
    fn install_fetched_dependency<'a>(
        &'a self,
        package_path: PathBuf,
        options: InstallOptions,
        hook_resolver: &'a HookResolver<'a>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = InstallResult<InstalledPluginRecord>> + Send + 'a>> {
        Box::pin(async move { self.install(&package_path, &options, hook_resolver).await })
    }

    async fn verify(&self, package: &Package, manifest: &PluginManifest) -> InstallResult<()> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };
        let Some(signature) = &manifest.signature else {
            return Err(InstallError::VerificationFailed(manifest.name.clone()));
        };
        if !package.verify_integrity()? {
            return Err(InstallError::VerificationFailed(manifest.name.clone()));
        }
        let digest = manifest.name.as_bytes();
        if !verifier.verify(digest, signature).await {
            return Err(InstallError::VerificationFailed(manifest.name.clone()));
        }
        Ok(())
    }

    /// Removes an installed plugin.
    ///
    /// Refuses if another installed plugin still declares it as a (non-optional)
    /// dependency, unless `force` is set. Runs `pre_uninstall`/`post_uninstall`
    /// (best-effort) and deletes the plugin's files, keeping a `keep_data`
    /// subdirectory if one exists.
    pub async fn uninstall(&self, name: &str, force: bool, ui: Option<Arc<dyn UiIntegration>>) -> InstallResult<()> {
        let record = {
            let registry = self.registry.read().await;
            registry.get(name).cloned().ok_or_else(|| InstallError::NotInstalled(name.to_string()))?
        };

        if !force {
            let dependents = self.dependents_of(name).await;
            if !dependents.is_empty() {
                return Err(InstallError::DependentsPresent {
                    name: name.to_string(),
                    dependents,
                });
            }
        }

        self.lifecycle.run_hook(name, LifecycleHook::PreUninstall, ui.clone()).await?;

        remove_plugin_files(&record.install_path)
            .await
            .map_err(|e| InstallError::RegistryIo(e.to_string()))?;

        {
            let mut registry = self.registry.write().await;
            registry.remove(name);
            write_registry(&self.plugins_dir, &registry).await?;
        }
        self.lifecycle.forget(name);

        if let Err(err) = self.lifecycle.run_hook(name, LifecycleHook::PostUninstall, ui).await {
            warn!(plugin = name, error = %err, "post_uninstall hook failed, removal proceeds");
        }

        info!(plugin = name, "plugin uninstalled");
        Ok(())
    }

    async fn dependents_of(&self, name: &str) -> Vec<String> {
        let registry = self.registry.read().await;
        registry
            .values()
            .filter(|record| record.manifest.name != name)
            .filter(|record| {
                record
                    .manifest
                    .dependencies
                    .iter()
                    .any(|dep| dep.name == name && !dep.optional)
            })
            .map(|record| record.manifest.name.clone())
            .collect()
    }

    /// Installs `package_path` over an existing plugin of the same name,
    /// forcing the overwrite, preserving the current `enabled` flag, and
    /// logging (without failing) if the new version is not newer.
    pub async fn update(
        &self,
        package_path: &Path,
        hook_resolver: &HookResolver<'_>,
    ) -> InstallResult<InstalledPluginRecord> {
        let probe = Package::load(package_path)?;
        let new_manifest = probe.manifest().clone();

        let previous_enabled = {
            let registry = self.registry.read().await;
            registry.get(&new_manifest.name).map(|record| record.enabled)
        };
        let Some(enabled) = previous_enabled else {
            return Err(InstallError::NotInstalled(new_manifest.name.clone()));
        };

        if let Some(record) = self.registry.read().await.get(&new_manifest.name) {
            if !is_newer(&new_manifest.version, &record.manifest.version) {
                warn!(
                    plugin = %new_manifest.name,
                    current = %record.manifest.version,
                    new = %new_manifest.version,
                    "update package is not newer than the installed version, proceeding anyway"
                );
            }
        }

        self.lifecycle
            .run_hook(&new_manifest.name, LifecycleHook::PreUpdate, None)
            .await?;

        let options = InstallOptions {
            force: true,
            enable: enabled,
            ..InstallOptions::default()
        };
        let record = self.install(package_path, &options, hook_resolver).await?;

        if let Err(err) = self
            .lifecycle
            .run_hook(&new_manifest.name, LifecycleHook::PostUpdate, None)
            .await
        {
            warn!(plugin = %new_manifest.name, error = %err, "post_update hook failed, update proceeds");
        }

        Ok(record)
    }

    /// Computes a valid load order over every installed, enabled plugin.
    pub async fn loading_order(&self) -> InstallResult<Vec<String>> {
        let registry = self.installed().await;
        let enabled: HashMap<String, PluginManifest> = registry
            .iter()
            .filter(|(_, record)| record.enabled)
            .map(|(name, record)| (name.clone(), record.manifest.clone()))
            .collect();

        let graph = DependencyGraph::from_installed_manifests(&enabled)?;
        Ok(graph.resolve_order()?)
    }
}

fn is_newer(candidate: &str, current: &str) -> bool {
    match (alloy_core::manifest::parse_version(candidate), alloy_core::manifest::parse_version(current)) {
        (Ok(candidate), Ok(current)) => candidate > current,
        _ => false,
    }
}

async fn read_registry(plugins_dir: &Path) -> InstallResult<HashMap<String, InstalledPluginRecord>> {
    let path = plugins_dir.join(REGISTRY_FILE);
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| InstallError::RegistryIo(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| InstallError::RegistryCorrupt(e.to_string()))
}

async fn write_registry(plugins_dir: &Path, registry: &HashMap<String, InstalledPluginRecord>) -> InstallResult<()> {
    let path = plugins_dir.join(REGISTRY_FILE);
    let text = serde_json::to_string_pretty(registry).map_err(|e| InstallError::RegistryCorrupt(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, text).await.map_err(|e| InstallError::RegistryIo(e.to_string()))?;
    tokio::fs::rename(&tmp, &path).await.map_err(|e| InstallError::RegistryIo(e.to_string()))?;
    Ok(())
}

async fn move_into_place(source: &Path, dest: &Path) -> std::io::Result<()> {
    if dest.exists() {
        tokio::fs::remove_dir_all(dest).await?;
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = dest.with_extension("tmp-install");
    if staging.exists() {
        tokio::fs::remove_dir_all(&staging).await?;
    }
    copy_dir_recursive(source, &staging).await?;
    tokio::fs::rename(&staging, dest).await
}

fn copy_dir_recursive<'a>(source: &'a Path, dest: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dest).await?;
        let mut entries = tokio::fs::read_dir(source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let dest_path = dest.join(entry.file_name());
            if file_type.is_dir() {
                copy_dir_recursive(&entry.path(), &dest_path).await?;
            } else {
                tokio::fs::copy(entry.path(), &dest_path).await?;
            }
        }
        Ok(())
    })
}

async fn remove_plugin_files(install_path: &Path) -> std::io::Result<()> {
    let keep_data = install_path.join("keep_data");
    if !keep_data.exists() {
        return tokio::fs::remove_dir_all(install_path).await;
    }
    let mut entries = tokio::fs::read_dir(install_path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path() == keep_data {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::collaborators::RepositoryClient;
    use alloy_core::error::PackageError;
    use alloy_core::manifest::PluginAuthor;

    fn manifest(name: &str) -> PluginManifest {
        PluginManifest {
            name: name.to_string(),
            display_name: name.to_string(),
            version: "1.0.0".into(),
            description: "test plugin".into(),
            author: PluginAuthor { name: "dev".into(), email: None, url: None, organization: None },
            logo_path: None,
            icon_path: None,
            license: "MIT".into(),
            homepage: None,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            entry_point: format!("{name}.main.Plugin"),
            min_core_version: "1.0.0".into(),
            max_core_version: None,
            created_at: None,
            updated_at: None,
            tags: Vec::new(),
            icon: None,
            readme: None,
            changelog: None,
            signature: None,
            uuid: None,
            config_schema: None,
            extension_points: Vec::new(),
            extension_uses: Vec::new(),
            lifecycle_hooks: HashMap::new(),
            data_migrations: Vec::new(),
        }
    }

    fn write_package(dir: &Path, manifest: &PluginManifest) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("manifest.json"), manifest.to_json().unwrap()).unwrap();
    }

    fn no_hooks(_root: &Path, _hook: LifecycleHook) -> Option<HookFn> {
        None
    }

    #[tokio::test]
    async fn install_then_reinstall_without_force_is_rejected() {
        let plugins_dir = tempfile::tempdir().unwrap();
        let lifecycle = Arc::new(LifecycleManager::new(None));
        let installer = Installer::load(plugins_dir.path().to_path_buf(), lifecycle, None, None)
            .await
            .unwrap();

        let src = tempfile::tempdir().unwrap();
        write_package(src.path(), &manifest("echo"));

        let options = InstallOptions { resolve_dependencies: false, ..InstallOptions::default() };
        installer.install(src.path(), &options, &no_hooks).await.unwrap();

        let err = installer.install(src.path(), &options, &no_hooks).await.unwrap_err();
        assert!(matches!(err, InstallError::AlreadyInstalled(_)));
    }

    #[tokio::test]
    async fn uninstall_refuses_when_a_dependent_remains() {
        let plugins_dir = tempfile::tempdir().unwrap();
        let lifecycle = Arc::new(LifecycleManager::new(None));
        let installer = Installer::load(plugins_dir.path().to_path_buf(), lifecycle, None, None)
            .await
            .unwrap();

        let base_src = tempfile::tempdir().unwrap();
        write_package(base_src.path(), &manifest("base"));
        let options = InstallOptions { resolve_dependencies: false, ..InstallOptions::default() };
        installer.install(base_src.path(), &options, &no_hooks).await.unwrap();

        let mut dependent = manifest("dependent");
        dependent.dependencies.push(alloy_core::manifest::PluginDependency {
            name: "base".into(),
            version: "^1.0.0".into(),
            optional: false,
            url: None,
        });
        let dep_src = tempfile::tempdir().unwrap();
        write_package(dep_src.path(), &dependent);
        installer.install(dep_src.path(), &options, &no_hooks).await.unwrap();

        let err = installer.uninstall("base", false, None).await.unwrap_err();
        assert!(matches!(err, InstallError::DependentsPresent { .. }));

        installer.uninstall("base", true, None).await.unwrap();
    }

    #[tokio::test]
    async fn loading_order_respects_dependencies() {
        let plugins_dir = tempfile::tempdir().unwrap();
        let lifecycle = Arc::new(LifecycleManager::new(None));
        let installer = Installer::load(plugins_dir.path().to_path_buf(), lifecycle, None, None)
            .await
            .unwrap();

        let base_src = tempfile::tempdir().unwrap();
        write_package(base_src.path(), &manifest("base"));
        let options = InstallOptions { resolve_dependencies: false, ..InstallOptions::default() };
        installer.install(base_src.path(), &options, &no_hooks).await.unwrap();

        let mut dependent = manifest("dependent");
        dependent.dependencies.push(alloy_core::manifest::PluginDependency {
            name: "base".into(),
            version: "^1.0.0".into(),
            optional: false,
            url: None,
        });
        let dep_src = tempfile::tempdir().unwrap();
        write_package(dep_src.path(), &dependent);
        installer.install(dep_src.path(), &options, &no_hooks).await.unwrap();

        let order = installer.loading_order().await.unwrap();
        let base_index = order.iter().position(|n| n == "base").unwrap();
        let dependent_index = order.iter().position(|n| n == "dependent").unwrap();
        assert!(base_index < dependent_index);
    }

    /// A repository that serves exactly one plugin, as a package directory
    /// written on demand, for exercising `install_dependencies: true`.
    struct FakeRepo {
        knows: &'static str,
    }

    #[async_trait::async_trait]
    impl RepositoryClient for FakeRepo {
        async fn search(
            &self,
            _query: &str,
        ) -> Result<Vec<alloy_core::collaborators::RepositorySearchResult>, PackageError> {
            Ok(Vec::new())
        }

        async fn get_plugin_versions(
            &self,
            _name: &str,
        ) -> Result<Vec<alloy_core::collaborators::RepositoryPluginVersion>, PackageError> {
            Ok(Vec::new())
        }

        async fn download_plugin(&self, name: &str, _version: Option<&str>) -> Result<PathBuf, PackageError> {
            if name != self.knows {
                return Err(PackageError::MissingManifest);
            }
            let dir = tempfile::tempdir().unwrap();
            write_package(dir.path(), &manifest(name));
            Ok(dir.keep())
        }

        async fn publish_plugin(&self, _path: &PathBuf, _notes: &str, _public: bool) -> Result<(), PackageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn install_dependencies_persists_the_fetched_dependency() {
        // §4.6 step 3: a missing dependency fetched from a repository must
        // actually end up installed, not merely resolved in memory.
        let plugins_dir = tempfile::tempdir().unwrap();
        let lifecycle = Arc::new(LifecycleManager::new(None));
        let mut repos = RepositoryManager::new("default");
        repos.register("default", Arc::new(FakeRepo { knows: "storage" }));
        let installer = Installer::load(
            plugins_dir.path().to_path_buf(),
            lifecycle,
            None,
            Some(Arc::new(repos)),
        )
        .await
        .unwrap();

        let mut consumer = manifest("consumer");
        consumer.dependencies.push(alloy_core::manifest::PluginDependency {
            name: "storage".into(),
            version: ">=1.0.0".into(),
            optional: false,
            url: None,
        });
        let src = tempfile::tempdir().unwrap();
        write_package(src.path(), &consumer);

        let options = InstallOptions { install_dependencies: true, ..InstallOptions::default() };
        installer.install(src.path(), &options, &no_hooks).await.unwrap();

        let installed = installer.installed().await;
        assert!(installed.contains_key("storage"), "fetched dependency must be persisted into the registry");
        assert!(installed.contains_key("consumer"));
        assert!(
            plugins_dir.path().join("storage").join("manifest.json").exists(),
            "fetched dependency's files must be moved into plugins_dir"
        );
    }
}
