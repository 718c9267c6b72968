//! Dependency graph and resolver (§4.4): seeds a DAG from a root manifest,
//! the installed-plugin set, and an optional [`RepositoryClient`]
//! collaborator, then produces a reverse-topological load order.
//!
//! Grounded on the teacher's `topological_layers` (Kahn's algorithm over
//! `Plugin::provides`/`depends_on`, `alloy-framework/src/manager.rs`), but
//! the spec requires the *cycle itself* to be named in the failure, which
//! Kahn's algorithm alone can't produce — only "these nodes never reached
//! in-degree zero". This resolver instead walks the graph with an explicit
//! DFS and a recursion-stack set, which both orders the graph and, on a back
//! edge, reconstructs the exact cycle.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use semver::Version;
use tracing::{debug, warn};

use alloy_core::collaborators::{RepositoryClient, RepositoryManager};
use alloy_core::manifest::{PluginManifest, parse_version};

use crate::error::{DependencyError, DependencyResult};

/// The pseudo-plugin name representing the host application itself.
pub const CORE_NODE: &str = "core";

/// One node in the [`DependencyGraph`]: either a fully materialized plugin
/// (with its manifest) or the synthetic `core` node.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// Plugin name, or [`CORE_NODE`].
    pub name: String,
    /// Resolved version.
    pub version: Version,
    /// Whether this is the synthetic host-version node.
    pub is_core: bool,
    /// The manifest this node was materialized from, absent for `core`.
    pub manifest: Option<PluginManifest>,
    /// Local path of the package this node was downloaded into, set only
    /// when `resolve()` fetched this node from a [`RepositoryManager`]
    /// rather than finding it already installed. Callers that install
    /// missing dependencies (§4.6 step 3) use this to locate the package to
    /// install; `None` for the root, the `core` node, and any node already
    /// present in the installed set.
    pub fetched_package_path: Option<PathBuf>,
}

/// A directed dependency graph: `dependent -> dependency` edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, DependencyNode>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    fn new() -> Self {
        Self::default()
    }

    fn insert_node(&mut self, node: DependencyNode) {
        self.edges.entry(node.name.clone()).or_default();
        self.nodes.insert(node.name.clone(), node);
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        let list = self.edges.entry(from.to_string()).or_default();
        if !list.iter().any(|n| n == to) {
            list.push(to.to_string());
        }
    }

    /// Builds a graph directly from an already-resolved manifest set,
    /// without semver or repository checks: every manifest becomes a node,
    /// and an edge is added for each dependency that is also present in
    /// `manifests`. Used by the installer to order already-installed,
    /// already-validated plugins for loading, where [`resolve`] would be
    /// the wrong tool since there is no single root.
    pub fn from_installed_manifests(manifests: &HashMap<String, PluginManifest>) -> DependencyResult<Self> {
        let mut graph = Self::new();
        for manifest in manifests.values() {
            let version = parse_version(&manifest.version)
                .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?;
            graph.insert_node(DependencyNode {
                name: manifest.name.clone(),
                version,
                is_core: false,
                manifest: Some(manifest.clone()),
                fetched_package_path: None,
            });
        }
        for manifest in manifests.values() {
            for dep in &manifest.dependencies {
                if manifests.contains_key(&dep.name) {
                    graph.add_edge(&manifest.name, &dep.name);
                }
            }
        }
        Ok(graph)
    }

    /// Looks up a node by name.
    pub fn node(&self, name: &str) -> Option<&DependencyNode> {
        self.nodes.get(name)
    }

    /// All node names currently in the graph.
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Computes a load order such that every node's index exceeds the
    /// indices of all its dependencies ("dependencies load first").
    ///
    /// Returns [`DependencyError::CircularDependency`] naming the witnessing
    /// cycle when the graph is not acyclic.
    pub fn resolve_order(&self) -> DependencyResult<Vec<String>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut on_stack: HashSet<String> = HashSet::new();
        let mut stack_order: Vec<String> = Vec::new();
        let mut order: Vec<String> = Vec::new();

        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();

        for name in names {
            if !visited.contains(&name) {
                self.visit(&name, &mut visited, &mut on_stack, &mut stack_order, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        stack_order: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> DependencyResult<()> {
        visited.insert(name.to_string());
        on_stack.insert(name.to_string());
        stack_order.push(name.to_string());

        if let Some(deps) = self.edges.get(name) {
            for dep in deps {
                if on_stack.contains(dep) {
                    let start = stack_order.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle = stack_order[start..].to_vec();
                    cycle.push(dep.clone());
                    return Err(DependencyError::CircularDependency { cycle });
                }
                if !visited.contains(dep) {
                    self.visit(dep, visited, on_stack, stack_order, order)?;
                }
            }
        }

        on_stack.remove(name);
        stack_order.pop();
        order.push(name.to_string());
        Ok(())
    }
}

/// Inputs to [`resolve`].
pub struct ResolveInput<'a> {
    /// The manifest being installed/loaded.
    pub root: &'a PluginManifest,
    /// Manifests of plugins already installed, keyed by name.
    pub installed: &'a HashMap<String, PluginManifest>,
    /// The host application's version.
    pub core_version: &'a str,
    /// Whether to recurse into transitive dependencies found in `installed`.
    pub resolve_transitives: bool,
    /// Whether missing dependencies may be fetched from `repositories`.
    pub fetch_missing: bool,
    /// Optional repository collaborator used when `fetch_missing` is set.
    pub repositories: Option<Arc<RepositoryManager>>,
}

/// Builds the dependency graph for `input.root` per §4.4's algorithm and
/// returns it already validated for cycles (callers still call
/// [`DependencyGraph::resolve_order`] to get the load order).
pub async fn resolve(input: ResolveInput<'_>) -> DependencyResult<DependencyGraph> {
    let core_version = parse_version(input.core_version)
        .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?;

    let mut graph = DependencyGraph::new();
    graph.insert_node(DependencyNode {
        name: CORE_NODE.to_string(),
        version: core_version,
        is_core: true,
        manifest: None,
        fetched_package_path: None,
    });

    let root_version = parse_version(&input.root.version)
        .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?;
    graph.insert_node(DependencyNode {
        name: input.root.name.clone(),
        version: root_version,
        is_core: false,
        manifest: Some(input.root.clone()),
        fetched_package_path: None,
    });

    let mut stack = vec![input.root.clone()];
    while let Some(manifest) = stack.pop() {
        for dep in &manifest.dependencies {
            if dep.optional && !input.fetch_missing {
                debug!(dependency = %dep.name, "skipping optional dependency, not fetching");
                continue;
            }

            if dep.name == CORE_NODE {
                graph.add_edge(&manifest.name, CORE_NODE);
                let predicate = dep
                    .predicate()
                    .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?;
                if !predicate.matches(&graph.node(CORE_NODE).unwrap().version) {
                    return Err(DependencyError::IncompatibleVersion {
                        name: CORE_NODE.to_string(),
                        required: dep.version.clone(),
                        available: input.core_version.to_string(),
                    });
                }
                continue;
            }

            if let Some(existing) = graph.node(&dep.name) {
                let predicate = dep
                    .predicate()
                    .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?;
                if !predicate.matches(&existing.version) {
                    if dep.optional {
                        warn!(dependency = %dep.name, "optional dependency present but incompatible, ignoring");
                        continue;
                    }
                    return Err(DependencyError::IncompatibleVersion {
                        name: dep.name.clone(),
                        required: dep.version.clone(),
                        available: existing.version.to_string(),
                    });
                }
                graph.add_edge(&manifest.name, &dep.name);
                continue;
            }

            if let Some(found) = input.installed.get(&dep.name) {
                let predicate = dep
                    .predicate()
                    .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?;
                let found_version = parse_version(&found.version)
                    .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?;
                if !predicate.matches(&found_version) {
                    if dep.optional {
                        warn!(dependency = %dep.name, "installed version incompatible, treating as missing");
                    } else {
                        return Err(DependencyError::IncompatibleVersion {
                            name: dep.name.clone(),
                            required: dep.version.clone(),
                            available: found.version.clone(),
                        });
                    }
                } else {
                    graph.insert_node(DependencyNode {
                        name: dep.name.clone(),
                        version: found_version,
                        is_core: false,
                        manifest: Some(found.clone()),
                        fetched_package_path: None,
                    });
                    graph.add_edge(&manifest.name, &dep.name);
                    if input.resolve_transitives {
                        stack.push(found.clone());
                    }
                    continue;
                }
            }

            if input.fetch_missing
                && let Some(repos) = &input.repositories
            {
                let version_hint = DependencyRef::parse(dep.url.as_deref().unwrap_or(&dep.name));
                let repo_name = version_hint.repository_name();
                let pinned_version = version_hint.pinned_version();

                // A named repository hint is unambiguous; a bare/default hint
                // searches every registered repository in order (§4.4/§4.6:
                // "search each repository in order"), default first.
                let candidates: Vec<Arc<dyn RepositoryClient>> = if repo_name.is_some() {
                    repos.get(repo_name.as_deref()).into_iter().collect()
                } else {
                    repos.search_order()
                };

                let mut downloaded = None;
                for repo in &candidates {
                    match repo.download_plugin(&dep.name, pinned_version.as_deref()).await {
                        Ok(path) => {
                            downloaded = Some(path);
                            break;
                        }
                        Err(e) => {
                            debug!(dependency = %dep.name, error = %e, "not found in this repository, trying next");
                        }
                    }
                }

                if let Some(path) = downloaded {
                    match alloy_core::Package::load(&path) {
                        Ok(package) => {
                            let fetched = package.manifest().clone();
                            graph.insert_node(DependencyNode {
                                name: dep.name.clone(),
                                version: parse_version(&fetched.version)
                                    .map_err(|e| DependencyError::InvalidVersion(e.to_string()))?,
                                is_core: false,
                                manifest: Some(fetched.clone()),
                                fetched_package_path: Some(path),
                            });
                            graph.add_edge(&manifest.name, &dep.name);
                            stack.push(fetched);
                            continue;
                        }
                        Err(e) => {
                            if dep.optional {
                                warn!(dependency = %dep.name, error = %e, "optional dependency package invalid, ignoring");
                                continue;
                            }
                            return Err(DependencyError::MissingDependency {
                                names: vec![dep.name.clone()],
                            });
                        }
                    }
                } else if !candidates.is_empty() {
                    if dep.optional {
                        warn!(dependency = %dep.name, "failed to fetch optional dependency from any repository, ignoring");
                        continue;
                    }
                    return Err(DependencyError::MissingDependency {
                        names: vec![dep.name.clone()],
                    });
                }
            }

            if dep.optional {
                debug!(dependency = %dep.name, "optional dependency not found, skipping");
                continue;
            }
            return Err(DependencyError::MissingDependency {
                names: vec![dep.name.clone()],
            });
        }
    }

    // Validate acyclicity eagerly so callers get the cycle error even if
    // they never call resolve_order().
    graph.resolve_order()?;
    Ok(graph)
}

/// Parsed form of a dependency's fetch-hint URL (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
    /// `http(s)://...` — reserved, never resolved by this crate.
    Direct(String),
    /// `{repo}:{name}[@{version}]`.
    Repository {
        /// Named repository.
        repo: String,
        /// Plugin name within that repository.
        name: String,
        /// Optional pinned version.
        version: Option<String>,
    },
    /// A bare token, defaulting to the `default` repository.
    Default(String),
}

impl DependencyRef {
    /// Parses a dependency URL hint per §4.4's grammar.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Self::Direct(raw.to_string());
        }
        if let Some((repo, rest)) = raw.split_once(':') {
            let (name, version) = match rest.split_once('@') {
                Some((n, v)) => (n.to_string(), Some(v.to_string())),
                None => (rest.to_string(), None),
            };
            return Self::Repository {
                repo: repo.to_string(),
                name,
                version,
            };
        }
        Self::Default(raw.to_string())
    }

    fn repository_name(&self) -> Option<String> {
        match self {
            Self::Repository { repo, .. } => Some(repo.clone()),
            _ => None,
        }
    }

    fn pinned_version(&self) -> Option<String> {
        match self {
            Self::Repository { version, .. } => version.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::error::PackageError;
    use alloy_core::manifest::{PluginAuthor, PluginDependency};
    use std::collections::HashMap;

    /// A fake repository that only knows about one named plugin, used to
    /// exercise `resolve()`'s "search each repository in order" fetch path.
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
            let fetched = manifest(name, "1.0.0", Vec::new());
            std::fs::write(dir.path().join("manifest.json"), fetched.to_json().unwrap()).unwrap();
            Ok(dir.keep())
        }

        async fn publish_plugin(&self, _path: &PathBuf, _notes: &str, _public: bool) -> Result<(), PackageError> {
            Ok(())
        }
    }

    fn manifest(name: &str, version: &str, deps: Vec<PluginDependency>) -> PluginManifest {
        PluginManifest {
            name: name.to_string(),
            display_name: name.to_string(),
            version: version.to_string(),
            description: "test".into(),
            author: PluginAuthor {
                name: "dev".into(),
                email: None,
                url: None,
                organization: None,
            },
            logo_path: None,
            icon_path: None,
            license: "MIT".into(),
            homepage: None,
            capabilities: Vec::new(),
            dependencies: deps,
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

    fn dep(name: &str, version: &str, optional: bool) -> PluginDependency {
        PluginDependency {
            name: name.to_string(),
            version: version.to_string(),
            optional,
            url: None,
        }
    }

    #[tokio::test]
    async fn acyclic_graph_orders_dependencies_before_dependents() {
        let a = manifest("a", "1.0.0", vec![dep("b", ">=1.0.0", false)]);
        let b = manifest("b", "1.0.0", vec![]);
        let mut installed = HashMap::new();
        installed.insert("b".to_string(), b);

        let graph = resolve(ResolveInput {
            root: &a,
            installed: &installed,
            core_version: "1.0.0",
            resolve_transitives: true,
            fetch_missing: false,
            repositories: None,
        })
        .await
        .unwrap();

        let order = graph.resolve_order().unwrap();
        let pos_a = order.iter().position(|n| n == "a").unwrap();
        let pos_b = order.iter().position(|n| n == "b").unwrap();
        assert!(pos_b < pos_a, "b must load before a");
    }

    #[tokio::test]
    async fn cycle_is_reported_with_witnessing_chain() {
        let a = manifest("a", "1.0.0", vec![dep("b", ">=1.0.0", false)]);
        let b = manifest("b", "1.0.0", vec![dep("c", ">=1.0.0", false)]);
        let c = manifest("c", "1.0.0", vec![dep("a", ">=1.0.0", false)]);
        let mut installed = HashMap::new();
        installed.insert("b".to_string(), b);
        installed.insert("c".to_string(), c);

        let err = resolve(ResolveInput {
            root: &a,
            installed: &installed,
            core_version: "1.0.0",
            resolve_transitives: true,
            fetch_missing: false,
            repositories: None,
        })
        .await
        .unwrap_err();

        match err {
            DependencyError::CircularDependency { cycle } => {
                for name in ["a", "b", "c"] {
                    assert!(cycle.contains(&name.to_string()), "cycle should mention {name}");
                }
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn incompatible_installed_version_is_rejected() {
        let a = manifest("a", "1.0.0", vec![dep("b", ">=1.3.0", false)]);
        let b = manifest("b", "1.2.3", vec![]);
        let mut installed = HashMap::new();
        installed.insert("b".to_string(), b);

        let err = resolve(ResolveInput {
            root: &a,
            installed: &installed,
            core_version: "1.0.0",
            resolve_transitives: true,
            fetch_missing: false,
            repositories: None,
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            DependencyError::IncompatibleVersion { ref required, ref available, .. }
                if required == ">=1.3.0" && available == "1.2.3"
        ));
    }

    #[tokio::test]
    async fn missing_required_dependency_is_rejected_unless_optional() {
        let a = manifest("a", "1.0.0", vec![dep("ghost", ">=1.0.0", false)]);
        let installed = HashMap::new();

        let err = resolve(ResolveInput {
            root: &a,
            installed: &installed,
            core_version: "1.0.0",
            resolve_transitives: true,
            fetch_missing: false,
            repositories: None,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DependencyError::MissingDependency { .. }));

        let a_optional = manifest("a", "1.0.0", vec![dep("ghost", ">=1.0.0", true)]);
        let graph = resolve(ResolveInput {
            root: &a_optional,
            installed: &installed,
            core_version: "1.0.0",
            resolve_transitives: true,
            fetch_missing: false,
            repositories: None,
        })
        .await
        .unwrap();
        assert!(graph.node("ghost").is_none());
    }

    #[tokio::test]
    async fn fetch_searches_every_repository_in_order_when_unnamed() {
        // §4.4/§4.6: a bare dependency hint "searches each repository in
        // order" rather than only ever consulting the default.
        let mut repos = RepositoryManager::new("first");
        repos.register("first", Arc::new(FakeRepo { knows: "other" }));
        repos.register("second", Arc::new(FakeRepo { knows: "storage" }));

        let a = manifest("a", "1.0.0", vec![dep("storage", ">=1.0.0", false)]);
        let installed = HashMap::new();

        let graph = resolve(ResolveInput {
            root: &a,
            installed: &installed,
            core_version: "1.0.0",
            resolve_transitives: true,
            fetch_missing: true,
            repositories: Some(Arc::new(repos)),
        })
        .await
        .unwrap();

        let node = graph.node("storage").expect("storage should have been fetched from the second repository");
        assert!(node.fetched_package_path.is_some(), "fetched node must record its package path for installation");
    }

    #[test]
    fn dependency_ref_grammar() {
        assert_eq!(
            DependencyRef::parse("https://example.com/plugin.zip"),
            DependencyRef::Direct("https://example.com/plugin.zip".to_string())
        );
        assert_eq!(
            DependencyRef::parse("community:storage@1.2.0"),
            DependencyRef::Repository {
                repo: "community".to_string(),
                name: "storage".to_string(),
                version: Some("1.2.0".to_string()),
            }
        );
        assert_eq!(
            DependencyRef::parse("storage"),
            DependencyRef::Default("storage".to_string())
        );
    }
}
