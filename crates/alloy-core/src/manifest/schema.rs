//! The plugin manifest data model (§3, §6).
//!
//! [`PluginManifest`] is the single source of truth for a plugin release: its
//! identity, declared dependencies, capabilities, extension points/uses, and
//! lifecycle hooks. It is parsed from `manifest.json` and validated eagerly —
//! a manifest that fails [`PluginManifest::validate`] is never handed to the
//! resolver or installer.

use std::collections::HashMap;

use alloy_macros::CapabilityInfo;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ManifestError, ManifestResult};
use crate::manifest::version::{VersionPredicate, parse_version};

// =============================================================================
// Author
// =============================================================================

/// The plugin's declared author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginAuthor {
    /// Display name.
    pub name: String,
    /// Contact email, validated against a simple RFC-5322-ish shape.
    #[serde(default)]
    pub email: Option<String>,
    /// Homepage/contact URL, validated against `http(s)://` shape.
    #[serde(default)]
    pub url: Option<String>,
    /// Organization the author is affiliated with, if any.
    #[serde(default)]
    pub organization: Option<String>,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Audit/display risk tier for a capability token. Advisory only — the core
/// does not enforce capability tokens as a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// Capability is unlikely to cause harm if misused.
    Low,
    /// Capability can affect other plugins or persisted state.
    Medium,
    /// Capability can affect the host system or exfiltrate data.
    High,
}

/// The fixed taxonomy of plugin capability tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, CapabilityInfo)]
pub enum PluginCapability {
    /// Read configuration values.
    #[serde(rename = "config.read")]
    #[capability(token = "config.read", risk = "low", description = "Read configuration values")]
    ConfigRead,
    /// Write configuration values.
    #[serde(rename = "config.write")]
    #[capability(token = "config.write", risk = "medium", description = "Write configuration values")]
    ConfigWrite,
    /// Extend host UI surfaces.
    #[serde(rename = "ui.extend")]
    #[capability(token = "ui.extend", risk = "low", description = "Extend the host user interface")]
    UiExtend,
    /// Subscribe to events on the event bus.
    #[serde(rename = "event.subscribe")]
    #[capability(token = "event.subscribe", risk = "low", description = "Subscribe to event bus events")]
    EventSubscribe,
    /// Publish events onto the event bus.
    #[serde(rename = "event.publish")]
    #[capability(token = "event.publish", risk = "low", description = "Publish events onto the event bus")]
    EventPublish,
    /// Read files via the host's file helper.
    #[serde(rename = "file.read")]
    #[capability(token = "file.read", risk = "low", description = "Read files via the host file helper")]
    FileRead,
    /// Write files via the host's file helper.
    #[serde(rename = "file.write")]
    #[capability(token = "file.write", risk = "high", description = "Write files via the host file helper")]
    FileWrite,
    /// Open outbound network connections.
    #[serde(rename = "network.connect")]
    #[capability(token = "network.connect", risk = "medium", description = "Open outbound network connections")]
    NetworkConnect,
    /// Read from the host database.
    #[serde(rename = "database.read")]
    #[capability(token = "database.read", risk = "medium", description = "Read from the host database")]
    DatabaseRead,
    /// Write to the host database.
    #[serde(rename = "database.write")]
    #[capability(token = "database.write", risk = "high", description = "Write to the host database")]
    DatabaseWrite,
    /// Execute host system commands.
    #[serde(rename = "system.exec")]
    #[capability(token = "system.exec", risk = "high", description = "Execute host system commands")]
    SystemExec,
    /// Monitor host system metrics.
    #[serde(rename = "system.monitor")]
    #[capability(token = "system.monitor", risk = "low", description = "Monitor host system metrics")]
    SystemMonitor,
    /// Communicate directly with other plugins.
    #[serde(rename = "plugin.communicate")]
    #[capability(token = "plugin.communicate", risk = "low", description = "Communicate directly with other plugins")]
    PluginCommunicate,
}

// =============================================================================
// Dependencies
// =============================================================================

/// A single declared dependency on another plugin (or the pseudo-plugin `core`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDependency {
    /// Name of the depended-upon plugin.
    pub name: String,
    /// Version predicate string (see [`crate::manifest::version`]).
    pub version: String,
    /// Whether the dependency may be absent.
    #[serde(default)]
    pub optional: bool,
    /// Fetch hint URL (`http(s)://...`, `{repo}:{name}[@{version}]`, or bare token).
    #[serde(default)]
    pub url: Option<String>,
}

impl PluginDependency {
    /// Parses [`Self::version`] into an evaluable predicate.
    pub fn predicate(&self) -> ManifestResult<VersionPredicate> {
        VersionPredicate::parse(&self.version)
    }
}

// =============================================================================
// Extension points / uses
// =============================================================================

/// A declared extension point this plugin offers for others to fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginExtensionPoint {
    /// Point id, scoped to this plugin's provider name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description of what implementations receive/return.
    #[serde(default)]
    pub description: String,
    /// Interface tag consumers are expected to honor.
    pub interface: String,
    /// Declared contract version.
    pub version: String,
    /// Arbitrary named parameters describing the interface.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

/// A declared use of another plugin's extension point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginExtensionUse {
    /// Name of the plugin expected to provide the point.
    pub provider: String,
    /// Extension point id on the provider.
    pub id: String,
    /// Minimum contract version required.
    pub version: String,
    /// Whether the plugin can operate without this use being satisfied.
    #[serde(default)]
    pub required: bool,
}

// =============================================================================
// Lifecycle hooks
// =============================================================================

/// The closed set of lifecycle hook kinds a manifest may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleHook {
    /// Runs before files are installed.
    PreInstall,
    /// Runs after files are installed.
    PostInstall,
    /// Runs before files are removed.
    PreUninstall,
    /// Runs after files are removed.
    PostUninstall,
    /// Runs before the plugin transitions to `Active`.
    PreEnable,
    /// Runs after the plugin transitions to `Active`.
    PostEnable,
    /// Runs before the plugin transitions to `Disabling`.
    PreDisable,
    /// Runs after the plugin transitions to `Inactive`.
    PostDisable,
    /// Runs before an in-place update.
    PreUpdate,
    /// Runs after an in-place update.
    PostUpdate,
}

impl LifecycleHook {
    /// Whether this hook is UI-affecting and must run on the main thread.
    pub fn is_ui_affecting(&self) -> bool {
        matches!(self, Self::PostEnable | Self::PreDisable)
    }
}

impl std::fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PreInstall => "pre_install",
            Self::PostInstall => "post_install",
            Self::PreUninstall => "pre_uninstall",
            Self::PostUninstall => "post_uninstall",
            Self::PreEnable => "pre_enable",
            Self::PostEnable => "post_enable",
            Self::PreDisable => "pre_disable",
            Self::PostDisable => "post_disable",
            Self::PreUpdate => "pre_update",
            Self::PostUpdate => "post_update",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// A fully parsed, not-yet-validated plugin manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Globally-unique (within the installed set) plugin name.
    pub name: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Semver release version.
    pub version: String,
    /// Short description.
    pub description: String,
    /// Declared author.
    pub author: PluginAuthor,
    /// Optional path to a logo image, relative to the package root.
    #[serde(default)]
    pub logo_path: Option<String>,
    /// Optional path to an icon image, relative to the package root.
    #[serde(default)]
    pub icon_path: Option<String>,
    /// SPDX-ish license identifier. Unknown values warn, never reject.
    pub license: String,
    /// Project homepage.
    #[serde(default)]
    pub homepage: Option<String>,
    /// Declared capability tokens.
    #[serde(default)]
    pub capabilities: Vec<PluginCapability>,
    /// Declared dependencies on other plugins.
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,
    /// Module-qualified identifier of the plugin's entry class/function.
    pub entry_point: String,
    /// Minimum compatible core version.
    pub min_core_version: String,
    /// Maximum compatible core version, if bounded.
    #[serde(default)]
    pub max_core_version: Option<String>,
    /// Creation timestamp (RFC 3339).
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last-update timestamp (RFC 3339).
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Relative path to an icon asset.
    #[serde(default)]
    pub icon: Option<String>,
    /// Relative path to a README.
    #[serde(default)]
    pub readme: Option<String>,
    /// Relative path to a changelog.
    #[serde(default)]
    pub changelog: Option<String>,
    /// Detached signature (base64), verified by a [`crate::collaborators::Verifier`].
    #[serde(default)]
    pub signature: Option<String>,
    /// Stable release identifier, distinct from `name` (which may be reused
    /// across forks). Generated at creation if absent.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Opaque config schema; its meaning belongs to the out-of-scope config store.
    #[serde(default)]
    pub config_schema: Option<Value>,
    /// Declared extension points.
    #[serde(default)]
    pub extension_points: Vec<PluginExtensionPoint>,
    /// Declared extension uses.
    #[serde(default)]
    pub extension_uses: Vec<PluginExtensionUse>,
    /// Lifecycle hook name -> dotted callable path.
    #[serde(default)]
    pub lifecycle_hooks: HashMap<LifecycleHook, String>,
    /// Opaque ordered list of data migration descriptors; uninterpreted by the core.
    #[serde(default)]
    pub data_migrations: Vec<Value>,
}

const COMMON_SPDX_LICENSES: &[&str] = &[
    "MIT", "Apache-2.0", "BSD-2-Clause", "BSD-3-Clause", "GPL-2.0", "GPL-3.0", "LGPL-2.1",
    "LGPL-3.0", "MPL-2.0", "ISC", "Unlicense", "CC0-1.0", "AGPL-3.0",
];

fn name_regex() -> Regex {
    Regex::new(r"^[a-z][a-z0-9_-]{2,63}$").expect("static regex is valid")
}

fn email_regex() -> Regex {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex is valid")
}

fn url_regex() -> Regex {
    Regex::new(r"^https?://\S+$").expect("static regex is valid")
}

fn extension_point_id_regex() -> Regex {
    Regex::new(r"^[a-z][a-z0-9_.]{2,63}$").expect("static regex is valid")
}

impl PluginManifest {
    /// Parses a manifest from its JSON text representation.
    pub fn parse(json: &str) -> ManifestResult<Self> {
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Serializes this manifest back to its JSON text representation.
    pub fn to_json(&self) -> ManifestResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Validates every invariant §3 and §6 impose on a manifest, short-circuiting
    /// on the first violation.
    pub fn validate(&self) -> ManifestResult<()> {
        if self.name.is_empty() {
            return Err(ManifestError::MissingField { field: "name" });
        }
        if !name_regex().is_match(&self.name) {
            return Err(ManifestError::InvalidName(self.name.clone()));
        }
        if self.display_name.is_empty() {
            return Err(ManifestError::MissingField { field: "display_name" });
        }
        if self.description.is_empty() {
            return Err(ManifestError::MissingField { field: "description" });
        }
        if self.entry_point.is_empty() {
            return Err(ManifestError::MissingField { field: "entry_point" });
        }
        if self.license.is_empty() {
            return Err(ManifestError::MissingField { field: "license" });
        }
        if !COMMON_SPDX_LICENSES.contains(&self.license.as_str()) {
            tracing::warn!(
                plugin = %self.name,
                license = %self.license,
                "manifest declares an uncommon license identifier"
            );
        }

        parse_version(&self.version).map_err(|_| ManifestError::InvalidVersion {
            version: self.version.clone(),
            reason: "version must be a valid semver literal".to_string(),
        })?;
        parse_version(&self.min_core_version).map_err(|_| ManifestError::InvalidVersion {
            version: self.min_core_version.clone(),
            reason: "min_core_version must be a valid semver literal".to_string(),
        })?;
        if let Some(max) = &self.max_core_version {
            parse_version(max).map_err(|_| ManifestError::InvalidVersion {
                version: max.clone(),
                reason: "max_core_version must be a valid semver literal".to_string(),
            })?;
        }

        if let Some(email) = &self.author.email
            && !email_regex().is_match(email)
        {
            return Err(ManifestError::InvalidEmail(email.clone()));
        }
        if let Some(url) = &self.author.url
            && !url_regex().is_match(url)
        {
            return Err(ManifestError::InvalidUrl(url.clone()));
        }
        if let Some(homepage) = &self.homepage
            && !url_regex().is_match(homepage)
        {
            return Err(ManifestError::InvalidUrl(homepage.clone()));
        }

        for dep in &self.dependencies {
            if dep.name == self.name {
                return Err(ManifestError::InvalidDependency(format!(
                    "'{}' cannot depend on itself",
                    dep.name
                )));
            }
            dep.predicate()?;
        }

        for point in &self.extension_points {
            if !extension_point_id_regex().is_match(&point.id) {
                return Err(ManifestError::InvalidExtensionPointId { id: point.id.clone() });
            }
            parse_version(&point.version).map_err(|_| ManifestError::InvalidVersion {
                version: point.version.clone(),
                reason: format!("extension point '{}' has an invalid version", point.id),
            })?;
        }
        for use_ in &self.extension_uses {
            parse_version(&use_.version).map_err(|_| ManifestError::InvalidVersion {
                version: use_.version.clone(),
                reason: format!(
                    "extension use of '{}.{}' has an invalid version",
                    use_.provider, use_.id
                ),
            })?;
        }

        for (hook, path) in &self.lifecycle_hooks {
            if path.matches('.').count() < 1 {
                return Err(ManifestError::InvalidHookPath {
                    hook: hook.to_string(),
                    path: path.clone(),
                });
            }
        }

        Ok(())
    }

    /// Returns each declared capability paired with its risk tier.
    pub fn capability_risks(&self) -> Vec<(PluginCapability, RiskTier)> {
        self.capabilities.iter().map(|c| (*c, c.risk_tier())).collect()
    }

    /// Whether `core_version` satisfies this manifest's `min_core_version`/`max_core_version` bounds.
    pub fn is_compatible_with_core(&self, core_version: &str) -> ManifestResult<bool> {
        let core = parse_version(core_version)?;
        let min = parse_version(&self.min_core_version)?;
        if core < min {
            return Ok(false);
        }
        if let Some(max) = &self.max_core_version {
            let max = parse_version(max)?;
            if core > max {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Finds a declared extension point by id.
    pub fn extension_point(&self, id: &str) -> Option<&PluginExtensionPoint> {
        self.extension_points.iter().find(|p| p.id == id)
    }

    /// Whether this manifest declares an extension point with `id`.
    pub fn has_extension_point(&self, id: &str) -> bool {
        self.extension_point(id).is_some()
    }

    /// Evaluates `dependency`'s version predicate against `candidate`.
    pub fn satisfies_dependency(
        dependency: &PluginDependency,
        candidate: &str,
    ) -> ManifestResult<bool> {
        let predicate = dependency.predicate()?;
        let candidate = parse_version(candidate)?;
        Ok(predicate.matches(&candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_manifest() -> PluginManifest {
        PluginManifest {
            name: "echo_plugin".into(),
            display_name: "Echo Plugin".into(),
            version: "1.0.0".into(),
            description: "Echoes messages".into(),
            author: PluginAuthor {
                name: "dev".into(),
                email: Some("dev@example.com".into()),
                url: None,
                organization: None,
            },
            logo_path: None,
            icon_path: None,
            license: "MIT".into(),
            homepage: None,
            capabilities: vec![PluginCapability::EventSubscribe],
            dependencies: Vec::new(),
            entry_point: "echo_plugin.main.EchoPlugin".into(),
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

    #[test]
    fn minimal_manifest_validates() {
        minimal_manifest().validate().unwrap();
    }

    #[test]
    fn invalid_name_is_rejected() {
        let mut m = minimal_manifest();
        m.name = "Echo Plugin!".into();
        assert!(matches!(m.validate(), Err(ManifestError::InvalidName(_))));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut m = minimal_manifest();
        m.dependencies.push(PluginDependency {
            name: "echo_plugin".into(),
            version: ">=1.0.0".into(),
            optional: false,
            url: None,
        });
        assert!(matches!(
            m.validate(),
            Err(ManifestError::InvalidDependency(_))
        ));
    }

    #[test]
    fn malformed_hook_path_is_rejected() {
        let mut m = minimal_manifest();
        m.lifecycle_hooks.insert(LifecycleHook::PostInstall, "onlyoneseg".into());
        assert!(matches!(m.validate(), Err(ManifestError::InvalidHookPath { .. })));
    }

    #[test]
    fn core_version_bounds_are_enforced() {
        let mut m = minimal_manifest();
        m.min_core_version = "2.0.0".into();
        assert!(!m.is_compatible_with_core("1.5.0").unwrap());
        assert!(m.is_compatible_with_core("2.0.0").unwrap());
    }

    #[test]
    fn capability_risk_lookup_matches_taxonomy() {
        assert_eq!(PluginCapability::SystemExec.risk_tier(), RiskTier::High);
        assert_eq!(PluginCapability::ConfigRead.risk_tier(), RiskTier::Low);
        assert_eq!(PluginCapability::NetworkConnect.risk_tier(), RiskTier::Medium);
        assert_eq!(PluginCapability::from_token("file.write"), Some(PluginCapability::FileWrite));
    }

    #[test]
    fn dependency_predicate_round_trips() {
        let dep = PluginDependency {
            name: "storage".into(),
            version: ">=1.3.0".into(),
            optional: false,
            url: None,
        };
        assert!(PluginManifest::satisfies_dependency(&dep, "1.3.0").unwrap());
        assert!(!PluginManifest::satisfies_dependency(&dep, "1.2.9").unwrap());
    }
}
