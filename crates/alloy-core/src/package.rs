//! Plugin package container: open/verify, extract layout, hash integrity (§4.3).
//!
//! A package is one of three container forms — [`PackageFormat::Zip`],
//! [`PackageFormat::DistArchive`] (the spec's "wheel-style archive", renamed
//! to avoid a Python-packaging-specific name since the shape — a zip plus a
//! sidecar metadata directory — is the only thing that survives the port),
//! or [`PackageFormat::Directory`] — with a fixed layout: `manifest.json` at
//! the root, code under `code/`, resources under `resources/`, docs under
//! `docs/`, and an optional `files.json` hash index mapping relative path to
//! lowercase hex SHA-256.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{PackageError, PackageResult};
use crate::manifest::PluginManifest;

const MANIFEST_FILE: &str = "manifest.json";
const HASH_INDEX_FILE: &str = "files.json";
const CODE_DIR: &str = "code";
const RESOURCES_DIR: &str = "resources";
const DOCS_DIR: &str = "docs";

/// The on-disk container shape of a plugin package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// A plain zip archive.
    Zip,
    /// A zip archive carrying a `*.dist-info`-style metadata sidecar.
    DistArchive,
    /// A loose, already-extracted directory.
    Directory,
}

impl PackageFormat {
    /// Infers a format from a path's extension, defaulting directories to
    /// [`PackageFormat::Directory`].
    pub fn detect(path: &Path) -> PackageResult<Self> {
        if path.is_dir() {
            return Ok(Self::Directory);
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("zip") => Ok(Self::Zip),
            Some("whl") | Some("dist") => Ok(Self::DistArchive),
            _ => Err(PackageError::UnknownFormat(path.display().to_string())),
        }
    }
}

/// File classification used by [`create`] when no explicit layout is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileClass {
    Code,
    Resource,
    Doc,
}

const CODE_EXTENSIONS: &[&str] = &["rs", "py", "js", "ts", "lua", "wasm"];
const RESOURCE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "svg", "ico", "json", "toml", "yaml", "yml", "ttf", "woff", "woff2",
];
const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst"];
const DOC_STEMS: &[&str] = &["readme", "license", "changelog", "authors", "contributing"];
const DOC_DIR_NAMES: &[&str] = &["docs", "doc", "documentation"];

fn classify(relative: &Path) -> FileClass {
    if relative
        .components()
        .any(|c| DOC_DIR_NAMES.contains(&c.as_os_str().to_string_lossy().to_lowercase().as_str()))
    {
        return FileClass::Doc;
    }
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if DOC_STEMS.contains(&stem.as_str()) {
        return FileClass::Doc;
    }
    let ext = relative
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if DOC_EXTENSIONS.contains(&ext.as_str()) {
        FileClass::Doc
    } else if CODE_EXTENSIONS.contains(&ext.as_str()) {
        FileClass::Code
    } else if RESOURCE_EXTENSIONS.contains(&ext.as_str()) {
        FileClass::Resource
    } else {
        // Unclassified files default to resources rather than being dropped.
        FileClass::Resource
    }
}

const DEFAULT_EXCLUDE: &[&str] = &[
    "**/.git/**",
    "**/.svn/**",
    "**/node_modules/**",
    "**/target/**",
    "**/__pycache__/**",
    "**/.DS_Store",
];

/// Builds a package from a source tree, classifying files into `code/`,
/// `resources/`, `docs/` and writing a SHA-256 `files.json` hash index.
///
/// `include`/`exclude` are glob patterns evaluated relative to `source_dir`;
/// an empty `include` defaults to `**/*`. Exclusions always additionally
/// cover VCS/build/cache directories regardless of the caller's list.
pub fn create(
    source_dir: &Path,
    output: &Path,
    manifest: &PluginManifest,
    include: &[String],
    exclude: &[String],
) -> PackageResult<()> {
    manifest.validate()?;

    let include_set = build_glob_set(if include.is_empty() {
        std::slice::from_ref(&"**/*".to_string())
    } else {
        include
    })?;
    let mut exclude_patterns: Vec<String> = exclude.to_vec();
    exclude_patterns.extend(DEFAULT_EXCLUDE.iter().map(|s| s.to_string()));
    let exclude_set = build_glob_set(&exclude_patterns)?;

    if output.exists() {
        std::fs::remove_dir_all(output)?;
    }
    std::fs::create_dir_all(output.join(CODE_DIR))?;
    std::fs::create_dir_all(output.join(RESOURCES_DIR))?;
    std::fs::create_dir_all(output.join(DOCS_DIR))?;

    let mut hashes = HashMap::new();
    for entry in walkdir::WalkDir::new(source_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .expect("walkdir yields paths under source_dir");
        if relative.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
            continue;
        }
        if !include_set.is_match(relative) || exclude_set.is_match(relative) {
            continue;
        }

        let dest_subdir = match classify(relative) {
            FileClass::Code => CODE_DIR,
            FileClass::Resource => RESOURCES_DIR,
            FileClass::Doc => DOCS_DIR,
        };
        let dest_relative = Path::new(dest_subdir).join(relative);
        let dest_path = output.join(&dest_relative);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &dest_path)?;
        let digest = hash_file(&dest_path)?;
        hashes.insert(path_to_key(&dest_relative), digest);
    }

    std::fs::write(output.join(MANIFEST_FILE), manifest.to_json()?)?;
    std::fs::write(
        output.join(HASH_INDEX_FILE),
        serde_json::to_string_pretty(&hashes).map_err(|e| PackageError::Io(e.to_string()))?,
    )?;
    debug!(plugin = %manifest.name, files = hashes.len(), "package created");
    Ok(())
}

struct GlobSet {
    patterns: Vec<glob::Pattern>,
}

impl GlobSet {
    fn is_match(&self, relative: &Path) -> bool {
        let key = path_to_key(relative);
        self.patterns.iter().any(|p| p.matches(&key))
    }
}

fn build_glob_set(patterns: &[String]) -> PackageResult<GlobSet> {
    let compiled = patterns
        .iter()
        .map(|p| glob::Pattern::new(p).map_err(|e| PackageError::Io(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GlobSet { patterns: compiled })
}

fn path_to_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn hash_file(path: &Path) -> PackageResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// An opened package: its format, source path, and (once [`extract`]ed) the
/// scoped temporary directory its contents live under.
///
/// [`extract`]: Package::extract
pub struct Package {
    format: PackageFormat,
    source: PathBuf,
    manifest: PluginManifest,
    hash_index: HashMap<String, String>,
    extracted: Option<tempfile::TempDir>,
}

impl Package {
    /// Opens `path`, reading and validating its manifest without extracting
    /// the rest of the archive yet.
    pub fn load(path: &Path) -> PackageResult<Self> {
        let format = PackageFormat::detect(path)?;
        let (manifest_text, hash_index) = match format {
            PackageFormat::Directory => {
                let manifest_path = path.join(MANIFEST_FILE);
                if !manifest_path.exists() {
                    return Err(PackageError::MissingManifest);
                }
                let manifest_text = std::fs::read_to_string(&manifest_path)?;
                let hash_index = read_hash_index_from_dir(path)?;
                (manifest_text, hash_index)
            }
            PackageFormat::Zip | PackageFormat::DistArchive => {
                let file = std::fs::File::open(path)?;
                let mut archive =
                    zip::ZipArchive::new(file).map_err(|e| PackageError::Zip(e.to_string()))?;
                let manifest_text = read_zip_entry(&mut archive, MANIFEST_FILE)
                    .ok_or(PackageError::MissingManifest)?;
                let hash_index = read_zip_entry(&mut archive, HASH_INDEX_FILE)
                    .map(|text| parse_hash_index(&text))
                    .transpose()?
                    .unwrap_or_default();
                (manifest_text, hash_index)
            }
        };

        let manifest = PluginManifest::parse(&manifest_text)?;
        manifest.validate()?;

        Ok(Self {
            format,
            source: path.to_path_buf(),
            manifest,
            hash_index,
            extracted: None,
        })
    }

    /// The package's parsed, validated manifest.
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// The package's container format.
    pub fn format(&self) -> PackageFormat {
        self.format
    }

    /// Extracts the package into a scoped temporary directory, returning its
    /// root. The directory (and everything under it) is removed when this
    /// `Package` is dropped or [`extract`](Self::extract) is called again.
    pub fn extract(&mut self) -> PackageResult<&Path> {
        match self.format {
            PackageFormat::Directory => {
                self.extracted = None;
                Ok(&self.source)
            }
            PackageFormat::Zip | PackageFormat::DistArchive => {
                let dir = tempfile::tempdir()?;
                let file = std::fs::File::open(&self.source)?;
                let mut archive =
                    zip::ZipArchive::new(file).map_err(|e| PackageError::Zip(e.to_string()))?;
                for i in 0..archive.len() {
                    let mut entry = archive
                        .by_index(i)
                        .map_err(|e| PackageError::Zip(e.to_string()))?;
                    let Some(relative) = entry.enclosed_name() else {
                        continue;
                    };
                    let dest = dir.path().join(relative);
                    if entry.is_dir() {
                        std::fs::create_dir_all(&dest)?;
                        continue;
                    }
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut out = std::fs::File::create(&dest)?;
                    std::io::copy(&mut entry, &mut out)?;
                }
                self.extracted = Some(dir);
                Ok(self.extracted.as_ref().unwrap().path())
            }
        }
    }

    /// The root directory contents should be read from: the extraction
    /// directory if [`extract`](Self::extract) has run, else the original
    /// directory path for [`PackageFormat::Directory`] packages.
    pub fn root(&self) -> PathBuf {
        match &self.extracted {
            Some(dir) => dir.path().to_path_buf(),
            None => self.source.clone(),
        }
    }

    /// Recomputes SHA-256 for every entry in the hash index under the
    /// extracted root and compares against the recorded digest.
    ///
    /// A package with no hash index is vacuously valid — there is nothing to
    /// check, and the original implementation treats an absent index the
    /// same way.
    pub fn verify_integrity(&self) -> PackageResult<bool> {
        if self.hash_index.is_empty() {
            return Ok(true);
        }
        let root = self.root();
        let mut mismatches = 0usize;
        let mut first: Option<String> = None;
        for (relative, expected) in &self.hash_index {
            let path = root.join(relative);
            let actual = match std::fs::File::open(&path) {
                Ok(mut file) => {
                    let mut hasher = Sha256::new();
                    let mut buf = [0u8; 8192];
                    loop {
                        let n = file.read(&mut buf)?;
                        if n == 0 {
                            break;
                        }
                        hasher.update(&buf[..n]);
                    }
                    hex::encode(hasher.finalize())
                }
                Err(_) => {
                    mismatches += 1;
                    first.get_or_insert_with(|| relative.clone());
                    continue;
                }
            };
            if &actual != expected {
                mismatches += 1;
                first.get_or_insert_with(|| relative.clone());
            }
        }
        if mismatches > 0 {
            warn!(mismatches, first = ?first, "package integrity check failed");
        }
        Ok(mismatches == 0)
    }
}

fn read_hash_index_from_dir(dir: &Path) -> PackageResult<HashMap<String, String>> {
    let path = dir.join(HASH_INDEX_FILE);
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(path)?;
    parse_hash_index(&text)
}

fn parse_hash_index(text: &str) -> PackageResult<HashMap<String, String>> {
    serde_json::from_str(text).map_err(|e| PackageError::Io(format!("invalid files.json: {e}")))
}

fn read_zip_entry(
    archive: &mut zip::ZipArchive<std::fs::File>,
    name: &str,
) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut text = String::new();
    file.read_to_string(&mut text).ok()?;
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PluginAuthor;
    use std::io::Write;

    fn manifest() -> PluginManifest {
        PluginManifest {
            name: "echo_plugin".into(),
            display_name: "Echo Plugin".into(),
            version: "1.0.0".into(),
            description: "Echoes messages".into(),
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
    fn create_then_load_round_trips_manifest() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("main.rs"), b"fn main() {}").unwrap();
        std::fs::write(src.path().join("README.md"), b"hello").unwrap();

        let out = tempfile::tempdir().unwrap();
        let package_dir = out.path().join("pkg");
        create(src.path(), &package_dir, &manifest(), &[], &[]).unwrap();

        assert!(package_dir.join(CODE_DIR).join("main.rs").exists());
        assert!(package_dir.join(DOCS_DIR).join("README.md").exists());

        let loaded = Package::load(&package_dir).unwrap();
        assert_eq!(loaded.manifest().name, "echo_plugin");
    }

    #[test]
    fn verify_integrity_true_untouched_false_after_byte_flip() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("main.rs"), b"fn main() {}").unwrap();

        let out = tempfile::tempdir().unwrap();
        let package_dir = out.path().join("pkg");
        create(src.path(), &package_dir, &manifest(), &[], &[]).unwrap();

        let package = Package::load(&package_dir).unwrap();
        assert!(package.verify_integrity().unwrap());

        let code_file = package_dir.join(CODE_DIR).join("main.rs");
        let mut file = std::fs::OpenOptions::new().write(true).open(&code_file).unwrap();
        file.write_all(b"fn main() { tampered() }").unwrap();
        drop(file);

        assert!(!package.verify_integrity().unwrap());
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Package::load(dir.path()).unwrap_err();
        assert!(matches!(err, PackageError::MissingManifest));
    }

    #[test]
    fn package_with_no_hash_index_is_vacuously_valid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), manifest().to_json().unwrap()).unwrap();
        let package = Package::load(dir.path()).unwrap();
        assert!(package.verify_integrity().unwrap());
    }
}
