//! Package manifests (`bpm.json`).
//!
//! ```json
//! {
//!    "name": "example",
//!    "version": "1.0.0",
//!    "dependencies": {
//!       "widgets": {
//!          "commit": "cd4a1ae3fb81c7a0b032c5f359b0e0691be933a9",
//!          "url": "https://github.com/acme/widgets.git"
//!       }
//!    }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ManifestError;

/// One entry of the `dependencies` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Commit the parent was last synchronized against. Empty until pinned.
    #[serde(default)]
    pub commit: String,
    pub url: String,
}

impl DependencySpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            commit: String::new(),
            url: url.into(),
        }
    }
}

/// A package's declaration of name, version and dependencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    /// Fields bpm does not interpret, preserved on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Builder-style helper for adding a dependency.
    pub fn with_dependency(mut self, name: &str, spec: DependencySpec) -> Self {
        self.dependencies.insert(name.to_string(), spec);
        self
    }

    pub fn validate(&self, path: &Path) -> Result<(), ManifestError> {
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if value.trim().is_empty() {
                return Err(ManifestError::MissingField {
                    path: path.display().to_string(),
                    field: field.into(),
                });
            }
        }
        for (name, dep) in &self.dependencies {
            if dep.url.trim().is_empty() {
                return Err(ManifestError::MissingUrl { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Bump the patch component of `version`.
    pub fn increment_patch_version(&mut self) -> Result<(), ManifestError> {
        let mut version =
            semver::Version::parse(self.version.trim()).map_err(|e| ManifestError::InvalidVersion {
                version: self.version.clone(),
                detail: e.to_string(),
            })?;
        version.patch += 1;
        self.version = version.to_string();
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"   ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).map_err(|e| ManifestError::ParseError {
            path: self.name.clone(),
            detail: e.to_string(),
        })?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Loads and saves the manifest of the package in a directory.
pub trait ManifestStore {
    /// File holding the manifest of the package at `dir`.
    fn manifest_path(&self, dir: &Path) -> PathBuf;

    fn load(&self, dir: &Path) -> Result<Manifest, ManifestError>;

    fn save(&self, dir: &Path, manifest: &Manifest) -> Result<(), ManifestError>;

    fn exists(&self, dir: &Path) -> bool {
        self.manifest_path(dir).is_file()
    }

    /// Load, bump the patch version, save. Returns the new version.
    fn increment_patch_version(&self, dir: &Path) -> Result<String, ManifestError> {
        let mut manifest = self.load(dir)?;
        manifest.increment_patch_version()?;
        self.save(dir, &manifest)?;
        info!(path = %dir.display(), version = %manifest.version, "incremented manifest version");
        Ok(manifest.version)
    }
}

/// [`ManifestStore`] reading pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct JsonManifestStore {
    file_name: String,
}

impl JsonManifestStore {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Default for JsonManifestStore {
    fn default() -> Self {
        Self::new("bpm.json")
    }
}

impl ManifestStore for JsonManifestStore {
    fn manifest_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    fn load(&self, dir: &Path) -> Result<Manifest, ManifestError> {
        let path = self.manifest_path(dir);
        if !path.is_file() {
            return Err(ManifestError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(&path)?;
        let manifest: Manifest =
            serde_json::from_str(&contents).map_err(|e| ManifestError::ParseError {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        manifest.validate(&path)?;
        debug!(path = %path.display(), deps = manifest.dependencies.len(), "loaded manifest");
        Ok(manifest)
    }

    fn save(&self, dir: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
        let path = self.manifest_path(dir);
        let mut json = manifest.to_json()?;
        json.push('\n');
        std::fs::write(&path, json)?;
        debug!(path = %path.display(), "saved manifest");
        Ok(())
    }
}
