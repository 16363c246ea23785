//! TOML-based configuration for bpm.
//!
//! The configuration file is optional: a missing default file yields
//! [`BpmConfig::default`]. Command-line flags are applied on top by the
//! binary before [`BpmConfig::validate`] is called.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from `bpm.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BpmConfig {
    /// Dependency resolution settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Package-installer settings.
    #[serde(default)]
    pub install: InstallConfig,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Where nested checkouts are placed on disk.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `<parent>/<modules_dir>/<name>`.
    #[default]
    Nested,
    /// `<root>/<modules_dir>/<name>` for every dependency.
    Flat,
}

/// Dependency resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Remote pulled from when a checkout has no `local` remote.
    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    /// Base URL used to turn a bare dependency name into a remote URL.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Directory holding local working copies that override remote sources.
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Directory, relative to a package, holding its dependency checkouts.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,

    /// Manifest file name inside every package.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Branch checked out on materialize and used when HEAD is detached.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default)]
    pub layout: Layout,
}

fn default_remote_name() -> String {
    "origin".into()
}
fn default_modules_dir() -> String {
    "bpm_modules".into()
}
fn default_manifest_file() -> String {
    "bpm.json".into()
}
fn default_branch() -> String {
    "master".into()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            remote_name: default_remote_name(),
            remote_url: None,
            local_path: None,
            modules_dir: default_modules_dir(),
            manifest_file: default_manifest_file(),
            default_branch: default_branch(),
            layout: Layout::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Install
// ---------------------------------------------------------------------------

/// Downstream package manager that receives the resolved modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// `npm install <module path>` for every module.
    Npm,
    /// `yarn install` inside each module, then copy it into `node_modules`.
    Yarn,
}

impl FromStr for PackageManager {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "npm" => Ok(Self::Npm),
            "yarn" => Ok(Self::Yarn),
            other => Err(ConfigError::UnknownPackageManager(other.to_string())),
        }
    }
}

/// Package-installer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// `npm` or `yarn`.
    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    /// Destination directory for copy-then-install, relative to the root.
    #[serde(default = "default_node_modules")]
    pub node_modules_dir: String,

    /// Glob patterns skipped when copying a module.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_package_manager() -> String {
    "npm".into()
}
fn default_node_modules() -> String {
    "node_modules".into()
}
fn default_exclude() -> Vec<String> {
    vec![".git".into(), "node_modules".into()]
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            package_manager: default_package_manager(),
            node_modules_dir: default_node_modules(),
            exclude: default_exclude(),
        }
    }
}

impl InstallConfig {
    pub fn package_manager(&self) -> Result<PackageManager, ConfigError> {
        self.package_manager.parse()
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl BpmConfig {
    /// Load a [`BpmConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: BpmConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::FileNotFound(p)) => {
                debug!(path = %p, "no configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Make a relative `local_path` absolute against `working_dir`.
    pub fn resolve_paths(&mut self, working_dir: &Path) {
        if let Some(local) = self.resolver.local_path.take() {
            let local = if local.as_os_str().is_empty() {
                None
            } else if local.is_relative() {
                Some(working_dir.join(local))
            } else {
                Some(local)
            };
            self.resolver.local_path = local;
        }
        if matches!(self.resolver.remote_url.as_deref(), Some(u) if u.trim().is_empty()) {
            self.resolver.remote_url = None;
        }
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.install.package_manager()?;

        for (field, value) in [
            ("resolver.remote_name", &self.resolver.remote_name),
            ("resolver.modules_dir", &self.resolver.modules_dir),
            ("resolver.manifest_file", &self.resolver.manifest_file),
            ("resolver.default_branch", &self.resolver.default_branch),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "must not be empty".into(),
                });
            }
        }
        if self.resolver.remote_name == "local" {
            return Err(ConfigError::InvalidValue {
                field: "resolver.remote_name".into(),
                detail: "'local' is reserved for local overrides".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[resolver]
remote_name = "upstream"
remote_url = "https://github.com/acme"
local_path = "../work"
modules_dir = "deps"
manifest_file = "bpm.json"
default_branch = "main"
layout = "flat"

[install]
package_manager = "yarn"
node_modules_dir = "node_modules"
exclude = [".git", "*.log"]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: BpmConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.resolver.remote_name, "upstream");
        assert_eq!(config.resolver.layout, Layout::Flat);
        assert_eq!(config.resolver.modules_dir, "deps");
        assert_eq!(config.install.package_manager().unwrap(), PackageManager::Yarn);
        assert_eq!(config.install.exclude, vec![".git", "*.log"]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bpm.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = BpmConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.resolver.default_branch, "main");
    }

    #[test]
    fn test_missing_file_defaults() {
        assert!(matches!(
            BpmConfig::load_from_file("/nonexistent/bpm.toml"),
            Err(ConfigError::FileNotFound(_))
        ));
        let config = BpmConfig::load_or_default("/nonexistent/bpm.toml").unwrap();
        assert_eq!(config.resolver.remote_name, "origin");
        assert_eq!(config.resolver.modules_dir, "bpm_modules");
        assert_eq!(config.resolver.manifest_file, "bpm.json");
        assert_eq!(config.resolver.layout, Layout::Nested);
        assert_eq!(config.install.package_manager().unwrap(), PackageManager::Npm);
    }

    #[test]
    fn test_validate_rejects_unknown_package_manager() {
        let mut config = BpmConfig::default();
        config.install.package_manager = "pnpm".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownPackageManager(ref p)) if p == "pnpm"
        ));
    }

    #[test]
    fn test_validate_rejects_reserved_remote_name() {
        let mut config = BpmConfig::default();
        config.resolver.remote_name = "local".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "resolver.remote_name"
        ));
    }

    #[test]
    fn test_resolve_relative_local_path() {
        let mut config: BpmConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_paths(Path::new("/home/dev/app"));
        assert_eq!(
            config.resolver.local_path.as_deref(),
            Some(Path::new("/home/dev/app/../work"))
        );

        let mut config = BpmConfig::default();
        config.resolver.local_path = Some(PathBuf::new());
        config.resolver.remote_url = Some("  ".into());
        config.resolve_paths(Path::new("/home/dev/app"));
        assert!(config.resolver.local_path.is_none());
        assert!(config.resolver.remote_url.is_none());
    }
}
