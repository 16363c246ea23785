//! Recursive dependency walks: Add, Update, Scan and Install.
//!
//! Every walk is depth-first and synchronous: a node's whole subtree is
//! finished before its next sibling is visited. The [`ModuleCache`] passed
//! into each call is the only shared state; a name already in it is not
//! re-synchronized unless the walk is deep.
//!
//! | Walk | Touches checkout | Children |
//! |------|------------------|----------|
//! | Add | materialize if absent, then synchronize | scanned (absent ones added) |
//! | Update | pull, overlay, submodules | scanned, or updated when deep |
//! | Scan | read-only | scanned |
//! | Install | read-only, manifests only | installed |

use std::path::{Path, PathBuf};

use semver::Version;
use tracing::{debug, info, instrument, warn};

use crate::cache::{ModuleCache, ModuleCacheItem};
use crate::config::{Layout, ResolverConfig};
use crate::dependency::{DependencyNode, Source};
use crate::fs_util;
use crate::errors::{ManifestError, PathError, ResolveError};
use crate::manifest::{DependencySpec, Manifest, ManifestStore};
use crate::overlay::LocalOverlaySync;
use crate::remote::{is_absolute_locator, make_remote_url, RemoteRewriter};
use crate::vcs::{VersionControl, LOCAL_REMOTE, ORIGIN_REMOTE};

/// Resolver settings for one invocation.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// The invoking repository. Its remotes are mirrored onto every
    /// checkout.
    pub root: PathBuf,
    pub remote_name: String,
    pub remote_url: Option<String>,
    pub local_path: Option<PathBuf>,
    pub modules_dir: String,
    pub default_branch: String,
    pub layout: Layout,
}

impl ResolverOptions {
    pub fn from_config(config: &ResolverConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            remote_name: config.remote_name.clone(),
            remote_url: config.remote_url.clone(),
            local_path: config.local_path.clone(),
            modules_dir: config.modules_dir.clone(),
            default_branch: config.default_branch.clone(),
            layout: config.layout,
        }
    }
}

/// Orchestrates walks over the dependency tree.
pub struct Resolver<'a> {
    vcs: &'a dyn VersionControl,
    manifests: &'a dyn ManifestStore,
    options: ResolverOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        manifests: &'a dyn ManifestStore,
        options: ResolverOptions,
    ) -> Self {
        Self {
            vcs,
            manifests,
            options,
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Node construction
    // -----------------------------------------------------------------------

    /// Build the node for dependency `name` declared by the package at
    /// `parent`.
    pub fn node(&self, name: &str, spec: &DependencySpec, parent: &Path) -> Result<DependencyNode, ResolveError> {
        let base = match self.options.layout {
            Layout::Nested => parent,
            Layout::Flat => self.options.root.as_path(),
        };
        let checkout_path = base.join(&self.options.modules_dir).join(name);
        Ok(DependencyNode::new(name, self.resolve_source(name, spec)?, checkout_path))
    }

    /// Top-level nodes of the root manifest.
    pub fn root_nodes(&self, manifest: &Manifest) -> Result<Vec<DependencyNode>, ResolveError> {
        manifest
            .dependencies
            .iter()
            .map(|(name, spec)| self.node(name, spec, &self.options.root))
            .collect()
    }

    fn resolve_source(&self, name: &str, spec: &DependencySpec) -> Result<Source, ResolveError> {
        if let Some(local_root) = &self.options.local_path {
            let path = local_root.join(name);
            if path.is_dir() {
                debug!(name, path = %path.display(), "using local override");
                let upstream = (!spec.url.trim().is_empty()).then(|| spec.url.clone());
                return Ok(Source::Local { path, upstream });
            }
        }

        let declared = if spec.url.trim().is_empty() {
            name
        } else {
            spec.url.as_str()
        };
        let root_remote = if self.options.remote_url.is_none() && !is_absolute_locator(declared) {
            self.vcs
                .remote(&self.options.root, &self.options.remote_name)?
                .map(|r| r.url)
        } else {
            None
        };
        let url = make_remote_url(declared, self.options.remote_url.as_deref(), root_remote.as_deref())?;
        Ok(Source::Remote { url })
    }

    /// Dependencies declared by the package checked out at `node`. A
    /// checkout without a manifest is a leaf.
    pub fn children(&self, node: &DependencyNode) -> Result<Vec<DependencyNode>, ResolveError> {
        if !self.manifests.exists(&node.checkout_path) {
            debug!(name = %node.name, "no manifest, treating as leaf");
            return Ok(Vec::new());
        }
        let manifest = self.manifests.load(&node.checkout_path)?;
        manifest
            .dependencies
            .iter()
            .map(|(name, spec)| self.node(name, spec, &node.checkout_path))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Add
    // -----------------------------------------------------------------------

    /// Bring a dependency into the tree. A name already cached in this run
    /// is left alone.
    #[instrument(skip(self, node, cache), fields(name = %node.name))]
    pub fn add(&self, node: &DependencyNode, cache: &mut ModuleCache) -> Result<(), ResolveError> {
        if cache.contains(&node.name) {
            debug!("already resolved in this run");
            return Ok(());
        }
        if node.checkout_path.exists() {
            self.synchronize(node, false, cache)
        } else {
            self.materialize(node, false, cache)
        }
    }

    /// Create the nested checkout, check out the default branch, then
    /// synchronize it. The submodule is registered in the package that owns
    /// the modules directory the checkout lives in.
    pub fn materialize(&self, node: &DependencyNode, deep: bool, cache: &mut ModuleCache) -> Result<(), ResolveError> {
        let url = node.clone_url();
        let (owner, sub_path) = self.submodule_location(node);
        info!(name = %node.name, %url, path = %sub_path.display(), "materializing dependency");

        self.vcs.add_submodule(owner, &url, sub_path)?;
        self.vcs.fetch(&node.checkout_path, ORIGIN_REMOTE)?;
        self.vcs.checkout(&node.checkout_path, &self.options.default_branch)?;
        self.synchronize(node, deep, cache)
    }

    /// The package whose modules directory holds `node`, and the checkout
    /// path relative to it. That is the root in the flat layout and the
    /// declaring package in the nested one.
    fn submodule_location<'n>(&'n self, node: &'n DependencyNode) -> (&'n Path, &'n Path) {
        let owner = node
            .checkout_path
            .parent()
            .and_then(Path::parent)
            .unwrap_or(self.options.root.as_path());
        let sub_path = node
            .checkout_path
            .strip_prefix(owner)
            .unwrap_or(node.checkout_path.as_path());
        (owner, sub_path)
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Synchronize a dependency with its source, materializing it first if
    /// its checkout does not exist yet.
    #[instrument(skip(self, node, cache), fields(name = %node.name))]
    pub fn update(&self, node: &DependencyNode, deep: bool, cache: &mut ModuleCache) -> Result<(), ResolveError> {
        if node.checkout_path.exists() {
            self.synchronize(node, deep, cache)
        } else {
            self.materialize(node, deep, cache)
        }
    }

    pub fn synchronize(&self, node: &DependencyNode, deep: bool, cache: &mut ModuleCache) -> Result<(), ResolveError> {
        if cache.contains(&node.name) && !deep {
            debug!(name = %node.name, "already synchronized in this run");
            return Ok(());
        }
        let checkout = node.checkout_path.as_path();
        info!(name = %node.name, source = %node.source, "synchronizing");

        self.vcs.discard_changes(checkout)?;
        RemoteRewriter::new(self.vcs, &self.options.root).rewrite(node)?;

        let pull_remote = if self.vcs.remote(checkout, LOCAL_REMOTE)?.is_some() {
            LOCAL_REMOTE.to_string()
        } else {
            self.options.remote_name.clone()
        };
        let branch_source = match &node.source {
            Source::Local { path, .. } => path.as_path(),
            Source::Remote { .. } => checkout,
        };
        let branch = self
            .vcs
            .current_branch(branch_source)?
            .unwrap_or_else(|| self.options.default_branch.clone());
        self.vcs.pull(checkout, &pull_remote, &branch)?;

        let overlay = LocalOverlaySync::new(self.vcs, self.manifests);
        if let Source::Local { path, .. } = &node.source {
            overlay.switch_branches(path, checkout)?;
        }
        self.vcs.submodule_update(checkout, true, true)?;
        let mut local_changes = false;
        if let Source::Local { path, .. } = &node.source {
            let report = overlay.copy_changes(path, checkout)?;
            debug!(copied = report.copied.len(), deleted = report.deleted.len(), "overlay applied");
            local_changes = !report.is_empty();
        }

        let commit = self.vcs.latest_commit(checkout)?;
        info!(name = %node.name, %commit, "synchronized");
        cache.add(ModuleCacheItem::with_commit(&node.name, checkout, commit).with_local_changes(local_changes));

        for child in self.children(node)? {
            if deep {
                self.update(&child, true, cache)?;
            } else if child.checkout_path.exists() {
                self.scan(&child, cache)?;
            } else {
                self.add(&child, cache)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    /// Record the commit a checkout is at, reconciling with any commit
    /// already recorded for the same name. Never modifies the checkout.
    #[instrument(skip(self, node, cache), fields(name = %node.name))]
    pub fn scan(&self, node: &DependencyNode, cache: &mut ModuleCache) -> Result<(), ResolveError> {
        if let Some(existing) = cache.get(&node.name) {
            if existing.checkout_path == node.checkout_path && existing.commit.is_some() {
                debug!("checkout already scanned in this run");
                return Ok(());
            }
        }

        let checkout = node.checkout_path.as_path();
        if !checkout.exists() {
            return Err(PathError::NotFound(checkout.display().to_string()).into());
        }
        let commit = self.vcs.latest_commit(checkout)?;
        let observed = ModuleCacheItem::with_commit(&node.name, checkout, commit.clone());

        match cache.get(&node.name).and_then(|e| e.commit.clone()) {
            Some(existing) if existing != commit => {
                debug!(%existing, observed = %commit, "determining latest commit");
                match self.vcs.determine_ancestor(checkout, &commit, &existing)? {
                    Some(latest) if latest == commit => {
                        info!(name = %node.name, %commit, "newer commit found");
                        cache.add(observed);
                    }
                    Some(_) => debug!(name = %node.name, %existing, "cached commit is newer"),
                    None => warn!(
                        name = %node.name,
                        cached = %existing,
                        observed = %commit,
                        "histories diverged, keeping cached commit"
                    ),
                }
            }
            _ => cache.add(observed),
        }

        for child in self.children(node)? {
            self.scan(&child, cache)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Install
    // -----------------------------------------------------------------------

    /// Keep, per name, the checkout with the highest declared version.
    #[instrument(skip(self, node, cache), fields(name = %node.name))]
    pub fn install(&self, node: &DependencyNode, cache: &mut ModuleCache) -> Result<(), ResolveError> {
        if !node.checkout_path.exists() {
            return Err(PathError::NotFound(node.checkout_path.display().to_string()).into());
        }
        let version = if self.manifests.exists(&node.checkout_path) {
            Some(self.manifests.load(&node.checkout_path)?.version)
        } else {
            None
        };
        let observed = ModuleCacheItem::with_version(&node.name, &node.checkout_path, version);

        let kept = cache
            .get(&node.name)
            .filter(|existing| !is_newer(observed.version.as_deref(), existing.version.as_deref()))
            .map(|existing| existing.version.clone().unwrap_or_else(|| "-".into()));
        match kept {
            Some(kept) => debug!(
                %kept,
                observed = observed.version.as_deref().unwrap_or("-"),
                "version is not newer"
            ),
            None => cache.add(observed),
        }

        for child in self.children(node)? {
            self.install(&child, cache)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Remove / Status / Clean
// ---------------------------------------------------------------------------

/// State of one dependency checkout, as reported by [`Resolver::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Clean,
    /// Uncommitted changes in the work tree or index.
    Modified,
    /// Declared but not checked out.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStatus {
    pub name: String,
    pub checkout_path: PathBuf,
    pub state: CheckoutState,
}

impl<'a> Resolver<'a> {
    /// Unregister a dependency's submodule and delete its checkout. A
    /// dependency that was never checked out is only dropped from `cache`.
    /// Returns `true` when a checkout was removed.
    #[instrument(skip(self, node, cache), fields(name = %node.name))]
    pub fn remove(&self, node: &DependencyNode, cache: &mut ModuleCache) -> Result<bool, ResolveError> {
        cache.remove(&node.name);
        if !node.checkout_path.exists() {
            debug!("no checkout to remove");
            return Ok(false);
        }
        let (owner, sub_path) = self.submodule_location(node);
        self.vcs.remove_submodule(owner, sub_path)?;
        fs_util::remove_dir_all(&node.checkout_path)?;
        info!(path = %node.checkout_path.display(), "removed dependency checkout");
        Ok(true)
    }

    /// Collect the state of `node` and its descendants into `statuses`,
    /// depth-first. A checkout already listed is not visited again.
    pub fn status(&self, node: &DependencyNode, statuses: &mut Vec<ModuleStatus>) -> Result<(), ResolveError> {
        if statuses.iter().any(|s| s.checkout_path == node.checkout_path) {
            return Ok(());
        }
        let state = if !node.checkout_path.exists() {
            CheckoutState::Missing
        } else if self.vcs.has_changes(&node.checkout_path)? {
            CheckoutState::Modified
        } else {
            CheckoutState::Clean
        };
        statuses.push(ModuleStatus {
            name: node.name.clone(),
            checkout_path: node.checkout_path.clone(),
            state,
        });

        if state != CheckoutState::Missing {
            for child in self.children(node)? {
                self.status(&child, statuses)?;
            }
        }
        Ok(())
    }

    /// Delete the root's modules directory. Returns `true` when it existed.
    pub fn clean(&self) -> Result<bool, ResolveError> {
        let modules = self.options.root.join(&self.options.modules_dir);
        if !modules.exists() {
            return Ok(false);
        }
        fs_util::remove_dir_all(&modules)?;
        info!(path = %modules.display(), "removed modules directory");
        Ok(true)
    }
}

/// Strict semver comparison; a version that does not parse ranks below any
/// that does.
pub fn is_newer(candidate: Option<&str>, current: Option<&str>) -> bool {
    let parse = |v: Option<&str>| v.and_then(|s| Version::parse(s.trim()).ok());
    parse(candidate) > parse(current)
}

/// Write the commits resolved in `cache` into the manifest's dependency
/// pins. Returns `true` when any pin changed.
pub fn pin_commits(manifest: &mut Manifest, cache: &ModuleCache) -> bool {
    let mut changed = false;
    for (name, spec) in manifest.dependencies.iter_mut() {
        if let Some(commit) = cache.get(name).and_then(|item| item.commit.as_ref()) {
            if &spec.commit != commit {
                spec.commit = commit.clone();
                changed = true;
            }
        }
    }
    changed
}

/// Fold a finished Add/Update walk into the root manifest: pin the
/// resolved commits and, when a pin moved or a local override contributed
/// uncommitted work, bump the root's patch version. Returns `true` when the
/// manifest changed and needs saving.
pub fn record_walk(manifest: &mut Manifest, cache: &ModuleCache) -> Result<bool, ManifestError> {
    let pinned = pin_commits(manifest, cache);
    let overlaid = cache.iter().any(|item| item.local_changes);
    if !pinned && !overlaid {
        return Ok(false);
    }
    manifest.increment_patch_version()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer() {
        assert!(is_newer(Some("1.3.0"), Some("1.2.0")));
        assert!(!is_newer(Some("1.1.0"), Some("1.2.0")));
        assert!(!is_newer(Some("1.2.0"), Some("1.2.0")));
        assert!(is_newer(Some("0.0.1"), Some("garbage")));
        assert!(!is_newer(Some("garbage"), Some("0.0.1")));
        assert!(!is_newer(None, None));
        assert!(is_newer(Some("1.10.0"), Some("1.9.0")));
    }

    #[test]
    fn test_pin_commits() {
        let mut manifest = Manifest::new("app", "1.0.0")
            .with_dependency("a", DependencySpec::new("https://x/a.git"))
            .with_dependency("b", DependencySpec::new("https://x/b.git"));
        let mut cache = ModuleCache::new();
        cache.add(ModuleCacheItem::with_commit("a", "bpm_modules/a", "c1"));

        assert!(pin_commits(&mut manifest, &cache));
        assert_eq!(manifest.dependencies["a"].commit, "c1");
        assert_eq!(manifest.dependencies["b"].commit, "");
        assert!(!pin_commits(&mut manifest, &cache));
    }

    #[test]
    fn test_record_walk_bumps_only_on_change() {
        let mut manifest = Manifest::new("app", "1.0.0")
            .with_dependency("a", DependencySpec::new("https://x/a.git"));
        let mut cache = ModuleCache::new();
        cache.add(ModuleCacheItem::with_commit("a", "bpm_modules/a", "c1"));

        assert!(record_walk(&mut manifest, &cache).unwrap());
        assert_eq!(manifest.version, "1.0.1");
        assert!(!record_walk(&mut manifest, &cache).unwrap());
        assert_eq!(manifest.version, "1.0.1");

        cache.add(ModuleCacheItem::with_commit("a", "bpm_modules/a", "c1").with_local_changes(true));
        assert!(record_walk(&mut manifest, &cache).unwrap());
        assert_eq!(manifest.version, "1.0.2");
    }
}
