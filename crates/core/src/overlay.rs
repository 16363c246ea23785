//! One-way synchronization from a local override into its tracked checkout.
//!
//! Uncommitted work in the override is copied over the checkout, deletions
//! are replayed, and the override's manifest version is bumped so the
//! installer stage sees a new version. Nothing is merged: anything edited on
//! the checkout side at a copied path is overwritten.

use std::path::Path;

use tracing::{debug, info};

use crate::errors::ResolveError;
use crate::fs_util;
use crate::manifest::ManifestStore;
use crate::vcs::VersionControl;

/// What a [`LocalOverlaySync::copy_changes`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayReport {
    pub copied: Vec<String>,
    pub deleted: Vec<String>,
    /// New manifest version, when anything changed.
    pub version: Option<String>,
}

impl OverlayReport {
    pub fn is_empty(&self) -> bool {
        self.copied.is_empty() && self.deleted.is_empty()
    }
}

pub struct LocalOverlaySync<'a> {
    vcs: &'a dyn VersionControl,
    manifests: &'a dyn ManifestStore,
}

impl<'a> LocalOverlaySync<'a> {
    pub fn new(vcs: &'a dyn VersionControl, manifests: &'a dyn ManifestStore) -> Self {
        Self { vcs, manifests }
    }

    pub fn copy_changes(&self, source: &Path, destination: &Path) -> Result<OverlayReport, ResolveError> {
        let mut report = OverlayReport::default();
        info!(source = %source.display(), destination = %destination.display(), "copying local changes");

        for file in self.vcs.changed_files(source)? {
            let from = source.join(&file);
            let to = destination.join(&file);
            if from.is_dir() {
                fs_util::copy_dir(&from, &to, &[])?;
            } else {
                fs_util::copy_file(&from, &to)?;
            }
            debug!(file = %file, "copied");
            report.copied.push(file);
        }

        for file in self.vcs.deleted_files(source)? {
            if fs_util::remove_file(&destination.join(&file))? {
                debug!(file = %file, "deleted");
            }
            report.deleted.push(file);
        }

        if !report.is_empty() {
            let version = self.manifests.increment_patch_version(source)?;
            fs_util::copy_file(
                &self.manifests.manifest_path(source),
                &self.manifests.manifest_path(destination),
            )?;
            report.version = Some(version);
        }
        Ok(report)
    }

    /// Put `destination` on the branch `source` is on. A detached source
    /// leaves the destination alone. Returns the branch switched to.
    pub fn switch_branches(&self, source: &Path, destination: &Path) -> Result<Option<String>, ResolveError> {
        let Some(branch) = self.vcs.current_branch(source)? else {
            debug!(source = %source.display(), "source is detached, not switching branches");
            return Ok(None);
        };
        info!(branch = %branch, destination = %destination.display(), "switching branch to match override");
        self.vcs.checkout(destination, &branch)?;
        Ok(Some(branch))
    }
}
