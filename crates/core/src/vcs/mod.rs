//! Version-control operations used by the resolver.
//!
//! [`VersionControl`] is the only way the resolver touches a checkout.
//! [`GitCli`] is the real implementation; `InMemoryVcs` keeps the same
//! contract without a git binary and is what the resolver tests run against;
//! it is only compiled for tests or with the `testing` feature.

pub mod git;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::VcsError;

pub use git::GitCli;
#[cfg(any(test, feature = "testing"))]
pub use memory::InMemoryVcs;

/// Name of the remote that tracks a local override.
pub const LOCAL_REMOTE: &str = "local";

/// Name of the remote every materialized checkout must have.
pub const ORIGIN_REMOTE: &str = "origin";

/// A named remote of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

impl Remote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Synchronous version-control operations, one working directory per call.
pub trait VersionControl {
    /// Commit id of HEAD. Fails if `path` is not a checkout.
    fn latest_commit(&self, path: &Path) -> Result<String, VcsError>;

    /// Modified and untracked files (ignore rules applied), minus deletions.
    fn changed_files(&self, path: &Path) -> Result<Vec<String>, VcsError>;

    /// Files removed from the work tree or index but not yet committed.
    fn deleted_files(&self, path: &Path) -> Result<Vec<String>, VcsError>;

    /// Whichever of `a` and `b` has the other in its history, or `None`
    /// when neither is reachable from the other.
    fn determine_ancestor(&self, path: &Path, a: &str, b: &str)
        -> Result<Option<String>, VcsError>;

    /// Current branch name, `None` when HEAD is detached.
    fn current_branch(&self, path: &Path) -> Result<Option<String>, VcsError>;

    fn remotes(&self, path: &Path) -> Result<Vec<Remote>, VcsError>;

    /// Look up a remote by name; `Ok(None)` when it does not exist.
    fn remote(&self, path: &Path, name: &str) -> Result<Option<Remote>, VcsError>;

    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<(), VcsError>;

    /// Remove a remote. Returns `false` when there was nothing to remove.
    fn remove_remote(&self, path: &Path, name: &str) -> Result<bool, VcsError>;

    fn rename_remote(&self, path: &Path, old: &str, new: &str) -> Result<(), VcsError>;

    fn checkout(&self, path: &Path, refname: &str) -> Result<(), VcsError>;

    fn fetch(&self, path: &Path, remote: &str) -> Result<(), VcsError>;

    fn pull(&self, path: &Path, remote: &str, branch: &str) -> Result<(), VcsError>;

    /// Throw away uncommitted modifications to tracked files.
    fn discard_changes(&self, path: &Path) -> Result<(), VcsError>;

    /// Register `url` as a submodule of the repository at `parent`, checked
    /// out at `sub_path` (relative to `parent`).
    fn add_submodule(&self, parent: &Path, url: &str, sub_path: &Path) -> Result<(), VcsError>;

    fn submodule_update(&self, path: &Path, init: bool, recursive: bool) -> Result<(), VcsError>;

    /// Unregister the submodule at `sub_path` (relative to `parent`) and
    /// drop it from the index.
    fn remove_submodule(&self, parent: &Path, sub_path: &Path) -> Result<(), VcsError>;

    /// `true` when the work tree or index differs from HEAD, untracked
    /// files included.
    fn has_changes(&self, path: &Path) -> Result<bool, VcsError>;
}
