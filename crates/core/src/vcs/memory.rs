//! In-memory [`VersionControl`] implementation.
//!
//! Checkouts, commits and upstream repositories live in maps; the only disk
//! side effect is creating the checkout directory (and any seeded files) on
//! `add_submodule`, so code that checks `Path::exists` or reads manifests
//! behaves the same as against real git. Every call is recorded so tests can
//! assert how often a checkout was touched.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::{Remote, VersionControl};
use crate::errors::{VcsError, VcsOp};

#[derive(Debug, Clone, Default)]
struct Checkout {
    head: String,
    branch: Option<String>,
    remotes: BTreeMap<String, String>,
    changed: Vec<String>,
    deleted: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Upstream {
    head: String,
    files: Vec<(String, String)>,
}

/// A recorded call: operation and the working directory it ran in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: VcsOp,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct InMemoryVcs {
    checkouts: RefCell<BTreeMap<PathBuf, Checkout>>,
    parents: RefCell<HashMap<String, Vec<String>>>,
    upstreams: RefCell<HashMap<String, Upstream>>,
    calls: RefCell<Vec<Call>>,
}

impl InMemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit and its parents in the shared history.
    pub fn add_commit(&self, id: &str, parents: &[&str]) {
        self.parents.borrow_mut().insert(
            id.to_string(),
            parents.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Register an existing checkout at `path`.
    pub fn add_checkout(&self, path: impl Into<PathBuf>, head: &str, branch: Option<&str>, remotes: &[(&str, &str)]) {
        let checkout = Checkout {
            head: head.to_string(),
            branch: branch.map(str::to_string),
            remotes: remotes
                .iter()
                .map(|(n, u)| (n.to_string(), u.to_string()))
                .collect(),
            ..Default::default()
        };
        self.checkouts.borrow_mut().insert(path.into(), checkout);
    }

    /// Register a remote repository. `files` are written into any checkout
    /// materialized from it.
    pub fn add_upstream(&self, url: &str, head: &str, files: &[(&str, &str)]) {
        self.upstreams.borrow_mut().insert(
            url.to_string(),
            Upstream {
                head: head.to_string(),
                files: files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
            },
        );
    }

    /// Move a remote repository's branch to a new commit.
    pub fn set_upstream_head(&self, url: &str, head: &str) {
        if let Some(upstream) = self.upstreams.borrow_mut().get_mut(url) {
            upstream.head = head.to_string();
        }
    }

    pub fn set_head(&self, path: &Path, head: &str) {
        if let Some(c) = self.checkouts.borrow_mut().get_mut(path) {
            c.head = head.to_string();
        }
    }

    /// Set the uncommitted changes reported for a checkout.
    pub fn set_changes(&self, path: &Path, changed: &[&str], deleted: &[&str]) {
        if let Some(c) = self.checkouts.borrow_mut().get_mut(path) {
            c.changed = changed.iter().map(|s| s.to_string()).collect();
            c.deleted = deleted.iter().map(|s| s.to_string()).collect();
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Number of calls made against `path`.
    pub fn calls_for(&self, path: &Path) -> usize {
        self.calls.borrow().iter().filter(|c| c.path == path).count()
    }

    /// Number of calls of one operation category.
    pub fn count(&self, op: VcsOp) -> usize {
        self.calls.borrow().iter().filter(|c| c.op == op).count()
    }

    fn record(&self, op: VcsOp, path: &Path) {
        self.calls.borrow_mut().push(Call {
            op,
            path: path.to_path_buf(),
        });
    }

    fn with_checkout<T>(
        &self,
        op: VcsOp,
        path: &Path,
        f: impl FnOnce(&mut Checkout) -> Result<T, VcsError>,
    ) -> Result<T, VcsError> {
        self.record(op, path);
        let mut checkouts = self.checkouts.borrow_mut();
        let checkout = checkouts
            .get_mut(path)
            .ok_or_else(|| VcsError::NotACheckout(path.display().to_string()))?;
        f(checkout)
    }

    fn reachable(&self, from: &str, target: &str) -> bool {
        let parents = self.parents.borrow();
        let mut stack = vec![from.to_string()];
        let mut seen = HashSet::new();
        while let Some(commit) = stack.pop() {
            if commit == target {
                return true;
            }
            if !seen.insert(commit.clone()) {
                continue;
            }
            if let Some(ps) = parents.get(&commit) {
                stack.extend(ps.iter().cloned());
            }
        }
        false
    }

    /// Head commit currently published at `url`: a registered upstream, or
    /// the checkout living at that path (local overrides).
    fn head_at(&self, url: &str) -> Option<String> {
        if let Some(upstream) = self.upstreams.borrow().get(url) {
            return Some(upstream.head.clone());
        }
        self.checkouts
            .borrow()
            .get(Path::new(url))
            .map(|c| c.head.clone())
    }
}

impl VersionControl for InMemoryVcs {
    fn latest_commit(&self, path: &Path) -> Result<String, VcsError> {
        self.with_checkout(VcsOp::LatestCommit, path, |c| Ok(c.head.clone()))
    }

    fn changed_files(&self, path: &Path) -> Result<Vec<String>, VcsError> {
        self.with_checkout(VcsOp::Status, path, |c| {
            Ok(c.changed
                .iter()
                .filter(|f| !c.deleted.contains(f))
                .cloned()
                .collect())
        })
    }

    fn deleted_files(&self, path: &Path) -> Result<Vec<String>, VcsError> {
        self.with_checkout(VcsOp::Status, path, |c| Ok(c.deleted.clone()))
    }

    fn determine_ancestor(&self, path: &Path, a: &str, b: &str) -> Result<Option<String>, VcsError> {
        self.with_checkout(VcsOp::Ancestry, path, |_| Ok(()))?;
        if self.reachable(a, b) {
            Ok(Some(a.to_string()))
        } else if self.reachable(b, a) {
            Ok(Some(b.to_string()))
        } else {
            Ok(None)
        }
    }

    fn current_branch(&self, path: &Path) -> Result<Option<String>, VcsError> {
        self.with_checkout(VcsOp::Branch, path, |c| Ok(c.branch.clone()))
    }

    fn remotes(&self, path: &Path) -> Result<Vec<Remote>, VcsError> {
        self.with_checkout(VcsOp::Remote, path, |c| {
            Ok(c.remotes
                .iter()
                .map(|(n, u)| Remote::new(n.as_str(), u.as_str()))
                .collect())
        })
    }

    fn remote(&self, path: &Path, name: &str) -> Result<Option<Remote>, VcsError> {
        self.with_checkout(VcsOp::Remote, path, |c| {
            Ok(c.remotes.get(name).map(|u| Remote::new(name, u.as_str())))
        })
    }

    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<(), VcsError> {
        self.with_checkout(VcsOp::Remote, path, |c| {
            if c.remotes.contains_key(name) {
                return Err(VcsError::failed(
                    VcsOp::Remote,
                    path,
                    format!("remote '{}' already exists", name),
                ));
            }
            c.remotes.insert(name.to_string(), url.to_string());
            Ok(())
        })
    }

    fn remove_remote(&self, path: &Path, name: &str) -> Result<bool, VcsError> {
        self.with_checkout(VcsOp::Remote, path, |c| Ok(c.remotes.remove(name).is_some()))
    }

    fn rename_remote(&self, path: &Path, old: &str, new: &str) -> Result<(), VcsError> {
        self.with_checkout(VcsOp::Remote, path, |c| {
            let url = c.remotes.remove(old).ok_or_else(|| {
                VcsError::failed(VcsOp::Remote, path, format!("no such remote '{}'", old))
            })?;
            c.remotes.insert(new.to_string(), url);
            Ok(())
        })
    }

    fn checkout(&self, path: &Path, refname: &str) -> Result<(), VcsError> {
        let is_commit = self.parents.borrow().contains_key(refname);
        self.with_checkout(VcsOp::Checkout, path, |c| {
            if is_commit {
                c.head = refname.to_string();
                c.branch = None;
            } else {
                c.branch = Some(refname.to_string());
            }
            Ok(())
        })
    }

    fn fetch(&self, path: &Path, remote: &str) -> Result<(), VcsError> {
        self.with_checkout(VcsOp::Fetch, path, |c| {
            if c.remotes.contains_key(remote) {
                Ok(())
            } else {
                Err(VcsError::failed(VcsOp::Fetch, path, format!("no such remote '{}'", remote)))
            }
        })
    }

    fn pull(&self, path: &Path, remote: &str, _branch: &str) -> Result<(), VcsError> {
        let url = self
            .with_checkout(VcsOp::Pull, path, |c| Ok(c.remotes.get(remote).cloned()))?
            .ok_or_else(|| VcsError::failed(VcsOp::Pull, path, format!("no such remote '{}'", remote)))?;
        let head = self
            .head_at(&url)
            .ok_or_else(|| VcsError::failed(VcsOp::Pull, path, format!("repository '{}' not found", url)))?;
        self.set_head(path, &head);
        Ok(())
    }

    fn discard_changes(&self, path: &Path) -> Result<(), VcsError> {
        self.with_checkout(VcsOp::Discard, path, |_| Ok(()))
    }

    fn add_submodule(&self, parent: &Path, url: &str, sub_path: &Path) -> Result<(), VcsError> {
        self.record(VcsOp::Submodule, parent);
        let target = parent.join(sub_path);
        let head = self.head_at(url).ok_or_else(|| {
            VcsError::failed(VcsOp::Submodule, parent, format!("repository '{}' not found", url))
        })?;

        std::fs::create_dir_all(&target).map_err(|e| VcsError::failed(VcsOp::Submodule, &target, e))?;
        let files = self
            .upstreams
            .borrow()
            .get(url)
            .map(|u| u.files.clone())
            .unwrap_or_default();
        for (rel, content) in files {
            let file = target.join(rel);
            if let Some(dir) = file.parent() {
                std::fs::create_dir_all(dir).map_err(|e| VcsError::failed(VcsOp::Submodule, dir, e))?;
            }
            std::fs::write(&file, content).map_err(|e| VcsError::failed(VcsOp::Submodule, &file, e))?;
        }

        self.add_checkout(target, &head, Some("master"), &[("origin", url)]);
        Ok(())
    }

    fn submodule_update(&self, path: &Path, _init: bool, _recursive: bool) -> Result<(), VcsError> {
        self.with_checkout(VcsOp::Submodule, path, |_| Ok(()))
    }

    fn remove_submodule(&self, parent: &Path, sub_path: &Path) -> Result<(), VcsError> {
        self.record(VcsOp::Submodule, parent);
        let target = parent.join(sub_path);
        if self.checkouts.borrow_mut().remove(&target).is_none() {
            return Err(VcsError::NotACheckout(target.display().to_string()));
        }
        match std::fs::remove_dir_all(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VcsError::failed(VcsOp::Submodule, &target, e)),
        }
    }

    fn has_changes(&self, path: &Path) -> Result<bool, VcsError> {
        self.with_checkout(VcsOp::Status, path, |c| {
            Ok(!c.changed.is_empty() || !c.deleted.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestry_either_order() {
        let vcs = InMemoryVcs::new();
        vcs.add_commit("x", &[]);
        vcs.add_commit("y", &["x"]);
        vcs.add_commit("z", &["x"]);
        vcs.add_checkout("/r", "y", Some("master"), &[]);

        let r = Path::new("/r");
        assert_eq!(vcs.determine_ancestor(r, "y", "x").unwrap().as_deref(), Some("y"));
        assert_eq!(vcs.determine_ancestor(r, "x", "y").unwrap().as_deref(), Some("y"));
        assert_eq!(vcs.determine_ancestor(r, "y", "z").unwrap(), None);
    }

    #[test]
    fn test_pull_follows_upstream() {
        let vcs = InMemoryVcs::new();
        vcs.add_upstream("https://example.com/dep.git", "c2", &[]);
        vcs.add_checkout("/r", "c1", Some("master"), &[("origin", "https://example.com/dep.git")]);

        vcs.pull(Path::new("/r"), "origin", "master").unwrap();
        assert_eq!(vcs.latest_commit(Path::new("/r")).unwrap(), "c2");
        assert!(vcs.pull(Path::new("/r"), "fork", "master").is_err());
        assert_eq!(vcs.count(VcsOp::Pull), 2);
    }

    #[test]
    fn test_changed_excludes_deleted() {
        let vcs = InMemoryVcs::new();
        vcs.add_checkout("/r", "c1", None, &[]);
        vcs.set_changes(Path::new("/r"), &["a.txt", "b.txt"], &["b.txt"]);
        assert_eq!(vcs.changed_files(Path::new("/r")).unwrap(), vec!["a.txt"]);
        assert_eq!(vcs.deleted_files(Path::new("/r")).unwrap(), vec!["b.txt"]);
        assert!(vcs.has_changes(Path::new("/r")).unwrap());

        vcs.set_changes(Path::new("/r"), &[], &[]);
        assert!(!vcs.has_changes(Path::new("/r")).unwrap());
    }

    #[test]
    fn test_remove_submodule_forgets_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bpm_modules/dep");
        std::fs::create_dir_all(&target).unwrap();
        let vcs = InMemoryVcs::new();
        vcs.add_checkout(&target, "c1", Some("master"), &[]);

        vcs.remove_submodule(dir.path(), Path::new("bpm_modules/dep")).unwrap();
        assert!(!target.exists());
        assert!(matches!(vcs.latest_commit(&target), Err(VcsError::NotACheckout(_))));
        assert!(vcs.remove_submodule(dir.path(), Path::new("bpm_modules/dep")).is_err());
    }
}
