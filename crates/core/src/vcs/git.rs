//! Git checkout operations.
//!
//! Queries (HEAD, status, ancestry, branch, remotes) go through `git2`.
//! Anything that talks to the network or rewrites the work tree shells out
//! to the `git` binary through a [`CommandRunner`].

use std::path::Path;

use git2::{ErrorCode, Oid, Repository, Status, StatusOptions};
use tracing::{debug, info, instrument};

use super::{Remote, VersionControl};
use crate::errors::{VcsError, VcsOp};
use crate::runner::{CommandRunner, ProcessRunner};

/// [`VersionControl`] over real git checkouts.
#[derive(Debug, Clone, Default)]
pub struct GitCli<R = ProcessRunner> {
    runner: R,
}

impl GitCli<ProcessRunner> {
    pub fn new() -> Self {
        Self { runner: ProcessRunner }
    }
}

impl<R: CommandRunner> GitCli<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    fn open(&self, path: &Path) -> Result<Repository, VcsError> {
        Repository::open(path).map_err(|_| VcsError::NotACheckout(path.display().to_string()))
    }

    fn git(&self, op: VcsOp, path: &Path, args: &[&str]) -> Result<String, VcsError> {
        self.runner
            .run(path, "git", args)
            .map_err(|e| VcsError::failed(op, path, e))
    }

    /// Work-tree status entries as `(path, status)` pairs.
    fn status_entries(&self, path: &Path) -> Result<Vec<(String, Status)>, VcsError> {
        let repo = self.open(path)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = repo
            .statuses(Some(&mut opts))
            .map_err(|e| VcsError::failed(VcsOp::Status, path, e))?;

        let mut entries = Vec::new();
        for entry in statuses.iter() {
            if let Some(file) = entry.path() {
                entries.push((file.to_string(), entry.status()));
            }
        }
        Ok(entries)
    }
}

fn is_deleted(status: Status) -> bool {
    status.intersects(Status::WT_DELETED | Status::INDEX_DELETED)
}

fn is_changed(status: Status) -> bool {
    status.intersects(
        Status::WT_NEW
            | Status::WT_MODIFIED
            | Status::WT_TYPECHANGE
            | Status::WT_RENAMED
            | Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE,
    )
}

impl<R: CommandRunner> VersionControl for GitCli<R> {
    fn latest_commit(&self, path: &Path) -> Result<String, VcsError> {
        let repo = self.open(path)?;
        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| VcsError::failed(VcsOp::LatestCommit, path, e))?;
        Ok(commit.id().to_string())
    }

    fn changed_files(&self, path: &Path) -> Result<Vec<String>, VcsError> {
        let entries = self.status_entries(path)?;
        let files: Vec<String> = entries
            .into_iter()
            .filter(|(_, status)| is_changed(*status) && !is_deleted(*status))
            .map(|(file, _)| file)
            .collect();
        debug!(path = %path.display(), count = files.len(), "listed changed files");
        Ok(files)
    }

    fn deleted_files(&self, path: &Path) -> Result<Vec<String>, VcsError> {
        let entries = self.status_entries(path)?;
        Ok(entries
            .into_iter()
            .filter(|(_, status)| is_deleted(*status))
            .map(|(file, _)| file)
            .collect())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn determine_ancestor(
        &self,
        path: &Path,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, VcsError> {
        let repo = self.open(path)?;
        let resolve = |sha: &str| -> Option<Oid> {
            let oid = Oid::from_str(sha).ok()?;
            repo.find_commit(oid).ok().map(|c| c.id())
        };
        // A commit we do not have cannot be placed in this history.
        let (Some(oid_a), Some(oid_b)) = (resolve(a), resolve(b)) else {
            debug!("commit missing from checkout, treating as unrelated");
            return Ok(None);
        };
        if oid_a == oid_b {
            return Ok(Some(a.to_string()));
        }

        let descends = |x: Oid, y: Oid| {
            repo.graph_descendant_of(x, y)
                .map_err(|e| VcsError::failed(VcsOp::Ancestry, path, e))
        };
        if descends(oid_a, oid_b)? {
            Ok(Some(a.to_string()))
        } else if descends(oid_b, oid_a)? {
            Ok(Some(b.to_string()))
        } else {
            Ok(None)
        }
    }

    fn current_branch(&self, path: &Path) -> Result<Option<String>, VcsError> {
        let repo = self.open(path)?;
        let detached = repo
            .head_detached()
            .map_err(|e| VcsError::failed(VcsOp::Branch, path, e))?;
        if detached {
            return Ok(None);
        }
        let head = repo
            .head()
            .map_err(|e| VcsError::failed(VcsOp::Branch, path, e))?;
        Ok(head.shorthand().map(str::to_string))
    }

    fn remotes(&self, path: &Path) -> Result<Vec<Remote>, VcsError> {
        let repo = self.open(path)?;
        let names = repo
            .remotes()
            .map_err(|e| VcsError::failed(VcsOp::Remote, path, e))?;
        let mut remotes = Vec::new();
        for name in names.iter().flatten() {
            let remote = repo
                .find_remote(name)
                .map_err(|e| VcsError::failed(VcsOp::Remote, path, e))?;
            remotes.push(Remote::new(name, remote.url().unwrap_or_default()));
        }
        Ok(remotes)
    }

    fn remote(&self, path: &Path, name: &str) -> Result<Option<Remote>, VcsError> {
        let repo = self.open(path)?;
        let result = match repo.find_remote(name) {
            Ok(remote) => Ok(Some(Remote::new(name, remote.url().unwrap_or_default()))),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(VcsError::failed(VcsOp::Remote, path, e)),
        };
        result
    }

    fn add_remote(&self, path: &Path, name: &str, url: &str) -> Result<(), VcsError> {
        let repo = self.open(path)?;
        repo.remote(name, url)
            .map_err(|e| VcsError::failed(VcsOp::Remote, path, e))?;
        info!(path = %path.display(), name, url, "added remote");
        Ok(())
    }

    fn remove_remote(&self, path: &Path, name: &str) -> Result<bool, VcsError> {
        let repo = self.open(path)?;
        match repo.remote_delete(name) {
            Ok(()) => {
                debug!(path = %path.display(), name, "removed remote");
                Ok(true)
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(VcsError::failed(VcsOp::Remote, path, e)),
        }
    }

    fn rename_remote(&self, path: &Path, old: &str, new: &str) -> Result<(), VcsError> {
        let repo = self.open(path)?;
        repo.remote_rename(old, new)
            .map_err(|e| VcsError::failed(VcsOp::Remote, path, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn checkout(&self, path: &Path, refname: &str) -> Result<(), VcsError> {
        self.git(VcsOp::Checkout, path, &["checkout", refname])?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn fetch(&self, path: &Path, remote: &str) -> Result<(), VcsError> {
        self.git(VcsOp::Fetch, path, &["fetch", remote])?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn pull(&self, path: &Path, remote: &str, branch: &str) -> Result<(), VcsError> {
        info!(remote, branch, "pulling");
        self.git(VcsOp::Pull, path, &["pull", remote, branch])?;
        Ok(())
    }

    fn discard_changes(&self, path: &Path) -> Result<(), VcsError> {
        self.git(VcsOp::Discard, path, &["checkout", "--", "."])?;
        Ok(())
    }

    #[instrument(skip(self), fields(parent = %parent.display()))]
    fn add_submodule(&self, parent: &Path, url: &str, sub_path: &Path) -> Result<(), VcsError> {
        let sub = sub_path.to_string_lossy();
        info!(url, path = %sub, "adding submodule");
        self.git(
            VcsOp::Submodule,
            parent,
            &["submodule", "add", "--force", url, sub.as_ref()],
        )?;
        Ok(())
    }

    fn submodule_update(&self, path: &Path, init: bool, recursive: bool) -> Result<(), VcsError> {
        let mut args = vec!["submodule", "update"];
        if init {
            args.push("--init");
        }
        if recursive {
            args.push("--recursive");
        }
        self.git(VcsOp::Submodule, path, &args)?;
        Ok(())
    }

    #[instrument(skip(self), fields(parent = %parent.display()))]
    fn remove_submodule(&self, parent: &Path, sub_path: &Path) -> Result<(), VcsError> {
        let sub = sub_path.to_string_lossy();
        info!(path = %sub, "removing submodule");
        self.git(
            VcsOp::Submodule,
            parent,
            &["submodule", "deinit", "--force", "--", sub.as_ref()],
        )?;
        self.git(VcsOp::Submodule, parent, &["rm", "--force", "--", sub.as_ref()])?;
        Ok(())
    }

    fn has_changes(&self, path: &Path) -> Result<bool, VcsError> {
        Ok(!self.status_entries(path)?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;

    fn commit_all(repo: &Repository, message: &str) -> Oid {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@test.com").unwrap();
        let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn test_latest_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let oid = commit_all(&repo, "init");

        let git = GitCli::new();
        assert_eq!(git.latest_commit(dir.path()).unwrap(), oid.to_string());
    }

    #[test]
    fn test_latest_commit_not_a_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let result = GitCli::new().latest_commit(&dir.path().join("missing"));
        assert!(matches!(result, Err(VcsError::NotACheckout(_))));
    }

    #[test]
    fn test_changed_and_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        commit_all(&repo, "init");

        std::fs::write(dir.path().join("a.txt"), "a2").unwrap();
        std::fs::remove_file(dir.path().join("b.txt")).unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/c.txt"), "c").unwrap();
        std::fs::write(dir.path().join("debug.log"), "noise").unwrap();

        let git = GitCli::new();
        assert_eq!(
            sorted(git.changed_files(dir.path()).unwrap()),
            vec!["a.txt", "src/c.txt"]
        );
        assert_eq!(git.deleted_files(dir.path()).unwrap(), vec!["b.txt"]);
        assert!(git.has_changes(dir.path()).unwrap());
    }

    #[test]
    fn test_has_changes_clean_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        commit_all(&repo, "init");

        let git = GitCli::new();
        std::fs::write(dir.path().join("debug.log"), "noise").unwrap();
        assert!(!git.has_changes(dir.path()).unwrap());

        std::fs::write(dir.path().join("new.txt"), "n").unwrap();
        assert!(git.has_changes(dir.path()).unwrap());
    }

    #[test]
    fn test_determine_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("f.txt"), "1").unwrap();
        let x = commit_all(&repo, "x");
        std::fs::write(dir.path().join("f.txt"), "2").unwrap();
        let y = commit_all(&repo, "y");

        // A sibling of y that branches off x without moving HEAD.
        let sig = Signature::now("Test", "test@test.com").unwrap();
        let x_commit = repo.find_commit(x).unwrap();
        let z = repo
            .commit(None, &sig, &sig, "z", &x_commit.tree().unwrap(), &[&x_commit])
            .unwrap();

        let git = GitCli::new();
        let (x, y, z) = (x.to_string(), y.to_string(), z.to_string());
        assert_eq!(git.determine_ancestor(dir.path(), &y, &x).unwrap(), Some(y.clone()));
        assert_eq!(git.determine_ancestor(dir.path(), &x, &y).unwrap(), Some(y.clone()));
        assert_eq!(git.determine_ancestor(dir.path(), &y, &z).unwrap(), None);
        assert_eq!(
            git.determine_ancestor(dir.path(), &y, "0123456789012345678901234567890123456789")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_current_branch_and_detached_head() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("f.txt"), "1").unwrap();
        let oid = commit_all(&repo, "init");

        let git = GitCli::new();
        assert!(git.current_branch(dir.path()).unwrap().is_some());

        repo.set_head_detached(oid).unwrap();
        assert_eq!(git.current_branch(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_remote_crud() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let git = GitCli::new();

        assert_eq!(git.remote(dir.path(), "origin").unwrap(), None);
        git.add_remote(dir.path(), "origin", "https://example.com/org/dep.git")
            .unwrap();
        git.add_remote(dir.path(), "fork", "/work/org/dep.git").unwrap();
        assert_eq!(
            git.remote(dir.path(), "origin").unwrap(),
            Some(Remote::new("origin", "https://example.com/org/dep.git"))
        );
        assert_eq!(git.remotes(dir.path()).unwrap().len(), 2);

        git.rename_remote(dir.path(), "fork", "mirror").unwrap();
        assert!(git.remote(dir.path(), "fork").unwrap().is_none());
        assert!(git.remote(dir.path(), "mirror").unwrap().is_some());

        assert!(git.remove_remote(dir.path(), "mirror").unwrap());
        assert!(!git.remove_remote(dir.path(), "mirror").unwrap());
    }
}
