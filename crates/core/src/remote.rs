//! Remote URL derivation and per-checkout remote rewriting.
//!
//! A dependency checkout mirrors the remote layout of the repository that
//! invoked bpm: for every fork or mirror remote the root has, the checkout
//! gets a remote of the same name pointing at the dependency's copy in that
//! fork. Local overrides are tracked through a dedicated `local` remote.
//!
//! URLs are parsed once into a [`RemoteUrl`] so splicing a name onto a
//! remote never double-suffixes or re-splices an already derived URL.

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::dependency::{DependencyNode, Source};
use crate::errors::{RemoteError, ResolveError};
use crate::vcs::{VersionControl, LOCAL_REMOTE, ORIGIN_REMOTE};

/// Strip one trailing `.git`, if present.
pub fn trim_git_suffix(s: &str) -> &str {
    s.strip_suffix(".git").unwrap_or(s)
}

// ---------------------------------------------------------------------------
// RemoteUrl
// ---------------------------------------------------------------------------

/// A remote locator split into scheme, host and path.
///
/// | Input | scheme | host | path |
/// |-------|--------|------|------|
/// | `https://h/org/r.git` | `https` | `h` | `/org/r.git` |
/// | `git@h:org/r.git` | — | `git@h` | `org/r.git` |
/// | `/work/org/r` | — | — | `/work/org/r` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    pub scheme: Option<String>,
    pub host: String,
    pub path: String,
}

impl RemoteUrl {
    pub fn parse(raw: &str) -> Result<Self, RemoteError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RemoteError::InvalidUrl(raw.to_string()));
        }

        if let Some((scheme, rest)) = raw.split_once("://") {
            if scheme.is_empty() {
                return Err(RemoteError::InvalidUrl(raw.to_string()));
            }
            let (host, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, ""),
            };
            return Ok(Self {
                scheme: Some(scheme.to_ascii_lowercase()),
                host: host.to_string(),
                path: path.to_string(),
            });
        }

        if is_scp_like(raw) {
            if let Some((host, path)) = raw.split_once(':') {
                return Ok(Self {
                    scheme: None,
                    host: host.to_string(),
                    path: path.to_string(),
                });
            }
        }

        Ok(Self {
            scheme: None,
            host: String::new(),
            path: raw.to_string(),
        })
    }

    pub fn is_http(&self) -> bool {
        matches!(self.scheme.as_deref(), Some("http") | Some("https"))
    }

    /// Final path segment without `.git`.
    pub fn bare_name(&self) -> &str {
        let path = self.path.trim_end_matches('/');
        let last = path.rsplit('/').next().unwrap_or(path);
        trim_git_suffix(last)
    }

    /// Append `name` as a new path segment, unless the URL already ends in
    /// `name` or `name.git`.
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_matches('/');
        if name.is_empty() || self.bare_name() == trim_git_suffix(name) {
            return self.clone();
        }
        let base = self.path.trim_end_matches('/');
        let path = if base.is_empty() && self.scheme.is_some() {
            format!("/{}", name)
        } else if base.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", base, name)
        };
        Self {
            path,
            ..self.clone()
        }
    }

    /// Replace the final segment with `name`, keeping a `.git` suffix if the
    /// original had one.
    pub fn sibling(&self, name: &str) -> Self {
        let trimmed = self.path.trim_end_matches('/');
        let had_suffix = trimmed.ends_with(".git");
        let parent = match trimmed.rfind('/') {
            Some(i) => &trimmed[..=i],
            None => "",
        };
        let name = trim_git_suffix(name.trim_matches('/'));
        let path = if had_suffix {
            format!("{}{}.git", parent, name)
        } else {
            format!("{}{}", parent, name)
        };
        Self {
            path,
            ..self.clone()
        }
    }

    pub fn with_git_suffix(&self) -> Self {
        let path = self.path.trim_end_matches('/');
        let path = if path.ends_with(".git") {
            path.to_string()
        } else {
            format!("{}.git", path)
        };
        Self {
            path,
            ..self.clone()
        }
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            Some(scheme) => write!(f, "{}://{}{}", scheme, self.host, self.path),
            None if !self.host.is_empty() => write!(f, "{}:{}", self.host, self.path),
            None => f.write_str(&self.path),
        }
    }
}

/// `user@host:path` style address. Absolute and relative filesystem paths
/// never qualify.
fn is_scp_like(raw: &str) -> bool {
    if raw.starts_with('/') || raw.starts_with('.') {
        return false;
    }
    match (raw.find(':'), raw.find('/')) {
        (Some(colon), Some(slash)) => colon < slash && colon > 1,
        (Some(colon), None) => colon > 1,
        _ => false,
    }
}

/// `true` when `raw` already names a repository on its own, as opposed to a
/// bare dependency name that still needs a base.
pub fn is_absolute_locator(raw: &str) -> bool {
    raw.contains("://") || raw.starts_with('/') || raw.starts_with('.') || is_scp_like(raw)
}

/// Turn a declared dependency locator into a remote URL.
///
/// Resolution order:
/// 1. Absolute locators are returned unchanged.
/// 2. With a configured `base_url`, the name is joined onto it.
/// 3. With a `root_remote` (the invoking repository's pull remote), the
///    dependency is assumed to be its sibling.
/// 4. Otherwise the declared value is returned as-is.
pub fn make_remote_url(
    declared: &str,
    base_url: Option<&str>,
    root_remote: Option<&str>,
) -> Result<String, RemoteError> {
    let declared = declared.trim();
    if is_absolute_locator(declared) {
        return Ok(declared.to_string());
    }
    if let Some(base) = base_url {
        return Ok(RemoteUrl::parse(base)?.join(declared).to_string());
    }
    if let Some(root) = root_remote {
        return Ok(RemoteUrl::parse(root)?.sibling(declared).to_string());
    }
    Ok(declared.to_string())
}

// ---------------------------------------------------------------------------
// RemoteRewriter
// ---------------------------------------------------------------------------

/// Keeps a dependency checkout's remotes aligned with the invoking
/// repository's fork/mirror remotes and with its local-override status.
pub struct RemoteRewriter<'a> {
    vcs: &'a dyn VersionControl,
    root: &'a Path,
}

impl<'a> RemoteRewriter<'a> {
    /// `root` is the repository whose remotes are mirrored.
    pub fn new(vcs: &'a dyn VersionControl, root: &'a Path) -> Self {
        Self { vcs, root }
    }

    pub fn rewrite(&self, node: &DependencyNode) -> Result<(), ResolveError> {
        let checkout = node.checkout_path.as_path();
        let origin = self
            .vcs
            .remote(checkout, ORIGIN_REMOTE)?
            .ok_or_else(|| RemoteError::Missing {
                name: ORIGIN_REMOTE.into(),
                path: checkout.display().to_string(),
            })?;

        let bare_name = node.bare_name();
        for remote in self.vcs.remotes(self.root)? {
            if remote.name == ORIGIN_REMOTE || remote.name == LOCAL_REMOTE {
                continue;
            }
            self.vcs.remove_remote(checkout, &remote.name)?;
            let url = if node.source.is_http() {
                origin.url.clone()
            } else {
                RemoteUrl::parse(&remote.url)?
                    .join(&bare_name)
                    .with_git_suffix()
                    .to_string()
            };
            info!(remote = %remote.name, %url, path = %checkout.display(), "adding remote");
            self.vcs.add_remote(checkout, &remote.name, &url)?;
        }

        match &node.source {
            Source::Local { path, .. } => self.track_local(checkout, path),
            Source::Remote { .. } => {
                if self.vcs.remove_remote(checkout, LOCAL_REMOTE)? {
                    debug!(path = %checkout.display(), "dropped stale local remote");
                }
                Ok(())
            }
        }
    }

    /// Point `local` at the override; on first tracking, also re-point
    /// `origin` at the override's own upstream.
    fn track_local(&self, checkout: &Path, override_path: &Path) -> Result<(), ResolveError> {
        let had_local = self.vcs.remove_remote(checkout, LOCAL_REMOTE)?;
        let local_url = override_path.display().to_string();
        info!(url = %local_url, path = %checkout.display(), "adding local remote");
        self.vcs.add_remote(checkout, LOCAL_REMOTE, &local_url)?;

        if !had_local {
            let upstream = self
                .vcs
                .remote(override_path, ORIGIN_REMOTE)?
                .ok_or_else(|| RemoteError::Missing {
                    name: ORIGIN_REMOTE.into(),
                    path: override_path.display().to_string(),
                })?;
            self.vcs.remove_remote(checkout, ORIGIN_REMOTE)?;
            info!(url = %upstream.url, path = %checkout.display(), "re-pointing origin at override upstream");
            self.vcs.add_remote(checkout, ORIGIN_REMOTE, &upstream.url)?;
        }
        Ok(())
    }
}
