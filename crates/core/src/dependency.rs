//! A dependency as the resolver sees it: name, where it comes from, and
//! where it is checked out.

use std::fmt;
use std::path::PathBuf;

use crate::remote::{trim_git_suffix, RemoteUrl};

/// Where a dependency's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A remote repository locator (URL, scp-style address or path).
    Remote { url: String },
    /// A developer's working copy that overrides the remote while it exists.
    Local {
        path: PathBuf,
        /// Declared remote, used to seed a fresh checkout.
        upstream: Option<String>,
    },
}

impl Source {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    /// `true` for remote sources reachable over HTTP(S).
    pub fn is_http(&self) -> bool {
        match self {
            Self::Remote { url } => RemoteUrl::parse(url).map(|u| u.is_http()).unwrap_or(false),
            Self::Local { .. } => false,
        }
    }

    /// The source as a single string: URL or override path.
    pub fn locator(&self) -> String {
        match self {
            Self::Remote { url } => url.clone(),
            Self::Local { path, .. } => path.display().to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { url } => write!(f, "{}", url),
            Self::Local { path, .. } => write!(f, "local:{}", path.display()),
        }
    }
}

/// One node of the dependency tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    /// Cache key. The same name may be reached along several paths.
    pub name: String,
    pub source: Source,
    /// Unique per instantiation.
    pub checkout_path: PathBuf,
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, source: Source, checkout_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source,
            checkout_path: checkout_path.into(),
        }
    }

    /// Last segment of the source without a trailing `.git`, falling back
    /// to the dependency name.
    pub fn bare_name(&self) -> String {
        let locator = self.source.locator();
        let trimmed = trim_git_suffix(locator.trim_end_matches('/'));
        trimmed
            .rsplit(|c: char| c == '/' || c == ':')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }

    /// URL handed to `git submodule add`.
    pub fn clone_url(&self) -> String {
        match &self.source {
            Source::Remote { url } => with_git_suffix(url),
            Source::Local { upstream: Some(url), .. } => with_git_suffix(url),
            Source::Local { path, upstream: None } => path.display().to_string(),
        }
    }
}

fn with_git_suffix(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.ends_with(".git") {
        url.to_string()
    } else {
        format!("{}.git", url)
    }
}
