//! Error types for the bpm core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. A
//! resolver walk reports everything below it as a [`ResolveError`].

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Version control errors
// ---------------------------------------------------------------------------

/// Category of a version-control operation, carried by [`VcsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsOp {
    LatestCommit,
    Status,
    Ancestry,
    Branch,
    Remote,
    Checkout,
    Fetch,
    Pull,
    Discard,
    Submodule,
}

impl fmt::Display for VcsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LatestCommit => "latest-commit",
            Self::Status => "status",
            Self::Ancestry => "ancestry",
            Self::Branch => "branch",
            Self::Remote => "remote",
            Self::Checkout => "checkout",
            Self::Fetch => "fetch",
            Self::Pull => "pull",
            Self::Discard => "discard",
            Self::Submodule => "submodule",
        };
        f.write_str(s)
    }
}

/// Errors from version-control operations on a checkout.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The path does not exist or is not a git checkout.
    #[error("not a git checkout: '{0}'")]
    NotACheckout(String),

    /// A git operation failed.
    #[error("git {op} failed at '{path}': {detail}")]
    OperationFailed {
        op: VcsOp,
        path: String,
        detail: String,
    },
}

impl VcsError {
    pub fn failed(op: VcsOp, path: &std::path::Path, detail: impl ToString) -> Self {
        Self::OperationFailed {
            op,
            path: path.display().to_string(),
            detail: detail.to_string(),
        }
    }

    /// The operation category, if this error came from a failed operation.
    pub fn op(&self) -> Option<VcsOp> {
        match self {
            Self::NotACheckout(_) => None,
            Self::OperationFailed { op, .. } => Some(*op),
        }
    }
}

// ---------------------------------------------------------------------------
// Process errors
// ---------------------------------------------------------------------------

/// Errors from running an external program.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program was not found on `$PATH`.
    #[error("{0} binary not found")]
    BinaryNotFound(String),

    /// The program exited with a non-zero status.
    #[error("{program} exited with {exit_code}: {stderr}")]
    Failed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    /// Generic I/O wrapper.
    #[error("command I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Manifest errors
// ---------------------------------------------------------------------------

/// Errors from loading, validating, or saving a package manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: {0}")]
    NotFound(String),

    #[error("manifest parse error in '{path}': {detail}")]
    ParseError { path: String, detail: String },

    /// A required field is missing or blank.
    #[error("manifest '{path}' is missing the '{field}' field")]
    MissingField { path: String, field: String },

    #[error("dependency '{name}' has no url")]
    MissingUrl { name: String },

    #[error("invalid version '{version}': {detail}")]
    InvalidVersion { version: String, detail: String },

    #[error("manifest I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Remote errors
// ---------------------------------------------------------------------------

/// Errors from remote lookup and rewriting.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A remote that must exist (normally `origin`) is absent.
    #[error("the remote '{name}' is missing in '{path}'")]
    Missing { name: String, path: String },

    #[error("cannot parse remote url '{0}'")]
    InvalidUrl(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("configuration parse error: {0}")]
    ParseError(String),

    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    #[error("unrecognized package manager '{0}' (expected 'npm' or 'yarn')")]
    UnknownPackageManager(String),

    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Filesystem errors
// ---------------------------------------------------------------------------

/// Errors from copying, deleting, or locating files.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: String,
        to: String,
        source: std::io::Error,
    },

    #[error("failed to remove '{path}': {source}")]
    Remove {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("path not found: {0}")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Installer errors
// ---------------------------------------------------------------------------

/// Errors from the package-installer stage.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to install module '{module}': {source}")]
    Module {
        module: String,
        source: CommandError,
    },

    #[error("install path error: {0}")]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// Resolver errors
// ---------------------------------------------------------------------------

/// Errors from a dependency walk. Any of these aborts the whole walk.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolve git error: {0}")]
    Vcs(#[from] VcsError),

    #[error("resolve manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("resolve remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("resolve path error: {0}")]
    Path(#[from] PathError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display_messages() {
        let err = VcsError::failed(VcsOp::Pull, Path::new("/tmp/dep"), "no such remote");
        assert_eq!(
            err.to_string(),
            "git pull failed at '/tmp/dep': no such remote"
        );
        assert_eq!(err.op(), Some(VcsOp::Pull));

        let err = RemoteError::Missing {
            name: "origin".into(),
            path: "bpm_modules/dep".into(),
        };
        assert!(err.to_string().contains("'origin'"));

        let err = ConfigError::UnknownPackageManager("pnpm".into());
        assert!(err.to_string().contains("pnpm"));
    }
}
