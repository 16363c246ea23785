//! Filesystem copy and delete helpers.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use glob_match::glob_match;
use tracing::debug;

use crate::errors::PathError;

/// Copy one file, creating the destination's parent directories.
pub fn copy_file(from: &Path, to: &Path) -> Result<(), PathError> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    fs::copy(from, to).map_err(|source| PathError::Copy {
        from: from.display().to_string(),
        to: to.display().to_string(),
        source,
    })?;
    Ok(())
}

pub fn create_dir_all(path: &Path) -> Result<(), PathError> {
    fs::create_dir_all(path).map_err(|source| PathError::CreateDir {
        path: path.display().to_string(),
        source,
    })
}

/// Remove a file. A file that is already gone is not an error.
pub fn remove_file(path: &Path) -> Result<bool, PathError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(PathError::Remove {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Remove a directory tree if it exists.
pub fn remove_dir_all(path: &Path) -> Result<(), PathError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PathError::Remove {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// `true` if `rel` or its file name matches one of the glob `patterns`.
pub fn is_excluded(rel: &str, patterns: &[String]) -> bool {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    patterns
        .iter()
        .any(|p| glob_match(p, rel) || glob_match(p, name))
}

/// Recursively copy `from` into `to`, skipping entries matching `exclude`.
/// Returns the number of files copied.
pub fn copy_dir(from: &Path, to: &Path, exclude: &[String]) -> Result<usize, PathError> {
    copy_dir_inner(from, to, "", exclude)
}

fn copy_dir_inner(from: &Path, to: &Path, prefix: &str, exclude: &[String]) -> Result<usize, PathError> {
    create_dir_all(to)?;
    let entries = fs::read_dir(from).map_err(|source| PathError::Copy {
        from: from.display().to_string(),
        to: to.display().to_string(),
        source,
    })?;

    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|source| PathError::Copy {
            from: from.display().to_string(),
            to: to.display().to_string(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        if is_excluded(&rel, exclude) {
            debug!(path = %rel, "excluded from copy");
            continue;
        }

        let src = entry.path();
        let dst = to.join(&name);
        if src.is_dir() {
            copied += copy_dir_inner(&src, &dst, &rel, exclude)?;
        } else {
            copy_file(&src, &dst)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "hello").unwrap();

        let dst = dir.path().join("out/nested/a.txt");
        copy_file(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst).unwrap(), "hello");
    }

    #[test]
    fn test_copy_dir_with_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join(".git/HEAD"), "ref").unwrap();
        fs::write(src.join("lib/index.js"), "js").unwrap();
        fs::write(src.join("debug.log"), "log").unwrap();
        fs::write(src.join("bpm.json"), "{}").unwrap();

        let dst = dir.path().join("dst");
        let copied = copy_dir(&src, &dst, &[".git".into(), "*.log".into()]).unwrap();

        assert_eq!(copied, 2);
        assert!(dst.join("lib/index.js").exists());
        assert!(dst.join("bpm.json").exists());
        assert!(!dst.join(".git").exists());
        assert!(!dst.join("debug.log").exists());
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_file(&dir.path().join("gone")).unwrap());
        remove_dir_all(&dir.path().join("gone-dir")).unwrap();
    }
}
