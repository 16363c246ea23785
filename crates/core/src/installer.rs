//! Hands the resolved modules to the downstream package manager.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::cache::ModuleCache;
use crate::config::{InstallConfig, PackageManager};
use crate::errors::{ConfigError, InstallError};
use crate::fs_util;
use crate::runner::CommandRunner;

/// Installs every module of a finished Install walk.
pub trait PackageInstaller {
    /// Returns the number of modules installed.
    fn install(&self, cache: &ModuleCache) -> Result<usize, InstallError>;
}

// ---------------------------------------------------------------------------
// npm
// ---------------------------------------------------------------------------

/// `npm install <module path>` from the root for each module.
pub struct DirectInstaller<'a> {
    runner: &'a dyn CommandRunner,
    root: PathBuf,
}

impl<'a> DirectInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            root: root.into(),
        }
    }
}

impl PackageInstaller for DirectInstaller<'_> {
    #[instrument(skip_all, fields(root = %self.root.display()))]
    fn install(&self, cache: &ModuleCache) -> Result<usize, InstallError> {
        let mut installed = 0;
        for item in cache.iter() {
            let path = item.checkout_path.display().to_string();
            info!(module = %item.name, %path, "npm install");
            self.runner
                .run(&self.root, "npm", &["install", &path])
                .map_err(|source| InstallError::Module {
                    module: item.name.clone(),
                    source,
                })?;
            installed += 1;
        }
        Ok(installed)
    }
}

// ---------------------------------------------------------------------------
// yarn
// ---------------------------------------------------------------------------

/// Runs `yarn install` inside each module, then replaces
/// `<destination>/<name>` with a filtered copy of the module.
pub struct CopyThenInstaller<'a> {
    runner: &'a dyn CommandRunner,
    destination: PathBuf,
    exclude: Vec<String>,
}

impl<'a> CopyThenInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, destination: impl Into<PathBuf>, exclude: Vec<String>) -> Self {
        Self {
            runner,
            destination: destination.into(),
            exclude,
        }
    }
}

impl PackageInstaller for CopyThenInstaller<'_> {
    #[instrument(skip_all, fields(destination = %self.destination.display()))]
    fn install(&self, cache: &ModuleCache) -> Result<usize, InstallError> {
        let mut installed = 0;
        for item in cache.iter() {
            info!(module = %item.name, "yarn install");
            self.runner
                .run(&item.checkout_path, "yarn", &["install"])
                .map_err(|source| InstallError::Module {
                    module: item.name.clone(),
                    source,
                })?;

            let target = self.destination.join(&item.name);
            fs_util::remove_dir_all(&target)?;
            let files = fs_util::copy_dir(&item.checkout_path, &target, &self.exclude)?;
            info!(module = %item.name, files, target = %target.display(), "module copied");
            installed += 1;
        }
        Ok(installed)
    }
}

/// Build the installer selected by `config` for the package rooted at `root`.
pub fn installer_for<'a>(
    config: &InstallConfig,
    runner: &'a dyn CommandRunner,
    root: &Path,
) -> Result<Box<dyn PackageInstaller + 'a>, ConfigError> {
    Ok(match config.package_manager()? {
        PackageManager::Npm => Box::new(DirectInstaller::new(runner, root)),
        PackageManager::Yarn => Box::new(CopyThenInstaller::new(
            runner,
            root.join(&config.node_modules_dir),
            config.exclude.clone(),
        )),
    })
}
