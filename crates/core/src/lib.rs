//! bpm core library.
//!
//! Resolves a tree of dependencies where every dependency is a nested git
//! checkout (a submodule): configuration, manifests, the version-control
//! adapter, remote rewriting, local-override synchronization, the recursive
//! resolver and the package-installer stage.

pub mod cache;
pub mod config;
pub mod dependency;
pub mod errors;
pub mod fs_util;
pub mod installer;
pub mod manifest;
pub mod overlay;
pub mod remote;
pub mod resolver;
pub mod runner;
pub mod vcs;

// Re-exports for convenience.
pub use cache::{ModuleCache, ModuleCacheItem};
pub use config::BpmConfig;
pub use dependency::{DependencyNode, Source};
pub use manifest::{JsonManifestStore, Manifest, ManifestStore};
pub use resolver::{Resolver, ResolverOptions};
pub use vcs::{GitCli, VersionControl};
