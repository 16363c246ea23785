//! Per-invocation memo of resolved dependencies.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What one walk learned about a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCacheItem {
    pub name: String,
    pub checkout_path: PathBuf,
    pub commit: Option<String>,
    /// Declared semantic version (Install walks only).
    pub version: Option<String>,
    /// Uncommitted work from a local override was copied into the checkout.
    #[serde(default)]
    pub local_changes: bool,
}

impl ModuleCacheItem {
    pub fn with_commit(name: impl Into<String>, checkout_path: impl Into<PathBuf>, commit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checkout_path: checkout_path.into(),
            commit: Some(commit.into()),
            version: None,
            local_changes: false,
        }
    }

    pub fn with_version(
        name: impl Into<String>,
        checkout_path: impl Into<PathBuf>,
        version: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            checkout_path: checkout_path.into(),
            commit: None,
            version,
            local_changes: false,
        }
    }

    pub fn with_local_changes(mut self, local_changes: bool) -> Self {
        self.local_changes = local_changes;
        self
    }
}

/// Name → [`ModuleCacheItem`] map, scoped to one command invocation.
///
/// Ordered by name so the installer stage is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ModuleCache {
    items: BTreeMap<String, ModuleCacheItem>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `item.name`.
    pub fn add(&mut self, item: ModuleCacheItem) {
        self.items.insert(item.name.clone(), item);
    }

    pub fn get(&self, name: &str) -> Option<&ModuleCacheItem> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ModuleCacheItem> {
        self.items.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleCacheItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
