//! Named, swappable index snapshots.
//!
//! Readers clone an `Arc<VectorIndex>` and search it without holding the
//! lock; a rebuild installs a new snapshot with a single write. A search in
//! flight during a rebuild therefore completes against the snapshot it
//! started with.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use attest_core::AttestError;
use tracing::info;

use crate::index::VectorIndex;
use crate::store::IndexStore;

/// In-memory cache of loaded indexes, backed by an [`IndexStore`].
///
/// # Examples
///
/// ```
/// use attest_retrieval::index::VectorIndex;
/// use attest_retrieval::registry::IndexRegistry;
/// use attest_retrieval::store::IndexStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let registry = IndexRegistry::new(IndexStore::new(dir.path()));
/// assert!(registry.get_or_load("default").is_err());
///
/// registry.install("default", VectorIndex::new(4));
/// assert_eq!(registry.get_or_load("default").unwrap().stats().dimension, 4);
/// ```
#[derive(Debug)]
pub struct IndexRegistry {
    store: IndexStore,
    loaded: RwLock<HashMap<String, Arc<VectorIndex>>>,
}

impl IndexRegistry {
    /// Create an empty registry over `store`.
    pub fn new(store: IndexStore) -> Self {
        Self {
            store,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// The current snapshot for `name`, if one is loaded.
    pub fn get(&self, name: &str) -> Option<Arc<VectorIndex>> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// The loaded snapshot for `name`, loading it from disk on first use.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::IndexNotFound`] if `name` has never been built
    /// or saved, and [`AttestError::Storage`] if the artifact is unreadable.
    pub fn get_or_load(&self, name: &str) -> Result<Arc<VectorIndex>, AttestError> {
        if let Some(index) = self.get(name) {
            return Ok(index);
        }
        self.reload(name)
    }

    /// Re-read `name` from disk and install it, replacing any cached snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`get_or_load`](Self::get_or_load).
    pub fn reload(&self, name: &str) -> Result<Arc<VectorIndex>, AttestError> {
        match self.store.load(name)? {
            Some(index) => Ok(self.install(name, index)),
            None => Err(AttestError::IndexNotFound(name.to_string())),
        }
    }

    /// Make `index` the current snapshot for `name`.
    pub fn install(&self, name: &str, index: VectorIndex) -> Arc<VectorIndex> {
        let snapshot = Arc::new(index);
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&snapshot));
        info!(store = name, entries = snapshot.len(), "installed index snapshot");
        snapshot
    }

    /// Drop the cached snapshot for `name`. The on-disk artifact is untouched.
    pub fn evict(&self, name: &str) {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}
