//! Preview cache shared between mailbox, board and search

use log::{debug, warn};
use std::sync::{Arc, PoisonError, RwLock};

use super::{PREVIEWS_KEY, PreviewCache};
use crate::session::PreviewSink;
use crate::storage::{self, LocalStore};

/// `PreviewCache` behind a lock, written through to the local store
///
/// Every `update` persists the snapshot. Network calls must not be made
/// while inside `read` or `update`.
pub struct SharedCache {
    state: RwLock<PreviewCache>,
    store: Arc<dyn LocalStore>,
}

impl SharedCache {
    /// Restore the persisted cache, or start empty
    ///
    /// A corrupt snapshot is discarded (see `storage::load_json`).
    pub fn restore(store: Arc<dyn LocalStore>) -> Self {
        let cache = storage::load_json::<PreviewCache>(store.as_ref(), PREVIEWS_KEY)
            .unwrap_or_default();
        debug!("Restored preview cache with {} folders", cache.folder_keys().count());
        Self {
            state: RwLock::new(cache),
            store,
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&PreviewCache) -> R) -> R {
        let cache = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&cache)
    }

    /// Mutate the cache and persist the result
    pub fn update<R>(&self, f: impl FnOnce(&mut PreviewCache) -> R) -> R {
        let mut cache = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut cache);
        self.persist(&cache);
        result
    }

    /// Copy of the whole cache
    pub fn snapshot(&self) -> PreviewCache {
        self.read(PreviewCache::clone)
    }

    /// Drop everything, in memory and on disk
    pub fn clear(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = PreviewCache::new();
        if let Err(e) = self.store.remove(PREVIEWS_KEY) {
            warn!("Failed to remove persisted previews: {}", e);
        }
    }

    fn persist(&self, cache: &PreviewCache) {
        if let Err(e) = storage::save_json(self.store.as_ref(), PREVIEWS_KEY, cache) {
            warn!("Failed to persist preview cache: {:#}", e);
        }
    }
}

impl PreviewSink for SharedCache {
    fn purge(&self) {
        debug!("Purging preview cache");
        self.clear();
    }
}
