//! Versioned LRU cache over positional node lookups.
//!
//! Keyed by query, guarded by the tree version (the root content hash).
//! A version mismatch clears the whole cache before the lookup proceeds:
//! any positional result may be wrong once the tree changed, so per-key
//! invalidation is not worth reasoning about. Pure performance layer -
//! correctness is identical with the cache disabled, because every hit is
//! still re-validated against the live tree by the caller.

use crate::hash::ContentHash;
use lru::LruCache;
use std::num::NonZeroUsize;

/// One positional query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Track(usize),
    Scene(usize),
    /// (track_index, scene_index)
    Slot(usize, usize),
    /// (track_index, device_ordinal)
    Device(usize, usize),
}

/// LRU of query -> node id, valid for exactly one tree version.
pub struct NodeCache {
    version: Option<ContentHash>,
    entries: LruCache<CacheKey, String>,
}

impl NodeCache {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            version: None,
            entries: LruCache::new(capacity),
        }
    }

    /// Look up a query against the given tree version. Clears everything
    /// first if the version moved since the last call.
    pub fn get(&mut self, key: &CacheKey, version: &ContentHash) -> Option<String> {
        if self.version.as_ref() != Some(version) {
            self.entries.clear();
            self.version = Some(version.clone());
            return None;
        }
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: CacheKey, id: String, version: &ContentHash) {
        if self.version.as_ref() != Some(version) {
            self.entries.clear();
            self.version = Some(version.clone());
        }
        self.entries.put(key, id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
