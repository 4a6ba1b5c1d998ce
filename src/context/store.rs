//! Decoded-resource store.

use std::sync::Arc;

use lru::LruCache;

use crate::device::ImageData;
use crate::options::CacheBudget;

/// Identifies a decoded resource within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Handler-chosen namespace, e.g. `"pdf-image"`
    pub namespace: &'static str,
    pub id: u64,
}

impl ResourceKey {
    pub fn new(namespace: &'static str, id: u64) -> Self {
        Self { namespace, id }
    }
}

/// LRU store of decoded images with a byte budget.
pub struct Store {
    budget: CacheBudget,
    used: usize,
    entries: LruCache<ResourceKey, Arc<ImageData>>,
}

impl Store {
    pub fn new(budget: CacheBudget) -> Self {
        Self {
            budget,
            used: 0,
            entries: LruCache::unbounded(),
        }
    }

    pub fn budget(&self) -> CacheBudget {
        self.budget
    }

    /// Look up an entry, marking it most recently used.
    pub fn get(&mut self, key: &ResourceKey) -> Option<Arc<ImageData>> {
        self.entries.get(key).cloned()
    }

    /// Insert an entry, evicting older ones to stay within the budget.
    ///
    /// Entries larger than the whole budget are not stored.
    pub fn insert(&mut self, key: ResourceKey, image: Arc<ImageData>) {
        let size = image.byte_size();
        if let Some(limit) = self.budget.limit() {
            if size > limit {
                log::trace!("store: {:?} ({} bytes) exceeds budget", key, size);
                return;
            }
        }

        if let Some(old) = self.entries.put(key, image) {
            self.used -= old.byte_size();
        }
        self.used += size;

        if let Some(limit) = self.budget.limit() {
            while self.used > limit {
                match self.entries.pop_lru() {
                    Some((evicted, data)) => {
                        log::trace!("store: evicted {:?}", evicted);
                        self.used -= data.byte_size();
                    }
                    None => break,
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes held by stored entries.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(bytes: usize) -> Arc<ImageData> {
        let pixels = (bytes / 4) as u32;
        Arc::new(ImageData::from_rgba(pixels, 1, vec![0; pixels as usize * 4]).unwrap())
    }

    #[test]
    fn test_unlimited_never_evicts() {
        let mut store = Store::new(CacheBudget::Unlimited);
        for i in 0..100 {
            store.insert(ResourceKey::new("t", i), image(400));
        }
        assert_eq!(store.len(), 100);
        assert_eq!(store.used_bytes(), 40_000);
    }

    #[test]
    fn test_budget_evicts_least_recently_used() {
        let mut store = Store::new(CacheBudget::Bytes(1000));
        store.insert(ResourceKey::new("t", 1), image(400));
        store.insert(ResourceKey::new("t", 2), image(400));
        // Touch 1 so that 2 is the eviction candidate.
        assert!(store.get(&ResourceKey::new("t", 1)).is_some());
        store.insert(ResourceKey::new("t", 3), image(400));

        assert_eq!(store.len(), 2);
        assert!(store.get(&ResourceKey::new("t", 2)).is_none());
        assert!(store.get(&ResourceKey::new("t", 1)).is_some());
        assert!(store.used_bytes() <= 1000);
    }

    #[test]
    fn test_oversized_entry_is_skipped() {
        let mut store = Store::new(CacheBudget::Bytes(100));
        store.insert(ResourceKey::new("t", 1), image(400));
        assert!(store.is_empty());
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn test_replacing_entry_keeps_accounting() {
        let mut store = Store::new(CacheBudget::Unlimited);
        store.insert(ResourceKey::new("t", 1), image(400));
        store.insert(ResourceKey::new("t", 1), image(800));
        assert_eq!(store.len(), 1);
        assert_eq!(store.used_bytes(), 800);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.used_bytes(), 0);
    }
}
