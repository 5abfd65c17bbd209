use std::collections::HashMap;

use super::entry::{CacheEntry, ComponentKey, UserHandle};

/// In-process tier. Unbounded; only cleared wholesale or per package.
pub trait MemoryCache: Send {
    fn get(&self, key: &ComponentKey) -> Option<CacheEntry>;
    fn put(&mut self, key: ComponentKey, entry: CacheEntry);
    fn remove(&mut self, key: &ComponentKey);
    fn remove_all_for_package(&mut self, package: &str, user: UserHandle);
    fn clear(&mut self);
    fn len(&self) -> usize;
}

#[derive(Default)]
pub struct MapCache {
    entries: HashMap<ComponentKey, CacheEntry>,
}

impl MemoryCache for MapCache {
    fn get(&self, key: &ComponentKey) -> Option<CacheEntry> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: ComponentKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &ComponentKey) {
        self.entries.remove(key);
    }

    fn remove_all_for_package(&mut self, package: &str, user: UserHandle) {
        self.entries
            .retain(|key, _| key.user != user || key.component.package() != package);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Used when memory caching is disabled: accepts everything, remembers nothing.
pub struct NoOpCache;

impl MemoryCache for NoOpCache {
    fn get(&self, _key: &ComponentKey) -> Option<CacheEntry> {
        None
    }

    fn put(&mut self, _key: ComponentKey, _entry: CacheEntry) {}

    fn remove(&mut self, _key: &ComponentKey) {}

    fn remove_all_for_package(&mut self, _package: &str, _user: UserHandle) {}

    fn clear(&mut self) {}

    fn len(&self) -> usize {
        0
    }
}

pub fn memory_cache(enabled: bool) -> Box<dyn MemoryCache> {
    if enabled {
        Box::new(MapCache::default())
    } else {
        Box::new(NoOpCache)
    }
}
