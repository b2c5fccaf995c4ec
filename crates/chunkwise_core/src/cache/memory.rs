use dashmap::DashMap;

use super::{Cache, CacheEntry, ContentHash};

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<ContentHash, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, hash: &ContentHash) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.entries.get(hash).map(|entry| entry.value().clone()))
    }

    fn put(&self, hash: &ContentHash, entry: &CacheEntry) -> anyhow::Result<()> {
        // First writer wins; later writers carry an identical value.
        self.entries
            .entry(hash.clone())
            .or_insert_with(|| entry.clone());
        Ok(())
    }
}
