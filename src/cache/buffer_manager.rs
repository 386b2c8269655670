//! # Resource Buffer Manager
//!
//! Process-wide caches of reconstructed pages and record-page containers,
//! shared by every transaction on one resource. Two caches with distinct
//! key spaces:
//!
//! - page cache: `reference identity -> Arc<Page>`
//! - record-page cache: `reference identity -> RecordPageContainer`
//!
//! Both are sharded LRU maps behind per-shard locks so concurrent read
//! transactions do not contend on a single lock. The insertion policy lives
//! in the read transaction: entries are only interned when no write
//! transaction is present, so the shared caches never hold uncommitted
//! state. Eviction is plain LRU; the read path must (and does) tolerate
//! cache absence without semantic change.
//!
//! The buffer manager is resource-scoped, never global: it is injected at
//! transaction construction.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::{
    BUFFER_CACHE_SHARD_COUNT, BUFFER_PAGE_CACHE_CAPACITY, BUFFER_RECORD_PAGE_CACHE_CAPACITY,
};
use crate::page::{CacheKey, Page};

use super::RecordPageContainer;

struct ShardedLru<V> {
    shards: Vec<Mutex<LruCache<CacheKey, V>>>,
}

impl<V: Clone> ShardedLru<V> {
    fn new(total_capacity: usize) -> Self {
        let per_shard = (total_capacity / BUFFER_CACHE_SHARD_COUNT).max(1);
        let shards = (0..BUFFER_CACHE_SHARD_COUNT)
            .map(|_| {
                Mutex::new(LruCache::new(
                    NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN),
                ))
            })
            .collect();
        Self { shards }
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<LruCache<CacheKey, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn get(&self, key: &CacheKey) -> Option<V> {
        self.shard(key).lock().get(key).cloned()
    }

    fn put(&self, key: CacheKey, value: V) {
        self.shard(&key).lock().put(key, value);
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}

/// Shared caches of one resource.
pub struct BufferManager {
    pages: ShardedLru<Arc<Page>>,
    record_pages: ShardedLru<RecordPageContainer>,
}

impl BufferManager {
    pub fn new() -> Self {
        Self {
            pages: ShardedLru::new(BUFFER_PAGE_CACHE_CAPACITY),
            record_pages: ShardedLru::new(BUFFER_RECORD_PAGE_CACHE_CAPACITY),
        }
    }

    pub fn get_page(&self, key: &CacheKey) -> Option<Arc<Page>> {
        self.pages.get(key)
    }

    pub fn put_page(&self, key: CacheKey, page: Arc<Page>) {
        self.pages.put(key, page);
    }

    pub fn get_record_page(&self, key: &CacheKey) -> Option<RecordPageContainer> {
        self.record_pages.get(key)
    }

    pub fn put_record_page(&self, key: CacheKey, container: RecordPageContainer) {
        self.record_pages.put(key, container);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn record_page_count(&self) -> usize {
        self.record_pages.len()
    }

    pub fn clear(&self) {
        self.pages.clear();
        self.record_pages.clear();
    }
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}
