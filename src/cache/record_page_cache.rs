//! # Per-Transaction Record-Page Cache
//!
//! Bounded cache of record-page containers owned by a single read
//! transaction. It absorbs repeated record lookups hitting the same logical
//! page, so it is keyed by `(page kind, page key, index)` rather than by
//! reference identity.
//!
//! Entries expire after a fixed time since insertion *and* a fixed idle
//! time since the last access; expired entries are dropped lazily on lookup.
//! Capacity overflow evicts least-recently-used entries. The cache is never
//! shared across threads; the owning transaction is single-threaded.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::config::{TRX_RECORD_PAGE_CACHE_CAPACITY, TRX_RECORD_PAGE_CACHE_TTL_SECS};
use crate::page::IndexLogKey;

use super::RecordPageContainer;

struct Slot {
    container: RecordPageContainer,
    inserted: Instant,
    last_access: Instant,
}

pub struct RecordPageCache {
    entries: LruCache<IndexLogKey, Slot>,
    ttl: Duration,
}

impl RecordPageCache {
    pub fn new() -> Self {
        Self::with_limits(
            TRX_RECORD_PAGE_CACHE_CAPACITY,
            Duration::from_secs(TRX_RECORD_PAGE_CACHE_TTL_SECS),
        )
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            ttl,
        }
    }

    pub fn get(&mut self, key: &IndexLogKey) -> Option<RecordPageContainer> {
        let now = Instant::now();
        let expired = match self.entries.get_mut(key) {
            Some(slot) => {
                if now.duration_since(slot.inserted) > self.ttl
                    || now.duration_since(slot.last_access) > self.ttl
                {
                    true
                } else {
                    slot.last_access = now;
                    return Some(slot.container.clone());
                }
            }
            None => return None,
        };
        if expired {
            self.entries.pop(key);
        }
        None
    }

    pub fn put(&mut self, key: IndexLogKey, container: RecordPageContainer) {
        let now = Instant::now();
        self.entries.put(
            key,
            Slot {
                container,
                inserted: now,
                last_access: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for RecordPageCache {
    fn default() -> Self {
        Self::new()
    }
}
