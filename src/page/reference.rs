//! # Page References and Log Keys
//!
//! A `PageReference` is the edge of the page graph: it names a page either by
//! its stable offset in the data file (the persistent key), by its position
//! in a writer's uncommitted log (the log key), or by an already materialised
//! in-memory page. Every reachable reference carries at least one of the two
//! keys.
//!
//! References live inside pages that are shared across transactions through
//! the resource buffer manager, so the mutable slots (log key, materialised
//! page) use interior mutability. Cloning a reference clones the *handle*:
//! all clones observe the same log key and page attachment, which is what the
//! indirect-tree navigator relies on when it stamps log keys onto references
//! owned by cached pages.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::NULL_ID;
use crate::page::{Page, PageKind};

/// Identifies an indirect-tree node independently of whether it has been
/// persisted: `(page kind, index, level, position)` with
/// `position = parent offset * INP_REFERENCE_COUNT + child offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndirectPageLogKey {
    pub page_kind: PageKind,
    pub index: i32,
    pub level: i32,
    pub position: u64,
}

impl IndirectPageLogKey {
    pub fn new(page_kind: PageKind, index: i32, level: i32, position: u64) -> Self {
        Self {
            page_kind,
            index,
            level,
            position,
        }
    }
}

/// Key space of record-page containers: `(page kind, record page key, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexLogKey {
    pub page_kind: PageKind,
    pub record_page_key: u64,
    pub index: i32,
}

impl IndexLogKey {
    pub fn new(page_kind: PageKind, record_page_key: u64, index: i32) -> Self {
        Self {
            page_kind,
            record_page_key,
            index,
        }
    }
}

/// Identity a cache uses for a reference: the persistent key when the page
/// has been written to the data file, the log key otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Persistent(u64),
    Log(IndirectPageLogKey),
}

#[derive(Debug)]
struct ReferenceInner {
    key: u64,
    log_key: Mutex<Option<IndirectPageLogKey>>,
    page: RwLock<Option<Arc<Page>>>,
}

/// Shared handle to one edge of the page graph.
#[derive(Debug, Clone)]
pub struct PageReference {
    inner: Arc<ReferenceInner>,
}

impl PageReference {
    /// A reference to the page persisted at `key` in the data file.
    pub fn new(key: u64) -> Self {
        Self {
            inner: Arc::new(ReferenceInner {
                key,
                log_key: Mutex::new(None),
                page: RwLock::new(None),
            }),
        }
    }

    /// A reference with no persistent page yet.
    pub fn empty() -> Self {
        Self::new(NULL_ID)
    }

    /// Stable offset in the data file, or `NULL_ID` if never persisted.
    pub fn key(&self) -> u64 {
        self.inner.key
    }

    pub fn log_key(&self) -> Option<IndirectPageLogKey> {
        *self.inner.log_key.lock()
    }

    pub fn set_log_key(&self, log_key: IndirectPageLogKey) {
        *self.inner.log_key.lock() = Some(log_key);
    }

    /// The materialised page attached to this reference, if any.
    pub fn page(&self) -> Option<Arc<Page>> {
        self.inner.page.read().clone()
    }

    pub fn set_page(&self, page: Arc<Page>) {
        *self.inner.page.write() = Some(page);
    }

    /// True if either the persistent key or the log key is set.
    pub fn is_set(&self) -> bool {
        self.inner.key != NULL_ID || self.log_key().is_some()
    }

    /// Cache identity: persistent key preferred, log key otherwise. `None`
    /// for an unreachable reference (both keys unset).
    pub fn cache_key(&self) -> Option<CacheKey> {
        if self.inner.key != NULL_ID {
            Some(CacheKey::Persistent(self.inner.key))
        } else {
            self.log_key().map(CacheKey::Log)
        }
    }

    /// True if both handles point at the same underlying reference.
    pub fn same_reference(&self, other: &PageReference) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
