//! # Page-Read Transaction
//!
//! `PageReadTrx` materialises records as they existed at one revision. It is
//! bound to a revision root at construction and never observes later writes:
//! every lookup resolves against that root, giving lock-free snapshot
//! consistency. The transaction is single-threaded; only the injected buffer
//! manager is shared with other transactions.
//!
//! ## Lookup Pipeline
//!
//! ```text
//! record key
//!   └─> page key (record key >> NDP_NODE_COUNT_EXPONENT)
//!        └─> per-transaction container cache  (hit? done)
//!             └─> record-page log overlay      (writer shadow? done)
//!                  └─> indirect-tree descent to the leaf reference
//!                       └─> buffer-manager record-page cache (hit? done)
//!                            └─> fragment walk + versioning-policy fusion
//! record
//!   └─> deleted-sentinel filter
//! ```
//!
//! ## Dereferencing Precedence
//!
//! Any page fetched by reference resolves in this order:
//!
//! 1. a present writer's in-memory page log, by the reference's log key;
//! 2. the page already materialised on the reference;
//! 3. the per-transaction page cache, which itself prefers the on-disk page
//!    log overlay over the storage reader;
//! 4. null, when the reference carries neither a persistent nor a log key.
//!
//! ## Log-Key Stamping
//!
//! The descent stamps a log key onto every traversed reference that lacks
//! one, whether or not any log is active: a writer opened later reuses the
//! stamped keys to address the same trie nodes in its own log.

use std::cell::RefCell;
use std::sync::Arc;

use eyre::{bail, ensure, eyre, Result};
use hashbrown::HashMap;

use crate::cache::{
    BufferManager, RecordPageCache, RecordPageContainer, TransactionLogPageCache,
    TransactionRecordPageLog, WriterPageLog,
};
use crate::config::{
    ResourceConfig, INP_REFERENCE_COUNT, NDP_NODE_COUNT, NDP_NODE_COUNT_EXPONENT, NULL_ID,
    NULL_NODE_KEY, TRX_LOG_NODE_SUFFIX, TRX_LOG_PAGE_SUFFIX,
};
use crate::index::IndexController;
use crate::io::Reader;
use crate::page::{
    CacheKey, IndexLogKey, IndirectPageLogKey, NamePage, NodeKind, Page, PageKind, PageReference,
    Record, RevisionRootPage,
};
use crate::versioning::Fragments;

/// Read-only transaction over one revision of a resource.
pub struct PageReadTrx {
    config: Arc<ResourceConfig>,
    reader: Box<dyn Reader>,
    uber_page: Arc<Page>,
    root_page: Option<Arc<Page>>,
    name_page: Option<Arc<Page>>,
    writer_log: Option<Arc<WriterPageLog>>,
    page_log: Option<TransactionLogPageCache>,
    node_log: Option<TransactionRecordPageLog>,
    index_controller: IndexController,
    record_page_cache: RefCell<RecordPageCache>,
    page_cache: RefCell<HashMap<CacheKey, Arc<Page>>>,
    buffer_manager: Arc<BufferManager>,
    closed: bool,
}

impl std::fmt::Debug for PageReadTrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReadTrx").finish_non_exhaustive()
    }
}

impl PageReadTrx {
    /// Binds a new transaction to `revision`.
    ///
    /// Construction order: validate the revision, load index definitions if
    /// none were supplied, detect the commit file (its presence opens both
    /// transaction-log overlays), locate the revision root through the uber
    /// page's indirect trie, and cache the revision's name page.
    pub(crate) fn new(
        config: Arc<ResourceConfig>,
        uber_page: Arc<Page>,
        revision: u32,
        reader: Box<dyn Reader>,
        writer_log: Option<Arc<WriterPageLog>>,
        index_controller: Option<IndexController>,
        buffer_manager: Arc<BufferManager>,
    ) -> Result<Self> {
        let revision_count = uber_page.as_uber()?.revision_count();
        ensure!(
            revision < revision_count,
            "revision {} does not exist, last stored revision is {}",
            revision,
            revision_count.saturating_sub(1)
        );

        let index_controller = match index_controller {
            Some(controller) => controller,
            None => IndexController::load(&config, revision)?,
        };

        // Transaction logs which might have to be read because the data has
        // not been merged into the data file yet.
        let logs_present = config.commit_file().exists();
        let page_log = if logs_present {
            Some(TransactionLogPageCache::open(
                config.trx_log_file(TRX_LOG_PAGE_SUFFIX),
            )?)
        } else {
            None
        };
        let node_log = if logs_present {
            Some(TransactionRecordPageLog::open(
                config.trx_log_file(TRX_LOG_NODE_SUFFIX),
            )?)
        } else {
            None
        };

        let mut trx = Self {
            config,
            reader,
            uber_page,
            root_page: None,
            name_page: None,
            writer_log,
            page_log,
            node_log,
            index_controller,
            record_page_cache: RefCell::new(RecordPageCache::new()),
            page_cache: RefCell::new(HashMap::new()),
            buffer_manager,
            closed: false,
        };

        let root_page = trx.load_revision_root(revision)?;
        trx.root_page = Some(root_page);

        let name_reference = trx.revision_root()?.name_page_reference().clone();
        let name_page = trx.get_page(&name_reference, PageKind::NamePage)?;
        name_page.as_name()?;
        trx.name_page = Some(name_page);

        Ok(trx)
    }

    fn assert_not_closed(&self) -> Result<()> {
        ensure!(!self.closed, "transaction is already closed");
        Ok(())
    }

    /// The record stored under `node_key` in the subtree of `page_kind` /
    /// `index`, as of the bound revision. A deleted sentinel is reported as
    /// absent.
    pub fn record(
        &self,
        node_key: u64,
        page_kind: PageKind,
        index: i32,
    ) -> Result<Option<Record>> {
        self.assert_not_closed()?;

        if node_key == NULL_NODE_KEY {
            return Ok(None);
        }

        match page_kind {
            PageKind::RecordPage
            | PageKind::PathSummaryPage
            | PageKind::PathPage
            | PageKind::CasPage
            | PageKind::NamePage => {}
            other => bail!("unsupported page kind {:?} for record lookup", other),
        }

        let record_page_key = self.page_key(node_key)?;
        let container =
            self.cached_record_page_container(IndexLogKey::new(page_kind, record_page_key, index))?;

        let Some(complete) = container.complete() else {
            return Ok(None);
        };
        Ok(complete
            .value(node_key)
            .filter(|record| !record.is_deleted())
            .cloned())
    }

    /// Logical page key of `record_key`.
    pub fn page_key(&self, record_key: u64) -> Result<u64> {
        self.assert_not_closed()?;
        Ok(record_key >> NDP_NODE_COUNT_EXPONENT)
    }

    /// Container of the leaf record page `record_page_key` in the subtree of
    /// `page_kind` / `index`, reconstructed from its fragments. The empty
    /// container means the leaf does not exist in this revision.
    pub fn record_page_container(
        &self,
        record_page_key: u64,
        index: i32,
        page_kind: PageKind,
    ) -> Result<RecordPageContainer> {
        self.assert_not_closed()?;

        let Some(reference) = self.leaf_page_reference(record_page_key, index, page_kind)? else {
            return Ok(RecordPageContainer::empty());
        };

        if let Some(cache_key) = reference.cache_key() {
            if let Some(container) = self.buffer_manager.get_record_page(&cache_key) {
                return Ok(container);
            }
        }

        let fragments = self.snapshot_pages(&reference)?;
        if fragments.is_empty() {
            return Ok(RecordPageContainer::empty());
        }

        let complete = self
            .config
            .revision_kind()
            .combine_record_pages(fragments, self.config.revisions_to_restore())?;
        let container = RecordPageContainer::new(complete);

        // Never intern state into the shared caches while a writer is
        // around: its log may shadow this very page.
        if self.writer_log.is_none() {
            if let Some(cache_key) = reference.cache_key() {
                self.buffer_manager
                    .put_record_page(cache_key, container.clone());
            }
        }

        Ok(container)
    }

    /// Per-transaction container cache in front of
    /// [`Self::record_page_container`], loading through the record-page log
    /// overlay first.
    fn cached_record_page_container(&self, key: IndexLogKey) -> Result<RecordPageContainer> {
        if let Some(container) = self.record_page_cache.borrow_mut().get(&key) {
            return Ok(container);
        }

        let shadow = self
            .node_log
            .as_ref()
            .map(|log| log.get(&key))
            .unwrap_or_default();
        let container = if shadow.is_empty() {
            self.record_page_container(key.record_page_key, key.index, key.page_kind)?
        } else {
            shadow
        };

        self.record_page_cache
            .borrow_mut()
            .put(key, container.clone());
        Ok(container)
    }

    /// Resolves the leaf reference of `record_page_key` by descending the
    /// indirect trie of `page_kind`.
    fn leaf_page_reference(
        &self,
        record_page_key: u64,
        index: i32,
        page_kind: PageKind,
    ) -> Result<Option<PageReference>> {
        let start = self.tree_start_reference(page_kind, index)?;
        self.navigate(&start, record_page_key, index, page_kind)
    }

    /// Selects the reference the descent starts at: the revision root's
    /// record trie, or the per-slot subtree of the respective named page.
    fn tree_start_reference(&self, page_kind: PageKind, index: i32) -> Result<PageReference> {
        let root_page = self.actual_revision_root_page()?;
        let root = root_page.as_revision_root()?;
        let reference = match page_kind {
            PageKind::RecordPage => root.indirect_page_reference().clone(),
            PageKind::CasPage => {
                let page = self.cas_page(root)?;
                let cas = page.as_cas()?;
                cas.indirect_reference(index)
                    .ok_or_else(|| eyre!("no CAS index at slot {}", index))?
                    .clone()
            }
            PageKind::PathPage => {
                let page = self.path_page(root)?;
                let path = page.as_path()?;
                path.indirect_reference(index)
                    .ok_or_else(|| eyre!("no path index at slot {}", index))?
                    .clone()
            }
            PageKind::NamePage => {
                let page = self.name_page(root)?;
                let name = page.as_name()?;
                name.indirect_reference(index)
                    .ok_or_else(|| eyre!("no name index at slot {}", index))?
                    .clone()
            }
            PageKind::PathSummaryPage => {
                let page = self.path_summary_page(root)?;
                let path_summary = page.as_path_summary()?;
                path_summary
                    .indirect_reference(index)
                    .ok_or_else(|| eyre!("no path summary at slot {}", index))?
                    .clone()
            }
            PageKind::UberPage => {
                bail!("unsupported page kind {:?} for leaf lookup", page_kind)
            }
        };
        Ok(reference)
    }

    /// Public form of the indirect-tree descent.
    pub fn page_reference_for_page(
        &self,
        start_reference: &PageReference,
        key: u64,
        index: i32,
        page_kind: PageKind,
    ) -> Result<Option<PageReference>> {
        self.assert_not_closed()?;
        self.navigate(start_reference, key, index, page_kind)
    }

    fn navigate(
        &self,
        start_reference: &PageReference,
        key: u64,
        index: i32,
        page_kind: PageKind,
    ) -> Result<Option<PageReference>> {
        let exps = self.uber_page.as_uber()?.page_count_exp(page_kind);

        let mut reference = start_reference.clone();
        let mut level_key = key;
        let mut offset: u64 = 0;
        let mut parent_offset: u64 = 0;

        for (level, &exp) in exps.iter().enumerate() {
            offset = level_key >> exp;
            level_key -= offset << exp;

            // Stamp unconditionally: a writer opened later reuses the key.
            if reference.log_key().is_none() {
                reference.set_log_key(IndirectPageLogKey::new(
                    page_kind,
                    index,
                    level as i32,
                    parent_offset * INP_REFERENCE_COUNT as u64 + offset,
                ));
            }

            let Some(page) = self.dereference_indirect_page(&reference)? else {
                return Ok(None);
            };
            let indirect = page.as_indirect()?;
            let Some(child) = indirect.reference(offset) else {
                bail!("key isn't supported, it's too big");
            };
            reference = child.clone();
            parent_offset = offset;
        }

        if reference.log_key().is_none() {
            reference.set_log_key(IndirectPageLogKey::new(
                page_kind,
                index,
                exps.len() as i32,
                parent_offset * INP_REFERENCE_COUNT as u64 + offset,
            ));
        }
        Ok(Some(reference))
    }

    /// Dereferences one indirect-page reference, honoring the precedence
    /// rules in the module documentation. `None` when the reference leads
    /// nowhere: neither shadowed by a log nor persisted.
    fn dereference_indirect_page(&self, reference: &PageReference) -> Result<Option<Arc<Page>>> {
        let mut page = None;

        if let Some(writer) = &self.writer_log {
            if let Some(log_key) = reference.log_key() {
                page = writer.get(&log_key);
            }
        }
        if page.is_none() {
            page = reference.page();
        }
        if page.is_none() {
            page = self.load_page_cached(reference)?;
        }

        Ok(page)
    }

    /// Per-transaction page cache. The loader prefers the page log overlay,
    /// then the reference's own page, then the storage reader; a freshly
    /// read page is interned into the buffer manager and attached to its
    /// reference when no writer is present. `None` when the reference has
    /// no persistent page and no log answers for it.
    fn load_page_cached(&self, reference: &PageReference) -> Result<Option<Arc<Page>>> {
        let Some(cache_key) = reference.cache_key() else {
            return Ok(None);
        };

        if let Some(page) = self.page_cache.borrow().get(&cache_key) {
            return Ok(Some(Arc::clone(page)));
        }

        let preloaded = match &self.page_log {
            Some(log) => reference.log_key().and_then(|log_key| log.get(&log_key)),
            None => reference.page(),
        };
        let page = match preloaded {
            Some(page) => page,
            None => {
                if reference.key() == NULL_ID {
                    return Ok(None);
                }
                let page = Arc::new(self.reader.read(reference.key())?);
                if self.writer_log.is_none() {
                    self.buffer_manager.put_page(cache_key, Arc::clone(&page));
                    reference.set_page(Arc::clone(&page));
                }
                page
            }
        };

        self.page_cache
            .borrow_mut()
            .insert(cache_key, Arc::clone(&page));
        Ok(Some(page))
    }

    /// Collects the page fragments contributing to the leaf at `reference`,
    /// newest first: the supplied reference, then the `previous_reference`
    /// chain, bounded by the versioning policy's revision list. Stops early
    /// at a saturated fragment: older revisions cannot contribute records a
    /// full page does not already hold.
    fn snapshot_pages(&self, reference: &PageReference) -> Result<Fragments> {
        let revision = self.revision_root()?.revision();
        let revisions_to_read = self
            .config
            .revision_kind()
            .revision_roots(revision, self.config.revisions_to_restore());

        let mut fragments = Fragments::new();
        let mut current = Some(reference.clone());

        for _ in revisions_to_read {
            let Some(fragment_reference) = current.clone() else {
                break;
            };
            if fragment_reference.key() == NULL_ID {
                // Nothing persisted for this revision; the chain cannot
                // resume, the loop just runs out of revisions.
                continue;
            }

            let page = self.reader.read(fragment_reference.key())?;
            let fragment = page.into_key_value()?;
            let saturated = fragment.size() == NDP_NODE_COUNT;
            current = fragment.previous_reference().cloned();
            fragments.push(fragment);

            if saturated {
                break;
            }
        }

        Ok(fragments)
    }

    /// Locates the revision root by navigating the uber page's indirect
    /// trie. A present writer's in-memory log is consulted first, by the
    /// log key stamped during the descent.
    fn load_revision_root(&self, revision: u32) -> Result<Arc<Page>> {
        let uber = self.uber_page.as_uber()?;
        let reference = self
            .navigate(
                uber.indirect_page_reference(),
                u64::from(revision),
                -1,
                PageKind::UberPage,
            )?
            .ok_or_else(|| eyre!("failed to locate revision root page of revision {}", revision))?;

        let mut page = None;
        if let Some(writer) = &self.writer_log {
            if let Some(log_key) = reference.log_key() {
                page = writer.get(&log_key);
            }
        }
        let page = match page {
            Some(page) => page,
            None => {
                debug_assert!(reference.is_set());
                self.load_page_cached(&reference)?.ok_or_else(|| {
                    eyre!("revision root page of revision {} is not persisted", revision)
                })?
            }
        };
        page.as_revision_root()?;
        Ok(page)
    }

    fn revision_root(&self) -> Result<&RevisionRootPage> {
        let Some(page) = &self.root_page else {
            bail!("revision root page is not loaded");
        };
        page.as_revision_root()
    }

    fn cached_name_page(&self) -> Result<&NamePage> {
        let Some(page) = &self.name_page else {
            bail!("name page is not loaded");
        };
        page.as_name()
    }

    /// Resolves the name for `name_key` from the bound revision's name page.
    pub fn name(&self, name_key: u32, node_kind: NodeKind) -> Result<Option<&str>> {
        self.assert_not_closed()?;
        Ok(self.cached_name_page()?.name(name_key, node_kind))
    }

    /// Raw UTF-8 bytes of the name for `name_key`.
    pub fn raw_name(&self, name_key: u32, node_kind: NodeKind) -> Result<Option<&[u8]>> {
        self.assert_not_closed()?;
        Ok(self.cached_name_page()?.raw_name(name_key, node_kind))
    }

    /// Number of nodes referencing the name under `name_key`.
    pub fn name_count(&self, name_key: u32, node_kind: NodeKind) -> Result<u32> {
        self.assert_not_closed()?;
        Ok(self.cached_name_page()?.count(name_key, node_kind))
    }

    /// Materialises the name page of `revision_root`. The eagerly cached
    /// name page of the bound revision stays authoritative for name lookups.
    pub fn name_page(&self, revision_root: &RevisionRootPage) -> Result<Arc<Page>> {
        self.assert_not_closed()?;
        self.get_page(revision_root.name_page_reference(), PageKind::NamePage)
    }

    /// Materialises the path page of `revision_root`.
    pub fn path_page(&self, revision_root: &RevisionRootPage) -> Result<Arc<Page>> {
        self.assert_not_closed()?;
        self.get_page(revision_root.path_page_reference(), PageKind::PathPage)
    }

    /// Materialises the CAS page of `revision_root`.
    pub fn cas_page(&self, revision_root: &RevisionRootPage) -> Result<Arc<Page>> {
        self.assert_not_closed()?;
        self.get_page(revision_root.cas_page_reference(), PageKind::CasPage)
    }

    /// Materialises the path summary page of `revision_root`.
    pub fn path_summary_page(&self, revision_root: &RevisionRootPage) -> Result<Arc<Page>> {
        self.assert_not_closed()?;
        self.get_page(
            revision_root.path_summary_page_reference(),
            PageKind::PathSummaryPage,
        )
    }

    /// Fetches the page behind `reference` through the per-transaction page
    /// cache, stamping the named-page log key when any log is active.
    fn get_page(&self, reference: &PageReference, page_kind: PageKind) -> Result<Arc<Page>> {
        let page = reference.page();

        if self.writer_log.is_some() || self.page_log.is_some() {
            reference.set_log_key(IndirectPageLogKey::new(page_kind, -1, -1, 0));
        }

        let page = match page {
            Some(page) => page,
            None => {
                let page = self.load_page_cached(reference)?.ok_or_else(|| {
                    eyre!("failed to materialise page: reference has no persistent page")
                })?;
                reference.set_page(Arc::clone(&page));
                page
            }
        };
        Ok(page)
    }

    pub fn uber_page(&self) -> Result<&Arc<Page>> {
        self.assert_not_closed()?;
        Ok(&self.uber_page)
    }

    pub fn actual_revision_root_page(&self) -> Result<Arc<Page>> {
        self.assert_not_closed()?;
        let Some(page) = &self.root_page else {
            bail!("revision root page is not loaded");
        };
        Ok(Arc::clone(page))
    }

    /// The revision this transaction is bound to.
    pub fn revision_number(&self) -> Result<u32> {
        self.assert_not_closed()?;
        Ok(self.revision_root()?.revision())
    }

    pub fn reader(&self) -> &dyn Reader {
        self.reader.as_ref()
    }

    pub fn index_controller(&self) -> &IndexController {
        &self.index_controller
    }

    /// Invalidates both per-transaction caches and the log overlays' cached
    /// entries.
    pub fn clear_caches(&mut self) -> Result<()> {
        self.assert_not_closed()?;
        self.record_page_cache.borrow_mut().clear();
        self.page_cache.borrow_mut().clear();
        if let Some(log) = &mut self.node_log {
            log.clear();
        }
        if let Some(log) = &mut self.page_log {
            log.clear();
        }
        Ok(())
    }

    /// Releases the log overlays' file handles.
    pub fn close_caches(&mut self) -> Result<()> {
        self.assert_not_closed()?;
        if let Some(log) = &mut self.node_log {
            log.close();
        }
        if let Some(log) = &mut self.page_log {
            log.close();
        }
        Ok(())
    }

    /// Tears down the per-transaction caches and log handles and closes the
    /// reader. Idempotent: a second close is a no-op. The buffer manager is
    /// left untouched.
    pub fn close(&mut self) -> Result<()> {
        if !self.closed {
            if let Some(log) = &mut self.node_log {
                log.close();
            }
            if let Some(log) = &mut self.page_log {
                log.close();
            }
            self.record_page_cache.borrow_mut().clear();
            self.page_cache.borrow_mut().clear();
            self.reader.close()?;
            self.closed = true;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for PageReadTrx {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
