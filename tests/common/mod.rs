//! Shared fixture: builds multi-revision stores on disk the way a write
//! transaction lays them out, using only the crate's public API. Each commit
//! appends leaf fragments, rebuilds the indirect tries bottom-up, writes the
//! revision root and publishes a fresh uber page.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sediment::config::{
    ResourceConfig, INP_REFERENCE_COUNT, NDP_NODE_COUNT_EXPONENT, NULL_ID, TRX_LOG_NODE_SUFFIX,
    TRX_LOG_PAGE_SUFFIX,
};
use sediment::io::{FileReader, FileWriter, Reader};
use sediment::page::{
    CasPage, IndirectPage, KeyValuePage, NameEntry, NamePage, NodeKind, Page, PageBody, PageKind,
    PageReference, PathPage, PathSummaryPage, Record, RevisionRootPage, UberPage,
};
use sediment::{Resource, VersioningKind};

pub fn page_key(record_key: u64) -> u64 {
    record_key >> NDP_NODE_COUNT_EXPONENT
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Default)]
struct TreeState {
    /// Cumulative logical state, tombstones included.
    state: BTreeMap<u64, Record>,
    /// Changes accumulated since the last full dump (differential policy).
    diff_acc: BTreeMap<u64, Record>,
    /// Newest fragment offset per logical page.
    fragments: BTreeMap<u64, u64>,
    /// Last full-dump fragment offset per logical page.
    dump_fragments: BTreeMap<u64, u64>,
}

/// Builds a store revision by revision. Revision 0 is the empty bootstrap
/// written at creation; the first data commit is revision 1.
pub struct StoreBuilder {
    config: ResourceConfig,
    policy: VersioningKind,
    restore: u32,
    writer: FileWriter,
    next_revision: u32,
    trees: HashMap<(PageKind, i32), TreeState>,
    pending: HashMap<(PageKind, i32), BTreeMap<u64, Record>>,
    names: Vec<(NodeKind, u32, String, u32)>,
    root_offsets: BTreeMap<u64, u64>,
    max_node_key: u64,
}

impl StoreBuilder {
    pub fn create(dir: &Path, policy: VersioningKind, restore: u32) -> Self {
        std::fs::create_dir_all(dir).unwrap();
        let config = ResourceConfig::new(dir, policy, restore).unwrap();
        let writer = FileWriter::create(config.data_file()).unwrap();
        let mut builder = Self {
            config,
            policy,
            restore,
            writer,
            next_revision: 0,
            trees: HashMap::new(),
            pending: HashMap::new(),
            names: Vec::new(),
            root_offsets: BTreeMap::new(),
            max_node_key: 0,
        };
        builder.commit();
        builder
    }

    pub fn config(&self) -> ResourceConfig {
        self.config.clone()
    }

    pub fn open(&self) -> Resource {
        Resource::open(self.config.clone()).unwrap()
    }

    pub fn insert(&mut self, key: u64, value: &[u8]) {
        self.insert_into(PageKind::RecordPage, 0, key, value);
    }

    pub fn insert_into(&mut self, kind: PageKind, index: i32, key: u64, value: &[u8]) {
        if kind == PageKind::RecordPage {
            self.max_node_key = self.max_node_key.max(key);
        }
        self.pending
            .entry((kind, index))
            .or_default()
            .insert(key, Record::new(key, value.to_vec()));
    }

    pub fn delete(&mut self, key: u64) {
        self.delete_from(PageKind::RecordPage, 0, key);
    }

    pub fn delete_from(&mut self, kind: PageKind, index: i32, key: u64) {
        self.pending
            .entry((kind, index))
            .or_default()
            .insert(key, Record::deleted(key));
    }

    pub fn add_name(&mut self, kind: NodeKind, key: u32, name: &str, count: u32) {
        self.names.push((kind, key, name.to_owned(), count));
    }

    /// Commits the pending changes as the next revision and returns its
    /// number.
    pub fn commit(&mut self) -> u32 {
        let revision = self.next_revision;
        let is_dump = revision % self.restore == 0;

        // Fold the pending changes into the cumulative tree states.
        let pending = std::mem::take(&mut self.pending);
        let mut this_revision: HashMap<(PageKind, i32), BTreeMap<u64, Record>> = HashMap::new();
        for (tree_key, changes) in pending {
            let tree = self.trees.entry(tree_key).or_default();
            for (key, record) in &changes {
                tree.state.insert(*key, record.clone());
                tree.diff_acc.insert(*key, record.clone());
            }
            this_revision.insert(tree_key, changes);
        }

        // Write leaf fragments per tree, then rebuild its indirect trie.
        let mut tree_roots: HashMap<(PageKind, i32), u64> = HashMap::new();
        let writer = &mut self.writer;
        let policy = self.policy;
        for (tree_key, tree) in self.trees.iter_mut() {
            let changes = this_revision.remove(tree_key).unwrap_or_default();
            let changed_pages: BTreeSet<u64> = changes.keys().map(|k| page_key(*k)).collect();

            let write_dumps =
                is_dump && matches!(policy, VersioningKind::Differential | VersioningKind::Incremental);
            let pages_to_write: BTreeSet<u64> = if write_dumps {
                tree.state
                    .keys()
                    .map(|k| page_key(*k))
                    .chain(changed_pages.iter().copied())
                    .collect()
            } else {
                changed_pages
            };

            for &page in &pages_to_write {
                let mut fragment = KeyValuePage::new(page, revision);
                let full_content = write_dumps || matches!(policy, VersioningKind::Full);
                let records: Vec<Record> = if full_content {
                    tree.state
                        .iter()
                        .filter(|(k, _)| page_key(**k) == page)
                        .map(|(_, r)| r.clone())
                        .collect()
                } else if matches!(policy, VersioningKind::Differential) {
                    tree.diff_acc
                        .iter()
                        .filter(|(k, _)| page_key(**k) == page)
                        .map(|(_, r)| r.clone())
                        .collect()
                } else {
                    changes
                        .iter()
                        .filter(|(k, _)| page_key(**k) == page)
                        .map(|(_, r)| r.clone())
                        .collect()
                };
                for record in records {
                    fragment.insert(record);
                }

                // Diff fragments chain to the last full dump; everything
                // else chains to the newest fragment.
                let previous = if matches!(policy, VersioningKind::Differential) && !write_dumps {
                    tree.dump_fragments.get(&page).copied()
                } else {
                    tree.fragments.get(&page).copied()
                };
                if let Some(previous) = previous {
                    fragment.set_previous_reference(PageReference::new(previous));
                }

                let offset = writer
                    .append(&Page::new(PageBody::KeyValue(fragment)))
                    .unwrap();
                tree.fragments.insert(page, offset);
                if write_dumps || matches!(policy, VersioningKind::Full) {
                    tree.dump_fragments.insert(page, offset);
                }
            }

            if write_dumps {
                tree.diff_acc.clear();
            }

            if let Some(root) =
                build_trie(writer, tree_key.0.level_page_count_exp(), &tree.fragments)
            {
                tree_roots.insert(*tree_key, root);
            }
        }

        // Named pages: one indirect reference per index slot.
        let name_refs = slot_references(&tree_roots, PageKind::NamePage);
        let mut name_page = NamePage::new(name_refs);
        for (kind, key, name, count) in &self.names {
            name_page.set_name(*key, *kind, NameEntry::new(name.clone(), *count));
        }
        let name_offset = writer
            .append(&Page::new(PageBody::Name(name_page)))
            .unwrap();
        let path_offset = writer
            .append(&Page::new(PageBody::Path(PathPage::new(slot_references(
                &tree_roots,
                PageKind::PathPage,
            )))))
            .unwrap();
        let cas_offset = writer
            .append(&Page::new(PageBody::Cas(CasPage::new(slot_references(
                &tree_roots,
                PageKind::CasPage,
            )))))
            .unwrap();
        let path_summary_offset = writer
            .append(&Page::new(PageBody::PathSummary(PathSummaryPage::new(
                slot_references(&tree_roots, PageKind::PathSummaryPage),
            ))))
            .unwrap();

        // Revision root, then a fresh uber trie over every revision so far.
        let record_root = tree_roots
            .get(&(PageKind::RecordPage, 0))
            .copied()
            .unwrap_or(NULL_ID);
        let root_page = RevisionRootPage::new(
            revision,
            self.max_node_key,
            now_millis(),
            PageReference::new(record_root),
            PageReference::new(name_offset),
            PageReference::new(path_offset),
            PageReference::new(cas_offset),
            PageReference::new(path_summary_offset),
        );
        let root_offset = writer
            .append(&Page::new(PageBody::RevisionRoot(root_page)))
            .unwrap();
        self.root_offsets.insert(u64::from(revision), root_offset);

        let uber_root = build_trie(
            writer,
            PageKind::UberPage.level_page_count_exp(),
            &self.root_offsets,
        )
        .unwrap();
        let uber_offset = writer
            .append(&Page::new(PageBody::Uber(UberPage::new(
                PageReference::new(uber_root),
                revision + 1,
            ))))
            .unwrap();
        writer.set_uber_page(uber_offset, revision + 1).unwrap();
        writer.sync().unwrap();

        self.next_revision += 1;
        revision
    }

    pub fn write_commit_file(&self) {
        std::fs::write(self.config.commit_file(), b"").unwrap();
    }

    pub fn remove_commit_file(&self) {
        std::fs::remove_file(self.config.commit_file()).unwrap();
    }

    pub fn page_log_path(&self) -> PathBuf {
        self.config.trx_log_file(TRX_LOG_PAGE_SUFFIX)
    }

    pub fn node_log_path(&self) -> PathBuf {
        self.config.trx_log_file(TRX_LOG_NODE_SUFFIX)
    }
}

fn slot_references(
    tree_roots: &HashMap<(PageKind, i32), u64>,
    kind: PageKind,
) -> Vec<PageReference> {
    let slots = tree_roots
        .keys()
        .filter(|(k, _)| *k == kind)
        .map(|(_, index)| *index + 1)
        .max()
        .unwrap_or(1)
        .max(1) as usize;
    (0..slots)
        .map(|index| {
            let offset = tree_roots
                .get(&(kind, index as i32))
                .copied()
                .unwrap_or(NULL_ID);
            PageReference::new(offset)
        })
        .collect()
}

/// Builds the indirect trie over `entries` (key -> leaf offset) bottom-up;
/// returns the offset of the level-0 indirect page.
fn build_trie(
    writer: &mut FileWriter,
    exps: &[u64],
    entries: &BTreeMap<u64, u64>,
) -> Option<u64> {
    if entries.is_empty() {
        return None;
    }
    Some(build_trie_level(writer, exps, 0, entries))
}

fn build_trie_level(
    writer: &mut FileWriter,
    exps: &[u64],
    level: usize,
    entries: &BTreeMap<u64, u64>,
) -> u64 {
    let exp = exps[level];
    let mut groups: BTreeMap<u64, BTreeMap<u64, u64>> = BTreeMap::new();
    for (&key, &target) in entries {
        let offset = key >> exp;
        let rest = key - (offset << exp);
        groups.entry(offset).or_default().insert(rest, target);
    }

    let mut page = IndirectPage::new();
    for (offset, group) in groups {
        assert!(
            offset < INP_REFERENCE_COUNT as u64,
            "fixture key exceeds trie capacity"
        );
        let child = if level + 1 == exps.len() {
            assert_eq!(group.len(), 1);
            *group.get(&0).unwrap()
        } else {
            build_trie_level(writer, exps, level + 1, &group)
        };
        page.set_reference(offset as usize, PageReference::new(child));
    }
    writer
        .append(&Page::new(PageBody::Indirect(page)))
        .unwrap()
}

/// Reader decorator counting how many leaf record pages are fetched from
/// storage; indirect and administrative pages are not counted.
pub struct CountingReader {
    inner: FileReader,
    kv_reads: Arc<AtomicUsize>,
}

impl CountingReader {
    pub fn open(config: &ResourceConfig) -> (Self, Arc<AtomicUsize>) {
        let kv_reads = Arc::new(AtomicUsize::new(0));
        let reader = Self {
            inner: FileReader::open(config.data_file()).unwrap(),
            kv_reads: Arc::clone(&kv_reads),
        };
        (reader, kv_reads)
    }
}

impl Reader for CountingReader {
    fn read(&self, key: u64) -> eyre::Result<Page> {
        let page = self.inner.read(key)?;
        if page.as_key_value().is_ok() {
            self.kv_reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(page)
    }

    fn read_uber_page_reference(&self) -> eyre::Result<PageReference> {
        self.inner.read_uber_page_reference()
    }

    fn close(&mut self) -> eyre::Result<()> {
        self.inner.close()
    }
}
