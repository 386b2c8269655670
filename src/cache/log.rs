//! # Transaction Log Overlays
//!
//! A write transaction keeps the pages it has produced but not yet merged
//! into the data file in two logs. The read path overlays them *in front of*
//! durable storage:
//!
//! - the **page log** answers arbitrary pages by indirect log key;
//! - the **record-page log** answers record-page containers by
//!   `(page kind, page key, index)`.
//!
//! Between checkpoints the writer maintains both as files under the resource
//! directory; their presence is signalled by the commit file. A read
//! transaction opens them once at construction (a malformed file is an I/O
//! error) and queries them for the transaction's lifetime. `clear` discards
//! the cached entries, `close` releases the file handle.
//!
//! A container fetched from the record-page log that equals the empty
//! sentinel means the writer did not shadow that page; the read path must
//! fall through to storage.
//!
//! The sibling writer's *in-memory* page log (`WriterPageLog`) is a third
//! source consulted even before the on-disk overlays; the read path only
//! ever queries it.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashMap;
use memmap2::Mmap;
use parking_lot::RwLock;

use crate::page::codec;
use crate::page::{IndexLogKey, IndirectPageLogKey, Page, PageKind};

use super::RecordPageContainer;

pub const LOG_MAGIC: &[u8; 8] = b"SEDTRXLG";
const LOG_HEADER_SIZE: usize = 16;

/// On-disk overlay of arbitrary pages, keyed by indirect log key.
#[derive(Debug)]
pub struct TransactionLogPageCache {
    entries: HashMap<IndirectPageLogKey, Arc<Page>>,
    mmap: Option<Mmap>,
}

impl TransactionLogPageCache {
    /// Opens and parses the log file. A missing file yields an empty
    /// overlay; a malformed one is an I/O error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self {
                entries: HashMap::new(),
                mmap: None,
            });
        }

        let (mmap, count) = open_log_file(path)?;
        let mut entries = HashMap::with_capacity(count);
        let mut offset = LOG_HEADER_SIZE;
        for _ in 0..count {
            let (key, after_key) = decode_indirect_log_key(&mmap, offset)?;
            let (page, frame_len) = codec::decode_page_at(&mmap, after_key)
                .wrap_err_with(|| format!("malformed page log '{}'", path.display()))?;
            entries.insert(key, Arc::new(page));
            offset = after_key + frame_len;
        }

        Ok(Self {
            entries,
            mmap: Some(mmap),
        })
    }

    pub fn get(&self, key: &IndirectPageLogKey) -> Option<Arc<Page>> {
        self.entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discards the cached entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Releases the file handle.
    pub fn close(&mut self) {
        self.entries.clear();
        self.mmap = None;
    }
}

/// On-disk overlay of record-page containers, keyed by
/// `(page kind, page key, index)`.
#[derive(Debug)]
pub struct TransactionRecordPageLog {
    entries: HashMap<IndexLogKey, RecordPageContainer>,
    mmap: Option<Mmap>,
}

impl TransactionRecordPageLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self {
                entries: HashMap::new(),
                mmap: None,
            });
        }

        let (mmap, count) = open_log_file(path)?;
        let mut entries = HashMap::with_capacity(count);
        let mut offset = LOG_HEADER_SIZE;
        for _ in 0..count {
            let (key, after_key) = decode_index_log_key(&mmap, offset)?;
            ensure!(
                after_key < mmap.len(),
                "malformed record-page log '{}': truncated container",
                path.display()
            );
            let flag = mmap[after_key];
            offset = after_key + 1;
            let container = if flag == 0 {
                RecordPageContainer::empty()
            } else {
                let (page, frame_len) = codec::decode_page_at(&mmap, offset)
                    .wrap_err_with(|| format!("malformed record-page log '{}'", path.display()))?;
                offset += frame_len;
                RecordPageContainer::new(page.into_key_value()?)
            };
            entries.insert(key, container);
        }

        Ok(Self {
            entries,
            mmap: Some(mmap),
        })
    }

    /// The shadow container for `key`; the empty sentinel when the writer
    /// did not shadow that page.
    pub fn get(&self, key: &IndexLogKey) -> RecordPageContainer {
        self.entries.get(key).cloned().unwrap_or_default()
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

    pub fn close(&mut self) {
        self.entries.clear();
        self.mmap = None;
    }
}

/// In-memory page log of a sibling write transaction. The read path only
/// queries it; ownership and mutation stay with the writer.
#[derive(Debug, Default)]
pub struct WriterPageLog {
    pages: RwLock<HashMap<IndirectPageLogKey, Arc<Page>>>,
}

impl WriterPageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &IndirectPageLogKey) -> Option<Arc<Page>> {
        self.pages.read().get(key).cloned()
    }

    /// Writer-side: shadow `key` with `page`.
    pub fn put(&self, key: IndirectPageLogKey, page: Arc<Page>) {
        self.pages.write().insert(key, page);
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}

/// Serializes a page log the way the writer maintains it between
/// checkpoints.
pub fn write_page_log_file<P: AsRef<Path>>(
    path: P,
    entries: &[(IndirectPageLogKey, &Page)],
) -> Result<()> {
    let mut buf = log_header(entries.len());
    for (key, page) in entries {
        encode_indirect_log_key(&mut buf, key);
        buf.extend_from_slice(&codec::encode_page(page));
    }
    write_file(path.as_ref(), &buf)
}

/// Serializes a record-page log the way the writer maintains it between
/// checkpoints.
pub fn write_record_page_log_file<P: AsRef<Path>>(
    path: P,
    entries: &[(IndexLogKey, &RecordPageContainer)],
) -> Result<()> {
    let mut buf = log_header(entries.len());
    for (key, container) in entries {
        encode_index_log_key(&mut buf, key);
        match container.complete() {
            Some(page) => {
                buf.push(1);
                buf.extend_from_slice(&codec::encode_page(&Page::new(
                    crate::page::PageBody::KeyValue(page.as_ref().clone()),
                )));
            }
            None => buf.push(0),
        }
    }
    write_file(path.as_ref(), &buf)
}

fn log_header(count: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LOG_HEADER_SIZE);
    buf.extend_from_slice(LOG_MAGIC);
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&(count as u32).to_le_bytes());
    buf
}

fn write_file(path: &Path, buf: &[u8]) -> Result<()> {
    let mut file = File::create(path)
        .wrap_err_with(|| format!("failed to create log file '{}'", path.display()))?;
    file.write_all(buf)
        .wrap_err_with(|| format!("failed to write log file '{}'", path.display()))?;
    file.sync_all()
        .wrap_err_with(|| format!("failed to sync log file '{}'", path.display()))?;
    Ok(())
}

fn open_log_file(path: &Path) -> Result<(Mmap, usize)> {
    let file = File::open(path)
        .wrap_err_with(|| format!("failed to open log file '{}'", path.display()))?;

    // SAFETY: the mapping is read-only and the log file is replaced
    // atomically by the writer, never rewritten in place while a reader has
    // it open. All access below is bounds-checked.
    let mmap = unsafe {
        Mmap::map(&file)
            .wrap_err_with(|| format!("failed to mmap log file '{}'", path.display()))?
    };

    ensure!(
        mmap.len() >= LOG_HEADER_SIZE && &mmap[..8] == LOG_MAGIC,
        "malformed transaction log '{}'",
        path.display()
    );
    let version = u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]);
    ensure!(
        version == 1,
        "unsupported transaction log version {} in '{}'",
        version,
        path.display()
    );
    let count = u32::from_le_bytes([mmap[12], mmap[13], mmap[14], mmap[15]]) as usize;
    Ok((mmap, count))
}

fn encode_indirect_log_key(buf: &mut Vec<u8>, key: &IndirectPageLogKey) {
    buf.push(key.page_kind.as_u8());
    buf.extend_from_slice(&key.index.to_le_bytes());
    buf.extend_from_slice(&key.level.to_le_bytes());
    buf.extend_from_slice(&key.position.to_le_bytes());
}

fn decode_indirect_log_key(buf: &[u8], offset: usize) -> Result<(IndirectPageLogKey, usize)> {
    const LEN: usize = 1 + 4 + 4 + 8;
    ensure!(
        offset + LEN <= buf.len(),
        "truncated log key at offset {}",
        offset
    );
    let page_kind = PageKind::from_u8(buf[offset])?;
    let index = i32::from_le_bytes(take4(buf, offset + 1));
    let level = i32::from_le_bytes(take4(buf, offset + 5));
    let position = u64::from_le_bytes(take8(buf, offset + 9));
    Ok((
        IndirectPageLogKey::new(page_kind, index, level, position),
        offset + LEN,
    ))
}

fn encode_index_log_key(buf: &mut Vec<u8>, key: &IndexLogKey) {
    buf.push(key.page_kind.as_u8());
    buf.extend_from_slice(&key.record_page_key.to_le_bytes());
    buf.extend_from_slice(&key.index.to_le_bytes());
}

fn decode_index_log_key(buf: &[u8], offset: usize) -> Result<(IndexLogKey, usize)> {
    const LEN: usize = 1 + 8 + 4;
    ensure!(
        offset + LEN <= buf.len(),
        "truncated log key at offset {}",
        offset
    );
    let page_kind = PageKind::from_u8(buf[offset])?;
    let record_page_key = u64::from_le_bytes(take8(buf, offset + 1));
    let index = i32::from_le_bytes(take4(buf, offset + 9));
    Ok((
        IndexLogKey::new(page_kind, record_page_key, index),
        offset + LEN,
    ))
}

fn take4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    out
}

fn take8(buf: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{KeyValuePage, PageBody, Record};

    fn sample_page() -> Page {
        let mut kv = KeyValuePage::new(0, 1);
        kv.insert(Record::new(42, b"shadow".to_vec()));
        Page::new(PageBody::KeyValue(kv))
    }

    #[test]
    fn missing_log_file_is_an_empty_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransactionLogPageCache::open(dir.path().join("trx_log.page")).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn page_log_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trx_log.page");
        let key = IndirectPageLogKey::new(PageKind::RecordPage, -1, 5, 0);
        let page = sample_page();
        write_page_log_file(&path, &[(key, &page)]).unwrap();

        let log = TransactionLogPageCache::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        let shadow = log.get(&key).unwrap();
        assert_eq!(
            shadow.as_key_value().unwrap().value(42).unwrap().value(),
            b"shadow"
        );
        assert!(log
            .get(&IndirectPageLogKey::new(PageKind::RecordPage, -1, 5, 1))
            .is_none());
    }

    #[test]
    fn record_page_log_misses_yield_the_empty_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trx_log.node");
        let key = IndexLogKey::new(PageKind::RecordPage, 0, 0);
        let mut kv = KeyValuePage::new(0, 1);
        kv.insert(Record::new(42, b"shadow".to_vec()));
        let container = RecordPageContainer::new(kv);
        write_record_page_log_file(&path, &[(key, &container)]).unwrap();

        let log = TransactionRecordPageLog::open(&path).unwrap();
        assert!(!log.get(&key).is_empty());
        assert!(log
            .get(&IndexLogKey::new(PageKind::RecordPage, 9, 0))
            .is_empty());
    }

    #[test]
    fn malformed_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trx_log.page");
        std::fs::write(&path, b"not a log file").unwrap();
        assert!(TransactionLogPageCache::open(&path).is_err());
    }

    #[test]
    fn clear_discards_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trx_log.page");
        let key = IndirectPageLogKey::new(PageKind::NamePage, 0, 0, 0);
        let page = sample_page();
        write_page_log_file(&path, &[(key, &page)]).unwrap();

        let mut log = TransactionLogPageCache::open(&path).unwrap();
        log.clear();
        assert!(log.get(&key).is_none());
    }

    #[test]
    fn writer_page_log_is_query_only_from_the_read_side() {
        let log = WriterPageLog::new();
        let key = IndirectPageLogKey::new(PageKind::UberPage, -1, 5, 3);
        assert!(log.get(&key).is_none());
        log.put(key, Arc::new(sample_page()));
        assert!(log.get(&key).is_some());
    }
}
