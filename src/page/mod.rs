//! # Page Model
//!
//! Everything the store persists is a page. The page graph is append-only
//! and copy-on-write: a revision never mutates pages in place, it writes new
//! fragments and re-links the indirect tries above them. The read path sees
//! the graph through the closed set of kinds below.
//!
//! ## Page Kinds
//!
//! ```text
//! UberPage ──────────────┐   durable root; locates revision roots through
//!                        │   its own indirect trie, keyed by revision
//! RevisionRootPage <─────┘
//!   │ ├── record trie ───────> IndirectPage* ──> KeyValuePage (leaf)
//!   │ ├── NamePage ─ indirect refs per name index + name dictionaries
//!   │ ├── PathPage ─ indirect refs per path index
//!   │ ├── CasPage ── indirect refs per CAS index
//!   │ └── PathSummaryPage ─ indirect refs per path summary
//! ```
//!
//! `KeyValuePage` leaves chain older fragments of the same logical page via
//! `previous_reference`; the snapshot reconstructor walks that chain and the
//! versioning policy fuses the fragments into one complete page.
//!
//! ## Dirty Marker
//!
//! The storage reader marks every page dirty on load. The flag is a
//! load-time marker consulted on buffer-manager insertion paths; it does not
//! imply mutation.

mod indirect;
mod index_pages;
mod kv;
mod record;
mod reference;
mod revision_root;
mod uber;

pub mod codec;

pub use indirect::IndirectPage;
pub use index_pages::{CasPage, NameEntry, NamePage, PathPage, PathSummaryPage};
pub use kv::KeyValuePage;
pub use record::{NodeKind, Record, RecordKind};
pub use reference::{CacheKey, IndexLogKey, IndirectPageLogKey, PageReference};
pub use revision_root::RevisionRootPage;
pub use uber::UberPage;

use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{bail, Result};

use crate::config::{INP_LEVEL_PAGE_COUNT_EXPONENT, PATH_SUMMARY_LEVEL_PAGE_COUNT_EXPONENT};

/// The closed set of page kinds. The kind decides which indirect trie is
/// descended and which reference of the revision root the descent starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PageKind {
    RecordPage = 1,
    NamePage = 2,
    PathPage = 3,
    CasPage = 4,
    PathSummaryPage = 5,
    UberPage = 6,
}

impl PageKind {
    /// Per-level shift exponents of this kind's indirect trie; the array
    /// length is the trie height.
    pub fn level_page_count_exp(&self) -> &'static [u64] {
        match self {
            PageKind::PathSummaryPage => &PATH_SUMMARY_LEVEL_PAGE_COUNT_EXPONENT,
            _ => &INP_LEVEL_PAGE_COUNT_EXPONENT,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PageKind::RecordPage),
            2 => Ok(PageKind::NamePage),
            3 => Ok(PageKind::PathPage),
            4 => Ok(PageKind::CasPage),
            5 => Ok(PageKind::PathSummaryPage),
            6 => Ok(PageKind::UberPage),
            other => bail!("unknown page kind tag {}", other),
        }
    }
}

/// Tagged body of a page.
#[derive(Debug)]
pub enum PageBody {
    Indirect(IndirectPage),
    KeyValue(KeyValuePage),
    RevisionRoot(RevisionRootPage),
    Name(NamePage),
    Path(PathPage),
    Cas(CasPage),
    PathSummary(PathSummaryPage),
    Uber(UberPage),
}

/// A materialised page: a tagged body plus the load-time dirty marker.
#[derive(Debug)]
pub struct Page {
    body: PageBody,
    dirty: AtomicBool,
}

impl Page {
    pub fn new(body: PageBody) -> Self {
        Self {
            body,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn body(&self) -> &PageBody {
        &self.body
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn as_indirect(&self) -> Result<&IndirectPage> {
        match &self.body {
            PageBody::Indirect(page) => Ok(page),
            other => bail!("expected an indirect page, found {} page", variant_name(other)),
        }
    }

    pub fn as_key_value(&self) -> Result<&KeyValuePage> {
        match &self.body {
            PageBody::KeyValue(page) => Ok(page),
            other => bail!("expected a record page, found {} page", variant_name(other)),
        }
    }

    /// Consumes the page; used by the snapshot reconstructor, which owns the
    /// fragments it reads.
    pub fn into_key_value(self) -> Result<KeyValuePage> {
        match self.body {
            PageBody::KeyValue(page) => Ok(page),
            other => bail!("expected a record page, found {} page", variant_name(&other)),
        }
    }

    pub fn as_revision_root(&self) -> Result<&RevisionRootPage> {
        match &self.body {
            PageBody::RevisionRoot(page) => Ok(page),
            other => bail!(
                "expected a revision root page, found {} page",
                variant_name(other)
            ),
        }
    }

    pub fn as_name(&self) -> Result<&NamePage> {
        match &self.body {
            PageBody::Name(page) => Ok(page),
            other => bail!("expected a name page, found {} page", variant_name(other)),
        }
    }

    pub fn as_path(&self) -> Result<&PathPage> {
        match &self.body {
            PageBody::Path(page) => Ok(page),
            other => bail!("expected a path page, found {} page", variant_name(other)),
        }
    }

    pub fn as_cas(&self) -> Result<&CasPage> {
        match &self.body {
            PageBody::Cas(page) => Ok(page),
            other => bail!("expected a CAS page, found {} page", variant_name(other)),
        }
    }

    pub fn as_path_summary(&self) -> Result<&PathSummaryPage> {
        match &self.body {
            PageBody::PathSummary(page) => Ok(page),
            other => bail!(
                "expected a path summary page, found {} page",
                variant_name(other)
            ),
        }
    }

    pub fn as_uber(&self) -> Result<&UberPage> {
        match &self.body {
            PageBody::Uber(page) => Ok(page),
            other => bail!("expected an uber page, found {} page", variant_name(other)),
        }
    }
}

fn variant_name(body: &PageBody) -> &'static str {
    match body {
        PageBody::Indirect(_) => "indirect",
        PageBody::KeyValue(_) => "key/value",
        PageBody::RevisionRoot(_) => "revision root",
        PageBody::Name(_) => "name",
        PageBody::Path(_) => "path",
        PageBody::Cas(_) => "CAS",
        PageBody::PathSummary(_) => "path summary",
        PageBody::Uber(_) => "uber",
    }
}
