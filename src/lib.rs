//! # Sediment - Versioned, Append-Only Document Store
//!
//! Sediment stores hierarchical documents as persistent, copy-on-write page
//! graphs. Revisions are never rewritten: a commit appends new page
//! fragments and re-links the indirect tries above them, so any past
//! revision stays readable forever. This crate implements the page-level
//! read path: given a revision number and a record key, materialise the
//! record exactly as it existed at that revision.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │        Resource (handle, config)      │
//! ├──────────────────────────────────────┤
//! │   PageReadTrx (snapshot read path)    │
//! │   trie descent · fragment fusion      │
//! ├───────────────┬──────────────────────┤
//! │ Trx caches    │  Transaction logs     │
//! │ (private)     │  (writer overlay)     │
//! ├───────────────┴──────────────────────┤
//! │   BufferManager (shared, per-resource)│
//! ├──────────────────────────────────────┤
//! │   Page model + frame codec            │
//! ├──────────────────────────────────────┤
//! │   Reader / Writer (mmap data file)    │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## Reading a Record
//!
//! ```ignore
//! use sediment::{PageKind, Resource, ResourceConfig, VersioningKind};
//!
//! let config = ResourceConfig::new("./resource", VersioningKind::Incremental, 4)?;
//! let resource = Resource::open(config)?;
//!
//! let trx = resource.begin_read_trx(resource.most_recent_revision()?)?;
//! if let Some(record) = trx.record(17, PageKind::RecordPage, 0)? {
//!     println!("{:?}", record.value());
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! A read transaction is single-threaded and sees exactly one revision.
//! Multiple transactions may run concurrently on one resource: they share
//! the buffer manager (thread-safe, and never fed uncommitted state) and the
//! data file, but each owns its reader handle and private caches.
//!
//! ## Module Overview
//!
//! - [`config`]: format constants and resource configuration
//! - [`page`]: page model, references, log keys, frame codec
//! - [`io`]: storage reader/writer over the append-only data file
//! - [`cache`]: buffer manager, transaction-log overlays, trx-local caches
//! - [`versioning`]: pluggable revision-reconstruction policies
//! - [`index`]: per-revision secondary-index definitions
//! - [`trx`]: the page-read transaction
//! - [`resource`]: the store handle binding it all together

pub mod cache;
pub mod config;
pub mod index;
pub mod io;
pub mod page;
pub mod resource;
pub mod trx;
pub mod versioning;

pub use cache::{BufferManager, RecordPageContainer, WriterPageLog};
pub use config::ResourceConfig;
pub use index::{IndexController, IndexDef, IndexType};
pub use io::{FileReader, FileWriter, Reader};
pub use page::{
    IndexLogKey, IndirectPageLogKey, NodeKind, Page, PageKind, PageReference, Record, RecordKind,
};
pub use resource::Resource;
pub use trx::PageReadTrx;
pub use versioning::VersioningKind;
