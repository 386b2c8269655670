//! # Cache Tiers
//!
//! The read path layers three cache tiers with deliberately distinct key
//! spaces; they must not be collapsed because the keys do not unify:
//!
//! ```text
//! per-transaction container cache    (page kind, page key, index)
//!       absorbs repeated lookups by record key within one transaction
//! resource buffer manager            reference identity
//!       absorbs cross-transaction repeats of pages and containers
//! per-transaction page cache         reference identity
//!       absorbs indirect-tree revisits within one transaction
//! ```
//!
//! In front of all of them sit the transaction-log overlays (`log`): pages a
//! sibling writer has produced but not yet merged into the data file shadow
//! everything durable.

mod buffer_manager;
mod container;
mod log;
mod record_page_cache;

pub use buffer_manager::BufferManager;
pub use container::RecordPageContainer;
pub use log::{
    write_page_log_file, write_record_page_log_file, TransactionLogPageCache,
    TransactionRecordPageLog, WriterPageLog, LOG_MAGIC,
};
pub use record_page_cache::RecordPageCache;
