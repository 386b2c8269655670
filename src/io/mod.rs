//! # Storage I/O
//!
//! The read path fetches pages through the `Reader` trait: a stateless "map
//! a stable 64-bit offset to a deserialised page" contract with no caching of
//! its own. Each transaction owns its own reader handle; distinct handles
//! over the same file may read concurrently.
//!
//! `FileReader` is the memory-mapped implementation over the append-only
//! data file. `FileWriter` is the matching append primitive a write
//! transaction (and the test fixtures) use to produce that file; commit
//! protocol and durability live above it and are out of scope here.

mod file;

pub use file::{FileReader, FileWriter, FILE_HEADER_SIZE, STORE_MAGIC, STORE_VERSION};

use eyre::Result;

use crate::page::{Page, PageReference};

/// Stateless page fetch by stable offset.
pub trait Reader {
    /// Deserialises exactly one page from stable storage and marks it dirty
    /// (a load-time marker, not a mutation flag). Fails with an I/O error
    /// when the offset is unreadable or the bytes do not decode.
    fn read(&self, key: u64) -> Result<Page>;

    /// Reference to the current uber page recorded in the file header.
    fn read_uber_page_reference(&self) -> Result<PageReference>;

    /// Releases the underlying handles. Reads after close are an error.
    fn close(&mut self) -> Result<()>;
}
