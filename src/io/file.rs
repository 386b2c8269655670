//! # Data File Access
//!
//! The data file is a 64-byte header followed by concatenated page frames.
//! Pages are only ever appended; the header is the single mutable spot and
//! records where the current uber page lives:
//!
//! ```text
//! Offset 0:   StoreFileHeader (64B)  magic, version, uber offset, revisions
//! Offset 64:  page frame
//! Offset 64+n: page frame
//! ...
//! ```
//!
//! `FileReader` maps the file read-only and decodes one frame per `read`.
//! The mapping is private to the reader handle, so concurrent readers on the
//! same file do not share any mutable state.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use eyre::{bail, ensure, eyre, Result, WrapErr};
use memmap2::Mmap;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::NULL_ID;
use crate::page::codec;
use crate::page::{Page, PageReference};

use super::Reader;

pub const STORE_MAGIC: &[u8; 8] = b"SEDIMENT";
pub const STORE_VERSION: u32 = 1;
pub const FILE_HEADER_SIZE: usize = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct StoreFileHeader {
    magic: [u8; 8],
    version: U32,
    _reserved0: U32,
    uber_page_offset: U64,
    revision_count: U32,
    _reserved1: [u8; 36],
}

const _: () = assert!(std::mem::size_of::<StoreFileHeader>() == FILE_HEADER_SIZE);

impl StoreFileHeader {
    fn new() -> Self {
        Self {
            magic: *STORE_MAGIC,
            version: U32::new(STORE_VERSION),
            _reserved0: U32::new(0),
            uber_page_offset: U64::new(NULL_ID),
            revision_count: U32::new(0),
            _reserved1: [0u8; 36],
        }
    }

    fn parse(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "data file too small for header: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );
        let header = Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre!("failed to parse data file header: {:?}", e))?;
        ensure!(&header.magic == STORE_MAGIC, "invalid data file magic");
        ensure!(
            header.version.get() == STORE_VERSION,
            "unsupported data file version: {} (expected {})",
            header.version.get(),
            STORE_VERSION
        );
        Ok(header)
    }
}

/// Memory-mapped, read-only view of the data file. One handle per
/// transaction.
#[derive(Debug)]
pub struct FileReader {
    mmap: Option<Mmap>,
}

impl FileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open data file '{}'", path.display()))?;

        // SAFETY: the mapping is read-only and the data file is append-only;
        // frames already referenced by an uber page are never rewritten. The
        // mmap lifetime is tied to this reader, and every access goes through
        // bounds-checked frame decoding.
        let mmap = unsafe {
            Mmap::map(&file)
                .wrap_err_with(|| format!("failed to mmap data file '{}'", path.display()))?
        };

        StoreFileHeader::parse(&mmap)?;
        Ok(Self { mmap: Some(mmap) })
    }

    fn mmap(&self) -> Result<&Mmap> {
        self.mmap
            .as_ref()
            .ok_or_else(|| eyre!("reader is already closed"))
    }
}

impl Reader for FileReader {
    fn read(&self, key: u64) -> Result<Page> {
        let mmap = self.mmap()?;
        if key == NULL_ID {
            bail!("failed to read page: reference has no persistent page");
        }
        ensure!(
            (key as usize) >= FILE_HEADER_SIZE && (key as usize) < mmap.len(),
            "failed to read page: offset {} is out of bounds",
            key
        );
        let (page, _) = codec::decode_page_at(mmap, key as usize)
            .wrap_err_with(|| format!("failed to read page at offset {}", key))?;
        page.set_dirty(true);
        Ok(page)
    }

    fn read_uber_page_reference(&self) -> Result<PageReference> {
        let mmap = self.mmap()?;
        let header = StoreFileHeader::parse(mmap)?;
        let offset = header.uber_page_offset.get();
        ensure!(offset != NULL_ID, "store has no uber page yet");
        Ok(PageReference::new(offset))
    }

    fn close(&mut self) -> Result<()> {
        self.mmap = None;
        Ok(())
    }
}

/// Append-only writer for the data file. Not used by the read path itself;
/// this is the primitive a write transaction builds revisions with.
#[derive(Debug)]
pub struct FileWriter {
    file: File,
    offset: u64,
}

impl FileWriter {
    /// Creates a fresh data file with an empty header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create data file '{}'", path.display()))?;

        file.write_all(StoreFileHeader::new().as_bytes())
            .wrap_err("failed to write data file header")?;
        Ok(Self {
            file,
            offset: FILE_HEADER_SIZE as u64,
        })
    }

    /// Opens an existing data file for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open data file '{}'", path.display()))?;
        let len = file
            .seek(SeekFrom::End(0))
            .wrap_err("failed to seek data file")?;
        ensure!(
            len >= FILE_HEADER_SIZE as u64,
            "data file '{}' is truncated",
            path.display()
        );
        Ok(Self { file, offset: len })
    }

    /// Appends one page frame; returns its stable offset.
    pub fn append(&mut self, page: &Page) -> Result<u64> {
        let frame = codec::encode_page(page);
        let offset = self.offset;
        self.file
            .write_all(&frame)
            .wrap_err("failed to append page frame")?;
        self.offset += frame.len() as u64;
        Ok(offset)
    }

    /// Publishes a new uber page: rewrites the header to point at `offset`.
    pub fn set_uber_page(&mut self, offset: u64, revision_count: u32) -> Result<()> {
        let mut header = StoreFileHeader::new();
        header.uber_page_offset = U64::new(offset);
        header.revision_count = U32::new(revision_count);

        self.file
            .seek(SeekFrom::Start(0))
            .wrap_err("failed to seek data file header")?;
        self.file
            .write_all(header.as_bytes())
            .wrap_err("failed to rewrite data file header")?;
        self.file
            .seek(SeekFrom::Start(self.offset))
            .wrap_err("failed to seek data file end")?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().wrap_err("failed to sync data file")
    }
}
