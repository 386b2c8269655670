//! # Page Frame Codec
//!
//! Pages are persisted as self-delimiting frames:
//!
//! ```text
//! +--------------------------+
//! | PageFrameHeader (16B)    |  magic, frame kind, body length, CRC-64
//! +--------------------------+
//! | body (variable)          |  kind-specific little-endian encoding
//! +--------------------------+
//! ```
//!
//! The checksum covers the body; a mismatch or an unknown tag is a decode
//! failure surfaced as an I/O error. Log keys are never persisted; they are
//! in-memory identities stamped by the navigator.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{bail, ensure, eyre, Result};
use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::page::{
    CasPage, IndirectPage, KeyValuePage, NameEntry, NamePage, NodeKind, Page, PageBody,
    PageReference, PathPage, PathSummaryPage, Record, RecordKind, RevisionRootPage, UberPage,
};

pub const FRAME_MAGIC: u16 = 0x5EDB;
pub const FRAME_HEADER_SIZE: usize = 16;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

const TAG_INDIRECT: u8 = 1;
const TAG_KEY_VALUE: u8 = 2;
const TAG_REVISION_ROOT: u8 = 3;
const TAG_NAME: u8 = 4;
const TAG_PATH: u8 = 5;
const TAG_CAS: u8 = 6;
const TAG_PATH_SUMMARY: u8 = 7;
const TAG_UBER: u8 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct PageFrameHeader {
    magic: U16,
    tag: u8,
    flags: u8,
    body_len: U32,
    checksum: U64,
}

const _: () = assert!(std::mem::size_of::<PageFrameHeader>() == FRAME_HEADER_SIZE);

/// Encodes `page` into one self-delimiting frame.
pub fn encode_page(page: &Page) -> Vec<u8> {
    let (tag, body) = match page.body() {
        PageBody::Indirect(p) => (TAG_INDIRECT, encode_indirect(p)),
        PageBody::KeyValue(p) => (TAG_KEY_VALUE, encode_key_value(p)),
        PageBody::RevisionRoot(p) => (TAG_REVISION_ROOT, encode_revision_root(p)),
        PageBody::Name(p) => (TAG_NAME, encode_name(p)),
        PageBody::Path(p) => (TAG_PATH, encode_slot_refs(p.references())),
        PageBody::Cas(p) => (TAG_CAS, encode_slot_refs(p.references())),
        PageBody::PathSummary(p) => (TAG_PATH_SUMMARY, encode_slot_refs(p.references())),
        PageBody::Uber(p) => (TAG_UBER, encode_uber(p)),
    };

    let header = PageFrameHeader {
        magic: U16::new(FRAME_MAGIC),
        tag,
        flags: 0,
        body_len: U32::new(body.len() as u32),
        checksum: U64::new(CRC64.checksum(&body)),
    };

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Decodes the frame starting at `offset` in `buf`. Returns the page and the
/// total frame size.
pub fn decode_page_at(buf: &[u8], offset: usize) -> Result<(Page, usize)> {
    ensure!(
        offset + FRAME_HEADER_SIZE <= buf.len(),
        "page frame header at offset {} is out of bounds",
        offset
    );
    let header = PageFrameHeader::ref_from_bytes(&buf[offset..offset + FRAME_HEADER_SIZE])
        .map_err(|e| eyre!("failed to parse page frame header: {:?}", e))?;
    ensure!(
        header.magic.get() == FRAME_MAGIC,
        "invalid page frame magic at offset {}",
        offset
    );

    let body_len = header.body_len.get() as usize;
    let body_start = offset + FRAME_HEADER_SIZE;
    ensure!(
        body_start + body_len <= buf.len(),
        "page frame body at offset {} is out of bounds",
        offset
    );
    let body = &buf[body_start..body_start + body_len];
    ensure!(
        CRC64.checksum(body) == header.checksum.get(),
        "page frame checksum mismatch at offset {}",
        offset
    );

    let mut cursor = Cursor::new(body);
    let page_body = match header.tag {
        TAG_INDIRECT => PageBody::Indirect(decode_indirect(&mut cursor)?),
        TAG_KEY_VALUE => PageBody::KeyValue(decode_key_value(&mut cursor)?),
        TAG_REVISION_ROOT => PageBody::RevisionRoot(decode_revision_root(&mut cursor)?),
        TAG_NAME => PageBody::Name(decode_name(&mut cursor)?),
        TAG_PATH => PageBody::Path(PathPage::new(decode_slot_refs(&mut cursor)?)),
        TAG_CAS => PageBody::Cas(CasPage::new(decode_slot_refs(&mut cursor)?)),
        TAG_PATH_SUMMARY => {
            PageBody::PathSummary(PathSummaryPage::new(decode_slot_refs(&mut cursor)?))
        }
        TAG_UBER => PageBody::Uber(decode_uber(&mut cursor)?),
        other => bail!("unknown page frame tag {} at offset {}", other, offset),
    };
    ensure!(
        cursor.is_exhausted(),
        "trailing bytes in page frame at offset {}",
        offset
    );

    Ok((Page::new(page_body), FRAME_HEADER_SIZE + body_len))
}

fn encode_indirect(page: &IndirectPage) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + page.references().len() * 8);
    put_u32(&mut body, page.references().len() as u32);
    for reference in page.references() {
        put_u64(&mut body, reference.key());
    }
    body
}

fn decode_indirect(cursor: &mut Cursor<'_>) -> Result<IndirectPage> {
    let count = cursor.read_u32()? as usize;
    let mut references = Vec::with_capacity(count);
    for _ in 0..count {
        references.push(PageReference::new(cursor.read_u64()?));
    }
    Ok(IndirectPage::from_references(references))
}

fn encode_key_value(page: &KeyValuePage) -> Vec<u8> {
    let mut body = Vec::new();
    put_u64(&mut body, page.page_key());
    put_u32(&mut body, page.revision());
    match page.previous_reference() {
        Some(reference) => {
            body.push(1);
            put_u64(&mut body, reference.key());
        }
        None => body.push(0),
    }
    put_u32(&mut body, page.size() as u32);
    for record in page.records() {
        put_u64(&mut body, record.key());
        body.push(record.kind() as u8);
        put_u32(&mut body, record.value().len() as u32);
        body.extend_from_slice(record.value());
    }
    body
}

fn decode_key_value(cursor: &mut Cursor<'_>) -> Result<KeyValuePage> {
    let page_key = cursor.read_u64()?;
    let revision = cursor.read_u32()?;
    let mut page = KeyValuePage::new(page_key, revision);
    if cursor.read_u8()? != 0 {
        page.set_previous_reference(PageReference::new(cursor.read_u64()?));
    }
    let count = cursor.read_u32()?;
    for _ in 0..count {
        let key = cursor.read_u64()?;
        let kind = RecordKind::from_u8(cursor.read_u8()?)?;
        let len = cursor.read_u32()? as usize;
        let value = cursor.read_bytes(len)?.to_vec();
        page.insert(Record::with_kind(key, kind, value));
    }
    Ok(page)
}

fn encode_revision_root(page: &RevisionRootPage) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + 8 * 7);
    put_u32(&mut body, page.revision());
    put_u64(&mut body, page.max_node_key());
    put_u64(&mut body, page.commit_timestamp());
    put_u64(&mut body, page.indirect_page_reference().key());
    put_u64(&mut body, page.name_page_reference().key());
    put_u64(&mut body, page.path_page_reference().key());
    put_u64(&mut body, page.cas_page_reference().key());
    put_u64(&mut body, page.path_summary_page_reference().key());
    body
}

fn decode_revision_root(cursor: &mut Cursor<'_>) -> Result<RevisionRootPage> {
    let revision = cursor.read_u32()?;
    let max_node_key = cursor.read_u64()?;
    let commit_timestamp = cursor.read_u64()?;
    let indirect = PageReference::new(cursor.read_u64()?);
    let name = PageReference::new(cursor.read_u64()?);
    let path = PageReference::new(cursor.read_u64()?);
    let cas = PageReference::new(cursor.read_u64()?);
    let path_summary = PageReference::new(cursor.read_u64()?);
    Ok(RevisionRootPage::new(
        revision,
        max_node_key,
        commit_timestamp,
        indirect,
        name,
        path,
        cas,
        path_summary,
    ))
}

fn encode_name(page: &NamePage) -> Vec<u8> {
    let mut body = encode_slot_refs(page.references());
    let entries: Vec<_> = page.entries().collect();
    put_u32(&mut body, entries.len() as u32);
    for ((kind, key), entry) in entries {
        body.push(*kind as u8);
        put_u32(&mut body, *key);
        put_u32(&mut body, entry.count());
        put_u32(&mut body, entry.name().len() as u32);
        body.extend_from_slice(entry.name().as_bytes());
    }
    body
}

fn decode_name(cursor: &mut Cursor<'_>) -> Result<NamePage> {
    let references = decode_slot_refs(cursor)?;
    let mut page = NamePage::new(references);
    let count = cursor.read_u32()?;
    for _ in 0..count {
        let kind = NodeKind::from_u8(cursor.read_u8()?)?;
        let key = cursor.read_u32()?;
        let name_count = cursor.read_u32()?;
        let len = cursor.read_u32()? as usize;
        let name = std::str::from_utf8(cursor.read_bytes(len)?)
            .map_err(|e| eyre!("name dictionary entry is not valid UTF-8: {}", e))?
            .to_owned();
        page.set_name(key, kind, NameEntry::new(name, name_count));
    }
    Ok(page)
}

fn encode_uber(page: &UberPage) -> Vec<u8> {
    let mut body = Vec::with_capacity(12);
    put_u64(&mut body, page.indirect_page_reference().key());
    put_u32(&mut body, page.revision_count());
    body
}

fn decode_uber(cursor: &mut Cursor<'_>) -> Result<UberPage> {
    let indirect = PageReference::new(cursor.read_u64()?);
    let revision_count = cursor.read_u32()?;
    Ok(UberPage::new(indirect, revision_count))
}

fn encode_slot_refs(references: &[PageReference]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + references.len() * 8);
    put_u32(&mut body, references.len() as u32);
    for reference in references {
        put_u64(&mut body, reference.key());
    }
    body
}

fn decode_slot_refs(cursor: &mut Cursor<'_>) -> Result<Vec<PageReference>> {
    let count = cursor.read_u32()? as usize;
    let mut references = Vec::with_capacity(count);
    for _ in 0..count {
        references.push(PageReference::new(cursor.read_u64()?));
    }
    Ok(references)
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        ensure!(
            self.pos + len <= self.buf.len(),
            "truncated page body: need {} bytes at position {}, have {}",
            len,
            self.pos,
            self.buf.len()
        );
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NULL_ID;

    #[test]
    fn key_value_page_round_trips() {
        let mut page = KeyValuePage::new(3, 7);
        page.insert(Record::new(1537, b"value".to_vec()));
        page.insert(Record::deleted(1538));
        page.set_previous_reference(PageReference::new(4096));

        let frame = encode_page(&Page::new(PageBody::KeyValue(page)));
        let (decoded, consumed) = decode_page_at(&frame, 0).unwrap();
        assert_eq!(consumed, frame.len());

        let kv = decoded.as_key_value().unwrap();
        assert_eq!(kv.page_key(), 3);
        assert_eq!(kv.revision(), 7);
        assert_eq!(kv.previous_reference().unwrap().key(), 4096);
        assert_eq!(kv.value(1537).unwrap().value(), b"value");
        assert!(kv.value(1538).unwrap().is_deleted());
    }

    #[test]
    fn checksum_mismatch_is_a_decode_failure() {
        let page = Page::new(PageBody::Uber(UberPage::new(PageReference::new(64), 2)));
        let mut frame = encode_page(&page);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let err = decode_page_at(&frame, 0).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let page = Page::new(PageBody::Uber(UberPage::new(PageReference::new(64), 2)));
        let mut frame = encode_page(&page);
        frame[2] = 99;
        assert!(decode_page_at(&frame, 0).is_err());
    }

    #[test]
    fn name_page_round_trips_dictionaries() {
        let mut page = NamePage::new(vec![PageReference::new(10), PageReference::empty()]);
        page.set_name(1, NodeKind::Element, NameEntry::new("p".into(), 12));
        page.set_name(2, NodeKind::Attribute, NameEntry::new("id".into(), 4));

        let frame = encode_page(&Page::new(PageBody::Name(page)));
        let (decoded, _) = decode_page_at(&frame, 0).unwrap();
        let name = decoded.as_name().unwrap();
        assert_eq!(name.name(1, NodeKind::Element), Some("p"));
        assert_eq!(name.count(2, NodeKind::Attribute), 4);
        assert_eq!(name.indirect_reference(0).unwrap().key(), 10);
        assert_eq!(name.indirect_reference(1).unwrap().key(), NULL_ID);
    }
}
