//! # Records
//!
//! A record is the unit stored in leaf record pages: a key, a kind tag and an
//! opaque value. The document model above the record layer decides what the
//! value bytes mean; the read path only distinguishes live records from the
//! deleted sentinel, which masks older versions of the same key during
//! reconstruction and is never reported to callers.

use eyre::{bail, Result};

/// Kind tag of a record. `Deleted` is the tombstone a writer leaves in a
/// fragment to mask the record in all older fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Data = 1,
    Deleted = 2,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordKind::Data),
            2 => Ok(RecordKind::Deleted),
            other => bail!("unknown record kind tag {}", other),
        }
    }
}

/// Node kinds with a name dictionary on the name page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    Element = 1,
    Attribute = 2,
    Namespace = 3,
    ProcessingInstruction = 4,
}

impl NodeKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(NodeKind::Element),
            2 => Ok(NodeKind::Attribute),
            3 => Ok(NodeKind::Namespace),
            4 => Ok(NodeKind::ProcessingInstruction),
            other => bail!("unknown node kind tag {}", other),
        }
    }
}

/// One record as stored in a leaf record page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: u64,
    kind: RecordKind,
    value: Vec<u8>,
}

impl Record {
    pub fn new(key: u64, value: Vec<u8>) -> Self {
        Self {
            key,
            kind: RecordKind::Data,
            value,
        }
    }

    /// The tombstone masking `key`.
    pub fn deleted(key: u64) -> Self {
        Self {
            key,
            kind: RecordKind::Deleted,
            value: Vec::new(),
        }
    }

    pub fn with_kind(key: u64, kind: RecordKind, value: Vec<u8>) -> Self {
        Self { key, kind, value }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_deleted(&self) -> bool {
        self.kind == RecordKind::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_record_is_a_tombstone() {
        let record = Record::deleted(17);
        assert!(record.is_deleted());
        assert!(record.value().is_empty());
        assert_eq!(record.key(), 17);
    }

    #[test]
    fn record_kind_round_trips_through_tag() {
        assert_eq!(RecordKind::from_u8(1).unwrap(), RecordKind::Data);
        assert_eq!(RecordKind::from_u8(2).unwrap(), RecordKind::Deleted);
        assert!(RecordKind::from_u8(9).is_err());
    }
}
