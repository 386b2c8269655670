//! # Leaf Record Pages
//!
//! A `KeyValuePage` is one *fragment*: the slice of a logical record page as
//! persisted at one specific revision. Depending on the versioning policy a
//! fragment holds the complete page, only the records that changed in its
//! revision, or anything in between. Fragments of the same logical page are
//! chained older-ward through `previous_reference`; the chain terminates at
//! an absent reference and never cycles.
//!
//! A fragment holding `NDP_NODE_COUNT` records is *saturated*: no older
//! fragment can contribute a record the saturated one does not already have,
//! so reconstruction stops there.

use std::collections::BTreeMap;

use crate::config::NDP_NODE_COUNT;
use crate::page::{PageReference, Record};

#[derive(Debug, Clone)]
pub struct KeyValuePage {
    page_key: u64,
    revision: u32,
    previous_reference: Option<PageReference>,
    records: BTreeMap<u64, Record>,
}

impl KeyValuePage {
    pub fn new(page_key: u64, revision: u32) -> Self {
        Self {
            page_key,
            revision,
            previous_reference: None,
            records: BTreeMap::new(),
        }
    }

    /// Logical identifier: `record key >> NDP_NODE_COUNT_EXPONENT`.
    pub fn page_key(&self) -> u64 {
        self.page_key
    }

    /// Revision this fragment was persisted at.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn previous_reference(&self) -> Option<&PageReference> {
        self.previous_reference.as_ref()
    }

    pub fn set_previous_reference(&mut self, reference: PageReference) {
        self.previous_reference = Some(reference);
    }

    pub fn value(&self, record_key: u64) -> Option<&Record> {
        self.records.get(&record_key)
    }

    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.key(), record);
    }

    /// Used by fragment fusion: newer fragments win, older ones only fill
    /// keys the newer ones did not touch.
    pub fn insert_if_absent(&mut self, record: Record) {
        self.records.entry(record.key()).or_insert(record);
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= NDP_NODE_COUNT
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn into_records(self) -> impl Iterator<Item = Record> {
        self.records.into_values()
    }
}
