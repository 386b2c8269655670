//! # Named Pages
//!
//! Each revision root points at four named pages. They all answer
//! `indirect_reference(index)`, the root of the subtree backing one
//! secondary-index slot; the name page additionally carries the name
//! dictionaries of the revision.

use hashbrown::HashMap;

use crate::page::{NodeKind, PageReference};

/// One entry of a name dictionary: the interned name and how many nodes
/// reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    name: String,
    count: u32,
}

impl NameEntry {
    pub fn new(name: String, count: u32) -> Self {
        Self { name, count }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Name page: per-kind name dictionaries plus one indirect reference per
/// name-index slot.
#[derive(Debug, Default)]
pub struct NamePage {
    references: Vec<PageReference>,
    names: HashMap<(NodeKind, u32), NameEntry>,
}

impl NamePage {
    pub fn new(references: Vec<PageReference>) -> Self {
        Self {
            references,
            names: HashMap::new(),
        }
    }

    pub fn indirect_reference(&self, index: i32) -> Option<&PageReference> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.references.get(index))
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }

    pub fn set_name(&mut self, key: u32, kind: NodeKind, entry: NameEntry) {
        self.names.insert((kind, key), entry);
    }

    pub fn name(&self, key: u32, kind: NodeKind) -> Option<&str> {
        self.names.get(&(kind, key)).map(NameEntry::name)
    }

    pub fn raw_name(&self, key: u32, kind: NodeKind) -> Option<&[u8]> {
        self.names
            .get(&(kind, key))
            .map(|entry| entry.name().as_bytes())
    }

    /// Number of nodes referencing the name, 0 for an unknown key.
    pub fn count(&self, key: u32, kind: NodeKind) -> u32 {
        self.names
            .get(&(kind, key))
            .map(NameEntry::count)
            .unwrap_or(0)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&(NodeKind, u32), &NameEntry)> {
        self.names.iter()
    }
}

/// Path page: one indirect reference per path-index slot.
#[derive(Debug, Default)]
pub struct PathPage {
    references: Vec<PageReference>,
}

impl PathPage {
    pub fn new(references: Vec<PageReference>) -> Self {
        Self { references }
    }

    pub fn indirect_reference(&self, index: i32) -> Option<&PageReference> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.references.get(index))
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }
}

/// CAS (content-and-structure) page: one indirect reference per CAS-index
/// slot.
#[derive(Debug, Default)]
pub struct CasPage {
    references: Vec<PageReference>,
}

impl CasPage {
    pub fn new(references: Vec<PageReference>) -> Self {
        Self { references }
    }

    pub fn indirect_reference(&self, index: i32) -> Option<&PageReference> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.references.get(index))
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }
}

/// Path summary page: one indirect reference per path-summary slot.
#[derive(Debug, Default)]
pub struct PathSummaryPage {
    references: Vec<PageReference>,
}

impl PathSummaryPage {
    pub fn new(references: Vec<PageReference>) -> Self {
        Self { references }
    }

    pub fn indirect_reference(&self, index: i32) -> Option<&PageReference> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.references.get(index))
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }
}
