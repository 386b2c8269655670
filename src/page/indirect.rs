//! Indirect pages: one level of a per-kind radix trie, a fixed fan-out
//! vector of page references.

use crate::config::INP_REFERENCE_COUNT;
use crate::page::PageReference;

#[derive(Debug)]
pub struct IndirectPage {
    references: Vec<PageReference>,
}

impl IndirectPage {
    /// A fresh level with all `INP_REFERENCE_COUNT` slots unset.
    pub fn new() -> Self {
        let references = (0..INP_REFERENCE_COUNT)
            .map(|_| PageReference::empty())
            .collect();
        Self { references }
    }

    pub fn from_references(references: Vec<PageReference>) -> Self {
        Self { references }
    }

    /// Child reference at `offset`, or `None` when the offset exceeds the
    /// fan-out. The navigator turns that into the "key too big" error.
    pub fn reference(&self, offset: u64) -> Option<&PageReference> {
        self.references.get(offset as usize)
    }

    pub fn set_reference(&mut self, offset: usize, reference: PageReference) {
        self.references[offset] = reference;
    }

    pub fn references(&self) -> &[PageReference] {
        &self.references
    }
}

impl Default for IndirectPage {
    fn default() -> Self {
        Self::new()
    }
}
