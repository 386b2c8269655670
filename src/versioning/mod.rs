//! # Versioning Policies
//!
//! A versioning policy decides two things and nothing else:
//!
//! 1. which prior revisions contribute fragments when a page is
//!    reconstructed at revision `r` (`revision_roots`), and
//! 2. how the collected fragments fuse into one complete page
//!    (`combine_record_pages`).
//!
//! The snapshot reconstructor is oblivious to the concrete policy: it walks
//! the `previous_reference` chain for as many revisions as the policy names,
//! stopping early at an absent reference or a saturated fragment.
//!
//! ## Policies
//!
//! | Policy            | Fragment written per revision      | Fragments read |
//! |-------------------|------------------------------------|----------------|
//! | `Full`            | the complete page                  | 1              |
//! | `Differential`    | all changes since the last dump    | ≤ 2            |
//! | `Incremental`     | only that revision's changes       | ≤ restore      |
//! | `SlidingSnapshot` | changes + records leaving the window | ≤ restore    |
//!
//! `Differential` and `Incremental` write a full dump every
//! `revisions_to_restore` revisions; revision 0 (the empty bootstrap) counts
//! as the first dump.

use eyre::{bail, Result};
use smallvec::SmallVec;

use crate::page::KeyValuePage;

/// Fragment list collected by the reconstructor, newest first.
pub type Fragments = SmallVec<[KeyValuePage; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningKind {
    /// Every revision stores the complete page.
    Full,
    /// Diff against the last full dump.
    Differential,
    /// Per-revision deltas back to the last full dump.
    Incremental,
    /// Sliding window of the last `revisions_to_restore` revisions.
    SlidingSnapshot,
}

impl VersioningKind {
    /// Ordered list of revisions whose fragments may contribute to the page
    /// at `revision`, newest first.
    pub fn revision_roots(&self, revision: u32, revisions_to_restore: u32) -> Vec<u32> {
        debug_assert!(revisions_to_restore >= 1);
        match self {
            VersioningKind::Full => vec![revision],
            VersioningKind::Differential => {
                let dump = revision - revision % revisions_to_restore;
                if dump == revision {
                    vec![revision]
                } else {
                    vec![revision, dump]
                }
            }
            VersioningKind::Incremental => {
                let dump = revision - revision % revisions_to_restore;
                (dump..=revision).rev().collect()
            }
            VersioningKind::SlidingSnapshot => {
                let lower = revision.saturating_sub(revisions_to_restore - 1);
                (lower..=revision).rev().collect()
            }
        }
    }

    /// Fuses the collected fragments (newest first) into one complete page.
    ///
    /// Newer fragments win per record key; older fragments only fill keys
    /// the newer ones did not touch. `Full` fragments are complete already.
    pub fn combine_record_pages(
        &self,
        fragments: Fragments,
        _revisions_to_restore: u32,
    ) -> Result<KeyValuePage> {
        let mut iter = fragments.into_iter();
        let Some(mut complete) = iter.next() else {
            bail!("cannot combine an empty fragment list");
        };
        if matches!(self, VersioningKind::Full) {
            return Ok(complete);
        }
        for fragment in iter {
            for record in fragment.into_records() {
                complete.insert_if_absent(record);
            }
        }
        Ok(complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Record;
    use smallvec::smallvec;

    #[test]
    fn full_reads_a_single_revision() {
        assert_eq!(VersioningKind::Full.revision_roots(7, 4), vec![7]);
    }

    #[test]
    fn differential_reads_revision_and_last_dump() {
        assert_eq!(
            VersioningKind::Differential.revision_roots(7, 4),
            vec![7, 4]
        );
        assert_eq!(VersioningKind::Differential.revision_roots(4, 4), vec![4]);
        assert_eq!(VersioningKind::Differential.revision_roots(0, 4), vec![0]);
    }

    #[test]
    fn incremental_walks_back_to_the_last_dump() {
        assert_eq!(
            VersioningKind::Incremental.revision_roots(3, 4),
            vec![3, 2, 1, 0]
        );
        assert_eq!(
            VersioningKind::Incremental.revision_roots(6, 4),
            vec![6, 5, 4]
        );
        assert_eq!(VersioningKind::Incremental.revision_roots(4, 4), vec![4]);
    }

    #[test]
    fn sliding_snapshot_covers_the_window() {
        assert_eq!(
            VersioningKind::SlidingSnapshot.revision_roots(9, 4),
            vec![9, 8, 7, 6]
        );
        assert_eq!(
            VersioningKind::SlidingSnapshot.revision_roots(1, 4),
            vec![1, 0]
        );
    }

    fn fragment(revision: u32, records: &[(u64, &str)]) -> KeyValuePage {
        let mut page = KeyValuePage::new(0, revision);
        for (key, value) in records {
            page.insert(Record::new(*key, value.as_bytes().to_vec()));
        }
        page
    }

    #[test]
    fn union_fusion_prefers_newer_fragments() {
        let fragments: Fragments = smallvec![
            fragment(3, &[(1, "one-v3")]),
            fragment(2, &[(3, "three")]),
            fragment(1, &[(0, "zero"), (1, "one"), (2, "two")]),
        ];
        let complete = VersioningKind::Incremental
            .combine_record_pages(fragments, 4)
            .unwrap();
        assert_eq!(complete.size(), 4);
        assert_eq!(complete.value(1).unwrap().value(), b"one-v3");
        assert_eq!(complete.value(0).unwrap().value(), b"zero");
        assert_eq!(complete.value(3).unwrap().value(), b"three");
    }

    #[test]
    fn full_fusion_keeps_only_the_newest_fragment() {
        let fragments: Fragments = smallvec![
            fragment(2, &[(0, "new")]),
            fragment(1, &[(0, "old"), (1, "stale")]),
        ];
        let complete = VersioningKind::Full
            .combine_record_pages(fragments, 1)
            .unwrap();
        assert_eq!(complete.size(), 1);
        assert_eq!(complete.value(0).unwrap().value(), b"new");
    }

    #[test]
    fn combining_nothing_is_an_error() {
        let fragments: Fragments = smallvec![];
        assert!(VersioningKind::Incremental
            .combine_record_pages(fragments, 4)
            .is_err());
    }

    #[test]
    fn deletion_tombstones_mask_older_values() {
        let mut newest = KeyValuePage::new(0, 2);
        newest.insert(Record::deleted(17));
        let fragments: Fragments = smallvec![newest, fragment(1, &[(17, "alive")])];
        let complete = VersioningKind::Incremental
            .combine_record_pages(fragments, 4)
            .unwrap();
        assert!(complete.value(17).unwrap().is_deleted());
    }
}
