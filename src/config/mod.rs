//! # Resource Configuration
//!
//! A resource is one versioned store on disk: an append-only data file, an
//! optional pair of transaction-log files, and a directory of per-revision
//! index definitions. `ResourceConfig` captures the location of the resource
//! and the versioning policy used to reconstruct pages, and derives every
//! path the read path touches so no component concatenates file names on its
//! own.

pub mod constants;

pub use constants::*;

use std::path::{Path, PathBuf};

use eyre::{ensure, Result};

use crate::versioning::VersioningKind;

/// Configuration of one resource, shared by every transaction opened on it.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    path: PathBuf,
    revisions_to_restore: u32,
    revision_kind: VersioningKind,
}

impl ResourceConfig {
    /// Creates a configuration rooted at `path`.
    ///
    /// `revisions_to_restore` bounds the number of page fragments read during
    /// reconstruction and must be at least 1.
    pub fn new<P: AsRef<Path>>(
        path: P,
        revision_kind: VersioningKind,
        revisions_to_restore: u32,
    ) -> Result<Self> {
        ensure!(
            revisions_to_restore >= 1,
            "revisions_to_restore must be >= 1, got {}",
            revisions_to_restore
        );
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            revisions_to_restore,
            revision_kind,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn revisions_to_restore(&self) -> u32 {
        self.revisions_to_restore
    }

    pub fn revision_kind(&self) -> VersioningKind {
        self.revision_kind
    }

    /// The append-only data file.
    pub fn data_file(&self) -> PathBuf {
        self.path.join(DATA_FILE_NAME)
    }

    /// Marker file signalling an unmerged writer transaction log.
    pub fn commit_file(&self) -> PathBuf {
        self.path.join(COMMIT_FILE_NAME)
    }

    /// One of the two on-disk transaction log files, by suffix.
    pub fn trx_log_file(&self, suffix: &str) -> PathBuf {
        self.path.join(format!("{TRX_LOG_FILE_STEM}.{suffix}"))
    }

    /// Index definitions serialized for `revision`.
    pub fn index_definitions_file(&self, revision: u32) -> PathBuf {
        self.path
            .join(INDEXES_DIRECTORY)
            .join(format!("{revision}.xml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_revisions_to_restore() {
        let result = ResourceConfig::new("/tmp/r", VersioningKind::Full, 0);
        assert!(result.is_err());
    }

    #[test]
    fn derives_resource_paths() {
        let config = ResourceConfig::new("/tmp/r", VersioningKind::Incremental, 4).unwrap();
        assert_eq!(config.data_file(), PathBuf::from("/tmp/r/sediment.data"));
        assert_eq!(config.commit_file(), PathBuf::from("/tmp/r/.commit"));
        assert_eq!(
            config.trx_log_file(TRX_LOG_PAGE_SUFFIX),
            PathBuf::from("/tmp/r/trx_log.page")
        );
        assert_eq!(
            config.index_definitions_file(3),
            PathBuf::from("/tmp/r/INDEXES/3.xml")
        );
    }

    #[test]
    fn page_key_shift_matches_leaf_capacity() {
        assert_eq!(1u64 << NDP_NODE_COUNT_EXPONENT, NDP_NODE_COUNT as u64);
        assert_eq!(1023u64 >> NDP_NODE_COUNT_EXPONENT, 1);
        assert_eq!(511u64 >> NDP_NODE_COUNT_EXPONENT, 0);
    }
}
