//! # Sediment Format Constants
//!
//! This module centralizes the constants fixed by the on-disk format and the
//! cache configuration of the read path. Constants that depend on each other
//! are co-located and guarded by compile-time assertions so a change to one
//! cannot silently invalidate another.
//!
//! ## Trie Shape
//!
//! Every page kind is addressed through a fixed-height radix trie of indirect
//! pages. The per-level shift exponents define both the height of the trie
//! and the fan-out consumed at each level:
//!
//! ```text
//! INP_REFERENCE_COUNT (512 = 1 << 9)
//!       │
//!       ├─> INP_LEVEL_PAGE_COUNT_EXPONENT [36, 27, 18, 9, 0]
//!       │     Record, name, path, CAS and revision (uber) tries: height 5,
//!       │     addressable key space 2^45. Each level consumes 9 bits.
//!       │
//!       └─> PATH_SUMMARY_LEVEL_PAGE_COUNT_EXPONENT [18, 9, 0]
//!             Path-summary trie: height 3, key space 2^27. Path summaries
//!             are tiny compared to record storage.
//!
//! NDP_NODE_COUNT (512 = 1 << 9)
//!       │
//!       └─> page key = record key >> NDP_NODE_COUNT_EXPONENT
//!           A leaf record page is saturated at NDP_NODE_COUNT records;
//!           reconstruction never reads past a saturated fragment.
//! ```

// ============================================================================
// LEAF RECORD PAGES
// Capacity and the record-key -> page-key derivation must agree
// ============================================================================

/// Number of records a leaf record page can hold.
pub const NDP_NODE_COUNT: usize = 512;

/// Shift applied to a record key to obtain its logical page key.
pub const NDP_NODE_COUNT_EXPONENT: u64 = 9;

const _: () = assert!(
    NDP_NODE_COUNT == 1 << NDP_NODE_COUNT_EXPONENT,
    "NDP_NODE_COUNT must equal 1 << NDP_NODE_COUNT_EXPONENT"
);

// ============================================================================
// INDIRECT PAGES
// Fan-out, its shift, and the per-kind level exponent tables
// ============================================================================

/// Fan-out of an indirect page: the fixed number of child references.
pub const INP_REFERENCE_COUNT: usize = 512;

/// Shift matching the indirect-page fan-out; multiplier in log-key positions.
pub const INP_REFERENCE_COUNT_EXPONENT: u64 = 9;

/// Per-level shifts for the record, name, path, CAS and revision tries.
/// The array length is the trie height.
pub const INP_LEVEL_PAGE_COUNT_EXPONENT: [u64; 5] = [36, 27, 18, 9, 0];

/// Per-level shifts for the path-summary trie.
pub const PATH_SUMMARY_LEVEL_PAGE_COUNT_EXPONENT: [u64; 3] = [18, 9, 0];

const _: () = assert!(
    INP_REFERENCE_COUNT == 1 << INP_REFERENCE_COUNT_EXPONENT,
    "INP_REFERENCE_COUNT must equal 1 << INP_REFERENCE_COUNT_EXPONENT"
);

const _: () = {
    let exps = INP_LEVEL_PAGE_COUNT_EXPONENT;
    let mut i = 0;
    while i + 1 < exps.len() {
        assert!(
            exps[i] == exps[i + 1] + INP_REFERENCE_COUNT_EXPONENT,
            "level exponents must descend in fan-out steps"
        );
        i += 1;
    }
    assert!(
        exps[exps.len() - 1] == 0,
        "last level must consume the remaining bits"
    );
};

const _: () = {
    let exps = PATH_SUMMARY_LEVEL_PAGE_COUNT_EXPONENT;
    let mut i = 0;
    while i + 1 < exps.len() {
        assert!(
            exps[i] == exps[i + 1] + INP_REFERENCE_COUNT_EXPONENT,
            "path summary level exponents must descend in fan-out steps"
        );
        i += 1;
    }
    assert!(
        exps[exps.len() - 1] == 0,
        "last level must consume the remaining bits"
    );
};

// ============================================================================
// SENTINELS
// ============================================================================

/// Sentinel for "no persistent page": a reference whose key equals `NULL_ID`
/// has never been written to the data file.
pub const NULL_ID: u64 = u64::MAX;

/// Sentinel for "no record".
pub const NULL_NODE_KEY: u64 = u64::MAX;

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Maximum number of record-page containers cached per transaction.
pub const TRX_RECORD_PAGE_CACHE_CAPACITY: usize = 10_000;

/// Idle and total time-to-live for per-transaction container cache entries,
/// in seconds.
pub const TRX_RECORD_PAGE_CACHE_TTL_SECS: u64 = 5_000;

/// Entry capacity of the shared (resource-wide) page cache.
pub const BUFFER_PAGE_CACHE_CAPACITY: usize = 4_096;

/// Entry capacity of the shared (resource-wide) record-page cache.
pub const BUFFER_RECORD_PAGE_CACHE_CAPACITY: usize = 1_024;

/// Number of lock shards in each shared cache.
pub const BUFFER_CACHE_SHARD_COUNT: usize = 8;

const _: () = assert!(
    BUFFER_PAGE_CACHE_CAPACITY >= BUFFER_CACHE_SHARD_COUNT
        && BUFFER_RECORD_PAGE_CACHE_CAPACITY >= BUFFER_CACHE_SHARD_COUNT,
    "each cache shard needs at least one entry"
);

// ============================================================================
// RESOURCE FILE LAYOUT
// ============================================================================

/// Name of the append-only data file inside the resource directory.
pub const DATA_FILE_NAME: &str = "sediment.data";

/// Marker file written by a write transaction before its log is merged into
/// the data file. Its presence enables both transaction-log overlays.
pub const COMMIT_FILE_NAME: &str = ".commit";

/// Stem of the on-disk transaction log files; the writer maintains one file
/// per log, distinguished by suffix.
pub const TRX_LOG_FILE_STEM: &str = "trx_log";

/// Suffix of the transaction log holding arbitrary pages by indirect log key.
pub const TRX_LOG_PAGE_SUFFIX: &str = "page";

/// Suffix of the transaction log holding record-page containers.
pub const TRX_LOG_NODE_SUFFIX: &str = "node";

/// Directory holding per-revision index definition files.
pub const INDEXES_DIRECTORY: &str = "INDEXES";
