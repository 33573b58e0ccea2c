
use std::io;
use thiserror::Error;

/// Canonical error type shared across the storage, buffer, trie, and schema
/// crates.
#[derive(Error, Debug)]
pub enum DbError {
    /// Corrupt on-disk state: bad tag byte, out-of-range pointer, child
    /// discriminants not sorted. Fatal — the handle that produced this
    /// must be discarded.
    #[error("corruption: {0}")]
    Corruption(String),
    /// A storage-level failure that is not I/O: out-of-bounds read/write,
    /// a page cache invariant violated, a consistency-check mismatch.
    #[error("storage: {0}")]
    Storage(String),
    /// Schema adapter failure (malformed `@ut`/`@@@@LastFileNumber` entry).
    #[error("schema: {0}")]
    Schema(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a [`DbError`].
pub type DbResult<T> = Result<T, DbError>;

/// A 64-bit byte offset into the backing storage. `0` is the sentinel for
/// "no pointer".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pointer(pub u64);

impl Pointer {
    /// The sentinel "absent" pointer.
    pub const NULL: Pointer = Pointer(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Logical identifier for a page in the page cache.
/// Examples:
/// - `let p = PageId(0); // first page of the file`
/// - `let p = PageId(7); // bytes [7*page_size, 8*page_size)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u64);

/// Tunables for the write-back page cache.
///
/// # Example
/// ```
/// use common::CacheConfig;
///
/// let cfg = CacheConfig::builder().page_size(128).build();
/// assert_eq!(cfg.page_size, 128);
/// ```
#[derive(Clone, Copy, Debug, bon::Builder)]
pub struct CacheConfig {
    /// Fixed page size in bytes. Default 8192; tests shrink this to
    /// exercise multi-page boundaries cheaply.
    #[builder(default = 8192)]
    pub page_size: usize,
    /// Optional bound on resident pages. `None` means the no-eviction
    /// policy: pages are retained until flush.
    pub max_resident_pages: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: 8192,
            max_resident_pages: None,
        }
    }
}

/// Tunables for the trie engine's slack/relocation policy and its
/// after-write verification.
///
/// # Example
/// ```
/// use common::TrieConfig;
///
/// let cfg = TrieConfig::builder().consistency_check(true).build();
/// assert!(cfg.consistency_check);
/// ```
#[derive(Clone, Copy, Debug, bon::Builder)]
pub struct TrieConfig {
    /// Initial child slot capacity reserved on a freshly relocated
    /// internal node (doubled on each further relocation). Default 4.
    #[builder(default = 4)]
    pub initial_child_capacity: u16,
    /// Numerator/denominator-free ratio: initial leaf value slack is
    /// `value_len * initial_value_slack_permille / 1000`, with a floor
    /// of `min_value_slack` bytes so short values still get room to grow.
    #[builder(default = 250)]
    pub initial_value_slack_permille: u32,
    #[builder(default = 8)]
    pub min_value_slack: u32,
    /// When set, every `SetKey` re-reads the record it just wrote and
    /// fails fatally if it cannot be retrieved with the stored value.
    #[builder(default = false)]
    pub consistency_check: bool,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            initial_child_capacity: 4,
            initial_value_slack_permille: 250,
            min_value_slack: 8,
            consistency_check: false,
        }
    }
}
