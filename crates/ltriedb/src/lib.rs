//! Single-file facade tying the byte store, page cache, trie engine, and
//! table-name registry together behind one handle.

use std::path::Path;

use common::{CacheConfig, DbResult, TrieConfig};
use schema::Schema;
use storage::FileStorage;
use trie::{BestMatch, Enumerator, Row, Trie};

/// An open LTrie-backed key-value file.
pub struct LTrieDb {
    trie: Trie<FileStorage>,
}

impl LTrieDb {
    /// Open an existing file or create a fresh one at `path`, initializing
    /// the root record and generation node if the file is empty.
    pub fn open(path: impl AsRef<Path>, cache_config: CacheConfig, trie_config: TrieConfig) -> DbResult<Self> {
        let storage = FileStorage::open(path)?;
        let trie = Trie::open(storage, cache_config, trie_config)?;
        Ok(Self { trie })
    }

    pub fn get(&mut self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.trie.get_value(key)
    }

    pub fn get_row(&mut self, key: &[u8]) -> DbResult<Option<Row>> {
        self.trie.get_row(key)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.trie.set_key(key, value)
    }

    pub fn delete(&mut self, key: &[u8]) -> DbResult<bool> {
        self.trie.delete_key(key)
    }

    pub fn find_best_match(&mut self, needle: &[u8]) -> DbResult<BestMatch> {
        self.trie.find_best_match(needle)
    }

    pub fn enumerate_start_with(&mut self, prefix: &[u8]) -> DbResult<Enumerator<'_, FileStorage>> {
        self.trie.enumerate_start_with(prefix)
    }

    pub fn record_count(&self) -> u64 {
        self.trie.record_count()
    }

    pub fn flush(&mut self) -> DbResult<()> {
        self.trie.flush()
    }

    /// The table-name registry layered atop this same trie handle.
    pub fn schema(&mut self) -> Schema<'_, FileStorage> {
        Schema::new(&mut self.trie)
    }
}
