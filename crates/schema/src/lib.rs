//! Table-name to file-number registry layered atop a [`trie::Trie`].
//!
//! Table entries live under the reserved key prefix `@ut`; the
//! monotonic counter that hands out new file numbers lives under the
//! single reserved key `@@@@LastFileNumber`. Both are ordinary trie
//! records — this crate contributes only the key-shape convention and
//! the idempotent lookup-or-create operation built on top of it.

use common::{DbError, DbResult};
use storage::Storage;
use trie::Trie;

const TABLE_PREFIX: &[u8] = b"@ut";
const LAST_FILE_NUMBER_KEY: &[u8] = b"@@@@LastFileNumber";

/// Borrows a trie handle and exposes the table-name registry over it.
pub struct Schema<'a, S: Storage> {
    trie: &'a mut Trie<S>,
}

impl<'a, S: Storage> Schema<'a, S> {
    pub fn new(trie: &'a mut Trie<S>) -> Self {
        Self { trie }
    }

    fn table_key(name: &str) -> Vec<u8> {
        let mut key = TABLE_PREFIX.to_vec();
        key.extend_from_slice(name.as_bytes());
        key
    }

    /// The last file number issued so far, or 0 if none has been issued yet.
    pub fn get_last_file_number(&mut self) -> DbResult<u64> {
        match self.trie.get_value(LAST_FILE_NUMBER_KEY)? {
            Some(bytes) => decode_counter(&bytes),
            None => Ok(0),
        }
    }

    /// Returns the file number for `name`, creating it with the next
    /// counter value if it does not already exist. Idempotent: a second
    /// call for the same name returns the same value without bumping the
    /// counter or the record count.
    pub fn get_file_name_or_create(&mut self, name: &str) -> DbResult<u64> {
        let key = Self::table_key(name);
        if let Some(existing) = self.trie.get_value(&key)? {
            return decode_counter(&existing);
        }
        let next = self.get_last_file_number()?.saturating_add(1);
        self.trie.set_key(LAST_FILE_NUMBER_KEY, &next.to_le_bytes())?;
        self.trie.set_key(&key, &next.to_le_bytes())?;
        Ok(next)
    }

    /// Table names whose `@ut`-prefixed key starts with `prefix`, in
    /// ascending order, with the `@ut` marker stripped.
    pub fn get_tables(&mut self, prefix: &str) -> DbResult<Vec<String>> {
        let mut search = TABLE_PREFIX.to_vec();
        search.extend_from_slice(prefix.as_bytes());
        let mut names = Vec::new();
        for row in self.trie.enumerate_start_with(&search)? {
            let row = row?;
            let suffix = row.key[TABLE_PREFIX.len()..].to_vec();
            let name = String::from_utf8(suffix)
                .map_err(|err| DbError::Schema(format!("non-utf8 table name: {err}")))?;
            names.push(name);
        }
        Ok(names)
    }
}

fn decode_counter(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Schema(format!("expected an 8-byte counter, got {} bytes", bytes.len())))?;
    Ok(u64::from_le_bytes(arr))
}

#[cfg(test)]
mod tests;
