use super::*;
use common::{CacheConfig, TrieConfig};
use pretty_assertions::assert_eq;
use storage::FileStorage;
use tempfile::tempdir;

fn open_trie(path: &std::path::Path) -> Trie<FileStorage> {
    let storage = FileStorage::open(path).unwrap();
    Trie::open(storage, CacheConfig::default(), TrieConfig::default()).unwrap()
}

#[test]
fn get_file_name_or_create_is_idempotent_and_monotonic() {
    let dir = tempdir().unwrap();
    let mut trie = open_trie(&dir.path().join("t.bin"));
    let mut schema = Schema::new(&mut trie);

    let first = schema.get_file_name_or_create("IndexProgress").unwrap();
    let second = schema.get_file_name_or_create("IndexProgress").unwrap();
    assert_eq!(first, second);

    let other = schema.get_file_name_or_create("NotExists").unwrap();
    assert_ne!(first, other);
    assert_eq!(schema.get_last_file_number().unwrap(), other.max(first));
}

#[test]
fn get_file_name_or_create_does_not_bump_record_count_on_repeat_lookup() {
    let dir = tempdir().unwrap();
    let mut trie = open_trie(&dir.path().join("t.bin"));
    {
        let mut schema = Schema::new(&mut trie);
        schema.get_file_name_or_create("users").unwrap();
    }
    let count_after_first = trie.record_count();
    {
        let mut schema = Schema::new(&mut trie);
        schema.get_file_name_or_create("users").unwrap();
    }
    assert_eq!(trie.record_count(), count_after_first);
}

#[test]
fn get_last_file_number_is_zero_before_any_table_is_registered() {
    let dir = tempdir().unwrap();
    let mut trie = open_trie(&dir.path().join("t.bin"));
    let mut schema = Schema::new(&mut trie);
    assert_eq!(schema.get_last_file_number().unwrap(), 0);
}

#[test]
fn get_tables_enumerates_in_ascending_order_by_prefix() {
    let dir = tempdir().unwrap();
    let mut trie = open_trie(&dir.path().join("t.bin"));
    let mut schema = Schema::new(&mut trie);
    for name in ["TestTa", "TestTb", "TestTc", "TestTd", "Other"] {
        schema.get_file_name_or_create(name).unwrap();
    }

    let all_test = schema.get_tables("TestT").unwrap();
    assert_eq!(all_test, vec!["TestTa", "TestTb", "TestTc", "TestTd"]);

    let narrower = schema.get_tables("TestTa").unwrap();
    assert_eq!(narrower, vec!["TestTa"]);

    let everything = schema.get_tables("").unwrap();
    assert_eq!(everything.len(), 5);
}

#[test]
fn schema_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.bin");
    let issued;
    {
        let mut trie = open_trie(&path);
        let mut schema = Schema::new(&mut trie);
        issued = schema.get_file_name_or_create("orders").unwrap();
        trie.flush().unwrap();
    }
    let mut reopened = open_trie(&path);
    let mut schema = Schema::new(&mut reopened);
    assert_eq!(schema.get_file_name_or_create("orders").unwrap(), issued);
}
