use super::*;
use storage::FileStorage;
use tempfile::tempdir;

fn cache_with_page_size(path: &std::path::Path, page_size: usize) -> Cache<FileStorage> {
    let storage = FileStorage::open(path).unwrap();
    Cache::new(storage, CacheConfig::builder().page_size(page_size).build()).unwrap()
}

/// Cache read-through across a page boundary.
#[test]
fn read_through_touches_expected_pages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");

    {
        let mut storage = FileStorage::open(&path).unwrap();
        storage.reserve(1030).unwrap();
        storage.write(125, b"abcdefgh").unwrap();
        storage.flush().unwrap();
    }

    let mut cache = cache_with_page_size(&path, 128);
    let (first, last) = page_span(128, 125, 8);
    assert_eq!(first, PageId(0));
    assert_eq!(last, PageId(1));

    let mut buf = [0u8; 8];
    cache.read(125, &mut buf).unwrap();
    assert_eq!(&buf, b"abcdefgh");
}

/// Cache write-back leaves storage untouched until flush, then both
/// agree.
#[test]
fn write_back_defers_to_storage_until_flush() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");

    {
        let mut storage = FileStorage::open(&path).unwrap();
        storage.reserve(1030).unwrap();
        storage.write(125, b"abcdefgh").unwrap();
        storage.flush().unwrap();
    }

    let mut cache = cache_with_page_size(&path, 128);
    cache.write(127, b"CDEF").unwrap();

    let mut cached = [0u8; 8];
    cache.read(125, &mut cached).unwrap();
    assert_eq!(&cached, b"abCDEFgh");

    let mut on_disk = [0u8; 8];
    {
        let mut direct = FileStorage::open(&path).unwrap();
        direct.read(125, &mut on_disk).unwrap();
    }
    assert_eq!(&on_disk, b"abcdefgh");

    cache.flush().unwrap();
    let mut direct = FileStorage::open(&path).unwrap();
    direct.read(125, &mut on_disk).unwrap();
    assert_eq!(&on_disk, b"abCDEFgh");
}

/// write_to_end advances the cache's logical length ahead of the
/// backing storage until flush.
#[test]
fn write_to_end_advances_logical_length_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");

    {
        let mut storage = FileStorage::open(&path).unwrap();
        storage.reserve(1030).unwrap();
        storage.flush().unwrap();
    }

    let mut cache = cache_with_page_size(&path, 128);
    cache.write_to_end(b"helloworld").unwrap();
    cache.write_to_end(b"abdwuqiwiw").unwrap();

    assert_eq!(cache.length(), 1050);
    let direct_len = FileStorage::open(&path).unwrap().length().unwrap();
    assert_eq!(direct_len, 1030);

    cache.flush().unwrap();
    let mut direct = FileStorage::open(&path).unwrap();
    assert_eq!(direct.length().unwrap(), 1050);
    let mut tail = [0u8; 20];
    direct.read(1030, &mut tail).unwrap();
    assert_eq!(&tail, b"helloworldabdwuqiwiw");
}

#[test]
fn reserve_extends_length_and_zero_fills() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");
    let mut cache = cache_with_page_size(&path, 64);

    cache.write(0, b"xy").unwrap();
    let start = cache.reserve(10).unwrap();
    assert_eq!(start, 2);
    assert_eq!(cache.length(), 12);

    let mut tail = [0u8; 10];
    cache.read(2, &mut tail).unwrap();
    assert_eq!(tail, [0u8; 10]);
}

#[test]
fn read_without_dirty_pages_matches_storage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");
    {
        let mut storage = FileStorage::open(&path).unwrap();
        storage.write(0, b"steady state payload").unwrap();
        storage.flush().unwrap();
    }

    let mut cache = cache_with_page_size(&path, 8);
    let mut from_cache = [0u8; 20];
    cache.read(0, &mut from_cache).unwrap();

    let mut direct = FileStorage::open(&path).unwrap();
    let mut from_storage = [0u8; 20];
    direct.read(0, &mut from_storage).unwrap();

    assert_eq!(from_cache, from_storage);
}

#[test]
fn bounded_cache_flushes_dirty_page_on_eviction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");
    let storage = FileStorage::open(&path).unwrap();
    let mut cache = Cache::new(
        storage,
        CacheConfig::builder().page_size(16).max_resident_pages(1).build(),
    )
    .unwrap();

    cache.write(0, b"first-page-bytes").unwrap(); // spans into page 1 too
    cache.write(64, b"second").unwrap(); // forces eviction of page 0's page(s)

    cache.flush().unwrap();
    let mut direct = FileStorage::open(&path).unwrap();
    let mut buf = [0u8; 6];
    direct.read(64, &mut buf).unwrap();
    assert_eq!(&buf, b"second");
}

#[test]
fn read_past_logical_length_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");
    let mut cache = cache_with_page_size(&path, 32);
    cache.write(0, b"abc").unwrap();

    let mut buf = [0u8; 4];
    let err = cache.read(0, &mut buf).unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));
}
