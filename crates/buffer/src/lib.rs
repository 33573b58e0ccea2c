//! Write-back page cache over [`storage::Storage`].
//!
//! The cache decomposes every read/write into page-aligned slices,
//! services them from an in-memory page map, and defers all writes to
//! the backing storage until [`Cache::flush`]. No eviction happens
//! unless the caller opts into a bound via
//! [`common::CacheConfig::max_resident_pages`] — the core policy is to
//! retain every touched page until flush.

#[cfg(test)]
mod tests;

use common::{CacheConfig, DbError, DbResult, PageId};
use hashbrown::HashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use storage::Storage;

struct CachedPage {
    data: Vec<u8>,
    dirty: bool,
}

/// A write-back cache decomposing a [`Storage`] into fixed-size pages.
pub struct Cache<S: Storage> {
    storage: S,
    page_size: usize,
    pages: HashMap<u64, CachedPage>,
    /// Logical length, which may exceed the backing storage's length
    /// until the next [`Cache::flush`].
    length: u64,
    recency: Option<LruCache<u64, ()>>,
}

impl<S: Storage> Cache<S> {
    /// Wrap `storage` in a cache using `config`'s page size and
    /// (optional) resident-page bound.
    pub fn new(storage: S, config: CacheConfig) -> DbResult<Self> {
        let length = storage.length()?;
        let recency = config
            .max_resident_pages
            .map(|n| LruCache::new(NonZeroUsize::new(n.max(1)).unwrap()));
        Ok(Self {
            storage,
            page_size: config.page_size,
            pages: HashMap::new(),
            length,
            recency,
        })
    }

    /// Current logical length — `>= storage.length()`, with equality
    /// immediately after [`Cache::flush`].
    pub fn length(&self) -> u64 {
        self.length
    }

    fn page_index(&self, offset: u64) -> u64 {
        offset / self.page_size as u64
    }

    fn page_start(&self, index: u64) -> u64 {
        index * self.page_size as u64
    }

    /// Ensure `index` is resident, loading it from the backing storage
    /// (short read allowed past the backing length) if absent.
    fn ensure_loaded(&mut self, index: u64) -> DbResult<()> {
        if self.pages.contains_key(&index) {
            return Ok(());
        }
        self.evict_if_needed()?;

        let start = self.page_start(index);
        let backing_len = self.storage.length()?;
        let mut data = vec![0u8; self.page_size];
        if start < backing_len {
            let readable = (backing_len - start).min(self.page_size as u64) as usize;
            self.storage.read(start, &mut data[..readable])?;
        }
        self.pages.insert(index, CachedPage { data, dirty: false });
        Ok(())
    }

    fn touch(&mut self, index: u64) {
        if let Some(recency) = &mut self.recency {
            recency.put(index, ());
        }
    }

    fn evict_if_needed(&mut self) -> DbResult<()> {
        let Some(recency) = &mut self.recency else {
            return Ok(());
        };
        if self.pages.len() < recency.cap().get() {
            return Ok(());
        }
        if let Some((index, _)) = recency.pop_lru()
            && let Some(page) = self.pages.remove(&index)
            && page.dirty
        {
            let start = self.page_start(index);
            let write_len = (self.length.saturating_sub(start) as usize).min(page.data.len());
            self.storage.write(start, &page.data[..write_len])?;
        }
        Ok(())
    }

    /// Fill `dest` from `[offset, offset + dest.len())`.
    pub fn read(&mut self, offset: u64, dest: &mut [u8]) -> DbResult<()> {
        let end = offset
            .checked_add(dest.len() as u64)
            .ok_or_else(|| DbError::Storage("read range overflows u64".into()))?;
        if end > self.length {
            return Err(DbError::Storage(format!(
                "read [{offset}, {end}) exceeds cache length {}",
                self.length
            )));
        }

        let mut pos = offset;
        let mut written = 0usize;
        while pos < end {
            let index = self.page_index(pos);
            self.ensure_loaded(index)?;
            self.touch(index);

            let page_off = (pos - self.page_start(index)) as usize;
            let chunk = ((end - pos) as usize).min(self.page_size - page_off);
            let page = &self.pages[&index];
            dest[written..written + chunk].copy_from_slice(&page.data[page_off..page_off + chunk]);

            pos += chunk as u64;
            written += chunk;
        }
        Ok(())
    }

    /// Write `src` starting at `offset`, marking every touched page
    /// dirty and extending the logical length as needed.
    pub fn write(&mut self, offset: u64, src: &[u8]) -> DbResult<()> {
        let end = offset
            .checked_add(src.len() as u64)
            .ok_or_else(|| DbError::Storage("write range overflows u64".into()))?;

        let mut pos = offset;
        let mut read = 0usize;
        while pos < end {
            let index = self.page_index(pos);
            self.ensure_loaded(index)?;
            self.touch(index);

            let page_off = (pos - self.page_start(index)) as usize;
            let chunk = ((end - pos) as usize).min(self.page_size - page_off);
            let page = self.pages.get_mut(&index).expect("page just loaded");
            page.data[page_off..page_off + chunk].copy_from_slice(&src[read..read + chunk]);
            page.dirty = true;

            pos += chunk as u64;
            read += chunk;
        }

        if end > self.length {
            self.length = end;
        }
        Ok(())
    }

    /// Append `bytes` at the current logical length, advancing it
    /// atomically, and return the offset the bytes were written at.
    pub fn write_to_end(&mut self, bytes: &[u8]) -> DbResult<u64> {
        let start = self.length;
        self.write(start, bytes)?;
        Ok(start)
    }

    /// Extend the logical length by `n` zero bytes, returning the
    /// previous length.
    pub fn reserve(&mut self, n: u64) -> DbResult<u64> {
        let start = self.length;
        let zeros = vec![0u8; n as usize];
        self.write(start, &zeros)?;
        Ok(start)
    }

    /// Flush dirty pages to the backing storage in ascending index
    /// order, then flush the storage itself.
    pub fn flush(&mut self) -> DbResult<()> {
        let mut dirty_indices: Vec<u64> = self
            .pages
            .iter()
            .filter(|(_, page)| page.dirty)
            .map(|(&index, _)| index)
            .collect();
        dirty_indices.sort_unstable();

        for index in dirty_indices {
            let start = self.page_start(index);
            let page = self.pages.get_mut(&index).expect("indices come from pages");
            let write_len = (self.length.saturating_sub(start) as usize).min(page.data.len());
            self.storage.write(start, &page.data[..write_len])?;
            page.dirty = false;
        }

        self.storage.flush()?;
        Ok(())
    }

    /// Borrow the backing storage directly. Any cached writes not yet
    /// flushed will not be visible through this reference.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Consume the cache, returning the backing storage. Dirty pages
    /// still resident are dropped, not flushed — call [`Cache::flush`]
    /// first if that data must survive.
    pub fn into_storage(self) -> S {
        self.storage
    }
}

/// Page-index arithmetic shared with callers that need to reason about
/// cache layout without touching cache internals (e.g. test fixtures
/// asserting how many pages a read touched).
pub fn page_span(page_size: usize, offset: u64, len: usize) -> (PageId, PageId) {
    let start = PageId(offset / page_size as u64);
    let end = PageId((offset + len.saturating_sub(1) as u64) / page_size as u64);
    (start, end)
}
