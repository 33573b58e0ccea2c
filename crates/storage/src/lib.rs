//! Growable, random-access byte storage.
//!
//! This is the bottom layer of the stack: a flat, zero-indexed byte
//! sequence of logical length `L`. Everything above it — the page cache,
//! the trie's node heap — addresses bytes by absolute offset into this
//! storage and never assumes any particular page or record structure here.


use common::{DbError, DbResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A growable, random-access byte store.
///
/// Reads past the current length fail; writes past the current length
/// extend it, zero-filling the gap.
pub trait Storage {
    /// Fill `dest` from `[offset, offset + dest.len())`. Fails if the
    /// range exceeds [`Storage::length`].
    fn read(&mut self, offset: u64, dest: &mut [u8]) -> DbResult<()>;

    /// Write `src` starting at `offset`, extending the logical length to
    /// `max(length, offset + src.len())` and zero-filling any gap.
    fn write(&mut self, offset: u64, src: &[u8]) -> DbResult<()>;

    /// Extend the logical length by `n` zero bytes. Returns the previous
    /// length — the offset at which the reserved region begins.
    fn reserve(&mut self, n: u64) -> DbResult<u64>;

    /// Current logical length.
    fn length(&self) -> DbResult<u64>;

    /// Ensure persistence to durable media.
    fn flush(&mut self) -> DbResult<()>;
}

/// A [`Storage`] backed by a single file.
#[derive(Debug)]
pub struct FileStorage {
    file: File,
    length: u64,
}

impl FileStorage {
    /// Open (creating if absent) the file at `path` as byte storage.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let length = file.metadata()?.len();
        Ok(Self { file, length })
    }

    /// Release the underlying file handle. An implicit flush is not
    /// performed — call [`Storage::flush`] first if durability is
    /// required.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Storage for FileStorage {
    fn read(&mut self, offset: u64, dest: &mut [u8]) -> DbResult<()> {
        let end = offset
            .checked_add(dest.len() as u64)
            .ok_or_else(|| DbError::Storage("read range overflows u64".into()))?;
        if end > self.length {
            return Err(DbError::Storage(format!(
                "read [{offset}, {end}) exceeds length {}",
                self.length
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(dest)?;
        Ok(())
    }

    fn write(&mut self, offset: u64, src: &[u8]) -> DbResult<()> {
        let end = offset
            .checked_add(src.len() as u64)
            .ok_or_else(|| DbError::Storage("write range overflows u64".into()))?;
        if offset > self.length {
            // set_len zero-fills the gap between the current length and offset.
            self.file.set_len(offset)?;
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(src)?;
        if end > self.length {
            self.length = end;
        }
        Ok(())
    }

    fn reserve(&mut self, n: u64) -> DbResult<u64> {
        let start = self.length;
        let new_len = start
            .checked_add(n)
            .ok_or_else(|| DbError::Storage("reserve overflows u64".into()))?;
        self.file.set_len(new_len)?;
        self.length = new_len;
        Ok(start)
    }

    fn length(&self) -> DbResult<u64> {
        Ok(self.length)
    }

    fn flush(&mut self) -> DbResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
