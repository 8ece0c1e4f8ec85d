//! Demand-paged, cached access to one table's backing file.
//!
//! The pager owns the OS file handle and a fixed slot table of resident
//! pages. Every access to a page goes through `get`, which guarantees
//! cache identity: repeated `get(p)` within one session returns the same
//! buffer, so mutations made through one handle are visible to every
//! other holder. There is no eviction — `MAX_PAGES` bounds how many
//! pages a table can have resident at once, and running past it is a
//! fatal core-invariant violation, not a recoverable error.
use crate::errors::Error;
use crate::storage::node::{Node, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard};

pub const MAX_PAGES: usize = 100;

/// Locks a page's node buffer, turning lock poisoning into a recoverable
/// `Error::LockTable` instead of a panic.
pub fn lock(arc: &Arc<Mutex<Node>>, page_num: u32) -> Result<MutexGuard<'_, Node>, Error> {
    arc.lock()
        .map_err(|_| err!(LockTable, "page {} lock poisoned", page_num))
}

pub struct Pager {
    file: File,
    file_length: u64,
    num_pages: u32,
    leaf_cell_size: usize,
    pages: Vec<Option<Arc<Mutex<Node>>>>,
}

impl Pager {
    /// Opens (creating if absent) the file at `path` as a table's backing
    /// store. `leaf_cell_size` is threaded into every `Node` this pager
    /// produces, since it is fixed for the table's lifetime.
    pub fn open(path: &std::path::Path, leaf_cell_size: usize) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Fatal,
                "db file '{}' has length {} which is not a multiple of page size {}",
                path.display(),
                file_length,
                PAGE_SIZE
            ));
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;

        let mut pages = Vec::with_capacity(MAX_PAGES);
        pages.resize_with(MAX_PAGES, || None);

        Ok(Pager {
            file,
            file_length,
            num_pages,
            leaf_cell_size,
            pages,
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// First unused page number; the page becomes resident once `get` is
    /// called with it.
    pub fn allocate_new(&self) -> u32 {
        self.num_pages
    }

    /// Fetches the node at `page_num`, demand-reading it from disk (or
    /// zero-filling it, if it lies past the file's current extent) on
    /// first touch. Subsequent calls for the same page number return the
    /// identical buffer.
    pub fn get(&mut self, page_num: u32) -> Result<Arc<Mutex<Node>>, Error> {
        if page_num as usize >= MAX_PAGES {
            return Err(err!(
                Fatal,
                "page number {} exceeds MAX_PAGES ({})",
                page_num,
                MAX_PAGES
            ));
        }

        if self.pages[page_num as usize].is_none() {
            let mut data = [0u8; PAGE_SIZE];
            if page_num < self.num_pages {
                self.file.seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                let mut read = 0;
                while read < PAGE_SIZE {
                    let n = self.file.read(&mut data[read..])?;
                    if n == 0 {
                        break; // short read at EOF: rest stays zero-filled
                    }
                    read += n;
                }
            }
            self.pages[page_num as usize] = Some(Arc::new(Mutex::new(Node::new(
                data,
                self.leaf_cell_size,
            ))));
            if page_num >= self.num_pages {
                self.num_pages = page_num + 1;
            }
        }

        Ok(self.pages[page_num as usize].clone().unwrap())
    }

    /// Writes the full page back to disk at its offset.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        let slot = self.pages[page_num as usize]
            .clone()
            .ok_or_else(|| err!(Fatal, "tried to flush empty page slot {}", page_num))?;
        let node = slot
            .lock()
            .map_err(|_| err!(LockTable, "page {} lock poisoned", page_num))?;
        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&node.data)?;
        let end = (page_num as u64 + 1) * PAGE_SIZE as u64;
        if end > self.file_length {
            self.file_length = end;
        }
        Ok(())
    }

    /// Flushes every resident page and drops the buffers. The file handle
    /// closes when `self` is dropped.
    pub fn close(&mut self) -> Result<(), Error> {
        for p in 0..self.num_pages {
            if self.pages[p as usize].is_some() {
                self.flush(p)?;
            }
        }
        self.file.flush()?;
        for slot in self.pages.iter_mut() {
            *slot = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn repeated_get_returns_the_same_buffer() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path(), 12).unwrap();
        let a = pager.get(0).unwrap();
        let b = pager.get(0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn get_past_eof_is_zero_filled_and_advances_num_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path(), 12).unwrap();
        assert_eq!(pager.num_pages(), 0);
        let node = pager.get(3).unwrap();
        assert!(node.lock().unwrap().data.iter().all(|&b| b == 0));
        assert_eq!(pager.num_pages(), 4);
    }

    #[test]
    fn flush_then_reopen_round_trips_page_contents() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut pager = Pager::open(tmp.path(), 12).unwrap();
            let node = pager.get(0).unwrap();
            node.lock().unwrap().data[0] = 0xAB;
            pager.close().unwrap();
        }
        let mut pager = Pager::open(tmp.path(), 12).unwrap();
        let node = pager.get(0).unwrap();
        assert_eq!(node.lock().unwrap().data[0], 0xAB);
    }

    #[test]
    fn rejects_file_length_not_a_multiple_of_page_size() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut f = tmp.reopen().unwrap();
            f.write_all(&[0u8; 100]).unwrap();
        }
        assert!(Pager::open(tmp.path(), 12).is_err());
    }

    #[test]
    fn get_past_max_pages_is_fatal() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path(), 12).unwrap();
        assert!(pager.get(MAX_PAGES as u32).is_err());
    }
}
