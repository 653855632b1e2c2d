//! In-memory page file.

use crate::file::PageFile;
use crate::page::Page;
use cellar_common::page::{FileId, PageId};
use cellar_common::{CellarError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A page file held entirely in memory.
///
/// Follows the same numbering and reuse rules as `DiskFile` and counts the
/// page reads and writes it serves, which makes cache hits observable.
pub struct MemoryFile {
    file_id: FileId,
    name: String,
    inner: Mutex<MemoryFileInner>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

struct MemoryFileInner {
    pages: BTreeMap<PageId, Page>,
    num_pages: u32,
    /// Deleted page ids, reused last-in first-out.
    free: Vec<PageId>,
}

impl MemoryFile {
    /// Creates an empty in-memory file.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            file_id: FileId::next(),
            name: name.into(),
            inner: Mutex::new(MemoryFileInner {
                pages: BTreeMap::new(),
                num_pages: 0,
                free: Vec::new(),
            }),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Returns the number of `read_page` calls served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of `write_page` calls served.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of allocated pages.
    pub fn num_pages(&self) -> usize {
        self.inner.lock().pages.len()
    }

    fn invalid_page(&self, page_id: PageId) -> CellarError {
        CellarError::InvalidPage {
            file: self.name.clone(),
            page_id,
        }
    }
}

impl PageFile for MemoryFile {
    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn filename(&self) -> &str {
        &self.name
    }

    fn read_page(&self, page_id: PageId) -> Result<Page> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.lock();
        inner
            .pages
            .get(&page_id)
            .cloned()
            .ok_or_else(|| self.invalid_page(page_id))
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let page_id = page.page_number();
        let mut inner = self.inner.lock();
        match inner.pages.get_mut(&page_id) {
            Some(stored) => {
                stored.clone_from(page);
                Ok(())
            }
            None => Err(self.invalid_page(page_id)),
        }
    }

    fn allocate_page(&self) -> Result<Page> {
        let mut inner = self.inner.lock();
        let page_id = match inner.free.pop() {
            Some(page_id) => page_id,
            None => {
                inner.num_pages += 1;
                PageId(inner.num_pages)
            }
        };
        let page = Page::new(page_id);
        inner.pages.insert(page_id, page.clone());
        Ok(page)
    }

    fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.pages.remove(&page_id).is_none() {
            return Err(self.invalid_page(page_id));
        }
        inner.free.push(page_id);
        Ok(())
    }

    fn page_ids(&self) -> Result<Vec<PageId>> {
        Ok(self.inner.lock().pages.keys().copied().collect())
    }
}

impl std::fmt::Debug for MemoryFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFile")
            .field("file_id", &self.file_id)
            .field("name", &self.name)
            .field("reads", &self.reads())
            .field("writes", &self.writes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_file_allocate_write_read() {
        let file = MemoryFile::new("mem.1");

        let mut page = file.allocate_page().unwrap();
        assert_eq!(page.page_number(), PageId(1));
        let rid = page.insert_record(b"cached").unwrap();
        file.write_page(&page).unwrap();

        let read = file.read_page(PageId(1)).unwrap();
        assert_eq!(read.get_record(rid).unwrap(), b"cached");
        assert_eq!(file.reads(), 1);
        assert_eq!(file.writes(), 1);
    }

    #[test]
    fn test_memory_file_read_missing() {
        let file = MemoryFile::new("mem.2");
        assert!(matches!(
            file.read_page(PageId(1)),
            Err(CellarError::InvalidPage { .. })
        ));
    }

    #[test]
    fn test_memory_file_delete_and_reuse() {
        let file = MemoryFile::new("mem.3");
        file.allocate_page().unwrap();
        file.allocate_page().unwrap();

        file.delete_page(PageId(1)).unwrap();
        assert_eq!(file.page_ids().unwrap(), vec![PageId(2)]);
        assert!(file.delete_page(PageId(1)).is_err());

        let page = file.allocate_page().unwrap();
        assert_eq!(page.page_number(), PageId(1));
        assert_eq!(file.num_pages(), 2);
    }

    #[test]
    fn test_memory_file_write_unknown_page() {
        let file = MemoryFile::new("mem.4");
        let page = Page::new(PageId(7));
        assert!(matches!(
            file.write_page(&page),
            Err(CellarError::InvalidPage { .. })
        ));
    }
}
