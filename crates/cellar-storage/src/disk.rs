//! On-disk page file.

use crate::file::PageFile;
use crate::page::Page;
use cellar_common::config::StorageConfig;
use cellar_common::page::{FileId, PageId, PAGE_SIZE};
use cellar_common::{CellarError, Result};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes at the start of every page file.
const FILE_MAGIC: &[u8; 8] = b"CELLARPF";

/// File header stored in slot 0.
///
/// Layout (16 bytes):
/// - magic: 8 bytes
/// - num_pages: 4 bytes (slots in use or on the free list)
/// - free_head: 4 bytes (first deleted page, 0 = none)
#[derive(Debug, Clone, Copy)]
struct FileHeader {
    num_pages: u32,
    free_head: PageId,
}

impl FileHeader {
    const SIZE: usize = 16;

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(FILE_MAGIC);
        buf[8..12].copy_from_slice(&self.num_pages.to_le_bytes());
        buf[12..16].copy_from_slice(&self.free_head.0.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Option<Self> {
        if &buf[0..8] != FILE_MAGIC {
            return None;
        }
        Some(Self {
            num_pages: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            free_head: PageId(u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]])),
        })
    }
}

/// A page file on disk.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`; slot 0 holds the file
/// header. Deleted pages are chained through their `next_free` header field
/// and reused by later allocations.
pub struct DiskFile {
    file_id: FileId,
    name: String,
    fsync_enabled: bool,
    inner: Mutex<DiskFileInner>,
}

struct DiskFileInner {
    file: File,
    header: FileHeader,
    /// Pages on the free list, mirrored in memory for O(log n) checks.
    free: BTreeSet<PageId>,
}

impl DiskFile {
    /// Creates a new, empty page file. Fails if the file already exists.
    pub fn create(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => CellarError::FileExists(path.display().to_string()),
                _ => CellarError::Io(e),
            })?;

        let header = FileHeader {
            num_pages: 0,
            free_head: PageId::INVALID,
        };
        let mut inner = DiskFileInner {
            file,
            header,
            free: BTreeSet::new(),
        };
        inner.write_header(fsync_enabled)?;

        debug!(file = %path.display(), "created page file");
        Ok(Self::from_parts(path, fsync_enabled, inner))
    }

    /// Opens an existing page file.
    pub fn open(path: impl AsRef<Path>, fsync_enabled: bool) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CellarError::FileNotFound(name.clone()),
                _ => CellarError::Io(e),
            })?;

        let mut slot = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut slot)
            .map_err(|_| corrupted(&name, "missing file header"))?;
        let header =
            FileHeader::from_bytes(&slot).ok_or_else(|| corrupted(&name, "bad magic"))?;

        let mut inner = DiskFileInner {
            file,
            header,
            free: BTreeSet::new(),
        };

        // Rebuild the in-memory free set by walking the on-disk chain.
        let mut next = header.free_head;
        while next.is_valid() {
            if next.0 > header.num_pages || !inner.free.insert(next) {
                return Err(corrupted(&name, "broken free list"));
            }
            next = inner.read_slot(next)?.next_free();
        }

        debug!(file = %name, pages = header.num_pages, free = inner.free.len(), "opened page file");
        Ok(Self::from_parts(path, fsync_enabled, inner))
    }

    /// Creates a page file named `name` inside the configured data directory.
    pub fn create_in(config: &StorageConfig, name: &str) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::create(config.file_path(name), config.fsync_enabled)
    }

    /// Opens the page file named `name` inside the configured data directory.
    pub fn open_in(config: &StorageConfig, name: &str) -> Result<Self> {
        Self::open(config.file_path(name), config.fsync_enabled)
    }

    /// Deletes a page file from disk.
    pub fn remove(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::remove_file(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CellarError::FileNotFound(path.display().to_string()),
            _ => CellarError::Io(e),
        })
    }

    fn from_parts(path: &Path, fsync_enabled: bool, inner: DiskFileInner) -> Self {
        Self {
            file_id: FileId::next(),
            name: path.display().to_string(),
            fsync_enabled,
            inner: Mutex::new(inner),
        }
    }

    /// Returns the path this file was opened from.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.name)
    }

    /// Returns the number of allocated (not deleted) pages.
    pub fn num_pages(&self) -> u32 {
        let inner = self.inner.lock();
        inner.header.num_pages - inner.free.len() as u32
    }

    fn invalid_page(&self, page_id: PageId) -> CellarError {
        CellarError::InvalidPage {
            file: self.name.clone(),
            page_id,
        }
    }
}

impl DiskFileInner {
    fn is_allocated(&self, page_id: PageId) -> bool {
        page_id.is_valid() && page_id.0 <= self.header.num_pages && !self.free.contains(&page_id)
    }

    fn read_slot(&mut self, page_id: PageId) -> Result<Page> {
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut data = Box::new([0u8; PAGE_SIZE]);
        self.file.read_exact(&mut data[..])?;
        Ok(Page::from_bytes(data))
    }

    fn write_slot(&mut self, page_id: PageId, page: &Page, fsync: bool) -> Result<()> {
        let offset = page_id.0 as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_bytes())?;
        if fsync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn write_header(&mut self, fsync: bool) -> Result<()> {
        let mut slot = [0u8; PAGE_SIZE];
        slot[..FileHeader::SIZE].copy_from_slice(&self.header.to_bytes());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&slot)?;
        if fsync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl PageFile for DiskFile {
    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn filename(&self) -> &str {
        &self.name
    }

    fn read_page(&self, page_id: PageId) -> Result<Page> {
        let mut inner = self.inner.lock();
        if !inner.is_allocated(page_id) {
            return Err(self.invalid_page(page_id));
        }
        let page = inner.read_slot(page_id)?;
        if page.page_number() != page_id {
            return Err(corrupted(&self.name, "page number does not match its slot"));
        }
        Ok(page)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        let page_id = page.page_number();
        let mut inner = self.inner.lock();
        if !inner.is_allocated(page_id) {
            return Err(self.invalid_page(page_id));
        }
        inner.write_slot(page_id, page, self.fsync_enabled)
    }

    fn allocate_page(&self) -> Result<Page> {
        let mut inner = self.inner.lock();

        let page_id = if inner.header.free_head.is_valid() {
            let page_id = inner.header.free_head;
            let next = inner.read_slot(page_id)?.next_free();
            inner.header.free_head = next;
            inner.free.remove(&page_id);
            page_id
        } else {
            inner.header.num_pages += 1;
            PageId(inner.header.num_pages)
        };

        let page = Page::new(page_id);
        inner.write_slot(page_id, &page, false)?;
        inner.write_header(self.fsync_enabled)?;

        debug!(file = %self.name, page = %page_id, "allocated page");
        Ok(page)
    }

    fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.is_allocated(page_id) {
            return Err(self.invalid_page(page_id));
        }

        let mut tombstone = Page::new(PageId::INVALID);
        tombstone.set_next_free(inner.header.free_head);
        inner.write_slot(page_id, &tombstone, false)?;

        inner.header.free_head = page_id;
        inner.free.insert(page_id);
        inner.write_header(self.fsync_enabled)?;

        debug!(file = %self.name, page = %page_id, "deleted page");
        Ok(())
    }

    fn page_ids(&self) -> Result<Vec<PageId>> {
        let inner = self.inner.lock();
        Ok((1..=inner.header.num_pages)
            .map(PageId)
            .filter(|id| !inner.free.contains(id))
            .collect())
    }
}

impl std::fmt::Debug for DiskFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskFile")
            .field("file_id", &self.file_id)
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for DiskFile {
    fn drop(&mut self) {
        let _ = self.inner.get_mut().file.sync_all();
    }
}

fn corrupted(name: &str, reason: &str) -> CellarError {
    CellarError::FileCorrupted {
        file: name.to_string(),
        reason: reason.to_string(),
    }
}
