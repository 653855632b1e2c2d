//! Buffer pool manager.

use crate::frame::FrameDescriptor;
use crate::page_table::PageTable;
use crate::replacer::{ClockReplacer, Replacer};
use cellar_common::config::BufferPoolConfig;
use cellar_common::page::{FileId, FrameId, PageId, PageKey};
use cellar_common::{CellarError, Result};
use cellar_storage::{Page, PageFile};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// A pinned page in the pool.
///
/// Handles are plain tokens: resolve them through [`BufferPool::page`] or
/// [`BufferPool::page_mut`]. A handle stops resolving once its page is
/// unpinned to zero and evicted, disposed, or flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHandle {
    frame_id: FrameId,
    key: PageKey,
}

impl PageHandle {
    /// Returns the frame holding the page.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page number.
    pub fn page_id(&self) -> PageId {
        self.key.page_id
    }

    /// Returns the (file, page) key.
    pub fn key(&self) -> PageKey {
        self.key
    }
}

/// Buffer pool manager.
///
/// Caches a fixed number of pages from any number of files with:
/// - A page table from (file, page) to frame
/// - Clock replacement for eviction
/// - Pin counting to veto eviction of pages in use
/// - Dirty tracking for write-back on eviction, flush, and drop
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Frame descriptors, co-indexed with `pages`.
    frames: Vec<FrameDescriptor>,
    /// Page buffers, co-indexed with `frames`.
    pages: Vec<Page>,
    /// (file, page) to frame mapping.
    page_table: PageTable,
    /// Page replacement policy.
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Result<Self> {
        config.validate()?;
        let num_frames = config.num_frames;

        let frames = (0..num_frames)
            .map(|i| FrameDescriptor::new(FrameId(i as u32)))
            .collect();
        let pages = (0..num_frames).map(|_| Page::new(PageId::INVALID)).collect();

        debug!(num_frames, "created buffer pool");
        Ok(Self {
            config,
            frames,
            pages,
            page_table: PageTable::new(num_frames),
            replacer: ClockReplacer::new(),
        })
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    pub fn auto_sized() -> Result<Self> {
        Self::new(BufferPoolConfig::auto_sized())
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.frames.iter().filter(|f| !f.is_valid()).count()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Returns the descriptor of a frame.
    pub fn frame(&self, frame_id: FrameId) -> Option<&FrameDescriptor> {
        self.frames.get(frame_id.index())
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains<F: PageFile + ?Sized>(&self, file: &Arc<F>, page_id: PageId) -> bool {
        self.page_table
            .contains(PageKey::new(file.file_id(), page_id))
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count<F: PageFile + ?Sized>(&self, file: &Arc<F>, page_id: PageId) -> Option<u32> {
        self.resident(file.file_id(), page_id).map(|f| f.pin_count())
    }

    /// Returns the dirty flag of a resident page.
    pub fn is_dirty<F: PageFile + ?Sized>(&self, file: &Arc<F>, page_id: PageId) -> Option<bool> {
        self.resident(file.file_id(), page_id).map(|f| f.is_dirty())
    }

    fn resident(&self, file_id: FileId, page_id: PageId) -> Option<&FrameDescriptor> {
        let frame_id = self.page_table.get(PageKey::new(file_id, page_id))?;
        Some(&self.frames[frame_id.index()])
    }

    /// Reads a page, pinning it.
    ///
    /// A resident page is pinned again without I/O. Otherwise a frame is
    /// taken from the clock replacer and the page is loaded from `file`.
    pub fn read_page<F: PageFile + ?Sized + 'static>(
        &mut self,
        file: &Arc<F>,
        page_id: PageId,
    ) -> Result<PageHandle> {
        let key = PageKey::new(file.file_id(), page_id);

        if let Some(frame_id) = self.page_table.get(key) {
            let frame = &mut self.frames[frame_id.index()];
            frame.pin();
            trace!(file = file.filename(), page = %page_id, frame = %frame_id, "buffer hit");
            return Ok(PageHandle { frame_id, key });
        }

        let frame_id = self.allocate_frame()?;
        let page = file.read_page(page_id)?;
        self.pages[frame_id.index()].copy_from(&page);
        self.bind_frame(file, frame_id, key)?;

        debug!(file = file.filename(), page = %page_id, frame = %frame_id, "buffer miss, page loaded");
        Ok(PageHandle { frame_id, key })
    }

    /// Allocates a new page in `file` and pins it in the pool.
    ///
    /// A frame is secured before the file grows, so a full pool leaves the
    /// file untouched.
    pub fn allocate_page<F: PageFile + ?Sized + 'static>(
        &mut self,
        file: &Arc<F>,
    ) -> Result<(PageId, PageHandle)> {
        let frame_id = self.allocate_frame()?;
        let page = file.allocate_page()?;
        let page_id = page.page_number();
        let key = PageKey::new(file.file_id(), page_id);

        self.pages[frame_id.index()].copy_from(&page);
        self.bind_frame(file, frame_id, key)?;

        debug!(file = file.filename(), page = %page_id, frame = %frame_id, "allocated page");
        Ok((page_id, PageHandle { frame_id, key }))
    }

    /// Drops one pin on a page, marking it dirty if `is_dirty`.
    ///
    /// A false `is_dirty` never clears an existing dirty flag.
    pub fn unpin_page<F: PageFile + ?Sized>(
        &mut self,
        file: &Arc<F>,
        page_id: PageId,
        is_dirty: bool,
    ) -> Result<()> {
        let key = PageKey::new(file.file_id(), page_id);
        let frame_id = self.page_table.get(key).ok_or_else(|| CellarError::PageNotFound {
            file: file.filename().to_string(),
            page_id,
        })?;

        let frame = &mut self.frames[frame_id.index()];
        if !frame.unpin() {
            return Err(CellarError::PageNotPinned {
                file: file.filename().to_string(),
                page_id,
                frame_id,
            });
        }
        if is_dirty {
            frame.mark_dirty();
        }

        trace!(file = file.filename(), page = %page_id, pin_count = frame.pin_count(), "unpinned page");
        Ok(())
    }

    /// Deletes a page from both the pool and its file.
    ///
    /// The page must be resident and unpinned. Its cached contents are
    /// discarded without write-back.
    pub fn dispose_page<F: PageFile + ?Sized>(&mut self, file: &Arc<F>, page_id: PageId) -> Result<()> {
        let key = PageKey::new(file.file_id(), page_id);
        let frame_id = self.page_table.get(key).ok_or_else(|| CellarError::PageNotFound {
            file: file.filename().to_string(),
            page_id,
        })?;

        if self.frames[frame_id.index()].is_pinned() {
            return Err(CellarError::PagePinned {
                file: file.filename().to_string(),
                page_id,
                frame_id,
            });
        }

        file.delete_page(page_id)?;
        self.release_frame(frame_id);

        debug!(file = file.filename(), page = %page_id, frame = %frame_id, "disposed page");
        Ok(())
    }

    /// Writes back and releases every frame holding a page of `file`.
    ///
    /// All of the file's frames are checked before anything is written: one
    /// pinned page fails the whole flush with `PagePinned` and leaves every
    /// frame as it was.
    pub fn flush_file<F: PageFile + ?Sized>(&mut self, file: &Arc<F>) -> Result<()> {
        let file_id = file.file_id();
        let bound: Vec<FrameId> = self
            .frames
            .iter()
            .filter(|f| f.is_bound_to(file_id))
            .map(|f| f.frame_id())
            .collect();

        for &frame_id in &bound {
            let frame = &self.frames[frame_id.index()];
            if frame.is_pinned() {
                return Err(CellarError::PagePinned {
                    file: file.filename().to_string(),
                    page_id: frame.page_id().unwrap_or(PageId::INVALID),
                    frame_id,
                });
            }
            if !frame.is_valid() {
                return Err(CellarError::BadBuffer {
                    frame_id,
                    valid: frame.is_valid(),
                    dirty: frame.is_dirty(),
                    referenced: frame.reference_bit(),
                });
            }
        }

        let mut written = 0;
        for &frame_id in &bound {
            if self.frames[frame_id.index()].is_dirty() {
                file.write_page(&self.pages[frame_id.index()])?;
                self.frames[frame_id.index()].clear_dirty();
                written += 1;
            }
            self.release_frame(frame_id);
        }

        debug!(file = file.filename(), released = bound.len(), written, "flushed file");
        Ok(())
    }

    /// Writes back every dirty frame, keeping the pages resident.
    ///
    /// A failed write leaves its frame dirty and does not stop the pass:
    /// every other dirty frame is still attempted, and the first failure is
    /// returned at the end. Returns the number of pages written.
    pub fn flush_all(&mut self) -> Result<usize> {
        let mut written = 0;
        let mut first_error = None;

        for idx in 0..self.frames.len() {
            let frame = &self.frames[idx];
            if !frame.is_valid() || !frame.is_dirty() {
                continue;
            }
            match frame.write_back(&self.pages[idx]) {
                Some(Ok(())) => {
                    self.frames[idx].clear_dirty();
                    written += 1;
                }
                Some(Err(e)) => {
                    error!(frame = %frame.frame_id(), key = ?frame.key(), error = %e, "failed to write back dirty page");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => {
                    warn!(frame = %frame.frame_id(), key = ?frame.key(), "dirty page outlived its file");
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Returns the number of dirty frames across all files.
    pub fn count_dirty_pages(&self) -> usize {
        self.frames.iter().filter(|f| f.is_dirty()).count()
    }

    /// Resolves a handle to the cached page.
    pub fn page(&self, handle: &PageHandle) -> Result<&Page> {
        let idx = self.check_handle(handle)?;
        Ok(&self.pages[idx])
    }

    /// Resolves a handle to the cached page for modification.
    ///
    /// Changes reach the file only if the page is unpinned as dirty.
    pub fn page_mut(&mut self, handle: &PageHandle) -> Result<&mut Page> {
        let idx = self.check_handle(handle)?;
        Ok(&mut self.pages[idx])
    }

    fn check_handle(&self, handle: &PageHandle) -> Result<usize> {
        let idx = handle.frame_id.index();
        let frame = self
            .frames
            .get(idx)
            .filter(|f| f.is_valid() && f.key() == Some(handle.key))
            .ok_or_else(|| CellarError::PageNotFound {
                file: handle.key.file_id.to_string(),
                page_id: handle.key.page_id,
            })?;
        if !frame.is_pinned() {
            return Err(CellarError::PageNotPinned {
                file: handle.key.file_id.to_string(),
                page_id: handle.key.page_id,
                frame_id: handle.frame_id,
            });
        }
        Ok(idx)
    }

    /// Returns a frame ready to be bound, evicting its page if needed.
    fn allocate_frame(&mut self) -> Result<FrameId> {
        let frame_id = self
            .replacer
            .pick_victim(&mut self.frames)
            .ok_or(CellarError::BufferExceeded)?;

        if self.frames[frame_id.index()].is_valid() {
            self.evict(frame_id)?;
        }
        Ok(frame_id)
    }

    /// Writes back a victim frame if dirty and releases it.
    fn evict(&mut self, frame_id: FrameId) -> Result<()> {
        let idx = frame_id.index();
        let frame = &self.frames[idx];

        if frame.is_dirty() {
            match frame.write_back(&self.pages[idx]) {
                Some(result) => {
                    result?;
                    debug!(key = ?frame.key(), frame = %frame_id, "evicted dirty page");
                }
                None => {
                    warn!(frame = %frame_id, key = ?frame.key(), "dirty page outlived its file");
                }
            }
        } else {
            trace!(key = ?frame.key(), frame = %frame_id, "evicted clean page");
        }

        self.release_frame(frame_id);
        Ok(())
    }

    fn bind_frame<F: PageFile + ?Sized + 'static>(
        &mut self,
        file: &Arc<F>,
        frame_id: FrameId,
        key: PageKey,
    ) -> Result<()> {
        if !self.page_table.insert(key, frame_id) {
            return Err(CellarError::Internal(format!(
                "page {} already cached while binding {}",
                key, frame_id
            )));
        }
        self.frames[frame_id.index()].bind(file, key);
        Ok(())
    }

    /// Removes a frame's page table entry and returns it to the free state.
    fn release_frame(&mut self, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id.index()];
        if let Some(key) = frame.key() {
            self.page_table.remove(key);
        }
        frame.clear();
        self.pages[frame_id.index()].clear();
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut stats = BufferPoolStats {
            total_frames: self.config.num_frames,
            ..BufferPoolStats::default()
        };
        for frame in &self.frames {
            if !frame.is_valid() {
                stats.free_frames += 1;
                continue;
            }
            stats.used_frames += 1;
            if frame.is_pinned() {
                stats.pinned_frames += 1;
            }
            if frame.is_dirty() {
                stats.dirty_frames += 1;
            }
        }
        stats
    }

    #[cfg(test)]
    pub(crate) fn frame_mut(&mut self, frame_id: FrameId) -> &mut FrameDescriptor {
        &mut self.frames[frame_id.index()]
    }
}

impl std::fmt::Display for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{}", frame)?;
        }
        write!(f, "valid frames: {}", self.num_frames() - self.free_count())
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if self.page_table.is_empty() {
            return;
        }
        match self.flush_all() {
            Ok(written) => debug!(written, "buffer pool dropped"),
            Err(_) => error!(dirty = self.count_dirty_pages(), "buffer pool dropped with unwritten dirty pages"),
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}
