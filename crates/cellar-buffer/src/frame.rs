//! Frame descriptors.
//!
//! One descriptor per slot of the pool, co-indexed with the page buffers.
//! A descriptor is either free (`valid == false`) or bound to one
//! (file, page) pair together with its pin count, dirty flag, and the
//! reference bit the clock replacer reads.

use cellar_common::page::{FileId, FrameId, PageId, PageKey};
use cellar_common::Result;
use cellar_storage::{Page, PageFile};
use std::sync::{Arc, Weak};

/// Non-owning link from a frame to the file its page belongs to.
trait FileLink {
    fn filename(&self) -> Option<String>;
    fn write_page(&self, page: &Page) -> Option<Result<()>>;
}

struct WeakFile<F: ?Sized>(Weak<F>);

impl<F: PageFile + ?Sized> FileLink for WeakFile<F> {
    fn filename(&self) -> Option<String> {
        self.0.upgrade().map(|file| file.filename().to_string())
    }

    fn write_page(&self, page: &Page) -> Option<Result<()>> {
        self.0.upgrade().map(|file| file.write_page(page))
    }
}

/// Bookkeeping for a single frame in the buffer pool.
pub struct FrameDescriptor {
    /// Frame identifier.
    frame_id: FrameId,
    /// File owning the cached page. Not owned by the frame.
    file: Option<Box<dyn FileLink>>,
    /// The page bound to this frame, None when free.
    key: Option<PageKey>,
    /// Whether the frame holds a live page binding.
    valid: bool,
    /// Number of callers currently holding this page.
    pin_count: u32,
    /// Whether the cached copy differs from the on-disk copy.
    dirty: bool,
    /// Second-chance bit for the clock replacer.
    referenced: bool,
}

impl FrameDescriptor {
    /// Creates a free frame descriptor.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            file: None,
            key: None,
            valid: false,
            pin_count: 0,
            dirty: false,
            referenced: false,
        }
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page key bound to this frame.
    #[inline]
    pub fn key(&self) -> Option<PageKey> {
        self.key
    }

    #[inline]
    pub fn file_id(&self) -> Option<FileId> {
        self.key.map(|k| k.file_id)
    }

    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        self.key.map(|k| k.page_id)
    }

    /// Returns the owning file's name, or None if unbound or the file is gone.
    pub fn filename(&self) -> Option<String> {
        self.file.as_ref().and_then(|link| link.filename())
    }

    /// Writes `page` through to the owning file.
    ///
    /// Returns None if the frame is unbound or its file has been dropped.
    pub fn write_back(&self, page: &Page) -> Option<Result<()>> {
        self.file.as_ref().and_then(|link| link.write_page(page))
    }

    /// Returns true if the frame is bound to `file_id`.
    #[inline]
    pub fn is_bound_to(&self, file_id: FileId) -> bool {
        self.file_id() == Some(file_id)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn reference_bit(&self) -> bool {
        self.referenced
    }

    /// Binds a free frame to a page: pinned once, referenced, clean.
    pub fn bind<F: PageFile + ?Sized + 'static>(&mut self, file: &Arc<F>, key: PageKey) {
        debug_assert!(!self.valid, "binding an occupied {}", self.frame_id);
        self.file = Some(Box::new(WeakFile(Arc::downgrade(file))));
        self.key = Some(key);
        self.valid = true;
        self.pin_count = 1;
        self.dirty = false;
        self.referenced = true;
    }

    /// Adds a pin and marks the frame recently used.
    ///
    /// Returns the previous pin count.
    #[inline]
    pub fn pin(&mut self) -> u32 {
        let prev = self.pin_count;
        self.pin_count += 1;
        self.referenced = true;
        prev
    }

    /// Drops a pin.
    ///
    /// Returns false and leaves the frame untouched if it was not pinned.
    #[inline]
    pub fn unpin(&mut self) -> bool {
        if self.pin_count == 0 {
            return false;
        }
        self.pin_count -= 1;
        true
    }

    /// Marks the cached copy as modified. Only a flush clears it.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Records that the cached copy has been written back.
    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    #[inline]
    pub fn set_reference_bit(&mut self, value: bool) {
        self.referenced = value;
    }

    /// Returns the frame to the free state.
    pub fn clear(&mut self) {
        self.file = None;
        self.key = None;
        self.valid = false;
        self.pin_count = 0;
        self.dirty = false;
        self.referenced = false;
    }

    #[cfg(test)]
    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }
}

impl std::fmt::Debug for FrameDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDescriptor")
            .field("frame_id", &self.frame_id)
            .field("key", &self.key)
            .field("valid", &self.valid)
            .field("pin_count", &self.pin_count)
            .field("dirty", &self.dirty)
            .field("referenced", &self.referenced)
            .finish()
    }
}

impl std::fmt::Display for FrameDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = self.filename().unwrap_or_else(|| "-".to_string());
        let page = match self.page_id() {
            Some(page_id) => page_id.to_string(),
            None => "-".to_string(),
        };
        write!(
            f,
            "{} file={} page={} valid={} pin_count={} dirty={} referenced={}",
            self.frame_id, file, page, self.valid, self.pin_count, self.dirty, self.referenced
        )
    }
}
