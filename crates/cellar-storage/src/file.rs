//! The file interface the buffer pool caches pages from.

use crate::page::Page;
use cellar_common::page::{FileId, PageId};
use cellar_common::Result;

/// A file made of fixed-size pages.
///
/// Implementations serialize their own I/O; every method takes `&self`.
pub trait PageFile: Send + Sync {
    /// Returns the process-unique identity of this open file.
    fn file_id(&self) -> FileId;

    /// Returns the file name, for diagnostics.
    fn filename(&self) -> &str;

    /// Reads a page.
    ///
    /// Fails with `InvalidPage` if the page was never allocated or has been
    /// deleted.
    fn read_page(&self, page_id: PageId) -> Result<Page>;

    /// Writes a page back to its slot. The slot is taken from the page's
    /// own page number.
    fn write_page(&self, page: &Page) -> Result<()>;

    /// Grows the file by one page and returns it, empty.
    fn allocate_page(&self) -> Result<Page>;

    /// Deletes a page from the file.
    fn delete_page(&self, page_id: PageId) -> Result<()>;

    /// Returns the ids of all allocated pages, in ascending order.
    fn page_ids(&self) -> Result<Vec<PageId>>;
}
