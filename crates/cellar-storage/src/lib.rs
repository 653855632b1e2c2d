//! Page file storage for Cellar.
//!
//! This crate provides:
//! - Slotted pages holding variable-length records
//! - The `PageFile` trait the buffer pool reads and writes through
//! - An on-disk page file with a persistent free list
//! - An in-memory page file with I/O counters

mod disk;
mod file;
mod memory;
mod page;

pub use disk::DiskFile;
pub use file::PageFile;
pub use memory::MemoryFile;
pub use page::{Page, PageHeader, RecordId, RecordIter};
