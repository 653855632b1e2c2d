//! Buffer pool management for Cellar.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool shared by any number of page files
//! - Clock eviction policy for cache management
//! - Pin counting to keep pages in use resident
//! - Dirty page tracking for write-back

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::FrameDescriptor;
pub use page_table::PageTable;
pub use pool::{BufferPool, BufferPoolStats, PageHandle};
pub use replacer::{ClockReplacer, Replacer};
