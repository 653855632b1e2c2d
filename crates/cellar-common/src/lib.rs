//! Cellar common types, errors, and configuration.
//!
//! This crate provides the identifiers and error taxonomy shared by the
//! storage and buffer pool crates.

pub mod config;
pub mod error;
pub mod page;

pub use config::{BufferPoolConfig, CellarConfig, StorageConfig};
pub use error::{CellarError, Result};
pub use page::{FileId, FrameId, PageId, PageKey, PAGE_SIZE};
