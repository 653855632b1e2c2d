//! Page and frame identifiers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Page size in bytes (8 KB).
pub const PAGE_SIZE: usize = 8 * 1024;

/// Page number within a single file.
///
/// Page numbers start at 1. Page 0 is reserved for the file header and
/// doubles as the "no page" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid page ID.
    pub const INVALID: PageId = PageId(0);

    /// Returns true if this is a valid page ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identity of an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

static NEXT_FILE_ID: AtomicU32 = AtomicU32::new(1);

impl FileId {
    /// Hands out a file ID that no other open file in this process carries.
    pub fn next() -> Self {
        FileId(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

/// Identity of a cached page: the owning file plus the page number in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub file_id: FileId,
    pub page_id: PageId,
}

impl PageKey {
    /// Creates a new PageKey.
    pub fn new(file_id: FileId, page_id: PageId) -> Self {
        Self { file_id, page_id }
    }

    /// Returns the key as a single u64 (file in the upper half).
    pub fn as_u64(&self) -> u64 {
        ((self.file_id.0 as u64) << 32) | (self.page_id.0 as u64)
    }
}

impl std::fmt::Display for PageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_id.0, self.page_id.0)
    }
}

/// Index of a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Returns the frame ID as a slot index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_validity() {
        assert!(PageId(1).is_valid());
        assert!(!PageId::INVALID.is_valid());
    }

    #[test]
    fn test_file_ids_are_unique() {
        let a = FileId::next();
        let b = FileId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_page_key_u64_conversion() {
        let key = PageKey::new(FileId(7), PageId(100));
        let packed = key.as_u64();
        assert_eq!(packed, (7u64 << 32) | 100);
        assert_ne!(PageKey::new(FileId(8), PageId(100)).as_u64(), packed);
    }

    #[test]
    fn test_page_key_display() {
        let key = PageKey::new(FileId(3), PageId(42));
        assert_eq!(key.to_string(), "3:42");
    }

    #[test]
    fn test_frame_id_display() {
        assert_eq!(FrameId(42).to_string(), "frame:42");
        assert_eq!(FrameId(9).index(), 9);
    }

    #[test]
    fn test_page_key_serde_roundtrip() {
        let key = PageKey::new(FileId(1), PageId(5));
        let json = serde_json::to_string(&key).unwrap();
        let back: PageKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
