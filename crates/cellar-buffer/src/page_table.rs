//! Page table mapping cached pages to the frames holding them.

use cellar_common::page::{FrameId, PageKey};

/// Hash table from (file, page) to frame id.
///
/// Separate chaining over a bucket array sized at construction from the
/// pool size. A lookup miss is an ordinary `None`.
pub struct PageTable {
    buckets: Vec<Vec<(PageKey, FrameId)>>,
    len: usize,
}

impl PageTable {
    /// Creates a page table for a pool of `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        // ~1.2 buckets per frame keeps chains short at a full pool
        let num_buckets = num_frames + num_frames / 5 + 1;
        Self {
            buckets: (0..num_buckets).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    /// Computes the bucket index for a key.
    #[inline(always)]
    fn bucket(&self, key: PageKey) -> usize {
        // FxHash-style multiply for distribution
        let hash = key.as_u64().wrapping_mul(0x517cc1b727220a95);
        (hash % self.buckets.len() as u64) as usize
    }

    /// Looks up the frame holding a page.
    #[inline]
    pub fn get(&self, key: PageKey) -> Option<FrameId> {
        self.buckets[self.bucket(key)]
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, frame_id)| frame_id)
    }

    /// Inserts a mapping. Returns false if the key is already present.
    pub fn insert(&mut self, key: PageKey, frame_id: FrameId) -> bool {
        let idx = self.bucket(key);
        let chain = &mut self.buckets[idx];
        if chain.iter().any(|(k, _)| *k == key) {
            return false;
        }
        chain.push((key, frame_id));
        self.len += 1;
        true
    }

    /// Removes a mapping. Returns the frame ID if it was present.
    pub fn remove(&mut self, key: PageKey) -> Option<FrameId> {
        let idx = self.bucket(key);
        let chain = &mut self.buckets[idx];
        let pos = chain.iter().position(|(k, _)| *k == key)?;
        let (_, frame_id) = chain.swap_remove(pos);
        self.len -= 1;
        Some(frame_id)
    }

    /// Returns true if the key is in the table.
    pub fn contains(&self, key: PageKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_common::page::{FileId, PageId};

    fn key(file: u32, page: u32) -> PageKey {
        PageKey::new(FileId(file), PageId(page))
    }

    #[test]
    fn test_insert_get() {
        let mut table = PageTable::new(100);

        assert!(table.insert(key(1, 42), FrameId(7)));
        assert_eq!(table.get(key(1, 42)), Some(FrameId(7)));
        assert!(table.contains(key(1, 42)));
    }

    #[test]
    fn test_miss_is_none() {
        let mut table = PageTable::new(10);
        table.insert(key(1, 1), FrameId(0));

        assert_eq!(table.get(key(1, 2)), None);
        assert_eq!(table.get(key(2, 1)), None);
    }

    #[test]
    fn test_remove() {
        let mut table = PageTable::new(100);
        table.insert(key(1, 42), FrameId(7));

        assert_eq!(table.remove(key(1, 42)), Some(FrameId(7)));
        assert_eq!(table.get(key(1, 42)), None);
        assert_eq!(table.remove(key(1, 42)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut table = PageTable::new(100);

        assert!(table.insert(key(1, 42), FrameId(1)));
        assert!(!table.insert(key(1, 42), FrameId(2)));
        assert_eq!(table.get(key(1, 42)), Some(FrameId(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_same_page_number_different_files() {
        let mut table = PageTable::new(4);
        table.insert(key(1, 5), FrameId(0));
        table.insert(key(2, 5), FrameId(1));

        assert_eq!(table.get(key(1, 5)), Some(FrameId(0)));
        assert_eq!(table.get(key(2, 5)), Some(FrameId(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_many_entries_more_than_buckets() {
        let mut table = PageTable::new(1);
        for page in 1..=50 {
            assert!(table.insert(key(1, page), FrameId(page)));
        }
        for page in 1..=50 {
            assert_eq!(table.get(key(1, page)), Some(FrameId(page)));
        }
        for page in (1..=50).step_by(2) {
            table.remove(key(1, page));
        }
        assert_eq!(table.len(), 25);
        for page in 1..=50 {
            assert_eq!(table.contains(key(1, page)), page % 2 == 0);
        }
    }

    #[test]
    fn test_insert_remove_cycles() {
        let mut table = PageTable::new(8);
        for round in 0..1_000u32 {
            let k = key(round % 3, round);
            assert!(table.insert(k, FrameId(round % 8)));
            assert_eq!(table.remove(k), Some(FrameId(round % 8)));
        }
        assert!(table.is_empty());
    }
}
