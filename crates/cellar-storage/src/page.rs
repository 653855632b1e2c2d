//! Slotted page format.
//!
//! Page layout:
//! ```text
//! +------------------+
//! | Page Header (16) |
//! +------------------+
//! | Slot Array       |  <- Grows downward
//! | (4 bytes/slot)   |
//! +------------------+
//! |                  |
//! | Free Space       |
//! |                  |
//! +------------------+
//! | Record Data      |  <- Grows upward
//! +------------------+
//! ```

use cellar_common::page::{PageId, PAGE_SIZE};
use cellar_common::{CellarError, Result};

/// Identifies a record: the page holding it and its slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    /// Creates a new RecordId.
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.page_id, self.slot)
    }
}

/// A slot in the slot array pointing to record data.
///
/// Layout (4 bytes):
/// - offset: 2 bytes (0 = empty slot)
/// - length: 2 bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slot {
    offset: u16,
    length: u16,
}

impl Slot {
    const SIZE: usize = 4;

    fn is_empty(&self) -> bool {
        self.offset == 0
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.offset.to_le_bytes());
        buf[2..4].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            offset: u16::from_le_bytes([buf[0], buf[1]]),
            length: u16::from_le_bytes([buf[2], buf[3]]),
        }
    }
}

/// Header at the start of every page.
///
/// Layout (16 bytes):
/// - page_number: 4 bytes (0 = unused page)
/// - slot_count: 2 bytes
/// - free_space_start: 2 bytes (end of slot array)
/// - free_space_end: 2 bytes (start of record data)
/// - next_free: 4 bytes (free-list link, used by the owning file)
/// - reserved: 2 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_number: PageId,
    pub slot_count: u16,
    pub free_space_start: u16,
    pub free_space_end: u16,
    pub next_free: PageId,
}

impl PageHeader {
    /// Size of the page header in bytes.
    pub const SIZE: usize = 16;

    fn new(page_number: PageId) -> Self {
        Self {
            page_number,
            slot_count: 0,
            free_space_start: Self::SIZE as u16,
            free_space_end: PAGE_SIZE as u16,
            next_free: PageId::INVALID,
        }
    }

    /// Returns the contiguous free space between slot array and record data.
    pub fn free_space(&self) -> usize {
        self.free_space_end.saturating_sub(self.free_space_start) as usize
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_number.0.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot_count.to_le_bytes());
        buf[6..8].copy_from_slice(&self.free_space_start.to_le_bytes());
        buf[8..10].copy_from_slice(&self.free_space_end.to_le_bytes());
        buf[10..14].copy_from_slice(&self.next_free.0.to_le_bytes());
        // bytes 14-15 are reserved
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_number: PageId(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            slot_count: u16::from_le_bytes([buf[4], buf[5]]),
            free_space_start: u16::from_le_bytes([buf[6], buf[7]]),
            free_space_end: u16::from_le_bytes([buf[8], buf[9]]),
            next_free: PageId(u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]])),
        }
    }
}

/// A fixed-size page holding variable-length records.
#[derive(Clone)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Creates an empty page with the given page number.
    pub fn new(page_number: PageId) -> Self {
        let mut page = Self {
            data: Box::new([0u8; PAGE_SIZE]),
        };
        page.set_header(PageHeader::new(page_number));
        page
    }

    /// Creates a page from raw page data.
    pub fn from_bytes(data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self { data }
    }

    /// Returns the raw page data.
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Returns the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data[..PageHeader::SIZE])
    }

    fn set_header(&mut self, header: PageHeader) {
        self.data[..PageHeader::SIZE].copy_from_slice(&header.to_bytes());
    }

    /// Returns the number of this page within its file.
    pub fn page_number(&self) -> PageId {
        self.header().page_number
    }


    pub(crate) fn next_free(&self) -> PageId {
        self.header().next_free
    }

    pub(crate) fn set_next_free(&mut self, next: PageId) {
        let mut header = self.header();
        header.next_free = next;
        self.set_header(header);
    }

    /// Returns the contiguous free space on the page.
    pub fn free_space(&self) -> usize {
        self.header().free_space()
    }

    /// Returns true if a record of `len` bytes fits, possibly after compaction.
    pub fn has_space_for(&self, len: usize) -> bool {
        let header = self.header();
        let slot_cost = if self.first_empty_slot(&header).is_some() {
            0
        } else {
            Slot::SIZE
        };
        len + slot_cost <= header.free_space() + self.fragmented_space(&header)
    }

    /// Copies another page's bytes into this page's buffer.
    pub fn copy_from(&mut self, src: &Page) {
        *self.data = *src.data;
    }

    /// Zeroes the page.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    fn slot(&self, index: u16) -> Slot {
        let offset = PageHeader::SIZE + index as usize * Slot::SIZE;
        Slot::from_bytes(&self.data[offset..offset + Slot::SIZE])
    }

    fn set_slot(&mut self, index: u16, slot: Slot) {
        let offset = PageHeader::SIZE + index as usize * Slot::SIZE;
        self.data[offset..offset + Slot::SIZE].copy_from_slice(&slot.to_bytes());
    }

    fn first_empty_slot(&self, header: &PageHeader) -> Option<u16> {
        (0..header.slot_count).find(|&i| self.slot(i).is_empty())
    }

    /// Bytes held by deleted or shrunk records that compaction would reclaim.
    fn fragmented_space(&self, header: &PageHeader) -> usize {
        let live: usize = (0..header.slot_count)
            .map(|i| self.slot(i))
            .filter(|s| !s.is_empty())
            .map(|s| s.length as usize)
            .sum();
        (PAGE_SIZE - header.free_space_end as usize) - live
    }

    fn live_slot(&self, rid: RecordId) -> Result<Slot> {
        let header = self.header();
        if rid.page_id != header.page_number || rid.slot >= header.slot_count {
            return Err(CellarError::RecordNotFound {
                page_id: rid.page_id,
                slot: rid.slot,
            });
        }
        let slot = self.slot(rid.slot);
        if slot.is_empty() {
            return Err(CellarError::RecordNotFound {
                page_id: rid.page_id,
                slot: rid.slot,
            });
        }
        Ok(slot)
    }

    /// Moves all live records to the end of the page, closing holes.
    fn compact(&mut self) {
        let mut header = self.header();
        let records: Vec<(u16, Vec<u8>)> = (0..header.slot_count)
            .filter_map(|i| {
                let slot = self.slot(i);
                if slot.is_empty() {
                    return None;
                }
                let start = slot.offset as usize;
                Some((i, self.data[start..start + slot.length as usize].to_vec()))
            })
            .collect();

        header.free_space_end = PAGE_SIZE as u16;
        for (index, bytes) in records {
            header.free_space_end -= bytes.len() as u16;
            let start = header.free_space_end as usize;
            self.data[start..start + bytes.len()].copy_from_slice(&bytes);
            self.set_slot(
                index,
                Slot {
                    offset: header.free_space_end,
                    length: bytes.len() as u16,
                },
            );
        }
        self.set_header(header);
    }

    /// Reserves `len` bytes of record space, compacting if needed.
    fn reserve(&mut self, len: usize, extra: usize) -> Result<u16> {
        if self.header().free_space() < len + extra {
            self.compact();
        }
        let mut header = self.header();
        if header.free_space() < len + extra {
            return Err(CellarError::PageFull);
        }
        header.free_space_end -= len as u16;
        let offset = header.free_space_end;
        self.set_header(header);
        Ok(offset)
    }

    /// Inserts a record and returns its id.
    pub fn insert_record(&mut self, record: &[u8]) -> Result<RecordId> {
        if !self.has_space_for(record.len()) {
            return Err(CellarError::PageFull);
        }

        let reuse = self.first_empty_slot(&self.header());
        let extra = if reuse.is_some() { 0 } else { Slot::SIZE };
        let offset = self.reserve(record.len(), extra)?;

        let start = offset as usize;
        self.data[start..start + record.len()].copy_from_slice(record);

        let mut header = self.header();
        let index = match reuse {
            Some(index) => index,
            None => {
                let index = header.slot_count;
                header.slot_count += 1;
                header.free_space_start += Slot::SIZE as u16;
                self.set_header(header);
                index
            }
        };
        self.set_slot(
            index,
            Slot {
                offset,
                length: record.len() as u16,
            },
        );

        Ok(RecordId::new(header.page_number, index))
    }

    /// Returns the bytes of a record.
    pub fn get_record(&self, rid: RecordId) -> Result<&[u8]> {
        let slot = self.live_slot(rid)?;
        let start = slot.offset as usize;
        Ok(&self.data[start..start + slot.length as usize])
    }

    /// Replaces a record's bytes, keeping its id.
    pub fn update_record(&mut self, rid: RecordId, record: &[u8]) -> Result<()> {
        let slot = self.live_slot(rid)?;

        if record.len() <= slot.length as usize {
            let start = slot.offset as usize;
            self.data[start..start + record.len()].copy_from_slice(record);
            self.set_slot(
                rid.slot,
                Slot {
                    offset: slot.offset,
                    length: record.len() as u16,
                },
            );
            return Ok(());
        }

        let header = self.header();
        let available =
            header.free_space() + self.fragmented_space(&header) + slot.length as usize;
        if record.len() > available {
            return Err(CellarError::PageFull);
        }

        // Release the old bytes first so compaction can reuse them.
        self.set_slot(rid.slot, Slot::default());
        let offset = self.reserve(record.len(), 0)?;
        let start = offset as usize;
        self.data[start..start + record.len()].copy_from_slice(record);
        self.set_slot(
            rid.slot,
            Slot {
                offset,
                length: record.len() as u16,
            },
        );
        Ok(())
    }

    /// Deletes a record. Its slot is reused by the next insert.
    pub fn delete_record(&mut self, rid: RecordId) -> Result<()> {
        self.live_slot(rid)?;
        self.set_slot(rid.slot, Slot::default());
        Ok(())
    }

    /// Returns the number of live records.
    pub fn record_count(&self) -> usize {
        let header = self.header();
        (0..header.slot_count)
            .filter(|&i| !self.slot(i).is_empty())
            .count()
    }

    /// Iterates over live records in slot order.
    pub fn records(&self) -> RecordIter<'_> {
        RecordIter {
            page: self,
            header: self.header(),
            next: 0,
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header = self.header();
        f.debug_struct("Page")
            .field("page_number", &header.page_number)
            .field("slot_count", &header.slot_count)
            .field("free_space", &header.free_space())
            .finish()
    }
}

/// Iterator over the live records of a page.
pub struct RecordIter<'a> {
    page: &'a Page,
    header: PageHeader,
    next: u16,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = (RecordId, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.header.slot_count {
            let index = self.next;
            self.next += 1;
            let slot = self.page.slot(index);
            if slot.is_empty() {
                continue;
            }
            let start = slot.offset as usize;
            let rid = RecordId::new(self.header.page_number, index);
            return Some((rid, &self.page.data[start..start + slot.length as usize]));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_page() {
        let page = Page::new(PageId(3));
        assert_eq!(page.page_number(), PageId(3));
        assert_eq!(page.record_count(), 0);
        assert_eq!(page.free_space(), PAGE_SIZE - PageHeader::SIZE);
    }

    #[test]
    fn test_insert_and_get_record() {
        let mut page = Page::new(PageId(1));
        let rid = page.insert_record(b"hello!").unwrap();

        assert_eq!(rid, RecordId::new(PageId(1), 0));
        assert_eq!(page.get_record(rid).unwrap(), b"hello!");
        assert_eq!(page.record_count(), 1);
    }

    #[test]
    fn test_multiple_records() {
        let mut page = Page::new(PageId(1));
        let a = page.insert_record(b"hello!").unwrap();
        let b = page.insert_record(b"world!").unwrap();

        assert_ne!(a, b);
        assert_eq!(page.get_record(a).unwrap(), b"hello!");
        assert_eq!(page.get_record(b).unwrap(), b"world!");
    }

    #[test]
    fn test_get_record_wrong_page() {
        let mut page = Page::new(PageId(1));
        page.insert_record(b"x").unwrap();

        let result = page.get_record(RecordId::new(PageId(2), 0));
        assert!(matches!(result, Err(CellarError::RecordNotFound { .. })));
    }

    #[test]
    fn test_delete_record_and_slot_reuse() {
        let mut page = Page::new(PageId(1));
        let a = page.insert_record(b"first").unwrap();
        page.insert_record(b"second").unwrap();

        page.delete_record(a).unwrap();
        assert!(page.get_record(a).is_err());
        assert_eq!(page.record_count(), 1);

        let c = page.insert_record(b"third").unwrap();
        assert_eq!(c.slot, a.slot);
        assert_eq!(page.get_record(c).unwrap(), b"third");
    }

    #[test]
    fn test_delete_missing_record() {
        let mut page = Page::new(PageId(1));
        let result = page.delete_record(RecordId::new(PageId(1), 5));
        assert!(matches!(result, Err(CellarError::RecordNotFound { .. })));
    }

    #[test]
    fn test_update_record_shrink_and_grow() {
        let mut page = Page::new(PageId(1));
        let rid = page.insert_record(b"abcdef").unwrap();

        page.update_record(rid, b"xy").unwrap();
        assert_eq!(page.get_record(rid).unwrap(), b"xy");

        page.update_record(rid, b"a much longer record").unwrap();
        assert_eq!(page.get_record(rid).unwrap(), b"a much longer record");
    }

    #[test]
    fn test_page_full() {
        let mut page = Page::new(PageId(1));
        let big = vec![7u8; 1000];
        let mut inserted = 0;
        while page.insert_record(&big).is_ok() {
            inserted += 1;
        }
        assert_eq!(inserted, 8);
        assert!(!page.has_space_for(1000));
        assert!(matches!(
            page.insert_record(&big),
            Err(CellarError::PageFull)
        ));
    }

    #[test]
    fn test_compaction_reclaims_deleted_space() {
        let mut page = Page::new(PageId(1));
        let big = vec![1u8; 1000];
        let rids: Vec<_> = (0..8).map(|_| page.insert_record(&big).unwrap()).collect();

        page.delete_record(rids[2]).unwrap();
        page.delete_record(rids[5]).unwrap();

        let other = vec![2u8; 1500];
        let rid = page.insert_record(&other).unwrap();
        assert_eq!(page.get_record(rid).unwrap(), &other[..]);
        assert_eq!(page.get_record(rids[7]).unwrap(), &big[..]);
    }

    #[test]
    fn test_records_iterator_skips_deleted() {
        let mut page = Page::new(PageId(4));
        let a = page.insert_record(b"a").unwrap();
        let b = page.insert_record(b"b").unwrap();
        let c = page.insert_record(b"c").unwrap();
        page.delete_record(b).unwrap();

        let records: Vec<_> = page.records().collect();
        assert_eq!(records, vec![(a, &b"a"[..]), (c, &b"c"[..])]);
    }

    #[test]
    fn test_bytes_roundtrip_preserves_records() {
        let mut page = Page::new(PageId(9));
        let rid = page.insert_record(b"persisted").unwrap();

        let copy = Page::from_bytes(Box::new(*page.as_bytes()));
        assert_eq!(copy.page_number(), PageId(9));
        assert_eq!(copy.get_record(rid).unwrap(), b"persisted");
    }

    #[test]
    fn test_copy_from() {
        let mut src = Page::new(PageId(5));
        let rid = src.insert_record(b"copied").unwrap();

        let mut dst = Page::new(PageId(1));
        dst.copy_from(&src);
        assert_eq!(dst.page_number(), PageId(5));
        assert_eq!(dst.get_record(rid).unwrap(), b"copied");
    }

    #[test]
    fn test_clear() {
        let mut page = Page::new(PageId(2));
        page.insert_record(b"data").unwrap();
        page.clear();
        assert_eq!(page.page_number(), PageId::INVALID);
        assert!(page.as_bytes().iter().all(|&b| b == 0));
    }
}
