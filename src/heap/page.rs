//! Slotted page used for both directory pages and data pages.
//!
//! ```text
//! +----------------------+
//! |    Page Header       |  20 bytes
//! +----------------------+
//! |    Slot Array        |  4 bytes per slot (offset u16, length u16)
//! +----------------------+
//! |    Free Space        |
//! +----------------------+
//! |    Record Data       |  packed against the end of the page
//! +----------------------+
//! ```
//!
//! Deleting a record compacts the record area, so free space is always one
//! contiguous gap between the slot array and `free_ptr`.

use super::error::{HeapError, HeapResult};
use super::record::SlotId;
use crate::file::{INVALID_PAGE, PageId};

/// Size of each slot in bytes
pub const SLOT_SIZE: usize = 4;

/// Length marker of a slot whose record has been deleted
const EMPTY_SLOT: u16 = u16::MAX;

/// What a heap page holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PageKind {
    Directory = 1,
    Data = 2,
}

impl PageKind {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(PageKind::Directory),
            2 => Some(PageKind::Data),
            _ => None,
        }
    }
}

/// Page header stored at the beginning of each page
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub slot_count: u16, // 2 bytes - Entries in the slot array, used or not
    pub free_ptr: u16,   // 2 bytes - Offset of the first record byte
    pub free_space: u16, // 2 bytes - Bytes between slot array and free_ptr
    pub kind: u16,       // 2 bytes - PageKind
    pub prev_page: PageId, // 4 bytes - Previous page in the chain
    pub next_page: PageId, // 4 bytes - Next page in the chain
    pub page_id: PageId, // 4 bytes - This page
}

impl PageHeader {
    pub const SIZE: usize = 20;

    fn new(page_id: PageId, kind: PageKind, page_size: usize) -> Self {
        Self {
            slot_count: 0,
            free_ptr: page_size as u16,
            free_space: (page_size - Self::SIZE) as u16,
            kind: kind as u16,
            prev_page: INVALID_PAGE,
            next_page: INVALID_PAGE,
            page_id,
        }
    }

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..2].copy_from_slice(&self.slot_count.to_be_bytes());
        result[2..4].copy_from_slice(&self.free_ptr.to_be_bytes());
        result[4..6].copy_from_slice(&self.free_space.to_be_bytes());
        result[6..8].copy_from_slice(&self.kind.to_be_bytes());
        result[8..12].copy_from_slice(&self.prev_page.to_be_bytes());
        result[12..16].copy_from_slice(&self.next_page.to_be_bytes());
        result[16..20].copy_from_slice(&self.page_id.to_be_bytes());
        result
    }

    pub fn deserialize(data: &[u8]) -> Self {
        let u16_at = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let i32_at = |i: usize| i32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        Self {
            slot_count: u16_at(0),
            free_ptr: u16_at(2),
            free_space: u16_at(4),
            kind: u16_at(6),
            prev_page: i32_at(8),
            next_page: i32_at(12),
            page_id: i32_at(16),
        }
    }
}

/// Zero-copy view of a heap page that operates directly on buffer pool
/// memory. `HeapPage<&[u8]>` reads, `HeapPage<&mut [u8]>` also writes.
pub struct HeapPage<B> {
    buffer: B,
    header: PageHeader, // Cached header for fast access
}

impl<B> HeapPage<B> {
    /// Largest record an empty data page of `page_size` bytes can hold
    pub fn max_record_size(page_size: usize) -> usize {
        page_size.saturating_sub(PageHeader::SIZE + SLOT_SIZE)
    }
}

impl<B: AsRef<[u8]>> HeapPage<B> {
    /// Wrap an initialized page, checking that it is of the expected kind
    pub fn open(buffer: B, expected: PageKind) -> HeapResult<Self> {
        let data = buffer.as_ref();
        if data.len() < PageHeader::SIZE {
            return Err(HeapError::CorruptPage {
                page_id: INVALID_PAGE,
                reason: format!("page buffer of {} bytes", data.len()),
            });
        }

        let header = PageHeader::deserialize(&data[..PageHeader::SIZE]);
        if PageKind::from_u16(header.kind) != Some(expected) {
            return Err(HeapError::UnexpectedPageKind {
                page_id: header.page_id,
                expected,
            });
        }

        let slots_end = PageHeader::SIZE + header.slot_count as usize * SLOT_SIZE;
        if header.free_ptr as usize > data.len()
            || slots_end > header.free_ptr as usize
            || slots_end + header.free_space as usize != header.free_ptr as usize
        {
            return Err(HeapError::CorruptPage {
                page_id: header.page_id,
                reason: "slot array overlaps record area".to_string(),
            });
        }

        Ok(Self { buffer, header })
    }

    pub fn page_id(&self) -> PageId {
        self.header.page_id
    }

    pub fn prev_page(&self) -> PageId {
        self.header.prev_page
    }

    pub fn next_page(&self) -> PageId {
        self.header.next_page
    }

    /// Space a new record may use, leaving room for its slot
    pub fn available_space(&self) -> usize {
        (self.header.free_space as usize).saturating_sub(SLOT_SIZE)
    }

    /// Get record data from a slot
    pub fn get_record(&self, slot_id: SlotId) -> HeapResult<&[u8]> {
        let (offset, length) = self.used_slot(slot_id)?;
        Ok(&self.buffer.as_ref()[offset..offset + length])
    }

    /// First used slot, if any
    pub fn first_record(&self) -> Option<SlotId> {
        (0..self.header.slot_count as usize).find(|&slot_id| self.is_slot_used(slot_id))
    }

    /// Next used slot after `slot_id`
    pub fn next_record(&self, slot_id: SlotId) -> Option<SlotId> {
        (slot_id + 1..self.header.slot_count as usize).find(|&slot_id| self.is_slot_used(slot_id))
    }

    /// Number of live records
    pub fn record_count(&self) -> usize {
        (0..self.header.slot_count as usize)
            .filter(|&slot_id| self.is_slot_used(slot_id))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.first_record().is_none()
    }

    pub fn is_slot_used(&self, slot_id: SlotId) -> bool {
        slot_id < self.header.slot_count as usize && self.slot(slot_id).1 != EMPTY_SLOT
    }

    fn slot(&self, slot_id: SlotId) -> (u16, u16) {
        let start = PageHeader::SIZE + slot_id * SLOT_SIZE;
        let data = self.buffer.as_ref();
        (
            u16::from_be_bytes([data[start], data[start + 1]]),
            u16::from_be_bytes([data[start + 2], data[start + 3]]),
        )
    }

    fn used_slot(&self, slot_id: SlotId) -> HeapResult<(usize, usize)> {
        if !self.is_slot_used(slot_id) {
            return Err(HeapError::InvalidSlot(self.header.page_id, slot_id));
        }
        let (offset, length) = self.slot(slot_id);
        Ok((offset as usize, length as usize))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<B> {
    /// Format `buffer` as an empty page with no neighbours
    pub fn init(mut buffer: B, page_id: PageId, kind: PageKind) -> Self {
        let data = buffer.as_mut();
        let header = PageHeader::new(page_id, kind, data.len());

        data.fill(0);
        data[..PageHeader::SIZE].copy_from_slice(&header.serialize());

        Self { buffer, header }
    }

    pub fn set_prev_page(&mut self, page_id: PageId) {
        self.header.prev_page = page_id;
        self.write_header();
    }

    pub fn set_next_page(&mut self, page_id: PageId) {
        self.header.next_page = page_id;
        self.write_header();
    }

    /// Store a record, reusing an empty slot when there is one
    pub fn insert_record(&mut self, record: &[u8]) -> HeapResult<SlotId> {
        let reused = (0..self.header.slot_count as usize).find(|&slot_id| !self.is_slot_used(slot_id));
        let needed = record.len() + if reused.is_some() { 0 } else { SLOT_SIZE };
        if needed > self.header.free_space as usize {
            return Err(HeapError::NoSpace(record.len()));
        }

        let slot_id = reused.unwrap_or(self.header.slot_count as usize);
        let offset = self.header.free_ptr as usize - record.len();
        self.buffer.as_mut()[offset..offset + record.len()].copy_from_slice(record);
        self.set_slot(slot_id, offset as u16, record.len() as u16);

        if reused.is_none() {
            self.header.slot_count += 1;
        }
        self.header.free_ptr = offset as u16;
        self.header.free_space -= needed as u16;
        self.write_header();

        Ok(slot_id)
    }

    /// Remove a record and close the gap it leaves in the record area
    pub fn delete_record(&mut self, slot_id: SlotId) -> HeapResult<()> {
        let (offset, length) = self.used_slot(slot_id)?;
        let free_ptr = self.header.free_ptr as usize;

        // Records stored below the deleted one move up by its length
        self.buffer
            .as_mut()
            .copy_within(free_ptr..offset, free_ptr + length);
        for other in 0..self.header.slot_count as usize {
            if other != slot_id && self.is_slot_used(other) {
                let (other_offset, other_length) = self.slot(other);
                if (other_offset as usize) < offset {
                    self.set_slot(other, other_offset + length as u16, other_length);
                }
            }
        }
        self.set_slot(slot_id, 0, EMPTY_SLOT);

        self.header.free_ptr += length as u16;
        self.header.free_space += length as u16;

        // Trailing empty slots give their space back
        while self.header.slot_count > 0
            && !self.is_slot_used(self.header.slot_count as usize - 1)
        {
            self.header.slot_count -= 1;
            self.header.free_space += SLOT_SIZE as u16;
        }
        self.write_header();

        Ok(())
    }

    /// Mutable record bytes, for same-length overwrites
    pub fn get_record_mut(&mut self, slot_id: SlotId) -> HeapResult<&mut [u8]> {
        let (offset, length) = self.used_slot(slot_id)?;
        Ok(&mut self.buffer.as_mut()[offset..offset + length])
    }

    fn set_slot(&mut self, slot_id: SlotId, offset: u16, length: u16) {
        let start = PageHeader::SIZE + slot_id * SLOT_SIZE;
        let data = self.buffer.as_mut();
        data[start..start + 2].copy_from_slice(&offset.to_be_bytes());
        data[start + 2..start + 4].copy_from_slice(&length.to_be_bytes());
    }

    fn write_header(&mut self) {
        let header = self.header.serialize();
        self.buffer.as_mut()[..PageHeader::SIZE].copy_from_slice(&header);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PAGE_SIZE: usize = 256;

    fn new_page(buffer: &mut [u8], kind: PageKind) -> HeapPage<&mut [u8]> {
        HeapPage::init(buffer, 5, kind)
    }

    #[test]
    fn test_page_creation() {
        let mut buffer = vec![0xAAu8; TEST_PAGE_SIZE];
        let page = new_page(&mut buffer, PageKind::Data);

        assert_eq!(page.page_id(), 5);
        assert_eq!(page.prev_page(), INVALID_PAGE);
        assert_eq!(page.next_page(), INVALID_PAGE);
        assert!(page.is_empty());
        assert_eq!(
            page.available_space(),
            HeapPage::<&[u8]>::max_record_size(TEST_PAGE_SIZE)
        );
    }

    #[test]
    fn test_insert_and_get_records() {
        let mut buffer = vec![0u8; TEST_PAGE_SIZE];
        let mut page = new_page(&mut buffer, PageKind::Data);

        let a = page.insert_record(b"alpha").unwrap();
        let b = page.insert_record(b"").unwrap();
        let c = page.insert_record(b"gamma-gamma").unwrap();

        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(page.get_record(a).unwrap(), b"alpha");
        assert_eq!(page.get_record(b).unwrap(), b"");
        assert_eq!(page.get_record(c).unwrap(), b"gamma-gamma");
        assert_eq!(page.record_count(), 3);
        assert_eq!(
            page.available_space(),
            TEST_PAGE_SIZE - PageHeader::SIZE - 3 * SLOT_SIZE - 16 - SLOT_SIZE
        );
    }

    #[test]
    fn test_delete_compacts_and_reuses_slot() {
        let mut buffer = vec![0u8; TEST_PAGE_SIZE];
        let mut page = new_page(&mut buffer, PageKind::Data);

        let a = page.insert_record(b"aaaa").unwrap();
        let b = page.insert_record(b"bbbbbbbb").unwrap();
        let c = page.insert_record(b"cc").unwrap();
        let before = page.available_space();

        page.delete_record(b).unwrap();
        assert!(!page.is_slot_used(b));
        assert_eq!(page.available_space(), before + 8);
        assert_eq!(page.get_record(a).unwrap(), b"aaaa");
        assert_eq!(page.get_record(c).unwrap(), b"cc");
        assert!(matches!(page.get_record(b), Err(HeapError::InvalidSlot(5, 1))));

        // The hole in the slot array is filled first
        let d = page.insert_record(b"dd").unwrap();
        assert_eq!(d, b);
        assert_eq!(page.get_record(d).unwrap(), b"dd");
        assert_eq!(page.get_record(c).unwrap(), b"cc");
    }

    #[test]
    fn test_delete_last_slots_shrinks_slot_array() {
        let mut buffer = vec![0u8; TEST_PAGE_SIZE];
        let mut page = new_page(&mut buffer, PageKind::Data);
        let empty_space = page.available_space();

        let a = page.insert_record(b"one").unwrap();
        let b = page.insert_record(b"two").unwrap();
        page.delete_record(a).unwrap();
        page.delete_record(b).unwrap();

        assert!(page.is_empty());
        assert_eq!(page.available_space(), empty_space);
        assert!(matches!(page.delete_record(a), Err(HeapError::InvalidSlot(_, _))));
    }

    #[test]
    fn test_iteration_skips_deleted() {
        let mut buffer = vec![0u8; TEST_PAGE_SIZE];
        let mut page = new_page(&mut buffer, PageKind::Data);

        for record in [&b"r0"[..], b"r1", b"r2", b"r3"] {
            page.insert_record(record).unwrap();
        }
        page.delete_record(0).unwrap();
        page.delete_record(2).unwrap();

        assert_eq!(page.first_record(), Some(1));
        assert_eq!(page.next_record(1), Some(3));
        assert_eq!(page.next_record(3), None);
    }

    #[test]
    fn test_page_full() {
        let mut buffer = vec![0u8; TEST_PAGE_SIZE];
        let mut page = new_page(&mut buffer, PageKind::Data);

        let max = HeapPage::<&[u8]>::max_record_size(TEST_PAGE_SIZE);
        let big = vec![7u8; max];
        page.insert_record(&big).unwrap();
        assert_eq!(page.available_space(), 0);
        assert!(matches!(page.insert_record(b"x"), Err(HeapError::NoSpace(1))));
    }

    #[test]
    fn test_update_in_place() {
        let mut buffer = vec![0u8; TEST_PAGE_SIZE];
        let mut page = new_page(&mut buffer, PageKind::Data);

        let slot = page.insert_record(b"before").unwrap();
        page.get_record_mut(slot).unwrap().copy_from_slice(b"after!");
        assert_eq!(page.get_record(slot).unwrap(), b"after!");
    }

    #[test]
    fn test_reopen_from_buffer() {
        let mut buffer = vec![0u8; TEST_PAGE_SIZE];
        {
            let mut page = new_page(&mut buffer, PageKind::Directory);
            page.insert_record(&[1u8; 12]).unwrap();
            page.set_prev_page(3);
            page.set_next_page(42);
        }

        let page = HeapPage::open(&buffer[..], PageKind::Directory).unwrap();
        assert_eq!(page.prev_page(), 3);
        assert_eq!(page.next_page(), 42);
        assert_eq!(page.get_record(0).unwrap(), &[1u8; 12]);

        let result = HeapPage::open(&buffer[..], PageKind::Data);
        assert!(matches!(
            result,
            Err(HeapError::UnexpectedPageKind {
                page_id: 5,
                expected: PageKind::Data
            })
        ));
    }

    #[test]
    fn test_open_zeroed_buffer_fails() {
        let buffer = vec![0u8; TEST_PAGE_SIZE];
        let result = HeapPage::open(&buffer[..], PageKind::Data);
        assert!(matches!(result, Err(HeapError::UnexpectedPageKind { .. })));
    }
}
