use super::error::{HeapError, HeapResult};
use crate::file::{INVALID_PAGE, PageId};

/// Directory entry describing one data page. This is the record type stored
/// on directory pages.
///
/// On-page layout (12 bytes, big-endian):
///
/// ```text
/// +----------------+----------------+----------------+
/// | avail_space i32| rec_count i32  | page_id i32    |
/// +----------------+----------------+----------------+
/// ```
///
/// The entry is a plain value: read it off the directory page, change it,
/// and write the encoded bytes back into the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPageInfo {
    /// Free space of the data page as reported by the page itself
    pub avail_space: i32,
    /// Number of live records on the data page
    pub rec_count: i32,
    /// The data page this entry describes
    pub page_id: PageId,
}

impl DataPageInfo {
    pub const SIZE: usize = 12;

    /// Entry for a freshly initialized, empty data page
    pub fn new(page_id: PageId, avail_space: usize) -> Self {
        Self {
            avail_space: avail_space as i32,
            rec_count: 0,
            page_id,
        }
    }

    pub fn decode(bytes: &[u8]) -> HeapResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(HeapError::WrongSize {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            avail_space: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            rec_count: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            page_id: i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&self.avail_space.to_be_bytes());
        result[4..8].copy_from_slice(&self.rec_count.to_be_bytes());
        result[8..12].copy_from_slice(&self.page_id.to_be_bytes());
        result
    }
}

impl Default for DataPageInfo {
    fn default() -> Self {
        Self {
            avail_space: 0,
            rec_count: 0,
            page_id: INVALID_PAGE,
        }
    }
}
