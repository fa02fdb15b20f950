use crate::file::{FileError, PageId};
use thiserror::Error;

use super::page::PageKind;
use super::record::{Mid, SlotId};

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("Record not found: {0}")]
    NotFound(Mid),

    #[error("Update size mismatch: stored record is {expected} bytes, new record is {actual} bytes")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("No space for a record of {0} bytes")]
    NoSpace(usize),

    #[error("Heap file already deleted: {0}")]
    AlreadyDeleted(String),

    #[error("Directory entry must be {expected} bytes, got {actual}")]
    WrongSize { expected: usize, actual: usize },

    #[error("Invalid slot: page_id={0}, slot_id={1}")]
    InvalidSlot(PageId, SlotId),

    #[error("Page {page_id} is not a {expected:?} page")]
    UnexpectedPageKind { page_id: PageId, expected: PageKind },

    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Buffer manager error in {op}: {source}")]
    BufferManager {
        op: &'static str,
        #[source]
        source: FileError,
    },

    #[error("Disk manager error in {op}: {source}")]
    Disk {
        op: &'static str,
        #[source]
        source: FileError,
    },
}

impl HeapError {
    /// True when the buffer pool had no unpinned frame left
    pub fn is_buffer_pool_exhausted(&self) -> bool {
        matches!(
            self,
            HeapError::BufferManager {
                source: FileError::BufferPoolExhausted(_),
                ..
            }
        )
    }
}

pub type HeapResult<T> = Result<T, HeapError>;
