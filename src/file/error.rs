use std::io;
use thiserror::Error;

use super::{MAX_PAGE_SIZE, MIN_PAGE_SIZE, PageId};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Database already exists: {0}")]
    DatabaseAlreadyExists(String),

    #[error("Invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("Invalid page run length: {0}")]
    InvalidPageCount(usize),

    #[error("Page not allocated: page_id={0}")]
    PageNotAllocated(PageId),

    #[error("Page not pinned: page_id={0}")]
    PageNotPinned(PageId),

    #[error("Page still pinned: page_id={page_id}, pin_count={pin_count}")]
    PagePinned { page_id: PageId, pin_count: u32 },

    #[error("Buffer pool exhausted: all {0} frames are pinned")]
    BufferPoolExhausted(usize),

    #[error("Unsupported page size {0}: must be within {min}..={max}", min = MIN_PAGE_SIZE, max = MAX_PAGE_SIZE)]
    UnsupportedPageSize(usize),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("File entry not found: {0}")]
    FileEntryNotFound(String),

    #[error("File entry already exists: {0}")]
    DuplicateFileEntry(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type FileResult<T> = Result<T, FileError>;
