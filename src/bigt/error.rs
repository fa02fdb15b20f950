use crate::file::FileError;
use crate::heap::HeapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BigtError {
    #[error("Heap file error: {0}")]
    Heap(#[from] HeapError),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid order type: {0}")]
    InvalidOrderType(u8),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Malformed map record: {0}")]
    MapDecode(String),

    #[error("{field} is {len} bytes, longer than a map can store")]
    KeyTooLong { field: &'static str, len: usize },

    #[error("Partition {part} does not exist, table has {parts}")]
    InvalidPartition { part: usize, parts: usize },

    #[error("Invalid CSV row {line}: {reason}")]
    InvalidCsvRow { line: u64, reason: String },

    #[error("Stream is closed")]
    StreamClosed,
}

pub type BigtResult<T> = Result<T, BigtError>;
