mod buffer_manager;
mod disk_manager;
mod error;

pub use buffer_manager::BufferManager;
pub use disk_manager::DiskManager;
pub use error::{FileError, FileResult};

/// Default page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Smallest page size a heap file can work with: a page header, one slot
/// and one directory entry must fit
pub const MIN_PAGE_SIZE: usize = 64;

/// Slot offsets are 16-bit
pub const MAX_PAGE_SIZE: usize = u16::MAX as usize;

/// Default number of frames in the buffer pool
pub const BUFFER_POOL_SIZE: usize = 1024;

/// Page ID type. Stored on disk as a 4-byte integer.
pub type PageId = i32;

/// Sentinel meaning "no page" / end of a page chain
pub const INVALID_PAGE: PageId = -1;
