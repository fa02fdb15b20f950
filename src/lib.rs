pub mod bigt;
pub mod config;
pub mod file;
pub mod heap;

pub use bigt::{BigT, BigTable, BigtError, BigtResult, Map, MapFilter, OrderType, Stream};
pub use config::Config;
pub use file::{BUFFER_POOL_SIZE, BufferManager, DiskManager, FileError, PAGE_SIZE, PageId};
pub use heap::{DataPageInfo, HeapError, HeapFile, HeapResult, Mid};
