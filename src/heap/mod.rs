//! Heap files: unordered record storage over slotted pages
//!
//! A heap file is a chain of directory pages whose records are
//! `DataPageInfo` entries, one per data page. Data pages hold the user
//! records. Every page is reached through the buffer manager's pin/unpin
//! protocol.

mod data_page_info;
mod error;
mod heap_file;
mod page;
mod record;
mod scan;

pub use data_page_info::DataPageInfo;
pub use error::{HeapError, HeapResult};
pub use heap_file::HeapFile;
pub use page::{HeapPage, PageHeader, PageKind, SLOT_SIZE};
pub use record::{Mid, SlotId};
pub use scan::Scan;
