use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{INVALID_PAGE, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PageId};

/// Space map and file directory of a database, persisted next to the
/// page file as JSON
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    page_size: usize,
    /// First page id past the end of the allocated region
    next_page: PageId,
    /// Pages released by `deallocate_page`, reused lowest first
    free_pages: BTreeSet<PageId>,
    /// File name -> first (header) page of that file
    files: BTreeMap<String, PageId>,
}

/// Manages the paged database file, page allocation and the file catalog
pub struct DiskManager {
    file: File,
    path: PathBuf,
    catalog_path: PathBuf,
    catalog: Catalog,
}

impl DiskManager {
    /// Create a new, empty database
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        let path = path.as_ref();
        check_page_size(page_size)?;

        if path.exists() {
            return Err(FileError::DatabaseAlreadyExists(path.display().to_string()));
        }

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut manager = Self {
            file,
            path: path.to_path_buf(),
            catalog_path: Self::catalog_path(path),
            catalog: Catalog {
                page_size,
                ..Catalog::default()
            },
        };
        manager.write_catalog()?;
        Ok(manager)
    }

    /// Open an existing database
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        let path = path.as_ref();
        check_page_size(page_size)?;
        if !path.exists() {
            return Err(FileError::DatabaseNotFound(path.display().to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let catalog_path = Self::catalog_path(path);
        let catalog: Catalog = serde_json::from_slice(&std::fs::read(&catalog_path)?)?;

        if catalog.page_size != page_size {
            return Err(FileError::InvalidPageSize {
                expected: catalog.page_size,
                actual: page_size,
            });
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            catalog_path,
            catalog,
        })
    }

    /// Open the database at `path`, creating it when missing
    pub fn open_or_create<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        if path.as_ref().exists() {
            Self::open(path, page_size)
        } else {
            Self::create(path, page_size)
        }
    }

    /// Location of the catalog belonging to the database at `path`
    pub fn catalog_path<P: AsRef<Path>>(path: P) -> PathBuf {
        let mut name = path.as_ref().as_os_str().to_owned();
        name.push(".catalog.json");
        PathBuf::from(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.catalog.page_size
    }

    /// Read a page from the file
    pub fn read_page(&mut self, page_id: PageId, buffer: &mut [u8]) -> FileResult<()> {
        let offset = self.page_offset(page_id, buffer.len())?;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut bytes_read = 0;
        while bytes_read < buffer.len() {
            let n = self.file.read(&mut buffer[bytes_read..])?;
            if n == 0 {
                break;
            }
            bytes_read += n;
        }

        // Pages past the end of the file read back as zeros
        buffer[bytes_read..].fill(0);
        Ok(())
    }

    /// Write a page to the file
    pub fn write_page(&mut self, page_id: PageId, buffer: &[u8]) -> FileResult<()> {
        let offset = self.page_offset(page_id, buffer.len())?;
        let required_size = offset + buffer.len() as u64;

        // Extend file if necessary to ensure we can write at this offset
        let current_size = self.file.metadata()?.len();
        if current_size < required_size {
            self.file.set_len(required_size)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        // Durability comes from sync(), called by BufferManager::flush_all
        Ok(())
    }

    /// Allocate a run of `count` consecutive pages, returning the first
    pub fn allocate_pages(&mut self, count: usize) -> FileResult<PageId> {
        if count == 0 {
            return Err(FileError::InvalidPageCount(count));
        }

        if count == 1
            && let Some(page_id) = self.catalog.free_pages.pop_first()
        {
            return Ok(page_id);
        }

        let first = self.catalog.next_page;
        let next = i32::try_from(count)
            .ok()
            .and_then(|count| first.checked_add(count))
            .ok_or(FileError::InvalidPageCount(count))?;
        self.catalog.next_page = next;
        Ok(first)
    }

    /// Return a page to the free space map
    pub fn deallocate_page(&mut self, page_id: PageId) -> FileResult<()> {
        if !self.is_allocated(page_id) {
            return Err(FileError::PageNotAllocated(page_id));
        }
        self.catalog.free_pages.insert(page_id);
        Ok(())
    }

    /// Check whether a page is currently allocated
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        page_id != INVALID_PAGE
            && (0..self.catalog.next_page).contains(&page_id)
            && !self.catalog.free_pages.contains(&page_id)
    }

    /// Number of pages currently allocated
    pub fn allocated_page_count(&self) -> usize {
        self.catalog.next_page as usize - self.catalog.free_pages.len()
    }

    /// Look up the header page registered under `name`
    pub fn get_file_entry(&self, name: &str) -> Option<PageId> {
        self.catalog.files.get(name).copied()
    }

    /// Register `name` with its header page
    pub fn add_file_entry(&mut self, name: &str, page_id: PageId) -> FileResult<()> {
        if self.catalog.files.contains_key(name) {
            return Err(FileError::DuplicateFileEntry(name.to_string()));
        }
        self.catalog.files.insert(name.to_string(), page_id);
        Ok(())
    }

    /// Remove the catalog entry for `name`
    pub fn delete_file_entry(&mut self, name: &str) -> FileResult<()> {
        self.catalog
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FileError::FileEntryNotFound(name.to_string()))
    }

    /// All registered file names, in sorted order
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.catalog.files.keys().map(String::as_str)
    }

    /// Sync the page file and persist the catalog
    pub fn sync(&mut self) -> FileResult<()> {
        self.file.sync_data()?;
        self.write_catalog()
    }

    fn write_catalog(&self) -> FileResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.catalog)?;
        std::fs::write(&self.catalog_path, bytes)?;
        Ok(())
    }

    fn page_offset(&self, page_id: PageId, buffer_len: usize) -> FileResult<u64> {
        if buffer_len != self.catalog.page_size {
            return Err(FileError::InvalidPageSize {
                expected: self.catalog.page_size,
                actual: buffer_len,
            });
        }
        if page_id < 0 {
            return Err(FileError::InvalidPageId(page_id));
        }
        Ok(page_id as u64 * self.catalog.page_size as u64)
    }
}

/// Page offsets are 16-bit and a page must hold its header plus a slot
fn check_page_size(page_size: usize) -> FileResult<()> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(FileError::UnsupportedPageSize(page_size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PAGE_SIZE;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_create_database() {
        let temp_dir = setup_test_dir();
        let db = temp_dir.path().join("test.db");

        let manager = DiskManager::create(&db, PAGE_SIZE).unwrap();
        assert!(db.exists());
        assert!(DiskManager::catalog_path(&db).exists());
        assert_eq!(manager.page_size(), PAGE_SIZE);
        assert_eq!(manager.allocated_page_count(), 0);
    }

    #[test]
    fn test_create_database_already_exists() {
        let temp_dir = setup_test_dir();
        let db = temp_dir.path().join("test.db");

        DiskManager::create(&db, PAGE_SIZE).unwrap();
        let result = DiskManager::create(&db, PAGE_SIZE);
        assert!(matches!(result, Err(FileError::DatabaseAlreadyExists(_))));
    }

    #[test]
    fn test_open_nonexistent_database() {
        let temp_dir = setup_test_dir();
        let db = temp_dir.path().join("nonexistent.db");

        let result = DiskManager::open(&db, PAGE_SIZE);
        assert!(matches!(result, Err(FileError::DatabaseNotFound(_))));
    }

    #[test]
    fn test_open_with_wrong_page_size() {
        let temp_dir = setup_test_dir();
        let db = temp_dir.path().join("test.db");

        DiskManager::create(&db, PAGE_SIZE).unwrap();
        let result = DiskManager::open(&db, 1024);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));
    }

    #[test]
    fn test_unsupported_page_sizes_rejected() {
        let temp_dir = setup_test_dir();
        let db = temp_dir.path().join("test.db");

        for page_size in [0, 19, MIN_PAGE_SIZE - 1, MAX_PAGE_SIZE + 1] {
            let result = DiskManager::create(&db, page_size);
            assert!(matches!(result, Err(FileError::UnsupportedPageSize(size)) if size == page_size));
        }
        assert!(!db.exists());

        DiskManager::create(&db, MIN_PAGE_SIZE).unwrap();
        let result = DiskManager::open(&db, MAX_PAGE_SIZE + 1);
        assert!(matches!(result, Err(FileError::UnsupportedPageSize(_))));
        assert!(DiskManager::open(&db, MIN_PAGE_SIZE).is_ok());
    }

    #[test]
    fn test_read_write_page() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::create(temp_dir.path().join("test.db"), PAGE_SIZE).unwrap();

        let mut write_buffer = vec![0u8; PAGE_SIZE];
        write_buffer[0] = 42;
        write_buffer[100] = 99;
        write_buffer[PAGE_SIZE - 1] = 255;
        manager.write_page(3, &write_buffer).unwrap();

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        manager.read_page(3, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, write_buffer);
    }

    #[test]
    fn test_read_past_end_is_zeroed() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::create(temp_dir.path().join("test.db"), PAGE_SIZE).unwrap();

        let mut buffer = vec![7u8; PAGE_SIZE];
        manager.read_page(100, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_buffer_size_and_page_id() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::create(temp_dir.path().join("test.db"), PAGE_SIZE).unwrap();

        let mut small_buffer = vec![0u8; PAGE_SIZE - 1];
        let result = manager.read_page(0, &mut small_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));

        let buffer = vec![0u8; PAGE_SIZE];
        let result = manager.write_page(INVALID_PAGE, &buffer);
        assert!(matches!(result, Err(FileError::InvalidPageId(INVALID_PAGE))));
    }

    #[test]
    fn test_allocate_and_reuse_pages() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::create(temp_dir.path().join("test.db"), PAGE_SIZE).unwrap();

        assert_eq!(manager.allocate_pages(1).unwrap(), 0);
        assert_eq!(manager.allocate_pages(3).unwrap(), 1);
        assert_eq!(manager.allocate_pages(1).unwrap(), 4);
        assert_eq!(manager.allocated_page_count(), 5);

        manager.deallocate_page(2).unwrap();
        manager.deallocate_page(1).unwrap();
        assert!(!manager.is_allocated(1));
        assert_eq!(manager.allocated_page_count(), 3);

        // Lowest freed page first; runs always extend the file
        assert_eq!(manager.allocate_pages(1).unwrap(), 1);
        assert_eq!(manager.allocate_pages(2).unwrap(), 5);
        assert!(manager.is_allocated(1));
        assert!(!manager.is_allocated(2));

        assert!(matches!(
            manager.allocate_pages(0),
            Err(FileError::InvalidPageCount(0))
        ));
    }

    #[test]
    fn test_double_deallocate() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::create(temp_dir.path().join("test.db"), PAGE_SIZE).unwrap();

        let page_id = manager.allocate_pages(1).unwrap();
        manager.deallocate_page(page_id).unwrap();
        let result = manager.deallocate_page(page_id);
        assert!(matches!(result, Err(FileError::PageNotAllocated(_))));
        assert!(!manager.is_allocated(INVALID_PAGE));
    }

    #[test]
    fn test_file_entries() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::create(temp_dir.path().join("test.db"), PAGE_SIZE).unwrap();

        assert_eq!(manager.get_file_entry("maps"), None);
        manager.add_file_entry("maps", 7).unwrap();
        assert_eq!(manager.get_file_entry("maps"), Some(7));

        let result = manager.add_file_entry("maps", 8);
        assert!(matches!(result, Err(FileError::DuplicateFileEntry(_))));

        manager.delete_file_entry("maps").unwrap();
        assert_eq!(manager.get_file_entry("maps"), None);
        let result = manager.delete_file_entry("maps");
        assert!(matches!(result, Err(FileError::FileEntryNotFound(_))));
    }

    #[test]
    fn test_catalog_persists_across_reopen() {
        let temp_dir = setup_test_dir();
        let db = temp_dir.path().join("test.db");

        {
            let mut manager = DiskManager::create(&db, PAGE_SIZE).unwrap();
            let first = manager.allocate_pages(2).unwrap();
            manager.deallocate_page(first + 1).unwrap();
            manager.add_file_entry("users", first).unwrap();
            manager.sync().unwrap();
        }

        let manager = DiskManager::open(&db, PAGE_SIZE).unwrap();
        assert_eq!(manager.get_file_entry("users"), Some(0));
        assert!(manager.is_allocated(0));
        assert!(!manager.is_allocated(1));
        assert_eq!(manager.file_names().collect::<Vec<_>>(), vec!["users"]);
    }
}
