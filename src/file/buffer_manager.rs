use ahash::AHashMap;
use lru::LruCache;

use super::disk_manager::DiskManager;
use super::error::{FileError, FileResult};
use super::{BUFFER_POOL_SIZE, INVALID_PAGE, PageId};
use crate::config::Config;

type FrameId = usize;

/// One slot of the buffer pool
struct Frame {
    /// Page currently held by this frame
    page_id: PageId,
    /// The actual page data
    data: Box<[u8]>,
    /// Number of outstanding pins; a pinned frame is never evicted
    pin_count: u32,
    /// Whether this page has been modified since it was read
    dirty: bool,
}

/// Manages a fixed pool of page frames with pin/unpin discipline.
///
/// Callers pin a page before touching its bytes and unpin it when done,
/// saying whether they modified it. Only unpinned frames are candidates for
/// eviction, chosen least recently unpinned first.
pub struct BufferManager {
    /// Underlying disk manager
    disk: DiskManager,
    frames: Vec<Frame>,
    /// Resident pages: page id -> frame
    page_table: AHashMap<PageId, FrameId>,
    /// Unpinned resident frames in LRU order
    replacer: LruCache<FrameId, ()>,
    /// Frames holding no page at all
    free_frames: Vec<FrameId>,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(disk: DiskManager) -> Self {
        Self::with_capacity(disk, BUFFER_POOL_SIZE)
    }

    /// Create a new buffer manager with specified capacity
    pub fn with_capacity(disk: DiskManager, capacity: usize) -> Self {
        let page_size = disk.page_size();
        let frames = (0..capacity)
            .map(|_| Frame {
                page_id: INVALID_PAGE,
                data: vec![0u8; page_size].into_boxed_slice(),
                pin_count: 0,
                dirty: false,
            })
            .collect();

        Self {
            disk,
            frames,
            page_table: AHashMap::with_capacity(capacity),
            replacer: LruCache::unbounded(),
            // Hand out low frame ids first
            free_frames: (0..capacity).rev().collect(),
        }
    }

    /// Open (or create) the database described by `config`
    pub fn open(config: &Config) -> FileResult<Self> {
        config.validate()?;
        let disk = DiskManager::open_or_create(&config.db_path, config.page_size)?;
        Ok(Self::with_capacity(disk, config.buffer_pool_frames))
    }

    /// Get a reference to the disk manager
    pub fn disk_manager(&self) -> &DiskManager {
        &self.disk
    }

    /// Get a mutable reference to the disk manager
    pub fn disk_manager_mut(&mut self) -> &mut DiskManager {
        &mut self.disk
    }

    pub fn page_size(&self) -> usize {
        self.disk.page_size()
    }

    /// Pin a page, reading it from disk unless `empty` is set, in which case
    /// the frame is zero-filled (used for freshly allocated pages)
    pub fn pin_page(&mut self, page_id: PageId, empty: bool) -> FileResult<()> {
        if page_id == INVALID_PAGE {
            return Err(FileError::InvalidPageId(page_id));
        }
        if !self.disk.is_allocated(page_id) {
            return Err(FileError::PageNotAllocated(page_id));
        }

        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let frame = &mut self.frames[frame_id];
            if frame.pin_count == 0 {
                self.replacer.pop(&frame_id);
            }
            frame.pin_count += 1;
            return Ok(());
        }

        let frame_id = self.acquire_frame()?;
        let frame = &mut self.frames[frame_id];
        if empty {
            frame.data.fill(0);
        } else if let Err(err) = self.disk.read_page(page_id, &mut frame.data) {
            self.free_frames.push(frame_id);
            return Err(err);
        }

        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.dirty = false;
        self.page_table.insert(page_id, frame_id);
        Ok(())
    }

    /// Release one pin on a page; `dirty` records that the caller modified it
    pub fn unpin_page(&mut self, page_id: PageId, dirty: bool) -> FileResult<()> {
        let frame_id = *self
            .page_table
            .get(&page_id)
            .ok_or(FileError::PageNotPinned(page_id))?;

        let frame = &mut self.frames[frame_id];
        if frame.pin_count == 0 {
            return Err(FileError::PageNotPinned(page_id));
        }

        frame.dirty |= dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.put(frame_id, ());
        }
        Ok(())
    }

    /// Allocate a run of `count` pages on disk and pin the first one,
    /// zero-filled. Returns the first page id.
    pub fn new_page(&mut self, count: usize) -> FileResult<PageId> {
        // Refuse before touching the space map so an exhausted pool never
        // leaks an allocated page
        if self.free_frames.is_empty() && self.replacer.is_empty() {
            return Err(FileError::BufferPoolExhausted(self.frames.len()));
        }

        let first = self.disk.allocate_pages(count)?;
        if let Err(err) = self.pin_page(first, true) {
            for offset in 0..count as PageId {
                self.disk.deallocate_page(first + offset)?;
            }
            return Err(err);
        }
        Ok(first)
    }

    /// Deallocate a page. The page must not be pinned.
    pub fn free_page(&mut self, page_id: PageId) -> FileResult<()> {
        if !self.disk.is_allocated(page_id) {
            return Err(FileError::PageNotAllocated(page_id));
        }

        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let frame = &mut self.frames[frame_id];
            if frame.pin_count > 0 {
                return Err(FileError::PagePinned {
                    page_id,
                    pin_count: frame.pin_count,
                });
            }
            // Contents of a freed page are garbage; never write them back
            frame.dirty = false;
            frame.page_id = INVALID_PAGE;
            self.replacer.pop(&frame_id);
            self.page_table.remove(&page_id);
            self.free_frames.push(frame_id);
        }

        self.disk.deallocate_page(page_id)
    }

    /// Bytes of a pinned page
    pub fn page(&self, page_id: PageId) -> FileResult<&[u8]> {
        let frame_id = self.pinned_frame(page_id)?;
        Ok(&self.frames[frame_id].data)
    }

    /// Mutable bytes of a pinned page. Modifications must be reported
    /// through `unpin_page(page_id, true)`.
    pub fn page_mut(&mut self, page_id: PageId) -> FileResult<&mut [u8]> {
        let frame_id = self.pinned_frame(page_id)?;
        Ok(&mut self.frames[frame_id].data)
    }

    /// Flush a specific page to disk if it's dirty
    pub fn flush_page(&mut self, page_id: PageId) -> FileResult<()> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let frame = &mut self.frames[frame_id];
            if frame.dirty {
                self.disk.write_page(page_id, &frame.data)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Flush all dirty pages to disk and persist the catalog
    pub fn flush_all(&mut self) -> FileResult<()> {
        for frame in self.frames.iter_mut() {
            if frame.dirty && frame.page_id != INVALID_PAGE {
                self.disk.write_page(frame.page_id, &frame.data)?;
                frame.dirty = false;
            }
        }

        self.disk.sync()
    }

    /// Total number of frames
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames that a new pin could use without failing
    pub fn available_frames(&self) -> usize {
        self.free_frames.len() + self.replacer.len()
    }

    /// Number of frames currently pinned
    pub fn pinned_frame_count(&self) -> usize {
        self.frames.iter().filter(|f| f.pin_count > 0).count()
    }

    /// Pin count of a page, 0 when not resident
    pub fn pin_count(&self, page_id: PageId) -> u32 {
        self.page_table
            .get(&page_id)
            .map_or(0, |&frame_id| self.frames[frame_id].pin_count)
    }

    /// Check if a page is in the buffer pool
    pub fn is_page_cached(&self, page_id: PageId) -> bool {
        self.page_table.contains_key(&page_id)
    }

    /// Get the number of dirty pages in the buffer pool
    pub fn dirty_page_count(&self) -> usize {
        self.frames.iter().filter(|f| f.dirty).count()
    }

    fn pinned_frame(&self, page_id: PageId) -> FileResult<FrameId> {
        match self.page_table.get(&page_id) {
            Some(&frame_id) if self.frames[frame_id].pin_count > 0 => Ok(frame_id),
            _ => Err(FileError::PageNotPinned(page_id)),
        }
    }

    /// Find a frame for a new page, evicting the LRU unpinned page if needed
    fn acquire_frame(&mut self) -> FileResult<FrameId> {
        if let Some(frame_id) = self.free_frames.pop() {
            return Ok(frame_id);
        }

        let Some((frame_id, ())) = self.replacer.pop_lru() else {
            return Err(FileError::BufferPoolExhausted(self.frames.len()));
        };

        let frame = &mut self.frames[frame_id];
        if frame.dirty {
            if let Err(err) = self.disk.write_page(frame.page_id, &frame.data) {
                self.replacer.put(frame_id, ());
                return Err(err);
            }
            frame.dirty = false;
        }
        self.page_table.remove(&frame.page_id);
        frame.page_id = INVALID_PAGE;
        Ok(frame_id)
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Flush all dirty pages when the buffer manager is dropped
        let _ = self.flush_all();
    }
}
