use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, trace, warn};

use super::data_page_info::DataPageInfo;
use super::error::{HeapError, HeapResult};
use super::page::{HeapPage, PageKind};
use super::record::{Mid, SlotId};
use super::scan::Scan;
use crate::file::{BufferManager, FileError, INVALID_PAGE, PageId};

/// Process-wide counter for temporary heap file names
static TEMP_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A heap file: records in slotted data pages, tracked by a doubly-linked
/// chain of directory pages whose records are `DataPageInfo` entries.
///
/// The first directory page is the anchor. Its id is the catalog entry of
/// the file and it is never freed while the file exists.
#[derive(Debug)]
pub struct HeapFile {
    name: String,
    first_dir_page_id: PageId,
    temporary: bool,
    deleted: bool,
}

/// Where `find_data_page` located a record. Both pages are left pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Location {
    pub dir_page_id: PageId,
    pub data_page_id: PageId,
    /// Slot of the directory entry describing the data page
    pub dir_slot: SlotId,
}

/// Decision taken by one round of the insertion loop
enum InsertStep {
    /// First-fit entry found on the current directory page
    UseEntry(SlotId, DataPageInfo),
    /// The directory page has room for one more entry
    NewDataPage,
    /// Move on to the next directory page
    NextDirPage(PageId),
    /// Last directory page is full, grow the chain
    AppendDirPage,
}

/// Snapshot of one directory page
pub(super) struct DirPage {
    pub entries: Vec<(SlotId, DataPageInfo)>,
    pub next_page: PageId,
    pub available_space: usize,
}

impl HeapFile {
    /// Open the heap file called `name`, creating it if the catalog has no
    /// such entry. `None` creates a fresh temporary file with a unique name.
    pub fn open(bm: &mut BufferManager, name: Option<&str>) -> HeapResult<Self> {
        let (name, temporary) = match name {
            Some(name) => (name.to_string(), false),
            None => (Self::temp_name(bm), true),
        };

        if let Some(first_dir_page_id) = bm.disk_manager().get_file_entry(&name) {
            debug!(%name, first_dir_page_id, "opened heap file");
            return Ok(Self {
                name,
                first_dir_page_id,
                temporary,
                deleted: false,
            });
        }

        let first_dir_page_id = new_page(bm, "open")?;
        let init = page_mut(bm, first_dir_page_id, "open").map(|buffer| {
            HeapPage::init(buffer, first_dir_page_id, PageKind::Directory);
        });
        if let Err(err) = init {
            release(bm, &[first_dir_page_id], false);
            return Err(err);
        }
        unpin_page(bm, first_dir_page_id, true, "open")?;

        if let Err(source) = bm.disk_manager_mut().add_file_entry(&name, first_dir_page_id) {
            free_page(bm, first_dir_page_id, "open")?;
            return Err(HeapError::Disk { op: "add_file_entry", source });
        }

        debug!(%name, first_dir_page_id, temporary, "created heap file");
        Ok(Self {
            name,
            first_dir_page_id,
            temporary,
            deleted: false,
        })
    }

    /// Create an anonymous temporary heap file
    pub fn create_temp(bm: &mut BufferManager) -> HeapResult<Self> {
        Self::open(bm, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn first_dir_page_id(&self) -> PageId {
        self.first_dir_page_id
    }

    /// Insert a record, returning its id.
    ///
    /// Walks the directory chain from the anchor and takes the first entry
    /// whose data page has room. When a directory page has no such entry but
    /// can hold one more, a data page is created under it. Otherwise the
    /// search moves to the next directory page, appending one at the tail
    /// when the chain runs out.
    pub fn insert_record(&mut self, bm: &mut BufferManager, record: &[u8]) -> HeapResult<Mid> {
        self.check_alive()?;
        if record.len() > HeapPage::<&[u8]>::max_record_size(bm.page_size()) {
            return Err(HeapError::NoSpace(record.len()));
        }

        let mut dir_page_id = self.first_dir_page_id;
        pin_page(bm, dir_page_id, "insert_record")?;

        loop {
            let step = insert_step(bm, dir_page_id, record.len()).or_release(bm, &[dir_page_id])?;

            match step {
                InsertStep::UseEntry(dir_slot, info) => {
                    pin_page(bm, info.page_id, "insert_record").or_release(bm, &[dir_page_id])?;
                    let location = Location {
                        dir_page_id,
                        data_page_id: info.page_id,
                        dir_slot,
                    };
                    return insert_at(bm, location, info, record);
                }
                InsertStep::NewDataPage => {
                    let (location, info) = new_data_page(bm, dir_page_id)?;
                    return insert_at(bm, location, info, record);
                }
                InsertStep::NextDirPage(next_page) => {
                    unpin_page(bm, dir_page_id, false, "insert_record")?;
                    pin_page(bm, next_page, "insert_record")?;
                    dir_page_id = next_page;
                }
                InsertStep::AppendDirPage => {
                    dir_page_id = append_dir_page(bm, dir_page_id)?;
                }
            }
        }
    }

    /// Fetch a record by id, pinning only its data page
    pub fn get_record(&self, bm: &mut BufferManager, mid: Mid) -> HeapResult<Vec<u8>> {
        self.check_alive()?;
        match bm.pin_page(mid.page_id, false) {
            Ok(()) => {}
            Err(FileError::InvalidPageId(_) | FileError::PageNotAllocated(_)) => {
                return Err(HeapError::NotFound(mid));
            }
            Err(source) => {
                return Err(HeapError::BufferManager {
                    op: "get_record",
                    source,
                });
            }
        }

        let record = page(bm, mid.page_id, "get_record")
            .and_then(|buffer| {
                let page = HeapPage::open(buffer, PageKind::Data)?;
                Ok(page.get_record(mid.slot_id)?.to_vec())
            })
            .map_err(|err| match err {
                HeapError::InvalidSlot(..) | HeapError::UnexpectedPageKind { .. } => {
                    HeapError::NotFound(mid)
                }
                other => other,
            })
            .or_release(bm, &[mid.page_id])?;

        unpin_page(bm, mid.page_id, false, "get_record")?;
        Ok(record)
    }

    /// Overwrite a record with one of the same length. Returns `false` when
    /// the record does not exist.
    pub fn update_record(
        &mut self,
        bm: &mut BufferManager,
        mid: Mid,
        record: &[u8],
    ) -> HeapResult<bool> {
        self.check_alive()?;
        let Some(location) = self.find_data_page(bm, mid)? else {
            return Ok(false);
        };
        let held = [location.data_page_id, location.dir_page_id];

        page_mut(bm, location.data_page_id, "update_record")
            .and_then(|buffer| {
                let mut page = HeapPage::open(buffer, PageKind::Data)?;
                let stored = page.get_record_mut(mid.slot_id)?;
                if stored.len() != record.len() {
                    return Err(HeapError::SizeMismatch {
                        expected: stored.len(),
                        actual: record.len(),
                    });
                }
                stored.copy_from_slice(record);
                Ok(())
            })
            .or_release(bm, &held)?;

        trace!(file = %self.name, %mid, "updated record");
        unpin_page(bm, location.data_page_id, true, "update_record").or_release(bm, &held[1..])?;
        unpin_page(bm, location.dir_page_id, false, "update_record")?;
        Ok(true)
    }

    /// Delete a record. Returns `false` when the record does not exist.
    ///
    /// A data page losing its last record is freed together with its
    /// directory entry, and a directory page losing its last entry is
    /// unlinked from the chain and freed unless it is the anchor.
    pub fn delete_record(&mut self, bm: &mut BufferManager, mid: Mid) -> HeapResult<bool> {
        self.check_alive()?;
        let Some(location) = self.find_data_page(bm, mid)? else {
            return Ok(false);
        };
        let Location {
            dir_page_id,
            data_page_id,
            dir_slot,
        } = location;

        let held = [data_page_id, dir_page_id];
        let mut info = read_entry(bm, dir_page_id, dir_slot).or_release(bm, &held)?;

        if info.rec_count > 1 {
            let avail_space = page_mut(bm, data_page_id, "delete_record")
                .and_then(|buffer| {
                    let mut page = HeapPage::open(buffer, PageKind::Data)?;
                    page.delete_record(mid.slot_id)?;
                    Ok(page.available_space())
                })
                .or_release(bm, &held)?;
            info.rec_count -= 1;
            info.avail_space = avail_space as i32;
            trace!(file = %self.name, %mid, "deleted record");

            write_entry(bm, dir_page_id, dir_slot, &info).or_release_dirty(bm, &held)?;
            unpin_page(bm, data_page_id, true, "delete_record").or_release_dirty(bm, &held[1..])?;
            unpin_page(bm, dir_page_id, true, "delete_record")?;
            return Ok(true);
        }

        // Last record gone: the data page and its entry are reclaimed. If
        // that empties a directory page other than the anchor, it is unlinked
        // as well, so its neighbours are pinned before anything changes.
        let (prev_page, next_page, unlink) = page(bm, dir_page_id, "delete_record")
            .and_then(|buffer| {
                let page = HeapPage::open(buffer, PageKind::Directory)?;
                let unlink = page.record_count() == 1 && page.prev_page() != INVALID_PAGE;
                Ok((page.prev_page(), page.next_page(), unlink))
            })
            .or_release(bm, &held)?;

        let neighbours: Vec<PageId> = if unlink {
            [prev_page, next_page]
                .into_iter()
                .filter(|&page_id| page_id != INVALID_PAGE)
                .collect()
        } else {
            Vec::new()
        };
        let mut pinned = held.to_vec();
        for &page_id in &neighbours {
            pin_page(bm, page_id, "delete_record").or_release(bm, &pinned)?;
            pinned.push(page_id);
            page(bm, page_id, "delete_record")
                .and_then(|buffer| HeapPage::open(buffer, PageKind::Directory).map(|_| ()))
                .or_release(bm, &pinned)?;
        }
        ensure_pins(bm, data_page_id, 1, "delete_record").or_release(bm, &pinned)?;
        if unlink {
            ensure_pins(bm, dir_page_id, 1, "delete_record").or_release(bm, &pinned)?;
        }

        unpin_page(bm, data_page_id, false, "delete_record").or_release(bm, &pinned[1..])?;
        free_page(bm, data_page_id, "delete_record").or_release(bm, &pinned[1..])?;
        trace!(file = %self.name, %mid, "deleted record");
        debug!(file = %self.name, data_page_id, "reclaimed empty data page");

        page_mut(bm, dir_page_id, "delete_record")
            .and_then(|buffer| HeapPage::open(buffer, PageKind::Directory)?.delete_record(dir_slot))
            .or_release_dirty(bm, &pinned[1..])?;

        if !unlink {
            unpin_page(bm, dir_page_id, true, "delete_record")?;
            return Ok(true);
        }

        // Route the neighbours around the empty directory page, then free it
        set_link(bm, prev_page, Link::Next(next_page)).or_release_dirty(bm, &pinned[1..])?;
        if next_page != INVALID_PAGE {
            set_link(bm, next_page, Link::Prev(prev_page)).or_release_dirty(bm, &pinned[1..])?;
        }
        for (i, &page_id) in neighbours.iter().enumerate() {
            unpin_page(bm, page_id, true, "delete_record")
                .or_release_dirty(bm, &neighbours[i + 1..])
                .or_release_dirty(bm, &[dir_page_id])?;
        }
        unpin_page(bm, dir_page_id, false, "delete_record")?;
        free_page(bm, dir_page_id, "delete_record")?;
        debug!(file = %self.name, dir_page_id, prev_page, next_page, "unlinked empty directory page");

        Ok(true)
    }

    /// Number of live records, summed over every directory entry
    pub fn record_count(&self, bm: &mut BufferManager) -> HeapResult<usize> {
        self.check_alive()?;
        let mut count = 0;
        let mut dir_page_id = self.first_dir_page_id;

        while dir_page_id != INVALID_PAGE {
            let dir = load_dir_page(bm, dir_page_id, "record_count")?;
            count += dir
                .entries
                .iter()
                .map(|(_, info)| info.rec_count as usize)
                .sum::<usize>();
            dir_page_id = dir.next_page;
        }

        Ok(count)
    }

    /// Number of data pages, one per directory entry
    pub fn data_page_count(&self, bm: &mut BufferManager) -> HeapResult<usize> {
        Ok(self.dir_entries(bm)?.len())
    }

    /// Ids of the directory pages, anchor first
    pub fn dir_page_ids(&self, bm: &mut BufferManager) -> HeapResult<Vec<PageId>> {
        self.check_alive()?;
        let mut ids = Vec::new();
        let mut dir_page_id = self.first_dir_page_id;

        while dir_page_id != INVALID_PAGE {
            ids.push(dir_page_id);
            dir_page_id = load_dir_page(bm, dir_page_id, "dir_page_ids")?.next_page;
        }

        Ok(ids)
    }

    /// Every directory entry in chain order
    pub fn dir_entries(&self, bm: &mut BufferManager) -> HeapResult<Vec<DataPageInfo>> {
        self.check_alive()?;
        let mut entries = Vec::new();
        let mut dir_page_id = self.first_dir_page_id;

        while dir_page_id != INVALID_PAGE {
            let dir = load_dir_page(bm, dir_page_id, "dir_entries")?;
            entries.extend(dir.entries.into_iter().map(|(_, info)| info));
            dir_page_id = dir.next_page;
        }

        Ok(entries)
    }

    /// Sequential scan in directory entry order, then slot order
    pub fn open_scan(&self) -> HeapResult<Scan> {
        self.check_alive()?;
        Ok(Scan::new(self.first_dir_page_id))
    }

    /// Scan all records in the file
    pub fn scan(&self, bm: &mut BufferManager) -> HeapResult<Vec<(Mid, Vec<u8>)>> {
        let mut scan = self.open_scan()?;
        let mut results = Vec::new();
        while let Some(item) = scan.get_next(bm)? {
            results.push(item);
        }
        Ok(results)
    }

    /// Free every data page, then every directory page, then drop the
    /// catalog entry.
    ///
    /// The whole chain is walked and checked first. If any page is pinned
    /// or unreadable the file is left untouched and the call can be retried.
    pub fn delete_file(&mut self, bm: &mut BufferManager) -> HeapResult<()> {
        if self.deleted {
            return Err(HeapError::AlreadyDeleted(self.name.clone()));
        }
        if bm.disk_manager().get_file_entry(&self.name).is_none() {
            return Err(HeapError::Disk {
                op: "delete_file_entry",
                source: FileError::FileEntryNotFound(self.name.clone()),
            });
        }

        let mut data_page_ids = Vec::new();
        let mut dir_page_ids = Vec::new();
        let mut dir_page_id = self.first_dir_page_id;
        while dir_page_id != INVALID_PAGE {
            let dir = load_dir_page(bm, dir_page_id, "delete_file")?;
            data_page_ids.extend(dir.entries.iter().map(|(_, info)| info.page_id));
            dir_page_ids.push(dir_page_id);
            dir_page_id = dir.next_page;
        }

        for &page_id in data_page_ids.iter().chain(&dir_page_ids) {
            ensure_pins(bm, page_id, 0, "delete_file")?;
        }
        for &page_id in data_page_ids.iter().chain(&dir_page_ids) {
            free_page(bm, page_id, "delete_file")?;
        }

        bm.disk_manager_mut()
            .delete_file_entry(&self.name)
            .map_err(|source| HeapError::Disk {
                op: "delete_file_entry",
                source,
            })?;

        self.deleted = true;
        debug!(
            file = %self.name,
            data_pages = data_page_ids.len(),
            dir_pages = dir_page_ids.len(),
            "deleted heap file"
        );
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Find the directory entry whose data page holds `mid`. On success the
    /// directory page and the data page stay pinned; on `None` nothing does.
    pub(super) fn find_data_page(
        &self,
        bm: &mut BufferManager,
        mid: Mid,
    ) -> HeapResult<Option<Location>> {
        let mut dir_page_id = self.first_dir_page_id;

        while dir_page_id != INVALID_PAGE {
            pin_page(bm, dir_page_id, "find_data_page")?;
            let dir = read_dir_page(bm, dir_page_id).or_release(bm, &[dir_page_id])?;

            if let Some(&(dir_slot, info)) = dir
                .entries
                .iter()
                .find(|(_, info)| info.page_id == mid.page_id)
            {
                pin_page(bm, info.page_id, "find_data_page").or_release(bm, &[dir_page_id])?;
                let held = [info.page_id, dir_page_id];
                let present = page(bm, info.page_id, "find_data_page")
                    .and_then(|buffer| Ok(HeapPage::open(buffer, PageKind::Data)?.is_slot_used(mid.slot_id)))
                    .or_release(bm, &held)?;

                if present {
                    return Ok(Some(Location {
                        dir_page_id,
                        data_page_id: info.page_id,
                        dir_slot,
                    }));
                }

                unpin_page(bm, info.page_id, false, "find_data_page").or_release(bm, &held[1..])?;
                unpin_page(bm, dir_page_id, false, "find_data_page")?;
                return Ok(None);
            }

            unpin_page(bm, dir_page_id, false, "find_data_page")?;
            dir_page_id = dir.next_page;
        }

        Ok(None)
    }

    fn check_alive(&self) -> HeapResult<()> {
        if self.deleted {
            return Err(HeapError::AlreadyDeleted(self.name.clone()));
        }
        Ok(())
    }

    /// `tempHeapFile.{user}.{pid}.{n}`, skipping names already in the catalog
    fn temp_name(bm: &BufferManager) -> String {
        let user = std::env::var("USER").unwrap_or_else(|_| "anon".to_string());
        let pid = std::process::id();
        loop {
            let n = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
            let name = format!("tempHeapFile.{user}.{pid}.{n}");
            if bm.disk_manager().get_file_entry(&name).is_none() {
                return name;
            }
        }
    }
}

/// Run one round of the insertion loop on the pinned directory page
fn insert_step(
    bm: &BufferManager,
    dir_page_id: PageId,
    record_len: usize,
) -> HeapResult<InsertStep> {
    let dir = read_dir_page(bm, dir_page_id)?;

    if let Some(&(dir_slot, info)) = dir
        .entries
        .iter()
        .find(|(_, info)| info.avail_space >= 0 && info.avail_space as usize >= record_len)
    {
        return Ok(InsertStep::UseEntry(dir_slot, info));
    }

    if dir.available_space >= DataPageInfo::SIZE {
        Ok(InsertStep::NewDataPage)
    } else if dir.next_page != INVALID_PAGE {
        Ok(InsertStep::NextDirPage(dir.next_page))
    } else {
        Ok(InsertStep::AppendDirPage)
    }
}

/// Allocate and initialize a data page and register it on the pinned
/// directory page. Both pages are pinned on success; on failure only the
/// directory page was, and it has been released.
fn new_data_page(
    bm: &mut BufferManager,
    dir_page_id: PageId,
) -> HeapResult<(Location, DataPageInfo)> {
    let data_page_id = new_page(bm, "insert_record").or_release(bm, &[dir_page_id])?;

    let info = page_mut(bm, data_page_id, "insert_record").map(|buffer| {
        let page = HeapPage::init(buffer, data_page_id, PageKind::Data);
        DataPageInfo::new(data_page_id, page.available_space())
    });
    let dir_slot = info.and_then(|info| {
        let buffer = page_mut(bm, dir_page_id, "insert_record")?;
        let mut dir = HeapPage::open(buffer, PageKind::Directory)?;
        Ok((dir.insert_record(&info.encode())?, info))
    });

    match dir_slot {
        Ok((dir_slot, info)) => {
            debug!(data_page_id, dir_page_id, "allocated data page");
            let location = Location {
                dir_page_id,
                data_page_id,
                dir_slot,
            };
            Ok((location, info))
        }
        Err(err) => {
            release(bm, &[data_page_id, dir_page_id], false);
            if let Err(free_err) = bm.free_page(data_page_id) {
                warn!(data_page_id, error = %free_err, "failed to free data page");
            }
            Err(err)
        }
    }
}

/// Put `record` on the data page at `location`, refresh its directory entry
/// from the page's free space and unpin both pages dirty
fn insert_at(
    bm: &mut BufferManager,
    location: Location,
    mut info: DataPageInfo,
    record: &[u8],
) -> HeapResult<Mid> {
    let held = [location.data_page_id, location.dir_page_id];

    let (slot_id, avail_space) = page_mut(bm, location.data_page_id, "insert_record")
        .and_then(|buffer| {
            let mut page = HeapPage::open(buffer, PageKind::Data)?;
            let slot_id = page.insert_record(record)?;
            Ok((slot_id, page.available_space()))
        })
        .or_release(bm, &held)?;

    info.rec_count += 1;
    info.avail_space = avail_space as i32;
    unpin_page(bm, location.data_page_id, true, "insert_record").or_release(bm, &held[1..])?;

    write_entry(bm, location.dir_page_id, location.dir_slot, &info).or_release(bm, &held[1..])?;
    unpin_page(bm, location.dir_page_id, true, "insert_record")?;

    let mid = Mid::new(location.data_page_id, slot_id);
    trace!(%mid, len = record.len(), "inserted record");
    Ok(mid)
}

/// Append a directory page after the pinned tail `dir_page_id`. The tail is
/// unpinned dirty and the new page is returned pinned.
fn append_dir_page(bm: &mut BufferManager, dir_page_id: PageId) -> HeapResult<PageId> {
    let next_page = new_page(bm, "insert_record").or_release(bm, &[dir_page_id])?;

    let linked = page_mut(bm, next_page, "insert_record")
        .map(|buffer| {
            let mut page = HeapPage::init(buffer, next_page, PageKind::Directory);
            page.set_prev_page(dir_page_id);
        })
        .and_then(|()| {
            let buffer = page_mut(bm, dir_page_id, "insert_record")?;
            HeapPage::open(buffer, PageKind::Directory)?.set_next_page(next_page);
            Ok(())
        });
    if let Err(err) = linked {
        release(bm, &[next_page, dir_page_id], false);
        if let Err(free_err) = bm.free_page(next_page) {
            warn!(page_id = next_page, error = %free_err, "failed to free directory page");
        }
        return Err(err);
    }

    unpin_page(bm, dir_page_id, true, "insert_record").or_release(bm, &[next_page])?;
    debug!(dir_page_id = next_page, prev_page = dir_page_id, "appended directory page");
    Ok(next_page)
}

/// Which chain pointer of a directory page to rewrite
enum Link {
    Prev(PageId),
    Next(PageId),
}

/// Rewrite one of the links of a pinned directory page
fn set_link(bm: &mut BufferManager, dir_page_id: PageId, link: Link) -> HeapResult<()> {
    let mut page = HeapPage::open(page_mut(bm, dir_page_id, "set_link")?, PageKind::Directory)?;
    match link {
        Link::Prev(page_id) => page.set_prev_page(page_id),
        Link::Next(page_id) => page.set_next_page(page_id),
    }
    Ok(())
}

/// Fail with `PagePinned` when `page_id` carries more than the `held` pins
/// taken by the caller
fn ensure_pins(bm: &BufferManager, page_id: PageId, held: u32, op: &'static str) -> HeapResult<()> {
    let pin_count = bm.pin_count(page_id);
    if pin_count > held {
        return Err(HeapError::BufferManager {
            op,
            source: FileError::PagePinned { page_id, pin_count },
        });
    }
    Ok(())
}

/// Decode the directory entry stored in `dir_slot` of a pinned page
fn read_entry(bm: &BufferManager, dir_page_id: PageId, dir_slot: SlotId) -> HeapResult<DataPageInfo> {
    let page = HeapPage::open(page(bm, dir_page_id, "read_entry")?, PageKind::Directory)?;
    DataPageInfo::decode(page.get_record(dir_slot)?)
}

/// Encode `info` back into `dir_slot` of a pinned page
fn write_entry(
    bm: &mut BufferManager,
    dir_page_id: PageId,
    dir_slot: SlotId,
    info: &DataPageInfo,
) -> HeapResult<()> {
    let mut page = HeapPage::open(page_mut(bm, dir_page_id, "write_entry")?, PageKind::Directory)?;
    let stored = page.get_record_mut(dir_slot)?;
    if stored.len() != DataPageInfo::SIZE {
        return Err(HeapError::WrongSize {
            expected: DataPageInfo::SIZE,
            actual: stored.len(),
        });
    }
    stored.copy_from_slice(&info.encode());
    Ok(())
}

/// Decode all entries of a pinned directory page
pub(super) fn read_dir_page(bm: &BufferManager, dir_page_id: PageId) -> HeapResult<DirPage> {
    let page = HeapPage::open(page(bm, dir_page_id, "read_dir_page")?, PageKind::Directory)?;

    let mut entries = Vec::new();
    let mut slot = page.first_record();
    while let Some(dir_slot) = slot {
        entries.push((dir_slot, DataPageInfo::decode(page.get_record(dir_slot)?)?));
        slot = page.next_record(dir_slot);
    }

    Ok(DirPage {
        entries,
        next_page: page.next_page(),
        available_space: page.available_space(),
    })
}

/// Pin, decode and unpin a directory page
pub(super) fn load_dir_page(
    bm: &mut BufferManager,
    dir_page_id: PageId,
    op: &'static str,
) -> HeapResult<DirPage> {
    pin_page(bm, dir_page_id, op)?;
    let dir = read_dir_page(bm, dir_page_id).or_release(bm, &[dir_page_id])?;
    unpin_page(bm, dir_page_id, false, op)?;
    Ok(dir)
}

pub(super) fn pin_page(bm: &mut BufferManager, page_id: PageId, op: &'static str) -> HeapResult<()> {
    bm.pin_page(page_id, false)
        .map_err(|source| HeapError::BufferManager { op, source })
}

pub(super) fn unpin_page(
    bm: &mut BufferManager,
    page_id: PageId,
    dirty: bool,
    op: &'static str,
) -> HeapResult<()> {
    bm.unpin_page(page_id, dirty)
        .map_err(|source| HeapError::BufferManager { op, source })
}

fn new_page(bm: &mut BufferManager, op: &'static str) -> HeapResult<PageId> {
    bm.new_page(1)
        .map_err(|source| HeapError::BufferManager { op, source })
}

fn free_page(bm: &mut BufferManager, page_id: PageId, op: &'static str) -> HeapResult<()> {
    bm.free_page(page_id)
        .map_err(|source| HeapError::BufferManager { op, source })
}

pub(super) fn page<'a>(bm: &'a BufferManager, page_id: PageId, op: &'static str) -> HeapResult<&'a [u8]> {
    bm.page(page_id)
        .map_err(|source| HeapError::BufferManager { op, source })
}

fn page_mut<'a>(
    bm: &'a mut BufferManager,
    page_id: PageId,
    op: &'static str,
) -> HeapResult<&'a mut [u8]> {
    bm.page_mut(page_id)
        .map_err(|source| HeapError::BufferManager { op, source })
}

/// Unpin pages held when an error cut an operation short. Failures here are
/// logged; the original error is the one reported.
fn release(bm: &mut BufferManager, page_ids: &[PageId], dirty: bool) {
    for &page_id in page_ids {
        if let Err(err) = bm.unpin_page(page_id, dirty) {
            warn!(page_id, error = %err, "failed to unpin page while propagating an error");
        }
    }
}

/// Release held pins before an error leaves the current operation
pub(super) trait ReleaseOnError<T> {
    /// Unpin `held` clean; nothing was modified
    fn or_release(self, bm: &mut BufferManager, held: &[PageId]) -> HeapResult<T>;

    /// Unpin `held` dirty; their buffers already carry changes
    fn or_release_dirty(self, bm: &mut BufferManager, held: &[PageId]) -> HeapResult<T>;
}

impl<T> ReleaseOnError<T> for HeapResult<T> {
    fn or_release(self, bm: &mut BufferManager, held: &[PageId]) -> HeapResult<T> {
        if self.is_err() {
            release(bm, held, false);
        }
        self
    }

    fn or_release_dirty(self, bm: &mut BufferManager, held: &[PageId]) -> HeapResult<T> {
        if self.is_err() {
            release(bm, held, true);
        }
        self
    }
}
