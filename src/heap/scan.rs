use super::error::HeapResult;
use super::heap_file::{ReleaseOnError, load_dir_page, page, pin_page, unpin_page};
use super::page::{HeapPage, PageKind};
use super::record::{Mid, SlotId};
use crate::file::{BufferManager, INVALID_PAGE, PageId};

/// Sequential scan over a heap file in physical order: directory entries in
/// chain order, records in slot order within each data page.
///
/// The scan holds no pins between calls, only a cursor.
#[derive(Debug)]
pub struct Scan {
    /// Directory page being walked, `INVALID_PAGE` once exhausted
    dir_page_id: PageId,
    /// Current directory entry and the data page it describes
    entry: Option<(SlotId, PageId)>,
    /// Last slot returned from the current data page
    last_slot: Option<SlotId>,
}

impl Scan {
    pub(super) fn new(first_dir_page_id: PageId) -> Self {
        Self {
            dir_page_id: first_dir_page_id,
            entry: None,
            last_slot: None,
        }
    }

    /// Next record and its id, `None` at the end of the file
    pub fn get_next(&mut self, bm: &mut BufferManager) -> HeapResult<Option<(Mid, Vec<u8>)>> {
        loop {
            if self.dir_page_id == INVALID_PAGE {
                return Ok(None);
            }

            let Some((dir_slot, data_page_id)) = self.entry else {
                self.advance_entry(bm, None)?;
                continue;
            };

            if let Some((slot_id, record)) = next_record_on(bm, data_page_id, self.last_slot)? {
                self.last_slot = Some(slot_id);
                return Ok(Some((Mid::new(data_page_id, slot_id), record)));
            }

            self.advance_entry(bm, Some(dir_slot))?;
        }
    }

    /// Move to the entry after `after` on the current directory page, or to
    /// the next directory page when there is none
    fn advance_entry(&mut self, bm: &mut BufferManager, after: Option<SlotId>) -> HeapResult<()> {
        let dir = load_dir_page(bm, self.dir_page_id, "scan")?;
        let next_entry = dir
            .entries
            .iter()
            .find(|(dir_slot, _)| after.is_none_or(|after| *dir_slot > after))
            .map(|&(dir_slot, info)| (dir_slot, info.page_id));

        self.last_slot = None;
        match next_entry {
            Some(entry) => self.entry = Some(entry),
            None => {
                self.entry = None;
                self.dir_page_id = dir.next_page;
            }
        }
        Ok(())
    }
}

/// First used slot after `after` on a data page, with its bytes
fn next_record_on(
    bm: &mut BufferManager,
    data_page_id: PageId,
    after: Option<SlotId>,
) -> HeapResult<Option<(SlotId, Vec<u8>)>> {
    pin_page(bm, data_page_id, "scan")?;
    let record = page(bm, data_page_id, "scan")
        .and_then(|buffer| {
            let page = HeapPage::open(buffer, PageKind::Data)?;
            let slot = match after {
                Some(slot_id) => page.next_record(slot_id),
                None => page.first_record(),
            };
            match slot {
                Some(slot_id) => Ok(Some((slot_id, page.get_record(slot_id)?.to_vec()))),
                None => Ok(None),
            }
        })
        .or_release(bm, &[data_page_id])?;
    unpin_page(bm, data_page_id, false, "scan")?;
    Ok(record)
}
