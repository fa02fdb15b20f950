use tracing::{debug, warn};

use super::bigtable::BigTable;
use super::error::{BigtError, BigtResult};
use super::filter::MapFilter;
use super::map::{Map, MapField};
use super::order::{OrderType, SortOrder};
use super::sort::Sort;
use crate::file::BufferManager;
use crate::heap::{HeapFile, Scan};

/// Longest key seen for each sortable field
#[derive(Debug, Default, Clone, Copy)]
struct KeyLengths {
    row: usize,
    column: usize,
}

impl KeyLengths {
    fn observe(&mut self, map: &Map) {
        self.row = self.row.max(map.key_len(MapField::Row));
        self.column = self.column.max(map.key_len(MapField::Column));
    }

    fn get(&self, field: MapField) -> usize {
        match field {
            MapField::Row => self.row,
            MapField::Column => self.column,
            MapField::Timestamp => 4,
            MapField::Value => 0,
        }
    }
}

/// One filtered, optionally sorted sequence of maps over the partitions of
/// a big table.
///
/// Opening the stream copies every matching map of partitions `1..` into a
/// temporary heap file. Partition 0 is not read. The temporary file is
/// either scanned as is or fed through an external sort, and it is deleted
/// by `close`.
pub struct Stream {
    temp_file: HeapFile,
    scan: Option<Scan>,
    sort: Option<Sort>,
    maps_found: usize,
    closed: bool,
}

impl Stream {
    /// Open a stream with filters given in their text form (`*`, `[lo,hi]`
    /// or an exact key)
    pub fn open(
        bm: &mut BufferManager,
        bigtable: &BigTable,
        order: OrderType,
        row_filter: &str,
        column_filter: &str,
        value_filter: &str,
    ) -> BigtResult<Self> {
        let filter = MapFilter::new(row_filter, column_filter, value_filter)?;
        Self::with_filter(bm, bigtable, order, filter)
    }

    pub fn with_filter(
        bm: &mut BufferManager,
        bigtable: &BigTable,
        order: OrderType,
        filter: MapFilter,
    ) -> BigtResult<Self> {
        let mut temp_file = HeapFile::create_temp(bm)?;

        let prepared = drain_partitions(bm, bigtable, &filter, &mut temp_file)
            .and_then(|key_lengths| prepare(bm, &temp_file, order, key_lengths));
        let (scan, sort) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                if let Err(delete_err) = temp_file.delete_file(bm) {
                    warn!(file = temp_file.name(), error = %delete_err, "failed to delete stream file");
                }
                return Err(err);
            }
        };

        Ok(Self {
            temp_file,
            scan,
            sort,
            maps_found: 0,
            closed: false,
        })
    }

    /// Next map in stream order, `None` once exhausted
    pub fn get_next(&mut self, bm: &mut BufferManager) -> BigtResult<Option<Map>> {
        if self.closed {
            return Err(BigtError::StreamClosed);
        }

        if let Some(sort) = &mut self.sort {
            let map = sort.get_next(bm)?;
            if map.is_some() {
                self.maps_found += 1;
            }
            return Ok(map);
        }

        match &mut self.scan {
            Some(scan) => match scan.get_next(bm)? {
                Some((_, bytes)) => Ok(Some(Map::decode(&bytes)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Maps returned so far. Only sorted streams keep count.
    pub fn maps_found(&self) -> usize {
        self.maps_found
    }

    /// Catalog name of the temporary heap file backing this stream
    pub fn temp_file_name(&self) -> &str {
        self.temp_file.name()
    }

    /// Release the sort and the scan and delete the temporary heap file.
    /// The stream only counts as closed once all of that succeeded; a failed
    /// close can be retried and closing twice is a no-op.
    pub fn close(&mut self, bm: &mut BufferManager) -> BigtResult<()> {
        if self.closed {
            return Ok(());
        }

        let sorted = match &mut self.sort {
            Some(sort) => sort.close(bm),
            None => Ok(()),
        };
        if sorted.is_ok() {
            self.sort = None;
        }
        self.scan = None;

        if !self.temp_file.is_deleted() {
            self.temp_file.delete_file(bm)?;
        }
        sorted?;

        self.closed = true;
        debug!(file = self.temp_file.name(), "closed stream");
        Ok(())
    }
}

/// Copy the matching maps of every partition but the first into `temp_file`
fn drain_partitions(
    bm: &mut BufferManager,
    bigtable: &BigTable,
    filter: &MapFilter,
    temp_file: &mut HeapFile,
) -> BigtResult<KeyLengths> {
    let mut key_lengths = KeyLengths::default();

    for part in bigtable.parts().iter().skip(1) {
        let mut stream = part.open_stream(filter.clone())?;
        let mut copied = 0usize;
        while let Some((_, map)) = stream.get_next(bm)? {
            temp_file.insert_record(bm, &map.encode()?)?;
            key_lengths.observe(&map);
            copied += 1;
        }
        stream.close();
        debug!(part = part.name(), copied, "drained partition");
    }

    Ok(key_lengths)
}

/// Set up the read side: a plain scan for unordered streams, a sort
/// otherwise
fn prepare(
    bm: &mut BufferManager,
    temp_file: &HeapFile,
    order: OrderType,
    key_lengths: KeyLengths,
) -> BigtResult<(Option<Scan>, Option<Sort>)> {
    let Some(field) = order.sort_field() else {
        return Ok((Some(temp_file.open_scan()?), None));
    };

    let budget_pages = bm.available_frames() / 2;
    let sort = Sort::new(
        bm,
        temp_file,
        order,
        field,
        SortOrder::Ascending,
        key_lengths.get(field),
        budget_pages,
    )?;
    Ok((None, Some(sort)))
}
