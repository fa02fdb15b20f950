//! External merge sort over a heap file of maps
//!
//! The input is read in runs sized to the memory budget. Each run is sorted
//! in memory. When the whole input fits in one run it is served straight
//! from memory; otherwise every run is written to its own temporary heap
//! file and the runs are merged through a binary heap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, warn};

use super::error::BigtResult;
use super::map::{Map, MapField};
use super::order::{OrderType, SortOrder};
use crate::file::BufferManager;
use crate::heap::{HeapFile, Scan};

/// Comparator shared by the in-memory sort and the merge
#[derive(Debug, Clone, Copy)]
struct SortKey {
    order: OrderType,
    field: MapField,
    direction: SortOrder,
}

impl SortKey {
    fn compare(&self, a: &Map, b: &Map) -> Ordering {
        let ordering = self
            .field
            .compare(a, b)
            .then_with(|| self.order.compare(a, b));
        self.direction.apply(ordering)
    }
}

/// A sorted run spilled to disk
#[derive(Debug)]
struct Run {
    file: HeapFile,
    scan: Scan,
}

/// Head of one run waiting in the merge heap
struct MergeEntry {
    map: Map,
    run: usize,
    key: SortKey,
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest map pops first,
        // earlier runs first among equals
        self.key
            .compare(&self.map, &other.map)
            .then_with(|| self.run.cmp(&other.run))
            .reverse()
    }
}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

enum Source {
    Memory(std::vec::IntoIter<Map>),
    Merge {
        runs: Vec<Run>,
        heads: BinaryHeap<MergeEntry>,
    },
    Closed,
}

/// Sorted iterator over the maps of a heap file
pub struct Sort {
    key: SortKey,
    source: Source,
}

impl Sort {
    /// Sort the maps of `input`.
    ///
    /// `max_key_len` is the longest value of `field` in the input and
    /// `budget_pages` the number of buffer pages the sort may fill with maps
    /// at once.
    pub fn new(
        bm: &mut BufferManager,
        input: &HeapFile,
        order: OrderType,
        field: MapField,
        direction: SortOrder,
        max_key_len: usize,
        budget_pages: usize,
    ) -> BigtResult<Self> {
        let key = SortKey {
            order,
            field,
            direction,
        };
        let run_len = (budget_pages.max(1) * bm.page_size() / (max_key_len + Map::HEADER_SIZE)).max(1);

        let mut runs = Vec::new();
        let mut chunk = Vec::with_capacity(run_len.min(4096));
        let mut scan = input.open_scan()?;
        let result = (|| -> BigtResult<()> {
            while let Some((_, bytes)) = scan.get_next(bm)? {
                chunk.push(Map::decode(&bytes)?);
                if chunk.len() == run_len {
                    runs.push(spill(bm, &key, &mut chunk)?);
                }
            }
            if !runs.is_empty() && !chunk.is_empty() {
                runs.push(spill(bm, &key, &mut chunk)?);
            }
            Ok(())
        })();

        if let Err(err) = result {
            discard_runs(bm, runs);
            return Err(err);
        }

        debug!(?order, ?field, run_len, runs = runs.len(), "sort input read");
        if runs.is_empty() {
            chunk.sort_by(|a, b| key.compare(a, b));
            return Ok(Self {
                key,
                source: Source::Memory(chunk.into_iter()),
            });
        }

        let mut sort = Self {
            key,
            source: Source::Merge {
                runs,
                heads: BinaryHeap::new(),
            },
        };
        if let Err(err) = sort.prime(bm) {
            sort.close(bm)?;
            return Err(err);
        }
        Ok(sort)
    }

    /// Number of runs written to disk, 0 when the input was sorted in memory
    pub fn run_count(&self) -> usize {
        match &self.source {
            Source::Merge { runs, .. } => runs.len(),
            _ => 0,
        }
    }

    /// Next map in sort order
    pub fn get_next(&mut self, bm: &mut BufferManager) -> BigtResult<Option<Map>> {
        let key = self.key;
        match &mut self.source {
            Source::Memory(maps) => Ok(maps.next()),
            Source::Merge { runs, heads } => {
                let Some(MergeEntry { map, run, .. }) = heads.pop() else {
                    return Ok(None);
                };
                if let Some(next) = next_map(bm, &mut runs[run].scan)? {
                    heads.push(MergeEntry { map: next, run, key });
                }
                Ok(Some(map))
            }
            Source::Closed => Ok(None),
        }
    }

    /// Release the sort, deleting any run files
    pub fn close(&mut self, bm: &mut BufferManager) -> BigtResult<()> {
        // Runs stay listed until all of their files are deleted
        if let Source::Merge { runs, heads } = &mut self.source {
            heads.clear();
            for run in runs.iter_mut().filter(|run| !run.file.is_deleted()) {
                run.file.delete_file(bm)?;
            }
        }
        self.source = Source::Closed;
        Ok(())
    }

    /// Load the first map of every run into the merge heap
    fn prime(&mut self, bm: &mut BufferManager) -> BigtResult<()> {
        let key = self.key;
        if let Source::Merge { runs, heads } = &mut self.source {
            for (run, entry) in runs.iter_mut().enumerate() {
                if let Some(map) = next_map(bm, &mut entry.scan)? {
                    heads.push(MergeEntry { map, run, key });
                }
            }
        }
        Ok(())
    }
}

fn next_map(bm: &mut BufferManager, scan: &mut Scan) -> BigtResult<Option<Map>> {
    match scan.get_next(bm)? {
        Some((_, bytes)) => Ok(Some(Map::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Sort `chunk` and write it to a fresh temporary heap file, leaving the
/// chunk empty
fn spill(bm: &mut BufferManager, key: &SortKey, chunk: &mut Vec<Map>) -> BigtResult<Run> {
    chunk.sort_by(|a, b| key.compare(a, b));

    let mut file = HeapFile::create_temp(bm)?;
    for map in chunk.drain(..) {
        if let Err(err) = map.encode().and_then(|bytes| Ok(file.insert_record(bm, &bytes)?)) {
            if let Err(delete_err) = file.delete_file(bm) {
                warn!(file = file.name(), error = %delete_err, "failed to delete sort run");
            }
            return Err(err);
        }
    }

    let scan = file.open_scan()?;
    debug!(file = file.name(), "spilled sort run");
    Ok(Run { file, scan })
}

fn discard_runs(bm: &mut BufferManager, runs: Vec<Run>) {
    for mut run in runs {
        if let Err(err) = run.file.delete_file(bm) {
            warn!(file = run.file.name(), error = %err, "failed to delete sort run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::DiskManager;
    use tempfile::TempDir;

    fn setup_test_env(page_size: usize) -> (TempDir, BufferManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let disk = DiskManager::create(temp_dir.path().join("sort.db"), page_size).unwrap();
        (temp_dir, BufferManager::with_capacity(disk, 16))
    }

    fn fill(bm: &mut BufferManager, maps: &[Map]) -> HeapFile {
        let mut file = HeapFile::open(bm, Some("input")).unwrap();
        for map in maps {
            file.insert_record(bm, &map.encode().unwrap()).unwrap();
        }
        file
    }

    fn drain(bm: &mut BufferManager, sort: &mut Sort) -> Vec<Map> {
        let mut maps = Vec::new();
        while let Some(map) = sort.get_next(bm).unwrap() {
            maps.push(map);
        }
        maps
    }

    /// Deterministic scramble of 0..n
    fn scrambled(n: u32) -> Vec<u32> {
        (0..n).map(|i| (i * 7919) % n).collect()
    }

    #[test]
    fn test_sort_in_memory() {
        let (_temp_dir, mut bm) = setup_test_env(4096);
        let maps: Vec<Map> = scrambled(50)
            .into_iter()
            .map(|i| Map::new(format!("r{i:02}"), "c", i as i32, "v"))
            .collect();
        let input = fill(&mut bm, &maps);

        let mut sort = Sort::new(
            &mut bm,
            &input,
            OrderType::RowColumnTimestamp,
            MapField::Row,
            SortOrder::Ascending,
            3,
            4,
        )
        .unwrap();
        assert_eq!(sort.run_count(), 0);

        let rows: Vec<String> = drain(&mut bm, &mut sort)
            .iter()
            .map(|m| m.row().to_string())
            .collect();
        let expected: Vec<String> = (0..50).map(|i| format!("r{i:02}")).collect();
        assert_eq!(rows, expected);
        sort.close(&mut bm).unwrap();
        assert_eq!(bm.pinned_frame_count(), 0);
    }

    #[test]
    fn test_sort_with_spilled_runs() {
        let (_temp_dir, mut bm) = setup_test_env(256);
        let maps: Vec<Map> = scrambled(300)
            .into_iter()
            .map(|i| Map::new("r", format!("c{}", i % 10), i as i32, "v"))
            .collect();
        let input = fill(&mut bm, &maps);
        let files_before = bm.disk_manager().file_names().count();

        // 256 / (4 + 10) = 18 maps per run
        let mut sort = Sort::new(
            &mut bm,
            &input,
            OrderType::Timestamp,
            MapField::Timestamp,
            SortOrder::Ascending,
            4,
            1,
        )
        .unwrap();
        assert_eq!(sort.run_count(), 17);

        let timestamps: Vec<i32> = drain(&mut bm, &mut sort)
            .iter()
            .map(Map::timestamp)
            .collect();
        assert_eq!(timestamps, (0..300).collect::<Vec<_>>());
        assert!(sort.get_next(&mut bm).unwrap().is_none());

        sort.close(&mut bm).unwrap();
        assert_eq!(bm.disk_manager().file_names().count(), files_before);
        assert_eq!(bm.pinned_frame_count(), 0);
    }

    #[test]
    fn test_ties_broken_by_order_type() {
        let (_temp_dir, mut bm) = setup_test_env(256);
        let maps = [
            Map::new("b", "y", 2, "1"),
            Map::new("a", "z", 1, "2"),
            Map::new("b", "x", 3, "3"),
            Map::new("a", "z", 0, "4"),
        ];
        let input = fill(&mut bm, &maps);

        let mut sort = Sort::new(
            &mut bm,
            &input,
            OrderType::RowColumnTimestamp,
            MapField::Row,
            SortOrder::Ascending,
            1,
            1,
        )
        .unwrap();
        let values: Vec<String> = drain(&mut bm, &mut sort)
            .iter()
            .map(|m| m.value().to_string())
            .collect();
        assert_eq!(values, ["4", "2", "3", "1"]);
        sort.close(&mut bm).unwrap();
    }

    #[test]
    fn test_descending() {
        let (_temp_dir, mut bm) = setup_test_env(256);
        let maps: Vec<Map> = (0..40).map(|i| Map::new("r", "c", i, "v")).collect();
        let input = fill(&mut bm, &maps);

        let mut sort = Sort::new(
            &mut bm,
            &input,
            OrderType::Timestamp,
            MapField::Timestamp,
            SortOrder::Descending,
            4,
            1,
        )
        .unwrap();
        assert!(sort.run_count() > 1);
        let timestamps: Vec<i32> = drain(&mut bm, &mut sort).iter().map(Map::timestamp).collect();
        assert_eq!(timestamps, (0..40).rev().collect::<Vec<_>>());
        sort.close(&mut bm).unwrap();
    }

    #[test]
    fn test_empty_input() {
        let (_temp_dir, mut bm) = setup_test_env(256);
        let input = fill(&mut bm, &[]);

        let mut sort = Sort::new(
            &mut bm,
            &input,
            OrderType::RowTimestamp,
            MapField::Row,
            SortOrder::Ascending,
            0,
            0,
        )
        .unwrap();
        assert!(sort.get_next(&mut bm).unwrap().is_none());
        sort.close(&mut bm).unwrap();
        sort.close(&mut bm).unwrap();
    }
}
