use std::io;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use super::error::{BigtError, BigtResult};
use super::filter::MapFilter;
use super::map::Map;
use crate::file::BufferManager;
use crate::heap::{HeapFile, Mid, Scan};

/// One partition of a big table: a named heap file of encoded maps
#[derive(Debug)]
pub struct BigT {
    heap: HeapFile,
}

impl BigT {
    /// Open the partition stored under `name`, creating it when missing
    pub fn open(bm: &mut BufferManager, name: &str) -> BigtResult<Self> {
        Ok(Self {
            heap: HeapFile::open(bm, Some(name))?,
        })
    }

    pub fn name(&self) -> &str {
        self.heap.name()
    }

    pub fn heap_file(&self) -> &HeapFile {
        &self.heap
    }

    pub fn insert_map(&mut self, bm: &mut BufferManager, map: &Map) -> BigtResult<Mid> {
        Ok(self.heap.insert_record(bm, &map.encode()?)?)
    }

    pub fn get_map(&self, bm: &mut BufferManager, mid: Mid) -> BigtResult<Map> {
        Map::decode(&self.heap.get_record(bm, mid)?)
    }

    /// Returns `false` when no map has this id
    pub fn delete_map(&mut self, bm: &mut BufferManager, mid: Mid) -> BigtResult<bool> {
        Ok(self.heap.delete_record(bm, mid)?)
    }

    pub fn map_count(&self, bm: &mut BufferManager) -> BigtResult<usize> {
        Ok(self.heap.record_count(bm)?)
    }

    /// Stream over the maps of this partition that pass `filter`
    pub fn open_stream(&self, filter: MapFilter) -> BigtResult<BigTStream> {
        Ok(BigTStream {
            scan: Some(self.heap.open_scan()?),
            filter,
        })
    }

    /// Remove the partition and all of its pages
    pub fn delete(&mut self, bm: &mut BufferManager) -> BigtResult<()> {
        Ok(self.heap.delete_file(bm)?)
    }
}

/// Filtered scan over one partition
#[derive(Debug)]
pub struct BigTStream {
    scan: Option<Scan>,
    filter: MapFilter,
}

impl BigTStream {
    /// Next matching map and its id
    pub fn get_next(&mut self, bm: &mut BufferManager) -> BigtResult<Option<(Mid, Map)>> {
        let scan = self.scan.as_mut().ok_or(BigtError::StreamClosed)?;

        while let Some((mid, bytes)) = scan.get_next(bm)? {
            let map = Map::decode(&bytes)?;
            if self.filter.matches(&map) {
                return Ok(Some((mid, map)));
            }
        }
        Ok(None)
    }

    pub fn close(&mut self) {
        self.scan = None;
    }
}

/// A big table split over several partitions named `{name}.{i}`
#[derive(Debug)]
pub struct BigTable {
    name: String,
    parts: Vec<BigT>,
}

impl BigTable {
    /// Open or create the `partitions` partitions of table `name`
    pub fn open(bm: &mut BufferManager, name: &str, partitions: usize) -> BigtResult<Self> {
        if partitions == 0 {
            return Err(BigtError::InvalidPartition { part: 0, parts: 0 });
        }

        let parts = (0..partitions)
            .map(|i| BigT::open(bm, &Self::part_name(name, i)))
            .collect::<BigtResult<Vec<_>>>()?;

        debug!(table = name, partitions, "opened big table");
        Ok(Self {
            name: name.to_string(),
            parts,
        })
    }

    /// Catalog name of partition `index`
    pub fn part_name(name: &str, index: usize) -> String {
        format!("{name}.{index}")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parts(&self) -> &[BigT] {
        &self.parts
    }

    pub fn part(&self, part: usize) -> BigtResult<&BigT> {
        self.parts.get(part).ok_or(BigtError::InvalidPartition {
            part,
            parts: self.parts.len(),
        })
    }

    fn part_mut(&mut self, part: usize) -> BigtResult<&mut BigT> {
        let parts = self.parts.len();
        self.parts
            .get_mut(part)
            .ok_or(BigtError::InvalidPartition { part, parts })
    }

    pub fn insert_map(&mut self, bm: &mut BufferManager, part: usize, map: &Map) -> BigtResult<Mid> {
        self.part_mut(part)?.insert_map(bm, map)
    }

    /// Maps over all partitions
    pub fn map_count(&self, bm: &mut BufferManager) -> BigtResult<usize> {
        self.parts
            .iter()
            .map(|part| part.map_count(bm))
            .sum()
    }

    /// Load `row,column,timestamp,value` lines into partition `part`.
    /// Returns the number of maps inserted.
    pub fn load_csv<R: io::Read>(
        &mut self,
        bm: &mut BufferManager,
        reader: R,
        part: usize,
    ) -> BigtResult<usize> {
        let target = self.part_mut(part)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .trim(Trim::All)
            .from_reader(reader);

        let mut inserted = 0;
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |pos| pos.line());
            if record.len() != 4 {
                return Err(BigtError::InvalidCsvRow {
                    line,
                    reason: format!("expected 4 fields, found {}", record.len()),
                });
            }

            let timestamp = record[2].parse::<i32>().map_err(|err| BigtError::InvalidCsvRow {
                line,
                reason: format!("timestamp {:?}: {err}", &record[2]),
            })?;
            let map = Map::new(&record[0], &record[1], timestamp, &record[3]);
            target.insert_map(bm, &map)?;
            inserted += 1;
        }

        info!(table = %self.name, part, inserted, "loaded csv");
        Ok(inserted)
    }

    /// Remove every partition
    pub fn delete(&mut self, bm: &mut BufferManager) -> BigtResult<()> {
        for part in &mut self.parts {
            part.delete(bm)?;
        }
        debug!(table = %self.name, "deleted big table");
        Ok(())
    }
}
