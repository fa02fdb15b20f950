//! Scenario tests for big tables and streams

use crate::bigt::{BigTable, BigtError, Map, MapFilter, OrderType, Stream};
use crate::file::{BufferManager, DiskManager, FileError, PAGE_SIZE};
use crate::heap::{HeapError, HeapFile};
use tempfile::TempDir;

fn setup_test_env(page_size: usize, frames: usize) -> (TempDir, BufferManager) {
    let temp_dir = tempfile::tempdir().unwrap();
    let disk = DiskManager::create(temp_dir.path().join("bigt.db"), page_size).unwrap();
    (temp_dir, BufferManager::with_capacity(disk, frames))
}

/// Three partitions. Partition 0 holds three `Dog` maps that streams never
/// see; partitions 1 and 2 hold twelve maps, five of them `Dog`.
fn animals(bm: &mut BufferManager) -> BigTable {
    let mut table = BigTable::open(bm, "animals", 3).unwrap();

    for ts in 0..3 {
        table
            .insert_map(bm, 0, &Map::new("Dog", "Hidden", ts, "p0"))
            .unwrap();
    }

    let part1 = [
        ("Dog", "Color", 14, "Brown"),
        ("Cat", "Color", 12, "Black"),
        ("Dog", "Legs", 11, "4"),
        ("Eel", "Habitat", 10, "River"),
        ("Fox", "Color", 9, "Red"),
        ("Dog", "Sound", 8, "Woof"),
    ];
    let part2 = [
        ("Cat", "Legs", 7, "4"),
        ("Dog", "Habitat", 6, "House"),
        ("Eel", "Color", 5, "Grey"),
        ("Dog", "Age", 4, "3"),
        ("Ant", "Legs", 3, "6"),
        ("Bee", "Sound", 2, "Buzz"),
    ];
    for (part, maps) in [(1, part1), (2, part2)] {
        for (row, column, ts, value) in maps {
            table
                .insert_map(bm, part, &Map::new(row, column, ts, value))
                .unwrap();
        }
    }

    table
}

fn collect(bm: &mut BufferManager, stream: &mut Stream) -> Vec<Map> {
    let mut maps = Vec::new();
    while let Some(map) = stream.get_next(bm).unwrap() {
        maps.push(map);
    }
    maps
}

#[test]
fn test_unordered_stream_skips_first_partition() {
    let (_temp_dir, mut bm) = setup_test_env(PAGE_SIZE, 32);
    let table = animals(&mut bm);

    let mut stream = Stream::open(&mut bm, &table, OrderType::Unordered, "Dog", "*", "*").unwrap();
    let maps = collect(&mut bm, &mut stream);

    assert_eq!(maps.len(), 5);
    assert!(maps.iter().all(|m| m.row() == "Dog" && m.value() != "p0"));
    // Physical order: partition 1 first, then partition 2
    let values: Vec<&str> = maps.iter().map(Map::value).collect();
    assert_eq!(values, ["Brown", "4", "Woof", "House", "3"]);
    assert!(stream.get_next(&mut bm).unwrap().is_none());

    // Only sorted streams count what they return
    assert_eq!(stream.maps_found(), 0);

    let temp_name = stream.temp_file_name().to_string();
    assert!(bm.disk_manager().get_file_entry(&temp_name).is_some());
    stream.close(&mut bm).unwrap();
    assert!(bm.disk_manager().get_file_entry(&temp_name).is_none());

    // Reopening under the same name gives a fresh, empty file
    let mut reopened = HeapFile::open(&mut bm, Some(temp_name.as_str())).unwrap();
    assert_eq!(reopened.record_count(&mut bm).unwrap(), 0);
    reopened.delete_file(&mut bm).unwrap();

    assert!(matches!(stream.get_next(&mut bm), Err(BigtError::StreamClosed)));
    stream.close(&mut bm).unwrap();
    assert_eq!(bm.pinned_frame_count(), 0);
}

#[test]
fn test_stream_sorted_by_row() {
    let (_temp_dir, mut bm) = setup_test_env(PAGE_SIZE, 32);
    let table = animals(&mut bm);

    let mut stream =
        Stream::open(&mut bm, &table, OrderType::RowColumnTimestamp, "*", "*", "*").unwrap();
    let keys: Vec<(String, String)> = collect(&mut bm, &mut stream)
        .iter()
        .map(|m| (m.row().to_string(), m.column().to_string()))
        .collect();

    let expected = [
        ("Ant", "Legs"),
        ("Bee", "Sound"),
        ("Cat", "Color"),
        ("Cat", "Legs"),
        ("Dog", "Age"),
        ("Dog", "Color"),
        ("Dog", "Habitat"),
        ("Dog", "Legs"),
        ("Dog", "Sound"),
        ("Eel", "Color"),
        ("Eel", "Habitat"),
        ("Fox", "Color"),
    ];
    let expected: Vec<(String, String)> = expected
        .iter()
        .map(|(r, c)| (r.to_string(), c.to_string()))
        .collect();
    assert_eq!(keys, expected);
    assert_eq!(stream.maps_found(), 12);

    stream.close(&mut bm).unwrap();
    assert_eq!(bm.pinned_frame_count(), 0);
}

#[test]
fn test_stream_sorted_by_column_with_range_filter() {
    let (_temp_dir, mut bm) = setup_test_env(PAGE_SIZE, 32);
    let table = animals(&mut bm);

    let mut stream = Stream::open(
        &mut bm,
        &table,
        OrderType::ColumnRowTimestamp,
        "[Cat,Eel]",
        "[Color,Legs]",
        "*",
    )
    .unwrap();
    let keys: Vec<(String, String)> = collect(&mut bm, &mut stream)
        .iter()
        .map(|m| (m.column().to_string(), m.row().to_string()))
        .collect();

    let expected: Vec<(String, String)> = [
        ("Color", "Cat"),
        ("Color", "Dog"),
        ("Color", "Eel"),
        ("Habitat", "Dog"),
        ("Habitat", "Eel"),
        ("Legs", "Cat"),
        ("Legs", "Dog"),
    ]
    .iter()
    .map(|(c, r)| (c.to_string(), r.to_string()))
    .collect();
    assert_eq!(keys, expected);
    assert_eq!(stream.maps_found(), 7);
    stream.close(&mut bm).unwrap();
}

#[test]
fn test_stream_sorted_by_timestamp() {
    let (_temp_dir, mut bm) = setup_test_env(PAGE_SIZE, 32);
    let table = animals(&mut bm);

    let mut stream = Stream::open(&mut bm, &table, OrderType::Timestamp, "*", "*", "*").unwrap();
    let timestamps: Vec<i32> = collect(&mut bm, &mut stream)
        .iter()
        .map(Map::timestamp)
        .collect();
    assert_eq!(timestamps, (2..=14).filter(|&ts| ts != 13).collect::<Vec<_>>());
    stream.close(&mut bm).unwrap();
}

#[test]
fn test_stream_spills_large_sorts() {
    let (_temp_dir, mut bm) = setup_test_env(256, 8);
    let mut table = BigTable::open(&mut bm, "numbers", 2).unwrap();

    for i in 0..300u32 {
        let key = (i * 7919) % 300;
        table
            .insert_map(&mut bm, 1, &Map::new(format!("r{key:04}"), "c", i as i32, "v"))
            .unwrap();
    }

    let mut stream =
        Stream::open(&mut bm, &table, OrderType::RowTimestamp, "*", "*", "*").unwrap();
    let rows: Vec<String> = collect(&mut bm, &mut stream)
        .iter()
        .map(|m| m.row().to_string())
        .collect();
    let expected: Vec<String> = (0..300).map(|i| format!("r{i:04}")).collect();
    assert_eq!(rows, expected);
    assert_eq!(stream.maps_found(), 300);

    stream.close(&mut bm).unwrap();
    // Only the two partitions remain in the catalog
    assert_eq!(bm.disk_manager().file_names().count(), 2);
    assert_eq!(bm.pinned_frame_count(), 0);
}

#[test]
fn test_stream_over_single_partition_is_empty() {
    let (_temp_dir, mut bm) = setup_test_env(PAGE_SIZE, 16);
    let mut table = BigTable::open(&mut bm, "solo", 1).unwrap();
    table
        .insert_map(&mut bm, 0, &Map::new("a", "b", 1, "c"))
        .unwrap();

    for order in [OrderType::Unordered, OrderType::RowColumnTimestamp] {
        let mut stream = Stream::with_filter(&mut bm, &table, order, MapFilter::all()).unwrap();
        assert!(stream.get_next(&mut bm).unwrap().is_none());
        stream.close(&mut bm).unwrap();
    }
    assert_eq!(bm.disk_manager().file_names().count(), 1);
}

#[test]
fn test_stream_bad_filter() {
    let (_temp_dir, mut bm) = setup_test_env(PAGE_SIZE, 16);
    let table = animals(&mut bm);
    let files = bm.disk_manager().file_names().count();

    let result = Stream::open(&mut bm, &table, OrderType::Unordered, "[Dog", "*", "*");
    assert!(matches!(result, Err(BigtError::InvalidFilter(_))));
    assert_eq!(bm.disk_manager().file_names().count(), files);
}

#[test]
fn test_order_code_five_rejected() {
    assert!(matches!(
        OrderType::try_from(5u8),
        Err(BigtError::InvalidOrderType(5))
    ));
}

#[test]
fn test_failed_close_keeps_stream_open_until_retried() {
    let (_temp_dir, mut bm) = setup_test_env(PAGE_SIZE, 32);
    let table = animals(&mut bm);

    let mut stream = Stream::open(&mut bm, &table, OrderType::Unordered, "Dog", "*", "*").unwrap();
    assert_eq!(collect(&mut bm, &mut stream).len(), 5);

    // Someone else still holds the first page of the stream file
    let temp_name = stream.temp_file_name().to_string();
    let first_page = bm.disk_manager().get_file_entry(&temp_name).unwrap();
    bm.pin_page(first_page, false).unwrap();
    assert!(matches!(
        stream.close(&mut bm),
        Err(BigtError::Heap(HeapError::BufferManager {
            source: FileError::PagePinned { .. },
            ..
        }))
    ));
    assert!(bm.disk_manager().get_file_entry(&temp_name).is_some());
    bm.unpin_page(first_page, false).unwrap();

    stream.close(&mut bm).unwrap();
    assert!(bm.disk_manager().get_file_entry(&temp_name).is_none());
    assert!(matches!(stream.get_next(&mut bm), Err(BigtError::StreamClosed)));
    assert_eq!(bm.pinned_frame_count(), 0);
}
