use std::cmp::Ordering;

use super::error::BigtError;
use super::map::{Map, MapField};

/// How a stream orders the maps it returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    /// Physical order, no sorting
    Unordered = 0,
    /// Row, then column, then timestamp
    RowColumnTimestamp = 1,
    /// Column, then row, then timestamp
    ColumnRowTimestamp = 2,
    /// Row, then timestamp
    RowTimestamp = 3,
    /// Column, then timestamp
    ColumnTimestamp = 4,
    /// Timestamp only
    Timestamp = 6,
}

impl OrderType {
    /// Field the external sort keys on, `None` for unordered streams
    pub fn sort_field(self) -> Option<MapField> {
        match self {
            OrderType::Unordered => None,
            OrderType::RowColumnTimestamp | OrderType::RowTimestamp => Some(MapField::Row),
            OrderType::ColumnRowTimestamp | OrderType::ColumnTimestamp => Some(MapField::Column),
            OrderType::Timestamp => Some(MapField::Timestamp),
        }
    }

    /// Compare two maps under this order
    pub fn compare(self, a: &Map, b: &Map) -> Ordering {
        let rows = || a.row().cmp(b.row());
        let columns = || a.column().cmp(b.column());
        let timestamps = || a.timestamp().cmp(&b.timestamp());

        match self {
            OrderType::Unordered => Ordering::Equal,
            OrderType::RowColumnTimestamp => rows().then_with(columns).then_with(timestamps),
            OrderType::ColumnRowTimestamp => columns().then_with(rows).then_with(timestamps),
            OrderType::RowTimestamp => rows().then_with(timestamps),
            OrderType::ColumnTimestamp => columns().then_with(timestamps),
            OrderType::Timestamp => timestamps(),
        }
    }
}

impl TryFrom<u8> for OrderType {
    type Error = BigtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderType::Unordered),
            1 => Ok(OrderType::RowColumnTimestamp),
            2 => Ok(OrderType::ColumnRowTimestamp),
            3 => Ok(OrderType::RowTimestamp),
            4 => Ok(OrderType::ColumnTimestamp),
            6 => Ok(OrderType::Timestamp),
            other => Err(BigtError::InvalidOrderType(other)),
        }
    }
}

/// Direction of a sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}
