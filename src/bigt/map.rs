use std::cmp::Ordering;
use std::fmt;

use super::error::{BigtError, BigtResult};

/// One cell version of a big table: `(row, column, timestamp) -> value`.
///
/// Encoded layout (big-endian):
///
/// ```text
/// +---------+---------+---------+-----------+-----+--------+-------+
/// | row_len | col_len | val_len | timestamp | row | column | value |
/// |   u16   |   u16   |   u16   |    i32    |     |        |       |
/// +---------+---------+---------+-----------+-----+--------+-------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    row: String,
    column: String,
    timestamp: i32,
    value: String,
}

/// Fields of a map, in their conventional order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapField {
    Row = 1,
    Column = 2,
    Timestamp = 3,
    Value = 4,
}

impl MapField {
    /// Compare two maps on this field alone
    pub fn compare(self, a: &Map, b: &Map) -> Ordering {
        match self {
            MapField::Row => a.row.cmp(&b.row),
            MapField::Column => a.column.cmp(&b.column),
            MapField::Timestamp => a.timestamp.cmp(&b.timestamp),
            MapField::Value => a.value.cmp(&b.value),
        }
    }
}

impl Map {
    /// Size of the fixed part of an encoded map
    pub const HEADER_SIZE: usize = 10;

    pub fn new(
        row: impl Into<String>,
        column: impl Into<String>,
        timestamp: i32,
        value: impl Into<String>,
    ) -> Self {
        Self {
            row: row.into(),
            column: column.into(),
            timestamp,
            value: value.into(),
        }
    }

    pub fn row(&self) -> &str {
        &self.row
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn timestamp(&self) -> i32 {
        self.timestamp
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Stored length of a field; timestamps are always 4 bytes
    pub fn key_len(&self, field: MapField) -> usize {
        match field {
            MapField::Row => self.row.len(),
            MapField::Column => self.column.len(),
            MapField::Timestamp => 4,
            MapField::Value => self.value.len(),
        }
    }

    /// Length of the encoded record
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.row.len() + self.column.len() + self.value.len()
    }

    pub fn encode(&self) -> BigtResult<Vec<u8>> {
        let row_len = field_len("row", &self.row)?;
        let col_len = field_len("column", &self.column)?;
        let val_len = field_len("value", &self.value)?;

        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&row_len.to_be_bytes());
        bytes.extend_from_slice(&col_len.to_be_bytes());
        bytes.extend_from_slice(&val_len.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(self.row.as_bytes());
        bytes.extend_from_slice(self.column.as_bytes());
        bytes.extend_from_slice(self.value.as_bytes());
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> BigtResult<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(BigtError::MapDecode(format!(
                "{} bytes is shorter than the map header",
                bytes.len()
            )));
        }

        let row_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        let col_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let val_len = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
        let timestamp = i32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

        let expected = Self::HEADER_SIZE + row_len + col_len + val_len;
        if bytes.len() != expected {
            return Err(BigtError::MapDecode(format!(
                "header describes {} bytes, record has {}",
                expected,
                bytes.len()
            )));
        }

        let (row, rest) = bytes[Self::HEADER_SIZE..].split_at(row_len);
        let (column, value) = rest.split_at(col_len);

        Ok(Self {
            row: utf8("row", row)?,
            column: utf8("column", column)?,
            timestamp,
            value: utf8("value", value)?,
        })
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}] -> {}",
            self.row, self.column, self.timestamp, self.value
        )
    }
}

fn field_len(field: &'static str, text: &str) -> BigtResult<u16> {
    u16::try_from(text.len()).map_err(|_| BigtError::KeyTooLong {
        field,
        len: text.len(),
    })
}

fn utf8(field: &str, bytes: &[u8]) -> BigtResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|err| BigtError::MapDecode(format!("{field} is not UTF-8: {err}")))
}
