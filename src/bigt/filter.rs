use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{BigtError, BigtResult};
use super::map::Map;

/// `[lo,hi]` with optional whitespace around the bounds
static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\s*([^,\[\]]*?)\s*,\s*([^,\[\]]*?)\s*\]$").expect("range pattern is valid")
});

/// Predicate on one key of a map.
///
/// Syntax: `*` matches everything, `[lo,hi]` matches keys between the
/// bounds (inclusive, byte-wise), any other text matches exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Any,
    Exact(String),
    Range { lo: String, hi: String },
}

impl Filter {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Filter::Any => true,
            Filter::Exact(expected) => key == expected,
            Filter::Range { lo, hi } => lo.as_str() <= key && key <= hi.as_str(),
        }
    }
}

impl FromStr for Filter {
    type Err = BigtError;

    fn from_str(s: &str) -> BigtResult<Self> {
        let s = s.trim();
        if s == "*" {
            return Ok(Filter::Any);
        }

        if let Some(caps) = RANGE_PATTERN.captures(s) {
            let lo = caps[1].to_string();
            let hi = caps[2].to_string();
            if lo > hi {
                return Err(BigtError::InvalidFilter(format!(
                    "range {s} has its bounds reversed"
                )));
            }
            return Ok(Filter::Range { lo, hi });
        }

        if s.starts_with('[') || s.ends_with(']') {
            return Err(BigtError::InvalidFilter(format!(
                "{s} is neither a range nor a plain key"
            )));
        }
        Ok(Filter::Exact(s.to_string()))
    }
}

/// Row, column and value filters applied together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFilter {
    pub row: Filter,
    pub column: Filter,
    pub value: Filter,
}

impl MapFilter {
    /// Parse the three filter expressions
    pub fn new(row: &str, column: &str, value: &str) -> BigtResult<Self> {
        Ok(Self {
            row: row.parse()?,
            column: column.parse()?,
            value: value.parse()?,
        })
    }

    /// Filter letting every map through
    pub fn all() -> Self {
        Self {
            row: Filter::Any,
            column: Filter::Any,
            value: Filter::Any,
        }
    }

    pub fn matches(&self, map: &Map) -> bool {
        self.row.matches(map.row()) && self.column.matches(map.column()) && self.value.matches(map.value())
    }
}

impl Default for MapFilter {
    fn default() -> Self {
        Self::all()
    }
}
