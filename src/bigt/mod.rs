//! Big tables stored as partitioned heap files of maps

mod bigtable;
mod error;
mod filter;
mod map;
mod order;
mod sort;
mod stream;
#[cfg(test)]
mod tests;

pub use bigtable::{BigT, BigTStream, BigTable};
pub use error::{BigtError, BigtResult};
pub use filter::{Filter, MapFilter};
pub use map::{Map, MapField};
pub use order::{OrderType, SortOrder};
pub use sort::Sort;
pub use stream::Stream;
