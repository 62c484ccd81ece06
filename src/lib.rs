//! A concurrent key/value cache whose entries expire on their own, either
//! after a fixed time-to-live or, for entries kept fresh by a background
//! refresh function, once nobody has read them for a while.

pub mod cache;
pub mod lmap;
pub mod utils;

pub use cache::{TimedMap, TimedMapConfig};
pub use lmap::LMap;
pub use utils::TimedMapError;

#[cfg(test)]
#[path = "unit_test.rs"]
mod unit_test;
