pub mod config;
mod entry;
mod timed_map;

pub use config::TimedMapConfig;
pub use timed_map::TimedMap;

#[cfg(test)]
pub(crate) use entry::Entry;
