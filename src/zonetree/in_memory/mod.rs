//! An in-memory backing store for zones.
mod nodes;
mod versioned;

pub use self::nodes::InMemoryZone;
pub use self::versioned::Version;
