//! Versioned zone storage.
//!
//! The update processor never touches zone data directly. It works through
//! the [`ZoneDatabase`] trait which exposes a zone as a sequence of
//! versions: a committed current version that readers see and, while an
//! update is being processed, a single open new version that only the
//! update sees. Changes are applied to the new version one [`DiffTuple`]
//! at a time and the version is either committed or rolled back as a
//! whole.
//!
//! [`InMemoryZone`] is the implementation shipped with the crate.
//!
//! [`DiffTuple`]: crate::update::DiffTuple

mod error;
mod traits;
mod types;

pub mod in_memory;

pub use self::error::DbError;
pub use self::in_memory::{InMemoryZone, Version};
pub use self::traits::ZoneDatabase;
pub use self::types::{Rrset, RrsetKey, SharedRrset};
