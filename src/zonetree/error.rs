//! Zone database errors.

use std::fmt::Display;

use crate::base::name::Name;
use crate::base::rdata::RdataError;

use super::in_memory::Version;

//------------ DbError -------------------------------------------------------

/// An operation on a zone database failed.
///
/// Not finding something is never an error. Lookups return `None` instead.
#[derive(Clone, Debug)]
pub enum DbError {
    /// A new version was requested while another one is still open.
    VersionOpen,

    /// The given version is not the open new version.
    NotOpen(Version),

    /// A record was outside of the zone.
    OutOfZone(Name),

    /// An assertion tuple was handed to the database.
    NotApplicable,

    /// The zone has no SOA record.
    MissingSoa,

    /// The SOA record of the zone could not be parsed.
    MalformedSoa(RdataError),
}

impl Display for DbError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DbError::VersionOpen => {
                write!(f, "Another new version is already open")
            }
            DbError::NotOpen(version) => {
                write!(f, "Version {version} is not open for writing")
            }
            DbError::OutOfZone(name) => {
                write!(f, "Name {name} is outside of the zone")
            }
            DbError::NotApplicable => {
                write!(f, "Assertion tuples cannot be applied")
            }
            DbError::MissingSoa => write!(f, "The zone has no SOA record"),
            DbError::MalformedSoa(err) => {
                write!(f, "The SOA record is malformed: {err}")
            }
        }
    }
}

impl std::error::Error for DbError {}
