use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use crate::base::rdata::Soa;
use crate::base::record::Record;
use crate::base::serial::Serial;
use crate::update::diff::DiffTuple;

use super::error::DbError;
use super::in_memory::Version;
use super::types::SharedRrset;

//------------ ZoneDatabase --------------------------------------------------

/// The versioned interface to the records of a single zone.
///
/// Implementations must guarantee that readers of a committed version
/// never observe changes made to a version that is still open, and that
/// at most one version is open at any time.
pub trait ZoneDatabase: Send + Sync {
    /// Returns the apex name of the zone.
    fn origin(&self) -> &Name;

    /// Returns the class of the zone.
    fn class(&self) -> Class;

    /// Returns the latest committed version.
    fn current_version(&self) -> Version;

    /// Opens a new version based on the current one.
    fn new_version(&self) -> Result<Version, DbError>;

    /// Looks up an RRset.
    ///
    /// `covers` selects the signatures for one type if `rtype` is RRSIG.
    fn find_rrset(
        &self,
        version: Version,
        name: &Name,
        rtype: Rtype,
        covers: Option<Rtype>,
    ) -> Result<Option<SharedRrset>, DbError>;

    /// Returns all RRsets at a name.
    fn rrsets_at(
        &self,
        version: Version,
        name: &Name,
    ) -> Result<Vec<SharedRrset>, DbError>;

    /// Applies one change to the open version.
    ///
    /// Returns whether the version actually changed. Adding data that is
    /// present with the same TTL and owner spelling or deleting absent data
    /// leaves the version untouched.
    fn apply(&self, version: Version, tuple: &DiffTuple)
        -> Result<bool, DbError>;

    /// Closes the open version, either publishing or discarding it.
    fn close_version(&self, version: Version, commit: bool)
        -> Result<(), DbError>;

    /// Returns the number of records in a version.
    fn record_count(&self, version: Version) -> Result<usize, DbError>;

    /// Returns all records of a version in canonical order.
    fn records(&self, version: Version) -> Result<Vec<Record>, DbError>;

    /// Returns the SOA record at the apex.
    fn soa(&self, version: Version) -> Result<Record, DbError> {
        let rrset = self
            .find_rrset(version, self.origin(), Rtype::SOA, None)?
            .ok_or(DbError::MissingSoa)?;
        let soa = rrset
            .records(self.class())
            .next()
            .ok_or(DbError::MissingSoa);
        soa
    }

    /// Returns the serial number of a version.
    fn serial(&self, version: Version) -> Result<Serial, DbError> {
        let soa = self.soa(version)?;
        Soa::parse(soa.data())
            .map(|soa| soa.serial())
            .map_err(DbError::MalformedSoa)
    }

    /// Replaces the serial of the open version.
    ///
    /// Returns the delete and add tuples that were applied so the caller
    /// can record them.
    fn set_serial(
        &self,
        version: Version,
        serial: Serial,
    ) -> Result<[DiffTuple; 2], DbError> {
        let old = self.soa(version)?;
        let soa = Soa::parse(old.data())
            .map_err(DbError::MalformedSoa)?
            .with_serial(serial);
        let new = Record::new(
            old.owner().clone(),
            old.class(),
            Rtype::SOA,
            old.ttl(),
            soa.compose(),
        );
        let tuples = [DiffTuple::delete(old), DiffTuple::add(new)];
        for tuple in &tuples {
            self.apply(version, tuple)?;
        }
        Ok(tuples)
    }
}
