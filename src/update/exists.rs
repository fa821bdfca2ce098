//! Read-only existence checks against a zone version.
//!
//! None of these treat a missing name or RRset as an error. Only a failing
//! database does.

use crate::base::iana::Rtype;
use crate::base::name::Name;
use crate::base::record::Record;
use crate::zonetree::{DbError, Version, ZoneDatabase};

/// Returns whether the name owns any RRset.
pub fn name_exists(
    db: &dyn ZoneDatabase,
    version: Version,
    name: &Name,
) -> Result<bool, DbError> {
    Ok(!db.rrsets_at(version, name)?.is_empty())
}

/// Returns whether an RRset of the given type exists at the name.
///
/// `Rtype::ANY` matches any RRset. For RRSIG without a covered type, any
/// signature RRset matches.
pub fn rrset_exists(
    db: &dyn ZoneDatabase,
    version: Version,
    name: &Name,
    rtype: Rtype,
    covers: Option<Rtype>,
) -> Result<bool, DbError> {
    if rtype == Rtype::ANY {
        return name_exists(db, version, name);
    }
    if rtype == Rtype::RRSIG && covers.is_none() {
        return Ok(db
            .rrsets_at(version, name)?
            .iter()
            .any(|rrset| rrset.rtype() == Rtype::RRSIG));
    }
    Ok(db.find_rrset(version, name, rtype, covers)?.is_some())
}

/// Returns whether there is data at the name that conflicts with a CNAME.
///
/// Only CNAME itself and the DNSSEC types allowed to live next to a CNAME
/// are compatible.
pub fn cname_incompatible_exists(
    db: &dyn ZoneDatabase,
    version: Version,
    name: &Name,
) -> Result<bool, DbError> {
    Ok(db.rrsets_at(version, name)?.iter().any(|rrset| {
        rrset.rtype() != Rtype::CNAME && !rrset.rtype().is_at_cname()
    }))
}

/// Returns the number of records in an RRset, zero if it does not exist.
pub fn count_matching(
    db: &dyn ZoneDatabase,
    version: Version,
    name: &Name,
    rtype: Rtype,
    covers: Option<Rtype>,
) -> Result<usize, DbError> {
    Ok(db
        .find_rrset(version, name, rtype, covers)?
        .map(|rrset| rrset.len())
        .unwrap_or(0))
}

/// Returns whether the exact record data exists.
pub fn rr_exists(
    db: &dyn ZoneDatabase,
    version: Version,
    record: &Record,
) -> Result<bool, DbError> {
    Ok(db
        .find_rrset(version, record.owner(), record.rtype(), record.covers())?
        .map(|rrset| rrset.contains(record.data()))
        .unwrap_or(false))
}

/// Returns all records at a name, optionally limited to one type.
///
/// As with [`rrset_exists`], RRSIG without a covered type selects all
/// signatures.
pub fn records_at(
    db: &dyn ZoneDatabase,
    version: Version,
    name: &Name,
    rtype: Rtype,
    covers: Option<Rtype>,
) -> Result<Vec<Record>, DbError> {
    let class = db.class();
    let rrsets = if rtype == Rtype::ANY {
        db.rrsets_at(version, name)?
    } else if rtype == Rtype::RRSIG && covers.is_none() {
        let mut rrsets = db.rrsets_at(version, name)?;
        rrsets.retain(|rrset| rrset.rtype() == Rtype::RRSIG);
        rrsets
    } else {
        db.find_rrset(version, name, rtype, covers)?
            .into_iter()
            .collect()
    };
    Ok(rrsets
        .iter()
        .flat_map(|rrset| rrset.records(class))
        .collect())
}

//============ Testing =======================================================
