//! Evaluation of the prerequisite section.
//!
//! RFC 2136 knows five kinds of prerequisites. Four of them (RRset exists
//! regardless of value, RRset does not exist, name is in use, name is not
//! in use) can be decided one record at a time. The fifth, RRset exists
//! with a given value, asserts that the complete RRset in the zone equals
//! the union of all prerequisite records for its name and type. Those
//! records are therefore collected first and then compared against the
//! zone RRset by RRset, with both sides in canonical order.

use std::cmp::Ordering;

use tracing::debug;

use crate::base::iana::{Class, Rtype};
use crate::base::rdata;
use crate::base::record::Record;
use crate::zonetree::{Version, ZoneDatabase};

use super::diff::{canonical_order, Diff, DiffTuple};
use super::error::UpdateError;
use super::exists::{name_exists, records_at, rrset_exists};
use super::request::TransactionContext;

/// Checks all prerequisites against a zone version.
///
/// Returns the error for the first prerequisite that is not satisfied.
/// All value-independent prerequisites are checked in request order
/// before any of the value-dependent ones.
pub fn check_prerequisites(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    prerequisites: &[Record],
) -> Result<(), UpdateError> {
    let mut temp = Diff::new();

    for record in prerequisites {
        if record.ttl() != 0 {
            debug!("{ctx}: prerequisite TTL is not zero");
            return Err(UpdateError::FormErr("prerequisite TTL is not zero"));
        }
        if !record.owner().is_subdomain_of(&ctx.zone) {
            debug!("{ctx}: prerequisite name is out of zone");
            return Err(UpdateError::NotZone(record.owner().clone()));
        }
        let class = record.class();
        if class == Class::ANY {
            if !record.data().is_empty() {
                return Err(UpdateError::FormErr(
                    "class ANY prerequisite RDATA is not empty",
                ));
            }
            check_in_use(ctx, db, version, record)?;
        } else if class == Class::NONE {
            if !record.data().is_empty() {
                return Err(UpdateError::FormErr(
                    "class NONE prerequisite RDATA is not empty",
                ));
            }
            check_not_in_use(ctx, db, version, record)?;
        } else if class == ctx.class {
            temp.push(DiffTuple::exists(record.clone()));
        } else {
            return Err(UpdateError::FormErr("malformed prerequisite"));
        }
    }

    check_values(ctx, db, version, temp)?;
    debug!("{ctx}: prerequisites are OK");
    Ok(())
}

/// Checks a class ANY prerequisite.
fn check_in_use(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    record: &Record,
) -> Result<(), UpdateError> {
    let name = record.owner();
    if record.rtype() == Rtype::ANY {
        if !name_exists(db, version, name)? {
            debug!("{ctx}: '{name}' not in use");
            return Err(UpdateError::NxDomain(name.clone()));
        }
    } else if !rrset_exists(db, version, name, record.rtype(), None)? {
        debug!("{ctx}: '{name}/{}' has no RRset", record.rtype());
        return Err(UpdateError::NxRrset(name.clone(), record.rtype()));
    }
    Ok(())
}

/// Checks a class NONE prerequisite.
fn check_not_in_use(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    record: &Record,
) -> Result<(), UpdateError> {
    let name = record.owner();
    if record.rtype() == Rtype::ANY {
        if name_exists(db, version, name)? {
            debug!("{ctx}: '{name}' in use");
            return Err(UpdateError::YxDomain(name.clone()));
        }
    } else if rrset_exists(db, version, name, record.rtype(), None)? {
        debug!("{ctx}: '{name}/{}' exists", record.rtype());
        return Err(UpdateError::YxRrset(name.clone(), record.rtype()));
    }
    Ok(())
}

/// Compares the collected value-dependent prerequisites with the zone.
fn check_values(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    mut temp: Diff,
) -> Result<(), UpdateError> {
    temp.sort();
    let asserted: Vec<Record> =
        temp.into_iter().map(DiffTuple::into_record).collect();

    let mut rest = asserted.as_slice();
    while let Some(first) = rest.first() {
        let len = rest
            .iter()
            .position(|record| !same_rrset(first, record))
            .unwrap_or(rest.len());
        let (group, tail) = rest.split_at(len);
        rest = tail;

        let name = first.owner();
        let rtype = first.rtype();
        let fail = || {
            debug!("{ctx}: '{name}/{rtype}' unsatisfied prerequisites");
            UpdateError::NxRrset(name.clone(), rtype)
        };

        if rtype == Rtype::ANY {
            return Err(fail());
        }
        let mut existing = records_at(db, version, name, rtype, first.covers())?;
        if existing.is_empty() {
            return Err(fail());
        }
        existing.sort_by(canonical_order);

        let equal = existing.len() == group.len()
            && existing.iter().zip(group).all(|(left, right)| {
                rdata::canonical_cmp(rtype, left.data(), right.data())
                    == Ordering::Equal
            });
        if !equal {
            return Err(fail());
        }
    }
    Ok(())
}

fn same_rrset(left: &Record, right: &Record) -> bool {
    left.owner() == right.owner()
        && left.rtype() == right.rtype()
        && left.covers() == right.covers()
}

//============ Testing =======================================================
