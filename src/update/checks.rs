//! Zone integrity checks.
//!
//! Apart from the host name check, which looks at single update records
//! before anything is changed, all checks look at the open version, i.e.,
//! the zone as it would be if the update was committed. A failing check
//! refuses the whole update.

use core::fmt;
use core::str::FromStr;
use std::net::IpAddr;

use tracing::{error, info, warn};

use crate::base::iana::Rtype;
use crate::base::name::Name;
use crate::base::rdata::{self, Dnskey, Ds, Nsec3param};
use crate::base::record::Record;
use crate::config::{CheckNames, ZoneConfig};
use crate::zonetree::{DbError, Version, ZoneDatabase};

use super::chain::{nsec3param_from_private, PrivateFlags};
use super::diff::{Diff, DiffOp};
use super::error::UpdateError;
use super::exists::{records_at, rrset_exists};
use super::request::TransactionContext;

//------------ DNSSEC parameters ---------------------------------------------

/// Refuses updates that leave the zone's signing parameters inconsistent.
///
/// A zone may not be set up for NSEC3 while it has keys using algorithms
/// that predate NSEC3, and its NSEC3 chains may not use more iterations
/// than configured.
pub fn check_dnssec(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &Diff,
    config: &ZoneConfig,
) -> Result<(), UpdateError> {
    if nsec_only_keys(db, version)? == Some(true)
        && nsec3_active(db, version, diff, config.private_type)?
    {
        error!("{ctx}: NSEC only DNSKEYs and NSEC3 chains not allowed");
        return Err(UpdateError::refused(
            "NSEC only DNSKEYs and NSEC3 chains not allowed",
        ));
    }
    let iterations = max_iterations(db, version, config.private_type)?;
    if iterations > config.max_nsec3_iterations() {
        error!("{ctx}: too many NSEC3 iterations ({iterations})");
        return Err(UpdateError::refused(format!(
            "too many NSEC3 iterations ({iterations})"
        )));
    }
    Ok(())
}

/// Returns whether any apex key uses an NSEC-only algorithm.
///
/// Returns `None` if there are no keys at all.
pub fn nsec_only_keys(
    db: &dyn ZoneDatabase,
    version: Version,
) -> Result<Option<bool>, DbError> {
    let Some(keys) =
        db.find_rrset(version, db.origin(), Rtype::DNSKEY, None)?
    else {
        return Ok(None);
    };
    Ok(Some(keys.data().iter().any(|key| {
        key.get(3)
            .map(|&alg| Dnskey::is_nsec_only_algorithm(alg))
            .unwrap_or(false)
    })))
}

/// Returns whether the zone has or is about to get an NSEC3 chain.
fn nsec3_active(
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &Diff,
    private_type: Rtype,
) -> Result<bool, DbError> {
    let origin = db.origin();
    if diff.iter().any(|tuple| {
        tuple.op() == DiffOp::Add
            && tuple.rtype() == Rtype::NSEC3PARAM
            && tuple.owner() == origin
    }) {
        return Ok(true);
    }
    Ok(!active_nsec3params(db, version, private_type)?.is_empty())
}

/// Returns all NSEC3 parameters in use or about to be.
///
/// These are the apex NSEC3PARAM records and the parameters of pending
/// chain changes, leaving out chains being removed.
fn active_nsec3params(
    db: &dyn ZoneDatabase,
    version: Version,
    private_type: Rtype,
) -> Result<Vec<Nsec3param>, DbError> {
    let origin = db.origin();
    let mut res = Vec::new();
    if let Some(rrset) =
        db.find_rrset(version, origin, Rtype::NSEC3PARAM, None)?
    {
        res.extend(
            rrset
                .data()
                .iter()
                .filter_map(|data| Nsec3param::parse(data).ok()),
        );
    }
    if let Some(rrset) = db.find_rrset(version, origin, private_type, None)? {
        res.extend(
            rrset
                .data()
                .iter()
                .filter_map(|data| nsec3param_from_private(data))
                .filter_map(|data| Nsec3param::parse(data).ok()),
        );
    }
    res.retain(|param| param.flags() & PrivateFlags::REMOVE == 0);
    Ok(res)
}

/// Returns the largest iteration count of the zone's NSEC3 parameters.
pub fn max_iterations(
    db: &dyn ZoneDatabase,
    version: Version,
    private_type: Rtype,
) -> Result<u16, DbError> {
    Ok(active_nsec3params(db, version, private_type)?
        .iter()
        .map(Nsec3param::iterations)
        .max()
        .unwrap_or(0))
}

//------------ Name servers --------------------------------------------------

/// Checks the apex NS RRset.
///
/// The apex needs at least one NS record and each name server inside the
/// zone needs address records and must not be an alias. Returns the number
/// of problems found. Each is logged.
pub fn ns_check(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
) -> Result<usize, DbError> {
    let origin = db.origin();
    let Some(ns) = db.find_rrset(version, origin, Rtype::NS, None)? else {
        warn!("{ctx}: zone apex has no NS records");
        return Ok(1);
    };
    let mut errors = 0;
    for data in ns.data() {
        let Some(target) = rdata::target_name(Rtype::NS, data) else {
            errors += 1;
            continue;
        };
        if !target.is_subdomain_of(origin) {
            continue;
        }
        if rrset_exists(db, version, &target, Rtype::CNAME, None)? {
            warn!("{ctx}: NS '{target}' is a CNAME (illegal)");
            errors += 1;
        } else if !has_address(db, version, &target)? {
            warn!("{ctx}: NS '{target}' has no address records (A or AAAA)");
            errors += 1;
        }
    }
    Ok(errors)
}

fn has_address(
    db: &dyn ZoneDatabase,
    version: Version,
    name: &Name,
) -> Result<bool, DbError> {
    Ok(rrset_exists(db, version, name, Rtype::A, None)?
        || rrset_exists(db, version, name, Rtype::AAAA, None)?)
}

//------------ CDS and CDNSKEY -----------------------------------------------

/// The kind of child DS signalling record that failed the check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BadChildRrset {
    Cds,
    Cdnskey,
}

impl fmt::Display for BadChildRrset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            BadChildRrset::Cds => "CDS",
            BadChildRrset::Cdnskey => "CDNSKEY",
        })
    }
}

/// Checks that the CDS and CDNSKEY records refer to the apex keys.
///
/// Each record must match a DNSKEY record or be the sole record of its
/// RRset in the form requesting the removal of the DS RRset.
pub fn cds_check(
    db: &dyn ZoneDatabase,
    version: Version,
) -> Result<Result<(), BadChildRrset>, DbError> {
    let origin = db.origin();
    let keys = db
        .find_rrset(version, origin, Rtype::DNSKEY, None)?
        .map(|rrset| rrset.data().to_vec())
        .unwrap_or_default();

    if let Some(cds) = db.find_rrset(version, origin, Rtype::CDS, None)? {
        for data in cds.data() {
            let Ok(ds) = Ds::parse(data) else {
                return Ok(Err(BadChildRrset::Cds));
            };
            let good = if ds.is_delete() {
                cds.len() == 1
            } else {
                keys.iter().any(|key| cds_matches(origin, &ds, key))
            };
            if !good {
                return Ok(Err(BadChildRrset::Cds));
            }
        }
    }

    if let Some(cdnskey) =
        db.find_rrset(version, origin, Rtype::CDNSKEY, None)?
    {
        for data in cdnskey.data() {
            let good = match Dnskey::parse(data) {
                Ok(key) if key.is_delete() => cdnskey.len() == 1,
                Ok(_) => keys.iter().any(|key| key == data),
                Err(_) => false,
            };
            if !good {
                return Ok(Err(BadChildRrset::Cdnskey));
            }
        }
    }
    Ok(Ok(()))
}

/// Returns whether a CDS record was made for a key.
///
/// Digest types we cannot calculate match on key tag and algorithm alone.
fn cds_matches(origin: &Name, ds: &Ds, key: &[u8]) -> bool {
    if Dnskey::key_tag(key) != ds.key_tag()
        || key.get(3) != Some(&ds.algorithm())
    {
        return false;
    }
    match Ds::for_key(origin, key, ds.digest_type()) {
        Some(expected) => expected.digest() == ds.digest(),
        None => true,
    }
}

//------------ Host names ----------------------------------------------------

/// Applies the host name rules to an added record.
pub fn check_names(
    ctx: &TransactionContext,
    record: &Record,
    policy: CheckNames,
) -> Result<(), UpdateError> {
    if policy == CheckNames::Ignore {
        return Ok(());
    }
    let Some(bad) = bad_hostname(record) else {
        return Ok(());
    };
    let owner = record.owner();
    let rtype = record.rtype();
    if policy == CheckNames::Fail {
        info!("{ctx}: {owner}/{rtype}: '{bad}' is not a valid hostname");
        Err(UpdateError::refused("rejected by zone 'check-names' policy"))
    } else {
        warn!(
            "{ctx}: {owner}/{rtype}: warning: '{bad}' is not a valid hostname"
        );
        Ok(())
    }
}

/// Returns the name in a record that breaks the host name rules.
///
/// The owners of address records and the targets of NS, MX and SRV
/// records must be host names, as must the targets of PTR records in the
/// reverse mapping trees.
pub fn bad_hostname(record: &Record) -> Option<Name> {
    let owner = record.owner();
    match record.rtype() {
        Rtype::A | Rtype::AAAA => {
            (!owner.is_hostname(true)).then(|| owner.clone())
        }
        Rtype::NS | Rtype::MX | Rtype::SRV => bad_target(record),
        Rtype::PTR if is_reverse(owner) => bad_target(record),
        _ => None,
    }
}

fn bad_target(record: &Record) -> Option<Name> {
    let target = rdata::target_name(record.rtype(), record.data())?;
    (!target.is_hostname(false)).then_some(target)
}

fn is_reverse(name: &Name) -> bool {
    ["in-addr.arpa", "ip6.arpa", "ip6.int"].iter().any(|base| {
        Name::from_str(base)
            .map(|base| name.is_subdomain_of(&base))
            .unwrap_or(false)
    })
}

//------------ MX ------------------------------------------------------------

/// Checks the targets of added MX records.
pub fn check_mx(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &Diff,
    config: &ZoneConfig,
) -> Result<(), UpdateError> {
    let mut ok = true;
    for tuple in diff {
        if tuple.op() != DiffOp::Add || tuple.rtype() != Rtype::MX {
            continue;
        }
        let owner = tuple.owner();
        let Some(target) =
            rdata::target_name(Rtype::MX, tuple.record().data())
        else {
            continue;
        };

        if config.check_mx && is_address(&target) {
            if config.check_mx_fail {
                error!("{ctx}: {owner}/MX: '{target}': MX is an address");
                ok = false;
            } else {
                warn!(
                    "{ctx}: {owner}/MX: warning: '{target}': MX is an address"
                );
            }
        }

        if !config.check_integrity || !target.is_subdomain_of(db.origin()) {
            continue;
        }
        if let Some(dname) = dname_above(db, version, &target)? {
            error!(
                "{ctx}: {owner}/MX '{target}' is below a DNAME '{dname}' \
                 (illegal)"
            );
            ok = false;
        } else if rrset_exists(db, version, &target, Rtype::CNAME, None)? {
            error!("{ctx}: {owner}/MX '{target}' is a CNAME (illegal)");
            ok = false;
        } else if !has_address(db, version, &target)? {
            error!(
                "{ctx}: {owner}/MX '{target}' has no address records \
                 (A or AAAA)"
            );
            ok = false;
        }
    }
    if ok {
        Ok(())
    } else {
        Err(UpdateError::refused("MX check failed"))
    }
}

/// Returns whether a name is really an address written as a name.
fn is_address(name: &Name) -> bool {
    let s = name.to_string();
    let s = s.strip_suffix('.').unwrap_or(&s);
    IpAddr::from_str(s).is_ok()
}

/// Returns the closest DNAME owner strictly above `name` within the zone.
fn dname_above(
    db: &dyn ZoneDatabase,
    version: Version,
    name: &Name,
) -> Result<Option<Name>, DbError> {
    let origin = db.origin();
    let mut current = name.parent();
    while let Some(name) = current {
        if !name.is_subdomain_of(origin) {
            break;
        }
        if !records_at(db, version, &name, Rtype::DNAME, None)?.is_empty() {
            return Ok(Some(name));
        }
        current = name.parent();
    }
    Ok(None)
}

//============ Testing =======================================================
