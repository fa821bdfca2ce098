//! Conditional deletion and conflict resolution for additions.

use tracing::trace;

use crate::base::iana::Rtype;
use crate::base::name::Name;
use crate::base::rdata::{self, Rrsig};
use crate::base::record::Record;
use crate::zonetree::{DbError, Version, ZoneDatabase};

use super::diff::{Diff, DiffTuple};
use super::exists::records_at;

//------------ Predicate -----------------------------------------------------

/// Decides whether a database record is affected by an update record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Predicate {
    /// Every record matches.
    True,

    /// Everything but SOA, NS, NSEC3PARAM, RRSIG and NSEC matches.
    NotSoaNorNs,

    /// Everything but RRSIG and NSEC matches.
    NotDnssec,

    /// Records with the same data match.
    RdataEqual,

    /// Records the update record takes the place of match.
    Replaces,
}

impl Predicate {
    pub fn evaluate(self, update: &Record, db: &Record) -> bool {
        match self {
            Predicate::True => true,
            Predicate::NotSoaNorNs => !matches!(
                db.rtype(),
                Rtype::SOA
                    | Rtype::NS
                    | Rtype::NSEC3PARAM
                    | Rtype::RRSIG
                    | Rtype::NSEC
            ),
            Predicate::NotDnssec => !db.rtype().is_dnssec_meta(),
            Predicate::RdataEqual => {
                rdata::canonical_eq(db.rtype(), update.data(), db.data())
            }
            Predicate::Replaces => replaces(update, db),
        }
    }
}

/// Returns whether adding `update` must remove `db` first.
///
/// CNAME, DNAME, SOA and NSEC are singletons. An RRSIG replaces one by
/// the same key over the same type. WKS records replace one for the same
/// address and protocol. NSEC3PARAM records differing only in their flags
/// replace each other.
fn replaces(update: &Record, db: &Record) -> bool {
    if db.rtype() != update.rtype() {
        return false;
    }
    match db.rtype() {
        Rtype::CNAME | Rtype::DNAME | Rtype::SOA | Rtype::NSEC => true,
        Rtype::RRSIG => {
            match (Rrsig::parse(db.data()), Rrsig::parse(update.data())) {
                (Ok(db), Ok(update)) => {
                    db.key_tag() == update.key_tag()
                        && db.type_covered() == update.type_covered()
                        && db.algorithm() == update.algorithm()
                }
                _ => false,
            }
        }
        Rtype::WKS => match (db.data().get(..5), update.data().get(..5)) {
            (Some(db), Some(update)) => db == update,
            _ => false,
        },
        Rtype::NSEC3PARAM => rdata::Nsec3param::eq_ignoring_flags(
            db.data(),
            update.data(),
        ),
        _ => false,
    }
}

//------------ Conditional deletion ------------------------------------------

/// Returns the deletions of all records at `name` matching the predicate.
///
/// A `rtype` of ANY considers every RRset at the name. Nothing is applied.
pub fn matching_deletions(
    db: &dyn ZoneDatabase,
    version: Version,
    predicate: Predicate,
    update: &Record,
    name: &Name,
    rtype: Rtype,
    covers: Option<Rtype>,
) -> Result<Diff, DbError> {
    Ok(records_at(db, version, name, rtype, covers)?
        .into_iter()
        .filter(|record| predicate.evaluate(update, record))
        .map(DiffTuple::delete)
        .collect())
}

/// Deletes all records at `name` matching the predicate.
///
/// The deletions are applied to the open version and recorded in `diff`.
#[allow(clippy::too_many_arguments)]
pub fn delete_if(
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &mut Diff,
    predicate: Predicate,
    update: &Record,
    name: &Name,
    rtype: Rtype,
    covers: Option<Rtype>,
) -> Result<(), DbError> {
    let deletions = matching_deletions(
        db, version, predicate, update, name, rtype, covers,
    )?;
    trace!(
        "Deleting {} records at {name}/{rtype} ({predicate:?})",
        deletions.len()
    );
    diff.apply_all(db, version, deletions)
}

//------------ Addition ------------------------------------------------------

/// What adding a record to a zone version entails.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Addition {
    /// The record is already present with the same TTL and spelling.
    Ignore,

    /// The record is to be added after applying the given changes.
    ///
    /// `deletes` must be applied before `adds`, and both before the
    /// record itself.
    Apply { deletes: Diff, adds: Diff },
}

impl Addition {
    /// Applies the addition of `record` to the open version.
    pub fn apply(
        self,
        db: &dyn ZoneDatabase,
        version: Version,
        diff: &mut Diff,
        record: Record,
    ) -> Result<(), DbError> {
        match self {
            Addition::Ignore => Ok(()),
            Addition::Apply { deletes, adds } => {
                diff.apply_all(db, version, deletes)?;
                diff.apply_all(db, version, adds)?;
                diff.apply(db, version, DiffTuple::add(record))
            }
        }
    }
}

/// Works out what adding `update` to the open version takes.
///
/// Existing records the new one replaces are deleted. As an RRset has a
/// single TTL and owner spelling, records that differ from the new one in
/// either are deleted and added again with the new TTL and spelling.
pub fn prepare_addition(
    db: &dyn ZoneDatabase,
    version: Version,
    update: &Record,
) -> Result<Addition, DbError> {
    let mut deletes = Diff::new();
    let mut adds = Diff::new();
    let existing = db.find_rrset(
        version,
        update.owner(),
        update.rtype(),
        update.covers(),
    )?;
    let Some(rrset) = existing else {
        return Ok(Addition::Apply { deletes, adds });
    };
    let case_equal = rrset.owner().eq_case(update.owner());
    let ttl_equal = rrset.ttl() == update.ttl();
    for record in rrset.records(update.class()) {
        let equal = record.data() == update.data();
        if equal && case_equal && ttl_equal {
            return Ok(Addition::Ignore);
        }
        if replaces(update, &record) {
            deletes.push(DiffTuple::delete(record));
            continue;
        }
        if !ttl_equal || !case_equal {
            if !equal {
                adds.push(DiffTuple::add(
                    record
                        .with_ttl(update.ttl())
                        .with_owner(update.owner().clone()),
                ));
            }
            deletes.push(DiffTuple::delete(record));
        }
    }
    Ok(Addition::Apply { deletes, adds })
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Class;
    use crate::base::rdata::Nsec3param;
    use crate::zonetree::InMemoryZone;
    use bytes::Bytes;
    use core::str::FromStr;
    use rstest::rstest;
    use std::net::Ipv4Addr;

    fn n(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn a(owner: &str, ttl: u32, last: u8) -> Record {
        Record::new(
            n(owner),
            Class::IN,
            Rtype::A,
            ttl,
            rdata::a(Ipv4Addr::new(10, 0, 0, last)),
        )
    }

    fn nsec3param(flags: u8) -> Record {
        Record::new(
            n("example.com"),
            Class::IN,
            Rtype::NSEC3PARAM,
            0,
            Nsec3param::new(1, flags, 5, Bytes::from_static(b"\xab")).compose(),
        )
    }

    fn zone() -> InMemoryZone {
        InMemoryZone::from_records(
            n("example.com"),
            Class::IN,
            [a("www.example.com", 300, 1), a("www.example.com", 300, 2)],
        )
        .unwrap()
    }

    #[rstest]
    #[case(Predicate::True, Rtype::SOA, true)]
    #[case(Predicate::NotSoaNorNs, Rtype::SOA, false)]
    #[case(Predicate::NotSoaNorNs, Rtype::NS, false)]
    #[case(Predicate::NotSoaNorNs, Rtype::NSEC3PARAM, false)]
    #[case(Predicate::NotSoaNorNs, Rtype::MX, true)]
    #[case(Predicate::NotDnssec, Rtype::RRSIG, false)]
    #[case(Predicate::NotDnssec, Rtype::NS, true)]
    fn type_predicates(
        #[case] predicate: Predicate,
        #[case] rtype: Rtype,
        #[case] expected: bool,
    ) {
        let update = a("www.example.com", 0, 1);
        let db = Record::new(
            n("www.example.com"),
            Class::IN,
            rtype,
            0,
            Bytes::new(),
        );
        assert_eq!(predicate.evaluate(&update, &db), expected);
    }

    #[test]
    fn nsec3param_replaced_regardless_of_flags() {
        assert!(Predicate::Replaces.evaluate(&nsec3param(1), &nsec3param(0)));
        assert!(!Predicate::Replaces
            .evaluate(&a("www.example.com", 0, 1), &nsec3param(0)));
    }

    #[test]
    fn duplicate_is_ignored() {
        let zone = zone();
        let v = zone.new_version().unwrap();
        assert_eq!(
            prepare_addition(&zone, v, &a("www.example.com", 300, 1))
                .unwrap(),
            Addition::Ignore
        );
    }

    #[test]
    fn ttl_is_normalized() {
        let zone = zone();
        let v = zone.new_version().unwrap();
        let new = a("www.example.com", 60, 3);
        let mut diff = Diff::new();
        prepare_addition(&zone, v, &new)
            .unwrap()
            .apply(&zone, v, &mut diff, new)
            .unwrap();
        let rrset = zone
            .find_rrset(v, &n("www.example.com"), Rtype::A, None)
            .unwrap()
            .unwrap();
        assert_eq!(rrset.ttl(), 60);
        assert_eq!(rrset.len(), 3);
        zone.close_version(v, false).unwrap();
        let current = zone.current_version();
        let rrset = zone
            .find_rrset(current, &n("www.example.com"), Rtype::A, None)
            .unwrap()
            .unwrap();
        assert_eq!(rrset.ttl(), 300);
        assert_eq!(rrset.len(), 2);
    }

    #[test]
    fn delete_matching() {
        let zone = zone();
        let v = zone.new_version().unwrap();
        let mut diff = Diff::new();
        delete_if(
            &zone,
            v,
            &mut diff,
            Predicate::RdataEqual,
            &a("www.example.com", 0, 2),
            &n("www.example.com"),
            Rtype::A,
            None,
        )
        .unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.tuples()[0].ttl(), 300);
        let rrset = zone
            .find_rrset(v, &n("www.example.com"), Rtype::A, None)
            .unwrap()
            .unwrap();
        assert_eq!(rrset.len(), 1);
    }
}
