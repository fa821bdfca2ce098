//! Maintenance of signing related state during an update.
//!
//! Building or removing an NSEC3 chain takes a pass over the whole zone, so
//! an update never does it directly. Instead, changes to the apex
//! NSEC3PARAM RRset are turned into private type records at the apex that
//! tell the signer what to do later. The same private type records carry
//! the signer's own bookkeeping, so clients may not change them.
//!
//! A private record describing an NSEC3 chain has a zero first octet
//! followed by the NSEC3PARAM data. Its flag octet carries the
//! [`PrivateFlags`] in addition to the NSEC3PARAM flags. Private records of
//! five octets with a non-zero first octet describe the signing state of a
//! key.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::base::iana::Rtype;
use crate::base::rdata::Nsec3param;
use crate::base::record::Record;
use crate::zonetree::{DbError, Version, ZoneDatabase};

use super::checks::nsec_only_keys;
use super::conflict::matching_deletions;
use super::conflict::Predicate;
use super::diff::{Diff, DiffOp, DiffTuple};
use super::exists::{rr_exists, rrset_exists};
use super::request::TransactionContext;

//------------ PrivateFlags --------------------------------------------------

/// Flags of a private record describing an NSEC3 chain.
pub struct PrivateFlags;

impl PrivateFlags {
    /// The chain is to be created.
    pub const CREATE: u8 = 0x80;

    /// The chain is to be removed.
    pub const REMOVE: u8 = 0x40;

    /// The chain is to be created once the zone can be signed with NSEC3.
    pub const INITIAL: u8 = 0x20;

    /// No NSEC chain is to be built when the chain is removed.
    pub const NONSEC: u8 = 0x10;
}

/// Returns the NSEC3PARAM data of a private record describing a chain.
pub fn nsec3param_from_private(data: &[u8]) -> Option<&[u8]> {
    match data.split_first() {
        Some((0, rest)) if !rest.is_empty() => Some(rest),
        _ => None,
    }
}

/// Creates the private record data for NSEC3PARAM data and extra flags.
fn private_from_nsec3param(nsec3param: &[u8], flags: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(nsec3param.len() + 1);
    buf.put_u8(0);
    buf.put_slice(nsec3param);
    if let Some(octet) = buf.get_mut(2) {
        *octet |= flags;
    }
    buf.freeze()
}

/// Returns whether private data is a completed key signing marker.
///
/// Clients may delete these once they have noticed signing is done.
fn is_signing_complete(data: &[u8]) -> bool {
    data.len() == 5 && data[0] != 0 && data[4] != 0
}

//------------ Orphaned DS records -------------------------------------------

/// Removes DS records that have lost their delegation.
///
/// A DS RRset only makes sense at a delegation. If the update removed NS
/// records from a name or added DS records to a name without NS records,
/// all DS records at that name are deleted. DS records at the apex are
/// always removed.
pub fn remove_orphaned_ds(
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &mut Diff,
) -> Result<(), DbError> {
    let origin = db.origin();
    let mut temp = Diff::new();
    for tuple in diff.iter() {
        let relevant = match tuple.op() {
            DiffOp::Delete => tuple.rtype() == Rtype::NS,
            DiffOp::Add => tuple.rtype() == Rtype::DS,
            DiffOp::Exists => false,
        };
        if !relevant {
            continue;
        }
        let name = tuple.owner();
        if name != origin && rrset_exists(db, version, name, Rtype::NS, None)?
        {
            continue;
        }
        let orphans = matching_deletions(
            db,
            version,
            Predicate::True,
            tuple.record(),
            name,
            Rtype::DS,
            None,
        )?;
        if !orphans.is_empty() {
            debug!("Removing {} orphaned DS records at {name}", orphans.len());
        }
        temp.apply_all(db, version, orphans)?;
    }
    for tuple in temp {
        diff.append_minimal(tuple);
    }
    Ok(())
}

//------------ Private records -----------------------------------------------

/// Undoes all client changes to private type records at the apex.
///
/// The changes are removed from the diff and reverted in the open version.
/// Deleting a completed key signing marker is kept.
pub fn rollback_private(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &mut Diff,
    private_type: Rtype,
) -> Result<(), DbError> {
    let origin = db.origin();
    let private = diff.extract(|tuple| {
        tuple.rtype() == private_type
            && tuple.owner() == origin
            && !(tuple.op() == DiffOp::Delete
                && is_signing_complete(tuple.record().data()))
    });
    if private.is_empty() {
        return Ok(());
    }
    debug!("{ctx}: reverting {} private type changes", private.len());
    for tuple in private.inverse() {
        db.apply(version, &tuple)?;
    }
    Ok(())
}

//------------ NSEC3PARAM ----------------------------------------------------

/// Turns changes to the apex NSEC3PARAM RRset into pending chain markers.
///
/// An added NSEC3PARAM record is taken out of the zone again and replaced
/// by a private record requesting creation of the chain. A deleted one is
/// put back and a private record requesting removal is added. A pending
/// creation of the same chain with the opposite opt-out setting is
/// withdrawn.
pub fn add_nsec3param_records(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &mut Diff,
    private_type: Rtype,
) -> Result<(), DbError> {
    let origin = db.origin().clone();
    let mut temp = diff.extract(|tuple| {
        tuple.rtype() == Rtype::NSEC3PARAM && tuple.owner() == &origin
    });
    if temp.is_empty() {
        return Ok(());
    }

    // Additions carry the final TTL of the RRset. Without any, deletions
    // carry the current one.
    let ttl = temp
        .iter()
        .find(|tuple| tuple.op() == DiffOp::Add)
        .or_else(|| temp.iter().next())
        .map(|tuple| tuple.ttl())
        .unwrap_or(0);

    // Pairs of an addition and a deletion of the same data only change the
    // TTL. They stay as they are.
    let mut tuples: Vec<DiffTuple> = temp.into_iter().collect();
    let mut i = 0;
    while i < tuples.len() {
        let partner = tuples.iter().skip(i + 1).position(|other| {
            other.op() != tuples[i].op()
                && other.record().data() == tuples[i].record().data()
        });
        match partner {
            Some(offset) => {
                let other = tuples.remove(i + 1 + offset);
                diff.push(tuples.remove(i));
                diff.push(other);
            }
            None => i += 1,
        }
    }

    // Records with flags we do not know are not accepted.
    let (unknown, known): (Vec<_>, Vec<_>) =
        tuples.into_iter().partition(|tuple| {
            tuple
                .record()
                .data()
                .get(1)
                .map(|flags| flags & !Nsec3param::OPTOUT != 0)
                .unwrap_or(true)
        });
    for tuple in unknown {
        debug!("{ctx}: reverting NSEC3PARAM with unknown flags");
        let revert = DiffTuple::new(
            tuple.op().inverse(),
            tuple.record().with_ttl(ttl),
        );
        diff.apply(db, version, revert)?;
        diff.append_minimal(tuple);
    }

    let (adds, mut deletes): (Vec<_>, Vec<_>) = known
        .into_iter()
        .partition(|tuple| tuple.op() == DiffOp::Add);

    let initial = nsec_only_keys(db, version)?.unwrap_or(true);
    for tuple in adds {
        let data = tuple.record().data().clone();

        // A deletion of the same chain with other flags is a flag change.
        let (same_chain, rest): (Vec<_>, Vec<_>) =
            deletes.into_iter().partition(|other| {
                Nsec3param::eq_ignoring_flags(other.record().data(), &data)
            });
        deletes = rest;
        diff.extend(same_chain);

        let mut flags = PrivateFlags::CREATE;
        if initial {
            flags |= PrivateFlags::INITIAL;
        }

        let marker_data = private_from_nsec3param(&data, flags);

        // Withdraw a pending creation with the opposite opt-out setting.
        let mut opposite_data = BytesMut::from(marker_data.as_ref());
        if let Some(octet) = opposite_data.get_mut(2) {
            *octet ^= Nsec3param::OPTOUT;
        }
        let opposite =
            private_record(&tuple, opposite_data.freeze(), private_type);
        if rr_exists(db, version, &opposite)? {
            trace!("{ctx}: withdrawing {opposite}");
            diff.apply(db, version, DiffTuple::delete(opposite))?;
        }

        let marker = private_record(&tuple, marker_data, private_type);
        if !rr_exists(db, version, &marker)? {
            debug!("{ctx}: requesting NSEC3 chain creation");
            diff.apply(db, version, DiffTuple::add(marker))?;
        }

        diff.apply(
            db,
            version,
            DiffTuple::delete(tuple.record().with_ttl(ttl)),
        )?;
        diff.append_minimal(tuple);
    }

    for tuple in deletes {
        let data = tuple.record().data();
        let mut marker = private_record(
            &tuple,
            private_from_nsec3param(
                data,
                PrivateFlags::REMOVE | PrivateFlags::NONSEC,
            ),
            private_type,
        );
        if !rr_exists(db, version, &marker)? {
            marker = private_record(
                &tuple,
                private_from_nsec3param(data, PrivateFlags::REMOVE),
                private_type,
            );
            if !rr_exists(db, version, &marker)? {
                debug!("{ctx}: requesting NSEC3 chain removal");
                diff.apply(db, version, DiffTuple::add(marker))?;
            }
        }

        diff.apply(db, version, DiffTuple::add(tuple.record().with_ttl(ttl)))?;
        diff.append_minimal(tuple);
    }
    Ok(())
}

/// Creates a private record at the owner of a tuple.
fn private_record(
    tuple: &DiffTuple,
    data: Bytes,
    private_type: Rtype,
) -> Record {
    Record::new(
        tuple.owner().clone(),
        tuple.record().class(),
        private_type,
        0,
        data,
    )
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Class;
    use crate::base::name::Name;
    use crate::base::rdata::{self, Dnskey};
    use crate::update::request::UpdateRequest;
    use core::str::FromStr;
    use std::net::Ipv4Addr;

    const PRIVATE: Rtype = Rtype::from_int(65534);

    fn n(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn ctx() -> TransactionContext {
        let request = UpdateRequest::new(
            n("example"),
            Class::IN,
            "192.0.2.1:53".parse().unwrap(),
        );
        TransactionContext::new(n("example"), Class::IN, &request)
    }

    fn rr(owner: &str, rtype: Rtype, ttl: u32, data: Bytes) -> Record {
        Record::new(n(owner), Class::IN, rtype, ttl, data)
    }

    fn param(flags: u8) -> Bytes {
        Nsec3param::new(1, flags, 0, Bytes::from_static(b"\xab")).compose()
    }

    fn zone() -> crate::zonetree::InMemoryZone {
        crate::zonetree::InMemoryZone::from_records(
            n("example"),
            Class::IN,
            [
                rr(
                    "example",
                    Rtype::DNSKEY,
                    300,
                    Dnskey::new(257, 3, 13, Bytes::from_static(b"key"))
                        .compose(),
                ),
                rr("example", Rtype::NS, 300, rdata::name(&n("ns.example"))),
                rr("sub.example", Rtype::NS, 300, rdata::name(&n("ns.sub"))),
                rr("sub.example", Rtype::DS, 300, Bytes::from_static(b"ds1")),
                rr("host.example", Rtype::A, 300, rdata::a(Ipv4Addr::LOCALHOST)),
            ],
        )
        .unwrap()
    }

    /// Applies an addition the way the update section does.
    fn add(
        zone: &dyn ZoneDatabase,
        version: Version,
        diff: &mut Diff,
        record: Record,
    ) {
        crate::update::conflict::prepare_addition(zone, version, &record)
            .unwrap()
            .apply(zone, version, diff, record)
            .unwrap();
    }

    fn private_data(zone: &dyn ZoneDatabase, version: Version) -> Vec<Bytes> {
        zone.find_rrset(version, &n("example"), PRIVATE, None)
            .unwrap()
            .map(|rrset| rrset.data().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn orphaned_ds() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let mut diff = Diff::new();
        diff.apply(
            &zone,
            version,
            DiffTuple::delete(rr(
                "sub.example",
                Rtype::NS,
                300,
                rdata::name(&n("ns.sub")),
            )),
        )
        .unwrap();
        remove_orphaned_ds(&zone, version, &mut diff).unwrap();
        assert_eq!(diff.len(), 2);
        assert!(zone
            .find_rrset(version, &n("sub.example"), Rtype::DS, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn ds_kept_at_delegation() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let mut diff = Diff::new();
        add(
            &zone,
            version,
            &mut diff,
            rr("sub.example", Rtype::DS, 300, Bytes::from_static(b"ds2")),
        );
        remove_orphaned_ds(&zone, version, &mut diff).unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(
            zone.find_rrset(version, &n("sub.example"), Rtype::DS, None)
                .unwrap()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn private_changes_reverted() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let mut diff = Diff::new();
        add(
            &zone,
            version,
            &mut diff,
            rr("example", PRIVATE, 0, Bytes::from_static(b"\x08\x12\x34\x01\x00")),
        );
        add(
            &zone,
            version,
            &mut diff,
            rr("host.example", Rtype::A, 300, rdata::a(Ipv4Addr::BROADCAST)),
        );
        rollback_private(&ctx(), &zone, version, &mut diff, PRIVATE).unwrap();
        assert_eq!(diff.len(), 1);
        assert!(private_data(&zone, version).is_empty());
    }

    #[test]
    fn chain_creation_becomes_marker() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let mut diff = Diff::new();
        add(
            &zone,
            version,
            &mut diff,
            rr("example", Rtype::NSEC3PARAM, 0, param(0)),
        );
        add_nsec3param_records(&ctx(), &zone, version, &mut diff, PRIVATE)
            .unwrap();

        assert!(zone
            .find_rrset(version, &n("example"), Rtype::NSEC3PARAM, None)
            .unwrap()
            .is_none());
        let expected = private_from_nsec3param(&param(0), PrivateFlags::CREATE);
        assert_eq!(private_data(&zone, version), vec![expected.clone()]);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.tuples()[0].op(), DiffOp::Add);
        assert_eq!(diff.tuples()[0].record().data(), &expected);
    }

    #[test]
    fn opposite_optout_in_one_transaction() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let mut diff = Diff::new();
        add(
            &zone,
            version,
            &mut diff,
            rr("example", Rtype::NSEC3PARAM, 0, param(0)),
        );
        add(
            &zone,
            version,
            &mut diff,
            rr("example", Rtype::NSEC3PARAM, 0, param(Nsec3param::OPTOUT)),
        );
        add_nsec3param_records(&ctx(), &zone, version, &mut diff, PRIVATE)
            .unwrap();
        assert_eq!(
            private_data(&zone, version),
            vec![private_from_nsec3param(
                &param(Nsec3param::OPTOUT),
                PrivateFlags::CREATE
            )]
        );
    }

    #[test]
    fn opposite_optout_withdraws_pending() {
        let zone = zone();
        for flags in [0, Nsec3param::OPTOUT] {
            let version = zone.new_version().unwrap();
            let mut diff = Diff::new();
            add(
                &zone,
                version,
                &mut diff,
                rr("example", Rtype::NSEC3PARAM, 0, param(flags)),
            );
            add_nsec3param_records(&ctx(), &zone, version, &mut diff, PRIVATE)
                .unwrap();
            zone.close_version(version, true).unwrap();
        }
        assert_eq!(
            private_data(&zone, zone.current_version()),
            vec![private_from_nsec3param(
                &param(Nsec3param::OPTOUT),
                PrivateFlags::CREATE
            )]
        );
    }

    #[test]
    fn chain_removal_becomes_marker() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        zone.apply(
            version,
            &DiffTuple::add(rr("example", Rtype::NSEC3PARAM, 0, param(0))),
        )
        .unwrap();
        zone.close_version(version, true).unwrap();

        let version = zone.new_version().unwrap();
        let mut diff = Diff::new();
        diff.apply(
            &zone,
            version,
            DiffTuple::delete(rr("example", Rtype::NSEC3PARAM, 0, param(0))),
        )
        .unwrap();
        add_nsec3param_records(&ctx(), &zone, version, &mut diff, PRIVATE)
            .unwrap();

        assert!(zone
            .find_rrset(version, &n("example"), Rtype::NSEC3PARAM, None)
            .unwrap()
            .is_some());
        assert_eq!(
            private_data(&zone, version),
            vec![private_from_nsec3param(&param(0), PrivateFlags::REMOVE)]
        );
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn unknown_flags_reverted() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let mut diff = Diff::new();
        add(
            &zone,
            version,
            &mut diff,
            rr("example", Rtype::NSEC3PARAM, 0, param(0x02)),
        );
        add_nsec3param_records(&ctx(), &zone, version, &mut diff, PRIVATE)
            .unwrap();
        assert!(diff.is_empty());
        assert!(private_data(&zone, version).is_empty());
        assert!(zone
            .find_rrset(version, &n("example"), Rtype::NSEC3PARAM, None)
            .unwrap()
            .is_none());
    }
}
