//! Processing of a single update transaction.
//!
//! [`process`] takes an update request for a primary zone through all of
//! its stages: the access checks, the prescan of the update section, the
//! prerequisites, the update section itself, the integrity checks and
//! finally the commit. Any failure after the new zone version has been
//! opened rolls back all changes.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use crate::base::rdata::{self, Nsec3param, RdataDisplay, Soa};
use crate::base::record::Record;
use crate::config::ZoneConfig;
use crate::update::policy::PolicyTable;
use crate::zonetree::{Version, ZoneDatabase};

use super::chain::{add_nsec3param_records, remove_orphaned_ds, rollback_private};
use super::checks::{
    cds_check, check_dnssec, check_mx, check_names, ns_check,
};
use super::conflict::{delete_if, prepare_addition, Predicate};
use super::diff::Diff;
use super::error::UpdateError;
use super::exists::{
    cname_incompatible_exists, count_matching, records_at, rr_exists,
    rrset_exists,
};
use super::prereq::check_prerequisites;
use super::request::{TransactionContext, UpdateRequest};
use super::zone::Zone;

//------------ process -------------------------------------------------------

/// Processes an update request for a primary zone.
///
/// Returns `Ok(())` if the update was applied or turned out to change
/// nothing.
pub fn process(zone: &Zone, request: &UpdateRequest) -> Result<(), UpdateError> {
    let db = zone.db();
    let config = zone.config();
    let ctx = TransactionContext::new(zone.name().clone(), zone.class(), request);

    check_access(&ctx, &config, request)?;
    let limits = prescan(&ctx, db, &config, request)?;
    debug!("{ctx}: update section prescan OK");

    let version = db.new_version()?;
    match transaction(&ctx, zone, &config, request, &limits, version) {
        Ok(true) => {
            debug!("{ctx}: committing update transaction");
            db.close_version(version, true)?;
            zone.mark_dirty();
            zone.notify();
            Ok(())
        }
        Ok(false) => {
            debug!("{ctx}: redundant request");
            db.close_version(version, true)?;
            Ok(())
        }
        Err(err) => {
            debug!("{ctx}: rolling back");
            if let Err(db_err) = db.close_version(version, false) {
                error!("{ctx}: rollback failed: {db_err}");
            }
            Err(err)
        }
    }
}

//------------ Access --------------------------------------------------------

/// Decides whether the client may update the zone at all.
fn check_access(
    ctx: &TransactionContext,
    config: &ZoneConfig,
    request: &UpdateRequest,
) -> Result<(), UpdateError> {
    let peer = request.peer.ip();
    if let Some(acl) = &config.query_acl {
        if !acl.allows(peer) {
            info!("{ctx}: update denied by query ACL");
            return Err(UpdateError::refused("update denied"));
        }
    }
    match &config.update_policy {
        None => {
            let allowed = config
                .update_acl
                .as_ref()
                .map(|acl| acl.allows(peer))
                .unwrap_or(false);
            if !allowed {
                info!("{ctx}: update denied");
                return Err(UpdateError::refused("update denied"));
            }
        }
        Some(_) => {
            if request.signer.is_none() && !request.tcp {
                info!("{ctx}: update denied, unsigned request over UDP");
                return Err(UpdateError::refused("update denied"));
            }
        }
    }
    if config.update_disabled {
        info!(
            "{ctx}: dynamic update temporarily disabled because the zone \
             is frozen"
        );
        return Err(UpdateError::refused("zone is frozen"));
    }
    Ok(())
}

//------------ Prescan -------------------------------------------------------

/// Checks the update section before anything is changed.
///
/// Returns the per-type record limit granted by the update policy for
/// each update record, 0 meaning no limit.
fn prescan(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    config: &ZoneConfig,
    request: &UpdateRequest,
) -> Result<Vec<u32>, UpdateError> {
    let version = db.current_version();
    let mut limits = vec![0; request.updates.len()];

    for (record, limit) in request.updates.iter().zip(limits.iter_mut()) {
        let name = record.owner();
        let rtype = record.rtype();
        let class = record.class();

        if !name.is_subdomain_of(&ctx.zone) {
            warn!("{ctx}: update RR is outside zone");
            return Err(UpdateError::NotZone(name.clone()));
        }
        if class == ctx.class {
            if rtype.is_meta() {
                return Err(UpdateError::FormErr("meta-RR in update"));
            }
            check_names(ctx, record, config.check_names)?;
            if rtype == Rtype::SVCB && !rdata::svcb_is_valid(record.data()) {
                info!("{ctx}: {name}/SVCB: alias form with parameters");
                return Err(UpdateError::refused("bad SVCB record"));
            }
        } else if class == Class::ANY {
            if record.ttl() != 0
                || !record.data().is_empty()
                || (rtype.is_meta() && rtype != Rtype::ANY)
            {
                return Err(UpdateError::FormErr("meta-RR in update"));
            }
        } else if class == Class::NONE {
            if record.ttl() != 0 || rtype.is_meta() {
                return Err(UpdateError::FormErr("meta-RR in update"));
            }
        } else {
            warn!("{ctx}: update RR has incorrect class {class}");
            return Err(UpdateError::FormErr("update RR has incorrect class"));
        }

        if rtype == Rtype::NSEC3 || rtype == Rtype::NSEC {
            info!("{ctx}: explicit {rtype} updates are not allowed");
            return Err(UpdateError::refused(format!(
                "explicit {rtype} updates are not allowed"
            )));
        }
        if rtype == Rtype::RRSIG && *name != ctx.zone {
            info!(
                "{ctx}: explicit RRSIG updates are only supported at the apex"
            );
            return Err(UpdateError::refused(
                "explicit RRSIG updates are only supported at the apex",
            ));
        }

        if let Some(policy) = &config.update_policy {
            *limit = authorize(ctx, db, version, policy, request, record)?;
        }
    }
    Ok(limits)
}

/// Checks an update record against the update policy.
fn authorize(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    policy: &PolicyTable,
    request: &UpdateRequest,
    record: &Record,
) -> Result<u32, UpdateError> {
    let name = record.owner();
    let rtype = record.rtype();
    let class = record.class();
    let check = |rtype: Rtype, target: Option<&Name>| {
        policy.check_rule(
            &ctx.zone,
            request.signer.as_ref(),
            request.peer,
            request.tcp,
            name,
            rtype,
            target,
        )
    };
    let denied = || {
        info!("{ctx}: update of '{name}/{rtype}' rejected by update policy");
        UpdateError::refused("rejected by update policy")
    };
    let has_target = matches!(rtype, Rtype::PTR | Rtype::SRV);
    let target = if has_target && class != Class::ANY {
        rdata::target_name(rtype, record.data())
    } else {
        None
    };

    if class == Class::ANY && ctx.class == Class::IN && has_target {
        // Every existing record must be deletable by its target.
        for existing in records_at(db, version, name, rtype, None)? {
            let target = rdata::target_name(rtype, existing.data());
            if check(rtype, target.as_ref()).is_none() {
                return Err(denied());
            }
        }
        Ok(0)
    } else if target.is_some() && class == Class::NONE {
        if rr_exists(db, version, record)?
            && check(rtype, target.as_ref()).is_none()
        {
            return Err(denied());
        }
        Ok(0)
    } else if rtype != Rtype::ANY {
        check(rtype, target.as_ref()).ok_or_else(denied)
    } else {
        // Deleting everything at a name needs permission for every RRset
        // except the ones the signer maintains.
        for existing in records_at(db, version, name, Rtype::ANY, None)? {
            let rtype = existing.rtype();
            if rtype.is_dnssec_meta() {
                continue;
            }
            let target = if matches!(rtype, Rtype::PTR | Rtype::SRV) {
                rdata::target_name(rtype, existing.data())
            } else {
                None
            };
            if check(rtype, target.as_ref()).is_none() {
                return Err(denied());
            }
        }
        Ok(0)
    }
}

//------------ Transaction ---------------------------------------------------

/// Runs the transaction on the open version.
///
/// Returns whether the zone changed. In this case, the changes have been
/// journaled and the version only needs committing.
fn transaction(
    ctx: &TransactionContext,
    zone: &Zone,
    config: &Arc<ZoneConfig>,
    request: &UpdateRequest,
    limits: &[u32],
    version: Version,
) -> Result<bool, UpdateError> {
    let db = zone.db();
    check_prerequisites(ctx, db, version, &request.prerequisites)?;

    let mut diff = Diff::new();
    let mut soa_serial_changed = false;
    for (record, &limit) in request.updates.iter().zip(limits) {
        let class = record.class();
        if class == ctx.class {
            let outcome =
                add_record(ctx, zone, config, version, &mut diff, record, limit)?;
            if outcome == Added::SoaSerial {
                soa_serial_changed = true;
            }
        } else if class == Class::ANY {
            delete_rrset(ctx, db, version, &mut diff, record)?;
        } else {
            delete_record(ctx, zone, version, &mut diff, record)?;
        }
    }

    if diff.is_empty() {
        return Ok(false);
    }

    check_dnssec(ctx, db, version, &diff, config)?;
    if ns_check(ctx, db, version)? != 0 {
        info!(
            "{ctx}: update rejected: post update name server sanity check \
             failed"
        );
        return Err(UpdateError::refused("name server sanity check failed"));
    }
    if config.signing {
        if let Err(bad) = cds_check(db, version)? {
            info!("{ctx}: update rejected: bad {bad} RRset");
            return Err(UpdateError::refused(format!("bad {bad} RRset")));
        }
    }

    if !soa_serial_changed {
        let serial = config.serial_policy.next(db.serial(version)?);
        for tuple in db.set_serial(version, serial)? {
            diff.append_minimal(tuple);
        }
    }
    check_mx(ctx, db, version, &diff, config)?;
    remove_orphaned_ds(db, version, &mut diff)?;
    rollback_private(ctx, db, version, &mut diff, config.private_type)?;
    add_nsec3param_records(ctx, db, version, &mut diff, config.private_type)?;

    if config.max_records != 0 {
        let count = db.record_count(version)?;
        if count > config.max_records {
            error!(
                "{ctx}: records in zone ({count}) exceeds max-records ({})",
                config.max_records
            );
            return Err(UpdateError::TooManyRecords {
                count,
                max: config.max_records,
            });
        }
    }

    let from = db.serial(db.current_version())?;
    let to = db.serial(version)?;
    debug!("{ctx}: writing journal");
    let mut journal = zone.journal().open_for_append().map_err(|err| {
        error!("{ctx}: journal open failed: {err}");
        err
    })?;
    journal.write_transaction(&diff, from, to).map_err(|err| {
        error!("{ctx}: journal write failed: {err}");
        err
    })?;
    journal.close()?;
    Ok(true)
}

//------------ Update records ------------------------------------------------

/// What became of a zone class update record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Added {
    /// The record was added, possibly replacing others.
    Record,

    /// The record was a new SOA with a larger serial.
    SoaSerial,

    /// The record was ignored.
    Ignored,
}

/// Adds a zone class update record.
fn add_record(
    ctx: &TransactionContext,
    zone: &Zone,
    config: &ZoneConfig,
    version: Version,
    diff: &mut Diff,
    record: &Record,
    limit: u32,
) -> Result<Added, UpdateError> {
    let db = zone.db();
    let name = record.owner();
    let rtype = record.rtype();
    let ignore = |what: &str| -> Result<Added, UpdateError> {
        info!("{ctx}: {what}");
        Ok(Added::Ignored)
    };

    if rtype == Rtype::MD || rtype == Rtype::MF {
        return ignore(&format!("attempt to add {rtype} ignored"));
    }
    if (rtype == Rtype::NS || rtype == Rtype::DNAME) && name.is_wildcard() {
        return ignore(&format!("attempt to add wildcard {rtype} record ignored"));
    }
    if rtype == Rtype::CNAME {
        if cname_incompatible_exists(db, version, name)? {
            return ignore("attempt to add CNAME alongside non-CNAME ignored");
        }
    } else if rrset_exists(db, version, name, Rtype::CNAME, None)?
        && !rtype.is_at_cname()
    {
        return ignore("attempt to add non-CNAME alongside CNAME ignored");
    }

    let mut outcome = Added::Record;
    if rtype == Rtype::SOA {
        if !rrset_exists(db, version, name, Rtype::SOA, None)? {
            return ignore("attempt to create 2nd SOA ignored");
        }
        let serial = Soa::parse(record.data())
            .map_err(|_| UpdateError::FormErr("malformed SOA record"))?
            .serial();
        if !serial.is_greater_than(db.serial(version)?) {
            return ignore(
                "SOA update failed to increment serial, ignoring it",
            );
        }
        outcome = Added::SoaSerial;
    }
    if rtype.is_at_parent() && *name == ctx.zone {
        return ignore(&format!(
            "attempt to add a {rtype} record at zone apex ignored"
        ));
    }
    if rtype == config.private_type {
        return ignore(&format!(
            "attempt to add a private type ({rtype}) record rejected \
             internal use only"
        ));
    }
    if rtype == Rtype::NSEC3PARAM {
        let unknown_flags = record
            .data()
            .get(1)
            .map(|flags| flags & !Nsec3param::OPTOUT != 0)
            .unwrap_or(true);
        if unknown_flags {
            return ignore(
                "attempt to add NSEC3PARAM record with non OPTOUT flag",
            );
        }
    }

    if config.check_wildcard && name.has_internal_wildcard() {
        warn!(
            "{ctx}: warning: ownername '{name}' contains a non-terminal \
             wildcard"
        );
    }

    let mut ttl = record.ttl();
    if let Some(max) = config.max_zone_ttl {
        if ttl > max {
            info!("{ctx}: reducing TTL to the configured max-zone-ttl {max}");
            ttl = max;
        }
    }

    if limit != 0 {
        let count = count_matching(db, version, name, rtype, record.covers())?;
        if count >= limit as usize {
            return ignore(&format!(
                "attempt to add more records than permitted by policy \
                 max={limit}"
            ));
        }
    }

    info!(
        "{ctx}: adding an RR at '{name}' {rtype} {}",
        RdataDisplay::new(rtype, record.data())
    );
    let record = record.with_ttl(ttl);
    prepare_addition(db, version, &record)?.apply(db, version, diff, record)?;
    Ok(outcome)
}

/// Processes a class ANY update record deleting RRsets.
fn delete_rrset(
    ctx: &TransactionContext,
    db: &dyn ZoneDatabase,
    version: Version,
    diff: &mut Diff,
    record: &Record,
) -> Result<(), UpdateError> {
    let name = record.owner();
    let rtype = record.rtype();
    if rtype == Rtype::ANY {
        info!("{ctx}: delete all rrsets from name '{name}'");
        let predicate = if *name == ctx.zone {
            Predicate::NotSoaNorNs
        } else {
            Predicate::NotDnssec
        };
        delete_if(db, version, diff, predicate, record, name, Rtype::ANY, None)?;
    } else if *name == ctx.zone && (rtype == Rtype::SOA || rtype == Rtype::NS)
    {
        info!("{ctx}: attempt to delete all SOA or NS records ignored");
    } else {
        info!("{ctx}: deleting rrset at '{name}' {rtype}");
        delete_if(
            db,
            version,
            diff,
            Predicate::True,
            record,
            name,
            rtype,
            record.covers(),
        )?;
    }
    Ok(())
}

/// Processes a class NONE update record deleting a single record.
fn delete_record(
    ctx: &TransactionContext,
    zone: &Zone,
    version: Version,
    diff: &mut Diff,
    record: &Record,
) -> Result<(), UpdateError> {
    let db = zone.db();
    let name = record.owner();
    let rtype = record.rtype();
    if *name == ctx.zone {
        if rtype == Rtype::SOA {
            info!("{ctx}: attempt to delete SOA ignored");
            return Ok(());
        }
        if rtype == Rtype::NS
            && count_matching(db, version, name, Rtype::NS, None)? == 1
        {
            info!("{ctx}: attempt to delete last NS ignored");
            return Ok(());
        }
        if rtype.is_key_material() && zone.key_in_use(rtype, record.data()) {
            info!("{ctx}: attempt to delete in use {rtype} ignored");
            return Ok(());
        }
    }
    info!("{ctx}: deleting an RR at {name} {rtype}");
    delete_if(
        db,
        version,
        diff,
        Predicate::RdataEqual,
        record,
        name,
        rtype,
        record.covers(),
    )?;
    Ok(())
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Rcode;
    use crate::base::rdata::Dnskey;
    use crate::base::serial::Serial;
    use crate::config::CheckNames;
    use crate::journal::MemoryJournal;
    use crate::update::policy::Acl;
    use crate::update::zone::ZoneKind;
    use crate::zonetree::InMemoryZone;
    use bytes::Bytes;
    use core::str::FromStr;
    use std::net::Ipv4Addr;

    fn n(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn rr(owner: &str, class: Class, rtype: Rtype, ttl: u32, data: Bytes) -> Record {
        Record::new(n(owner), class, rtype, ttl, data)
    }

    fn a(owner: &str, last: u8) -> Record {
        rr(owner, Class::IN, Rtype::A, 300, rdata::a(Ipv4Addr::new(10, 0, 0, last)))
    }

    fn soa(serial: u32) -> Bytes {
        Soa::new(
            n("ns.example"),
            n("hostmaster.example"),
            Serial(serial),
            3600,
            600,
            86400,
            300,
        )
        .compose()
    }

    fn setup() -> (Zone, Arc<MemoryJournal>) {
        let db = InMemoryZone::from_records(
            n("example"),
            Class::IN,
            [
                rr("example", Class::IN, Rtype::SOA, 3600, soa(10)),
                rr("example", Class::IN, Rtype::NS, 3600, rdata::name(&n("ns.example"))),
                a("ns.example", 53),
                a("host.example", 2),
            ],
        )
        .unwrap();
        let journal = Arc::new(MemoryJournal::new());
        let config = ZoneConfig {
            update_acl: Some(Acl::any()),
            ..Default::default()
        };
        let zone = Zone::with_journal(
            Arc::new(db),
            ZoneKind::Primary,
            config,
            journal.clone(),
        )
        .unwrap();
        (zone, journal)
    }

    fn request(updates: Vec<Record>) -> UpdateRequest {
        let mut request = UpdateRequest::new(
            n("example"),
            Class::IN,
            "192.0.2.1:5353".parse().unwrap(),
        );
        request.updates = updates;
        request
    }

    fn current(zone: &Zone, owner: &str, rtype: Rtype) -> Vec<Bytes> {
        let db = zone.db();
        db.find_rrset(db.current_version(), &n(owner), rtype, None)
            .unwrap()
            .map(|rrset| rrset.data().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn add_bumps_serial_and_journals() {
        let (zone, journal) = setup();
        process(&zone, &request(vec![a("new.example", 7)])).unwrap();
        assert_eq!(current(&zone, "new.example", Rtype::A).len(), 1);
        let db = zone.db();
        assert_eq!(db.serial(db.current_version()).unwrap(), Serial(11));

        let written = journal.transactions();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].from, Serial(10));
        assert_eq!(written[0].to, Serial(11));
        // SOA out, SOA in, and the new record.
        assert_eq!(written[0].diff.len(), 3);
        assert!(zone.take_dirty());
        assert!(zone.take_notify());
    }

    #[test]
    fn redundant_request() {
        let (zone, journal) = setup();
        process(&zone, &request(vec![a("host.example", 2)])).unwrap();
        assert!(journal.transactions().is_empty());
        assert!(!zone.take_dirty());
    }

    #[test]
    fn cname_next_to_data_is_ignored() {
        let (zone, _) = setup();
        process(
            &zone,
            &request(vec![rr(
                "host.example",
                Class::IN,
                Rtype::CNAME,
                300,
                rdata::name(&n("other.example")),
            )]),
        )
        .unwrap();
        assert!(current(&zone, "host.example", Rtype::CNAME).is_empty());
        assert_eq!(current(&zone, "host.example", Rtype::A).len(), 1);
    }

    #[test]
    fn last_apex_ns_is_kept() {
        let (zone, _) = setup();
        process(
            &zone,
            &request(vec![rr(
                "example",
                Class::NONE,
                Rtype::NS,
                0,
                rdata::name(&n("ns.example")),
            )]),
        )
        .unwrap();
        assert_eq!(current(&zone, "example", Rtype::NS).len(), 1);
    }

    #[test]
    fn apex_any_delete_keeps_soa_and_ns() {
        let (zone, _) = setup();
        process(
            &zone,
            &request(vec![
                rr("example", Class::IN, Rtype::TXT, 300, rdata::txt("x")),
                rr("example", Class::ANY, Rtype::ANY, 0, Bytes::new()),
            ]),
        )
        .unwrap();
        assert!(current(&zone, "example", Rtype::TXT).is_empty());
        assert_eq!(current(&zone, "example", Rtype::NS).len(), 1);
        assert_eq!(current(&zone, "example", Rtype::SOA).len(), 1);
    }

    #[test]
    fn explicit_soa_serial() {
        let (zone, journal) = setup();
        // Not an increase, so ignored.
        process(
            &zone,
            &request(vec![rr("example", Class::IN, Rtype::SOA, 3600, soa(10))]),
        )
        .unwrap();
        assert!(journal.transactions().is_empty());

        process(
            &zone,
            &request(vec![rr("example", Class::IN, Rtype::SOA, 3600, soa(20))]),
        )
        .unwrap();
        let db = zone.db();
        assert_eq!(db.serial(db.current_version()).unwrap(), Serial(20));
    }

    #[test]
    fn max_zone_ttl() {
        let (zone, _) = setup();
        zone.set_config(ZoneConfig {
            update_acl: Some(Acl::any()),
            max_zone_ttl: Some(60),
            ..Default::default()
        })
        .unwrap();
        process(&zone, &request(vec![a("new.example", 7)])).unwrap();
        let db = zone.db();
        let rrset = db
            .find_rrset(db.current_version(), &n("new.example"), Rtype::A, None)
            .unwrap()
            .unwrap();
        assert_eq!(rrset.ttl(), 60);
    }

    #[test]
    fn access() {
        let (zone, _) = setup();
        zone.set_config(ZoneConfig::default()).unwrap();
        let err = process(&zone, &request(vec![a("new.example", 7)])).unwrap_err();
        assert_eq!(err.rcode(), Some(Rcode::REFUSED));

        zone.set_config(ZoneConfig {
            update_acl: Some(Acl::any()),
            update_disabled: true,
            ..Default::default()
        })
        .unwrap();
        let err = process(&zone, &request(vec![a("new.example", 7)])).unwrap_err();
        assert_eq!(err.rcode(), Some(Rcode::REFUSED));

        // A frozen zone still reports a denied client as denied.
        zone.set_config(ZoneConfig {
            update_disabled: true,
            ..Default::default()
        })
        .unwrap();
        let err = process(&zone, &request(vec![a("new.example", 7)])).unwrap_err();
        assert!(matches!(err, UpdateError::Refused(ref msg) if msg == "update denied"));

        zone.set_config(ZoneConfig {
            update_acl: Some(Acl::any()),
            query_acl: Some(Acl::none()),
            ..Default::default()
        })
        .unwrap();
        let err = process(&zone, &request(vec![a("new.example", 7)])).unwrap_err();
        assert_eq!(err.rcode(), Some(Rcode::REFUSED));
        assert!(current(&zone, "new.example", Rtype::A).is_empty());

        zone.set_config(ZoneConfig {
            update_acl: Some(Acl::any()),
            query_acl: Some(Acl::any()),
            ..Default::default()
        })
        .unwrap();
        process(&zone, &request(vec![a("new.example", 7)])).unwrap();
        assert_eq!(current(&zone, "new.example", Rtype::A).len(), 1);
    }

    #[test]
    fn check_names_policy() {
        let (zone, _) = setup();
        let mx = rr(
            "example",
            Class::IN,
            Rtype::MX,
            300,
            rdata::mx(10, &n("bad_name.example")),
        );
        let err = process(&zone, &request(vec![mx.clone()])).unwrap_err();
        assert_eq!(err.rcode(), Some(Rcode::REFUSED));
        assert!(current(&zone, "example", Rtype::MX).is_empty());

        zone.set_config(ZoneConfig {
            update_acl: Some(Acl::any()),
            check_names: CheckNames::Warn,
            check_mx: false,
            ..Default::default()
        })
        .unwrap();
        process(&zone, &request(vec![mx])).unwrap();
        assert_eq!(current(&zone, "example", Rtype::MX).len(), 1);
    }

    #[test]
    fn svcb_alias_with_params() {
        let (zone, _) = setup();
        let alias = rdata::svcb(0, &n("host.example"), &[0, 3, 0, 2, 1, 187]);
        let err = process(
            &zone,
            &request(vec![rr("_svc.example", Class::IN, Rtype::SVCB, 300, alias)]),
        )
        .unwrap_err();
        assert_eq!(err.rcode(), Some(Rcode::REFUSED));

        let service = rdata::svcb(1, &n("host.example"), &[0, 3, 0, 2, 1, 187]);
        process(
            &zone,
            &request(vec![rr("_svc.example", Class::IN, Rtype::SVCB, 300, service)]),
        )
        .unwrap();
        assert_eq!(current(&zone, "_svc.example", Rtype::SVCB).len(), 1);
    }

    #[test]
    fn managed_key_delete_ignored() {
        let key = Dnskey::new(257, 3, 13, Bytes::from_static(b"key")).compose();
        let db = InMemoryZone::from_records(
            n("example"),
            Class::IN,
            [
                rr("example", Class::IN, Rtype::SOA, 3600, soa(10)),
                rr("example", Class::IN, Rtype::NS, 3600, rdata::name(&n("ns.example"))),
                rr("example", Class::IN, Rtype::DNSKEY, 3600, key.clone()),
                a("ns.example", 53),
            ],
        )
        .unwrap();
        let config = ZoneConfig {
            update_acl: Some(Acl::any()),
            ..Default::default()
        };
        let zone = Zone::with_journal(
            Arc::new(db),
            ZoneKind::Primary,
            config,
            Arc::new(MemoryJournal::new()),
        )
        .unwrap();
        zone.set_managed_keys(vec![key.clone()]);

        process(
            &zone,
            &request(vec![
                rr("example", Class::NONE, Rtype::DNSKEY, 0, key.clone()),
                a("new.example", 7),
            ]),
        )
        .unwrap();
        assert_eq!(current(&zone, "example", Rtype::DNSKEY), vec![key]);
        assert_eq!(current(&zone, "new.example", Rtype::A).len(), 1);
        let db = zone.db();
        assert_eq!(db.serial(db.current_version()).unwrap(), Serial(11));
    }

    #[test]
    fn prescan_errors() {
        let (zone, _) = setup();
        let cases = [
            (a("host.other", 1), Rcode::NOTZONE),
            (rr("example", Class::IN, Rtype::ANY, 0, Bytes::new()), Rcode::FORMERR),
            (rr("host.example", Class::ANY, Rtype::A, 300, Bytes::new()), Rcode::FORMERR),
            (rr("host.example", Class::CH, Rtype::A, 0, Bytes::new()), Rcode::FORMERR),
            (rr("host.example", Class::IN, Rtype::NSEC, 300, Bytes::from_static(b"\0")), Rcode::REFUSED),
        ];
        for (record, rcode) in cases {
            let err = process(&zone, &request(vec![record])).unwrap_err();
            assert_eq!(err.rcode(), Some(rcode));
        }
    }

    #[test]
    fn failed_prerequisite_rolls_back() {
        let (zone, journal) = setup();
        let mut request = request(vec![a("new.example", 7)]);
        request.prerequisites = vec![a("host.example", 1).with_ttl(0)];
        let err = process(&zone, &request).unwrap_err();
        assert_eq!(err.rcode(), Some(Rcode::NXRRSET));
        assert!(current(&zone, "new.example", Rtype::A).is_empty());
        assert!(journal.transactions().is_empty());
        // The zone can be updated again.
        process(&zone, &request_ok()).unwrap();
    }

    fn request_ok() -> UpdateRequest {
        request(vec![a("again.example", 8)])
    }

    #[test]
    fn journal_failure_rolls_back() {
        let (zone, journal) = setup();
        journal.set_fail_writes(true);
        let err = process(&zone, &request(vec![a("new.example", 7)])).unwrap_err();
        assert_eq!(err.rcode(), Some(Rcode::SERVFAIL));
        assert!(current(&zone, "new.example", Rtype::A).is_empty());
    }

    #[test]
    fn max_records() {
        let (zone, _) = setup();
        zone.set_config(ZoneConfig {
            update_acl: Some(Acl::any()),
            max_records: 5,
            ..Default::default()
        })
        .unwrap();
        process(&zone, &request(vec![a("new.example", 7)])).unwrap();
        let err = process(&zone, &request(vec![a("more.example", 8)])).unwrap_err();
        assert!(matches!(err, UpdateError::TooManyRecords { count: 6, max: 5 }));
        assert!(current(&zone, "more.example", Rtype::A).is_empty());
    }
}
