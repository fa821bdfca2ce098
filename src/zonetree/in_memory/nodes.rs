//! The nodes of an in-memory zone.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::RwLock;
use tracing::trace;

use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use crate::base::record::Record;
use crate::update::diff::{DiffOp, DiffTuple};
use crate::zonetree::error::DbError;
use crate::zonetree::traits::ZoneDatabase;
use crate::zonetree::types::{Rrset, RrsetKey, SharedRrset};

use super::versioned::{Version, Versioned};

//------------ NodeRrsets ----------------------------------------------------

/// The RRsets of a single owner name.
#[derive(Default)]
struct NodeRrsets {
    rrsets: HashMap<RrsetKey, Versioned<SharedRrset>>,
}

impl NodeRrsets {
    fn get(&self, key: RrsetKey, version: Version) -> Option<SharedRrset> {
        self.rrsets
            .get(&key)
            .and_then(|rrset| rrset.get(version))
            .cloned()
    }

    fn iter(
        &self,
        version: Version,
    ) -> impl Iterator<Item = &SharedRrset> + '_ {
        self.rrsets.values().filter_map(move |rrset| rrset.get(version))
    }

    fn update(&mut self, rrset: SharedRrset, version: Version) {
        self.rrsets
            .entry(rrset.key())
            .or_default()
            .update(version, rrset)
    }

    fn remove(&mut self, key: RrsetKey, version: Version) {
        if let Some(rrset) = self.rrsets.get_mut(&key) {
            rrset.remove(version);
            if rrset.is_empty() {
                self.rrsets.remove(&key);
            }
        }
    }

    fn rollback(&mut self, version: Version) {
        self.rrsets.retain(|_, rrset| {
            rrset.rollback(version);
            !rrset.is_empty()
        });
    }

    fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }
}

//------------ ZoneVersions --------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
struct ZoneVersions {
    current: Version,
    open: Option<Version>,
}

//------------ InMemoryZone --------------------------------------------------

/// A versioned zone kept entirely in memory.
///
/// Nodes are kept in canonical order which makes iterating over a version
/// produce records in the order a signer or a zone transfer expects.
pub struct InMemoryZone {
    origin: Name,
    class: Class,
    nodes: RwLock<BTreeMap<Name, NodeRrsets>>,
    versions: RwLock<ZoneVersions>,
}

impl InMemoryZone {
    /// Creates a new, empty zone.
    pub fn new(origin: Name, class: Class) -> Self {
        InMemoryZone {
            origin,
            class,
            nodes: Default::default(),
            versions: Default::default(),
        }
    }

    /// Creates a zone from an initial set of records.
    ///
    /// Records outside the zone are rejected. Records of the same owner and
    /// type end up in one RRset whose TTL is the one of the last record.
    pub fn from_records(
        origin: Name,
        class: Class,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Self, DbError> {
        let zone = Self::new(origin, class);
        let version = zone.new_version()?;
        for record in records {
            if let Err(err) = zone.apply(version, &DiffTuple::add(record)) {
                zone.close_version(version, false)?;
                return Err(err);
            }
        }
        zone.close_version(version, true)?;
        Ok(zone)
    }

    fn check_open(&self, version: Version) -> Result<(), DbError> {
        if self.versions.read().open == Some(version) {
            Ok(())
        } else {
            Err(DbError::NotOpen(version))
        }
    }

    fn add(&self, version: Version, record: &Record) -> bool {
        let key = RrsetKey::for_record(record);
        let mut nodes = self.nodes.write();
        let node = nodes.entry(record.owner().clone()).or_default();
        let mut rrset = match node.get(key, version) {
            Some(rrset) => {
                if rrset.ttl() == record.ttl()
                    && rrset.owner().eq_case(record.owner())
                    && rrset.contains(record.data())
                {
                    return false;
                }
                rrset.to_rrset()
            }
            None => Rrset::new(record.owner().clone(), key, record.ttl()),
        };
        rrset.set_ttl(record.ttl());
        rrset.set_owner(record.owner().clone());
        rrset.push_data(record.data().clone());
        node.update(rrset.into_shared(), version);
        true
    }

    fn delete(&self, version: Version, record: &Record) -> bool {
        let key = RrsetKey::for_record(record);
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get_mut(record.owner()) else {
            return false;
        };
        let Some(rrset) = node.get(key, version) else {
            return false;
        };
        let mut rrset = rrset.to_rrset();
        if !rrset.remove_data(record.data()) {
            return false;
        }
        if rrset.is_empty() {
            node.remove(key, version);
            if node.is_empty() {
                nodes.remove(record.owner());
            }
        } else {
            node.update(rrset.into_shared(), version);
        }
        true
    }
}

//--- impl ZoneDatabase

impl ZoneDatabase for InMemoryZone {
    fn origin(&self) -> &Name {
        &self.origin
    }

    fn class(&self) -> Class {
        self.class
    }

    fn current_version(&self) -> Version {
        self.versions.read().current
    }

    fn new_version(&self) -> Result<Version, DbError> {
        let mut versions = self.versions.write();
        if versions.open.is_some() {
            return Err(DbError::VersionOpen);
        }
        let version = versions.current.next();
        versions.open = Some(version);
        trace!("Opened version {version} of zone {}", self.origin);
        Ok(version)
    }

    fn find_rrset(
        &self,
        version: Version,
        name: &Name,
        rtype: Rtype,
        covers: Option<Rtype>,
    ) -> Result<Option<SharedRrset>, DbError> {
        let nodes = self.nodes.read();
        Ok(nodes
            .get(name)
            .and_then(|node| node.get(RrsetKey::new(rtype, covers), version)))
    }

    fn rrsets_at(
        &self,
        version: Version,
        name: &Name,
    ) -> Result<Vec<SharedRrset>, DbError> {
        let nodes = self.nodes.read();
        Ok(nodes
            .get(name)
            .map(|node| node.iter(version).cloned().collect())
            .unwrap_or_default())
    }

    fn apply(
        &self,
        version: Version,
        tuple: &DiffTuple,
    ) -> Result<bool, DbError> {
        self.check_open(version)?;
        let record = tuple.record();
        if !record.owner().is_subdomain_of(&self.origin) {
            return Err(DbError::OutOfZone(record.owner().clone()));
        }
        let changed = match tuple.op() {
            DiffOp::Add => self.add(version, record),
            DiffOp::Delete => self.delete(version, record),
            DiffOp::Exists => return Err(DbError::NotApplicable),
        };
        trace!("Applied {tuple} to {version}: changed={changed}");
        Ok(changed)
    }

    fn close_version(
        &self,
        version: Version,
        commit: bool,
    ) -> Result<(), DbError> {
        let mut versions = self.versions.write();
        if versions.open != Some(version) {
            return Err(DbError::NotOpen(version));
        }
        if commit {
            versions.current = version;
        } else {
            let mut nodes = self.nodes.write();
            nodes.retain(|_, node| {
                node.rollback(version);
                !node.is_empty()
            });
        }
        versions.open = None;
        trace!(
            "Closed version {version} of zone {}: commit={commit}",
            self.origin
        );
        Ok(())
    }

    fn record_count(&self, version: Version) -> Result<usize, DbError> {
        let nodes = self.nodes.read();
        Ok(nodes
            .values()
            .flat_map(|node| node.iter(version))
            .map(|rrset| rrset.len())
            .sum())
    }

    fn records(&self, version: Version) -> Result<Vec<Record>, DbError> {
        let nodes = self.nodes.read();
        let mut res = Vec::new();
        for node in nodes.values() {
            let mut rrsets: Vec<_> = node.iter(version).collect();
            rrsets.sort_by_key(|rrset| {
                (rrset.rtype(), rrset.covers().map(Rtype::to_int))
            });
            for rrset in rrsets {
                let mut records: Vec<_> = rrset.records(self.class).collect();
                records.sort_by(|left, right| {
                    crate::base::rdata::canonical_cmp(
                        left.rtype(),
                        left.data(),
                        right.data(),
                    )
                });
                res.extend(records);
            }
        }
        Ok(res)
    }
}

//--- Debug

impl fmt::Debug for InMemoryZone {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InMemoryZone")
            .field("origin", &self.origin)
            .field("class", &self.class)
            .field("versions", &*self.versions.read())
            .finish()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::rdata;
    use crate::base::serial::Serial;
    use core::str::FromStr;
    use std::net::Ipv4Addr;

    fn n(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn a(owner: &str, ttl: u32, addr: [u8; 4]) -> Record {
        Record::new(
            n(owner),
            Class::IN,
            Rtype::A,
            ttl,
            rdata::a(Ipv4Addr::from(addr)),
        )
    }

    fn soa(serial: u32) -> Record {
        Record::new(
            n("example.com"),
            Class::IN,
            Rtype::SOA,
            3600,
            rdata::Soa::new(
                n("ns.example.com"),
                n("hostmaster.example.com"),
                Serial(serial),
                3600,
                900,
                86400,
                300,
            )
            .compose(),
        )
    }

    fn zone() -> InMemoryZone {
        InMemoryZone::from_records(
            n("example.com"),
            Class::IN,
            [soa(1), a("www.example.com", 300, [10, 0, 0, 1])],
        )
        .unwrap()
    }

    #[test]
    fn open_version_is_invisible_until_commit() {
        let zone = zone();
        let current = zone.current_version();
        let version = zone.new_version().unwrap();
        let record = a("www.example.com", 300, [10, 0, 0, 2]);
        assert!(zone.apply(version, &DiffTuple::add(record)).unwrap());

        let www = n("www.example.com");
        let old = zone.find_rrset(current, &www, Rtype::A, None).unwrap();
        assert_eq!(old.unwrap().len(), 1);
        let new = zone.find_rrset(version, &www, Rtype::A, None).unwrap();
        assert_eq!(new.unwrap().len(), 2);

        zone.close_version(version, true).unwrap();
        assert_eq!(zone.current_version(), version);
        assert_eq!(zone.record_count(version).unwrap(), 3);
    }

    #[test]
    fn rollback_restores_state() {
        let zone = zone();
        let before = zone.records(zone.current_version()).unwrap();
        let version = zone.new_version().unwrap();
        zone.apply(
            version,
            &DiffTuple::delete(a("www.example.com", 300, [10, 0, 0, 1])),
        )
        .unwrap();
        zone.apply(
            version,
            &DiffTuple::add(a("new.example.com", 60, [10, 0, 0, 9])),
        )
        .unwrap();
        zone.close_version(version, false).unwrap();

        let again = zone.new_version().unwrap();
        assert_eq!(zone.records(again).unwrap(), before);
    }

    #[test]
    fn single_open_version() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        assert!(matches!(zone.new_version(), Err(DbError::VersionOpen)));
        zone.close_version(version, false).unwrap();
        assert!(zone.new_version().is_ok());
    }

    #[test]
    fn add_sets_ttl_and_case() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let same = a("www.example.com", 300, [10, 0, 0, 1]);
        assert!(!zone.apply(version, &DiffTuple::add(same)).unwrap());

        let shouting = a("WWW.example.com", 600, [10, 0, 0, 2]);
        assert!(zone.apply(version, &DiffTuple::add(shouting)).unwrap());
        let rrset = zone
            .find_rrset(version, &n("www.example.com"), Rtype::A, None)
            .unwrap()
            .unwrap();
        assert_eq!(rrset.ttl(), 600);
        assert!(rrset.owner().eq_case(&n("WWW.example.com")));
    }

    #[test]
    fn delete_absent_is_no_op() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let absent = a("www.example.com", 300, [10, 9, 9, 9]);
        assert!(!zone.apply(version, &DiffTuple::delete(absent)).unwrap());
        let outside = a("www.example.org", 300, [10, 9, 9, 9]);
        assert!(matches!(
            zone.apply(version, &DiffTuple::add(outside)),
            Err(DbError::OutOfZone(_))
        ));
    }

    #[test]
    fn set_serial() {
        let zone = zone();
        let version = zone.new_version().unwrap();
        let tuples = zone.set_serial(version, Serial(2)).unwrap();
        assert_eq!(tuples[0].op(), DiffOp::Delete);
        assert_eq!(zone.serial(version).unwrap(), Serial(2));
        assert_eq!(zone.serial(zone.current_version()).unwrap(), Serial(1));
    }
}
