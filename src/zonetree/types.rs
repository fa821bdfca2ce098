use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use crate::base::rdata;
use crate::base::record::Record;
use bytes::Bytes;
use std::ops;
use std::sync::Arc;
use std::vec::Vec;

//------------ RrsetKey ------------------------------------------------------

/// The key identifying an RRset at a node.
///
/// Signatures are kept in separate RRsets per covered type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RrsetKey {
    pub rtype: Rtype,
    pub covers: Option<Rtype>,
}

impl RrsetKey {
    pub fn new(rtype: Rtype, covers: Option<Rtype>) -> Self {
        RrsetKey { rtype, covers }
    }

    pub fn for_record(record: &Record) -> Self {
        RrsetKey {
            rtype: record.rtype(),
            covers: record.covers(),
        }
    }
}

//------------ Rrset ---------------------------------------------------------

/// All records of one type at one owner name.
///
/// An RRset has exactly one TTL and one spelling of its owner name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rrset {
    owner: Name,
    rtype: Rtype,
    covers: Option<Rtype>,
    ttl: u32,
    data: Vec<Bytes>,
}

impl Rrset {
    pub fn new(owner: Name, key: RrsetKey, ttl: u32) -> Self {
        Rrset {
            owner,
            rtype: key.rtype,
            covers: key.covers,
            ttl,
            data: Vec::new(),
        }
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    pub fn rtype(&self) -> Rtype {
        self.rtype
    }

    pub fn covers(&self) -> Option<Rtype> {
        self.covers
    }

    pub fn key(&self) -> RrsetKey {
        RrsetKey::new(self.rtype, self.covers)
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn data(&self) -> &[Bytes] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    pub fn set_owner(&mut self, owner: Name) {
        self.owner = owner;
    }

    /// Returns the position of data equal to `data` in canonical form.
    pub fn position(&self, data: &[u8]) -> Option<usize> {
        self.data
            .iter()
            .position(|item| rdata::canonical_eq(self.rtype, item, data))
    }

    pub fn contains(&self, data: &[u8]) -> bool {
        self.position(data).is_some()
    }

    /// Adds data unless it is already present.
    ///
    /// Returns whether the data was added.
    pub fn push_data(&mut self, data: Bytes) -> bool {
        if self.contains(&data) {
            return false;
        }
        self.data.push(data);
        true
    }

    /// Removes data equal to `data` in canonical form.
    ///
    /// Returns whether anything was removed.
    pub fn remove_data(&mut self, data: &[u8]) -> bool {
        match self.position(data) {
            Some(pos) => {
                self.data.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns the RRset as individual records of the given class.
    pub fn records(&self, class: Class) -> impl Iterator<Item = Record> + '_ {
        self.data.iter().map(move |data| {
            Record::new(
                self.owner.clone(),
                class,
                self.rtype,
                self.ttl,
                data.clone(),
            )
        })
    }

    /// Returns the data sorted in canonical order.
    pub fn sorted_data(&self) -> Vec<Bytes> {
        let mut res = self.data.clone();
        res.sort_by(|left, right| rdata::canonical_cmp(self.rtype, left, right));
        res
    }

    pub fn into_shared(self) -> SharedRrset {
        SharedRrset::new(self)
    }
}

//------------ SharedRrset ---------------------------------------------------

/// An RRset behind an arc.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SharedRrset(Arc<Rrset>);

impl SharedRrset {
    pub fn new(rrset: Rrset) -> Self {
        SharedRrset(Arc::new(rrset))
    }

    pub fn as_rrset(&self) -> &Rrset {
        self.0.as_ref()
    }

    /// Returns an owned copy for modification.
    pub fn to_rrset(&self) -> Rrset {
        self.0.as_ref().clone()
    }
}

//--- Deref, AsRef

impl ops::Deref for SharedRrset {
    type Target = Rrset;

    fn deref(&self) -> &Self::Target {
        self.as_rrset()
    }
}

impl AsRef<Rrset> for SharedRrset {
    fn as_ref(&self) -> &Rrset {
        self.as_rrset()
    }
}
