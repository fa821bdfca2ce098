//! Resource records.

use core::fmt;

use bytes::Bytes;

use super::iana::{Class, Rtype};
use super::name::Name;
use super::rdata::{self, RdataDisplay};

//------------ Record --------------------------------------------------------

/// A DNS resource record.
///
/// The record data is kept in uncompressed wire format. A record is
/// immutable once created. The few places that need a different TTL or
/// owner spelling create a new record via [`Record::with_ttl`] or
/// [`Record::with_owner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    owner: Name,
    class: Class,
    rtype: Rtype,
    ttl: u32,
    data: Bytes,
}

impl Record {
    /// Creates a new record from its parts.
    pub fn new(
        owner: Name,
        class: Class,
        rtype: Rtype,
        ttl: u32,
        data: Bytes,
    ) -> Self {
        Record {
            owner,
            class,
            rtype,
            ttl,
            data,
        }
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn rtype(&self) -> Rtype {
        self.rtype
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the type covered by an RRSIG record.
    ///
    /// For all other types, this is `None`.
    pub fn covers(&self) -> Option<Rtype> {
        if self.rtype == Rtype::RRSIG {
            rdata::Rrsig::parse(&self.data)
                .ok()
                .map(|sig| sig.type_covered())
        } else {
            None
        }
    }

    /// Returns a copy of the record with a different TTL.
    #[must_use]
    pub fn with_ttl(&self, ttl: u32) -> Self {
        Record {
            ttl,
            ..self.clone()
        }
    }

    /// Returns a copy of the record with a differently spelled owner.
    #[must_use]
    pub fn with_owner(&self, owner: Name) -> Self {
        Record {
            owner,
            ..self.clone()
        }
    }

    /// Returns a copy of the record with a different class.
    #[must_use]
    pub fn with_class(&self, class: Class) -> Self {
        Record {
            class,
            ..self.clone()
        }
    }

    /// Returns whether two records are identical including name case.
    pub fn eq_exact(&self, other: &Self) -> bool {
        self.owner.eq_case(&other.owner)
            && self.rtype == other.rtype
            && self.ttl == other.ttl
            && self.data == other.data
    }
}

//--- Display

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.owner,
            self.ttl,
            self.class,
            self.rtype,
            RdataDisplay::new(self.rtype, &self.data)
        )
    }
}
