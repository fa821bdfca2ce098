//! The decoded shape of an update request.

use core::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::base::iana::{Class, Rcode, Rtype};
use crate::base::name::Name;
use crate::base::record::Record;

//------------ ZoneEntry -----------------------------------------------------

/// An entry of the zone section of an update.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneEntry {
    pub name: Name,
    pub class: Class,
    pub rtype: Rtype,
}

impl ZoneEntry {
    pub fn new(name: Name, class: Class) -> Self {
        ZoneEntry {
            name,
            class,
            rtype: Rtype::SOA,
        }
    }
}

//------------ UpdateRequest -------------------------------------------------

/// An update request as decoded by the message layer.
///
/// The sections hold records exactly as they appeared in the message, with
/// the class field carrying the RFC 2136 meaning.
#[derive(Clone, Debug)]
pub struct UpdateRequest {
    /// The zone section.
    pub zone: Vec<ZoneEntry>,

    /// The prerequisite section.
    pub prerequisites: Vec<Record>,

    /// The update section.
    pub updates: Vec<Record>,

    /// The identity of the key that signed the request, if any.
    pub signer: Option<Name>,

    /// The outcome of a failed signature check, if there was one.
    pub signature_error: Option<Rcode>,

    /// The address the request came from.
    pub peer: SocketAddr,

    /// Whether the request arrived over a reliable transport.
    pub tcp: bool,

    /// The request message in wire format, used when forwarding.
    pub message: Bytes,
}

impl UpdateRequest {
    /// Creates a request for a zone with empty sections.
    pub fn new(zone: Name, class: Class, peer: SocketAddr) -> Self {
        UpdateRequest {
            zone: vec![ZoneEntry::new(zone, class)],
            prerequisites: Vec::new(),
            updates: Vec::new(),
            signer: None,
            signature_error: None,
            peer,
            tcp: false,
            message: Bytes::new(),
        }
    }

    /// Returns the single zone entry if the zone section is well formed.
    pub fn zone_entry(&self) -> Option<&ZoneEntry> {
        match self.zone.as_slice() {
            [entry] if entry.rtype == Rtype::SOA => Some(entry),
            _ => None,
        }
    }
}

//------------ TransactionContext --------------------------------------------

/// What every log line of an update transaction mentions.
#[derive(Clone, Debug)]
pub struct TransactionContext {
    pub zone: Name,
    pub class: Class,
    pub peer: SocketAddr,
    pub signer: Option<Name>,
}

impl TransactionContext {
    pub fn new(zone: Name, class: Class, request: &UpdateRequest) -> Self {
        TransactionContext {
            zone,
            class,
            peer: request.peer,
            signer: request.signer.clone(),
        }
    }
}

impl fmt::Display for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "client {}", self.peer)?;
        if let Some(signer) = &self.signer {
            write!(f, " key {}", signer)?;
        }
        write!(f, ": updating zone '{}/{}'", self.zone, self.class)
    }
}
