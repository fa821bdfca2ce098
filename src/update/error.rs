//! Update processing errors.

use std::fmt::Display;

use crate::base::iana::{Rcode, Rtype};
use crate::base::name::Name;
use crate::journal::JournalError;
use crate::zonetree::DbError;

//------------ UpdateError ---------------------------------------------------

/// The reason an update was not applied.
///
/// Every variant maps to exactly one response code via
/// [`UpdateError::rcode`], except [`UpdateError::Drop`] for which no
/// response is sent at all.
#[derive(Clone, Debug)]
pub enum UpdateError {
    /// The request was malformed.
    FormErr(&'static str),

    /// A name in the request is not in the zone.
    NotZone(Name),

    /// The server is not authoritative for the zone.
    NotAuth,

    /// The request cannot be handled for this zone.
    NotImp,

    /// The update was refused.
    Refused(String),

    /// A name that ought to exist does not.
    NxDomain(Name),

    /// A name that ought not to exist does.
    YxDomain(Name),

    /// An RRset that ought to exist does not or has other content.
    NxRrset(Name, Rtype),

    /// An RRset that ought not to exist does.
    YxRrset(Name, Rtype),

    /// The resulting zone would hold more records than permitted.
    TooManyRecords { count: usize, max: usize },

    /// The zone database failed.
    Db(DbError),

    /// Writing the journal failed.
    Journal(JournalError),

    /// Any other internal failure.
    ServFail(&'static str),

    /// The request is dropped without a response.
    Drop,
}

impl UpdateError {
    /// Returns the response code for this error.
    ///
    /// Returns `None` if no response should be sent.
    pub fn rcode(&self) -> Option<Rcode> {
        Some(match self {
            UpdateError::FormErr(_) => Rcode::FORMERR,
            UpdateError::NotZone(_) => Rcode::NOTZONE,
            UpdateError::NotAuth => Rcode::NOTAUTH,
            UpdateError::NotImp => Rcode::NOTIMP,
            UpdateError::Refused(_) => Rcode::REFUSED,
            UpdateError::NxDomain(_) => Rcode::NXDOMAIN,
            UpdateError::YxDomain(_) => Rcode::YXDOMAIN,
            UpdateError::NxRrset(..) => Rcode::NXRRSET,
            UpdateError::YxRrset(..) => Rcode::YXRRSET,
            UpdateError::TooManyRecords { .. } => Rcode::REFUSED,
            UpdateError::Db(_)
            | UpdateError::Journal(_)
            | UpdateError::ServFail(_) => Rcode::SERVFAIL,
            UpdateError::Drop => return None,
        })
    }

    /// Returns whether this is an internal failure rather than a verdict.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            UpdateError::Db(_)
                | UpdateError::Journal(_)
                | UpdateError::ServFail(_)
        )
    }

    pub(crate) fn refused(msg: impl Into<String>) -> Self {
        UpdateError::Refused(msg.into())
    }
}

//--- From

impl From<DbError> for UpdateError {
    fn from(err: DbError) -> Self {
        UpdateError::Db(err)
    }
}

impl From<JournalError> for UpdateError {
    fn from(err: JournalError) -> Self {
        UpdateError::Journal(err)
    }
}

//--- Display and Error

impl Display for UpdateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UpdateError::FormErr(msg) => write!(f, "format error: {msg}"),
            UpdateError::NotZone(name) => {
                write!(f, "update RR is outside zone: {name}")
            }
            UpdateError::NotAuth => write!(f, "not authoritative for zone"),
            UpdateError::NotImp => {
                write!(f, "update forwarding not configured")
            }
            UpdateError::Refused(msg) => write!(f, "refused: {msg}"),
            UpdateError::NxDomain(name) => {
                write!(f, "'{name}' does not exist")
            }
            UpdateError::YxDomain(name) => write!(f, "'{name}' exists"),
            UpdateError::NxRrset(name, rtype) => {
                write!(f, "'{name}/{rtype}' unsatisfied prerequisites")
            }
            UpdateError::YxRrset(name, rtype) => {
                write!(f, "'{name}/{rtype}' exists")
            }
            UpdateError::TooManyRecords { count, max } => write!(
                f,
                "records in zone ({count}) exceeds max-records ({max})"
            ),
            UpdateError::Db(err) => write!(f, "database error: {err}"),
            UpdateError::Journal(err) => write!(f, "journal error: {err}"),
            UpdateError::ServFail(msg) => write!(f, "server failure: {msg}"),
            UpdateError::Drop => write!(f, "request dropped"),
        }
    }
}

impl std::error::Error for UpdateError {}
