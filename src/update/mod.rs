//! Dynamic update processing.
//!
//! This module implements the server side of DNS UPDATE as described in
//! [RFC 2136]: given an already decoded update request for a zone this
//! server is primary for, it checks the request, evaluates the
//! prerequisites, applies the update section to a new version of the zone
//! and commits that version together with a journal entry.
//!
//! The entry point is [`process`]. It runs synchronously and expects to be
//! the only writer of the zone while it runs. The [`dispatch`] module
//! provides the asynchronous front end that serializes updates per zone
//! and forwards updates received by secondaries.
//!
//! The submodules hold the individual stages. They are public so that
//! embedders can reuse them, for instance to evaluate prerequisites
//! without updating anything.
//!
//! [RFC 2136]: https://tools.ietf.org/html/rfc2136
//! [`dispatch`]: crate::dispatch

pub mod chain;
pub mod checks;
pub mod conflict;
pub mod diff;
pub mod error;
pub mod exists;
pub mod pipeline;
pub mod policy;
pub mod prereq;
pub mod request;
pub mod zone;

pub use self::diff::{Diff, DiffOp, DiffTuple};
pub use self::error::UpdateError;
pub use self::pipeline::process;
pub use self::policy::{Acl, PolicyTable};
pub use self::request::{TransactionContext, UpdateRequest, ZoneEntry};
pub use self::zone::{Zone, ZoneKind};
