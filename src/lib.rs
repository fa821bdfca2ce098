//! Dynamic update processing for authoritative DNS zones.
//!
//! This crate implements the server side of DNS UPDATE ([RFC 2136]) for
//! zones held in a versioned zone database. It takes update requests that
//! an embedding server has already decoded and authenticated, decides
//! whether they may and can be applied, applies them as a single
//! transaction and records every change in a journal.
//!
//! # Modules
//!
//! * [base] contains the basic types the processor talks about: domain
//!   names, the IANA parameter types, serial numbers, records and typed
//!   views of the record data it needs to look into.
//! * [zonetree] defines the [`ZoneDatabase`] trait through which zone
//!   data is read and changed, together with an in-memory implementation.
//! * [update] is the update processor proper. Its [`process`] function
//!   runs one update transaction for a primary zone.
//! * [journal] stores the changes of committed transactions.
//! * [dispatch] is the asynchronous front end. It enforces the update
//!   quota, serializes transactions per zone and forwards updates received
//!   for secondary zones to the primary.
//! * [config] holds the server and zone settings.
//!
//! Message parsing, TSIG verification and the transport of messages are
//! left to the embedding server. So is signing: the processor keeps the
//! signing state records of a zone consistent but does not create
//! signatures itself.
//!
//! # Logging
//!
//! The crate logs through [tracing]. Every line logged while processing
//! a transaction names the client and the zone.
//!
//! [RFC 2136]: https://tools.ietf.org/html/rfc2136
//! [`ZoneDatabase`]: crate::zonetree::ZoneDatabase
//! [`process`]: crate::update::process
//! [tracing]: https://docs.rs/tracing

#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod base;
pub mod config;
pub mod dispatch;
pub mod journal;
pub mod update;
pub mod zonetree;
