//! Basics.
//!
//! This module provides the types the update processor uses to talk about
//! DNS data: domain names, the IANA parameter types, serial numbers and
//! resource records together with typed views of the record data it needs
//! to look into.
//!
//! Wire-format message parsing is left to the embedding server. Everything
//! here operates on already decoded, uncompressed data.

pub use self::iana::{Class, Rcode, Rtype};
pub use self::name::Name;
pub use self::record::Record;
pub use self::serial::Serial;

pub mod iana;
pub mod name;
pub mod rdata;
pub mod record;
pub mod serial;
