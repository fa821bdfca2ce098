//! IANA Definitions for DNS.
//!
//! This module contains types for the parameters defined in IANA
//! registries that the update processor needs to look at.
//!
//! All types defined hereunder follow the same basic structure. They are
//! newtypes over the raw integer with associated constants for all
//! well-defined values. There are two methods `from_int()` and `to_int()`
//! to convert from and to raw integer values as well as implementations of
//! the `From` trait for these. `FromStr` and `Display` are implemented to
//! convert from the string codes to the values and back.

use core::fmt;

pub use self::class::Class;
pub use self::rcode::Rcode;
pub use self::rtype::Rtype;

#[macro_use]
mod macros;

pub mod class;
pub mod rcode;
pub mod rtype;

//------------ FromStrError --------------------------------------------------

/// A mnemonic could not be translated into a value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FromStrError(pub(crate) ());

impl fmt::Display for FromStrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("unknown mnemonic")
    }
}

impl std::error::Error for FromStrError {}
