//! Domain names.
//!
//! The update processor only ever deals with absolute names taken out of
//! a decoded message or a zone database. [`Name`] keeps such a name in its
//! uncompressed wire format, preserving the case of the labels as they were
//! given. Comparison and hashing ignore ASCII case, as the DNS does, while
//! [`Name::eq_case`] is available where the exact spelling matters.

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use core::str::FromStr;
use core::{fmt, str};

use bytes::{BufMut, Bytes, BytesMut};

//------------ Name ----------------------------------------------------------

/// An absolute domain name in uncompressed wire format.
#[derive(Clone)]
pub struct Name {
    octets: Bytes,
}

impl Name {
    /// The maximum length of a name in wire format.
    pub const MAX_LEN: usize = 255;

    /// The maximum length of a single label.
    pub const MAX_LABEL_LEN: usize = 63;

    /// Returns the root name.
    #[must_use]
    pub fn root() -> Self {
        Name {
            octets: Bytes::from_static(b"\0"),
        }
    }

    /// Creates a name from its uncompressed wire format.
    ///
    /// The octets must contain exactly one complete name.
    pub fn from_wire(octets: Bytes) -> Result<Self, NameError> {
        let len = Self::check_wire(&octets)?;
        if len != octets.len() {
            return Err(NameError::TrailingData);
        }
        Ok(Name { octets })
    }

    /// Parses a name at the start of `data`.
    ///
    /// Returns the name and the number of octets it occupied. Compression
    /// pointers are rejected since RDATA handed to the update processor is
    /// always uncompressed.
    pub fn parse_prefix(data: &[u8]) -> Result<(Self, usize), NameError> {
        let len = Self::check_wire(data)?;
        Ok((
            Name {
                octets: Bytes::copy_from_slice(&data[..len]),
            },
            len,
        ))
    }

    /// Checks the name at the start of `data`, returning its length.
    pub(crate) fn check_wire(data: &[u8]) -> Result<usize, NameError> {
        let mut pos = 0;
        loop {
            let len = match data.get(pos) {
                Some(len) => usize::from(*len),
                None => return Err(NameError::ShortInput),
            };
            if len > Self::MAX_LABEL_LEN {
                return Err(NameError::BadLabel);
            }
            pos += 1 + len;
            if pos > Self::MAX_LEN {
                return Err(NameError::LongName);
            }
            if pos > data.len() {
                return Err(NameError::ShortInput);
            }
            if len == 0 {
                return Ok(pos);
            }
        }
    }

    /// Returns the wire format octets of the name.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.octets.as_ref()
    }

    /// Returns the underlying octets.
    #[must_use]
    pub fn as_octets(&self) -> &Bytes {
        &self.octets
    }

    /// Returns the length of the wire format.
    #[must_use]
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns true if this is the root name.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.octets.len() == 1
    }

    /// Returns an iterator over the labels, leftmost first.
    ///
    /// The root label is not included.
    pub fn labels(&self) -> Labels<'_> {
        Labels {
            data: self.as_slice(),
        }
    }

    /// Returns the number of labels, not counting the root label.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Compares two names including the case of their labels.
    #[must_use]
    pub fn eq_case(&self, other: &Self) -> bool {
        self.octets == other.octets
    }

    /// Returns true if `self` is `base` or a name below it.
    #[must_use]
    pub fn is_subdomain_of(&self, base: &Name) -> bool {
        let Some(skip) = self.len().checked_sub(base.len()) else {
            return false;
        };
        // The suffix only counts if it starts on a label boundary.
        let mut pos = 0;
        while pos < skip {
            pos += 1 + usize::from(self.octets[pos]);
        }
        pos == skip
            && self.octets[skip..].eq_ignore_ascii_case(base.as_slice())
    }

    /// Returns true if the leftmost label is an asterisk.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.labels().next() == Some(&b"*"[..])
    }

    /// Returns true if there is an asterisk label other than the first one.
    ///
    /// Such names do not act as wildcards but are easily mistaken for them.
    #[must_use]
    pub fn has_internal_wildcard(&self) -> bool {
        self.labels().skip(1).any(|label| label == b"*")
    }

    /// Returns true if the name follows the host name rules of RFC 952.
    ///
    /// Every label consists of letters, digits and hyphens and neither
    /// starts nor ends with a hyphen. If `wildcard` is true, a leading
    /// asterisk label is permitted.
    #[must_use]
    pub fn is_hostname(&self, wildcard: bool) -> bool {
        let skip = usize::from(wildcard && self.is_wildcard());
        self.labels().skip(skip).all(|label| match label {
            [] => false,
            [first, .., last] if *first == b'-' || *last == b'-' => false,
            [single] if *single == b'-' => false,
            _ => label
                .iter()
                .all(|ch| ch.is_ascii_alphanumeric() || *ch == b'-'),
        })
    }

    /// Returns the name with the leftmost label removed.
    #[must_use]
    pub fn parent(&self) -> Option<Name> {
        if self.is_root() {
            return None;
        }
        let start = 1 + usize::from(self.octets[0]);
        Some(Name {
            octets: self.octets.slice(start..),
        })
    }

    /// Returns a copy of the name with all labels in lower case.
    #[must_use]
    pub fn to_lowercase(&self) -> Name {
        Name {
            octets: Bytes::from(self.octets.to_ascii_lowercase()),
        }
    }

    /// Creates a new name by prepending a label.
    pub fn prepend(&self, label: &[u8]) -> Result<Name, NameError> {
        if label.is_empty() || label.len() > Self::MAX_LABEL_LEN {
            return Err(NameError::BadLabel);
        }
        if self.len() + label.len() + 1 > Self::MAX_LEN {
            return Err(NameError::LongName);
        }
        let mut buf = BytesMut::with_capacity(self.len() + label.len() + 1);
        buf.put_u8(label.len() as u8);
        buf.put_slice(label);
        buf.put_slice(self.as_slice());
        Ok(Name {
            octets: buf.freeze(),
        })
    }
}

//--- FromStr

impl FromStr for Name {
    type Err = NameError;

    /// Parses a name in presentation format.
    ///
    /// All names are treated as absolute, so the trailing dot is optional.
    /// Escapes of the form `\X` and `\DDD` are understood.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." || s.is_empty() {
            return Ok(Name::root());
        }
        let s = s.strip_suffix('.').unwrap_or(s);
        let mut buf = BytesMut::with_capacity(s.len() + 2);
        let mut label = Vec::with_capacity(Self::MAX_LABEL_LEN);
        let mut chars = s.bytes();
        loop {
            let ch = chars.next();
            match ch {
                None | Some(b'.') => {
                    if label.is_empty() || label.len() > Self::MAX_LABEL_LEN {
                        return Err(NameError::BadLabel);
                    }
                    buf.put_u8(label.len() as u8);
                    buf.put_slice(&label);
                    label.clear();
                    if ch.is_none() {
                        break;
                    }
                }
                Some(b'\\') => {
                    let first = chars.next().ok_or(NameError::BadEscape)?;
                    if first.is_ascii_digit() {
                        let second =
                            chars.next().ok_or(NameError::BadEscape)?;
                        let third =
                            chars.next().ok_or(NameError::BadEscape)?;
                        if !second.is_ascii_digit() || !third.is_ascii_digit()
                        {
                            return Err(NameError::BadEscape);
                        }
                        let value = u32::from(first - b'0') * 100
                            + u32::from(second - b'0') * 10
                            + u32::from(third - b'0');
                        let value = u8::try_from(value)
                            .map_err(|_| NameError::BadEscape)?;
                        label.push(value);
                    } else {
                        label.push(first);
                    }
                }
                Some(ch) => label.push(ch),
            }
        }
        buf.put_u8(0);
        if buf.len() > Self::MAX_LEN {
            return Err(NameError::LongName);
        }
        Ok(Name {
            octets: buf.freeze(),
        })
    }
}

//--- PartialEq, Eq, and Hash

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for ch in self.octets.iter() {
            state.write_u8(ch.to_ascii_lowercase())
        }
    }
}

//--- PartialOrd and Ord

/// Names are ordered in canonical DNSSEC order.
///
/// See section 6.1 of [RFC 4034]: labels are compared right to left as
/// lowercased octet strings.
///
/// [RFC 4034]: https://tools.ietf.org/html/rfc4034
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        let left: Vec<_> = self.labels().collect();
        let right: Vec<_> = other.labels().collect();
        let mut left = left.into_iter().rev();
        let mut right = right.into_iter().rev();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(l), Some(r)) => {
                    let res = l
                        .iter()
                        .map(u8::to_ascii_lowercase)
                        .cmp(r.iter().map(u8::to_ascii_lowercase));
                    if res != Ordering::Equal {
                        return res;
                    }
                }
            }
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

//--- Display and Debug

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &ch in label {
                if ch == b'.' || ch == b'\\' {
                    write!(f, "\\{}", ch as char)?;
                } else if ch.is_ascii_graphic() {
                    write!(f, "{}", ch as char)?;
                } else {
                    write!(f, "\\{:03}", ch)?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

//--- Serialize and Deserialize

impl serde::Serialize for Name {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Name {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        use serde::de::Error;

        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

//------------ Labels --------------------------------------------------------

/// An iterator over the non-root labels of a name.
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.data.split_first()?;
        if len == 0 {
            return None;
        }
        let len = usize::from(len);
        let (label, rest) = rest.split_at(len);
        self.data = rest;
        Some(label)
    }
}

//------------ NameError -----------------------------------------------------

/// A name could not be created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameError {
    /// A label was empty or longer than 63 octets.
    BadLabel,

    /// The name was longer than 255 octets.
    LongName,

    /// The input ended in the middle of the name.
    ShortInput,

    /// There was data after the end of the name.
    TrailingData,

    /// An escape sequence was malformed.
    BadEscape,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            NameError::BadLabel => "illegal label",
            NameError::LongName => "name too long",
            NameError::ShortInput => "unexpected end of input",
            NameError::TrailingData => "trailing data after name",
            NameError::BadEscape => "illegal escape sequence",
        })
    }
}

impl std::error::Error for NameError {}

//============ Testing =======================================================
