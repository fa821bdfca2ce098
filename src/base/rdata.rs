//! Typed views of record data.
//!
//! Records travel through the update processor with their data in
//! uncompressed wire format. Most of the time the processor does not care
//! about the content, but for a handful of record types it needs to look
//! inside: the serial of an SOA, the target of a PTR or SRV record, the key
//! tag of an RRSIG, the flags of an NSEC3PARAM and so on. This module
//! provides just enough parsing and composing for these types plus the
//! canonical comparison of record data used when sorting RRsets.

use core::cmp::Ordering;
use core::fmt;
use std::borrow::Cow;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, Bytes, BytesMut};
use ring::digest;

use super::iana::Rtype;
use super::name::{Name, NameError};
use super::serial::Serial;

//------------ Soa -----------------------------------------------------------

/// The data of an SOA record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Soa {
    mname: Name,
    rname: Name,
    serial: Serial,
    refresh: u32,
    retry: u32,
    expire: u32,
    minimum: u32,
}

impl Soa {
    pub fn new(
        mname: Name,
        rname: Name,
        serial: Serial,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    ) -> Self {
        Soa {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, RdataError> {
        let (mname, pos) = Name::parse_prefix(data)?;
        let (rname, len) = Name::parse_prefix(&data[pos..])?;
        let mut parser = Parser::new(&data[pos + len..]);
        let res = Soa {
            mname,
            rname,
            serial: Serial(parser.u32()?),
            refresh: parser.u32()?,
            retry: parser.u32()?,
            expire: parser.u32()?,
            minimum: parser.u32()?,
        };
        parser.finish()?;
        Ok(res)
    }

    pub fn compose(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(self.mname.as_slice());
        buf.put_slice(self.rname.as_slice());
        buf.put_u32(self.serial.into_int());
        buf.put_u32(self.refresh);
        buf.put_u32(self.retry);
        buf.put_u32(self.expire);
        buf.put_u32(self.minimum);
        buf.freeze()
    }

    pub fn mname(&self) -> &Name {
        &self.mname
    }

    pub fn rname(&self) -> &Name {
        &self.rname
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn minimum(&self) -> u32 {
        self.minimum
    }

    /// Returns a copy with the serial replaced.
    #[must_use]
    pub fn with_serial(mut self, serial: Serial) -> Self {
        self.serial = serial;
        self
    }
}

//------------ Rrsig ---------------------------------------------------------

/// The parts of an RRSIG record the update processor looks at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rrsig {
    type_covered: Rtype,
    algorithm: u8,
    key_tag: u16,
}

impl Rrsig {
    pub fn parse(data: &[u8]) -> Result<Self, RdataError> {
        if data.len() < 18 {
            return Err(RdataError::ShortInput);
        }
        Ok(Rrsig {
            type_covered: Rtype::from_int(u16::from_be_bytes([
                data[0], data[1],
            ])),
            algorithm: data[2],
            key_tag: u16::from_be_bytes([data[16], data[17]]),
        })
    }

    pub fn type_covered(&self) -> Rtype {
        self.type_covered
    }

    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }
}

//------------ Nsec3param ----------------------------------------------------

/// The data of an NSEC3PARAM record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nsec3param {
    hash_algorithm: u8,
    flags: u8,
    iterations: u16,
    salt: Bytes,
}

impl Nsec3param {
    /// The opt-out flag.
    pub const OPTOUT: u8 = 0x01;

    pub fn new(
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Bytes,
    ) -> Self {
        Nsec3param {
            hash_algorithm,
            flags,
            iterations,
            salt,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, RdataError> {
        let mut parser = Parser::new(data);
        let hash_algorithm = parser.u8()?;
        let flags = parser.u8()?;
        let iterations = parser.u16()?;
        let salt_len = usize::from(parser.u8()?);
        let salt = Bytes::copy_from_slice(parser.slice(salt_len)?);
        parser.finish()?;
        Ok(Nsec3param {
            hash_algorithm,
            flags,
            iterations,
            salt,
        })
    }

    pub fn compose(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5 + self.salt.len());
        buf.put_u8(self.hash_algorithm);
        buf.put_u8(self.flags);
        buf.put_u16(self.iterations);
        buf.put_u8(self.salt.len() as u8);
        buf.put_slice(&self.salt);
        buf.freeze()
    }

    pub fn hash_algorithm(&self) -> u8 {
        self.hash_algorithm
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    pub fn salt(&self) -> &Bytes {
        &self.salt
    }

    /// Compares the wire data of two NSEC3PARAM records ignoring the flags.
    pub fn eq_ignoring_flags(left: &[u8], right: &[u8]) -> bool {
        left.len() == right.len()
            && left.len() >= 4
            && left[0] == right[0]
            && left[2..] == right[2..]
    }
}

//------------ Dnskey --------------------------------------------------------

/// The data of a DNSKEY or CDNSKEY record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dnskey {
    flags: u16,
    protocol: u8,
    algorithm: u8,
    public_key: Bytes,
}

impl Dnskey {
    /// The zone key flag.
    pub const ZONE_KEY: u16 = 0x0100;

    pub fn new(
        flags: u16,
        protocol: u8,
        algorithm: u8,
        public_key: Bytes,
    ) -> Self {
        Dnskey {
            flags,
            protocol,
            algorithm,
            public_key,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, RdataError> {
        let mut parser = Parser::new(data);
        Ok(Dnskey {
            flags: parser.u16()?,
            protocol: parser.u8()?,
            algorithm: parser.u8()?,
            public_key: Bytes::copy_from_slice(parser.rest()),
        })
    }

    pub fn compose(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.public_key.len());
        buf.put_u16(self.flags);
        buf.put_u8(self.protocol);
        buf.put_u8(self.algorithm);
        buf.put_slice(&self.public_key);
        buf.freeze()
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    pub fn public_key(&self) -> &Bytes {
        &self.public_key
    }

    /// Returns whether this is the CDNSKEY form asking for DS removal.
    pub fn is_delete(&self) -> bool {
        self.flags == 0
            && self.protocol == 3
            && self.algorithm == 0
            && self.public_key.as_ref() == [0]
    }

    /// Calculates the key tag of DNSKEY wire data.
    ///
    /// See appendix B of [RFC 4034].
    ///
    /// [RFC 4034]: https://tools.ietf.org/html/rfc4034
    pub fn key_tag(data: &[u8]) -> u16 {
        // RSA/MD5 uses the most significant 16 bits of the modulus.
        if data.get(3) == Some(&1) {
            let len = data.len();
            if len < 4 {
                return 0;
            }
            return u16::from_be_bytes([data[len - 3], data[len - 2]]);
        }
        let mut res = 0u32;
        for (i, &octet) in data.iter().enumerate() {
            if i & 1 == 0 {
                res += u32::from(octet) << 8;
            } else {
                res += u32::from(octet);
            }
        }
        res += (res >> 16) & 0xFFFF;
        (res & 0xFFFF) as u16
    }

    /// Returns whether `algorithm` can only be used with NSEC.
    pub fn is_nsec_only_algorithm(algorithm: u8) -> bool {
        // RSAMD5, DSA, RSASHA1.
        matches!(algorithm, 1 | 3 | 5)
    }
}

//------------ Ds ------------------------------------------------------------

/// The data of a DS or CDS record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ds {
    key_tag: u16,
    algorithm: u8,
    digest_type: u8,
    digest: Bytes,
}

impl Ds {
    pub fn new(
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Bytes,
    ) -> Self {
        Ds {
            key_tag,
            algorithm,
            digest_type,
            digest,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, RdataError> {
        let mut parser = Parser::new(data);
        Ok(Ds {
            key_tag: parser.u16()?,
            algorithm: parser.u8()?,
            digest_type: parser.u8()?,
            digest: Bytes::copy_from_slice(parser.rest()),
        })
    }

    pub fn compose(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.digest.len());
        buf.put_u16(self.key_tag);
        buf.put_u8(self.algorithm);
        buf.put_u8(self.digest_type);
        buf.put_slice(&self.digest);
        buf.freeze()
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    pub fn digest_type(&self) -> u8 {
        self.digest_type
    }

    pub fn digest(&self) -> &Bytes {
        &self.digest
    }

    /// Creates the DS record for a key.
    ///
    /// Returns `None` if the digest type is not supported.
    pub fn for_key(owner: &Name, dnskey: &[u8], digest_type: u8) -> Option<Self> {
        let algorithm = match digest_type {
            1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            2 => &digest::SHA256,
            4 => &digest::SHA384,
            _ => return None,
        };
        let mut buf = Vec::with_capacity(owner.len() + dnskey.len());
        buf.extend_from_slice(owner.to_lowercase().as_slice());
        buf.extend_from_slice(dnskey);
        Some(Ds {
            key_tag: Dnskey::key_tag(dnskey),
            algorithm: *dnskey.get(3)?,
            digest_type,
            digest: Bytes::copy_from_slice(
                digest::digest(algorithm, &buf).as_ref(),
            ),
        })
    }

    /// Returns whether this is the CDS form asking for DS removal.
    pub fn is_delete(&self) -> bool {
        self.key_tag == 0
            && self.algorithm == 0
            && self.digest_type == 0
            && self.digest.as_ref() == [0]
    }
}

//------------ Embedded names ------------------------------------------------

/// Returns the target name of record types that point at another name.
///
/// This is the name in NS, CNAME, DNAME and PTR records, the exchange of
/// an MX record and the target of an SRV record.
pub fn target_name(rtype: Rtype, data: &[u8]) -> Option<Name> {
    let offset = match rtype {
        Rtype::NS | Rtype::CNAME | Rtype::DNAME | Rtype::PTR => 0,
        Rtype::MX => 2,
        Rtype::SRV => 6,
        _ => return None,
    };
    let (name, len) = Name::parse_prefix(data.get(offset..)?).ok()?;
    if offset + len != data.len() {
        return None;
    }
    Some(name)
}

/// Returns whether SVCB or HTTPS record data is acceptable.
///
/// A priority of 0 selects the alias form which must not carry any
/// service parameters.
pub fn svcb_is_valid(data: &[u8]) -> bool {
    let Some(target) = data.get(2..) else {
        return false;
    };
    let Ok(len) = Name::check_wire(target) else {
        return false;
    };
    let priority = u16::from_be_bytes([data[0], data[1]]);
    priority != 0 || target.len() == len
}

/// Returns the ranges of the embedded names in canonical-form types.
fn name_ranges(rtype: Rtype, data: &[u8]) -> Option<Vec<(usize, usize)>> {
    let (first, count) = match rtype {
        Rtype::NS
        | Rtype::MD
        | Rtype::MF
        | Rtype::CNAME
        | Rtype::MB
        | Rtype::MG
        | Rtype::MR
        | Rtype::PTR
        | Rtype::DNAME => (0, 1),
        Rtype::SOA | Rtype::MINFO | Rtype::RP => (0, 2),
        Rtype::MX | Rtype::AFSDB | Rtype::KX => (2, 1),
        Rtype::SRV => (6, 1),
        _ => return Some(Vec::new()),
    };
    let mut res = Vec::with_capacity(count);
    let mut pos = first;
    for _ in 0..count {
        let len = Name::check_wire(data.get(pos..)?).ok()?;
        res.push((pos, pos + len));
        pos += len;
    }
    Some(res)
}

/// Returns the canonical form of record data.
///
/// Embedded domain names of the well-known types are lowercased. Label
/// length octets never fall into the range of ASCII capitals, so the name
/// ranges can be lowercased wholesale.
pub fn canonical_form(rtype: Rtype, data: &[u8]) -> Cow<'_, [u8]> {
    if !rtype.has_canonical_names() {
        return Cow::Borrowed(data);
    }
    match name_ranges(rtype, data) {
        Some(ranges) if ranges.iter().any(|&(start, end)| {
            data[start..end].iter().any(u8::is_ascii_uppercase)
        }) =>
        {
            let mut res = data.to_vec();
            for (start, end) in ranges {
                res[start..end].make_ascii_lowercase();
            }
            Cow::Owned(res)
        }
        _ => Cow::Borrowed(data),
    }
}

/// Compares record data in canonical order.
pub fn canonical_cmp(rtype: Rtype, left: &[u8], right: &[u8]) -> Ordering {
    canonical_form(rtype, left).cmp(&canonical_form(rtype, right))
}

/// Returns whether two record data are equal in canonical form.
pub fn canonical_eq(rtype: Rtype, left: &[u8], right: &[u8]) -> bool {
    canonical_cmp(rtype, left, right) == Ordering::Equal
}

//------------ Builders ------------------------------------------------------

/// Returns the data of an A record.
pub fn a(addr: Ipv4Addr) -> Bytes {
    Bytes::copy_from_slice(&addr.octets())
}

/// Returns the data of an AAAA record.
pub fn aaaa(addr: Ipv6Addr) -> Bytes {
    Bytes::copy_from_slice(&addr.octets())
}

/// Returns the data of a record consisting of a single name.
pub fn name(name: &Name) -> Bytes {
    name.as_octets().clone()
}

/// Returns the data of an MX record.
pub fn mx(preference: u16, exchange: &Name) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + exchange.len());
    buf.put_u16(preference);
    buf.put_slice(exchange.as_slice());
    buf.freeze()
}

/// Returns the data of an SRV record.
pub fn srv(priority: u16, weight: u16, port: u16, target: &Name) -> Bytes {
    let mut buf = BytesMut::with_capacity(6 + target.len());
    buf.put_u16(priority);
    buf.put_u16(weight);
    buf.put_u16(port);
    buf.put_slice(target.as_slice());
    buf.freeze()
}

/// Returns the data of an SVCB or HTTPS record.
///
/// `params` are the service parameters in wire format.
pub fn svcb(priority: u16, target: &Name, params: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + target.len() + params.len());
    buf.put_u16(priority);
    buf.put_slice(target.as_slice());
    buf.put_slice(params);
    buf.freeze()
}

/// Returns the data of a TXT record with a single character string.
pub fn txt(text: &str) -> Bytes {
    let mut buf = BytesMut::new();
    for chunk in text.as_bytes().chunks(255) {
        buf.put_u8(chunk.len() as u8);
        buf.put_slice(chunk);
    }
    if text.is_empty() {
        buf.put_u8(0);
    }
    buf.freeze()
}

//------------ RdataDisplay --------------------------------------------------

/// Displays record data in presentation format.
///
/// Types without a dedicated format are shown in the generic format of
/// [RFC 3597].
///
/// [RFC 3597]: https://tools.ietf.org/html/rfc3597
pub struct RdataDisplay<'a> {
    rtype: Rtype,
    data: &'a [u8],
}

impl<'a> RdataDisplay<'a> {
    pub fn new(rtype: Rtype, data: &'a [u8]) -> Self {
        RdataDisplay { rtype, data }
    }

    fn generic(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\\# {}", self.data.len())?;
        if !self.data.is_empty() {
            f.write_str(" ")?;
            for octet in self.data {
                write!(f, "{:02x}", octet)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for RdataDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.rtype {
            Rtype::A => match <[u8; 4]>::try_from(self.data) {
                Ok(octets) => write!(f, "{}", Ipv4Addr::from(octets)),
                Err(_) => self.generic(f),
            },
            Rtype::AAAA => match <[u8; 16]>::try_from(self.data) {
                Ok(octets) => write!(f, "{}", Ipv6Addr::from(octets)),
                Err(_) => self.generic(f),
            },
            Rtype::NS | Rtype::CNAME | Rtype::DNAME | Rtype::PTR => {
                match target_name(self.rtype, self.data) {
                    Some(name) => write!(f, "{}", name),
                    None => self.generic(f),
                }
            }
            Rtype::MX if self.data.len() > 2 => {
                match target_name(self.rtype, self.data) {
                    Some(name) => write!(
                        f,
                        "{} {}",
                        u16::from_be_bytes([self.data[0], self.data[1]]),
                        name
                    ),
                    None => self.generic(f),
                }
            }
            Rtype::SOA => match Soa::parse(self.data) {
                Ok(soa) => write!(
                    f,
                    "{} {} {} {} {} {} {}",
                    soa.mname,
                    soa.rname,
                    soa.serial,
                    soa.refresh,
                    soa.retry,
                    soa.expire,
                    soa.minimum
                ),
                Err(_) => self.generic(f),
            },
            _ => self.generic(f),
        }
    }
}

//------------ Parser --------------------------------------------------------

/// A minimal cursor over record data.
struct Parser<'a> {
    data: &'a [u8],
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Parser { data }
    }

    fn slice(&mut self, len: usize) -> Result<&'a [u8], RdataError> {
        if self.data.len() < len {
            return Err(RdataError::ShortInput);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, RdataError> {
        self.slice(1).map(|s| s[0])
    }

    fn u16(&mut self) -> Result<u16, RdataError> {
        self.slice(2).map(|s| u16::from_be_bytes([s[0], s[1]]))
    }

    fn u32(&mut self) -> Result<u32, RdataError> {
        self.slice(4).map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let res = self.data;
        self.data = &[];
        res
    }

    fn finish(&self) -> Result<(), RdataError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(RdataError::TrailingData)
        }
    }
}

//------------ RdataError ----------------------------------------------------

/// Record data could not be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RdataError {
    /// The data ended too early.
    ShortInput,

    /// There was data left after parsing.
    TrailingData,

    /// An embedded name was invalid.
    Name(NameError),
}

impl From<NameError> for RdataError {
    fn from(err: NameError) -> Self {
        RdataError::Name(err)
    }
}

impl fmt::Display for RdataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RdataError::ShortInput => f.write_str("short record data"),
            RdataError::TrailingData => {
                f.write_str("trailing data in record data")
            }
            RdataError::Name(err) => write!(f, "bad embedded name: {}", err),
        }
    }
}

impl std::error::Error for RdataError {}

//============ Testing =======================================================
