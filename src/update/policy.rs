//! Update authorization.
//!
//! A zone may carry a [`PolicyTable`] deciding per record who may change
//! what. Each [`PolicyRule`] grants or denies changes to a set of owner
//! names and record types to a set of signing identities, optionally
//! limited to certain client addresses. Rules are tried in order and the
//! first one that matches decides.
//!
//! Zones without a policy table fall back to a plain address [`Acl`].

use core::fmt;
use core::str::FromStr;
use std::net::{IpAddr, SocketAddr};

use serde::Deserialize;

use crate::base::iana::Rtype;
use crate::base::name::Name;

//------------ Acl -----------------------------------------------------------

/// An address match list.
///
/// The elements are tried in order. The first element matching an address
/// decides: positive elements allow the address, negated elements deny it.
/// An address matching no element is denied.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Acl {
    elements: Vec<AclElement>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct AclElement {
    negated: bool,
    kind: AclKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum AclKind {
    Any,
    None,
    Prefix(IpAddr, u8),
}

impl Acl {
    /// Returns an ACL allowing every address.
    pub fn any() -> Self {
        Acl {
            elements: vec![AclElement {
                negated: false,
                kind: AclKind::Any,
            }],
        }
    }

    /// Returns an ACL allowing no address.
    pub fn none() -> Self {
        Acl::default()
    }

    /// Parses an ACL from its elements.
    pub fn parse<'a>(
        items: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, AclParseError> {
        Ok(Acl {
            elements: items
                .into_iter()
                .map(AclElement::from_str)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Returns whether the ACL allows `addr`.
    pub fn allows(&self, addr: IpAddr) -> bool {
        self.elements
            .iter()
            .find(|element| element.kind.matches(addr))
            .map(|element| !element.negated)
            .unwrap_or(false)
    }
}

impl AclKind {
    fn matches(self, addr: IpAddr) -> bool {
        match self {
            AclKind::Any => true,
            AclKind::None => false,
            AclKind::Prefix(prefix, len) => prefix_matches(prefix, len, addr),
        }
    }
}

fn prefix_matches(prefix: IpAddr, len: u8, addr: IpAddr) -> bool {
    let addr = match (prefix, addr) {
        (IpAddr::V4(_), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => return false,
        },
        _ => addr,
    };
    match (prefix, addr) {
        (IpAddr::V4(prefix), IpAddr::V4(addr)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0);
            u32::from(prefix) & mask == u32::from(addr) & mask
        }
        (IpAddr::V6(prefix), IpAddr::V6(addr)) => {
            let mask =
                u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0);
            u128::from(prefix) & mask == u128::from(addr) & mask
        }
        _ => false,
    }
}

//--- FromStr

impl FromStr for AclElement {
    type Err = AclParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negated, s) = match s.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, s),
        };
        let kind = if s.eq_ignore_ascii_case("any") {
            AclKind::Any
        } else if s.eq_ignore_ascii_case("none") {
            AclKind::None
        } else {
            let (addr, len) = match s.split_once('/') {
                Some((addr, len)) => (
                    addr,
                    Some(
                        len.parse::<u8>()
                            .map_err(|_| AclParseError::BadPrefix(s.into()))?,
                    ),
                ),
                None => (s, None),
            };
            let addr = IpAddr::from_str(addr)
                .map_err(|_| AclParseError::BadAddress(s.into()))?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            let len = len.unwrap_or(max);
            if len > max {
                return Err(AclParseError::BadPrefix(s.into()));
            }
            AclKind::Prefix(addr, len)
        };
        Ok(AclElement { negated, kind })
    }
}

//--- Deserialize

impl<'de> serde::Deserialize<'de> for Acl {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        Acl::parse(items.iter().map(String::as_str))
            .map_err(serde::de::Error::custom)
    }
}

//------------ AclParseError -------------------------------------------------

/// An ACL element could not be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AclParseError {
    BadAddress(String),
    BadPrefix(String),
}

impl fmt::Display for AclParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AclParseError::BadAddress(s) => {
                write!(f, "invalid address in ACL: '{s}'")
            }
            AclParseError::BadPrefix(s) => {
                write!(f, "invalid prefix length in ACL: '{s}'")
            }
        }
    }
}

impl std::error::Error for AclParseError {}

//------------ MatchType -----------------------------------------------------

/// How a rule's name relates to the owner name of a record.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    /// The owner is the rule's name.
    Name,

    /// The owner is the rule's name or below it.
    Subdomain,

    /// The rule's name is a wildcard and the owner is covered by it.
    Wildcard,

    /// The owner is anywhere in the zone.
    Zonesub,

    /// The owner is the signer's identity.
    #[serde(rename = "self")]
    SelfName,

    /// The owner is the signer's identity or below it.
    Selfsub,

    /// The owner is strictly below the signer's identity.
    Selfwild,

    /// The owner is the reverse-mapping name of the client address.
    ///
    /// Only applies to requests received over TCP and does not require a
    /// signature.
    TcpSelf,

    /// The target of a PTR or SRV record is the signer's identity.
    Selftarget,
}

impl MatchType {
    fn needs_signer(self) -> bool {
        !matches!(self, MatchType::TcpSelf)
    }
}

//------------ TypeLimit -----------------------------------------------------

/// A record type a rule applies to, with an optional record limit.
///
/// Written as the type mnemonic, optionally followed by the maximum
/// number of records in parentheses, e.g. `"A(4)"`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TypeLimit {
    pub rtype: Rtype,

    /// The maximum number of records of the type at a name, 0 for no
    /// limit.
    pub max: u32,
}

impl FromStr for TypeLimit {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rtype, max) = match s.split_once('(') {
            Some((rtype, rest)) => {
                let max = rest
                    .strip_suffix(')')
                    .and_then(|max| max.parse().ok())
                    .ok_or_else(|| PolicyParseError(s.into()))?;
                (rtype, max)
            }
            None => (s, 0),
        };
        let rtype =
            Rtype::from_str(rtype).map_err(|_| PolicyParseError(s.into()))?;
        Ok(TypeLimit { rtype, max })
    }
}

impl<'de> serde::Deserialize<'de> for TypeLimit {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

//------------ PolicyParseError ----------------------------------------------

/// A type limit of a policy rule could not be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicyParseError(String);

impl fmt::Display for PolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid record type in policy: '{}'", self.0)
    }
}

impl std::error::Error for PolicyParseError {}

//------------ PolicyRule ----------------------------------------------------

/// A single authorization rule.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct PolicyRule {
    /// Whether a match grants or denies the change.
    pub grant: bool,

    /// The signer identities the rule applies to.
    ///
    /// A wildcard identity covers all names below it. `*.` therefore
    /// matches every signer.
    pub identity: Name,

    #[serde(rename = "match")]
    pub match_type: MatchType,

    /// The name matched against, where the match type needs one.
    #[serde(default)]
    pub name: Option<Name>,

    /// Client addresses the rule is limited to.
    #[serde(default)]
    pub address: Option<Acl>,

    /// The record types the rule covers.
    ///
    /// If empty, the rule covers all types but SOA, NS and RRSIG.
    #[serde(default)]
    pub types: Vec<TypeLimit>,
}

impl PolicyRule {
    fn matches_identity(&self, signer: Option<&Name>) -> bool {
        if !self.match_type.needs_signer() {
            return true;
        }
        let Some(signer) = signer else {
            return false;
        };
        if self.identity.is_wildcard() {
            match self.identity.parent() {
                Some(base) => signer.is_subdomain_of(&base),
                None => false,
            }
        } else {
            *signer == self.identity
        }
    }

    fn matches_name(
        &self,
        zone: &Name,
        signer: Option<&Name>,
        peer: SocketAddr,
        tcp: bool,
        owner: &Name,
        target: Option<&Name>,
    ) -> bool {
        match self.match_type {
            MatchType::Name => self.name.as_ref() == Some(owner),
            MatchType::Subdomain => self
                .name
                .as_ref()
                .map(|name| owner.is_subdomain_of(name))
                .unwrap_or(false),
            MatchType::Wildcard => match &self.name {
                Some(name) if name.is_wildcard() => {
                    covered_by_wildcard(owner, name)
                }
                _ => false,
            },
            MatchType::Zonesub => owner.is_subdomain_of(zone),
            MatchType::SelfName => signer == Some(owner),
            MatchType::Selfsub => {
                signer.map(|s| owner.is_subdomain_of(s)).unwrap_or(false)
            }
            MatchType::Selfwild => signer
                .map(|s| owner.is_subdomain_of(s) && owner != s)
                .unwrap_or(false),
            MatchType::TcpSelf => {
                tcp && reverse_name(peer.ip()).as_ref() == Some(owner)
            }
            MatchType::Selftarget => match (signer, target) {
                (Some(signer), Some(target)) => signer == target,
                _ => false,
            },
        }
    }

    /// Returns the limit for the type if the rule covers it.
    fn type_limit(&self, rtype: Rtype) -> Option<u32> {
        if self.types.is_empty() {
            return is_user_type(rtype).then_some(0);
        }
        self.types
            .iter()
            .find(|limit| limit.rtype == rtype || limit.rtype == Rtype::ANY)
            .map(|limit| limit.max)
    }
}

fn is_user_type(rtype: Rtype) -> bool {
    !matches!(rtype, Rtype::SOA | Rtype::NS | Rtype::RRSIG)
}

fn covered_by_wildcard(owner: &Name, wildcard: &Name) -> bool {
    match wildcard.parent() {
        Some(base) => owner.is_subdomain_of(&base) && *owner != base,
        None => false,
    }
}

/// Returns the reverse-mapping name for an address.
fn reverse_name(addr: IpAddr) -> Option<Name> {
    let s = match addr {
        IpAddr::V4(addr) => {
            let [a, b, c, d] = addr.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa.")
        }
        IpAddr::V6(addr) => {
            let mut s = String::with_capacity(73);
            for octet in addr.octets().iter().rev() {
                s.push_str(&format!("{:x}.{:x}.", octet & 0x0F, octet >> 4));
            }
            s.push_str("ip6.arpa.");
            s
        }
    };
    Name::from_str(&s).ok()
}

//------------ PolicyTable ---------------------------------------------------

/// The authorization rules of a zone.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
}

impl PolicyTable {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        PolicyTable { rules }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Decides whether a change to a record is permitted.
    ///
    /// Returns the maximum number of records of the type permitted at the
    /// name if it is, 0 meaning no limit, or `None` if the change is
    /// denied.
    #[allow(clippy::too_many_arguments)]
    pub fn check_rule(
        &self,
        zone: &Name,
        signer: Option<&Name>,
        peer: SocketAddr,
        tcp: bool,
        owner: &Name,
        rtype: Rtype,
        target: Option<&Name>,
    ) -> Option<u32> {
        for rule in &self.rules {
            if !rule.matches_identity(signer) {
                continue;
            }
            if let Some(acl) = &rule.address {
                if !acl.allows(peer.ip()) {
                    continue;
                }
            }
            if !rule.matches_name(zone, signer, peer, tcp, owner, target) {
                continue;
            }
            let Some(max) = rule.type_limit(rtype) else {
                continue;
            };
            return rule.grant.then_some(max);
        }
        None
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn n(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn acl(items: &[&str]) -> Acl {
        Acl::parse(items.iter().copied()).unwrap()
    }

    fn peer(s: &str) -> SocketAddr {
        SocketAddr::new(s.parse().unwrap(), 5353)
    }

    #[test]
    fn acl_first_match_wins() {
        let acl = acl(&["!192.0.2.7", "192.0.2.0/24", "2001:db8::/32"]);
        assert!(acl.allows("192.0.2.1".parse().unwrap()));
        assert!(!acl.allows("192.0.2.7".parse().unwrap()));
        assert!(!acl.allows("198.51.100.1".parse().unwrap()));
        assert!(acl.allows("2001:db8::1".parse().unwrap()));
        assert!(acl.allows("::ffff:192.0.2.1".parse().unwrap()));
        assert!(Acl::any().allows("198.51.100.1".parse().unwrap()));
        assert!(!Acl::none().allows("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn acl_parse_errors() {
        assert!(Acl::parse(["10.0.0.0/33"]).is_err());
        assert!(Acl::parse(["host.example"]).is_err());
        assert!(Acl::parse(["! 10.0.0.1", "any"]).is_ok());
    }

    #[test]
    fn table_from_json() {
        let table: PolicyTable = serde_json::from_str(
            r#"[
                {
                    "grant": false,
                    "identity": "*.",
                    "match": "name",
                    "name": "locked.example.",
                    "types": ["ANY"]
                },
                {
                    "grant": true,
                    "identity": "*.keys.example.",
                    "match": "subdomain",
                    "name": "dyn.example.",
                    "types": ["A(2)", "AAAA"]
                },
                {
                    "grant": true,
                    "identity": "*.",
                    "match": "tcp-self",
                    "address": ["192.0.2.0/24"]
                }
            ]"#,
        )
        .unwrap();
        assert_eq!(table.rules().len(), 3);
        assert_eq!(
            table.rules()[1].types[0],
            TypeLimit {
                rtype: Rtype::A,
                max: 2
            }
        );
        assert_eq!(table.rules()[2].match_type, MatchType::TcpSelf);
    }

    #[test]
    fn check_rule() {
        let zone = n("example");
        let table = PolicyTable::new(vec![
            PolicyRule {
                grant: false,
                identity: n("*."),
                match_type: MatchType::Name,
                name: Some(n("locked.dyn.example")),
                address: None,
                types: vec![],
            },
            PolicyRule {
                grant: true,
                identity: n("*.keys.example"),
                match_type: MatchType::Subdomain,
                name: Some(n("dyn.example")),
                address: None,
                types: vec!["A(2)".parse().unwrap()],
            },
            PolicyRule {
                grant: true,
                identity: n("host.keys.example"),
                match_type: MatchType::Selftarget,
                name: None,
                address: None,
                types: vec!["PTR".parse().unwrap()],
            },
            PolicyRule {
                grant: true,
                identity: n("*."),
                match_type: MatchType::TcpSelf,
                name: None,
                address: Some(acl(&["192.0.2.0/24"])),
                types: vec![],
            },
        ]);
        let key = n("host.keys.example");
        let other = n("other.example");
        let p = peer("198.51.100.1");
        let check = |signer: Option<&Name>,
                     owner: &str,
                     rtype: Rtype,
                     target: Option<&Name>| {
            table.check_rule(&zone, signer, p, false, &n(owner), rtype, target)
        };

        assert_eq!(check(Some(&key), "a.dyn.example", Rtype::A, None), Some(2));
        assert_eq!(check(Some(&key), "a.dyn.example", Rtype::MX, None), None);
        assert_eq!(check(None, "a.dyn.example", Rtype::A, None), None);
        assert_eq!(
            check(Some(&key), "locked.dyn.example", Rtype::A, None),
            None
        );
        assert_eq!(
            check(Some(&key), "1.2.example", Rtype::PTR, Some(&key)),
            Some(0)
        );
        assert_eq!(
            check(Some(&key), "1.2.example", Rtype::PTR, Some(&other)),
            None
        );

        // tcp-self needs TCP and the matching reverse name.
        let reverse = n("1.2.0.192.in-addr.arpa");
        let local = peer("192.0.2.1");
        assert_eq!(
            table.check_rule(&zone, None, local, true, &reverse, Rtype::PTR, None),
            Some(0)
        );
        assert_eq!(
            table.check_rule(&zone, None, local, false, &reverse, Rtype::PTR, None),
            None
        );
        assert_eq!(
            table.check_rule(&zone, None, local, true, &reverse, Rtype::NS, None),
            None
        );
    }

    #[test]
    fn reverse_names() {
        assert_eq!(
            reverse_name("192.0.2.1".parse().unwrap()),
            Some(n("1.2.0.192.in-addr.arpa"))
        );
        let v6 = reverse_name("2001:db8::1".parse().unwrap()).unwrap();
        assert!(v6.to_string().starts_with("1.0.0.0.0.0.0.0"));
        assert!(v6.to_string().ends_with("8.b.d.0.1.0.0.2.ip6.arpa."));
    }
}
