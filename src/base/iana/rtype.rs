//! Resource Record (RR) TYPEs

//------------ Rtype ---------------------------------------------------------

int_enum! {
    /// Resource Record Types.
    ///
    /// Each resource records has a 16 bit type value indicating what kind of
    /// information is represented by the record. Normal query includes the
    /// type of record information is requested for. A few aditional types,
    /// called query types, are defined as well and can only be used in
    /// questions. This type represents both these types.
    ///
    /// Only the types the update processor treats specially have their own
    /// constants. All others are available via `from_int` and are printed
    /// in the generic `TYPEnnn` form.
    ///
    /// See the [IANA registry] for an overview of assigned values.
    ///
    /// [IANA registry]: http://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4
    =>
    Rtype, u16;

    /// A host address.
    (A => 1, "A")

    /// An authoritative name server.
    (NS => 2, "NS")

    /// A mail destination.
    ///
    /// (Obsolete – use MX)
    (MD => 3, "MD")

    /// A mail forwarder.
    ///
    /// (Obsolete – use MX)
    (MF => 4, "MF")

    /// The canonical name for an alias.
    (CNAME => 5, "CNAME")

    /// Marks the start of a zone of authority.
    (SOA => 6, "SOA")

    /// A mailbox domain name.
    (MB => 7, "MB")

    /// A mail group member.
    (MG => 8, "MG")

    /// A mail rename domain name.
    (MR => 9, "MR")

    /// A null resource record.
    (NULL => 10, "NULL")

    /// A well known service description.
    (WKS => 11, "WKS")

    /// A domain name pointer.
    (PTR => 12, "PTR")

    /// Host information.
    (HINFO => 13, "HINFO")

    /// Mailbox or mail list information.
    (MINFO => 14, "MINFO")

    /// Mail exchange.
    (MX => 15, "MX")

    /// Text strings.
    (TXT => 16, "TXT")

    /// For responsible person.
    (RP => 17, "RP")

    /// For AFS data base location.
    (AFSDB => 18, "AFSDB")

    /// For security signature.
    (SIG => 24, "SIG")

    /// For security key.
    (KEY => 25, "KEY")

    /// IPv6 address.
    (AAAA => 28, "AAAA")

    /// Next domain (obsolete).
    (NXT => 30, "NXT")

    /// Server selection.
    (SRV => 33, "SRV")

    /// Key exchanger.
    (KX => 36, "KX")

    /// DNAME.
    (DNAME => 39, "DNAME")

    /// OPT.
    (OPT => 41, "OPT")

    /// Delegation signer.
    (DS => 43, "DS")

    /// RRSIG.
    (RRSIG => 46, "RRSIG")

    /// NSEC.
    (NSEC => 47, "NSEC")

    /// DNSKEY.
    (DNSKEY => 48, "DNSKEY")

    /// NSEC3.
    (NSEC3 => 50, "NSEC3")

    /// NSEC3PARAM.
    (NSEC3PARAM => 51, "NSEC3PARAM")

    /// Child DS.
    (CDS => 59, "CDS")

    /// DNSKEY(s) the child wants reflected in DS.
    (CDNSKEY => 60, "CDNSKEY")

    /// General purpose service binding.
    (SVCB => 64, "SVCB")

    /// Service binding for HTTP.
    (HTTPS => 65, "HTTPS")

    /// Incremental transfer.
    (IXFR => 251, "IXFR")

    /// Transfer of entire zone.
    (AXFR => 252, "AXFR")

    /// A request for all records the server/cache has available.
    (ANY => 255, "ANY")
}

int_enum_str_with_prefix!(Rtype, "TYPE", u16);

impl Rtype {
    /// Returns true if this is a query meta type.
    ///
    /// Meta types occupy the range 128 to 255 plus OPT. They can never be
    /// stored in a zone.
    #[must_use]
    pub fn is_meta(self) -> bool {
        self == Rtype::OPT || (128..=255).contains(&self.to_int())
    }

    /// Returns true if a record of this type may live next to a CNAME.
    #[must_use]
    pub fn is_at_cname(self) -> bool {
        matches!(
            self,
            Rtype::RRSIG | Rtype::NSEC | Rtype::SIG | Rtype::KEY | Rtype::NXT
        )
    }

    /// Returns true if records of this type belong on the parent side of
    /// a zone cut.
    #[must_use]
    pub fn is_at_parent(self) -> bool {
        self == Rtype::DS
    }

    /// Returns true if this type carries key material of a signed zone.
    #[must_use]
    pub fn is_key_material(self) -> bool {
        matches!(self, Rtype::DNSKEY | Rtype::CDNSKEY | Rtype::CDS)
    }

    /// Returns true for the signature and denial types a signer maintains.
    #[must_use]
    pub fn is_dnssec_meta(self) -> bool {
        matches!(self, Rtype::RRSIG | Rtype::NSEC)
    }

    /// Returns true if the RDATA of this type embeds domain names that are
    /// subject to case folding in canonical form.
    #[must_use]
    pub fn has_canonical_names(self) -> bool {
        matches!(
            self,
            Rtype::NS
                | Rtype::MD
                | Rtype::MF
                | Rtype::CNAME
                | Rtype::SOA
                | Rtype::MB
                | Rtype::MG
                | Rtype::MR
                | Rtype::PTR
                | Rtype::MINFO
                | Rtype::MX
                | Rtype::RP
                | Rtype::AFSDB
                | Rtype::KX
                | Rtype::SRV
                | Rtype::DNAME
        )
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::Rtype;
    use core::str::FromStr;

    #[test]
    fn from_str_and_display() {
        assert_eq!(Rtype::from_str("nsec3param"), Ok(Rtype::NSEC3PARAM));
        assert_eq!(Rtype::from_str("TYPE65534"), Ok(Rtype::from_int(65534)));
        assert_eq!(format!("{}", Rtype::from_int(65534)), "TYPE65534");
        assert_eq!(format!("{}", Rtype::CNAME), "CNAME");
    }

    #[test]
    fn classification() {
        assert!(Rtype::ANY.is_meta());
        assert!(Rtype::AXFR.is_meta());
        assert!(Rtype::OPT.is_meta());
        assert!(!Rtype::A.is_meta());
        assert!(Rtype::RRSIG.is_at_cname());
        assert!(!Rtype::A.is_at_cname());
        assert!(Rtype::DS.is_at_parent());
        assert!(Rtype::CDS.is_key_material());
        assert!(Rtype::NSEC.is_dnssec_meta());
        assert!(!Rtype::NSEC3.is_dnssec_meta());
    }
}
