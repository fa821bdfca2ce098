//! DNS CLASSes.

//------------ Class ---------------------------------------------------------

int_enum! {
    /// DNS CLASSes.
    ///
    /// The domain name space is partitioned into separate classes for
    /// different network types. In practice, only the IN class is relevant.
    ///
    /// UPDATE messages overload the class field of prerequisite and update
    /// entries: the query classes NONE and ANY select between the different
    /// kinds of assertions and deletions defined in [RFC 2136].
    ///
    /// [RFC 2136]: https://tools.ietf.org/html/rfc2136
    =>
    Class, u16;

    /// Internet (IN).
    (IN => 1, "IN")

    /// Chaosnet (CH).
    (CH => 3, "CH")

    /// Hesiod (HS).
    (HS => 4, "HS")

    /// Query class None.
    ///
    /// Used in UPDATE messages to require that an RRset does not exist or
    /// to delete a single record.
    (NONE => 0xFE, "NONE")

    /// Query class ANY.
    ///
    /// Used in UPDATE messages to require that an RRset exists or to
    /// delete whole RRsets.
    (ANY => 0xFF, "ANY")
}

int_enum_str_with_prefix!(Class, "CLASS", u16);

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::Class;
    use core::str::FromStr;

    #[test]
    fn from_str() {
        assert_eq!(Class::from_str("in"), Ok(Class::IN));
        assert_eq!(Class::from_str("ANY"), Ok(Class::ANY));
        assert_eq!(Class::from_str("CLASS5"), Ok(Class::from_int(5)));
        assert!(Class::from_str("FOO").is_err());
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Class::NONE), "NONE");
        assert_eq!(format!("{}", Class::from_int(7)), "CLASS7");
    }

    #[test]
    fn ser_de() {
        let json = serde_json::to_string(&Class::IN).unwrap();
        assert_eq!(json, "\"IN\"");
        let class: Class = serde_json::from_str("\"CLASS5\"").unwrap();
        assert_eq!(class, Class::from_int(5));
    }
}
