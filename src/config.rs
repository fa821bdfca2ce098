//! Configuration.
//!
//! [`ServerConfig`] holds the settings shared by all zones, [`ZoneConfig`]
//! those of a single zone. Both can be deserialized from any format serde
//! supports. Missing fields take their default values so a partial
//! document is enough.

use core::fmt;
use std::cmp;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;

use crate::base::iana::Rtype;
use crate::base::serial::Serial;
use crate::update::policy::{Acl, PolicyTable};

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
pub struct DefMinMax<T> {
    def: T,
    min: T,
    max: T,
}

impl<T> DefMinMax<T> {
    pub const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    pub fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    pub fn limit(self, value: T) -> T
    where
        T: Ord,
    {
        cmp::max(self.min, cmp::min(self.max, value))
    }
}

/// Limit on the number of update transactions in flight at once.
const UPDATE_QUOTA: DefMinMax<usize> = DefMinMax::new(100, 1, 100_000);

/// Limit on the number of requests waiting for a zone's worker.
const QUEUE_DEPTH: DefMinMax<usize> = DefMinMax::new(64, 1, 65_536);

/// Limit on the seconds to wait for the primary's answer to a forwarded
/// update.
const FORWARD_TIMEOUT: DefMinMax<u64> = DefMinMax::new(30, 1, 3600);

/// Limit on the NSEC3 iterations a zone may be updated to use.
///
/// RFC 9276 recommends zero. 150 is the traditional upper bound.
const MAX_NSEC3_ITERATIONS: DefMinMax<u16> = DefMinMax::new(150, 0, 150);

/// The record type used for signing state records by default.
const DEFAULT_PRIVATE_TYPE: u16 = 65534;

//------------ ServerConfig --------------------------------------------------

/// Settings shared by all zones.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// The maximum number of update transactions in flight at once.
    ///
    /// Requests beyond this are dropped without a response.
    pub update_quota: usize,

    /// The number of requests that may wait for each zone.
    pub queue_depth: usize,

    /// Seconds to wait for the primary to answer a forwarded update.
    pub forward_timeout: u64,
}

impl ServerConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the update quota trimmed to the permitted range.
    pub fn update_quota(&self) -> usize {
        UPDATE_QUOTA.limit(self.update_quota)
    }

    /// Returns the queue depth trimmed to the permitted range.
    pub fn queue_depth(&self) -> usize {
        QUEUE_DEPTH.limit(self.queue_depth)
    }

    /// Returns the forwarding timeout trimmed to the permitted range.
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(FORWARD_TIMEOUT.limit(self.forward_timeout))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            update_quota: UPDATE_QUOTA.default(),
            queue_depth: QUEUE_DEPTH.default(),
            forward_timeout: FORWARD_TIMEOUT.default(),
        }
    }
}

//------------ CheckNames ----------------------------------------------------

/// What to do with added records whose names break the host name rules.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CheckNames {
    /// Accept the record silently.
    Ignore,

    /// Accept the record but log a warning.
    Warn,

    /// Refuse the update.
    #[default]
    Fail,
}

//------------ SerialPolicy --------------------------------------------------

/// How the SOA serial advances when an update does not set it.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SerialPolicy {
    /// The serial is incremented by one.
    #[default]
    Increment,

    /// The serial becomes the current Unix time if that is larger.
    Unixtime,

    /// The serial becomes today's date as `YYYYMMDDnn` if that is larger.
    Date,
}

impl SerialPolicy {
    /// Returns the serial following `current`.
    pub fn next(self, current: Serial) -> Serial {
        self.next_at(current, OffsetDateTime::now_utc())
    }

    /// Returns the serial following `current` at the given time.
    ///
    /// All policies fall back to incrementing if their candidate is not
    /// greater than the current serial.
    pub fn next_at(self, current: Serial, now: OffsetDateTime) -> Serial {
        let candidate = match self {
            SerialPolicy::Increment => None,
            SerialPolicy::Unixtime => {
                Some(Serial(now.unix_timestamp() as u32))
            }
            SerialPolicy::Date => {
                let date = now.date();
                Some(Serial(
                    (date.year() as u32) * 1_000_000
                        + u32::from(u8::from(date.month())) * 10_000
                        + u32::from(date.day()) * 100,
                ))
            }
        };
        match candidate {
            Some(serial)
                if serial != Serial(0) && serial.is_greater_than(current) =>
            {
                serial
            }
            _ => current.next(),
        }
    }
}

//------------ ZoneConfig ----------------------------------------------------

/// Settings of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Whether updates are currently refused.
    pub update_disabled: bool,

    /// Client addresses the zone answers queries for.
    ///
    /// A client that may not query the zone may not update it either. If
    /// absent, all clients may query.
    pub query_acl: Option<Acl>,

    /// Client addresses allowed to update the zone.
    ///
    /// Only consulted if there is no update policy. If neither is
    /// present, the zone does not accept updates.
    pub update_acl: Option<Acl>,

    /// Per-record authorization rules.
    pub update_policy: Option<PolicyTable>,

    /// Client addresses whose updates a secondary forwards to the primary.
    ///
    /// If absent, a secondary does not forward updates.
    pub forward_acl: Option<Acl>,

    /// The maximum number of records in the zone, 0 for no limit.
    pub max_records: usize,

    /// The maximum TTL of added records.
    pub max_zone_ttl: Option<u32>,

    /// Whether to warn about owner names with non-terminal wildcards.
    pub check_wildcard: bool,

    /// How to treat added records that break the host name rules.
    pub check_names: CheckNames,

    /// Whether to check for MX records pointing at addresses.
    pub check_mx: bool,

    /// Whether an MX record pointing at an address is refused rather
    /// than warned about.
    pub check_mx_fail: bool,

    /// Whether MX targets inside the zone must have address records.
    pub check_integrity: bool,

    pub serial_policy: SerialPolicy,

    /// The record type of signing state records.
    pub private_type: Rtype,

    /// The maximum NSEC3 iterations the zone may use.
    pub max_nsec3_iterations: u16,

    /// Whether the zone is signed by this server.
    pub signing: bool,

    /// Where to write the journal. Without one, the journal is kept in
    /// memory.
    pub journal: Option<PathBuf>,
}

impl ZoneConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the NSEC3 iteration limit trimmed to the permitted range.
    pub fn max_nsec3_iterations(&self) -> u16 {
        MAX_NSEC3_ITERATIONS.limit(self.max_nsec3_iterations)
    }

    /// Checks the configuration for settings that cannot work.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.private_type.is_meta() || self.private_type.to_int() == 0 {
            return Err(ConfigError::BadPrivateType(self.private_type));
        }
        if self.max_zone_ttl == Some(0) {
            return Err(ConfigError::ZeroMaxTtl);
        }
        Ok(())
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZoneConfig {
            update_disabled: false,
            query_acl: None,
            update_acl: None,
            update_policy: None,
            forward_acl: None,
            max_records: 0,
            max_zone_ttl: None,
            check_wildcard: true,
            check_names: CheckNames::default(),
            check_mx: true,
            check_mx_fail: false,
            check_integrity: true,
            serial_policy: SerialPolicy::default(),
            private_type: Rtype::from_int(DEFAULT_PRIVATE_TYPE),
            max_nsec3_iterations: MAX_NSEC3_ITERATIONS.default(),
            signing: false,
            journal: None,
        }
    }
}

//------------ ConfigError ---------------------------------------------------

/// A zone configuration is unusable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// The private type is not a type records can be stored for.
    BadPrivateType(Rtype),

    /// The maximum zone TTL is zero.
    ZeroMaxTtl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::BadPrivateType(rtype) => {
                write!(f, "unusable private record type {rtype}")
            }
            ConfigError::ZeroMaxTtl => write!(f, "max-zone-ttl must not be 0"),
        }
    }
}

impl std::error::Error for ConfigError {}

//============ Testing =======================================================
