//! A zone as seen by update processing.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use tracing::{debug, info};

use crate::base::iana::{Class, Rtype};
use crate::base::name::Name;
use crate::base::rdata::Ds;
use crate::config::{ConfigError, ZoneConfig};
use crate::journal::{FileJournal, Journal, MemoryJournal};
use crate::zonetree::ZoneDatabase;

//------------ ZoneKind ------------------------------------------------------

/// The role of this server for a zone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ZoneKind {
    /// Updates are applied here.
    Primary,

    /// Updates are forwarded to the primary.
    Secondary,
}

//------------ Zone ----------------------------------------------------------

/// A zone together with everything needed to update it.
///
/// The configuration and the set of keys managed by the signer can be
/// replaced at any time. A transaction uses the values current at its
/// start.
pub struct Zone {
    db: Arc<dyn ZoneDatabase>,
    kind: ZoneKind,
    config: ArcSwap<ZoneConfig>,
    managed_keys: ArcSwap<Vec<Bytes>>,
    journal: Arc<dyn Journal>,
    dirty: AtomicBool,
    notify_pending: AtomicBool,
}

impl Zone {
    /// Creates a new zone.
    ///
    /// The journal is a file if the configuration names one and kept in
    /// memory otherwise.
    pub fn new(
        db: Arc<dyn ZoneDatabase>,
        kind: ZoneKind,
        config: ZoneConfig,
    ) -> Result<Self, ConfigError> {
        let journal: Arc<dyn Journal> = match &config.journal {
            Some(path) => Arc::new(FileJournal::new(path)),
            None => Arc::new(MemoryJournal::new()),
        };
        Self::with_journal(db, kind, config, journal)
    }

    /// Creates a new zone using the given journal.
    pub fn with_journal(
        db: Arc<dyn ZoneDatabase>,
        kind: ZoneKind,
        config: ZoneConfig,
        journal: Arc<dyn Journal>,
    ) -> Result<Self, ConfigError> {
        config.check()?;
        Ok(Zone {
            db,
            kind,
            config: ArcSwap::from_pointee(config),
            managed_keys: ArcSwap::from_pointee(Vec::new()),
            journal,
            dirty: AtomicBool::new(false),
            notify_pending: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &Name {
        self.db.origin()
    }

    pub fn class(&self) -> Class {
        self.db.class()
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    pub fn db(&self) -> &dyn ZoneDatabase {
        self.db.as_ref()
    }

    pub fn journal(&self) -> &dyn Journal {
        self.journal.as_ref()
    }

    /// Returns the current configuration.
    pub fn config(&self) -> Arc<ZoneConfig> {
        self.config.load_full()
    }

    /// Replaces the configuration.
    pub fn set_config(&self, config: ZoneConfig) -> Result<(), ConfigError> {
        config.check()?;
        self.config.store(Arc::new(config));
        Ok(())
    }

    /// Replaces the DNSKEY data of the keys the signer manages.
    pub fn set_managed_keys(&self, keys: Vec<Bytes>) {
        self.managed_keys.store(Arc::new(keys))
    }

    /// Returns whether record data refers to a key the signer manages.
    ///
    /// DNSKEY and CDNSKEY data is compared directly. CDS data is checked
    /// against the digests of the managed keys.
    pub fn key_in_use(&self, rtype: Rtype, data: &[u8]) -> bool {
        let keys = self.managed_keys.load();
        match rtype {
            Rtype::DNSKEY | Rtype::CDNSKEY => {
                keys.iter().any(|key| key.as_ref() == data)
            }
            Rtype::CDS => {
                let Ok(ds) = Ds::parse(data) else {
                    return false;
                };
                keys.iter().any(|key| {
                    Ds::for_key(self.name(), key, ds.digest_type())
                        .map(|expected| expected == ds)
                        .unwrap_or(false)
                })
            }
            _ => false,
        }
    }

    /// Records that the zone has changed since it was last saved.
    pub fn mark_dirty(&self) {
        if !self.dirty.swap(true, Ordering::AcqRel) {
            debug!("Zone '{}' is now dirty", self.name());
        }
    }

    /// Returns and clears whether the zone needs saving.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Records that secondaries need to be notified of a change.
    pub fn notify(&self) {
        if !self.notify_pending.swap(true, Ordering::AcqRel) {
            info!("Zone '{}' changed, notify pending", self.name());
        }
    }

    /// Returns and clears whether secondaries need notifying.
    pub fn take_notify(&self) -> bool {
        self.notify_pending.swap(false, Ordering::AcqRel)
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Zone")
            .field("name", self.name())
            .field("class", &self.class())
            .field("kind", &self.kind)
            .finish()
    }
}
