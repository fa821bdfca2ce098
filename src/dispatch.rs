//! Admission and scheduling of update requests.
//!
//! The [`Dispatcher`] is what an embedding server hands decoded update
//! requests to. It enforces the global update quota, finds the zone a
//! request is for and then either queues the request with the zone's
//! worker, if this server is primary for the zone, or forwards it to the
//! primary via an [`UpdateForwarder`].
//!
//! Each primary zone has a single worker task draining an ordered queue,
//! so at most one transaction per zone runs at any time. The transaction
//! itself is synchronous and runs on the blocking thread pool.
//!
//! All of this needs to happen inside a Tokio runtime.

use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, trace, warn};

use crate::base::iana::{Class, Rcode};
use crate::base::name::Name;
use crate::config::ServerConfig;
use crate::update::{process, UpdateError, UpdateRequest, Zone, ZoneKind};

//------------ UpdateResponse ------------------------------------------------

/// What to send back to the client of an update.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpdateResponse {
    /// Respond with the given response code.
    Rcode(Rcode),

    /// Relay the primary's response message to a forwarded update.
    Forwarded(Bytes),

    /// Do not respond at all.
    Drop,
}

//------------ UpdateForwarder -----------------------------------------------

/// Sends updates for secondary zones on to the primary.
pub trait UpdateForwarder: Send + Sync {
    /// Forwards an update request for `zone`.
    ///
    /// Resolves to the primary's response message in wire format.
    fn forward(
        &self,
        zone: &Name,
        request: &UpdateRequest,
    ) -> BoxFuture<'static, Result<Bytes, ForwardError>>;
}

//------------ ForwardError --------------------------------------------------

/// Forwarding an update to the primary failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ForwardError {
    /// There is no primary to forward to.
    NoPrimary,

    /// The primary did not answer in time.
    Timeout,

    /// Talking to the primary failed.
    Transport(String),
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ForwardError::NoPrimary => f.write_str("no primary server"),
            ForwardError::Timeout => f.write_str("primary timed out"),
            ForwardError::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

impl std::error::Error for ForwardError {}

//------------ UpdateStats ---------------------------------------------------

/// Counters of update outcomes.
#[derive(Debug, Default)]
pub struct UpdateStats {
    completed: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
    forwarded: AtomicUsize,
    forward_failures: AtomicUsize,
    quota_drops: AtomicUsize,
}

impl UpdateStats {
    /// Updates that were applied or turned out to be redundant.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Updates refused because of the request or the zone content.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Updates that failed because of an internal error.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Updates whose forwarding produced an answer from the primary.
    pub fn forwarded(&self) -> usize {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn forward_failures(&self) -> usize {
        self.forward_failures.load(Ordering::Relaxed)
    }

    /// Requests dropped because the quota was exhausted.
    pub fn quota_drops(&self) -> usize {
        self.quota_drops.load(Ordering::Relaxed)
    }

    fn count(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts the outcome of a transaction.
    fn outcome(&self, result: &Result<(), UpdateError>) {
        match result {
            Ok(()) => Self::count(&self.completed),
            Err(err) if err.is_failure() => Self::count(&self.failed),
            Err(_) => Self::count(&self.rejected),
        }
    }
}

//------------ Dispatcher ----------------------------------------------------

/// The front end of update processing.
pub struct Dispatcher {
    config: ServerConfig,
    quota: Arc<Semaphore>,
    zones: ArcSwap<HashMap<ZoneKey, ZoneHandle>>,
    forwarder: Option<Arc<dyn UpdateForwarder>>,
    stats: Arc<UpdateStats>,
}

type ZoneKey = (Name, Class);

/// A served zone and, for primaries, its worker's queue.
#[derive(Clone)]
struct ZoneHandle {
    zone: Arc<Zone>,
    queue: Option<mpsc::Sender<Task>>,
}

/// A request waiting for its zone's worker.
struct Task {
    request: UpdateRequest,
    permit: OwnedSemaphorePermit,
    reply: oneshot::Sender<Result<(), UpdateError>>,
}

impl Dispatcher {
    pub fn new(config: ServerConfig) -> Self {
        Dispatcher {
            quota: Arc::new(Semaphore::new(config.update_quota())),
            config,
            zones: Default::default(),
            forwarder: None,
            stats: Default::default(),
        }
    }

    /// Sets the forwarder used for secondary zones.
    pub fn with_forwarder(
        mut self,
        forwarder: Arc<dyn UpdateForwarder>,
    ) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn stats(&self) -> &UpdateStats {
        &self.stats
    }

    /// Returns the number of update transactions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.config.update_quota() - self.quota.available_permits()
    }

    /// Starts serving a zone.
    ///
    /// A zone already served under the same name and class is replaced.
    /// Its worker finishes the requests already queued.
    pub fn add_zone(&self, zone: Zone) -> Arc<Zone> {
        let zone = Arc::new(zone);
        let queue = match zone.kind() {
            ZoneKind::Primary => {
                let (tx, rx) = mpsc::channel(self.config.queue_depth());
                tokio::spawn(run_worker(zone.clone(), rx));
                Some(tx)
            }
            ZoneKind::Secondary => None,
        };
        let key = (zone.name().clone(), zone.class());
        let handle = ZoneHandle {
            zone: zone.clone(),
            queue,
        };
        self.zones.rcu(|zones| {
            let mut zones = HashMap::clone(zones);
            zones.insert(key.clone(), handle.clone());
            zones
        });
        info!("Serving updates for zone '{}/{}'", zone.name(), zone.class());
        zone
    }

    /// Stops serving a zone.
    pub fn remove_zone(&self, name: &Name, class: Class) -> Option<Arc<Zone>> {
        let key = (name.clone(), class);
        let prev = self.zones.rcu(|zones| {
            let mut zones = HashMap::clone(zones);
            zones.remove(&key);
            zones
        });
        let handle = prev.get(&key)?;
        info!("No longer serving updates for zone '{name}/{class}'");
        Some(handle.zone.clone())
    }

    pub fn zone(&self, name: &Name, class: Class) -> Option<Arc<Zone>> {
        self.zones
            .load()
            .get(&(name.clone(), class))
            .map(|handle| handle.zone.clone())
    }

    /// Handles an update request.
    pub async fn handle(&self, request: UpdateRequest) -> UpdateResponse {
        let Ok(permit) = self.quota.clone().try_acquire_owned() else {
            warn!(
                "Update quota exhausted, dropping request from {}",
                request.peer
            );
            UpdateStats::count(&self.stats.quota_drops);
            return UpdateResponse::Drop;
        };

        let Some(entry) = request.zone_entry() else {
            debug!("Malformed zone section in update from {}", request.peer);
            return self.reject(UpdateError::FormErr("bad zone section"));
        };
        let key = (entry.name.clone(), entry.class);
        let Some(handle) = self.zones.load().get(&key).cloned() else {
            info!(
                "Update from {} for zone '{}/{}' which is not served",
                request.peer, key.0, key.1
            );
            return self.reject(UpdateError::NotAuth);
        };

        match handle.queue {
            Some(queue) => {
                if let Some(rcode) = request.signature_error {
                    info!(
                        "Update from {} for zone '{}' failed signature \
                         check: {rcode}",
                        request.peer,
                        handle.zone.name()
                    );
                    UpdateStats::count(&self.stats.rejected);
                    return UpdateResponse::Rcode(rcode);
                }
                self.submit(queue, request, permit).await
            }
            None => self.forward(handle.zone, request, permit).await,
        }
    }

    /// Queues a request with a primary zone's worker.
    async fn submit(
        &self,
        queue: mpsc::Sender<Task>,
        request: UpdateRequest,
        permit: OwnedSemaphorePermit,
    ) -> UpdateResponse {
        let (tx, rx) = oneshot::channel();
        let task = Task {
            request,
            permit,
            reply: tx,
        };
        if queue.send(task).await.is_err() {
            error!("Update worker has gone away");
            UpdateStats::count(&self.stats.failed);
            return UpdateResponse::Rcode(Rcode::SERVFAIL);
        }
        let result = match rx.await {
            Ok(result) => result,
            Err(_) => Err(UpdateError::ServFail("update task lost")),
        };
        self.stats.outcome(&result);
        response(result)
    }

    /// Forwards a request for a secondary zone to the primary.
    async fn forward(
        &self,
        zone: Arc<Zone>,
        request: UpdateRequest,
        permit: OwnedSemaphorePermit,
    ) -> UpdateResponse {
        let allowed = zone
            .config()
            .forward_acl
            .as_ref()
            .map(|acl| acl.allows(request.peer.ip()))
            .unwrap_or(false);
        if !allowed {
            info!(
                "Update from {} for secondary zone '{}' not forwarded",
                request.peer,
                zone.name()
            );
            return self.reject(UpdateError::NotImp);
        }
        let Some(forwarder) = self.forwarder.as_ref() else {
            warn!("No forwarder for updates to zone '{}'", zone.name());
            return self.reject(UpdateError::NotImp);
        };

        debug!(
            "Forwarding update from {} for zone '{}'",
            request.peer,
            zone.name()
        );
        let fut = forwarder.forward(zone.name(), &request);
        let timeout = self.config.forward_timeout();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let res = match tokio::time::timeout(timeout, fut).await {
                Ok(res) => res,
                Err(_) => Err(ForwardError::Timeout),
            };
            let _ = tx.send(res);
            drop(permit);
        });

        match rx.await {
            Ok(Ok(message)) => {
                UpdateStats::count(&self.stats.forwarded);
                UpdateResponse::Forwarded(message)
            }
            Ok(Err(err)) => {
                warn!(
                    "Forwarding update for zone '{}' failed: {err}",
                    zone.name()
                );
                UpdateStats::count(&self.stats.forward_failures);
                UpdateResponse::Rcode(Rcode::SERVFAIL)
            }
            Err(_) => {
                UpdateStats::count(&self.stats.forward_failures);
                UpdateResponse::Rcode(Rcode::SERVFAIL)
            }
        }
    }

    fn reject(&self, err: UpdateError) -> UpdateResponse {
        self.stats.outcome(&Err(err.clone()));
        response(Err(err))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("zones", &self.zones.load().len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Turns the outcome of a transaction into a response.
fn response(result: Result<(), UpdateError>) -> UpdateResponse {
    match result {
        Ok(()) => UpdateResponse::Rcode(Rcode::NOERROR),
        Err(err) => match err.rcode() {
            Some(rcode) => UpdateResponse::Rcode(rcode),
            None => UpdateResponse::Drop,
        },
    }
}

//------------ Worker --------------------------------------------------------

/// Processes the requests for a primary zone one at a time.
async fn run_worker(zone: Arc<Zone>, mut rx: mpsc::Receiver<Task>) {
    trace!("Update worker for zone '{}' started", zone.name());
    while let Some(task) = rx.recv().await {
        let Task {
            request,
            permit,
            reply,
        } = task;
        let worker_zone = zone.clone();
        let result = tokio::task::spawn_blocking(move || {
            process(&worker_zone, &request)
        })
        .await
        .unwrap_or_else(|err| {
            error!("Update transaction for zone '{}' panicked", zone.name());
            trace!("Join error: {err}");
            Err(UpdateError::ServFail("update transaction failed"))
        });
        match &result {
            Ok(()) => debug!("Update for zone '{}' done", zone.name()),
            Err(err) => debug!("Update for zone '{}' failed: {err}", zone.name()),
        }
        let _ = reply.send(result);
        drop(permit);
    }
    trace!("Update worker for zone '{}' stopped", zone.name());
}

//============ Testing =======================================================
