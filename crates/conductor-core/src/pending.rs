//! The unified pending-request store.
//!
//! There is exactly one of these per Conductor, owned by the engine. The
//! messaging path, the gateway RPC path, and the timeout path all resolve
//! against it; whichever removes an id first wins, and later arrivals find
//! nothing. Per-request timers live in the forwarder and are cancelled when
//! an entry is removed, so the store itself holds only the request, its
//! origin, and the decision waker of an RPC waiter.

use std::collections::HashMap;

use tokio::sync::oneshot;
use uuid::Uuid;

use conductor_types::{AccessRequest, Authorization};

/// Where a pending request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    /// Detected in the wrapped worker's output; resolution ends in a stdin
    /// injection.
    Worker,
    /// Submitted via `conductor.request`; resolution wakes the RPC caller.
    Rpc,
}

/// One open authorization.
pub struct PendingEntry {
    pub request: AccessRequest,
    pub origin: RequestOrigin,
    /// Fired with the final decision when an RPC caller is waiting on it.
    pub waker: Option<oneshot::Sender<Authorization>>,
}

/// Pending requests keyed by id. Removal is the at-most-once resolve gate.
#[derive(Default)]
pub struct PendingSet {
    entries: HashMap<Uuid, PendingEntry>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new pending request.
    pub fn insert(&mut self, entry: PendingEntry) {
        self.entries.insert(entry.request.id, entry);
    }

    /// Atomically take an entry out of the store. The caller that gets
    /// `Some` owns the resolution; every later caller gets `None`.
    pub fn remove(&mut self, id: Uuid) -> Option<PendingEntry> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    /// Open requests, oldest first.
    pub fn list(&self) -> Vec<&AccessRequest> {
        let mut requests: Vec<&AccessRequest> =
            self.entries.values().map(|e| &e.request).collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry (shutdown). Wakers are dropped unfired; RPC waiters
    /// observe a closed channel.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
