//! Per-key ordering primitives shared by the stores.
//!
//! [`Lanes`] serialises operations that mutate the same key: each key owns a
//! fair (FIFO) async mutex, so a later caller waits for the earlier one to
//! settle. [`Sequencer`] numbers operations per key so that a response older
//! than the latest applied one is dropped instead of overwriting newer state.
//! A `Sequencer` lives inside the same lock as the state it guards, which keeps
//! "is this still current?" and "apply it" in one critical section.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Lanes<K> {
    lanes: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Lanes<K> {
    pub fn new() -> Self {
        Self { lanes: Mutex::new(HashMap::new()) }
    }

    fn lane(&self, key: &K) -> Arc<AsyncMutex<()>> {
        lock(&self.lanes).entry(key.clone()).or_default().clone()
    }

    /// Wait for every earlier holder of `key`, then hold it until the guard drops.
    pub async fn enter(&self, key: &K) -> OwnedMutexGuard<()> {
        self.lane(key).lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for Lanes<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of one operation in its key's sequence, tagged with the identity
/// epoch the operation started under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ticket<K> {
    key: K,
    seq: u64,
    epoch: u64,
}

impl<K> Ticket<K> {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    issued: u64,
    applied: u64,
}

/// Per-key operation counters plus the epoch of the identity whose data the
/// guarded state holds. A ticket from another epoch never settles, however
/// late it was issued.
#[derive(Debug)]
pub(crate) struct Sequencer<K> {
    keys: HashMap<K, Counters>,
    epoch: u64,
}

impl<K: Eq + Hash + Clone> Sequencer<K> {
    pub fn new() -> Self {
        Self { keys: HashMap::new(), epoch: 0 }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn issue(&mut self, key: &K, epoch: u64) -> Ticket<K> {
        let c = self.keys.entry(key.clone()).or_default();
        c.issued += 1;
        Ticket { key: key.clone(), seq: c.issued, epoch }
    }

    /// `true` while `ticket` belongs to the current epoch.
    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        ticket.epoch == self.epoch
    }

    /// Record that `ticket` has resolved. Returns `false` when the ticket is
    /// from another epoch or a newer operation on the same key was already
    /// applied; the caller must then drop the response.
    pub fn settle(&mut self, ticket: &Ticket<K>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let c = self.keys.entry(ticket.key.clone()).or_default();
        if ticket.seq < c.applied {
            return false;
        }
        c.applied = ticket.seq;
        true
    }

    /// Mark everything issued so far on `key` as stale.
    pub fn supersede(&mut self, key: &K) {
        let t = self.issue(key, self.epoch);
        self.settle(&t);
    }

    /// Switch to `epoch`, retiring every outstanding ticket on every key.
    pub fn begin_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
        for c in self.keys.values_mut() {
            c.issued += 1;
            c.applied = c.issued;
        }
    }
}

impl<K: Eq + Hash + Clone> Default for Sequencer<K> {
    fn default() -> Self {
        Self::new()
    }
}
