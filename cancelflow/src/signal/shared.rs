//! Shared mutable state behind a controller and its signals.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::operation::{operation_identity, TrackableOperation};

/// A cleanup callback registered through `on_cancel`. Fallible so cleanup
/// failures can be collected during a cancellation sweep.
pub type CancelCallback = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Runs a callback, converting panics into collected failures so one faulty
/// observer cannot abort the rest of a cancellation sweep.
pub(crate) fn run_callback(callback: CancelCallback) -> anyhow::Result<()> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "cleanup callback panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Ordered, id-keyed collection of cleanup callbacks.
///
/// Ids are allocated from a strictly increasing counter and never reused, so
/// `BTreeMap` iteration order is registration order.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    entries: BTreeMap<u64, CancelCallback>,
    next_id: u64,
}

impl CallbackRegistry {
    /// Stores a callback under the next id and returns that id.
    pub(crate) fn insert(&mut self, callback: CancelCallback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, callback);
        id
    }

    /// Removes a callback by id. Returns true if it was still present.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Takes a snapshot of the registry and leaves it empty, so callbacks
    /// registered during the sweep fire immediately instead of being appended
    /// to a collection that is mid-iteration.
    pub(crate) fn drain(&mut self) -> BTreeMap<u64, CancelCallback> {
        std::mem::take(&mut self.entries)
    }

    /// Drops all callbacks without running them.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Id-keyed collection of tracked operations with an identity index for O(1)
/// removal.
///
/// Re-tracking an operation replaces its previous entry: both the id map and
/// the identity index hold at most one entry per distinct operation identity,
/// so no tracking id can become unreachable.
#[derive(Default)]
pub(crate) struct TrackedOperationSet {
    entries: BTreeMap<u64, Arc<dyn TrackableOperation>>,
    identity_index: HashMap<usize, u64>,
    next_id: u64,
}

impl TrackedOperationSet {
    /// Stores an operation under the next tracking id, replacing any earlier
    /// entry for the same identity. Returns the new id.
    pub(crate) fn insert(&mut self, operation: Arc<dyn TrackableOperation>) -> u64 {
        let identity = operation_identity(&operation);
        let id = self.next_id;
        self.next_id += 1;
        if let Some(previous) = self.identity_index.insert(identity, id) {
            self.entries.remove(&previous);
        }
        self.entries.insert(id, operation);
        id
    }

    /// Removes the entry for an operation identity, if present.
    /// Returns true if an entry was removed.
    pub(crate) fn remove_identity(&mut self, identity: usize) -> bool {
        match self.identity_index.remove(&identity) {
            Some(id) => self.entries.remove(&id).is_some(),
            None => false,
        }
    }

    /// Takes a snapshot of the tracked operations and leaves both the id map
    /// and the identity index empty.
    pub(crate) fn drain(&mut self) -> BTreeMap<u64, Arc<dyn TrackableOperation>> {
        self.identity_index.clear();
        std::mem::take(&mut self.entries)
    }

    /// Drops all entries without cancelling any operation.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.identity_index.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Registries guarded by one lock: the callback registry and the tracked
/// operation set mutate together during a cancellation sweep.
#[derive(Default)]
pub(crate) struct Registries {
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) tracked: TrackedOperationSet,
}

/// The single mutable record shared by a controller and every signal handle
/// derived from it. Lives as long as the longest holder.
pub(crate) struct SharedCancelState {
    /// Monotonic: transitions false to true exactly once, never reset.
    cancelled: AtomicBool,
    registries: Mutex<Registries>,
}

impl SharedCancelState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            registries: Mutex::new(Registries::default()),
        })
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Flips the cancelled flag. Returns true for the first caller only.
    pub(crate) fn mark_cancelled(&self) -> bool {
        self.cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn registries(&self) -> MutexGuard<'_, Registries> {
        self.registries.lock()
    }
}
