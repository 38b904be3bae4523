//! The correlated-result broker.
//!
//! Two keyed collections behind a single lock, the same granularity as
//! `ConnectionPoolManager`'s `checked_out` map in the teacher workspace:
//! a `wait` set (ids whose work is enqueued but not finished) and a
//! `results` map (ids whose final envelope is sitting ready, in whole or in
//! remaining part, for the host to drain). The lock is shared with the
//! protocol-existence check via [`ResultStore::reserve_if`] so that the
//! "no id without a known protocol" invariant (spec §4.F.4) holds as one
//! atomic step rather than two lock acquisitions that could race.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::ids::IdAllocator;

#[derive(Default)]
struct Inner {
    wait: HashSet<u64>,
    results: HashMap<u64, String>,
}

pub struct ResultStore {
    inner: Mutex<Inner>,
    ids: Arc<IdAllocator>,
}

/// The in-flight sentinel returned by `poll` for an id still in the wait set.
pub const IN_FLIGHT: &str = "[3]";

impl ResultStore {
    pub fn new(ids: Arc<IdAllocator>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ids,
        }
    }

    /// Inserts `id` into the wait set, but only if `protocol_exists` (called
    /// while the store's lock is held) returns `true`. Returns whether the
    /// reservation happened. On `false`, the caller must free `id` itself —
    /// it was never exposed to the host.
    pub fn reserve_if(&self, id: u64, protocol_exists: impl FnOnce() -> bool) -> bool {
        let mut inner = self.inner.lock().expect("result store mutex poisoned");
        if !protocol_exists() {
            return false;
        }
        debug_assert!(!inner.wait.contains(&id) && !inner.results.contains_key(&id));
        inner.wait.insert(id);
        true
    }

    /// Unconditional reservation, used by the SYNC-overflow path where the
    /// protocol is already known to exist (the handler just ran).
    pub fn reserve(&self, id: u64) {
        let mut inner = self.inner.lock().expect("result store mutex poisoned");
        debug_assert!(!inner.wait.contains(&id) && !inner.results.contains_key(&id));
        inner.wait.insert(id);
    }

    /// Records the handler's finished output, wrapped in the `[1,...]`
    /// envelope, and removes `id` from the wait set. A second deliver for
    /// the same id indicates a handler bug (handlers never retry through
    /// this interface) and is caught in debug builds.
    pub fn deliver(&self, id: u64, payload: &str) {
        let mut inner = self.inner.lock().expect("result store mutex poisoned");
        debug_assert!(
            !inner.results.contains_key(&id),
            "double deliver for id {id}"
        );
        let envelope = if payload.is_empty() {
            "[1]".to_string()
        } else {
            format!("[1,{payload}]")
        };
        inner.results.insert(id, envelope);
        inner.wait.remove(&id);
    }

    /// Records a pre-built envelope verbatim (used by the dispatcher's
    /// SYNC-overflow path, which already wraps the handler's raw output
    /// before deciding to defer it).
    pub fn deliver_raw(&self, id: u64, envelope: String) {
        let mut inner = self.inner.lock().expect("result store mutex poisoned");
        debug_assert!(
            !inner.results.contains_key(&id),
            "double deliver for id {id}"
        );
        inner.results.insert(id, envelope);
        inner.wait.remove(&id);
    }

    /// Drains up to `max_len - 1` bytes from the front of the stored
    /// envelope for `id`. See spec §4.B for the exact state machine:
    /// absent from both sets → empty ("not found"); present only in the
    /// wait set → `[3]`; present in `results` → a chunk, and once the
    /// remainder is empty, the *next* poll erases the entry and frees the
    /// id.
    pub fn poll(&self, id: u64, max_len: usize) -> String {
        let mut inner = self.inner.lock().expect("result store mutex poisoned");

        if let Some(remaining) = inner.results.get_mut(&id) {
            if remaining.is_empty() {
                inner.results.remove(&id);
                drop(inner);
                self.ids.free(id);
                return String::new();
            }
            let take = max_len.saturating_sub(1).min(remaining.len());
            return remaining.drain(..take).collect();
        }

        if inner.wait.contains(&id) {
            return IN_FLIGHT.to_string();
        }

        String::new()
    }
}
