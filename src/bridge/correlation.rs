//! Correlation table for in-flight bridge requests.
//!
//! This module provides the CorrelationTable, the only state shared between
//! the worker threads running the dispatch path and the event loop running
//! the completion path.
//!
//! # Lifecycle
//!
//! - The dispatch path calls `insert_if_absent(key)` and receives a
//!   [`Registration`] holding the wait handle
//! - The completion path calls `claim(key)`, which moves the entry out of
//!   the unset state and hands over its one-shot signal
//! - The dispatch path removes its own entry with `remove_if_same(key, id)`
//!   on every exit, so a late claim finds nothing
//!
//! Every operation takes the same mutex and none of them blocks while
//! holding it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ulid::Ulid;

use super::signal::{self, Signal, WaitHandle};
use crate::error::ProcessingError;

/// What the completion path delivers to a waiting request.
pub(crate) type Outcome = Result<String, ProcessingError>;

/// Identity of a single pending entry.
///
/// Two entries that reuse the same key never share an id, which lets a
/// stale remover tell its own entry apart from a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(Ulid);

impl EntryId {
    fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single in-flight request.
struct PendingEntry {
    id: EntryId,
    /// `Some` while the outcome is unset. Taken exactly once by `claim`.
    signal: Option<Signal<Outcome>>,
    registered_at: Instant,
}

/// Point-in-time view of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub id: EntryId,
    /// Whether the completion path has already claimed this entry.
    pub resolved: bool,
    /// Time since the entry was inserted.
    pub age: Duration,
}

/// Handed to the dispatch path by a successful insert.
#[derive(Debug)]
pub(crate) struct Registration {
    pub(crate) id: EntryId,
    pub(crate) wait: WaitHandle<Outcome>,
}

/// Handed to the completion path by a successful claim.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) id: EntryId,
    pub(crate) signal: Signal<Outcome>,
}

/// Result of a completion-side claim.
#[derive(Debug)]
pub(crate) enum Claim {
    /// No entry for the key: unrelated, timed out, or already finished.
    Absent,
    /// The entry's outcome is already set.
    Resolved,
    /// The caller now owns the entry's signal.
    Claimed(Completion),
}

/// Shared map from correlation key to in-flight request.
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl CorrelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a fresh entry for `key`.
    ///
    /// Returns `None` if an entry for `key` is already present. This is the
    /// single-flight enforcement point.
    pub(crate) fn insert_if_absent(&self, key: &str) -> Option<Registration> {
        let mut entries = self.lock();
        if entries.contains_key(key) {
            return None;
        }

        let (signal, wait) = signal::channel();
        let id = EntryId::generate();
        entries.insert(
            key.to_string(),
            PendingEntry {
                id,
                signal: Some(signal),
                registered_at: Instant::now(),
            },
        );
        Some(Registration { id, wait })
    }

    /// Look up the entry for `key`.
    pub fn get(&self, key: &str) -> Option<EntrySnapshot> {
        let entries = self.lock();
        entries.get(key).map(|entry| EntrySnapshot {
            id: entry.id,
            resolved: entry.signal.is_none(),
            age: entry.registered_at.elapsed(),
        })
    }

    /// Take ownership of the signal for `key` if its outcome is still unset.
    pub(crate) fn claim(&self, key: &str) -> Claim {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return Claim::Absent;
        };
        match entry.signal.take() {
            Some(signal) => Claim::Claimed(Completion {
                id: entry.id,
                signal,
            }),
            None => Claim::Resolved,
        }
    }

    /// Remove the entry for `key`, but only if it is still entry `id`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove_if_same(&self, key: &str, id: EntryId) -> bool {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.id == id => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Release every entry whose outcome is still unset.
    ///
    /// Used when the event loop stops so that no waiter sits out its full
    /// deadline for a reply that can no longer arrive. Each signal is dropped
    /// unfired, which its waiter observes as abandonment. Entries stay in the
    /// table; their dispatchers remove them.
    ///
    /// Returns the number of entries released.
    pub(crate) fn release_all(&self) -> usize {
        let signals: Vec<_> = {
            let mut entries = self.lock();
            entries
                .values_mut()
                .filter_map(|entry| entry.signal.take())
                .collect()
        };

        // Lock released before the signals drop
        signals.len()
    }

    /// Number of in-flight entries.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.pending_count())
            .finish()
    }
}
