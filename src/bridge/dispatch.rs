//! Dispatch path: the blocking side of a bridge request.
//!
//! Runs on a worker thread. Registers the key, submits the text through the
//! dispatcher, and blocks until the completion path signals or the deadline
//! passes. A [`PendingGuard`] removes the entry on every way out.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::correlation::{CorrelationTable, EntryId};
use super::dispatcher::Dispatcher;
use super::signal::Wait;
use crate::error::BridgeError;

/// Removes its entry from the table when dropped.
///
/// Uses `remove_if_same`, so it can never remove a newer entry that reuses
/// the key.
struct PendingGuard<'a> {
    table: &'a CorrelationTable,
    key: &'a str,
    id: EntryId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.remove_if_same(self.key, self.id) {
            debug!(
                target: "koebashi::bridge::dispatch",
                "Removed pending entry {} for '{}'",
                self.id,
                self.key
            );
        }
    }
}

/// Run one request through the bridge.
///
/// `deadline` bounds the whole call, submission included.
pub(crate) fn dispatch(
    table: &CorrelationTable,
    dispatcher: &Dispatcher,
    key: &str,
    deadline: Duration,
) -> Result<String, BridgeError> {
    let started = Instant::now();

    let Some(registration) = table.insert_if_absent(key) else {
        warn!(
            target: "koebashi::bridge::dispatch",
            "Request '{}' is already in flight, rejecting",
            key
        );
        return Err(BridgeError::DuplicateInFlight {
            key: key.to_string(),
        });
    };
    let _guard = PendingGuard {
        table,
        key,
        id: registration.id,
    };

    if let Err(reason) = dispatcher.submit(key) {
        warn!(
            target: "koebashi::bridge::dispatch",
            "Failed to dispatch '{}': {}",
            key,
            reason
        );
        return Err(BridgeError::DispatchFailed {
            key: key.to_string(),
            reason,
        });
    }

    let remaining = deadline.saturating_sub(started.elapsed());
    debug!(
        target: "koebashi::bridge::dispatch",
        "Waiting up to {:?} for reply to '{}'",
        remaining,
        key
    );

    match registration.wait.wait(remaining) {
        Wait::Signaled(Ok(payload)) => {
            info!(
                target: "koebashi::bridge::dispatch",
                "Request '{}' completed in {:.2?}",
                key,
                started.elapsed()
            );
            Ok(payload)
        }
        Wait::Signaled(Err(source)) => Err(BridgeError::ProcessingFailure {
            key: key.to_string(),
            source,
        }),
        Wait::TimedOut => {
            warn!(
                target: "koebashi::bridge::dispatch",
                "Timed out after {:?} waiting for reply to '{}'",
                deadline,
                key
            );
            Err(BridgeError::ResponseTimeout {
                key: key.to_string(),
                waited: deadline,
            })
        }
        Wait::Abandoned => {
            warn!(
                target: "koebashi::bridge::dispatch",
                "Event loop stopped while '{}' was waiting for its reply",
                key
            );
            Err(BridgeError::Disconnected {
                key: key.to_string(),
            })
        }
    }
}
