//! One-shot signal between the event loop and a blocked worker.
//!
//! Firing consumes the [`Signal`], so a second signal for the same wait is
//! unrepresentable. The waiting side blocks with an explicit upper bound.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::Duration;

/// Create a connected signal/wait-handle pair.
pub(crate) fn channel<T>() -> (Signal<T>, WaitHandle<T>) {
    let (tx, rx) = sync_channel(1);
    (Signal(tx), WaitHandle(rx))
}

/// Sending half. Fired at most once.
#[derive(Debug)]
pub(crate) struct Signal<T>(SyncSender<T>);

impl<T> Signal<T> {
    /// Deliver `value` to the waiter.
    ///
    /// Returns `false` if the waiter has already given up. Never blocks: the
    /// channel has room for exactly the one value this signal can carry.
    pub(crate) fn fire(self, value: T) -> bool {
        self.0.try_send(value).is_ok()
    }
}

/// Result of a bounded wait.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Wait<T> {
    /// The signal fired with this value.
    Signaled(T),
    /// The timeout elapsed first.
    TimedOut,
    /// The signal was dropped without firing.
    Abandoned,
}

/// Receiving half, owned by the blocked worker.
#[derive(Debug)]
pub(crate) struct WaitHandle<T>(Receiver<T>);

impl<T> WaitHandle<T> {
    /// Block the current thread until signaled or `timeout` elapses.
    pub(crate) fn wait(&self, timeout: Duration) -> Wait<T> {
        match self.0.recv_timeout(timeout) {
            Ok(value) => Wait::Signaled(value),
            Err(RecvTimeoutError::Timeout) => Wait::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Wait::Abandoned,
        }
    }
}
