//! Request-response correlation bridge.
//!
//! This module connects blocking callers to an asynchronous backend whose
//! replies arrive later, out of band, and in no particular order.
//!
//! # Components
//!
//! - `CorrelationTable`: in-flight requests keyed by their normalized text
//! - `dispatch`: the blocking path run by worker threads
//! - `completion`: matches inbound events with waiting requests
//! - `Dispatcher`: the only way from a worker into the event loop
//! - `EventLoop`: the single-threaded loop that owns the backend

mod completion;
mod correlation;
mod dispatch;
mod dispatcher;
mod event_loop;
mod signal;

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub use correlation::{CorrelationTable, EntryId, EntrySnapshot};
pub use dispatcher::{Dispatcher, RetryPolicy};
pub use event_loop::EventLoop;

use crate::backend::{BackendChannel, InboundEvents};
use crate::config::BridgeSettings;
use crate::error::{BridgeError, StartError};
use crate::payload::PayloadEncoder;

/// Blocking entry point into the bridge.
///
/// Cheap to clone and safe to call from any number of worker threads.
/// Never call it from an async task: it blocks the calling thread.
#[derive(Debug, Clone)]
pub struct Bridge {
    table: Arc<CorrelationTable>,
    dispatcher: Dispatcher,
    response_timeout: Duration,
}

impl Bridge {
    pub fn new(table: Arc<CorrelationTable>, dispatcher: Dispatcher, response_timeout: Duration) -> Self {
        Self {
            table,
            dispatcher,
            response_timeout,
        }
    }

    /// Start an event loop for the backend built by `connect` and return a
    /// bridge wired to it.
    pub fn launch<C, Fut, B>(
        connect: C,
        encoder: Arc<dyn PayloadEncoder>,
        settings: &BridgeSettings,
    ) -> Result<(Self, EventLoop), StartError>
    where
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<(B, InboundEvents)>> + 'static,
        B: BackendChannel + 'static,
    {
        let table = Arc::new(CorrelationTable::new());
        let (event_loop, dispatcher) = EventLoop::start(connect, Arc::clone(&table), encoder, settings)?;
        Ok((
            Self::new(table, dispatcher, settings.response_timeout()),
            event_loop,
        ))
    }

    /// Send `text` and block until its reply, using the configured deadline.
    pub fn request(&self, text: &str) -> Result<String, BridgeError> {
        self.request_with_deadline(text, self.response_timeout)
    }

    /// Send `text` and block until its reply or until `deadline` passes.
    ///
    /// `text` is the correlation key and must already be normalized.
    pub fn request_with_deadline(&self, text: &str, deadline: Duration) -> Result<String, BridgeError> {
        dispatch::dispatch(&self.table, &self.dispatcher, text, deadline)
    }

    /// Number of requests currently waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.table.pending_count()
    }

    /// Whether the event loop still accepts submissions.
    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_open()
    }
}
