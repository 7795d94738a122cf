//! Asynchronous synthesis backends.
//!
//! A backend has two halves that the bridge drives from its event loop:
//!
//! - [`BackendChannel::send`] delivers request text and reports immediately
//!   whether the backend accepted it
//! - an inbound stream of [`InboundEvent`]s carries replies that
//!   back-reference the text they answer, in any order or not at all

mod loopback;
mod process;

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

pub use loopback::{LoopbackBackend, LoopbackScript};
pub use process::ProcessBackend;

/// Capacity of the inbound event queue between a backend and the event loop.
pub const INBOUND_QUEUE_CAPACITY: usize = 256;

/// Immediate result of handing text to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted for delivery. Says nothing about whether a reply will come.
    Accepted,
    /// Transient congestion; the backend asks to wait before resending.
    Congested { retry_after: Duration },
    /// Refused for a reason that waiting will not fix.
    Rejected(String),
}

/// A reply delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Text of the request this reply answers, if the backend supplied one.
    pub reply_to: Option<String>,
    /// Raw payload bytes, if the reply carried any.
    pub payload: Option<Vec<u8>>,
}

impl InboundEvent {
    /// A reply to `text` carrying `payload`.
    pub fn reply(text: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            reply_to: Some(text.into()),
            payload: Some(payload.into()),
        }
    }
}

/// Receiving end of a backend's inbound event stream.
pub type InboundEvents = mpsc::Receiver<InboundEvent>;

/// Outbound half of a backend connection.
///
/// Only ever called from the bridge's single-threaded event loop, one
/// submission at a time, so the returned future need not be `Send`.
pub trait BackendChannel {
    fn send(&self, text: &str) -> impl Future<Output = SendOutcome>;
}
