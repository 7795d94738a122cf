//! Completion path: correlating inbound backend events with waiting requests.
//!
//! Runs on the event loop for every inbound event. Events that cannot be
//! correlated are dropped; they are never guessed at.

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::{debug, error, info, warn};

use super::correlation::{Claim, CorrelationTable, Outcome};
use crate::backend::InboundEvent;
use crate::error::ProcessingError;
use crate::payload::PayloadEncoder;

/// What happened to a single inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completed {
    /// The outcome reached the waiting request.
    Delivered,
    /// The entry was claimed but its waiter left before the signal fired.
    Orphaned,
    /// The event carried no usable back-reference.
    Uncorrelated,
    /// No request is waiting for this key.
    Unknown,
    /// The request already has an outcome.
    Duplicate,
}

/// Correlate `event` with its pending request and deliver the outcome.
pub(crate) fn handle_event<E>(event: InboundEvent, table: &CorrelationTable, encoder: &E) -> Completed
where
    E: PayloadEncoder + ?Sized,
{
    let Some(key) = event
        .reply_to
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
    else {
        warn!(
            target: "koebashi::bridge::completion",
            "Reply without a back-reference to its request, ignoring"
        );
        return Completed::Uncorrelated;
    };

    let completion = match table.claim(key) {
        Claim::Claimed(completion) => completion,
        Claim::Absent => {
            debug!(
                target: "koebashi::bridge::completion",
                "No pending request for '{}', discarding reply",
                key
            );
            return Completed::Unknown;
        }
        Claim::Resolved => {
            debug!(
                target: "koebashi::bridge::completion",
                "Request '{}' already has a result, discarding duplicate reply",
                key
            );
            return Completed::Duplicate;
        }
    };

    let outcome = produce_payload(event.payload.as_deref(), encoder);
    match &outcome {
        Ok(payload) => info!(
            target: "koebashi::bridge::completion",
            "Encoded payload for '{}' ({} chars, entry {})",
            key,
            payload.len(),
            completion.id
        ),
        Err(e) => error!(
            target: "koebashi::bridge::completion",
            "Failed to produce payload for '{}': {}",
            key,
            e
        ),
    }

    if completion.signal.fire(outcome) {
        Completed::Delivered
    } else {
        debug!(
            target: "koebashi::bridge::completion",
            "Request '{}' stopped waiting before its reply was ready",
            key
        );
        Completed::Orphaned
    }
}

/// Encode the raw payload, turning every failure into a `ProcessingError`.
fn produce_payload<E>(payload: Option<&[u8]>, encoder: &E) -> Outcome
where
    E: PayloadEncoder + ?Sized,
{
    let raw = payload.ok_or(ProcessingError::MissingPayload)?;
    match catch_unwind(AssertUnwindSafe(|| encoder.encode(raw))) {
        Ok(encoded) => Ok(encoded?),
        Err(panic) => Err(ProcessingError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
