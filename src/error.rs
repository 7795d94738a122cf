//! Error handling types for koebashi
//!
//! This module provides the error types shared by the bridge, its backends,
//! and the HTTP front-end.

use std::time::Duration;

use thiserror::Error;

use crate::payload::EncodeError;

/// Caller-visible outcome of a failed bridge request.
///
/// Each variant implies a different caller action, so they are never
/// collapsed into a generic failure.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Another request with the same key is already in flight.
    #[error("request already in flight for '{key}'")]
    DuplicateInFlight { key: String },

    /// The request never reached the backend.
    #[error("failed to dispatch '{key}': {reason}")]
    DispatchFailed {
        key: String,
        #[source]
        reason: SubmitError,
    },

    /// The request was dispatched but no correlated reply arrived in time.
    #[error("no response for '{key}' within {waited:?}")]
    ResponseTimeout { key: String, waited: Duration },

    /// The request was dispatched but the event loop stopped before a reply
    /// could arrive.
    #[error("event loop stopped while '{key}' was waiting for a reply")]
    Disconnected { key: String },

    /// A reply was correlated but producing the payload failed.
    #[error("backend failed to produce payload for '{key}': {source}")]
    ProcessingFailure {
        key: String,
        #[source]
        source: ProcessingError,
    },
}

impl BridgeError {
    /// Stable identifier for this error, used in front-end responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::DuplicateInFlight { .. } => "duplicate_in_flight",
            BridgeError::DispatchFailed { .. } => "dispatch_failed",
            BridgeError::ResponseTimeout { .. } => "response_timeout",
            BridgeError::Disconnected { .. } => "disconnected",
            BridgeError::ProcessingFailure { .. } => "processing_failure",
        }
    }

    /// The correlation key of the failed request.
    pub fn key(&self) -> &str {
        match self {
            BridgeError::DuplicateInFlight { key }
            | BridgeError::DispatchFailed { key, .. }
            | BridgeError::ResponseTimeout { key, .. }
            | BridgeError::Disconnected { key }
            | BridgeError::ProcessingFailure { key, .. } => key,
        }
    }

    /// Whether the request certainly never reached the backend, so an
    /// immediate retry cannot duplicate backend-side effects.
    pub fn is_safe_to_retry(&self) -> bool {
        matches!(self, BridgeError::DispatchFailed { .. })
    }
}

/// Why a submission through the cross-context dispatcher failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The backend refused the message.
    #[error("backend rejected the message: {0}")]
    Rejected(String),

    /// The backend was still congested after the single resend.
    #[error("backend still congested after retry (retry after {retry_after:?})")]
    StillCongested { retry_after: Duration },

    /// No acknowledgment arrived within the submission deadline.
    #[error("no acknowledgment from the event loop within {0:?}")]
    AckTimeout(Duration),

    /// The submission deadline passed before the message could be sent.
    #[error("submission expired before it could be sent")]
    Expired,

    /// The event loop is not running.
    #[error("event loop is not running")]
    EventLoopClosed,
}

/// Why a correlated reply could not be turned into a payload.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// The reply carried no payload.
    #[error("reply carried no payload")]
    MissingPayload,

    /// The payload encoder failed.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] EncodeError),

    /// The payload encoder panicked.
    #[error("payload encoder panicked: {0}")]
    Panicked(String),
}

/// Startup failures of the event loop.
#[derive(Debug, Error)]
pub enum StartError {
    /// The event loop thread or runtime could not be created.
    #[error("failed to start event loop: {0}")]
    Io(#[from] std::io::Error),

    /// The backend connection could not be established.
    #[error("failed to connect backend: {0}")]
    Connect(String),

    /// The backend did not connect within the allowed time.
    #[error("backend did not connect within {0:?}")]
    ConnectTimeout(Duration),
}
