//! Payload encoding for delivered audio.
//!
//! The bridge never interprets payload bytes. It only hands them to a
//! [`PayloadEncoder`] that turns them into the string returned to callers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Errors produced while encoding a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The payload contained no bytes.
    #[error("payload is empty")]
    Empty,

    /// The encoder rejected the payload.
    #[error("{0}")]
    Invalid(String),
}

/// Turns raw payload bytes into a transport string.
///
/// Implementations must be pure from the bridge's point of view. They run
/// on the event loop, so they should also be quick.
pub trait PayloadEncoder: Send + Sync {
    fn encode(&self, raw: &[u8]) -> Result<String, EncodeError>;
}

/// Standard padded base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Encoder;

impl PayloadEncoder for Base64Encoder {
    fn encode(&self, raw: &[u8]) -> Result<String, EncodeError> {
        if raw.is_empty() {
            return Err(EncodeError::Empty);
        }
        Ok(STANDARD.encode(raw))
    }
}

/// Decode a base64 payload received from a backend.
pub(crate) fn decode_base64(encoded: &str) -> Result<Vec<u8>, EncodeError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| EncodeError::Invalid(e.to_string()))
}
