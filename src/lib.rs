pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
pub mod normalize;
pub mod payload;
pub mod server;

pub use backend::{BackendChannel, InboundEvent, LoopbackBackend, LoopbackScript, ProcessBackend, SendOutcome};
pub use bridge::{Bridge, EventLoop};
pub use config::{BackendKind, Settings};
pub use error::{BridgeError, ProcessingError, StartError, SubmitError};
pub use normalize::{Normalizer, NumberWords, Verbatim};
pub use payload::{Base64Encoder, EncodeError, PayloadEncoder};
