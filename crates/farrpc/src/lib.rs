//! # FarRPC
//!
//! The request/response protocol spoken across a farcall session boundary.
//!
//! ## Architecture
//!
//! - [`CallPayload`] is the unit of work: a call type, a target (a dotted path or a
//!   [`Ref`](farpack::Ref)), a name and arguments.
//! - [`WireRequest`] wraps the encoded payload with a session and options; [`Reply`] is
//!   what comes back.
//! - A failed reply carries a [`RawFailure`]; [`translate`] turns it into a
//!   [`StructuredError`] that callers can branch on.

mod error;
mod frame;
mod payload;
mod translate;


pub use error::ErrorKind;
pub use error::StructuredError;
pub use frame::ORIGIN_FIELD;
pub use frame::POOL_ORIGIN;
pub use frame::RawFailure;
pub use frame::Reply;
pub use frame::WireRequest;
pub use payload::Args;
pub use payload::CallPayload;
pub use payload::CallType;
pub use payload::PayloadError;
pub use payload::Target;
pub use payload::is_dotted_path;
pub use translate::translate;

/// Protocol failures while building or reading frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A value could not be encoded or decoded.
    Pack(farpack::Error),
    /// The payload broke a call-type invariant.
    Payload(PayloadError),
    /// A wire frame was structurally wrong.
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pack(e) => write!(f, "Pack error: {}", e),
            Self::Payload(e) => write!(f, "Payload error: {}", e),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pack(e) => Some(e),
            Self::Payload(e) => Some(e),
            Self::ProtocolViolation(_) => None,
        }
    }
}

impl From<farpack::Error> for Error {
    fn from(e: farpack::Error) -> Self {
        Self::Pack(e)
    }
}

impl From<farpack::InvalidRef> for Error {
    fn from(e: farpack::InvalidRef) -> Self {
        Self::Payload(PayloadError::InvalidRef(e))
    }
}

impl From<PayloadError> for Error {
    fn from(e: PayloadError) -> Self {
        Self::Payload(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
