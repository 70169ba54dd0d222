//! # Farpack
//!
//! The value model shared by both sides of a farcall boundary.
//!
//! ## Philosophy
//!
//! - **Handles, not objects**: Remote objects never cross the boundary. A [`Ref`] names one
//!   and the remote runtime keeps ownership of it.
//! - **Self-describing**: Anything JSON cannot express travels as a tagged object carrying
//!   its own `__type__` discriminator, so decoding never needs schema knowledge.
//!
//! ## Format
//!
//! - **Plain**: null, bools, integers, finite floats, strings, lists and string-keyed maps
//!   are written as the matching JSON value.
//! - **Tagged**: `{"__type__": <tag>, "__schema__": 1, ...}` for tuples, bytes, special
//!   floats, complex numbers, ISO 8601 datetimes, dates and times, and refs.

mod codec;
mod reference;
mod value;

#[cfg(test)]
mod tests;

pub use codec::MAX_DEPTH;
pub use codec::decode;
pub use codec::encode;
pub use reference::InvalidRef;
pub use reference::InvalidRefReason;
pub use reference::REF_TAG;
pub use reference::Ref;
pub use reference::RefId;
pub use reference::from_wire;
pub use reference::is_marker;
pub use reference::to_wire;
pub use reference::validate;
pub use value::Value;

/// Re-exported so downstream crates name the same JSON type.
pub use serde_json::Value as Json;

/// Re-exported for the datetime variants of [`Value`].
pub use chrono;

/// Version written into every tagged object.
pub const SCHEMA_VERSION: u64 = 1;

/// Discriminator key of tagged objects.
pub const TYPE_KEY: &str = "__type__";

/// Schema version key of tagged objects.
pub const SCHEMA_KEY: &str = "__schema__";

/// Farpack encoding and decoding errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A ref failed validation while encoding, or a ref marker was malformed while decoding.
    InvalidRef(InvalidRef),
    /// A `bytes` tag carried data that is not valid base64.
    InvalidBytes(String),
    /// A known tag was missing or carried an unusable field.
    MalformedTag { tag: String, details: String },
    /// The value nests deeper than [`MAX_DEPTH`].
    DepthExceeded,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRef(e) => write!(f, "{}", e),
            Self::InvalidBytes(msg) => write!(f, "invalid base64 in bytes value: {}", msg),
            Self::MalformedTag { tag, details } => write!(f, "malformed `{}` value: {}", tag, details),
            Self::DepthExceeded => write!(f, "value nests deeper than {} levels", MAX_DEPTH),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRef(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InvalidRef> for Error {
    fn from(e: InvalidRef) -> Self {
        Self::InvalidRef(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Short name of a JSON value's kind, for diagnostics.
pub(crate) fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "object",
    }
}
