//! # Structured Errors
//!
//! Every failure a caller sees, local or remote, is a [`StructuredError`] with one
//! [`ErrorKind`]. Callers branch on the kind, never on message text.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use farpack::InvalidRef;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::PayloadError;

pub(crate) const INVALID_REF_HINT: &str =
    "Refs come back from remote calls; pass them through unchanged instead of building them by hand.";
pub(crate) const SHAPE_HINT: &str = "Check that the operand shapes agree for this operation.";
pub(crate) const OOM_HINT: &str =
    "Reduce the batch or array size, or free memory on the device before retrying.";
pub(crate) const DTYPE_HINT: &str = "Convert the operands to a common dtype before the call.";
pub(crate) const UNAVAILABLE_HINT: &str =
    "The remote runtime could not be reached. Check that the session pool is running.";
pub(crate) const TIMEOUT_HINT: &str =
    "Raise the `timeout` option, or split the work into smaller calls.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRef,
    ValidationError,
    ShapeMismatch,
    OutOfMemory,
    DtypeMismatch,
    EnvironmentError,
    RemoteUnavailable,
    Timeout,
    RemoteError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRef => "invalid_ref",
            Self::ValidationError => "validation_error",
            Self::ShapeMismatch => "shape_mismatch",
            Self::OutOfMemory => "out_of_memory",
            Self::DtypeMismatch => "dtype_mismatch",
            Self::EnvironmentError => "environment_error",
            Self::RemoteUnavailable => "remote_unavailable",
            Self::Timeout => "timeout",
            Self::RemoteError => "remote_error",
        }
    }

    /// Raised before anything is sent.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidRef | Self::ValidationError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_remote_trace: Option<String>,
}

impl StructuredError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: BTreeMap::new(),
            suggestion: None,
            raw_remote_trace: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_trace(mut self, trace: Option<String>) -> Self {
        self.raw_remote_trace = trace;
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Json> {
        self.details.get(key)
    }

    /// `details.reason` carries the reason code.
    pub fn invalid_ref(e: &InvalidRef) -> Self {
        Self::new(ErrorKind::InvalidRef, e.to_string())
            .with_detail("reason", e.reason.as_str())
            .with_suggestion(INVALID_REF_HINT)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn timeout(after: Duration) -> Self {
        let ms = after.as_millis() as u64;
        Self::new(ErrorKind::Timeout, format!("call timed out after {} ms", ms)).with_suggestion(TIMEOUT_HINT)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteUnavailable, message).with_suggestion(UNAVAILABLE_HINT)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteError, message)
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StructuredError {}

impl From<InvalidRef> for StructuredError {
    fn from(e: InvalidRef) -> Self {
        Self::invalid_ref(&e)
    }
}

impl From<PayloadError> for StructuredError {
    fn from(e: PayloadError) -> Self {
        match e {
            PayloadError::InvalidRef(e) => Self::invalid_ref(&e),
            other => Self::validation(other.to_string()),
        }
    }
}
