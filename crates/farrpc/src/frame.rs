//! Wire frames exchanged with a session pool.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value as Json;

use crate::CallPayload;
use crate::CallType;

/// One call addressed to one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Unique per request; echoed in logs on both sides.
    pub correlation_id: String,
    pub session_id: String,
    /// The encoded [`CallPayload`].
    pub call: Json,
    /// Effective runtime options, merged from defaults, scope and per-call overrides.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Json>,
}

impl WireRequest {
    /// Encodes `payload` into a request. Fails if the payload is invalid.
    pub fn new(
        correlation_id: impl Into<String>,
        session_id: impl Into<String>,
        payload: &CallPayload,
        options: Map<String, Json>,
    ) -> crate::Result<Self> {
        Ok(Self {
            correlation_id: correlation_id.into(),
            session_id: session_id.into(),
            call: payload.to_wire()?,
            options,
        })
    }

    pub fn payload(&self) -> crate::Result<CallPayload> {
        CallPayload::from_wire(&self.call)
    }

    pub fn call_type(&self) -> Option<CallType> {
        self.call.get("call_type").and_then(Json::as_str).and_then(CallType::parse)
    }

    /// Dotted path of a module-level call.
    pub fn target_path(&self) -> Option<&str> {
        self.call.get("target").and_then(Json::as_str)
    }

    pub fn option(&self, key: &str) -> Option<&Json> {
        self.options.get(key)
    }
}

/// What a session pool answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok { value: Json },
    Error { raw_failure: RawFailure },
}

impl Reply {
    pub fn ok(value: impl Into<Json>) -> Self {
        Self::Ok { value: value.into() }
    }

    pub fn error(raw_failure: RawFailure) -> Self {
        Self::Error { raw_failure }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// A failure as the remote side reported it, before translation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFailure {
    #[serde(default)]
    pub message: String,
    /// Exception class name, e.g. `ValueError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Structured fields; these win over anything parsed out of the message.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Field marking who raised a failure.
pub const ORIGIN_FIELD: &str = "origin";
/// [`ORIGIN_FIELD`] value for failures raised by the session pool itself, not by remote user code.
pub const POOL_ORIGIN: &str = "pool";

impl RawFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    /// A failure the pool raised about itself: startup, availability, deadlines.
    pub fn from_pool(message: impl Into<String>) -> Self {
        Self::new(message).with_field(ORIGIN_FIELD, POOL_ORIGIN)
    }

    pub fn is_from_pool(&self) -> bool {
        self.fields.get(ORIGIN_FIELD).and_then(Json::as_str) == Some(POOL_ORIGIN)
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}
