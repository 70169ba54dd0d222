//! # Remote References
//!
//! A [`Ref`] is the local stand-in for an object owned by the remote runtime.
//!
//! ## Invariants
//!
//! - A valid ref has a non-empty `id` and a non-empty `type_tag`.
//! - Refs are checked before they are written; an invalid ref never reaches the wire.
//! - [`from_wire`] only accepts objects carrying the `"ref"` discriminator.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Map;
use serde_json::Value as Json;

use crate::SCHEMA_KEY;
use crate::SCHEMA_VERSION;
use crate::TYPE_KEY;
use crate::json_kind;

/// Discriminator value of a wire ref.
pub const REF_TAG: &str = "ref";

/// Identifier assigned by the remote runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefId {
    Str(String),
    Num(u64),
}

impl RefId {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Str(s) if s.is_empty())
    }

    fn to_json(&self) -> Json {
        match self {
            Self::Str(s) => Json::String(s.clone()),
            Self::Num(n) => Json::from(*n),
        }
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", s),
            Self::Num(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for RefId {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for RefId {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<u64> for RefId {
    fn from(n: u64) -> Self {
        Self::Num(n)
    }
}

/// Why a value is not a usable ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidRefReason {
    MissingId,
    MissingType,
    InvalidFormat,
}

impl InvalidRefReason {
    /// The reason code as it appears in error details.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingId => "missing_id",
            Self::MissingType => "missing_type",
            Self::InvalidFormat => "invalid_format",
        }
    }
}

impl fmt::Display for InvalidRefReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ref failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRef {
    pub reason: InvalidRefReason,
    pub details: String,
}

impl InvalidRef {
    pub fn new(reason: InvalidRefReason, details: impl Into<String>) -> Self {
        Self { reason, details: details.into() }
    }

    fn missing_id(details: impl Into<String>) -> Self {
        Self::new(InvalidRefReason::MissingId, details)
    }

    fn missing_type(details: impl Into<String>) -> Self {
        Self::new(InvalidRefReason::MissingType, details)
    }

    fn invalid_format(details: impl Into<String>) -> Self {
        Self::new(InvalidRefReason::InvalidFormat, details)
    }
}

impl fmt::Display for InvalidRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ref ({}): {}", self.reason, self.details)
    }
}

impl std::error::Error for InvalidRef {}

/// A handle to an object living in the remote runtime.
///
/// Fields are public so a ref can be assembled from any source; nothing sends one
/// without calling [`Ref::check`] first.
#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    pub id: RefId,
    pub type_tag: String,
    /// Session owning the object, when the remote side reports it.
    pub session_id: Option<String>,
    /// Auxiliary information such as a display `repr`. Opaque to this crate.
    pub metadata: BTreeMap<String, Json>,
}

impl Ref {
    /// Builds a validated ref.
    pub fn new(id: impl Into<RefId>, type_tag: impl Into<String>) -> Result<Self, InvalidRef> {
        let r = Self::unchecked(id, type_tag);
        r.check()?;
        Ok(r)
    }

    /// Builds a ref without validating it.
    pub fn unchecked(id: impl Into<RefId>, type_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            session_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn check(&self) -> Result<(), InvalidRef> {
        if self.id.is_empty() {
            return Err(InvalidRef::missing_id("id is empty"));
        }
        if self.type_tag.trim().is_empty() {
            return Err(InvalidRef::missing_type("type_tag is empty"));
        }
        if self.session_id.as_deref().is_some_and(str::is_empty) {
            return Err(InvalidRef::invalid_format("session_id is present but empty"));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }

    /// Display representation reported by the remote runtime, if any.
    pub fn repr(&self) -> Option<&str> {
        self.metadata.get("repr").and_then(Json::as_str)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#Ref<{} {}>", self.type_tag, self.id)
    }
}

/// Returns true iff `value` has the shape of a ref: an object with a non-empty
/// `id` and a non-empty `type_tag`.
///
/// The discriminator is not required here; [`from_wire`] enforces it.
pub fn validate(value: &Json) -> bool {
    value.as_object().is_some_and(|obj| parse_fields(obj).is_ok())
}

/// Returns true iff `value` carries the ref discriminator, valid or not.
pub fn is_marker(value: &Json) -> bool {
    value.get(TYPE_KEY).and_then(Json::as_str) == Some(REF_TAG)
}

/// Converts a ref to its canonical wire shape.
pub fn to_wire(r: &Ref) -> Result<Json, InvalidRef> {
    r.check()?;

    let mut obj = Map::new();
    obj.insert(TYPE_KEY.to_string(), Json::from(REF_TAG));
    obj.insert(SCHEMA_KEY.to_string(), Json::from(SCHEMA_VERSION));
    obj.insert("id".to_string(), r.id.to_json());
    obj.insert("type_tag".to_string(), Json::from(r.type_tag.as_str()));

    if let Some(session_id) = &r.session_id {
        obj.insert("session_id".to_string(), Json::from(session_id.as_str()));
    }
    if !r.metadata.is_empty() {
        let metadata = r.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        obj.insert("metadata".to_string(), Json::Object(metadata));
    }

    Ok(Json::Object(obj))
}

/// Converts a wire ref back into a [`Ref`].
pub fn from_wire(value: &Json) -> Result<Ref, InvalidRef> {
    let Some(obj) = value.as_object() else {
        return Err(InvalidRef::invalid_format(format!(
            "expected an object, found {}",
            json_kind(value)
        )));
    };
    from_object(obj)
}

pub(crate) fn from_object(obj: &Map<String, Json>) -> Result<Ref, InvalidRef> {
    match obj.get(TYPE_KEY) {
        Some(Json::String(tag)) if tag == REF_TAG => {}
        Some(other) => {
            return Err(InvalidRef::invalid_format(format!(
                "discriminator is {}, expected \"{}\"",
                other, REF_TAG
            )));
        }
        None => return Err(InvalidRef::invalid_format("missing __type__ discriminator")),
    }

    if let Some(schema) = obj.get(SCHEMA_KEY) {
        match schema.as_u64() {
            Some(v) if v <= SCHEMA_VERSION => {}
            _ => {
                return Err(InvalidRef::invalid_format(format!(
                    "unsupported schema {}, this side speaks {}",
                    schema, SCHEMA_VERSION
                )));
            }
        }
    }

    parse_fields(obj)
}

fn parse_fields(obj: &Map<String, Json>) -> Result<Ref, InvalidRef> {
    let id = match obj.get("id") {
        None | Some(Json::Null) => return Err(InvalidRef::missing_id("id is missing")),
        Some(Json::String(s)) if s.is_empty() => return Err(InvalidRef::missing_id("id is empty")),
        Some(Json::String(s)) => RefId::Str(s.clone()),
        Some(Json::Number(n)) => n.as_u64().map(RefId::Num).ok_or_else(|| {
            InvalidRef::invalid_format(format!("id {} is not a non-negative integer", n))
        })?,
        Some(other) => {
            return Err(InvalidRef::invalid_format(format!(
                "id must be a string or an integer, found {}",
                json_kind(other)
            )));
        }
    };

    let type_tag = match obj.get("type_tag") {
        None | Some(Json::Null) => return Err(InvalidRef::missing_type("type_tag is missing")),
        Some(Json::String(s)) if s.trim().is_empty() => {
            return Err(InvalidRef::missing_type("type_tag is empty"));
        }
        Some(Json::String(s)) => s.clone(),
        Some(other) => {
            return Err(InvalidRef::invalid_format(format!(
                "type_tag must be a string, found {}",
                json_kind(other)
            )));
        }
    };

    let session_id = match obj.get("session_id") {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(other) => {
            return Err(InvalidRef::invalid_format(format!(
                "session_id must be a non-empty string, found {}",
                other
            )));
        }
    };

    let metadata = match obj.get("metadata") {
        None | Some(Json::Null) => BTreeMap::new(),
        Some(Json::Object(m)) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(other) => {
            return Err(InvalidRef::invalid_format(format!(
                "metadata must be an object, found {}",
                json_kind(other)
            )));
        }
    };

    Ok(Ref { id, type_tag, session_id, metadata })
}
