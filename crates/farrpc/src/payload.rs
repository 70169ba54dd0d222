//! # Call Payloads
//!
//! A [`CallPayload`] is the unit of work sent across the boundary.
//!
//! ## Invariants
//!
//! - `method`, `get_attr` and `set_attr` target a valid [`Ref`].
//! - `function` and `constructor` target a non-empty dotted path.
//! - Every ref in the arguments or the assigned value is valid before anything is encoded.
//!
//! ## Wire shape
//!
//! | call_type | fields |
//! |---|---|
//! | function / constructor | `target` (dotted path, name merged in), `args`, `kwargs`? |
//! | method | `target` (wire ref), `name`, `args`, `kwargs`? |
//! | get_attr | `target` (wire ref), `name` |
//! | set_attr | `target` (wire ref), `name`, `value` |

use std::collections::BTreeMap;
use std::fmt;

use farpack::InvalidRef;
use farpack::Ref;
use farpack::Value;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value as Json;

use crate::Error;

/// What kind of remote operation a payload asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Function,
    Constructor,
    Method,
    GetAttr,
    SetAttr,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Constructor => "constructor",
            Self::Method => "method",
            Self::GetAttr => "get_attr",
            Self::SetAttr => "set_attr",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "constructor" => Some(Self::Constructor),
            "method" => Some(Self::Method),
            "get_attr" => Some(Self::GetAttr),
            "set_attr" => Some(Self::SetAttr),
            _ => None,
        }
    }

    /// Whether the call addresses an existing remote object.
    pub fn targets_ref(&self) -> bool {
        matches!(self, Self::Method | Self::GetAttr | Self::SetAttr)
    }

    fn takes_args(&self) -> bool {
        matches!(self, Self::Function | Self::Constructor | Self::Method)
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a payload is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Dotted path of a module-level function or class, e.g. `numpy.linalg.norm`.
    Path(String),
    /// An existing remote object.
    Ref(Ref),
}

/// Call arguments: positional values plus optional keyword values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    fn refs(&self) -> impl Iterator<Item = &Ref> {
        self.positional
            .iter()
            .chain(self.keyword.values())
            .flat_map(Value::refs)
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Self { positional, keyword: BTreeMap::new() }
    }
}

impl<const N: usize> From<[Value; N]> for Args {
    fn from(positional: [Value; N]) -> Self {
        Self::from(Vec::from(positional))
    }
}

/// A payload broke a call-type invariant.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    /// A ref in the target, arguments or value failed validation.
    InvalidRef(InvalidRef),
    /// A module-level target is not a non-empty dotted identifier.
    InvalidPath(String),
    /// A method or attribute name is not an identifier.
    InvalidName(String),
    /// The target kind does not fit the call type.
    TargetMismatch { call_type: CallType, expected: &'static str },
    /// `set_attr` without a value.
    MissingValue,
    /// `get_attr` and `set_attr` take no arguments.
    UnexpectedArgs(CallType),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRef(e) => write!(f, "{}", e),
            Self::InvalidPath(path) => write!(f, "invalid target path {:?}: expected a dotted identifier", path),
            Self::InvalidName(name) => write!(f, "invalid name {:?}: expected an identifier", name),
            Self::TargetMismatch { call_type, expected } => {
                write!(f, "{} call requires {} as its target", call_type, expected)
            }
            Self::MissingValue => write!(f, "set_attr requires a value"),
            Self::UnexpectedArgs(call_type) => write!(f, "{} takes no arguments", call_type),
        }
    }
}

impl std::error::Error for PayloadError {}

impl From<InvalidRef> for PayloadError {
    fn from(e: InvalidRef) -> Self {
        Self::InvalidRef(e)
    }
}

/// The unit of work sent across the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPayload {
    pub call_type: CallType,
    pub target: Target,
    /// Method or attribute name. For module-level calls it is appended to the path.
    pub name: Option<String>,
    pub args: Args,
    /// Assigned value, `set_attr` only.
    pub value: Option<Value>,
}

impl CallPayload {
    pub fn function(path: impl Into<String>, args: impl Into<Args>) -> Self {
        Self::module_level(CallType::Function, path.into(), args.into())
    }

    pub fn constructor(path: impl Into<String>, args: impl Into<Args>) -> Self {
        Self::module_level(CallType::Constructor, path.into(), args.into())
    }

    pub fn method(target: Ref, name: impl Into<String>, args: impl Into<Args>) -> Self {
        Self {
            call_type: CallType::Method,
            target: Target::Ref(target),
            name: Some(name.into()),
            args: args.into(),
            value: None,
        }
    }

    pub fn get_attr(target: Ref, name: impl Into<String>) -> Self {
        Self {
            call_type: CallType::GetAttr,
            target: Target::Ref(target),
            name: Some(name.into()),
            args: Args::new(),
            value: None,
        }
    }

    pub fn set_attr(target: Ref, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            call_type: CallType::SetAttr,
            target: Target::Ref(target),
            name: Some(name.into()),
            args: Args::new(),
            value: Some(value.into()),
        }
    }

    fn module_level(call_type: CallType, path: String, args: Args) -> Self {
        Self { call_type, target: Target::Path(path), name: None, args, value: None }
    }

    /// Full dotted path of a module-level call, with `name` merged in.
    pub fn path(&self) -> Option<String> {
        match (&self.target, &self.name) {
            (Target::Path(path), Some(name)) => Some(format!("{}.{}", path, name)),
            (Target::Path(path), None) => Some(path.clone()),
            (Target::Ref(_), _) => None,
        }
    }

    /// The ref this payload addresses, if any.
    pub fn target_ref(&self) -> Option<&Ref> {
        match &self.target {
            Target::Ref(r) => Some(r),
            Target::Path(_) => None,
        }
    }

    /// Checks every call-type invariant without encoding anything.
    pub fn validate(&self) -> Result<(), PayloadError> {
        match (&self.target, self.call_type.targets_ref()) {
            (Target::Ref(r), true) => r.check()?,
            (Target::Path(_), false) => {
                let path = self.path().unwrap_or_default();
                if !is_dotted_path(&path) {
                    return Err(PayloadError::InvalidPath(path));
                }
            }
            (Target::Path(_), true) => {
                return Err(PayloadError::TargetMismatch { call_type: self.call_type, expected: "a ref" });
            }
            (Target::Ref(_), false) => {
                return Err(PayloadError::TargetMismatch {
                    call_type: self.call_type,
                    expected: "a dotted path",
                });
            }
        }

        if self.call_type.targets_ref() {
            let name = self.name.as_deref().unwrap_or_default();
            if !is_identifier(name) {
                return Err(PayloadError::InvalidName(name.to_string()));
            }
        }

        if !self.call_type.takes_args() && !self.args.is_empty() {
            return Err(PayloadError::UnexpectedArgs(self.call_type));
        }

        match (&self.value, self.call_type) {
            (None, CallType::SetAttr) => return Err(PayloadError::MissingValue),
            (Some(value), _) => value.refs().into_iter().try_for_each(Ref::check)?,
            (None, _) => {}
        }

        self.args.refs().try_for_each(Ref::check)?;
        Ok(())
    }

    /// Validates and encodes the payload into its wire shape.
    pub fn to_wire(&self) -> crate::Result<Json> {
        self.validate()?;

        let mut obj = Map::new();
        obj.insert("call_type".to_string(), Json::from(self.call_type.as_str()));

        match &self.target {
            Target::Path(_) => {
                obj.insert("target".to_string(), Json::from(self.path().unwrap_or_default()));
            }
            Target::Ref(r) => {
                obj.insert("target".to_string(), farpack::to_wire(r)?);
                obj.insert("name".to_string(), Json::from(self.name.clone().unwrap_or_default()));
            }
        }

        if self.call_type.takes_args() {
            let args = self
                .args
                .positional
                .iter()
                .map(farpack::encode)
                .collect::<farpack::Result<Vec<_>>>()?;
            obj.insert("args".to_string(), Json::Array(args));

            if !self.args.keyword.is_empty() {
                let kwargs = self
                    .args
                    .keyword
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), farpack::encode(v)?)))
                    .collect::<farpack::Result<Map<String, Json>>>()?;
                obj.insert("kwargs".to_string(), Json::Object(kwargs));
            }
        }

        if let Some(value) = &self.value {
            obj.insert("value".to_string(), farpack::encode(value)?);
        }

        Ok(Json::Object(obj))
    }

    /// Decodes a wire payload; the inverse of [`CallPayload::to_wire`].
    pub fn from_wire(json: &Json) -> crate::Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| Error::ProtocolViolation("call payload must be an object".into()))?;

        let call_type = obj
            .get("call_type")
            .and_then(Json::as_str)
            .and_then(CallType::parse)
            .ok_or_else(|| Error::ProtocolViolation("missing or unknown call_type".into()))?;

        let raw_target = obj
            .get("target")
            .ok_or_else(|| Error::ProtocolViolation("missing target".into()))?;
        let target = if call_type.targets_ref() {
            Target::Ref(farpack::from_wire(raw_target)?)
        } else {
            let path = raw_target
                .as_str()
                .ok_or_else(|| Error::ProtocolViolation("target must be a dotted path".into()))?;
            Target::Path(path.to_string())
        };

        let name = match obj.get("name") {
            None | Some(Json::Null) => None,
            Some(Json::String(s)) => Some(s.clone()),
            Some(_) => return Err(Error::ProtocolViolation("name must be a string".into())),
        };

        let positional = match obj.get("args") {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::Array(items)) => items.iter().map(farpack::decode).collect::<farpack::Result<_>>()?,
            Some(_) => return Err(Error::ProtocolViolation("args must be a list".into())),
        };

        let keyword = match obj.get("kwargs") {
            None | Some(Json::Null) => BTreeMap::new(),
            Some(Json::Object(entries)) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), farpack::decode(v)?)))
                .collect::<farpack::Result<_>>()?,
            Some(_) => return Err(Error::ProtocolViolation("kwargs must be an object".into())),
        };

        let value = obj.get("value").map(farpack::decode).transpose()?;

        let payload = Self { call_type, target, name, args: Args { positional, keyword }, value };
        payload.validate()?;
        Ok(payload)
    }
}

/// A non-empty identifier: a letter or `_`, then letters, digits or `_`.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// A non-empty dotted identifier such as `math.sqrt`.
pub fn is_dotted_path(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}
