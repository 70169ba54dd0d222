//! # Error Translation
//!
//! Maps a [`RawFailure`] onto the [`ErrorKind`] taxonomy. Rules run in order and the
//! first match wins:
//!
//! 1. domain signatures: shape, then memory, then dtype
//! 2. remote runtime unreachable or not started
//! 3. missing remote packages
//! 4. pool-reported timeout
//! 5. anything else is `remote_error`, message and trace kept verbatim
//!
//! Domain signatures are matched on `error_type` first, then on the message text,
//! both ASCII-lowercased. Structured `fields` override whatever is parsed from text.
//!
//! Rules 2 and 4 only fire for failures the pool raised about itself: an exact pool
//! `error_type`, or [`POOL_ORIGIN`](crate::POOL_ORIGIN) in the `origin` field. A
//! `ConnectionError` or `ReadTimeout` thrown by remote user code is a `remote_error`.

use serde_json::Value as Json;

use crate::ErrorKind;
use crate::RawFailure;
use crate::StructuredError;
use crate::error::DTYPE_HINT;
use crate::error::OOM_HINT;
use crate::error::SHAPE_HINT;
use crate::error::TIMEOUT_HINT;
use crate::error::UNAVAILABLE_HINT;

const SHAPE_TYPES: &[&str] = &["shapemismatch", "shapeerror"];
const SHAPE_MARKERS: &[&str] = &[
    "shape mismatch",
    "shapes mismatch",
    "not aligned",
    "could not be broadcast",
    "cannot be multiplied",
    "size mismatch",
    "incompatible shapes",
];

const OOM_TYPES: &[&str] = &["memoryerror", "outofmemory"];
const OOM_MARKERS: &[&str] = &[
    "out of memory",
    "cannot allocate memory",
    "unable to allocate",
    "oom when allocating",
    "memory exhausted",
    "failed to allocate",
];

const DTYPE_TYPES: &[&str] = &["dtypemismatch", "dtypeerror"];
const DTYPE_MARKERS: &[&str] = &[
    "dtype mismatch",
    "expected scalar type",
    "cannot cast array data",
    "expected dtype",
    "data type mismatch",
    "incompatible dtype",
];

const UNAVAILABLE_TYPES: &[&str] = &[
    "remoteunavailable",
    "remoteunavailableerror",
    "sessionunavailable",
    "workerstartuperror",
    "poolnotready",
    "poolnotreadyerror",
];
const UNAVAILABLE_MARKERS: &[&str] = &[
    "remote runtime unavailable",
    "session unavailable",
    "failed to start worker",
    "worker exited",
    "no workers available",
    "pool is not ready",
    "connection refused",
];

const MISSING_PACKAGE_TYPES: &[&str] = &["modulenotfound", "importerror", "missingdependency"];
const NO_MODULE_MARKER: &str = "no module named";

const TIMEOUT_TYPES: &[&str] = &["timeout", "pooltimeout", "sessiontimeout", "calltimeout"];
const TIMEOUT_MARKERS: &[&str] = &["timed out", "deadline exceeded", "timeout expired"];

/// Classifies a raw remote failure.
pub fn translate(raw: &RawFailure) -> StructuredError {
    let sig = Signature::new(raw);

    if sig.matches(SHAPE_TYPES, SHAPE_MARKERS) {
        return shape_mismatch(raw);
    }
    if sig.matches(OOM_TYPES, OOM_MARKERS) {
        return out_of_memory(raw, &sig);
    }
    if sig.matches(DTYPE_TYPES, DTYPE_MARKERS) {
        return dtype_mismatch(raw);
    }

    if sig.pool_matches(UNAVAILABLE_TYPES, UNAVAILABLE_MARKERS) {
        return remote(raw, ErrorKind::RemoteUnavailable).with_suggestion(UNAVAILABLE_HINT);
    }

    if let Some(packages) = missing_packages(raw, &sig) {
        let suggestion = format!(
            "Install the missing packages in the remote environment: {}",
            packages.join(", ")
        );
        return remote(raw, ErrorKind::EnvironmentError)
            .with_detail("missing_packages", packages)
            .with_suggestion(suggestion);
    }

    if sig.pool_matches(TIMEOUT_TYPES, TIMEOUT_MARKERS) {
        return remote(raw, ErrorKind::Timeout).with_suggestion(TIMEOUT_HINT);
    }

    remote(raw, ErrorKind::RemoteError)
}

fn remote(raw: &RawFailure, kind: ErrorKind) -> StructuredError {
    StructuredError::new(kind, raw.message.clone()).with_trace(raw.trace.clone())
}

struct Signature {
    kind: String,
    text: String,
    from_pool: bool,
}

impl Signature {
    fn new(raw: &RawFailure) -> Self {
        let kind = raw
            .error_type
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Self { kind, text: raw.message.to_ascii_lowercase(), from_pool: raw.is_from_pool() }
    }

    fn matches(&self, types: &[&str], markers: &[&str]) -> bool {
        (!self.kind.is_empty() && types.iter().any(|t| self.kind.contains(t)))
            || markers.iter().any(|m| self.text.contains(m))
    }

    /// Exact pool types, or message markers on a failure tagged as coming from the pool.
    fn pool_matches(&self, types: &[&str], markers: &[&str]) -> bool {
        types.contains(&self.kind.as_str()) || (self.from_pool && markers.iter().any(|m| self.text.contains(m)))
    }
}

// ============================================================================
//  DOMAIN KINDS
// ============================================================================

fn shape_mismatch(raw: &RawFailure) -> StructuredError {
    let shapes = match raw.fields.get("shapes") {
        Some(shapes) => shapes.clone(),
        None => Json::from(parse_shapes(&raw.message)),
    };
    remote(raw, ErrorKind::ShapeMismatch).with_detail("shapes", shapes).with_suggestion(SHAPE_HINT)
}

fn out_of_memory(raw: &RawFailure, sig: &Signature) -> StructuredError {
    let device = match raw.fields.get("device") {
        Some(device) => device.clone(),
        None => Json::from(parse_device(&sig.text)),
    };
    let mut err = remote(raw, ErrorKind::OutOfMemory).with_detail("device", device);

    let requested = raw
        .fields
        .get("requested")
        .cloned()
        .or_else(|| parse_requested(&raw.message, &sig.text).map(Json::from));
    if let Some(requested) = requested {
        err = err.with_detail("requested", requested);
    }
    err.with_suggestion(OOM_HINT)
}

fn dtype_mismatch(raw: &RawFailure) -> StructuredError {
    let (expected, actual) = parse_dtypes(&raw.message);
    let mut err = remote(raw, ErrorKind::DtypeMismatch);

    let expected = raw.fields.get("expected").cloned().or(expected.map(Json::from));
    if let Some(expected) = expected {
        err = err.with_detail("expected", expected);
    }
    let actual = raw.fields.get("actual").cloned().or(actual.map(Json::from));
    if let Some(actual) = actual {
        err = err.with_detail("actual", actual);
    }
    err.with_suggestion(DTYPE_HINT)
}

fn missing_packages(raw: &RawFailure, sig: &Signature) -> Option<Vec<String>> {
    if let Some(Json::Array(listed)) = raw.fields.get("missing_packages") {
        let packages: Vec<String> = listed.iter().filter_map(Json::as_str).map(str::to_string).collect();
        if !packages.is_empty() {
            return Some(packages);
        }
    }

    if !sig.matches(MISSING_PACKAGE_TYPES, &[NO_MODULE_MARKER]) {
        return None;
    }

    let mut packages: Vec<String> = Vec::new();
    let mut rest = sig.text.as_str();
    let mut offset = 0;
    while let Some(pos) = rest.find(NO_MODULE_MARKER) {
        let start = offset + pos + NO_MODULE_MARKER.len();
        let name: String = raw.message[start..]
            .chars()
            .skip_while(|c| matches!(c, ' ' | '\'' | '"' | '`'))
            .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
            .collect();
        let top_level = name.split('.').next().unwrap_or_default();
        if !top_level.is_empty() && !packages.iter().any(|p| p == top_level) {
            packages.push(top_level.to_string());
        }
        offset = start;
        rest = &sig.text[start..];
    }

    (!packages.is_empty()).then_some(packages)
}

// ============================================================================
//  SCANNERS
// ============================================================================

/// Shapes written as `(2, 3)` / `[2, 3]`, falling back to `2x3` words.
fn parse_shapes(text: &str) -> Vec<Vec<u64>> {
    let mut shapes = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let close = match bytes[i] {
            b'(' => ')',
            b'[' => ']',
            _ => {
                i += 1;
                continue;
            }
        };
        if let Some(len) = text[i + 1..].find(close) {
            if let Some(dims) = parse_dims(&text[i + 1..i + 1 + len], ',') {
                shapes.push(dims);
                i += len + 2;
                continue;
            }
        }
        i += 1;
    }

    if shapes.is_empty() {
        shapes = text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter_map(|word| parse_dims(word, 'x'))
            .filter(|dims| dims.len() >= 2)
            .collect();
    }
    shapes
}

fn parse_dims(inner: &str, sep: char) -> Option<Vec<u64>> {
    let dims = inner
        .split(sep)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    (!dims.is_empty()).then_some(dims)
}

fn parse_device(lower: &str) -> String {
    if let Some(pos) = lower.find("cuda:") {
        let index = leading_digits(&lower[pos + 5..]);
        if !index.is_empty() {
            return format!("cuda:{}", index);
        }
    }
    if let Some(pos) = lower.find("gpu ") {
        let index = leading_digits(&lower[pos + 4..]);
        if !index.is_empty() {
            return format!("cuda:{}", index);
        }
    }
    if lower.contains("cuda") {
        return "cuda".to_string();
    }
    if lower.split(|c: char| !c.is_ascii_alphanumeric()).any(|word| word == "mps") {
        return "mps".to_string();
    }
    "cpu".to_string()
}

/// `allocate 2.00 GiB` -> `2.00 GiB`.
fn parse_requested(message: &str, lower: &str) -> Option<String> {
    let marker = "allocate ";
    let start = lower.find(marker)? + marker.len();
    let rest = message[start..].trim_start();
    let amount: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    if amount.is_empty() {
        return None;
    }
    let unit: String = rest[amount.len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    match unit.as_str() {
        "" => Some(amount),
        _ => Some(format!("{} {}", amount, unit)),
    }
}

/// `(expected, actual)` as named in the message.
fn parse_dtypes(message: &str) -> (Option<String>, Option<String>) {
    let lower = message.to_ascii_lowercase();

    if let Some(expected) = word_after(message, &lower, "expected scalar type ") {
        return (Some(expected), word_after(message, &lower, "found "));
    }
    if lower.contains("cannot cast array data") {
        let actual = word_after(message, &lower, "from dtype(");
        let expected = word_after(message, &lower, "to dtype(");
        return (expected, actual);
    }
    if let Some(expected) = word_after(message, &lower, "expected dtype ") {
        let actual = word_after(message, &lower, "got ").or_else(|| word_after(message, &lower, "found "));
        return (Some(expected), actual);
    }
    (None, None)
}

fn word_after(message: &str, lower: &str, marker: &str) -> Option<String> {
    let start = lower.find(marker)? + marker.len();
    let word: String = message[start..]
        .chars()
        .skip_while(|c| matches!(c, ' ' | '\'' | '"' | '`'))
        .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.'))
        .collect();
    let word = word.trim_end_matches('.').to_string();
    (!word.is_empty()).then_some(word)
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}
