//! # Tagged JSON Codec
//!
//! Translates [`Value`] trees to and from their JSON wire form.
//!
//! Decoding is a plain tree walk: wherever a ref marker appears, at any depth, it is
//! rebuilt into a [`Ref`](crate::Ref). Tags this side does not know are kept as maps.
//!
//! Datetimes, dates and times travel as ISO 8601 strings in a `value` field.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::SecondsFormat;
use serde_json::Map;
use serde_json::Value as Json;

use crate::Error;
use crate::Result;
use crate::SCHEMA_KEY;
use crate::SCHEMA_VERSION;
use crate::TYPE_KEY;
use crate::reference;
use crate::reference::REF_TAG;
use crate::value::Value;

/// Deepest nesting accepted in either direction.
pub const MAX_DEPTH: usize = 128;

// `%.f` writes no fraction for whole seconds, else 3, 6 or 9 digits.
const NAIVE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

// ============================================================================
//  ENCODING (Value -> JSON)
// ============================================================================

/// Encodes a value into its wire form.
///
/// Fails if the tree holds an invalid ref or nests deeper than [`MAX_DEPTH`].
pub fn encode(value: &Value) -> Result<Json> {
    encode_at(value, 0)
}

fn encode_at(value: &Value, depth: usize) -> Result<Json> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }

    let json = match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::from(*n),
        Value::Float(f) => encode_float(*f),
        Value::Str(s) => Json::String(s.clone()),
        Value::Bytes(data) => tagged("bytes", [("data", Json::String(STANDARD.encode(data)))]),
        Value::Complex { re, im } => tagged("complex", [("real", Json::from(*re)), ("imag", Json::from(*im))]),
        Value::DateTime(dt) => iso("datetime", dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        Value::NaiveDateTime(dt) => iso("datetime", dt.format(NAIVE_DATETIME_FORMAT).to_string()),
        Value::Date(d) => iso("date", d.format(DATE_FORMAT).to_string()),
        Value::Time(t) => iso("time", t.format(TIME_FORMAT).to_string()),
        Value::List(items) => Json::Array(encode_items(items, depth)?),
        Value::Tuple(items) => tagged("tuple", [("elements", Json::Array(encode_items(items, depth)?))]),
        Value::Map(entries) => {
            let obj = entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), encode_at(v, depth + 1)?)))
                .collect::<Result<Map<String, Json>>>()?;
            Json::Object(obj)
        }
        Value::Ref(r) => reference::to_wire(r)?,
    };
    Ok(json)
}

fn encode_items(items: &[Value], depth: usize) -> Result<Vec<Json>> {
    items.iter().map(|item| encode_at(item, depth + 1)).collect()
}

fn encode_float(f: f64) -> Json {
    if f.is_nan() {
        tagged("special_float", [("value", Json::from("nan"))])
    } else if f == f64::INFINITY {
        tagged("special_float", [("value", Json::from("infinity"))])
    } else if f == f64::NEG_INFINITY {
        tagged("special_float", [("value", Json::from("neg_infinity"))])
    } else {
        Json::from(f)
    }
}

fn iso(tag: &str, text: String) -> Json {
    tagged(tag, [("value", Json::String(text))])
}

fn tagged<const N: usize>(tag: &str, fields: [(&str, Json); N]) -> Json {
    let mut obj = Map::new();
    obj.insert(TYPE_KEY.to_string(), Json::from(tag));
    obj.insert(SCHEMA_KEY.to_string(), Json::from(SCHEMA_VERSION));
    for (key, value) in fields {
        obj.insert(key.to_string(), value);
    }
    Json::Object(obj)
}

// ============================================================================
//  DECODING (JSON -> Value)
// ============================================================================

/// Decodes a wire value, rebuilding every embedded ref.
///
/// A ref marker that fails validation is an error, never passed through as a map.
pub fn decode(json: &Json) -> Result<Value> {
    decode_at(json, 0)
}

fn decode_at(json: &Json, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }

    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            // u64 above i64::MAX, or a float
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(decode_items(items, depth)?),
        Json::Object(obj) => match obj.get(TYPE_KEY).and_then(Json::as_str) {
            Some(tag) => decode_tagged(tag, obj, depth)?,
            None => decode_map(obj, depth)?,
        },
    };
    Ok(value)
}

fn decode_items(items: &[Json], depth: usize) -> Result<Vec<Value>> {
    items.iter().map(|item| decode_at(item, depth + 1)).collect()
}

fn decode_map(obj: &Map<String, Json>, depth: usize) -> Result<Value> {
    let entries = obj
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode_at(v, depth + 1)?)))
        .collect::<Result<_>>()?;
    Ok(Value::Map(entries))
}

fn decode_tagged(tag: &str, obj: &Map<String, Json>, depth: usize) -> Result<Value> {
    match tag {
        REF_TAG => Ok(Value::Ref(reference::from_object(obj)?)),
        "tuple" => Ok(Value::Tuple(decode_items(elements(obj), depth)?)),
        // no set type locally; order is whatever the remote side sorted
        "set" | "frozenset" => Ok(Value::List(decode_items(elements(obj), depth)?)),
        "bytes" => {
            let data = obj
                .get("data")
                .or_else(|| obj.get("value"))
                .and_then(Json::as_str)
                .ok_or_else(|| malformed(tag, "missing base64 `data` field"))?;
            STANDARD
                .decode(data)
                .map(Value::Bytes)
                .map_err(|e| Error::InvalidBytes(e.to_string()))
        }
        "special_float" => {
            let which = obj.get("value").and_then(Json::as_str).unwrap_or_default();
            special_float(which).ok_or_else(|| malformed(tag, format!("unknown value {:?}", which)))
        }
        "complex" => {
            let part = |key: &str| {
                obj.get(key)
                    .and_then(Json::as_f64)
                    .ok_or_else(|| malformed(tag, format!("missing numeric `{}` field", key)))
            };
            Ok(Value::Complex { re: part("real")?, im: part("imag")? })
        }
        "datetime" => {
            let text = iso_text(tag, obj)?;
            match DateTime::parse_from_rfc3339(text) {
                Ok(dt) => Ok(Value::DateTime(dt)),
                Err(_) => text
                    .parse::<NaiveDateTime>()
                    .map(Value::NaiveDateTime)
                    .map_err(|e| malformed(tag, format!("{:?}: {}", text, e))),
            }
        }
        "date" => {
            let text = iso_text(tag, obj)?;
            text.parse::<NaiveDate>().map(Value::Date).map_err(|e| malformed(tag, format!("{:?}: {}", text, e)))
        }
        "time" => {
            let text = iso_text(tag, obj)?;
            text.parse::<NaiveTime>().map(Value::Time).map_err(|e| malformed(tag, format!("{:?}: {}", text, e)))
        }
        // legacy bare tags
        "infinity" => Ok(Value::Float(f64::INFINITY)),
        "neg_infinity" => Ok(Value::Float(f64::NEG_INFINITY)),
        "nan" => Ok(Value::Float(f64::NAN)),
        "atom" => obj
            .get("value")
            .and_then(Json::as_str)
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(|| malformed(tag, "missing string `value` field")),
        _ => decode_map(obj, depth),
    }
}

fn iso_text<'a>(tag: &str, obj: &'a Map<String, Json>) -> Result<&'a str> {
    obj.get("value")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed(tag, "missing ISO 8601 `value` field"))
}

fn elements(obj: &Map<String, Json>) -> &[Json] {
    obj.get("elements")
        .or_else(|| obj.get("value"))
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn special_float(which: &str) -> Option<Value> {
    match which {
        "infinity" => Some(Value::Float(f64::INFINITY)),
        "neg_infinity" => Some(Value::Float(f64::NEG_INFINITY)),
        "nan" => Some(Value::Float(f64::NAN)),
        _ => None,
    }
}

fn malformed(tag: &str, details: impl Into<String>) -> Error {
    Error::MalformedTag { tag: tag.to_string(), details: details.into() }
}
