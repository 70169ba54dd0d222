//! Runtime options resolved per call.

use std::collections::BTreeMap;
use std::time::Duration;

use farrpc::StructuredError;
use serde_json::Map;
use serde_json::Value as Json;

pub const SESSION_ID: &str = "session_id";
pub const POOL: &str = "pool";
/// Milliseconds, or the string `"infinity"`.
pub const TIMEOUT: &str = "timeout";
pub const STREAM: &str = "stream";
pub const AFFINITY: &str = "affinity";

/// How long a call may wait for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    After(Duration),
    Never,
}

/// An open, ordered mapping of option keys to JSON values.
///
/// Unrecognized keys are carried to the pool untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeOptions {
    entries: BTreeMap<String, Json>,
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_session_id(self, session_id: impl Into<String>) -> Self {
        self.with(SESSION_ID, session_id.into())
    }

    pub fn with_pool(self, pool: impl Into<String>) -> Self {
        self.with(POOL, pool.into())
    }

    pub fn with_timeout(self, timeout: Timeout) -> Self {
        match timeout {
            Timeout::After(d) => self.with(TIMEOUT, d.as_millis() as u64),
            Timeout::Never => self.with(TIMEOUT, "infinity"),
        }
    }

    pub fn with_stream(self, stream: bool) -> Self {
        self.with(STREAM, stream)
    }

    pub fn with_affinity(self, affinity: impl Into<String>) -> Self {
        self.with(AFFINITY, affinity.into())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Json>) -> Option<Json> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Json> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Right-biased merge: keys in `over` win.
    pub fn merge(&self, over: &RuntimeOptions) -> RuntimeOptions {
        let mut merged = self.clone();
        merged.extend(over);
        merged
    }

    pub fn extend(&mut self, over: &RuntimeOptions) {
        for (k, v) in &over.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get(SESSION_ID).and_then(Json::as_str)
    }

    pub fn pool(&self) -> Option<&str> {
        self.get(POOL).and_then(Json::as_str)
    }

    pub fn timeout(&self) -> Option<Timeout> {
        self.get(TIMEOUT).and_then(parse_timeout)
    }

    pub fn stream(&self) -> bool {
        self.get(STREAM).and_then(Json::as_bool).unwrap_or(false)
    }

    pub fn affinity(&self) -> Option<&str> {
        self.get(AFFINITY).and_then(Json::as_str)
    }

    /// Type-checks the recognized keys. `null` counts as unset.
    pub fn check(&self) -> Result<(), StructuredError> {
        for (key, value) in &self.entries {
            if value.is_null() {
                continue;
            }
            let ok = match key.as_str() {
                SESSION_ID => value.as_str().is_some_and(|s| !s.is_empty()),
                POOL | AFFINITY => value.is_string(),
                TIMEOUT => parse_timeout(value).is_some(),
                STREAM => value.is_boolean(),
                _ => true,
            };
            if !ok {
                return Err(StructuredError::validation(format!(
                    "invalid value for option `{}`: {}",
                    key, value
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn to_wire(&self) -> Map<String, Json> {
        self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

fn parse_timeout(value: &Json) -> Option<Timeout> {
    match value {
        Json::String(s) if s == "infinity" => Some(Timeout::Never),
        Json::Number(n) => match n.as_u64() {
            Some(ms) => Some(Timeout::After(Duration::from_millis(ms))),
            None => n
                .as_f64()
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| Timeout::After(Duration::from_secs_f64(ms / 1000.0))),
        },
        _ => None,
    }
}

impl<K: Into<String>, V: Into<Json>> FromIterator<(K, V)> for RuntimeOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl From<BTreeMap<String, Json>> for RuntimeOptions {
    fn from(entries: BTreeMap<String, Json>) -> Self {
        Self { entries }
    }
}
