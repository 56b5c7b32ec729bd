//! Value types that flow between callers, the cache and the stores.
//!
//! Nothing in here ever prints secret material: [`SecretString`] and
//! [`SecretValue`] both redact their `Debug` output, and `SecretString`
//! additionally redacts on serialization and zeroes its buffer on drop.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const REDACTED: &str = "[REDACTED]";

/// A string that never shows up in logs, debug output or serialized bundles.
///
/// Use [`expose_secret`](SecretString::expose_secret) when the raw value is
/// genuinely needed (handing it to a driver, writing it to a store).
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the raw value. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// First `n` characters, for operator-facing existence checks.
    pub fn preview(&self, n: usize) -> String {
        self.0.chars().take(n).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretString)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString({REDACTED})")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A secret as stored: either one opaque string or a flat map of fields
/// such as `{username, password, host}`.
///
/// Serializes with real values so stores can persist it; debug output is
/// redacted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretValue {
    Text(String),
    Fields(Map<String, Value>),
}

impl SecretValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Build a field map from `(name, value)` pairs.
    pub fn fields<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Fields(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Parse a raw payload: JSON objects become `Fields`, anything else is `Text`.
    pub fn from_payload(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
                return Self::Fields(map);
            }
        }
        Self::Text(raw.to_string())
    }

    /// Inverse of [`from_payload`](Self::from_payload).
    pub fn to_payload(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Fields(map) => Value::Object(map.clone()).to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Fields(_) => None,
        }
    }

    pub fn as_fields(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Fields(map) => Some(map),
            Self::Text(_) => None,
        }
    }

    /// Coerce into a field map; a scalar becomes `{"value": scalar}`.
    pub fn into_fields(self) -> Map<String, Value> {
        match self {
            Self::Fields(map) => map,
            Self::Text(s) => {
                let mut map = Map::new();
                map.insert("value".to_string(), Value::String(s));
                map
            }
        }
    }

    /// Read one field as a string. Numbers and booleans are stringified;
    /// a `Text` value answers only to the `value` field.
    pub fn field_str(&self, name: &str) -> Option<String> {
        match self {
            Self::Text(s) if name == "value" => Some(s.clone()),
            Self::Text(_) => None,
            Self::Fields(map) => match map.get(name)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            },
        }
    }

    /// The string used for previews and validation: the text itself, or
    /// the `value` field of a map.
    pub fn primary_text(&self) -> Option<String> {
        self.field_str("value")
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(_) => write!(f, "SecretValue::Text({REDACTED})"),
            Self::Fields(map) => {
                let names: Vec<&String> = map.keys().collect();
                write!(f, "SecretValue::Fields({names:?} = {REDACTED})")
            }
        }
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<&SecretString> for SecretValue {
    fn from(s: &SecretString) -> Self {
        Self::Text(s.expose_secret().to_string())
    }
}

impl From<Map<String, Value>> for SecretValue {
    fn from(map: Map<String, Value>) -> Self {
        Self::Fields(map)
    }
}

/// Descriptive attributes attached at write time.
///
/// The broker never interprets these; they are handed to the store, which
/// may map them onto labels, tags or annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub owner: Option<String>,
    pub rotation_policy: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SecretMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_rotation_policy(mut self, policy: impl Into<String>) -> Self {
        self.rotation_policy = Some(policy.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Flatten into a single string map (owner and rotation policy become
    /// reserved entries), for stores that only support tags.
    pub fn to_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.labels.clone();
        if let Some(owner) = &self.owner {
            tags.insert("owner".to_string(), owner.clone());
        }
        if let Some(policy) = &self.rotation_policy {
            tags.insert("rotation-policy".to_string(), policy.clone());
        }
        tags
    }
}
