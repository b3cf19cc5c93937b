//! Requirement maps
//!
//! Caller-supplied key/value input that steers optional-step inclusion and
//! duration scaling during plan generation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key holding the complexity level (`high`, `low`, anything else = unspecified)
pub const COMPLEXITY_KEY: &str = "complexity";

/// Free-form requirement map, ordered by key so plans serialize deterministically
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Requirements(BTreeMap<String, Value>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: &Requirements) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Whether `key` is present and truthy.
    ///
    /// Absent keys are false: optional steps are only included when a caller
    /// asks for them.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.0.get(key).map(is_truthy).unwrap_or(false)
    }

    pub fn complexity(&self) -> Complexity {
        match self.0.get(COMPLEXITY_KEY).and_then(Value::as_str) {
            Some(level) if level.eq_ignore_ascii_case("high") => Complexity::High,
            Some(level) if level.eq_ignore_ascii_case("low") => Complexity::Low,
            _ => Complexity::Unspecified,
        }
    }

    /// Parse a `key=value` assignment. The value is read as JSON when it
    /// parses (`true`, `3`, `"x"`), otherwise kept as a plain string.
    pub fn parse_assignment(raw: &str) -> Option<(String, Value)> {
        let (key, value) = raw.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let value = value.trim();
        let parsed =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        Some((key.to_string(), parsed))
    }
}

impl FromIterator<(String, Value)> for Requirements {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Truthiness used for requirement gates
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "on" | "1" | "enabled"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Duration scaling driven by the `complexity` requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    High,
    Low,
    Unspecified,
}

impl Complexity {
    pub fn multiplier(&self) -> f64 {
        match self {
            Complexity::High => 1.5,
            Complexity::Low => 0.8,
            Complexity::Unspecified => 1.0,
        }
    }

    /// Scale a base duration and round to whole minutes.
    pub fn scale(&self, base_minutes: u32) -> u32 {
        (f64::from(base_minutes) * self.multiplier()).round() as u32
    }
}
