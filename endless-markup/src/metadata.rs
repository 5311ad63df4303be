//! Structured state carried between generations.

use crate::error::{MarkupError, MarkupResult};
use crate::fragment::truncate_chars;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Length of the string a too-deep value is collapsed into.
const COLLAPSED_VALUE_CHARS: usize = 80;

/// An ordered mapping from keys to JSON-like values. Insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord(Map<String, Value>);

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a parsed JSON value, which must be an object.
    pub fn from_value(value: Value, attribute: &str) -> MarkupResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(MarkupError::MetadataNotAnObject {
                attribute: attribute.to_string(),
                found: json_type_name(&other).to_string(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Inserts or overwrites. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Copies every entry of `other` over this record. `other` wins on conflict.
    pub fn overlay(&mut self, other: &MetadataRecord) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Bounded copy for prompt construction.
    ///
    /// Containers nested more than `max_depth` levels are collapsed into a short JSON string.
    /// At most `max_keys` keys survive, keeping `reserved` keys first and then the rest in
    /// order. Reserved keys survive even when they alone exceed `max_keys`.
    pub fn capped(&self, max_depth: usize, max_keys: usize, reserved: &[&str]) -> MetadataRecord {
        let reserved_present = self
            .keys()
            .filter(|k| reserved.contains(&k.as_str()))
            .count();
        let mut budget = max_keys.saturating_sub(reserved_present);
        let mut out = Map::new();
        for (key, value) in self.iter() {
            if !reserved.contains(&key.as_str()) {
                if budget == 0 {
                    continue;
                }
                budget -= 1;
            }
            out.insert(key.clone(), collapse_depth(value, max_depth));
        }
        if out.len() < self.len() {
            tracing::debug!(
                kept = out.len(),
                dropped = self.len() - out.len(),
                "metadata keys capped"
            );
        }
        MetadataRecord(out)
    }
}

impl From<Map<String, Value>> for MetadataRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn collapse_depth(value: &Value, remaining: usize) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) if remaining == 0 => {
            Value::String(truncate_chars(&value.to_string(), COLLAPSED_VALUE_CHARS))
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), collapse_depth(v, remaining - 1)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| collapse_depth(v, remaining - 1)).collect())
        }
        scalar => scalar.clone(),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> MetadataRecord {
        MetadataRecord::from_value(value, "test").unwrap()
    }

    #[test]
    fn test_overlay_prefers_other_and_keeps_order() {
        let mut base = record(json!({"level": 1, "gold": 10}));
        base.overlay(&record(json!({"gold": 25, "torch": true})));
        assert_eq!(
            serde_json::to_string(&base).unwrap(),
            r#"{"level":1,"gold":25,"torch":true}"#
        );
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = MetadataRecord::from_value(json!([1, 2]), "data-metadata").unwrap_err();
        assert_eq!(
            err,
            MarkupError::MetadataNotAnObject {
                attribute: "data-metadata".to_string(),
                found: "array".to_string(),
            }
        );
    }

    #[test]
    fn test_capped_keeps_reserved_keys() {
        let rec = record(json!({"a": 1, "b": 2, "c": 3, "interactionCount": 4}));
        let capped = rec.capped(4, 2, &["interactionCount"]);
        let keys: Vec<_> = capped.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "interactionCount"]);
    }

    #[test]
    fn test_capped_collapses_deep_values() {
        let rec = record(json!({"map": {"room": {"exits": ["n", "s"]}}}));
        let capped = rec.capped(1, 10, &[]);
        assert_eq!(
            capped.get("map"),
            Some(&json!({"room": r#"{"exits":["n","s"]}"#}))
        );
    }

    #[test]
    fn test_typed_getters_accept_strings() {
        let rec = record(json!({"complex": "true", "agenticSteps": "3", "n": 2}));
        assert_eq!(rec.get_bool("complex"), Some(true));
        assert_eq!(rec.get_u64("agenticSteps"), Some(3));
        assert_eq!(rec.get_u64("n"), Some(2));
        assert_eq!(rec.get_str("n"), None);
    }
}
