//! Metadata merging between an activated element and the entry it belongs to.

use endless_markup::{
    InteractiveElement, MetadataRecord, DIRECTIVE_MESSAGE_ATTR, DIRECTIVE_TYPE_ATTR,
};
use serde_json::Value;

pub const INTERACTION_TYPE_KEY: &str = "interactionType";
pub const INTERACTION_COUNT_KEY: &str = "interactionCount";
pub const EXPERIENCE_KIND_KEY: &str = "experienceKind";
pub const COMPLEX_KEY: &str = "complex";
pub const AGENTIC_STEPS_KEY: &str = "agenticSteps";

/// Keys written by the session itself. They survive every cap.
pub const RESERVED_KEYS: &[&str] = &[
    INTERACTION_TYPE_KEY,
    INTERACTION_COUNT_KEY,
    EXPERIENCE_KIND_KEY,
    COMPLEX_KEY,
    AGENTIC_STEPS_KEY,
];

/// Metadata for the request an activation triggers.
///
/// Starts from `parent`, records the element kind, then writes every `data-*` attribute
/// under its dataset key, overwriting parent keys of the same name. Values that parse as
/// JSON keep their type. `interactionCount` goes up by one.
pub fn collect(element: &InteractiveElement, parent: &MetadataRecord) -> MetadataRecord {
    let mut merged = parent.clone();
    merged.insert(INTERACTION_TYPE_KEY, element.kind.as_str());

    for (name, raw) in &element.data {
        if name == DIRECTIVE_TYPE_ATTR || name == DIRECTIVE_MESSAGE_ATTR {
            continue;
        }
        let Some(key) = dataset_key(name) else {
            continue;
        };
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        merged.insert(key, value);
    }

    let count = parent.get_u64(INTERACTION_COUNT_KEY).unwrap_or(0) + 1;
    merged.insert(INTERACTION_COUNT_KEY, count);
    merged
}

/// `data-price-tier` becomes `priceTier`.
pub fn dataset_key(attr: &str) -> Option<String> {
    let rest = attr.strip_prefix("data-")?;
    if rest.is_empty() {
        return None;
    }
    let mut key = String::with_capacity(rest.len());
    let mut upper = false;
    for c in rest.chars() {
        if c == '-' {
            upper = true;
        } else if upper && c.is_ascii_lowercase() {
            key.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            if upper {
                key.push('-');
                upper = false;
            }
            key.push(c);
        }
    }
    if upper {
        key.push('-');
    }
    Some(key)
}

/// Bullet list for prompts. Empty for an empty record.
pub fn format(metadata: &MetadataRecord) -> String {
    metadata
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("- {}: {}", key, s),
            other => format!("- {}: {}", key, other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use endless_markup::sanitize;
    use serde_json::json;

    fn element(markup: &str) -> InteractiveElement {
        sanitize(markup)
            .interactive_elements()
            .into_iter()
            .next()
            .expect("one interactive element")
    }

    #[test]
    fn test_dataset_key() {
        assert_eq!(dataset_key("data-gold").as_deref(), Some("gold"));
        assert_eq!(dataset_key("data-price-tier").as_deref(), Some("priceTier"));
        assert_eq!(dataset_key("data-x-1").as_deref(), Some("x-1"));
        assert_eq!(dataset_key("data-"), None);
        assert_eq!(dataset_key("title"), None);
    }

    #[test]
    fn test_interaction_keys_override_parent() {
        let parent = MetadataRecord::from_value(json!({"level": 1, "gold": 10}), "t").unwrap();
        let merged = collect(&element(r#"<a href="/shop" data-gold="25">Sell</a>"#), &parent);
        assert_eq!(merged.get("level"), Some(&json!(1)));
        assert_eq!(merged.get("gold"), Some(&json!(25)));
        assert_eq!(merged.get(INTERACTION_COUNT_KEY), Some(&json!(1)));
        assert_eq!(merged.get(INTERACTION_TYPE_KEY), Some(&json!("link")));
        assert_eq!(parent.get("gold"), Some(&json!(10)));
    }

    #[test]
    fn test_values_parse_or_fall_back_to_strings() {
        let merged = collect(
            &element(r#"<button data-item="rope" data-items='["a","b"]' data-open="true">Take</button>"#),
            &MetadataRecord::default(),
        );
        assert_eq!(merged.get("item"), Some(&json!("rope")));
        assert_eq!(merged.get("items"), Some(&json!(["a", "b"])));
        assert_eq!(merged.get("open"), Some(&json!(true)));
        assert_eq!(merged.get(INTERACTION_TYPE_KEY), Some(&json!("button")));
    }

    #[test]
    fn test_directive_attributes_excluded() {
        let merged = collect(
            &element(r#"<button onclick="alert('hi')" data-mood="calm">Wave</button>"#),
            &MetadataRecord::default(),
        );
        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(keys, vec![INTERACTION_TYPE_KEY, "mood", INTERACTION_COUNT_KEY]);
    }

    #[test]
    fn test_count_increments() {
        let parent = MetadataRecord::from_value(json!({"interactionCount": 4}), "t").unwrap();
        let merged = collect(&element("<a href='/x'>x</a>"), &parent);
        assert_eq!(merged.get_u64(INTERACTION_COUNT_KEY), Some(5));
    }

    #[test]
    fn test_format() {
        assert_eq!(format(&MetadataRecord::default()), "");
        let record =
            MetadataRecord::from_value(json!({"name": "Ada", "gold": 3, "bag": ["rope"]}), "t")
                .unwrap();
        assert_eq!(format(&record), "- name: Ada\n- gold: 3\n- bag: [\"rope\"]");
    }
}
