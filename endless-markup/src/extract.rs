//! Label and metadata derivation from sanitized fragments.

use crate::error::MarkupResult;
use crate::fragment::{truncate_chars, Element, Fragment};
use crate::metadata::MetadataRecord;
use crate::sanitizer::SanitizedFragment;

/// Attribute holding a JSON object of state the generator wants carried forward.
pub const STATIC_METADATA_ATTR: &str = "data-metadata";

pub const DEFAULT_FALLBACK_LABEL: &str = "Initial Experience";

pub const MAX_LABEL_CHARS: usize = 100;

/// Paragraphs and loose lines of text must be longer than this to serve as a label.
const MIN_TEXT_LABEL_CHARS: usize = 10;

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

const TITLE_ATTRS: &[&str] = &["title", "data-title"];

impl AsRef<Fragment> for Fragment {
    fn as_ref(&self) -> &Fragment {
        self
    }
}

impl AsRef<Fragment> for SanitizedFragment {
    fn as_ref(&self) -> &Fragment {
        self.fragment()
    }
}

pub fn extract_label(fragment: impl AsRef<Fragment>) -> String {
    extract_label_with_fallback(fragment, DEFAULT_FALLBACK_LABEL)
}

/// Short human-readable label, never empty and at most [`MAX_LABEL_CHARS`] characters.
///
/// Tries, in order: the first non-empty heading, the first title attribute, the first
/// paragraph longer than ten characters, the first line of visible text longer than ten
/// characters, then `fallback`.
pub fn extract_label_with_fallback(fragment: impl AsRef<Fragment>, fallback: &str) -> String {
    let fragment = fragment.as_ref();
    let elements = fragment.elements();

    let heading = || {
        elements
            .iter()
            .filter(|el| HEADINGS.contains(&el.tag.as_str()))
            .map(|el| el.text_content())
            .find(|t| !t.is_empty())
    };
    let title = || elements.iter().find_map(|el| title_attr(el));
    let paragraph = || {
        elements
            .iter()
            .filter(|el| el.tag == "p")
            .map(|el| el.text_content())
            .find(|t| t.chars().count() > MIN_TEXT_LABEL_CHARS)
    };
    let first_line = || {
        fragment
            .visible_text()
            .lines()
            .map(str::trim)
            .find(|l| l.chars().count() > MIN_TEXT_LABEL_CHARS)
            .map(str::to_string)
    };

    let label = heading()
        .or_else(title)
        .or_else(paragraph)
        .or_else(first_line)
        .unwrap_or_else(|| {
            let fallback = fallback.trim();
            if fallback.is_empty() {
                DEFAULT_FALLBACK_LABEL.to_string()
            } else {
                fallback.to_string()
            }
        });
    truncate_chars(&label, MAX_LABEL_CHARS)
}

fn title_attr(el: &Element) -> Option<String> {
    TITLE_ATTRS
        .iter()
        .filter_map(|name| el.attr(name))
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|v| !v.is_empty())
}

/// Static metadata of the fragment, or an empty record.
///
/// A present but unparseable attribute is logged and treated as absent.
pub fn extract_metadata(fragment: impl AsRef<Fragment>) -> MetadataRecord {
    match try_extract_metadata(fragment) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring static metadata");
            MetadataRecord::default()
        }
    }
}

/// Like [`extract_metadata`] but reports malformed metadata.
pub fn try_extract_metadata(fragment: impl AsRef<Fragment>) -> MarkupResult<MetadataRecord> {
    let mut raw = None;
    fragment.as_ref().walk(&mut |el| {
        if raw.is_none() {
            raw = el.attr(STATIC_METADATA_ATTR);
        }
    });
    match raw.map(str::trim) {
        None | Some("") => Ok(MetadataRecord::default()),
        Some(text) => {
            let value: serde_json::Value = serde_json::from_str(text)?;
            MetadataRecord::from_value(value, STATIC_METADATA_ATTR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarkupError;
    use crate::sanitize;
    use serde_json::json;

    #[test]
    fn test_heading_wins() {
        let frag = sanitize("<p>A long opening paragraph</p><section><h3>  The Vault </h3></section>");
        assert_eq!(extract_label(&frag), "The Vault");
    }

    #[test]
    fn test_title_attribute_before_paragraph() {
        let frag = sanitize(r#"<p>A long opening paragraph</p><div data-title="Market Square"></div>"#);
        assert_eq!(extract_label(&frag), "Market Square");
    }

    #[test]
    fn test_short_paragraph_falls_to_visible_text() {
        let frag = sanitize("<p>Tiny</p><p>Also short</p><div>Lantern light spills</div>");
        assert_eq!(extract_label(&frag), "Lantern light spills");
    }

    #[test]
    fn test_fallback_when_nothing_visible() {
        let frag = sanitize("<div><img alt=''></div>");
        assert_eq!(extract_label(&frag), DEFAULT_FALLBACK_LABEL);
        assert_eq!(extract_label_with_fallback(&frag, "Start"), "Start");
        assert_eq!(extract_label_with_fallback(&frag, "  "), DEFAULT_FALLBACK_LABEL);
    }

    #[test]
    fn test_label_is_truncated() {
        let frag = sanitize(&format!("<h1>{}</h1>", "x".repeat(300)));
        assert_eq!(extract_label(&frag).chars().count(), MAX_LABEL_CHARS);
    }

    #[test]
    fn test_metadata_first_attribute() {
        let frag = sanitize(
            r#"<div data-metadata='{"gold": 10, "inventory": ["rope"]}'><p data-metadata='{"x":1}'>hi</p></div>"#,
        );
        let meta = extract_metadata(&frag);
        assert_eq!(meta.get("gold"), Some(&json!(10)));
        assert_eq!(meta.get("inventory"), Some(&json!(["rope"])));
        assert!(!meta.contains_key("x"));
    }

    #[test]
    fn test_malformed_metadata_is_empty() {
        let frag = sanitize(r#"<div data-metadata="{gold: 10"></div>"#);
        assert!(extract_metadata(&frag).is_empty());
        assert!(matches!(
            try_extract_metadata(&frag),
            Err(MarkupError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn test_absent_metadata_is_empty() {
        let frag = sanitize("<p>nothing here</p>");
        assert_eq!(try_extract_metadata(&frag), Ok(MetadataRecord::default()));
    }
}
