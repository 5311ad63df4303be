use endless_markup::sanitizer::{is_dangerous_url, REMOVED_ELEMENTS};
use endless_markup::{
    extract_label, extract_label_with_fallback, extract_metadata, sanitize, sanitize_with_report,
    AlertDirective, ElementKind, SanitizedFragment, DEFAULT_FALLBACK_LABEL, DIRECTIVE_MESSAGE_ATTR,
    DIRECTIVE_TYPE_ATTR,
};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

fn get_fixture_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("fixtures");
    path.push(filename);
    path
}

fn sanitize_fixture(filename: &str) -> SanitizedFragment {
    let raw = fs::read_to_string(get_fixture_path(filename)).unwrap();
    sanitize(&raw)
}

/// Asserts the fragment has no executable nodes, no handlers and no dangerous URLs.
fn assert_inert(safe: &SanitizedFragment) {
    for el in safe.fragment().elements() {
        if el.tag == "style" {
            let body = el.text_content();
            assert!(!body.contains('<'), "markup inside <style> survived in {}", safe);
        }
        assert!(
            !REMOVED_ELEMENTS.contains(&el.tag.as_str()),
            "<{}> survived in {}",
            el.tag,
            safe
        );
        for attr in &el.attrs {
            assert!(
                !attr.name.starts_with("on"),
                "handler '{}' survived in {}",
                attr.name,
                safe
            );
            if ["href", "src", "xlink:href", "action", "data", "poster"].contains(&attr.name.as_str()) {
                assert!(
                    !is_dangerous_url(&attr.value),
                    "dangerous {}='{}' survived",
                    attr.name,
                    attr.value
                );
            }
            assert_ne!(attr.name, "srcdoc");
            assert_ne!(attr.name, "formaction");
        }
    }
}

fn directive_of(markup: &str) -> Option<String> {
    let safe = sanitize(markup);
    let el = safe.fragment().elements().into_iter().next()?;
    assert!(!el.has_attr("onclick"));
    el.attr(DIRECTIVE_MESSAGE_ATTR).map(str::to_string)
}

// Fixtures

#[test]
fn test_dice_tavern_fixture() {
    let safe = sanitize_fixture("dice-tavern.html");
    assert_inert(&safe);
    assert_eq!(extract_label(&safe), "The Gilded Flagon");

    let meta = extract_metadata(&safe);
    assert_eq!(meta.get("gold"), Some(&json!(10)));
    assert_eq!(meta.get("inventory"), Some(&json!(["rope", "lantern"])));

    let items = safe.interactive_elements();
    let kinds: Vec<_> = items.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ElementKind::Button,
            ElementKind::Button,
            ElementKind::Link,
            ElementKind::Link
        ]
    );
    assert_eq!(items[2].label, "Order an ale");
    assert_eq!(
        items[2].data,
        vec![
            ("data-action".to_string(), "order".to_string()),
            ("data-price".to_string(), "3".to_string()),
        ]
    );

    let roll = items[0].directive.clone().expect("roll directive");
    let mut rng = StdRng::seed_from_u64(20);
    let shown = roll.resolve(&mut rng).unwrap();
    let n: u32 = shown.strip_prefix("You rolled ").unwrap().parse().unwrap();
    assert!((1..=20).contains(&n));

    let watch = items[1].directive.clone().expect("watch directive");
    assert_eq!(watch.message, r#""The dwarf grins""#);
    assert_eq!(watch.resolve(&mut rng).unwrap(), "The dwarf grins");
}

#[test]
fn test_hostile_fixture_is_inert() {
    let (safe, report) = sanitize_with_report(
        &fs::read_to_string(get_fixture_path("hostile.html")).unwrap(),
    );
    assert_inert(&safe);
    assert_eq!(report.directives, 0);
    assert!(report.removed_elements >= 8);
    assert_eq!(extract_label(&safe), "Totally Safe Page");

    let lower = safe.as_str().to_ascii_lowercase();
    for needle in ["<script", "javascript:", "data:", "<iframe", "<base", "<meta", "<!--", "steal(", "onerror"] {
        assert!(!lower.contains(needle), "found {} in {}", needle, safe);
    }
    assert!(!lower.contains(DIRECTIVE_TYPE_ATTR));

    let buttons = safe
        .interactive_elements()
        .into_iter()
        .filter(|i| i.kind == ElementKind::Button)
        .count();
    assert_eq!(buttons, 5);
}

#[test]
fn test_plain_story_fixture() {
    let safe = sanitize_fixture("plain-story.html");
    assert_inert(&safe);
    assert_eq!(
        extract_label(&safe),
        "The lighthouse keeper has not lit the lamp in three nights."
    );
    let links: Vec<_> = safe
        .interactive_elements()
        .into_iter()
        .map(|i| i.element.attr("href").unwrap_or_default().to_string())
        .collect();
    assert_eq!(links, vec!["/climb", "/wait"]);
    assert!(extract_metadata(&safe).is_empty());
}

// Alert grammar precision

#[test]
fn test_alert_dice_expression_becomes_directive() {
    assert_eq!(
        directive_of(r#"<button onclick="alert(Math.floor(Math.random()*20)+1)">d20</button>"#),
        Some("Math.floor(Math.random()*20)+1".to_string())
    );
}

#[test]
fn test_alert_disqualified_forms() {
    for handler in [
        "alert(document.cookie)",
        "alert(1);alert(2)",
        "alert(eval('1'))",
        "alert(Math.constructor)",
        "alert(localStorage.key)",
        "alert(Math.exp(1))",
        "\\u0061lert(self)",
        "alert('a'), alert('b')",
        "confirm(1)",
    ] {
        let markup = format!(r#"<button onclick="{}">x</button>"#, handler.replace('"', "&quot;"));
        assert_eq!(directive_of(&markup), None, "{} was accepted", handler);
    }
}

#[test]
fn test_directive_attributes_round_trip_through_element() {
    let safe = sanitize(r#"<input type="button" value="Flip" onclick="alert(Math.round(Math.random()))">"#);
    let el = safe.fragment().elements()[0];
    assert_eq!(
        AlertDirective::from_element(el),
        Some(AlertDirective {
            message: "Math.round(Math.random())".to_string()
        })
    );
}

// URI neutralization

#[test]
fn test_uri_neutralization() {
    assert_eq!(
        sanitize(r#"<a href="javascript:alert(1)">x</a>"#).as_str(),
        r##"<a href="#">x</a>"##
    );
    assert_eq!(
        sanitize(r#"<img src="data:text/html,<script>alert(1)</script>">"#).as_str(),
        "<img>"
    );
    assert_eq!(
        sanitize(r#"<video poster="vbscript:x" src="/clip.mp4"></video>"#).as_str(),
        r#"<video src="/clip.mp4"></video>"#
    );
}

// Label fallback chain

#[test]
fn test_label_fallback_chain() {
    let safe = sanitize("<div><p>Short</p></div>");
    assert_eq!(extract_label(&safe), DEFAULT_FALLBACK_LABEL);
    assert_eq!(extract_label_with_fallback(&safe, "Prologue"), "Prologue");

    let safe = sanitize("<div><p>Short</p><span>A winding road</span></div>");
    assert_eq!(extract_label(&safe), "A winding road");
}

// Totality

const GARBAGE_TOKENS: &[&str] = &[
    "<", ">", "/", "</", "script", "a", "button", "img", "div", "p", "li", "style", "svg", "math",
    " on", "click", "error", "=", "\"", "'", " href", " src", "javascript:", "data:", " ",
    "alert(", "Math.random()", ")", "&#", "x6a", ";", "&lt;", "<!--", "-->", "\u{0}", "é",
    "expression(", "\n", "<![CDATA[", "]]>", "<?", "type=submit", "data-directive",
];

#[test]
fn test_sanitize_is_total_and_idempotent_on_garbage() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..300 {
        let len = rng.gen_range(0..120);
        let raw: String = (0..len)
            .map(|_| GARBAGE_TOKENS[rng.gen_range(0..GARBAGE_TOKENS.len())])
            .collect();
        let once = sanitize(&raw);
        assert_inert(&once);
        let twice = sanitize(once.as_str());
        assert_eq!(once.as_str(), twice.as_str(), "not idempotent for {:?}", raw);
        assert!(!extract_label(&once).is_empty());
    }
}

#[test]
fn test_deeply_nested_input_is_total() {
    let raw = "<div>".repeat(5_000) + "the bottom of the well" + &"</div>".repeat(5_000);
    let safe = sanitize(&raw);
    assert_eq!(extract_label(&safe), "the bottom of the well");
}
