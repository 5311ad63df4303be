//! Turns untrusted generated markup into a fragment safe to insert into a live page.
//!
//! The raw text is parsed permissively, cleaned node by node, and serialized. The
//! serialized string is the canonical form: the tree carried by [`SanitizedFragment`] is the
//! re-parse of that string, so rendering and later extraction always agree.

use crate::directive::{self, AlertDirective, ALERT_DIRECTIVE, DIRECTIVE_MESSAGE_ATTR, DIRECTIVE_TYPE_ATTR};
use crate::fragment::{Attribute, Element, Fragment, Node};
use crate::interactive::{self, InteractiveElement};
use crate::parser::parse_fragment;
use crate::serialize::serialize;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

// ─── Rule tables ─────────────────────────────────────────────────────────────

/// Elements dropped together with everything inside them.
pub const REMOVED_ELEMENTS: &[&str] = &[
    "script", "noscript", "iframe", "frame", "frameset", "object", "embed", "applet", "base",
    "meta", "portal", "template", "noembed", "noframes", "param",
];

/// Document-level wrappers replaced by their children.
const UNWRAPPED_ELEMENTS: &[&str] = &["html", "head", "body"];

/// URL schemes that execute code or smuggle inline documents.
pub const DANGEROUS_SCHEMES: &[&str] = &["javascript:", "data:", "vbscript:"];

/// Attributes that navigate when followed. Dangerous values become `#`.
const NAVIGATION_ATTRS: &[&str] = &["href", "xlink:href", "action"];

/// Elements whose `href` is followed by the reader rather than fetched.
const NAVIGATION_ELEMENTS: &[&str] = &["a", "area"];

/// Attributes that load a resource. Dangerous values are removed outright.
const LOADABLE_ATTRS: &[&str] = &[
    "src", "data", "poster", "background", "lowsrc", "dynsrc", "codebase", "manifest",
];

/// Attributes that let a control redirect or reshape a form submission.
const FORM_HIJACK_ATTRS: &[&str] = &[
    "form", "formaction", "formmethod", "formtarget", "formenctype", "formnovalidate",
];

/// Input types that behave like buttons.
const BUTTON_INPUT_TYPES: &[&str] = &["button", "submit", "reset"];

/// Style content that can run script or bind behavior in some engines.
const DANGEROUS_CSS: &[&str] = &[
    "expression(",
    "javascript:",
    "vbscript:",
    "-moz-binding",
    "behavior:",
    "@import",
];

fn tag_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid tag name regex"))
}

fn attr_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_:][a-z0-9_:.-]*$").expect("valid attribute name regex"))
}

fn css_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid css comment regex"))
}

// ─── SanitizedFragment ───────────────────────────────────────────────────────

/// Markup that has been through [`sanitize`]. Only this module can build one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizedFragment {
    tree: Fragment,
    markup: String,
}

impl SanitizedFragment {
    /// Canonical markup, ready to mount.
    pub fn as_str(&self) -> &str {
        &self.markup
    }

    pub fn fragment(&self) -> &Fragment {
        &self.tree
    }

    pub fn into_markup(self) -> String {
        self.markup
    }

    /// True when nothing but whitespace would be mounted.
    pub fn is_empty(&self) -> bool {
        self.markup.trim().is_empty()
    }

    /// Activatable elements in document order.
    pub fn interactive_elements(&self) -> Vec<InteractiveElement> {
        interactive::collect(&self.tree)
    }
}

impl fmt::Display for SanitizedFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.markup)
    }
}

impl Serialize for SanitizedFragment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.markup)
    }
}

/// Counts of what a sanitize pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    pub removed_elements: usize,
    pub unwrapped_elements: usize,
    pub removed_comments: usize,
    pub removed_attributes: usize,
    pub neutralized_urls: usize,
    pub directives: usize,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

// ─── Sanitize ────────────────────────────────────────────────────────────────

/// Sanitizes untrusted markup. Never fails; empty input yields an empty fragment.
pub fn sanitize(raw: &str) -> SanitizedFragment {
    sanitize_with_report(raw).0
}

pub fn sanitize_with_report(raw: &str) -> (SanitizedFragment, SanitizeReport) {
    let mut report = SanitizeReport::default();
    let parsed = parse_fragment(raw);
    let cleaned = Fragment {
        nodes: clean_nodes(parsed.nodes, &mut report),
    };
    // Cleaning can leave nesting the parser would not produce, so the canonical tree is the
    // re-parse of the cleaned output and the canonical string is that tree's serialization.
    let tree = parse_fragment(&serialize(&cleaned));
    let markup = serialize(&tree);

    if !report.is_clean() {
        tracing::debug!(
            removed_elements = report.removed_elements,
            removed_attributes = report.removed_attributes,
            neutralized_urls = report.neutralized_urls,
            directives = report.directives,
            "sanitized generated fragment"
        );
    }
    (SanitizedFragment { tree, markup }, report)
}

fn clean_nodes(nodes: Vec<Node>, report: &mut SanitizeReport) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(text) => out.push(Node::Text(text)),
            Node::Comment(_) => report.removed_comments += 1,
            Node::Element(el) => clean_element(el, &mut out, report),
        }
    }
    out
}

fn clean_element(mut el: Element, out: &mut Vec<Node>, report: &mut SanitizeReport) {
    if !tag_name_re().is_match(&el.tag) || UNWRAPPED_ELEMENTS.contains(&el.tag.as_str()) {
        report.unwrapped_elements += 1;
        out.extend(clean_nodes(el.children, report));
        return;
    }
    if REMOVED_ELEMENTS.contains(&el.tag.as_str()) || animates_navigation(&el) {
        tracing::trace!(tag = %el.tag, "dropping element");
        report.removed_elements += 1;
        return;
    }
    if el.tag == "xmp" {
        el.tag = "pre".to_string();
    }

    clean_attributes(&mut el, report);

    match el.tag.as_str() {
        "link" if !is_stylesheet_link(&el) => {
            report.removed_elements += 1;
            return;
        }
        "style"
            if el
                .children
                .iter()
                .any(|n| matches!(n, Node::Text(t) if is_unsafe_style_body(t))) =>
        {
            report.removed_elements += 1;
            return;
        }
        _ => {}
    }

    el.children = clean_nodes(std::mem::take(&mut el.children), report);
    out.push(Node::Element(el));
}

fn clean_attributes(el: &mut Element, report: &mut SanitizeReport) {
    let button_like = is_button_like(el);
    let navigates = NAVIGATION_ELEMENTS.contains(&el.tag.as_str());
    // A directive carried over from an earlier pass is vetted again like a fresh handler.
    let mut vetted = AlertDirective::from_element(el)
        .filter(|_| button_like)
        .and_then(|d| directive::parse_alert(&format!("alert({})", d.message)).ok());
    let mut kept: Vec<Attribute> = Vec::with_capacity(el.attrs.len());

    for mut attr in std::mem::take(&mut el.attrs) {
        let name = attr.name.as_str();
        let keep = if !attr_name_re().is_match(name)
            || name == DIRECTIVE_TYPE_ATTR
            || name == DIRECTIVE_MESSAGE_ATTR
            || name == "srcdoc"
            || FORM_HIJACK_ATTRS.contains(&name)
        {
            false
        } else if name.starts_with("on") {
            if name == "onclick" && button_like {
                match directive::parse_alert(&attr.value) {
                    Ok(d) => vetted = Some(d),
                    Err(e) => tracing::debug!(tag = %el.tag, error = %e, "inline handler rejected"),
                }
            }
            false
        } else if NAVIGATION_ATTRS.contains(&name) && (navigates || name == "action") {
            if is_dangerous_url(&attr.value) {
                attr.value = "#".to_string();
                report.neutralized_urls += 1;
            }
            true
        } else if LOADABLE_ATTRS.contains(&name) || NAVIGATION_ATTRS.contains(&name) {
            !is_dangerous_url(&attr.value)
        } else if name == "srcset" {
            !srcset_candidates(&attr.value).any(is_dangerous_url)
        } else if name == "style" {
            !is_dangerous_css(&attr.value)
        } else {
            true
        };

        if keep {
            kept.push(attr);
        } else {
            report.removed_attributes += 1;
        }
    }
    el.attrs = kept;

    if let Some(d) = vetted {
        el.set_attr(DIRECTIVE_TYPE_ATTR, ALERT_DIRECTIVE);
        el.set_attr(DIRECTIVE_MESSAGE_ATTR, d.message);
        report.directives += 1;
    }
}

// ─── Checks ──────────────────────────────────────────────────────────────────

/// Whether a URL-valued attribute resolves to a forbidden scheme.
///
/// Browsers ignore embedded whitespace and control characters when reading the scheme, so
/// those are removed before comparing.
pub fn is_dangerous_url(value: &str) -> bool {
    let scheme: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    DANGEROUS_SCHEMES.iter().any(|s| scheme.starts_with(s))
}

pub fn is_dangerous_css(value: &str) -> bool {
    let stripped = css_comment_re().replace_all(value, "");
    let compact: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\\')
        .collect::<String>()
        .to_ascii_lowercase();
    DANGEROUS_CSS.iter().any(|p| compact.contains(p))
}

/// Style bodies are written back verbatim. Inside `<svg>` or `<math>` a browser parses that
/// body as markup, so any `<` in it could open a live element.
fn is_unsafe_style_body(text: &str) -> bool {
    text.contains('<') || is_dangerous_css(text)
}

fn srcset_candidates(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
}

pub fn is_button_like(el: &Element) -> bool {
    match el.tag.as_str() {
        "button" => true,
        "input" => el
            .attr("type")
            .map(|t| BUTTON_INPUT_TYPES.contains(&t.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false),
        _ => false,
    }
}

fn is_stylesheet_link(el: &Element) -> bool {
    let stylesheet = el
        .attr("rel")
        .map(|rel| {
            rel.split_whitespace()
                .any(|r| r.eq_ignore_ascii_case("stylesheet"))
        })
        .unwrap_or(false);
    stylesheet && el.attr("href").is_some_and(|href| !href.trim().is_empty())
}

/// SVG `animate`/`set` can rewrite an `href` after the sanitizer has checked it.
fn animates_navigation(el: &Element) -> bool {
    if !matches!(el.tag.as_str(), "animate" | "set" | "animatemotion" | "animatetransform") {
        return false;
    }
    el.attr("attributename")
        .map(|target| {
            let target = target.trim().to_ascii_lowercase();
            target == "href" || target == "xlink:href"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_script_and_handlers() {
        let out = sanitize(r#"<div onmouseover="steal()">Hi<script>alert(1)</script></div>"#);
        assert_eq!(out.as_str(), "<div>Hi</div>");
    }

    #[test]
    fn test_neutralizes_link_and_strips_loadable() {
        let out = sanitize(
            r#"<a href=" java&#x09;script:alert(1)">x</a><img src="data:text/html,hi" alt="y">"#,
        );
        assert_eq!(out.as_str(), r##"<a href="#">x</a><img alt="y">"##);
    }

    #[test]
    fn test_keeps_safe_urls() {
        let out = sanitize(r#"<a href="/scene/2">go</a><img src="https://x.test/a.png">"#);
        assert_eq!(
            out.as_str(),
            r#"<a href="/scene/2">go</a><img src="https://x.test/a.png">"#
        );
    }

    #[test]
    fn test_alert_button_becomes_directive() {
        let (out, report) = sanitize_with_report(
            r#"<button onclick="alert('You rolled ' + (Math.floor(Math.random()*6)+1))">Roll</button>"#,
        );
        assert_eq!(report.directives, 1);
        let button = out.fragment().elements()[0];
        assert!(!button.has_attr("onclick"));
        assert_eq!(button.attr(DIRECTIVE_TYPE_ATTR), Some(ALERT_DIRECTIVE));
        assert_eq!(
            button.attr(DIRECTIVE_MESSAGE_ATTR),
            Some("'You rolled ' + (Math.floor(Math.random()*6)+1)")
        );
    }

    #[test]
    fn test_alert_on_non_button_is_dropped() {
        let out = sanitize(r#"<div onclick="alert('hi')">x</div>"#);
        assert_eq!(out.as_str(), "<div>x</div>");
    }

    #[test]
    fn test_forged_directive_removed() {
        let out = sanitize(
            r#"<button data-directive="alert" data-directive-message="document.cookie">b</button><div data-directive="alert" data-directive-message="1">d</div>"#,
        );
        assert_eq!(out.as_str(), "<button>b</button><div>d</div>");
    }

    #[test]
    fn test_form_hijack_attrs_removed() {
        let out = sanitize(r#"<form action="javascript:x()"><button formaction="/evil">b</button></form>"#);
        assert_eq!(
            out.as_str(),
            r##"<form action="#"><button>b</button></form>"##
        );
    }

    #[test]
    fn test_style_filters() {
        let out = sanitize(
            r#"<p style="width: expr/**/ession(alert(1))">a</p><p style="color: red">b</p><style>@import url(x.css);</style>"#,
        );
        assert_eq!(out.as_str(), r#"<p>a</p><p style="color: red">b</p>"#);
    }

    #[test]
    fn test_style_with_markup_in_foreign_content_dropped() {
        for raw in [
            "<svg><style><img src=x onerror=alert(1)></style></svg>",
            "<math><style><img src=x onerror=alert(1)></style></math>",
        ] {
            let out = sanitize(raw);
            assert!(!out.as_str().contains("onerror"), "{} -> {}", raw, out);
            assert!(!out.as_str().contains("<style"), "{} -> {}", raw, out);
        }
        assert_eq!(
            sanitize("<svg><style>circle { fill: red; }</style></svg>").as_str(),
            "<svg><style>circle { fill: red; }</style></svg>"
        );
    }

    #[test]
    fn test_unwraps_document_wrappers_and_drops_comments() {
        let (out, report) =
            sanitize_with_report("<html><head><meta charset=utf-8></head><body><!-- x --><h1>T</h1></body></html>");
        assert_eq!(out.as_str(), "<h1>T</h1>");
        assert_eq!(report.removed_comments, 1);
        assert_eq!(report.unwrapped_elements, 3);
    }

    #[test]
    fn test_svg_animate_targeting_href_removed() {
        let out = sanitize(
            r#"<svg><a><animate attributeName="href" values="javascript:alert(1)"/><text>x</text></a></svg>"#,
        );
        assert_eq!(out.as_str(), "<svg><a><text>x</text></a></svg>");
    }

    #[test]
    fn test_stylesheet_link_kept_others_dropped() {
        let out = sanitize(
            r#"<link rel="stylesheet" href="/s.css"><link rel="preload" href="/x.js">"#,
        );
        assert_eq!(out.as_str(), r#"<link rel="stylesheet" href="/s.css">"#);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let raw = r#"<div><p>a<p>b<button onclick="alert(1+1)">r</button></div><a href="vbscript:x">q</a>"#;
        let once = sanitize(raw);
        let twice = sanitize(once.as_str());
        assert_eq!(once.as_str(), twice.as_str());
    }

    #[test]
    fn test_empty_input() {
        let out = sanitize("");
        assert!(out.is_empty());
        assert_eq!(out.as_str(), "");
    }
}
