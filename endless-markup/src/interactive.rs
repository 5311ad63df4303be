use crate::directive::AlertDirective;
use crate::fragment::{Element, Fragment};
use crate::sanitizer::is_button_like;
use serde::Serialize;

/// What kind of control an interactive element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Link,
    Button,
    Select,
    Summary,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Link => "link",
            ElementKind::Button => "button",
            ElementKind::Select => "select",
            ElementKind::Summary => "summary",
        }
    }

    fn of(el: &Element) -> Option<Self> {
        match el.tag.as_str() {
            "a" => Some(ElementKind::Link),
            "select" => Some(ElementKind::Select),
            "summary" => Some(ElementKind::Summary),
            _ if is_button_like(el) => Some(ElementKind::Button),
            _ => None,
        }
    }
}

/// An element the reader can activate, addressed by its position in the fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractiveElement {
    pub index: usize,
    pub kind: ElementKind,
    pub tag: String,
    pub label: String,
    /// `data-*` attributes in source order.
    pub data: Vec<(String, String)>,
    pub directive: Option<AlertDirective>,
    #[serde(skip)]
    pub element: Element,
}

pub(crate) fn collect(fragment: &Fragment) -> Vec<InteractiveElement> {
    let mut out = Vec::new();
    fragment.walk(&mut |el| {
        if let Some(kind) = ElementKind::of(el) {
            let index = out.len();
            out.push(InteractiveElement {
                index,
                kind,
                tag: el.tag.clone(),
                label: label_for(el, kind),
                data: el
                    .attrs
                    .iter()
                    .filter(|a| a.name.starts_with("data-"))
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect(),
                directive: AlertDirective::from_element(el),
                element: el.clone(),
            });
        }
    });
    out
}

fn label_for(el: &Element, kind: ElementKind) -> String {
    let text = el.text_content();
    if !text.is_empty() {
        return text;
    }
    ["aria-label", "title", "value", "alt"]
        .iter()
        .filter_map(|name| el.attr(name))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| kind.as_str().to_string())
}
