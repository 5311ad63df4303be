//! Markup tree types shared by the parser, sanitizer and extractor.

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content is raw text up to the matching close tag.
pub const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "noembed", "noframes", "noscript", "iframe",
];

/// Raw-text elements whose content still has character references decoded.
pub const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

/// Elements that start a new visual line when flattening text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table",
    "tr", "ul",
];

/// Elements whose text is never shown to the reader.
const INVISIBLE_ELEMENTS: &[&str] = &["style", "script", "template", "title"];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

/// A single attribute. Names are lowercased by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    /// Attributes in source order. The parser keeps the first of any duplicates.
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Sets an attribute in place, or appends it if absent.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attrs.push(Attribute::new(name, value)),
        }
    }

    pub fn is_void(&self) -> bool {
        is_void(&self.tag)
    }

    /// Visible text of this element with whitespace runs collapsed.
    pub fn text_content(&self) -> String {
        let mut raw = String::new();
        collect_text(&self.children, &mut raw, false);
        collapse_whitespace(&raw)
    }

    /// Pre-order walk over this element and every descendant element.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        visit(self);
        for child in &self.children {
            if let Node::Element(el) = child {
                el.walk(visit);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

/// An untrusted tree of markup nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

impl Fragment {
    /// Parses raw markup permissively. Never fails.
    pub fn parse(raw: &str) -> Self {
        crate::parser::parse_fragment(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order walk over every element in the tree.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        for node in &self.nodes {
            if let Node::Element(el) = node {
                el.walk(visit);
            }
        }
    }

    /// All elements in document order.
    pub fn elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.walk(&mut |el| out.push(el));
        out
    }

    /// Visible text with block boundaries rendered as line breaks.
    pub fn visible_text(&self) -> String {
        let mut raw = String::new();
        collect_text(&self.nodes, &mut raw, true);
        raw.lines()
            .map(collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn collect_text(nodes: &[Node], out: &mut String, line_breaks: bool) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Comment(_) => {}
            Node::Element(el) => {
                if INVISIBLE_ELEMENTS.contains(&el.tag.as_str()) {
                    continue;
                }
                let boundary = if BLOCK_ELEMENTS.contains(&el.tag.as_str()) {
                    Some(if line_breaks { '\n' } else { ' ' })
                } else {
                    None
                };
                out.extend(boundary);
                collect_text(&el.children, out, line_breaks);
                out.extend(boundary);
            }
        }
    }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `s` to at most `max` characters, ending in an ellipsis when anything was dropped.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
