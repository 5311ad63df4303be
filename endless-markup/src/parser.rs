//! Permissive markup parser.
//!
//! Generated content is frequently malformed: unclosed tags, stray close tags, bare `<`,
//! unquoted attributes. Nothing here rejects input; every byte sequence yields a tree.

use crate::fragment::{
    is_raw_text, Attribute, Element, Fragment, Node, ESCAPABLE_RAW_TEXT_ELEMENTS,
};
use std::borrow::Cow;

/// Elements nested deeper than this are flattened into their deepest allowed ancestor.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Start tags that implicitly close an open `<p>`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "main", "menu", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Parse raw markup into a [`Fragment`].
pub fn parse_fragment(input: &str) -> Fragment {
    let mut tokenizer = Tokenizer::new(input);
    let mut builder = TreeBuilder::default();
    while let Some(token) = tokenizer.next_token() {
        builder.push(token);
    }
    builder.finish()
}

// ─── Tokenizer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    StartTag {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag(String),
    Comment(String),
}

struct Tokenizer<'a> {
    input: &'a str,
    /// ASCII-lowercased copy with identical byte offsets, for case-insensitive searches.
    lower: String,
    pos: usize,
    /// Set after a raw-text start tag; the next token is its literal body.
    raw_text_of: Option<String>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            lower: input.to_ascii_lowercase(),
            pos: 0,
            raw_text_of: None,
        }
    }

    fn bytes(&self) -> &[u8] {
        self.input.as_bytes()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.pos + offset).copied()
    }

    fn next_token(&mut self) -> Option<Token> {
        if let Some(tag) = self.raw_text_of.take() {
            if let Some(text) = self.raw_text(&tag) {
                return Some(text);
            }
        }
        loop {
            if self.pos >= self.input.len() {
                return None;
            }
            if self.peek(0) != Some(b'<') {
                return Some(self.text());
            }
            match self.markup() {
                Some(token) => return Some(token),
                None => continue,
            }
        }
    }

    /// Body of a raw-text element up to its close tag (or end of input).
    fn raw_text(&mut self, tag: &str) -> Option<Token> {
        let needle = format!("</{}", tag);
        let end = self.lower[self.pos..]
            .find(&needle)
            .map(|i| self.pos + i)
            .unwrap_or(self.input.len());
        let body = &self.input[self.pos..end];
        self.pos = end;
        if body.is_empty() {
            return None;
        }
        let text = if ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&tag) {
            decode_entities(body).into_owned()
        } else {
            body.to_string()
        };
        Some(Token::Text(text))
    }

    fn text(&mut self) -> Token {
        let start = self.pos;
        let end = self.input[start..]
            .find('<')
            .map(|i| start + i)
            .unwrap_or(self.input.len());
        self.pos = end;
        Token::Text(decode_entities(&self.input[start..end]).into_owned())
    }

    /// Handles input at a `<`. Returns `None` when the construct is skipped entirely.
    fn markup(&mut self) -> Option<Token> {
        let rest = &self.input[self.pos..];
        if rest.starts_with("<!--") {
            let body_start = self.pos + 4;
            let (body_end, next) = match self.input[body_start..].find("-->") {
                Some(i) => (body_start + i, body_start + i + 3),
                None => (self.input.len(), self.input.len()),
            };
            let body = self.input[body_start..body_end].to_string();
            self.pos = next;
            return Some(Token::Comment(body));
        }
        match self.peek(1) {
            Some(b'!') | Some(b'?') => {
                // Doctype, CDATA and processing instructions are dropped.
                self.skip_past(b'>');
                None
            }
            Some(b'/') => match self.peek(2) {
                Some(c) if c.is_ascii_alphabetic() => Some(self.end_tag()),
                _ => {
                    self.skip_past(b'>');
                    None
                }
            },
            Some(c) if c.is_ascii_alphabetic() => self.start_tag(),
            _ => {
                self.pos += 1;
                Some(Token::Text("<".to_string()))
            }
        }
    }

    fn skip_past(&mut self, byte: u8) {
        match self.bytes()[self.pos..].iter().position(|&b| b == byte) {
            Some(i) => self.pos += i + 1,
            None => self.pos = self.input.len(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(0), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consumes bytes until one of `stops` or whitespace; returns the lowercased run.
    fn name_until(&mut self, stops: &[u8]) -> String {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_whitespace() || stops.contains(&c) {
                break;
            }
            self.pos += 1;
        }
        self.lower[start..self.pos].to_string()
    }

    fn end_tag(&mut self) -> Token {
        self.pos += 2;
        let name = self.name_until(b"/>");
        self.skip_past(b'>');
        Token::EndTag(name)
    }

    fn start_tag(&mut self) -> Option<Token> {
        self.pos += 1;
        let name = self.name_until(b"/>");
        let mut attrs: Vec<Attribute> = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.peek(0) {
                // A tag cut off by end of input is dropped, as browsers do.
                None => return None,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                Some(_) => {
                    // The first character may be `=`, which is then part of the name.
                    let attr_start = self.pos;
                    let first_len = self.input[attr_start..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(1);
                    self.pos += first_len;
                    let rest = self.name_until(b"/>=");
                    let attr_name = format!("{}{}", &self.lower[attr_start..attr_start + first_len], rest);
                    self.skip_whitespace();
                    let value = if self.peek(0) == Some(b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        self.attribute_value()
                    } else {
                        String::new()
                    };
                    if !attrs.iter().any(|a| a.name == attr_name) {
                        attrs.push(Attribute::new(attr_name, value));
                    }
                }
            }
        }

        if is_raw_text(&name) && !self_closing {
            self.raw_text_of = Some(name.clone());
        }
        Some(Token::StartTag {
            name,
            attrs,
            self_closing,
        })
    }

    fn attribute_value(&mut self) -> String {
        match self.peek(0) {
            Some(q @ (b'"' | b'\'')) => {
                let start = self.pos + 1;
                let end = self.bytes()[start..]
                    .iter()
                    .position(|&b| b == q)
                    .map(|i| start + i)
                    .unwrap_or(self.input.len());
                self.pos = (end + 1).min(self.input.len());
                decode_entities(&self.input[start..end]).into_owned()
            }
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek(0) {
                    if c.is_ascii_whitespace() || c == b'>' {
                        break;
                    }
                    self.pos += 1;
                }
                decode_entities(&self.input[start..self.pos]).into_owned()
            }
        }
    }
}

// ─── Tree builder ────────────────────────────────────────────────────────────

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Element>,
}

impl TreeBuilder {
    fn push(&mut self, token: Token) {
        match token {
            Token::Text(text) => self.append_text(text),
            Token::Comment(body) => self.append(Node::Comment(body)),
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => self.start(name, attrs, self_closing),
            Token::EndTag(name) => self.end(&name),
        }
    }

    fn start(&mut self, name: String, attrs: Vec<Attribute>, self_closing: bool) {
        self.close_implied(&name);

        let element = Element {
            tag: name,
            attrs,
            children: Vec::new(),
        };
        if element.is_void() || self_closing {
            self.append(Node::Element(element));
        } else if self.open.len() >= MAX_NESTING_DEPTH {
            // Content still lands in the deepest open element; only the wrapper is lost.
        } else {
            self.open.push(element);
        }
    }

    /// Applies the implicit end-tag rules for elements that cannot nest in themselves.
    fn close_implied(&mut self, name: &str) {
        if CLOSES_PARAGRAPH.contains(&name) && self.current_tag() == Some("p") {
            self.close_top();
        }
        match name {
            "li" => self.close_within("li", &["ul", "ol", "menu"]),
            "dt" | "dd" => {
                self.close_within("dt", &["dl"]);
                self.close_within("dd", &["dl"]);
            }
            "option" => {
                if self.current_tag() == Some("option") {
                    self.close_top();
                }
            }
            "tr" => {
                self.close_within("td", &["table"]);
                self.close_within("th", &["table"]);
                self.close_within("tr", &["table"]);
            }
            "td" | "th" => {
                self.close_within("td", &["tr", "table"]);
                self.close_within("th", &["tr", "table"]);
            }
            _ => {}
        }
    }

    /// Closes the nearest open `tag` unless one of `boundaries` is open above it.
    fn close_within(&mut self, tag: &str, boundaries: &[&str]) {
        for i in (0..self.open.len()).rev() {
            let open_tag = self.open[i].tag.as_str();
            if open_tag == tag {
                self.close_to(i);
                return;
            }
            if boundaries.contains(&open_tag) {
                return;
            }
        }
    }

    fn end(&mut self, name: &str) {
        if let Some(i) = self.open.iter().rposition(|el| el.tag == name) {
            self.close_to(i);
        }
    }

    /// Closes every open element from the top of the stack down to index `i`.
    fn close_to(&mut self, i: usize) {
        while self.open.len() > i {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        if let Some(el) = self.open.pop() {
            self.append(Node::Element(el));
        }
    }

    fn current_tag(&self) -> Option<&str> {
        self.open.last().map(|el| el.tag.as_str())
    }

    fn children_mut(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(el) => &mut el.children,
            None => &mut self.root,
        }
    }

    fn append(&mut self, node: Node) {
        self.children_mut().push(node);
    }

    fn append_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let children = self.children_mut();
        if let Some(Node::Text(prev)) = children.last_mut() {
            prev.push_str(&text);
        } else {
            children.push(Node::Text(text));
        }
    }

    fn finish(mut self) -> Fragment {
        self.close_to(0);
        Fragment { nodes: self.root }
    }
}

// ─── Character references ────────────────────────────────────────────────────

/// Named references decoded by the parser. Entries marked `true` also match without `;`.
const NAMED_REFERENCES: &[(&str, &str, bool)] = &[
    ("amp", "&", true),
    ("lt", "<", true),
    ("gt", ">", true),
    ("quot", "\"", true),
    ("apos", "'", false),
    ("nbsp", "\u{a0}", true),
    ("colon", ":", false),
    ("semi", ";", false),
    ("comma", ",", false),
    ("period", ".", false),
    ("sol", "/", false),
    ("bsol", "\\", false),
    ("lpar", "(", false),
    ("rpar", ")", false),
    ("lsqb", "[", false),
    ("rsqb", "]", false),
    ("lcub", "{", false),
    ("rcub", "}", false),
    ("excl", "!", false),
    ("quest", "?", false),
    ("equals", "=", false),
    ("plus", "+", false),
    ("num", "#", false),
    ("grave", "`", false),
    ("tab", "\t", false),
    ("newline", "\n", false),
    ("copy", "\u{a9}", true),
    ("reg", "\u{ae}", true),
    ("trade", "\u{2122}", false),
    ("deg", "\u{b0}", true),
    ("times", "\u{d7}", true),
    ("divide", "\u{f7}", true),
    ("middot", "\u{b7}", true),
    ("bull", "\u{2022}", false),
    ("hellip", "\u{2026}", false),
    ("mdash", "\u{2014}", false),
    ("ndash", "\u{2013}", false),
    ("lsquo", "\u{2018}", false),
    ("rsquo", "\u{2019}", false),
    ("ldquo", "\u{201c}", false),
    ("rdquo", "\u{201d}", false),
    ("hearts", "\u{2665}", false),
    ("larr", "\u{2190}", false),
    ("rarr", "\u{2192}", false),
    ("uarr", "\u{2191}", false),
    ("darr", "\u{2193}", false),
];

/// Decodes named, decimal and hexadecimal character references.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_one(rest) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decodes a single reference at the start of `s` (which begins with `&`).
/// Returns the replacement text and the number of bytes consumed.
fn decode_one(s: &str) -> Option<(String, usize)> {
    let body = &s[1..];
    if let Some(num) = body.strip_prefix('#') {
        let (digits, radix, prefix_len) = match num.strip_prefix(['x', 'X']) {
            Some(hex) => (hex, 16, 3),
            None => (num, 10, 2),
        };
        let len = digits
            .bytes()
            .take_while(|b| (*b as char).is_digit(radix))
            .count();
        if len == 0 {
            return None;
        }
        // Overlong references decode to the replacement character rather than overflowing.
        let ch = if len > 8 {
            char::REPLACEMENT_CHARACTER
        } else {
            u32::from_str_radix(&digits[..len], radix)
                .ok()
                .filter(|&cp| cp != 0)
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
        };
        let mut consumed = prefix_len + len;
        if digits[len..].starts_with(';') {
            consumed += 1;
        }
        return Some((ch.to_string(), consumed));
    }

    NAMED_REFERENCES.iter().find_map(|(name, value, legacy)| {
        let after = body.strip_prefix(name)?;
        if after.starts_with(';') {
            Some((value.to_string(), name.len() + 2))
        } else if *legacy {
            Some((value.to_string(), name.len() + 1))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_element(frag: &Fragment) -> &Element {
        match frag.nodes.as_slice() {
            [Node::Element(el)] => el,
            other => panic!("expected a single element, got {:?}", other),
        }
    }

    #[test]
    fn test_parses_nested_elements_and_attributes() {
        let frag = parse_fragment(r#"<DIV Class="card" data-x='1'><span>hi</span></DIV>"#);
        let div = only_element(&frag);
        assert_eq!(div.tag, "div");
        assert_eq!(div.attr("class"), Some("card"));
        assert_eq!(div.attr("data-x"), Some("1"));
        assert_eq!(div.children.len(), 1);
    }

    #[test]
    fn test_unquoted_and_bare_attributes() {
        let frag = parse_fragment("<input type=checkbox checked>");
        let input = only_element(&frag);
        assert_eq!(input.attr("type"), Some("checkbox"));
        assert_eq!(input.attr("checked"), Some(""));
    }

    #[test]
    fn test_duplicate_attribute_keeps_first() {
        let frag = parse_fragment(r#"<a href="/safe" href="javascript:x">x</a>"#);
        assert_eq!(only_element(&frag).attr("href"), Some("/safe"));
    }

    #[test]
    fn test_unclosed_elements_close_at_end() {
        let frag = parse_fragment("<div><p>one");
        let div = only_element(&frag);
        assert!(matches!(&div.children[0], Node::Element(p) if p.tag == "p"));
    }

    #[test]
    fn test_stray_close_tags_are_ignored() {
        let frag = parse_fragment("</span>text</div>");
        assert_eq!(frag.nodes, vec![Node::Text("text".to_string())]);
    }

    #[test]
    fn test_implicit_list_item_close() {
        let frag = parse_fragment("<ul><li>a<li>b</ul>");
        let ul = only_element(&frag);
        assert_eq!(ul.children.len(), 2);
    }

    #[test]
    fn test_paragraph_closed_by_block() {
        let frag = parse_fragment("<p>one<div>two</div>");
        assert_eq!(frag.nodes.len(), 2);
    }

    #[test]
    fn test_script_body_is_raw_text() {
        let frag = parse_fragment("<script>if (a < b) { x = '</div>'; }</script><b>after</b>");
        let script = match &frag.nodes[0] {
            Node::Element(el) => el,
            _ => panic!("expected script"),
        };
        assert_eq!(
            script.children,
            vec![Node::Text("if (a < b) { x = '</div>'; }".to_string())]
        );
        assert!(matches!(&frag.nodes[1], Node::Element(b) if b.tag == "b"));
    }

    #[test]
    fn test_bare_less_than_is_text() {
        let frag = parse_fragment("3 < 4 and 5 <= 6");
        assert_eq!(frag.nodes, vec![Node::Text("3 < 4 and 5 <= 6".to_string())]);
    }

    #[test]
    fn test_truncated_tag_is_dropped() {
        let frag = parse_fragment("hello <img src=\"x");
        assert_eq!(frag.nodes, vec![Node::Text("hello ".to_string())]);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&#106;&#x61;&#X76;a"), "java");
        assert_eq!(decode_entities("&#106avascript&colon;"), "javascript:");
        assert_eq!(decode_entities("&unknown; &"), "&unknown; &");
        assert_eq!(decode_entities("&#0;"), "\u{fffd}");
        assert_eq!(decode_entities("&#99999999999;"), "\u{fffd}");
    }

    #[test]
    fn test_depth_cap_flattens() {
        let open = "<div>".repeat(MAX_NESTING_DEPTH + 50);
        let frag = parse_fragment(&format!("{}deep", open));
        let mut depth = 0;
        let mut nodes = &frag.nodes;
        while let Some(Node::Element(el)) = nodes.first() {
            depth += 1;
            nodes = &el.children;
        }
        assert_eq!(depth, MAX_NESTING_DEPTH);
        assert_eq!(nodes, &vec![Node::Text("deep".to_string())]);
    }

    #[test]
    fn test_comment_and_doctype() {
        let frag = parse_fragment("<!DOCTYPE html><!-- note --><p>x</p>");
        assert_eq!(frag.nodes[0], Node::Comment(" note ".to_string()));
        assert_eq!(frag.nodes.len(), 2);
    }
}
