use crate::fragment::{is_raw_text, Fragment, Node};

/// Serializes a tree back to markup.
pub fn serialize(fragment: &Fragment) -> String {
    let mut out = String::new();
    write_nodes(&fragment.nodes, &mut out, false);
    out
}

fn write_nodes(nodes: &[Node], out: &mut String, raw_text: bool) {
    for node in nodes {
        match node {
            Node::Text(text) if raw_text => out.push_str(text),
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Comment(body) => {
                out.push_str("<!--");
                out.push_str(&body.replace("--", "- -"));
                out.push_str("-->");
            }
            Node::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for attr in &el.attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(&attr.value));
                    out.push('"');
                }
                out.push('>');
                if el.is_void() {
                    continue;
                }
                let raw = is_raw_text(&el.tag)
                    && !crate::fragment::ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
                write_nodes(&el.children, out, raw);
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escapes text for use inside a double-quoted attribute value.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
