//! Inline title markup reduced to an allow-list of formatting tags.

use std::fmt;

use crate::page::{Element, Node};

/// Tags kept in sanitized titles. Everything else is unwrapped.
pub const ALLOWED_INLINE_TAGS: [&str; 11] = [
    "b", "strong", "i", "em", "mark", "small", "del", "ins", "sub", "sup", "s",
];

pub fn is_allowed_tag(tag: &str) -> bool {
    ALLOWED_INLINE_TAGS.contains(&tag)
}

/// Sanitized inline markup: only allow-listed elements, no attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleMarkup {
    nodes: Vec<Node>,
}

impl TitleMarkup {
    pub fn sanitize(nodes: &[Node]) -> Self {
        let mut out = Vec::new();
        for node in nodes {
            clean(node, &mut out);
        }
        Self { nodes: out }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.to_html().is_empty()
    }

    /// Serialized markup with surrounding whitespace trimmed.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for node in &self.nodes {
            write_html(node, &mut html);
        }
        html.trim().to_string()
    }
}

impl fmt::Display for TitleMarkup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

fn clean(node: &Node, out: &mut Vec<Node>) {
    match node {
        Node::Text(text) => out.push(Node::Text(text.clone())),
        Node::Element(el) => {
            let mut children = Vec::new();
            for child in &el.children {
                clean(child, &mut children);
            }
            if is_allowed_tag(&el.tag) {
                let mut kept = Element::new(el.tag.as_str());
                kept.children = children;
                out.push(Node::Element(kept));
            } else {
                out.extend(children);
            }
        }
    }
}

fn write_html(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => escape_into(text, out),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            out.push('>');
            for child in &el.children {
                write_html(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}
