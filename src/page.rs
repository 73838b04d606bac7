//! Rendered page model: styled lines plus the structural element tree the
//! outline enhancement reads its anchors from.

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use ratatui::prelude::Style;

/// Page container; its top edge plus padding drives the anchor offset.
pub const PAGE_CLASS: &str = "page";
/// Subtree that holds the document body.
pub const CONTENT_ROOT_CLASS: &str = "page-content";
pub const HEADING_CLASS: &str = "heading";
pub const HEADING_ANCHOR_CLASS: &str = "heading-anchor";
pub const HEADING_TITLE_CLASS: &str = "heading-title";
/// Prefix the renderer puts in front of a heading block's own id.
pub const BLOCK_ID_PREFIX: &str = "block-";
pub const CONFIG_ELEMENT_ID: &str = "outline-config";

pub fn heading_level_class(level: u8) -> String {
    format!("{HEADING_CLASS}-{level}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
        }
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub block: Option<BlockId>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_class(self, class: &str) -> Self {
        let classes = match self.attr("class") {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.with_attr("class", classes)
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    pub fn with_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    pub fn push(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(slot) = self
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.attrs.push((name.to_ascii_lowercase(), value));
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    /// First descendant (pre-order, excluding `self`) matching `pred`.
    pub fn find(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        for child in &self.children {
            if let Node::Element(el) = child {
                if pred(el) {
                    return Some(el);
                }
                if let Some(found) = el.find(pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Every descendant matching `pred`, in document order.
    pub fn find_all<'a>(&'a self, pred: &dyn Fn(&Element) -> bool) -> Vec<&'a Element> {
        let mut out = Vec::new();
        self.collect_matching(pred, &mut out);
        out
    }

    fn collect_matching<'a>(&'a self, pred: &dyn Fn(&Element) -> bool, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if let Node::Element(el) = child {
                if pred(el) {
                    out.push(el);
                }
                el.collect_matching(pred, out);
            }
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct StyledSegment {
    pub text: String,
    pub style: Style,
}

#[derive(Clone, Debug, Default)]
pub struct RenderedLine {
    pub segments: Vec<StyledSegment>,
    pub plain: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockLayout {
    pub top_line: usize,
    pub height: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Page {
    pub title: String,
    /// The `body` element.
    pub root: Element,
    pub lines: Vec<RenderedLine>,
    pub blocks: Vec<BlockLayout>,
    /// Rows of cover banner above the page container.
    pub cover_rows: usize,
    /// Top padding of the page container, in rows.
    pub padding_rows: usize,
}

impl Page {
    pub fn block(&self, id: BlockId) -> Option<BlockLayout> {
        self.blocks.get(id.0).copied()
    }

    pub fn page_container(&self) -> Option<&Element> {
        self.root.find(&|el| el.has_class(PAGE_CLASS))
    }

    pub fn content_root(&self) -> Option<&Element> {
        self.root.find(&|el| el.has_class(CONTENT_ROOT_CLASS))
    }

    pub fn config_marker(&self) -> Option<&Element> {
        self.root.find(&|el| el.id() == Some(CONFIG_ELEMENT_ID))
    }

    /// Marks the page as handled by `name`. Returns `false` when the guard was
    /// already set by an earlier installation.
    pub fn claim_guard(&mut self, name: &str) -> bool {
        if self.root.has_attr(name) {
            return false;
        }
        self.root.set_attr(name, "1");
        true
    }
}

/// A single raw HTML tag as it appears in inline or block HTML.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtmlTag {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub closing: bool,
    pub self_closing: bool,
}

impl HtmlTag {
    /// Parses the first tag in `raw`. Comments, doctypes and text return `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim_start();
        if !raw.starts_with('<') {
            return None;
        }
        let mut reader = Reader::from_str(raw);
        reader.config_mut().check_end_names = false;

        let (start, self_closing) = match reader.read_event().ok()? {
            XmlEvent::Start(start) => (start, false),
            XmlEvent::Empty(start) => (start, true),
            XmlEvent::End(end) => {
                return Some(Self {
                    name: tag_name(end.name().as_ref())?,
                    attrs: Vec::new(),
                    closing: true,
                    self_closing: false,
                });
            }
            _ => return None,
        };

        let attrs = start
            .html_attributes()
            .with_checks(false)
            .flatten()
            .filter_map(|attr| {
                let name = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
                if name.is_empty() {
                    return None;
                }
                let value = attr
                    .decode_and_unescape_value(reader.decoder())
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                Some((name, value))
            })
            .collect();

        Some(Self {
            name: tag_name(start.name().as_ref())?,
            attrs,
            closing: false,
            self_closing,
        })
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new(&self.name);
        for (name, value) in &self.attrs {
            el.set_attr(name, value.clone());
        }
        el
    }

    pub fn is_void(&self) -> bool {
        matches!(
            self.name.as_str(),
            "br" | "hr" | "img" | "input" | "meta" | "link" | "wbr" | "source"
        )
    }
}

fn tag_name(raw: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(raw).ok()?.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(name.to_ascii_lowercase())
}
