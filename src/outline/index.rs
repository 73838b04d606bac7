//! Heading indexer: turns the page's heading elements into an ordered outline.

use crate::config::OutlineConfig;
use crate::page::{
    heading_level_class, BlockId, Element, Page, BLOCK_ID_PREFIX, HEADING_ANCHOR_CLASS,
    HEADING_CLASS, HEADING_TITLE_CLASS,
};

use super::sanitize::TitleMarkup;

/// One outline entry. Built once; only the active marker lives elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadingEntry {
    pub block: Option<BlockId>,
    pub anchor_id: String,
    pub title: String,
    pub title_markup: TitleMarkup,
    /// Always within `1..=3`.
    pub level: u8,
}

/// Headings in document order. Never reordered or patched; re-index to change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutlineIndex {
    entries: Vec<HeadingEntry>,
    min_items: usize,
}

impl OutlineIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&HeadingEntry> {
        self.entries.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeadingEntry> {
        self.entries.iter()
    }

    /// Whether there are enough headings for the surfaces to be shown.
    pub fn is_usable(&self) -> bool {
        !self.entries.is_empty() && self.entries.len() >= self.min_items
    }
}

pub struct Indexer<'a> {
    pub max_level: u8,
    pub min_items: usize,
    pub default_title: &'a str,
}

impl<'a> Indexer<'a> {
    pub fn from_config(config: &'a OutlineConfig) -> Self {
        Self {
            max_level: config.max_level,
            min_items: config.min_items,
            default_title: &config.default_title,
        }
    }

    /// Scans the content root (or the whole body when it is missing).
    pub fn index(&self, page: &Page) -> OutlineIndex {
        let root = page.content_root().unwrap_or(&page.root);
        let max_level = self.max_level.clamp(1, 3);
        let wanted: Vec<String> = (1..=max_level).map(heading_level_class).collect();

        let entries = root
            .find_all(&|el| {
                el.has_class(HEADING_CLASS) && wanted.iter().any(|class| el.has_class(class))
            })
            .into_iter()
            .filter_map(|el| self.entry(el))
            .collect();

        OutlineIndex {
            entries,
            min_items: self.min_items,
        }
    }

    fn entry(&self, heading: &Element) -> Option<HeadingEntry> {
        let title = heading_title(heading);
        let title_markup = heading_title_markup(heading);
        if title.is_empty() && title_markup.is_empty() {
            return None;
        }
        Some(HeadingEntry {
            block: heading.block,
            anchor_id: anchor_id(heading),
            title: if title.is_empty() {
                self.default_title.to_string()
            } else {
                title
            },
            title_markup,
            level: level_from_class(heading),
        })
    }
}

/// Inner anchor id, then `data-id`, then the heading's own id without the
/// block prefix.
pub fn anchor_id(heading: &Element) -> String {
    if let Some(id) = heading
        .find(&|el| el.has_class(HEADING_ANCHOR_CLASS) && el.id().is_some())
        .and_then(Element::id)
    {
        return id.to_string();
    }
    if let Some(data_id) = heading.attr("data-id").filter(|id| !id.is_empty()) {
        return data_id.to_string();
    }
    if let Some(own) = heading.id() {
        return own.strip_prefix(BLOCK_ID_PREFIX).unwrap_or(own).to_string();
    }
    String::new()
}

fn title_element(heading: &Element) -> Option<&Element> {
    heading.find(&|el| el.has_class(HEADING_TITLE_CLASS))
}

fn heading_title(heading: &Element) -> String {
    if let Some(text) = title_element(heading)
        .map(Element::text_content)
        .filter(|text| !text.is_empty())
    {
        return text.trim().to_string();
    }
    heading.text_content().trim().to_string()
}

fn heading_title_markup(heading: &Element) -> TitleMarkup {
    let source = title_element(heading).unwrap_or(heading);
    TitleMarkup::sanitize(&source.children)
}

fn level_from_class(heading: &Element) -> u8 {
    (1..=3)
        .find(|level| heading.has_class(&heading_level_class(*level)))
        .unwrap_or(3)
}
