//! The rail and popup surfaces and their one-time construction.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::index::OutlineIndex;
use super::sanitize::TitleMarkup;

pub const POPUP_ID: &str = "outline-rail-popup";

/// Characters `encodeURIComponent` leaves untouched.
const FRAGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_fragment(anchor: &str) -> String {
    utf8_percent_encode(anchor, FRAGMENT).to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bar {
    pub level: u8,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopupItem {
    pub level: u8,
    pub href: String,
    pub title: String,
    pub title_markup: TitleMarkup,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    Auto,
    Hidden,
}

/// Explicit geometry applied while the popup is open and locked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LockedGeometry {
    pub top: f64,
    pub height: f64,
    pub overflow: Overflow,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rail {
    pub bars: Vec<Bar>,
    pub hidden: bool,
    /// Set once the bars and items exist; guards repeated builds.
    pub populated: bool,
    pub aria_label: &'static str,
    pub aria_expanded: bool,
    pub aria_controls: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Popup {
    pub id: String,
    pub items: Vec<PopupItem>,
    pub hidden: bool,
    pub open: bool,
    pub aria_label: &'static str,
    pub aria_hidden: bool,
    pub inert: bool,
    pub locked: Option<LockedGeometry>,
}

/// Both surfaces plus a write counter used to observe DOM-equivalent churn.
#[derive(Clone, Debug, PartialEq)]
pub struct Surfaces {
    pub rail: Rail,
    pub popup: Popup,
    writes: u64,
}

impl Surfaces {
    fn containers() -> Self {
        Self {
            rail: Rail {
                bars: Vec::new(),
                hidden: false,
                populated: false,
                aria_label: "Table of contents rail",
                aria_expanded: false,
                aria_controls: POPUP_ID.to_string(),
            },
            popup: Popup {
                id: POPUP_ID.to_string(),
                items: Vec::new(),
                hidden: false,
                open: false,
                aria_label: "Table of contents",
                aria_hidden: true,
                inert: true,
                locked: None,
            },
            writes: 0,
        }
    }

    /// Creates the containers if needed and fills them from `index`. Safe to
    /// call repeatedly: a populated rail is left untouched.
    pub fn build(slot: &mut Option<Surfaces>, index: &OutlineIndex) -> bool {
        let surfaces = slot.get_or_insert_with(Self::containers);
        if surfaces.rail.populated {
            return false;
        }

        let visible = index.is_usable();
        surfaces.rail.hidden = !visible;
        surfaces.popup.hidden = !visible;
        surfaces.writes += 1;
        if !visible {
            return false;
        }

        surfaces.rail.bars = index
            .iter()
            .map(|h| Bar {
                level: h.level.clamp(1, 3),
                active: false,
            })
            .collect();
        surfaces.popup.items = index
            .iter()
            .map(|h| PopupItem {
                level: h.level.clamp(1, 3),
                href: if h.anchor_id.is_empty() {
                    "#".to_string()
                } else {
                    format!("#{}", encode_fragment(&h.anchor_id))
                },
                title: h.title.clone(),
                title_markup: h.title_markup.clone(),
                active: false,
            })
            .collect();
        surfaces.rail.populated = true;
        surfaces.writes += 1;
        true
    }

    pub fn is_hidden(&self) -> bool {
        self.rail.hidden
    }

    pub fn has_active_marker(&self) -> bool {
        self.rail.bars.iter().any(|b| b.active) || self.popup.items.iter().any(|i| i.active)
    }

    /// Clears every marker and sets exactly the one at `idx`.
    pub fn apply_active(&mut self, idx: usize) {
        for (i, bar) in self.rail.bars.iter_mut().enumerate() {
            bar.active = i == idx;
        }
        for (i, item) in self.popup.items.iter_mut().enumerate() {
            item.active = i == idx;
        }
        self.writes += 1;
    }

    pub fn active_item(&self) -> Option<usize> {
        self.popup.items.iter().position(|item| item.active)
    }

    pub(crate) fn touch(&mut self) {
        self.writes += 1;
    }

    /// Number of mutations applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::index::Indexer;
    use crate::page::{Element, Page, CONTENT_ROOT_CLASS, HEADING_CLASS};
    use pretty_assertions::assert_eq;

    fn index_of(titles: &[&str], min_items: usize) -> OutlineIndex {
        let mut content = Element::new("div").with_class(CONTENT_ROOT_CLASS);
        for (i, title) in titles.iter().enumerate() {
            content.push(
                Element::new("div")
                    .with_class(HEADING_CLASS)
                    .with_class("heading-2")
                    .with_attr("data-id", format!("{i} {title}"))
                    .with_text(*title),
            );
        }
        let page = Page {
            root: Element::new("body").with_child(content),
            ..Page::default()
        };
        Indexer {
            max_level: 3,
            min_items,
            default_title: "Untitled",
        }
        .index(&page)
    }

    #[test]
    fn building_twice_yields_one_populated_pair() {
        let index = index_of(&["A", "B", "C"], 3);
        let mut slot = None;
        assert!(Surfaces::build(&mut slot, &index));
        assert!(!Surfaces::build(&mut slot, &index));
        let surfaces = slot.expect("surfaces");
        assert_eq!(surfaces.rail.bars.len(), 3);
        assert_eq!(surfaces.popup.items.len(), 3);
        assert_eq!(surfaces.rail.aria_controls, surfaces.popup.id);
    }

    #[test]
    fn small_index_hides_both_surfaces() {
        let index = index_of(&["A", "B"], 3);
        let mut slot = None;
        Surfaces::build(&mut slot, &index);
        let surfaces = slot.expect("surfaces");
        assert!(surfaces.rail.hidden);
        assert!(surfaces.popup.hidden);
        assert!(surfaces.popup.items.is_empty());
    }

    #[test]
    fn hrefs_are_percent_encoded() {
        let index = index_of(&["Q&A", "B", "C"], 1);
        let mut slot = None;
        Surfaces::build(&mut slot, &index);
        let surfaces = slot.expect("surfaces");
        assert_eq!(surfaces.popup.items[0].href, "#0%20Q%26A");
    }

    #[test]
    fn exactly_one_active_marker() {
        let index = index_of(&["A", "B", "C"], 1);
        let mut slot = None;
        Surfaces::build(&mut slot, &index);
        let mut surfaces = slot.expect("surfaces");
        surfaces.apply_active(0);
        surfaces.apply_active(2);
        let active: Vec<bool> = surfaces.rail.bars.iter().map(|b| b.active).collect();
        assert_eq!(active, vec![false, false, true]);
        assert_eq!(surfaces.active_item(), Some(2));
    }
}
