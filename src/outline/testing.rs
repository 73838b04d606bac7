//! Scripted `PageHost` for driving the tracker without a terminal.

use std::time::Instant;

use crate::page::{
    heading_level_class, BlockId, Element, Page, CONTENT_ROOT_CLASS, HEADING_ANCHOR_CLASS,
    HEADING_CLASS, HEADING_TITLE_CLASS, PAGE_CLASS,
};

use super::host::{Capabilities, GeometryError, PageHost, ScrollBehavior};
use super::surfaces::Popup;

pub(crate) struct FakeHost {
    pub page: Page,
    pub caps: Capabilities,
    pub scroll_y: f64,
    pub viewport_height: f64,
    pub document_height: f64,
    /// Document tops indexed by `BlockId`.
    pub tops: Vec<f64>,
    /// Page container top relative to the viewport at scroll 0.
    pub page_top: f64,
    pub geometry_broken: bool,
    pub popup_height: f64,
    pub scrolls: Vec<(f64, ScrollBehavior)>,
    pub fragments: Vec<String>,
    pub focused: Vec<BlockId>,
}

impl FakeHost {
    /// A page with one level-2 heading per entry of `tops`, anchored `h0`, `h1`, ...
    pub fn with_headings(tops: &[f64]) -> Self {
        let mut content = Element::new("div").with_class(CONTENT_ROOT_CLASS);
        for i in 0..tops.len() {
            let slug = format!("h{i}");
            content.push(
                Element::new("div")
                    .with_class(HEADING_CLASS)
                    .with_class(&heading_level_class(2))
                    .with_attr("id", format!("block-{slug}"))
                    .with_attr("data-id", slug.clone())
                    .with_block(BlockId(i))
                    .with_child(
                        Element::new("a")
                            .with_class(HEADING_ANCHOR_CLASS)
                            .with_attr("id", slug),
                    )
                    .with_child(
                        Element::new("span")
                            .with_class(HEADING_TITLE_CLASS)
                            .with_text(format!("Heading {i}")),
                    ),
            );
        }
        let page = Page {
            title: "Fake".to_string(),
            root: Element::new("body")
                .with_child(Element::new("div").with_class(PAGE_CLASS).with_child(content)),
            ..Page::default()
        };
        Self {
            page,
            caps: Capabilities {
                scroll_end_events: true,
                position_lock: true,
            },
            scroll_y: 0.0,
            viewport_height: 800.0,
            document_height: 5000.0,
            tops: tops.to_vec(),
            page_top: 200.0,
            geometry_broken: false,
            popup_height: 300.0,
            scrolls: Vec::new(),
            fragments: Vec::new(),
            focused: Vec::new(),
        }
    }
}

impl PageHost for FakeHost {
    fn document(&self) -> &Page {
        &self.page
    }

    fn claim_guard(&mut self, name: &str) -> bool {
        self.page.claim_guard(name)
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    fn max_scroll(&self) -> f64 {
        (self.document_height - self.viewport_height).max(0.0)
    }

    fn block_top(&self, block: BlockId) -> Result<f64, GeometryError> {
        self.tops
            .get(block.0)
            .copied()
            .ok_or(GeometryError::MissingBlock(block.0))
    }

    fn content_top(&self) -> Result<f64, GeometryError> {
        if self.geometry_broken {
            return Err(GeometryError::MissingContainer(PAGE_CLASS));
        }
        Ok(self.page_top - self.scroll_y)
    }

    fn popup_scroll_height(&self, _popup: &Popup) -> f64 {
        self.popup_height
    }

    fn scroll_to(&mut self, y: f64, behavior: ScrollBehavior, _now: Instant) {
        self.scrolls.push((y, behavior));
        if behavior == ScrollBehavior::Instant {
            self.scroll_y = y;
        }
    }

    fn push_fragment(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    fn focus_block(&mut self, block: BlockId) {
        self.focused.push(block);
    }
}
