//! Boundary between the tracker and the page it is installed on.

use std::time::Instant;

use thiserror::Error;

use crate::page::{BlockId, Page};

use super::surfaces::Popup;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("page container `{0}` is not attached")]
    MissingContainer(&'static str),
    #[error("block {0} has no layout")]
    MissingBlock(usize),
    #[error("heading is not attached to a laid-out block")]
    Detached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollBehavior {
    Instant,
    Smooth,
}

/// What the environment can do. Anything missing falls back to the
/// conservative path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// The host reports when a smooth scroll finishes.
    pub scroll_end_events: bool,
    /// The popup can be pinned to explicit geometry.
    pub position_lock: bool,
}

impl Capabilities {
    pub const CONSERVATIVE: Self = Self {
        scroll_end_events: false,
        position_lock: false,
    };
}

/// Geometry is in pixels. Document coordinates are relative to the top of
/// the scrollable document, viewport coordinates to the top of the viewport.
pub trait PageHost {
    fn document(&self) -> &Page;

    /// Sets the installation guard on the page; `false` if already present.
    fn claim_guard(&mut self, name: &str) -> bool;

    fn capabilities(&self) -> Capabilities;

    fn scroll_y(&self) -> f64;

    fn viewport_height(&self) -> f64;

    fn max_scroll(&self) -> f64;

    /// Document-top of a block.
    fn block_top(&self, block: BlockId) -> Result<f64, GeometryError>;

    /// Viewport-relative top of the page container plus its top padding.
    fn content_top(&self) -> Result<f64, GeometryError>;

    /// Natural height of the popup's content.
    fn popup_scroll_height(&self, popup: &Popup) -> f64;

    /// Starts a scroll at `now`; smooth scrolls animate from that instant.
    fn scroll_to(&mut self, y: f64, behavior: ScrollBehavior, now: Instant);

    /// Replaces the location fragment without navigating.
    fn push_fragment(&mut self, fragment: &str);

    /// Moves keyboard focus to a block without scrolling it into view.
    fn focus_block(&mut self, block: BlockId);
}
