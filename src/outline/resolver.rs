//! Active-heading resolution: the anchor offset and the focus-line scan.

use tracing::warn;

use crate::config::{ActiveAnchor, OutlineConfig, CENTER_ANCHOR_BIAS};

use super::host::GeometryError;
use super::index::{HeadingEntry, OutlineIndex};
use super::surfaces::Surfaces;

/// Slack for headings whose top lands a fraction of a pixel below the line.
pub const SUBPIXEL_TOLERANCE: f64 = 1.0;

/// Follows the content top while it sits below the sticky line, then freezes
/// at the sticky line. A failed geometry read yields the sticky value.
pub fn anchor_offset(content_top: Result<f64, GeometryError>, config: &OutlineConfig) -> f64 {
    match content_top {
        Ok(top) => config
            .sticky_top
            .max(top.round() + config.dynamic_title_offset),
        Err(err) => {
            warn!(error = %err, "content geometry unavailable, using sticky top");
            config.sticky_top
        }
    }
}

/// Document-space line a heading must reach to count as current.
pub fn focus_line(scroll_y: f64, viewport_height: f64, config: &OutlineConfig) -> f64 {
    match config.active_anchor {
        ActiveAnchor::Top => scroll_y + config.scroll_offset,
        ActiveAnchor::Center => scroll_y + viewport_height * CENTER_ANCHOR_BIAS,
    }
}

/// Last heading whose top is at or above `focus_line`, else the first one.
/// `top_of` is read lazily and the scan stops at the first heading below the
/// line; headings without geometry are skipped. `None` only for an empty index.
pub fn select_active<F>(index: &OutlineIndex, focus_line: f64, mut top_of: F) -> Option<usize>
where
    F: FnMut(&HeadingEntry) -> Option<f64>,
{
    if index.is_empty() {
        return None;
    }
    let threshold = focus_line + SUBPIXEL_TOLERANCE;
    let mut active = 0;
    for (i, entry) in index.iter().enumerate() {
        let Some(top) = top_of(entry) else {
            continue;
        };
        if top > threshold {
            break;
        }
        active = i;
    }
    Some(active)
}

/// Applies `next` to the surfaces unless it is already shown. Returns whether
/// anything was written.
pub fn reconcile(surfaces: &mut Surfaces, current: &mut Option<usize>, next: usize) -> bool {
    if *current == Some(next) && surfaces.has_active_marker() {
        return false;
    }
    surfaces.apply_active(next);
    *current = Some(next);
    true
}
