//! Floating outline: a heading rail with a hover/focus popup that tracks the
//! reading position and scrolls to headings on request.

pub mod disclosure;
pub mod host;
pub mod index;
pub mod navigator;
pub mod resolver;
pub mod sanitize;
pub mod signal;
pub mod surfaces;
pub mod timer;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use disclosure::{DisclosureEvent, PointerKind, Surface};
pub use host::{Capabilities, GeometryError, PageHost, ScrollBehavior};
pub use index::{HeadingEntry, Indexer, OutlineIndex};
pub use signal::{OutlineHandle, OutlineSignal};
pub use surfaces::Surfaces;
pub use tracker::{Activation, OutlineTracker, PopupKey};
