//! Hover/focus intent and position locking for the popup.

use std::time::Instant;

use tracing::debug;

use crate::config::{Timings, POPUP_BOTTOM_INSET};

use super::surfaces::{LockedGeometry, Overflow, Surfaces};
use super::timer::{earliest, TimerSlot};

/// Content taller than the locked box by less than this is not scrollable.
const OVERFLOW_EPSILON: f64 = 0.5;
/// Slack used when deciding whether an unlocked popup scrolls on its own.
const SCROLL_EPSILON: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    Rail,
    Popup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisclosureEvent {
    PointerEnter(Surface, PointerKind),
    PointerLeave(Surface, PointerKind),
    /// Keyboard focus moved into the popup.
    FocusIn,
    /// Keyboard focus left the popup.
    FocusOut,
    RailClick,
    /// Enter or Space on the rail.
    RailKeyActivate,
    Escape,
    CloseButton,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Opened { focus_active: bool },
    Closed { refocus_rail: bool },
}

/// Environment read when the popup locks or re-tightens.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LockContext {
    /// False in the fullscreen presentation or without position-lock support.
    pub lockable: bool,
    /// Where the unlocked popup currently sits (the live anchor offset).
    pub anchor_top: f64,
    pub viewport_height: f64,
    /// Natural height of the popup's content.
    pub content_height: f64,
}

impl LockContext {
    fn geometry_at(&self, top: f64) -> LockedGeometry {
        let room = (self.viewport_height - top - POPUP_BOTTOM_INSET).max(0.0);
        let height = self.content_height.min(room);
        let overflow = if self.content_height - height > OVERFLOW_EPSILON {
            Overflow::Auto
        } else {
            Overflow::Hidden
        };
        LockedGeometry {
            top,
            height,
            overflow,
        }
    }
}

/// Popup open state plus the pending show/hide intents.
#[derive(Clone, Debug)]
pub struct Disclosure {
    timings: Timings,
    open: bool,
    rail_hover: bool,
    popup_hover: bool,
    popup_focus: bool,
    show_timer: TimerSlot,
    hide_timer: TimerSlot,
}

impl Disclosure {
    pub fn new(timings: Timings) -> Self {
        Self {
            timings,
            open: false,
            rail_hover: false,
            popup_hover: false,
            popup_focus: false,
            show_timer: TimerSlot::default(),
            hide_timer: TimerSlot::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether any hover or focus source keeps the popup wanted.
    pub fn is_engaged(&self) -> bool {
        self.rail_hover || self.popup_hover || self.popup_focus
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.show_timer.due(), self.hide_timer.due()])
    }

    pub fn handle(
        &mut self,
        event: DisclosureEvent,
        now: Instant,
        surfaces: &mut Surfaces,
        lock: &LockContext,
    ) -> Option<Transition> {
        match event {
            DisclosureEvent::PointerEnter(_, PointerKind::Touch)
            | DisclosureEvent::PointerLeave(_, PointerKind::Touch) => None,
            DisclosureEvent::PointerEnter(surface, _) => {
                self.set_hover(surface, true);
                self.schedule_show(now);
                None
            }
            DisclosureEvent::PointerLeave(surface, _) => {
                self.set_hover(surface, false);
                self.schedule_hide(now);
                None
            }
            DisclosureEvent::FocusIn => {
                self.popup_focus = true;
                self.schedule_show(now);
                None
            }
            DisclosureEvent::FocusOut => {
                self.popup_focus = false;
                self.schedule_hide(now);
                None
            }
            DisclosureEvent::RailClick => self.open(surfaces, lock, false),
            DisclosureEvent::RailKeyActivate => self.open(surfaces, lock, true),
            DisclosureEvent::Escape | DisclosureEvent::CloseButton => {
                self.close(surfaces).then_some(Transition::Closed { refocus_rail: true })
            }
        }
    }

    /// Fires due intent timers.
    pub fn poll(
        &mut self,
        now: Instant,
        surfaces: &mut Surfaces,
        lock: &LockContext,
    ) -> Option<Transition> {
        if self.show_timer.fire(now) {
            return self.open(surfaces, lock, false);
        }
        if self.hide_timer.fire(now) && !self.is_engaged() && self.close(surfaces) {
            return Some(Transition::Closed {
                refocus_rail: false,
            });
        }
        None
    }

    /// Opens and locks the popup. Reports a transition when it was closed, or
    /// when keyboard focus should move into it.
    pub fn open(
        &mut self,
        surfaces: &mut Surfaces,
        lock: &LockContext,
        focus_active: bool,
    ) -> Option<Transition> {
        self.show_timer.cancel();
        self.hide_timer.cancel();
        let was_open = self.open;
        self.open = true;
        if focus_active {
            self.popup_focus = true;
        }

        if !was_open {
            surfaces.popup.open = true;
            surfaces.popup.inert = false;
            surfaces.rail.aria_expanded = true;
            surfaces.popup.aria_hidden = false;
            surfaces.touch();
            debug!(focus_active, "outline popup opened");
        }
        if lock.lockable && surfaces.popup.locked.is_none() {
            surfaces.popup.locked = Some(lock.geometry_at(lock.anchor_top.round()));
            surfaces.touch();
        }

        (!was_open || focus_active).then_some(Transition::Opened { focus_active })
    }

    /// Closes and unlocks the popup. Returns `false` if it was not open.
    pub fn close(&mut self, surfaces: &mut Surfaces) -> bool {
        if !self.open {
            return false;
        }
        self.show_timer.cancel();
        self.hide_timer.cancel();
        self.open = false;
        self.popup_focus = false;

        surfaces.popup.open = false;
        surfaces.rail.aria_expanded = false;
        surfaces.popup.aria_hidden = true;
        surfaces.popup.inert = true;
        surfaces.popup.locked = None;
        surfaces.touch();
        debug!("outline popup closed");
        true
    }

    /// Re-tightens the locked height for a new viewport. The top never moves.
    pub fn adjust_locked_height(&self, surfaces: &mut Surfaces, lock: &LockContext) {
        if !lock.lockable {
            return;
        }
        if let Some(locked) = surfaces.popup.locked.as_mut() {
            *locked = lock.geometry_at(locked.top);
            surfaces.touch();
        }
    }

    /// Wheel input over the open popup is swallowed when the popup itself
    /// cannot scroll, so it never reaches the page.
    pub fn traps_wheel(&self, surfaces: &Surfaces, lock: &LockContext) -> bool {
        if !self.open {
            return false;
        }
        let client_height = match surfaces.popup.locked {
            Some(locked) => locked.height,
            None if lock.lockable => lock.geometry_at(lock.anchor_top.round()).height,
            None => lock.viewport_height,
        };
        lock.content_height <= client_height + SCROLL_EPSILON
    }

    fn set_hover(&mut self, surface: Surface, hovered: bool) {
        match surface {
            Surface::Rail => self.rail_hover = hovered,
            Surface::Popup => self.popup_hover = hovered,
        }
    }

    fn schedule_show(&mut self, now: Instant) {
        self.hide_timer.cancel();
        self.show_timer.arm(now, self.timings.show);
    }

    fn schedule_hide(&mut self, now: Instant) {
        self.show_timer.cancel();
        self.hide_timer.arm(now, self.timings.hide);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::index::Indexer;
    use crate::page::{Element, Page, CONTENT_ROOT_CLASS, HEADING_CLASS};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const MOUSE: PointerKind = PointerKind::Mouse;

    fn surfaces() -> Surfaces {
        let mut content = Element::new("div").with_class(CONTENT_ROOT_CLASS);
        for title in ["A", "B", "C"] {
            content.push(
                Element::new("div")
                    .with_class(HEADING_CLASS)
                    .with_class("heading-1")
                    .with_text(title),
            );
        }
        let page = Page {
            root: Element::new("body").with_child(content),
            ..Page::default()
        };
        let index = Indexer {
            max_level: 3,
            min_items: 1,
            default_title: "Untitled",
        }
        .index(&page);
        let mut slot = None;
        Surfaces::build(&mut slot, &index);
        slot.expect("surfaces")
    }

    fn lock_at(anchor_top: f64) -> LockContext {
        LockContext {
            lockable: true,
            anchor_top,
            viewport_height: 800.0,
            content_height: 400.0,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn hover_intent_opens_after_show_delay() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        d.handle(DisclosureEvent::PointerEnter(Surface::Rail, MOUSE), t0, &mut s, &lock);
        assert_eq!(d.poll(t0 + ms(40), &mut s, &lock), None);
        assert_eq!(
            d.poll(t0 + ms(50), &mut s, &lock),
            Some(Transition::Opened { focus_active: false })
        );
        assert!(s.popup.open);
        assert!(!s.popup.inert);
        assert!(s.rail.aria_expanded);
    }

    #[test]
    fn rapid_alternation_settles_on_last_hover_state() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        let mut now = t0;
        for step in 0..10 {
            let surface = if step % 2 == 0 { Surface::Rail } else { Surface::Popup };
            d.handle(DisclosureEvent::PointerEnter(surface, MOUSE), now, &mut s, &lock);
            now += ms(20);
            d.poll(now, &mut s, &lock);
            d.handle(DisclosureEvent::PointerLeave(surface, MOUSE), now, &mut s, &lock);
            now += ms(20);
            d.poll(now, &mut s, &lock);
        }
        d.poll(now + ms(500), &mut s, &lock);
        assert!(!d.is_open());
        assert!(!s.popup.open);
        assert_eq!(d.next_deadline(), None);
    }

    #[test]
    fn moving_from_rail_to_popup_keeps_it_open() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        d.handle(DisclosureEvent::PointerEnter(Surface::Rail, MOUSE), t0, &mut s, &lock);
        d.poll(t0 + ms(60), &mut s, &lock);
        d.handle(DisclosureEvent::PointerLeave(Surface::Rail, MOUSE), t0 + ms(100), &mut s, &lock);
        d.handle(DisclosureEvent::PointerEnter(Surface::Popup, MOUSE), t0 + ms(120), &mut s, &lock);
        d.poll(t0 + ms(1000), &mut s, &lock);
        assert!(d.is_open());
    }

    #[test]
    fn hide_timer_does_not_close_while_focus_is_inside() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        d.handle(DisclosureEvent::RailKeyActivate, t0, &mut s, &lock);
        d.handle(DisclosureEvent::PointerEnter(Surface::Popup, MOUSE), t0, &mut s, &lock);
        d.handle(DisclosureEvent::PointerLeave(Surface::Popup, MOUSE), t0, &mut s, &lock);
        d.poll(t0 + ms(500), &mut s, &lock);
        assert!(d.is_open());
        assert_eq!(
            d.handle(DisclosureEvent::Escape, t0 + ms(600), &mut s, &lock),
            Some(Transition::Closed { refocus_rail: true })
        );
    }

    #[test]
    fn focus_in_opens_after_show_delay() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        assert_eq!(d.handle(DisclosureEvent::FocusIn, t0, &mut s, &lock), None);
        assert!(d.is_engaged());
        assert_eq!(d.poll(t0 + ms(49), &mut s, &lock), None);
        assert_eq!(
            d.poll(t0 + ms(50), &mut s, &lock),
            Some(Transition::Opened { focus_active: false })
        );
        assert!(s.popup.open);
        assert!(s.popup.locked.is_some());
    }

    #[test]
    fn focus_out_closes_after_hide_delay_without_hover() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        d.handle(DisclosureEvent::FocusIn, t0, &mut s, &lock);
        d.poll(t0 + ms(50), &mut s, &lock);
        assert!(d.is_open());

        let left = t0 + ms(100);
        assert_eq!(d.handle(DisclosureEvent::FocusOut, left, &mut s, &lock), None);
        assert!(!d.is_engaged());
        assert_eq!(d.poll(left + ms(179), &mut s, &lock), None);
        assert_eq!(
            d.poll(left + ms(180), &mut s, &lock),
            Some(Transition::Closed { refocus_rail: false })
        );
        assert!(s.popup.inert);
        assert_eq!(s.popup.locked, None);
    }

    #[test]
    fn focus_out_keeps_popup_open_while_hovered() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        d.handle(DisclosureEvent::FocusIn, t0, &mut s, &lock);
        d.poll(t0 + ms(50), &mut s, &lock);
        d.handle(DisclosureEvent::PointerEnter(Surface::Popup, MOUSE), t0 + ms(60), &mut s, &lock);
        d.handle(DisclosureEvent::FocusOut, t0 + ms(70), &mut s, &lock);
        assert_eq!(d.poll(t0 + ms(400), &mut s, &lock), None);
        assert!(d.is_open());
    }

    #[test]
    fn touch_pointer_events_are_ignored() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = lock_at(151.0);
        d.handle(
            DisclosureEvent::PointerEnter(Surface::Rail, PointerKind::Touch),
            t0,
            &mut s,
            &lock,
        );
        assert_eq!(d.next_deadline(), None);
        assert!(!d.is_engaged());
    }

    #[test]
    fn locked_top_ignores_anchor_changes_until_closed() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        d.handle(DisclosureEvent::RailClick, t0, &mut s, &lock_at(300.4));
        let locked = s.popup.locked.expect("locked");
        assert_eq!(locked.top, 300.0);
        assert_eq!(locked.height, 400.0);
        assert_eq!(locked.overflow, Overflow::Hidden);

        d.handle(DisclosureEvent::RailClick, t0, &mut s, &lock_at(151.0));
        assert_eq!(s.popup.locked.map(|l| l.top), Some(300.0));

        let shorter = LockContext {
            viewport_height: 600.0,
            ..lock_at(151.0)
        };
        d.adjust_locked_height(&mut s, &shorter);
        let adjusted = s.popup.locked.expect("still locked");
        assert_eq!(adjusted.top, 300.0);
        assert_eq!(adjusted.height, 288.0);
        assert_eq!(adjusted.overflow, Overflow::Auto);

        d.close(&mut s);
        assert_eq!(s.popup.locked, None);
        d.handle(DisclosureEvent::RailClick, t0, &mut s, &lock_at(151.0));
        assert_eq!(s.popup.locked.map(|l| l.top), Some(151.0));
    }

    #[test]
    fn fullscreen_presentation_never_locks() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let lock = LockContext {
            lockable: false,
            ..lock_at(151.0)
        };
        d.handle(DisclosureEvent::RailClick, t0, &mut s, &lock);
        assert!(d.is_open());
        assert_eq!(s.popup.locked, None);
    }

    #[test]
    fn wheel_is_trapped_only_when_popup_cannot_scroll() {
        let t0 = Instant::now();
        let mut d = Disclosure::new(Timings::default());
        let mut s = surfaces();
        let short = lock_at(151.0);
        assert!(!d.traps_wheel(&s, &short));
        d.handle(DisclosureEvent::RailClick, t0, &mut s, &short);
        assert!(d.traps_wheel(&s, &short));

        d.close(&mut s);
        let tall = LockContext {
            content_height: 2000.0,
            ..lock_at(151.0)
        };
        d.handle(DisclosureEvent::RailClick, t0, &mut s, &tall);
        assert!(!d.traps_wheel(&s, &tall));
    }
}
