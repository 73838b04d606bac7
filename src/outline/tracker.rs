//! The installed outline: owns every piece of per-page state and routes host
//! events into the resolver, the disclosure controller and the navigator.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::OutlineConfig;
use crate::page::BlockId;

use super::disclosure::{Disclosure, DisclosureEvent, LockContext, Transition};
use super::host::PageHost;
use super::index::{Indexer, OutlineIndex};
use super::navigator::{Navigation, Navigator, SessionOutcome};
use super::resolver::{anchor_offset, focus_line, reconcile, select_active};
use super::signal::OutlineHandle;
use super::surfaces::Surfaces;
use super::timer::{earliest, TimerSlot};

/// Attribute placed on the page root once the outline is installed.
pub const GUARD_ATTR: &str = "data-outline-rail-init";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Pointer,
    /// Enter or Space on a popup item.
    Keyboard,
    /// Relative jumps issued by the host (next/previous heading).
    Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopupKey {
    Up,
    Down,
    Escape,
    Activate,
}

#[derive(Clone, Copy, Debug, Default)]
struct PendingFocus {
    /// Heading to focus once its scroll session resolves.
    awaiting: Option<usize>,
    block: Option<BlockId>,
    timer: TimerSlot,
}

pub struct OutlineTracker {
    config: OutlineConfig,
    index: OutlineIndex,
    surfaces: Surfaces,
    active: Option<usize>,
    disclosure: Disclosure,
    navigator: Navigator,
    handle: OutlineHandle,
    frame_pending: bool,
    popup_focus: Option<usize>,
    rail_focused: bool,
    heading_focus: PendingFocus,
    /// Scroll position at which a finished navigation pinned the active item.
    pinned_at: Option<f64>,
}

impl OutlineTracker {
    /// Installs the outline on the host page. Returns `None` if the page was
    /// already claimed by an earlier installation.
    pub fn install<H: PageHost>(host: &mut H, config: OutlineConfig) -> Option<Self> {
        if !host.claim_guard(GUARD_ATTR) {
            debug!("outline already installed on this page");
            return None;
        }

        let index = Indexer::from_config(&config).index(host.document());
        let mut slot = None;
        Surfaces::build(&mut slot, &index);
        let surfaces = slot?;

        let mut tracker = Self {
            disclosure: Disclosure::new(config.timings),
            navigator: Navigator::new(config.settle),
            handle: OutlineHandle::new(config.sticky_top),
            config,
            index,
            surfaces,
            active: None,
            frame_pending: false,
            popup_focus: None,
            rail_focused: false,
            heading_focus: PendingFocus::default(),
            pinned_at: None,
        };
        tracker.tick(&*host, true);
        info!(
            headings = tracker.index.len(),
            visible = !tracker.surfaces.is_hidden(),
            mobile_popup = tracker.config.mobile_popup,
            "outline initialized"
        );
        tracker.handle.announce_ready();
        Some(tracker)
    }

    pub fn config(&self) -> &OutlineConfig {
        &self.config
    }

    pub fn index(&self) -> &OutlineIndex {
        &self.index
    }

    pub fn surfaces(&self) -> &Surfaces {
        &self.surfaces
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn handle(&self) -> OutlineHandle {
        self.handle.clone()
    }

    pub fn anchor_top(&self) -> f64 {
        self.handle.top()
    }

    pub fn is_open(&self) -> bool {
        self.disclosure.is_open()
    }

    /// Popup item holding keyboard focus.
    pub fn popup_focus(&self) -> Option<usize> {
        self.popup_focus
    }

    pub fn rail_focused(&self) -> bool {
        self.rail_focused
    }

    pub fn is_navigating(&self) -> bool {
        self.navigator.is_active()
    }

    /// Recomputes the anchor offset, then the active heading. Unforced ticks
    /// are deferred to the next frame.
    pub fn tick<H: PageHost + ?Sized>(&mut self, host: &H, force: bool) {
        if !force {
            self.frame_pending = true;
            return;
        }
        let top = anchor_offset(host.content_top(), &self.config);
        self.handle.publish(top);
        self.update_active(host);
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// Runs at most one deferred tick per rendered frame.
    pub fn on_frame<H: PageHost + ?Sized>(&mut self, host: &H) {
        if std::mem::take(&mut self.frame_pending) {
            self.tick(host, true);
        }
    }

    pub fn on_scroll<H: PageHost + ?Sized>(&mut self, host: &mut H, now: Instant) {
        let outcome = self.navigator.on_scroll(now, host.scroll_y());
        self.settle_outcome(&*host, outcome, now);
        self.tick(&*host, false);
    }

    pub fn on_scroll_end<H: PageHost + ?Sized>(&mut self, host: &mut H, now: Instant) {
        let outcome = self.navigator.on_scroll_end(now, host.scroll_y());
        self.settle_outcome(&*host, outcome, now);
    }

    pub fn on_resize<H: PageHost + ?Sized>(&mut self, host: &H) {
        self.pinned_at = None;
        self.tick(host, true);
        let lock = self.lock_context(host);
        self.disclosure.adjust_locked_height(&mut self.surfaces, &lock);
    }

    pub fn on_disclosure<H: PageHost + ?Sized>(
        &mut self,
        host: &H,
        event: DisclosureEvent,
        now: Instant,
    ) {
        if self.surfaces.is_hidden() {
            return;
        }
        match event {
            DisclosureEvent::FocusIn => {
                let item = self.surfaces.active_item().unwrap_or(0);
                self.popup_focus.get_or_insert(item);
                self.rail_focused = false;
            }
            DisclosureEvent::FocusOut => self.popup_focus = None,
            _ => {}
        }
        let lock = self.lock_context(host);
        let transition = self.disclosure.handle(event, now, &mut self.surfaces, &lock);
        self.apply_transition(host, transition);
    }

    pub fn on_popup_key<H: PageHost + ?Sized>(&mut self, host: &mut H, key: PopupKey, now: Instant) {
        if !self.disclosure.is_open() || self.index.is_empty() {
            return;
        }
        let last = self.index.len() - 1;
        let current = self.popup_focus.unwrap_or(0).min(last);
        match key {
            PopupKey::Down => self.popup_focus = Some((current + 1).min(last)),
            PopupKey::Up => self.popup_focus = Some(current.saturating_sub(1)),
            PopupKey::Escape => self.on_disclosure(&*host, DisclosureEvent::Escape, now),
            PopupKey::Activate => self.activate_entry(host, current, Activation::Keyboard, now),
        }
    }

    /// Whether a wheel gesture over the popup must be kept from the page.
    pub fn popup_traps_wheel<H: PageHost + ?Sized>(&self, host: &H) -> bool {
        let lock = self.lock_context(host);
        self.disclosure.traps_wheel(&self.surfaces, &lock)
    }

    /// Navigates to an entry the way the popup item at `idx` would.
    pub fn activate_entry<H: PageHost + ?Sized>(
        &mut self,
        host: &mut H,
        idx: usize,
        activation: Activation,
        now: Instant,
    ) {
        self.heading_focus = PendingFocus::default();
        if activation == Activation::Keyboard {
            self.heading_focus.awaiting = Some(idx);
        }
        self.scroll_to_index(host, idx, now);

        let closes = match activation {
            Activation::Keyboard => true,
            Activation::Pointer => self.config.mobile_popup,
            Activation::Command => false,
        };
        if closes && self.disclosure.close(&mut self.surfaces) {
            self.apply_transition(&*host, Some(Transition::Closed { refocus_rail: false }));
        }
    }

    /// Next (`delta > 0`) or previous heading relative to the active one.
    pub fn navigate_relative<H: PageHost + ?Sized>(&mut self, host: &mut H, delta: isize, now: Instant) {
        if self.index.is_empty() {
            return;
        }
        let from = self.navigator.target_index().or(self.active).unwrap_or(0);
        let last = self.index.len() - 1;
        let to = from.saturating_add_signed(delta).min(last);
        if to != from {
            self.activate_entry(host, to, Activation::Command, now);
        }
    }

    pub fn scroll_to_index<H: PageHost + ?Sized>(&mut self, host: &mut H, idx: usize, now: Instant) {
        let result =
            self.navigator
                .scroll_to_index(host, &self.index, idx, self.config.scroll_offset, now);
        match result {
            Ok(Navigation::Immediate(idx)) => {
                self.settle_outcome(&*host, Some(SessionOutcome::Finalized(idx)), now)
            }
            Ok(Navigation::Started { .. }) => {}
            Err(err) => {
                warn!(idx, error = %err, "cannot navigate to heading");
                self.heading_focus = PendingFocus::default();
            }
        }
    }

    /// Fires every due timer.
    pub fn poll<H: PageHost + ?Sized>(&mut self, host: &mut H, now: Instant) {
        let lock = self.lock_context(&*host);
        let transition = self.disclosure.poll(now, &mut self.surfaces, &lock);
        self.apply_transition(&*host, transition);

        let outcome = self.navigator.poll(now, host.scroll_y());
        self.settle_outcome(&*host, outcome, now);

        if self.heading_focus.timer.fire(now) {
            if let Some(block) = self.heading_focus.block.take() {
                host.focus_block(block);
                self.rail_focused = false;
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.disclosure.next_deadline(),
            self.navigator.next_deadline(),
            self.heading_focus.timer.due(),
        ])
    }

    fn update_active<H: PageHost + ?Sized>(&mut self, host: &H) {
        if self.index.is_empty() {
            return;
        }
        let scroll_y = host.scroll_y();
        if self.pinned_at == Some(scroll_y) && self.surfaces.has_active_marker() {
            return;
        }
        self.pinned_at = None;

        let line = focus_line(scroll_y, host.viewport_height(), &self.config);
        let next = select_active(&self.index, line, |entry| {
            entry.block.and_then(|block| host.block_top(block).ok())
        });
        if let Some(next) = next {
            reconcile(&mut self.surfaces, &mut self.active, next);
        }
    }

    fn settle_outcome<H: PageHost + ?Sized>(
        &mut self,
        host: &H,
        outcome: Option<SessionOutcome>,
        now: Instant,
    ) {
        match outcome {
            Some(SessionOutcome::Finalized(idx)) => {
                reconcile(&mut self.surfaces, &mut self.active, idx);
                self.pinned_at = Some(host.scroll_y());
                if self.heading_focus.awaiting.take() == Some(idx) {
                    self.heading_focus.block = self.index.get(idx).and_then(|h| h.block);
                    self.heading_focus
                        .timer
                        .arm(now, self.config.timings.focus_delay);
                }
            }
            Some(SessionOutcome::Abandoned(_)) => self.heading_focus = PendingFocus::default(),
            None => {}
        }
    }

    fn apply_transition<H: PageHost + ?Sized>(&mut self, host: &H, transition: Option<Transition>) {
        match transition {
            Some(Transition::Opened { focus_active }) => {
                if focus_active {
                    self.popup_focus = Some(self.surfaces.active_item().unwrap_or(0));
                }
                self.rail_focused = false;
            }
            Some(Transition::Closed { refocus_rail }) => {
                self.popup_focus = None;
                self.rail_focused = refocus_rail;
                self.tick(host, true);
            }
            None => {}
        }
    }

    fn lock_context<H: PageHost + ?Sized>(&self, host: &H) -> LockContext {
        LockContext {
            lockable: !self.config.mobile_popup && host.capabilities().position_lock,
            anchor_top: self.handle.top(),
            viewport_height: host.viewport_height(),
            content_height: host.popup_scroll_height(&self.surfaces.popup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::disclosure::{PointerKind, Surface};
    use crate::outline::host::{Capabilities, ScrollBehavior};
    use crate::outline::signal::OutlineSignal;
    use crate::outline::testing::FakeHost;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn installed(tops: &[f64]) -> (FakeHost, OutlineTracker) {
        let mut host = FakeHost::with_headings(tops);
        let tracker = OutlineTracker::install(&mut host, OutlineConfig::default()).expect("install");
        (host, tracker)
    }

    #[test]
    fn second_install_on_same_page_is_refused() {
        let (mut host, tracker) = installed(&[0.0, 300.0, 900.0]);
        assert_eq!(tracker.surfaces().rail.bars.len(), 3);
        assert!(OutlineTracker::install(&mut host, OutlineConfig::default()).is_none());
    }

    #[test]
    fn install_announces_ready_with_the_first_offset() {
        let (_host, tracker) = installed(&[0.0, 300.0, 900.0]);
        let rx = tracker.handle().subscribe();
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                OutlineSignal::Top { top_px: 218.0 },
                OutlineSignal::Ready { top_px: 218.0 },
            ]
        );
        assert_eq!(tracker.active_index(), Some(0));
    }

    #[test]
    fn scrolling_is_applied_once_per_frame() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        let rx = tracker.handle().subscribe();
        let t0 = Instant::now();
        host.scroll_y = 300.0;
        tracker.on_scroll(&mut host, t0);
        tracker.on_scroll(&mut host, t0);
        assert!(tracker.frame_pending());
        assert_eq!(tracker.active_index(), Some(0));
        tracker.on_frame(&host);
        tracker.on_frame(&host);
        assert_eq!(tracker.active_index(), Some(1));
        assert_eq!(tracker.anchor_top(), 151.0);
        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn geometry_failure_falls_back_to_sticky_top_for_one_tick() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        host.geometry_broken = true;
        tracker.tick(&host, true);
        assert_eq!(tracker.anchor_top(), 151.0);
        host.geometry_broken = false;
        tracker.tick(&host, true);
        assert_eq!(tracker.anchor_top(), 218.0);
    }

    #[test]
    fn unchanged_tick_writes_nothing() {
        let (host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        let writes = tracker.surfaces().write_count();
        tracker.tick(&host, true);
        tracker.tick(&host, true);
        assert_eq!(tracker.surfaces().write_count(), writes);
    }

    #[test]
    fn too_few_headings_hide_surfaces_and_ignore_hover() {
        let (host, mut tracker) = installed(&[0.0, 300.0]);
        assert!(tracker.surfaces().is_hidden());
        tracker.on_disclosure(&host, DisclosureEvent::RailClick, Instant::now());
        assert!(!tracker.is_open());
        assert_eq!(tracker.index().len(), 2);
    }

    #[test]
    fn focus_moving_through_the_popup_opens_then_closes_it() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        let t0 = Instant::now();
        tracker.on_disclosure(&host, DisclosureEvent::FocusIn, t0);
        assert_eq!(tracker.popup_focus(), Some(0));
        assert!(!tracker.is_open());
        tracker.poll(&mut host, t0 + ms(50));
        assert!(tracker.is_open());

        tracker.on_popup_key(&mut host, PopupKey::Down, t0 + ms(60));
        tracker.on_disclosure(&host, DisclosureEvent::FocusOut, t0 + ms(100));
        assert_eq!(tracker.popup_focus(), None);
        tracker.poll(&mut host, t0 + ms(279));
        assert!(tracker.is_open());
        tracker.poll(&mut host, t0 + ms(280));
        assert!(!tracker.is_open());
        assert!(!tracker.rail_focused());
    }

    #[test]
    fn keyboard_activation_closes_navigates_and_focuses_heading_later() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 1096.0]);
        let t0 = Instant::now();
        tracker.on_disclosure(&host, DisclosureEvent::RailKeyActivate, t0);
        assert_eq!(tracker.popup_focus(), Some(0));
        tracker.on_popup_key(&mut host, PopupKey::Down, t0);
        tracker.on_popup_key(&mut host, PopupKey::Down, t0);
        tracker.on_popup_key(&mut host, PopupKey::Down, t0);
        assert_eq!(tracker.popup_focus(), Some(2));

        tracker.on_popup_key(&mut host, PopupKey::Activate, t0);
        assert!(!tracker.is_open());
        assert_eq!(host.fragments, vec!["h2".to_string()]);
        assert_eq!(host.scrolls, vec![(1000.0, ScrollBehavior::Smooth)]);

        let mut now = t0;
        for y in [300.0, 700.0, 1000.0] {
            now += ms(40);
            host.scroll_y = y;
            tracker.on_scroll(&mut host, now);
            tracker.on_frame(&host);
        }
        tracker.on_scroll_end(&mut host, now);
        assert_eq!(tracker.active_index(), Some(2));
        assert!(!tracker.is_navigating());
        assert!(host.focused.is_empty());

        tracker.poll(&mut host, now + ms(349));
        assert!(host.focused.is_empty());
        tracker.poll(&mut host, now + ms(350));
        assert_eq!(host.focused, vec![BlockId(2)]);
        assert_eq!(host.scroll_y, 1000.0);
    }

    #[test]
    fn finalized_target_survives_the_last_frame() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 4500.0, 4600.0]);
        let t0 = Instant::now();
        tracker.activate_entry(&mut host, 3, Activation::Pointer, t0);
        host.scroll_y = 4200.0;
        tracker.on_scroll(&mut host, t0 + ms(40));
        tracker.on_scroll_end(&mut host, t0 + ms(40));
        assert_eq!(tracker.active_index(), Some(3));
        tracker.on_frame(&host);
        assert_eq!(tracker.active_index(), Some(3));

        host.scroll_y = 4100.0;
        tracker.on_scroll(&mut host, t0 + ms(80));
        tracker.on_frame(&host);
        assert_eq!(tracker.active_index(), Some(1));
    }

    #[test]
    fn pointer_activation_keeps_desktop_popup_open() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        let t0 = Instant::now();
        tracker.on_disclosure(&host, DisclosureEvent::RailClick, t0);
        tracker.activate_entry(&mut host, 1, Activation::Pointer, t0);
        assert!(tracker.is_open());
    }

    #[test]
    fn mobile_presentation_closes_after_pointer_activation_and_never_locks() {
        let mut host = FakeHost::with_headings(&[0.0, 300.0, 900.0]);
        let config = OutlineConfig {
            mobile_popup: true,
            ..OutlineConfig::default()
        };
        let mut tracker = OutlineTracker::install(&mut host, config).expect("install");
        let t0 = Instant::now();
        tracker.on_disclosure(&host, DisclosureEvent::RailClick, t0);
        assert!(tracker.is_open());
        assert_eq!(tracker.surfaces().popup.locked, None);
        tracker.activate_entry(&mut host, 1, Activation::Pointer, t0);
        assert!(!tracker.is_open());
    }

    #[test]
    fn locked_popup_ignores_anchor_updates_but_follows_resize() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        let t0 = Instant::now();
        tracker.on_disclosure(
            &host,
            DisclosureEvent::PointerEnter(Surface::Rail, PointerKind::Mouse),
            t0,
        );
        tracker.poll(&mut host, t0 + ms(50));
        assert!(tracker.is_open());
        assert_eq!(tracker.surfaces().popup.locked.map(|l| l.top), Some(218.0));

        host.scroll_y = 400.0;
        tracker.on_scroll(&mut host, t0 + ms(60));
        tracker.on_frame(&host);
        assert_eq!(tracker.anchor_top(), 151.0);
        assert_eq!(tracker.surfaces().popup.locked.map(|l| l.top), Some(218.0));

        host.viewport_height = 400.0;
        tracker.on_resize(&host);
        let locked = tracker.surfaces().popup.locked.expect("locked");
        assert_eq!(locked.top, 218.0);
        assert_eq!(locked.height, 170.0);
    }

    #[test]
    fn conservative_host_never_locks_and_settles_by_timeout() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 1096.0]);
        host.caps = Capabilities::CONSERVATIVE;
        let t0 = Instant::now();
        tracker.on_disclosure(&host, DisclosureEvent::RailClick, t0);
        assert!(tracker.is_open());
        assert_eq!(tracker.surfaces().popup.locked, None);

        tracker.activate_entry(&mut host, 2, Activation::Pointer, t0);
        host.scroll_y = 1000.0;
        tracker.on_scroll_end(&mut host, t0 + ms(10));
        assert!(tracker.is_navigating());

        tracker.poll(&mut host, t0 + ms(2000));
        assert!(!tracker.is_navigating());
        assert_eq!(tracker.active_index(), Some(2));
    }

    #[test]
    fn escape_closes_and_returns_focus_to_rail() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        let t0 = Instant::now();
        tracker.on_disclosure(&host, DisclosureEvent::RailKeyActivate, t0);
        tracker.on_popup_key(&mut host, PopupKey::Escape, t0);
        assert!(!tracker.is_open());
        assert!(tracker.rail_focused());
        assert_eq!(tracker.popup_focus(), None);
        assert!(tracker.surfaces().popup.inert);
    }

    #[test]
    fn relative_navigation_walks_from_active_heading() {
        let (mut host, mut tracker) = installed(&[0.0, 300.0, 900.0]);
        let t0 = Instant::now();
        tracker.navigate_relative(&mut host, 1, t0);
        assert_eq!(host.scrolls, vec![(204.0, ScrollBehavior::Smooth)]);
        tracker.navigate_relative(&mut host, 1, t0);
        assert_eq!(host.scrolls.last(), Some(&(804.0, ScrollBehavior::Smooth)));
        tracker.navigate_relative(&mut host, -5, t0);
        assert_eq!(host.fragments.last().map(String::as_str), Some("h0"));
        assert_eq!(tracker.active_index(), Some(0));
    }
}
