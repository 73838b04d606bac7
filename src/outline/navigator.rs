//! Scroll-to-heading with settle detection.
//!
//! A smooth scroll is started towards the heading and a session watches the
//! scroll position until it resolves exactly once: the position stops near
//! the target (finalize), the hard timeout passes (finalize anyway), or the
//! user scrolls against the animation (abandon).

use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::config::SettleTuning;

use super::host::{GeometryError, PageHost, ScrollBehavior};
use super::index::OutlineIndex;
use super::surfaces::encode_fragment;
use super::timer::{earliest, TimerSlot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavigateError {
    #[error("no heading at index {0}")]
    UnknownHeading(usize),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Navigation {
    /// Already at the target; the active state can be applied right away.
    Immediate(usize),
    Started { target_y: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Finalized(usize),
    Abandoned(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Down,
    Up,
}

#[derive(Clone, Debug)]
struct SettleSession {
    target_index: usize,
    target_y: f64,
    direction: Direction,
    last_y: f64,
    last_tick: Instant,
    observes_scroll_end: bool,
    settle: TimerSlot,
    timeout: TimerSlot,
}

impl SettleSession {
    /// Movement against the animation or past the target means someone else
    /// is scrolling.
    fn interrupted_by(&self, change: f64, y: f64) -> bool {
        match self.direction {
            Direction::Down => change < 0.0 || y > self.target_y,
            Direction::Up => change > 0.0 || y < self.target_y,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Navigator {
    tuning: SettleTuning,
    session: Option<SettleSession>,
}

impl Navigator {
    pub fn new(tuning: SettleTuning) -> Self {
        Self {
            tuning,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn target_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.target_index)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.session
            .as_ref()
            .and_then(|s| earliest([s.settle.due(), s.timeout.due()]))
    }

    /// Drops the current session, if any, without an outcome.
    pub fn cancel(&mut self) -> bool {
        self.session.take().is_some()
    }

    pub fn scroll_to_index<H>(
        &mut self,
        host: &mut H,
        index: &OutlineIndex,
        idx: usize,
        scroll_offset: f64,
        now: Instant,
    ) -> Result<Navigation, NavigateError>
    where
        H: PageHost + ?Sized,
    {
        let entry = index.get(idx).ok_or(NavigateError::UnknownHeading(idx))?;
        let block = entry.block.ok_or(GeometryError::Detached)?;
        let raw_target = host.block_top(block)? - scroll_offset;
        let target_y = raw_target.max(0.0).min(host.max_scroll().max(0.0));

        if !entry.anchor_id.is_empty() {
            host.push_fragment(&encode_fragment(&entry.anchor_id));
        }

        if self.cancel() {
            debug!("previous scroll session replaced");
        }

        let start_y = host.scroll_y();
        if (start_y - target_y).abs() <= self.tuning.settle_distance {
            return Ok(Navigation::Immediate(idx));
        }

        let mut session = SettleSession {
            target_index: idx,
            target_y,
            direction: if target_y > start_y {
                Direction::Down
            } else {
                Direction::Up
            },
            last_y: start_y,
            last_tick: now,
            observes_scroll_end: host.capabilities().scroll_end_events,
            settle: TimerSlot::default(),
            timeout: TimerSlot::default(),
        };
        session.settle.arm(now, self.tuning.settle);
        session.timeout.arm(now, self.tuning.timeout);
        self.session = Some(session);

        host.scroll_to(target_y, ScrollBehavior::Smooth, now);
        debug!(idx, target_y, "scroll session started");
        Ok(Navigation::Started { target_y })
    }

    /// Feeds one scroll position sample.
    pub fn on_scroll(&mut self, now: Instant, y: f64) -> Option<SessionOutcome> {
        let tick = self.tuning.tick;
        let settle_distance = self.tuning.settle_distance;
        let settle = self.tuning.settle;

        let session = self.session.as_mut()?;
        if now.saturating_duration_since(session.last_tick) < tick {
            return None;
        }
        let change = y - session.last_y;
        if change.abs() <= settle_distance {
            return None;
        }
        if session.interrupted_by(change, y) {
            return self.abandon();
        }
        session.last_y = y;
        session.last_tick = now;
        session.settle.arm(now, settle);
        None
    }

    /// Completion notification from the host. Ignored unless the session was
    /// started with scroll-end support.
    pub fn on_scroll_end(&mut self, now: Instant, y: f64) -> Option<SessionOutcome> {
        if !self.session.as_ref()?.observes_scroll_end {
            return None;
        }
        self.settle(now, y)
    }

    /// Fires due session timers against the current scroll position.
    pub fn poll(&mut self, now: Instant, y: f64) -> Option<SessionOutcome> {
        let session = self.session.as_mut()?;
        if session.timeout.fire(now) {
            debug!(idx = session.target_index, "scroll session timed out");
            return self.finalize();
        }
        if session.settle.fire(now) {
            return self.settle(now, y);
        }
        None
    }

    fn settle(&mut self, now: Instant, y: f64) -> Option<SessionOutcome> {
        let target_y = self.session.as_ref()?.target_y;
        if (y - target_y).abs() <= self.tuning.settle_distance {
            return self.finalize();
        }

        let outcome = self.on_scroll(now, y);
        if outcome.is_some() {
            return outcome;
        }
        let settle = self.tuning.settle;
        if let Some(session) = self.session.as_mut() {
            if !session.settle.is_armed() {
                session.settle.arm(now, settle);
            }
        }
        None
    }

    fn finalize(&mut self) -> Option<SessionOutcome> {
        let session = self.session.take()?;
        debug!(idx = session.target_index, "scroll session finalized");
        Some(SessionOutcome::Finalized(session.target_index))
    }

    fn abandon(&mut self) -> Option<SessionOutcome> {
        let session = self.session.take()?;
        debug!(idx = session.target_index, "scroll session abandoned");
        Some(SessionOutcome::Abandoned(session.target_index))
    }

    #[cfg(test)]
    fn settle_delay(&self) -> std::time::Duration {
        self.tuning.settle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::host::Capabilities;
    use crate::outline::index::Indexer;
    use crate::outline::testing::FakeHost;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn setup(tops: &[f64]) -> (FakeHost, OutlineIndex, Navigator) {
        let host = FakeHost::with_headings(tops);
        let index = Indexer {
            max_level: 3,
            min_items: 1,
            default_title: "Untitled",
        }
        .index(&host.page);
        (host, index, Navigator::new(SettleTuning::default()))
    }

    #[test]
    fn near_target_resolves_immediately() {
        let (mut host, index, mut nav) = setup(&[0.0, 196.0, 1200.0]);
        host.scroll_y = 101.0;
        let t0 = Instant::now();
        let result = nav.scroll_to_index(&mut host, &index, 1, 96.0, t0);
        assert_eq!(result, Ok(Navigation::Immediate(1)));
        assert!(!nav.is_active());
        assert!(host.scrolls.is_empty());
        assert_eq!(host.fragments, vec!["h1".to_string()]);
    }

    #[test]
    fn target_is_clamped_to_scrollable_range() {
        let (mut host, index, mut nav) = setup(&[50.0, 300.0, 4900.0]);
        host.scroll_y = 1000.0;
        let t0 = Instant::now();
        assert_eq!(
            nav.scroll_to_index(&mut host, &index, 0, 96.0, t0),
            Ok(Navigation::Started { target_y: 0.0 })
        );
        assert_eq!(
            nav.scroll_to_index(&mut host, &index, 2, 96.0, t0),
            Ok(Navigation::Started { target_y: 4200.0 })
        );
    }

    #[test]
    fn converging_samples_finalize_exactly_once() {
        let (mut host, index, mut nav) = setup(&[0.0, 300.0, 1096.0]);
        let t0 = Instant::now();
        nav.scroll_to_index(&mut host, &index, 2, 96.0, t0)
            .expect("navigate");
        assert_eq!(host.scrolls, vec![(1000.0, ScrollBehavior::Smooth)]);

        let mut outcomes = Vec::new();
        let mut now = t0;
        for y in [200.0, 500.0, 800.0, 950.0, 999.0, 1000.0] {
            now += ms(35);
            outcomes.extend(nav.on_scroll(now, y));
            outcomes.extend(nav.poll(now, y));
        }
        for _ in 0..10 {
            now += ms(35);
            outcomes.extend(nav.poll(now, 1000.0));
        }
        outcomes.extend(nav.poll(t0 + ms(5000), 1000.0));
        assert_eq!(outcomes, vec![SessionOutcome::Finalized(2)]);
        assert!(!nav.is_active());
        assert_eq!(nav.next_deadline(), None);
    }

    #[test]
    fn stalled_far_from_target_keeps_waiting_until_timeout() {
        let (mut host, index, mut nav) = setup(&[0.0, 300.0, 1096.0]);
        let t0 = Instant::now();
        nav.scroll_to_index(&mut host, &index, 2, 96.0, t0)
            .expect("navigate");
        nav.on_scroll(t0 + ms(40), 400.0);
        assert_eq!(nav.poll(t0 + ms(100), 400.0), None);
        assert!(nav.is_active());
        assert_eq!(nav.poll(t0 + ms(1000), 400.0), None);
        assert_eq!(
            nav.poll(t0 + ms(2000), 400.0),
            Some(SessionOutcome::Finalized(2))
        );
    }

    #[test]
    fn new_request_replaces_pending_session() {
        let (mut host, index, mut nav) = setup(&[0.0, 600.0, 1096.0]);
        let t0 = Instant::now();
        nav.scroll_to_index(&mut host, &index, 2, 96.0, t0)
            .expect("first");
        nav.on_scroll(t0 + ms(40), 300.0);
        host.scroll_y = 300.0;
        nav.scroll_to_index(&mut host, &index, 1, 96.0, t0 + ms(50))
            .expect("second");
        assert_eq!(nav.target_index(), Some(1));
        assert_eq!(nav.next_deadline(), Some(t0 + ms(50) + nav.settle_delay()));

        let mut outcomes = Vec::new();
        outcomes.extend(nav.on_scroll(t0 + ms(90), 450.0));
        outcomes.extend(nav.on_scroll(t0 + ms(130), 504.0));
        outcomes.extend(nav.poll(t0 + ms(200), 504.0));
        outcomes.extend(nav.poll(t0 + ms(3000), 504.0));
        assert_eq!(outcomes, vec![SessionOutcome::Finalized(1)]);
    }

    #[test]
    fn reversal_abandons_the_session() {
        let (mut host, index, mut nav) = setup(&[0.0, 300.0, 1096.0]);
        let t0 = Instant::now();
        nav.scroll_to_index(&mut host, &index, 2, 96.0, t0)
            .expect("navigate");
        nav.on_scroll(t0 + ms(40), 300.0);
        assert_eq!(
            nav.on_scroll(t0 + ms(80), 200.0),
            Some(SessionOutcome::Abandoned(2))
        );
        assert_eq!(nav.poll(t0 + ms(5000), 200.0), None);
    }

    #[test]
    fn scroll_end_settles_only_with_capability() {
        let (mut host, index, mut nav) = setup(&[0.0, 300.0, 1096.0]);
        host.caps = Capabilities::CONSERVATIVE;
        let t0 = Instant::now();
        nav.scroll_to_index(&mut host, &index, 2, 96.0, t0)
            .expect("navigate");
        assert_eq!(nav.on_scroll_end(t0 + ms(10), 1000.0), None);
        assert!(nav.is_active());

        host.caps.scroll_end_events = true;
        nav.scroll_to_index(&mut host, &index, 2, 96.0, t0)
            .expect("navigate");
        assert_eq!(
            nav.on_scroll_end(t0 + ms(10), 1000.0),
            Some(SessionOutcome::Finalized(2))
        );
    }

    #[test]
    fn unknown_heading_is_an_error() {
        let (mut host, index, mut nav) = setup(&[0.0]);
        assert_eq!(
            nav.scroll_to_index(&mut host, &index, 4, 96.0, Instant::now()),
            Err(NavigateError::UnknownHeading(4))
        );
    }
}
