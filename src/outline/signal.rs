//! Broadcast of the anchor offset to collaborators that align with the outline.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutlineSignal {
    /// Sent once, after the first index and tick.
    Ready { top_px: f64 },
    /// Sent on every anchor recomputation.
    Top { top_px: f64 },
}

#[derive(Debug)]
struct Shared {
    top_px: f64,
    ready: bool,
    subscribers: Vec<Sender<OutlineSignal>>,
}

impl Shared {
    /// Delivers to every live subscriber and forgets the dropped ones.
    fn broadcast(&mut self, signal: OutlineSignal) {
        self.subscribers.retain(|tx| tx.send(signal).is_ok());
    }
}

/// Read side of the tracker's offset. Cheap to clone; only the tracker writes.
#[derive(Clone, Debug)]
pub struct OutlineHandle {
    shared: Rc<RefCell<Shared>>,
}

impl OutlineHandle {
    pub(crate) fn new(initial_top: f64) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                top_px: initial_top,
                ready: false,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn top(&self) -> f64 {
        self.shared.borrow().top_px
    }

    pub fn is_ready(&self) -> bool {
        self.shared.borrow().ready
    }

    /// New subscribers get the current top right away, plus `Ready` when the
    /// handshake already happened, so late consumers never wait forever.
    pub fn subscribe(&self) -> Receiver<OutlineSignal> {
        let (tx, rx) = channel();
        let mut shared = self.shared.borrow_mut();
        let top_px = shared.top_px;
        let _ = tx.send(OutlineSignal::Top { top_px });
        if shared.ready {
            let _ = tx.send(OutlineSignal::Ready { top_px });
        }
        shared.subscribers.push(tx);
        rx
    }

    pub(crate) fn publish(&self, top_px: f64) {
        let mut shared = self.shared.borrow_mut();
        shared.top_px = top_px;
        shared.broadcast(OutlineSignal::Top { top_px });
    }

    pub(crate) fn announce_ready(&self) {
        let mut shared = self.shared.borrow_mut();
        if shared.ready {
            return;
        }
        shared.ready = true;
        let top_px = shared.top_px;
        shared.broadcast(OutlineSignal::Ready { top_px });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn early_subscriber_sees_every_update_then_ready_once() {
        let handle = OutlineHandle::new(151.0);
        let rx = handle.subscribe();
        handle.publish(300.0);
        handle.announce_ready();
        handle.announce_ready();
        handle.publish(151.0);
        let got: Vec<OutlineSignal> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                OutlineSignal::Top { top_px: 151.0 },
                OutlineSignal::Top { top_px: 300.0 },
                OutlineSignal::Ready { top_px: 300.0 },
                OutlineSignal::Top { top_px: 151.0 },
            ]
        );
    }

    #[test]
    fn late_subscriber_gets_current_top_and_ready() {
        let handle = OutlineHandle::new(151.0);
        handle.publish(220.0);
        handle.announce_ready();
        let rx = handle.subscribe();
        let got: Vec<OutlineSignal> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                OutlineSignal::Top { top_px: 220.0 },
                OutlineSignal::Ready { top_px: 220.0 },
            ]
        );
        assert!(handle.clone().is_ready());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let handle = OutlineHandle::new(0.0);
        drop(handle.subscribe());
        handle.publish(1.0);
        assert!(handle.shared.borrow().subscribers.is_empty());
    }
}
