//! Serialized radio event queue.
//!
//! The BLE stack delivers connect/disconnect/write callbacks from the
//! Bluedroid host task; the main loop consumes them. Funnelling every
//! event through this single queue is what gives the provisioning
//! machine its one-logical-thread contract — the machine itself holds
//! no locks.
//!
//! ```text
//! ┌───────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ GATTS callback│─────▶│  EventQueue  │─────▶│  Main loop   │
//! │ GAP callback  │─────▶│  (mutexed)   │      │  (consumer)  │
//! └───────────────┘      └──────────────┘      └──────────────┘
//! ```
//!
//! GATTS callbacks run in the Bluedroid task, not in ISR context, so a
//! blocking mutex is safe here.

use std::collections::VecDeque;
use std::sync::Mutex;

use log::warn;

use crate::app::events::RadioEvent;

/// Maximum number of pending events before new ones are dropped.
pub const RADIO_QUEUE_CAP: usize = 32;

/// Bounded FIFO of radio events.
pub struct EventQueue {
    inner: Mutex<VecDeque<RadioEvent>>,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue an event. Returns `false` (dropping the event) when the
    /// queue is full or the mutex is poisoned.
    pub fn push(&self, event: RadioEvent) -> bool {
        let Ok(mut queue) = self.inner.lock() else {
            return false;
        };
        if queue.len() >= RADIO_QUEUE_CAP {
            warn!("radio event queue full, dropping {:?}", event);
            return false;
        }
        queue.push_back(event);
        true
    }

    /// Dequeue the oldest event, if any.
    pub fn pop(&self) -> Option<RadioEvent> {
        self.inner.lock().ok()?.pop_front()
    }

    /// Drain all pending events into `handler`, in FIFO order.
    ///
    /// Events are popped one at a time so the handler may block (the
    /// association attempt does) without holding the queue lock.
    pub fn drain(&self, mut handler: impl FnMut(RadioEvent)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The queue the radio callbacks feed and the main loop drains.
pub static RADIO_EVENTS: EventQueue = EventQueue::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let queue = EventQueue::new();
        queue.push(RadioEvent::Connected(1));
        queue.push(RadioEvent::Written(1, vec![0x41]));
        queue.push(RadioEvent::Disconnected(1));

        assert_eq!(queue.pop(), Some(RadioEvent::Connected(1)));
        assert_eq!(queue.pop(), Some(RadioEvent::Written(1, vec![0x41])));
        assert_eq!(queue.pop(), Some(RadioEvent::Disconnected(1)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn full_queue_drops_events() {
        let queue = EventQueue::new();
        for i in 0..RADIO_QUEUE_CAP as u16 {
            assert!(queue.push(RadioEvent::Connected(i)));
        }
        assert!(!queue.push(RadioEvent::Connected(999)));
        assert_eq!(queue.len(), RADIO_QUEUE_CAP);
    }

    #[test]
    fn drain_consumes_everything() {
        let queue = EventQueue::new();
        queue.push(RadioEvent::Connected(1));
        queue.push(RadioEvent::Disconnected(1));

        let mut seen = Vec::new();
        queue.drain(|e| seen.push(e));
        assert_eq!(seen.len(), 2);
        assert!(queue.is_empty());
    }
}
