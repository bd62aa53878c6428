//! Event queue implementation for active objects

use core::cell::RefCell;
use core::convert::Infallible;
use critical_section::{CriticalSection, Mutex};
use heapless::Deque;
use rtc_core::Margin;
use rtc_mem::QEvt;

/// Result of inserting an event into a queue.
///
/// Rejected and overflowing events are handed back so the caller decides
/// when to release them.
#[derive(Debug)]
pub enum PostOutcome {
    /// Event stored; `was_empty` tells whether the queue just became non-empty
    Delivered { was_empty: bool, n_free: u16 },
    /// The margin did not allow the insertion
    Rejected(QEvt),
    /// Insertion without margin found the queue full
    Overflow(QEvt),
}

/// Object-safe view of an event queue.
///
/// All methods run inside a caller-provided critical section.
pub trait EventQueue: Sync {
    /// Insert at the tail, honouring `margin`
    fn post(&self, e: QEvt, margin: Margin, cs: CriticalSection<'_>) -> PostOutcome;

    /// Insert at the head, honouring `margin`
    fn post_lifo(&self, e: QEvt, margin: Margin, cs: CriticalSection<'_>) -> PostOutcome;

    /// Remove the head event
    fn take(&self, cs: CriticalSection<'_>) -> Option<QEvt>;

    /// Number of queued events
    fn count(&self, cs: CriticalSection<'_>) -> usize;

    /// Maximum number of queued events, the front slot included
    fn capacity(&self) -> usize;

    /// Largest count ever observed
    fn high_water_mark(&self, cs: CriticalSection<'_>) -> usize;
}

struct Ring<const N: usize> {
    front: Option<QEvt>,
    events: Deque<QEvt, N>,
    peak: usize,
}

impl<const N: usize> Ring<N> {
    fn len(&self) -> usize {
        usize::from(self.front.is_some()) + self.events.len()
    }

    fn n_free(&self) -> u16 {
        (N + 1 - self.len()) as u16
    }

    fn note_peak(&mut self) {
        let len = self.len();
        if len > self.peak {
            self.peak = len;
        }
    }

    fn admit(&self, e: QEvt, margin: Margin) -> Result<QEvt, PostOutcome> {
        match margin.admits(self.n_free()) {
            Some(true) => Ok(e),
            Some(false) => Err(PostOutcome::Rejected(e)),
            None => Err(PostOutcome::Overflow(e)),
        }
    }

    fn delivered(&mut self, was_empty: bool) -> PostOutcome {
        self.note_peak();
        PostOutcome::Delivered {
            was_empty,
            n_free: self.n_free(),
        }
    }
}

/// Bounded FIFO of event references owned by one active object.
///
/// The next event to dispatch sits in a front slot outside the ring of `N`
/// entries, so the queue holds up to `N + 1` events.
///
/// ```
/// use rtc_qf::QEQueue;
///
/// static QUEUE: QEQueue<8> = QEQueue::new();
/// assert!(QUEUE.is_empty());
/// ```
pub struct QEQueue<const N: usize> {
    ring: Mutex<RefCell<Ring<N>>>,
}

impl<const N: usize> QEQueue<N> {
    /// Create a new empty event queue
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring {
                front: None,
                events: Deque::new(),
                peak: 0,
            })),
        }
    }

    /// Take the next event without blocking
    pub fn get(&self) -> nb::Result<QEvt, Infallible> {
        critical_section::with(|cs| self.take(cs)).ok_or(nb::Error::WouldBlock)
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.count(cs))
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of free slots
    pub fn n_free(&self) -> usize {
        N + 1 - self.len()
    }

    /// Largest number of events ever queued at once
    pub fn peak(&self) -> usize {
        critical_section::with(|cs| self.high_water_mark(cs))
    }
}

impl<const N: usize> Default for QEQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventQueue for QEQueue<N> {
    fn post(&self, e: QEvt, margin: Margin, cs: CriticalSection<'_>) -> PostOutcome {
        let mut ring = self.ring.borrow_ref_mut(cs);
        let e = match ring.admit(e, margin) {
            Ok(e) => e,
            Err(outcome) => return outcome,
        };

        if ring.front.is_none() {
            ring.front = Some(e);
            return ring.delivered(true);
        }
        if let Err(e) = ring.events.push_back(e) {
            return PostOutcome::Overflow(e);
        }
        ring.delivered(false)
    }

    fn post_lifo(&self, e: QEvt, margin: Margin, cs: CriticalSection<'_>) -> PostOutcome {
        let mut ring = self.ring.borrow_ref_mut(cs);
        let e = match ring.admit(e, margin) {
            Ok(e) => e,
            Err(outcome) => return outcome,
        };

        let Some(prev) = ring.front.take() else {
            ring.front = Some(e);
            return ring.delivered(true);
        };
        if let Err(prev) = ring.events.push_front(prev) {
            ring.front = Some(prev);
            return PostOutcome::Overflow(e);
        }
        ring.front = Some(e);
        ring.delivered(false)
    }

    fn take(&self, cs: CriticalSection<'_>) -> Option<QEvt> {
        let mut ring = self.ring.borrow_ref_mut(cs);
        let head = ring.front.take();
        ring.front = ring.events.pop_front();
        head
    }

    fn count(&self, cs: CriticalSection<'_>) -> usize {
        self.ring.borrow_ref(cs).len()
    }

    fn capacity(&self) -> usize {
        N + 1
    }

    fn high_water_mark(&self, cs: CriticalSection<'_>) -> usize {
        self.ring.borrow_ref(cs).peak
    }
}
