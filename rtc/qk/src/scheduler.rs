//! Bookkeeping for the running activation.
//!
//! The ready set and the scheduler lock live in the framework; this module
//! tracks which priority is currently executing, the preemption threshold it
//! runs with, and the per-priority thresholds configured by the application.

use rtc_core::MAX_ACTIVE;
use rtc_qf::QsRecord;

/// The priority currently executing and the threshold it runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub prio: u8,
    pub threshold: u8,
}

impl Activation {
    /// The idle loop
    pub const IDLE: Activation = Activation {
        prio: 0,
        threshold: 0,
    };
}

#[derive(Clone, Copy)]
pub(crate) struct State {
    active: Activation,
    started: bool,
    thresholds: [u8; MAX_ACTIVE + 1],
}

impl State {
    pub(crate) const fn new() -> Self {
        Self {
            active: Activation::IDLE,
            started: false,
            thresholds: [0; MAX_ACTIVE + 1],
        }
    }

    pub(crate) fn active(&self) -> Activation {
        self.active
    }

    pub(crate) fn started(&self) -> bool {
        self.started
    }

    pub(crate) fn start(&mut self) {
        self.started = true;
    }

    pub(crate) fn set_threshold(&mut self, prio: u8, threshold: u8) {
        self.thresholds[usize::from(prio)] = threshold;
    }

    /// Preemption threshold of `prio`; never below the priority itself
    pub(crate) fn threshold_for(&self, prio: u8) -> u8 {
        if prio == 0 {
            0
        } else {
            self.thresholds[usize::from(prio)].max(prio)
        }
    }

    /// Make `next` the running priority
    pub(crate) fn commit(&mut self, next: u8) -> Option<QsRecord> {
        let prev = self.active.prio;
        self.active = Activation {
            prio: next,
            threshold: self.threshold_for(next),
        };
        (next != prev).then_some(QsRecord::SchedNext { next, prev })
    }

    /// Return to the activation that was interrupted
    pub(crate) fn restore(&mut self, saved: Activation) -> Option<QsRecord> {
        let prev = self.active.prio;
        self.active = saved;
        if saved.prio == 0 {
            (prev != 0).then_some(QsRecord::SchedIdle { prev })
        } else {
            (saved.prio != prev).then_some(QsRecord::SchedNext {
                next: saved.prio,
                prev,
            })
        }
    }
}
