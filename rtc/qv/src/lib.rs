#![no_std]
#![forbid(unsafe_code)]

//! # QV Cooperative Kernel
//!
//! The vanilla (cooperative) kernel: a single loop that always dispatches
//! one event to the highest-priority ready active object and then looks
//! again. No step ever preempts another. Interrupts may post and publish at
//! any time; they only mark objects ready.
//!
//! When nothing is ready the idle callback runs with interrupts disabled and
//! is responsible for re-enabling them, typically by waiting for the next
//! interrupt.

use rtc_core::QPriority;
use rtc_qf::{IdleGuard, Kernel, QsRecord, QF};

/// Module identifier passed to the fatal-error handler
pub const MODULE: &str = "qv";

/// QV kernel - cooperative scheduler
pub struct QV {
    qf: &'static QF,
}

impl QV {
    /// Create a kernel driving `qf`
    pub const fn new(qf: &'static QF) -> Self {
        Self { qf }
    }

    pub fn qf(&self) -> &'static QF {
        self.qf
    }

    /// Attach the kernel to its framework
    pub fn init(&'static self) {
        self.qf.attach_kernel(self);
        log::debug!("{}: QV attached", self.qf.config().name);
    }

    /// Run the cooperative scheduler until [`QF::stop`] is requested.
    ///
    /// Calls `on_startup` once, then dispatches one event at a time to the
    /// highest-priority ready object above the scheduler lock. Pending events
    /// are still processed after a stop request; `on_cleanup` runs once the
    /// system is idle.
    pub fn run(&self) {
        let config = self.qf.config();
        log::info!("{}: QV running", config.name);
        (config.on_startup)();

        let mut prev = 0u8;
        loop {
            let guard = IdleGuard::disabled();
            match self.qf.ready_above(0) {
                Some(prio) => {
                    drop(guard);
                    self.step(prio, &mut prev);
                }
                None if self.qf.stop_requested() => {
                    drop(guard);
                    break;
                }
                None => {
                    if prev != 0 {
                        self.qf.emit(QsRecord::SchedIdle { prev });
                        prev = 0;
                    }
                    (config.on_idle)(guard);
                }
            }
        }

        log::info!("{}: QV stopped", config.name);
        (config.on_cleanup)();
    }

    /// Dispatch until nothing is ready; returns the number of steps taken.
    ///
    /// Meant for hosts that drive the kernel themselves.
    pub fn run_until_idle(&self) -> usize {
        let mut prev = 0u8;
        let mut steps = 0;
        while let Some(prio) = self.qf.ready_above(0) {
            self.step(prio, &mut prev);
            steps += 1;
        }
        steps
    }

    fn step(&self, prio: QPriority, prev: &mut u8) {
        if prio.raw() != *prev {
            self.qf.emit(QsRecord::SchedNext {
                next: prio.raw(),
                prev: *prev,
            });
            *prev = prio.raw();
        }
        self.qf.dispatch_one(prio);
    }
}

impl Kernel for QV {
    fn on_ready(&self, _prio: QPriority) {}

    fn on_isr_exit(&self) {}

    fn on_sched_unlock(&self) {}
}

#[cfg(feature = "defmt")]
impl defmt::Format for QV {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QV{{stop: {}}}", self.qf.stop_requested());
    }
}
