#![no_std]
#![forbid(unsafe_code)]

//! # QK Preemptive Kernel
//!
//! A preemptive, priority-based, non-blocking kernel. Every active object
//! still runs to completion, but a higher-priority object that becomes ready
//! runs immediately, nested on the same stack, and the interrupted step
//! resumes once all higher-priority work is done.
//!
//! Activation points are a task-level post or tick that readies an object,
//! the exit of the outermost interrupt, and a scheduler unlock. Each
//! activation only considers priorities above the preemption threshold of
//! the step it interrupted and above the scheduler lock ceiling.
//!
//! ```
//! use rtc_qf::QF;
//! use rtc_qk::QK;
//!
//! static FRAMEWORK: QF = QF::new();
//! static KERNEL: QK = QK::new(&FRAMEWORK);
//!
//! KERNEL.init();
//! assert_eq!(KERNEL.run_until_idle(), 0);
//! ```

pub mod scheduler;

use core::cell::Cell;

use critical_section::Mutex;
use rtc_core::{QError, QPriority, MAX_ACTIVE};
use rtc_qf::{IdleGuard, Kernel, QsRecord, QF};

pub use scheduler::Activation;
use scheduler::State;

/// Module identifier passed to the fatal-error handler
pub const MODULE: &str = "qk";

/// QK kernel - preemptive scheduler
pub struct QK {
    qf: &'static QF,
    state: Mutex<Cell<State>>,
}

impl QK {
    pub const fn new(qf: &'static QF) -> Self {
        Self {
            qf,
            state: Mutex::new(Cell::new(State::new())),
        }
    }

    pub fn qf(&self) -> &'static QF {
        self.qf
    }

    /// Attach the kernel to its framework
    pub fn init(&'static self) {
        self.qf.attach_kernel(self);
        log::debug!("{}: QK attached", self.qf.config().name);
    }

    /// Let `prio` hold off priorities up to `threshold` while it runs.
    ///
    /// The threshold must lie between `prio` and `MAX_ACTIVE`.
    pub fn set_threshold(&self, prio: QPriority, threshold: u8) {
        if !prio.is_valid() || threshold < prio.raw() || usize::from(threshold) > MAX_ACTIVE {
            self.qf.fatal(MODULE, QError::InvalidPriority);
        }
        self.update(|state| state.set_threshold(prio.raw(), threshold));
        log::debug!("QK: threshold of {} set to {}", prio, threshold);
    }

    /// The activation currently executing
    pub fn current(&self) -> Activation {
        critical_section::with(|cs| self.state.borrow(cs).get().active())
    }

    pub fn is_started(&self) -> bool {
        critical_section::with(|cs| self.state.borrow(cs).get().started())
    }

    /// Run the preemptive kernel until [`QF::stop`] is requested.
    ///
    /// Events posted before the call are processed first. While nothing is
    /// ready the idle callback runs with interrupts enabled.
    pub fn run(&self) {
        let config = self.qf.config();
        log::info!("{}: QK running", config.name);
        (config.on_startup)();

        self.update(State::start);
        self.activate();

        while !self.qf.stop_requested() {
            (config.on_idle)(IdleGuard::enabled());
            self.activate();
        }

        log::info!("{}: QK stopped", config.name);
        (config.on_cleanup)();
    }

    /// Start the kernel and dispatch until nothing is ready.
    ///
    /// Meant for hosts that drive the kernel themselves. Returns the number
    /// of steps run at the outermost level.
    pub fn run_until_idle(&self) -> usize {
        self.update(State::start);
        let mut steps = 0;
        while self.qf.ready_above(0).is_some() {
            steps += self.activate();
        }
        steps
    }

    /// Run every ready object above the current threshold, highest first.
    fn activate(&self) -> usize {
        let saved = self.current();
        let Some(mut next) = self.qf.ready_above(saved.threshold) else {
            return 0;
        };

        let mut steps = 0;
        loop {
            let record = self.update(|state| state.commit(next.raw()));
            self.trace(record);

            self.qf.dispatch_one(next);
            steps += 1;

            match self.qf.ready_above(saved.threshold) {
                Some(prio) => next = prio,
                None => break,
            }
        }

        let record = self.update(|state| state.restore(saved));
        self.trace(record);
        steps
    }

    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            let result = f(&mut state);
            cell.set(state);
            result
        })
    }

    fn trace(&self, record: Option<QsRecord>) {
        if let Some(record) = record {
            self.qf.emit(record);
        }
    }
}

impl Kernel for QK {
    fn on_ready(&self, _prio: QPriority) {
        if self.is_started() {
            self.activate();
        }
    }

    fn on_isr_exit(&self) {
        if self.is_started() {
            self.activate();
        }
    }

    fn on_sched_unlock(&self) {
        if self.is_started() {
            self.activate();
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QK {
    fn format(&self, fmt: defmt::Formatter) {
        let current = self.current();
        defmt::write!(
            fmt,
            "QK{{prio: {}, threshold: {}}}",
            current.prio,
            current.threshold
        );
    }
}
