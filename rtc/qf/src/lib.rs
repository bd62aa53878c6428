#![no_std]
#![deny(unsafe_code)]

//! # RTC Framework (QF)
//!
//! The framework layer provides active objects, event queues,
//! publish-subscribe, time events and the bookkeeping the schedulers build
//! on.
//!
//! Active objects are encapsulated, event-driven concurrent objects that
//! communicate through asynchronous message passing. Each one owns an event
//! queue and processes one event at a time to completion. A [`QF`] instance
//! holds every registry in fixed-size tables, so it lives in a `static` and
//! never allocates.

pub mod active;
pub mod crit;
pub mod isr;
pub mod lifecycle;
pub mod pubsub;
pub mod queue;
pub mod registry;
pub mod time;
pub mod trace;

pub use active::*;
pub use isr::IsrContext;
pub use lifecycle::*;
pub use queue::*;
pub use registry::{SchedStatus, QF};
pub use time::QTimeEvt;
pub use trace::{QsRecord, TraceHook};

pub use rtc_core::*;
pub use rtc_mem::{EventPool, QEvt, QMPool, QPoolStats, StaticEvt};

/// Module identifiers passed to the fatal-error handler
pub mod module {
    pub const POOL: &str = "qf_pool";
    pub const QUEUE: &str = "qf_queue";
    pub const ACTV: &str = "qf_actv";
    pub const PS: &str = "qf_ps";
    pub const TIME: &str = "qf_time";
}
