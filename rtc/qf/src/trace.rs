//! Software tracing records.
//!
//! The framework reports what it does through
//! [`KernelConfig::trace_hook`](crate::KernelConfig). Records are plain
//! values; encoding them for a host tool is up to the hook.

use rtc_core::{Margin, QSignal};

/// Record identifiers
pub mod records {
    /// Active-object and queue records
    pub mod actv {
        /// Subscription added
        pub const SUBSCRIBE: u8 = 12;
        /// Subscription removed
        pub const UNSUBSCRIBE: u8 = 13;
        /// Event posted FIFO
        pub const POST: u8 = 14;
        /// Event posted LIFO
        pub const POST_LIFO: u8 = 15;
        /// Event taken from a queue
        pub const GET: u8 = 16;
        /// Post rejected by the margin
        pub const POST_ATTEMPT: u8 = 23;
        /// Dispatch step started
        pub const DISPATCH: u8 = 24;
    }

    /// Pool and publish records
    pub mod pool {
        /// Event allocated
        pub const NEW: u8 = 36;
        /// Allocation rejected by the margin
        pub const NEW_ATTEMPT: u8 = 38;
        /// Event published
        pub const PUBLISH: u8 = 39;
    }

    /// Time-event records
    pub mod time_evt {
        pub const ARM: u8 = 32;
        pub const AUTO_DISARM: u8 = 33;
        pub const DISARM_ATTEMPT: u8 = 34;
        pub const DISARM: u8 = 35;
        pub const POST: u8 = 37;
    }

    /// Scheduler records
    pub mod sched {
        pub const LOCK: u8 = 50;
        pub const UNLOCK: u8 = 51;
        pub const NEXT: u8 = 52;
        pub const IDLE: u8 = 53;
    }

    /// Fatal error reported
    pub const FATAL: u8 = 70;
}

/// One trace record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QsRecord {
    Subscribe { signal: QSignal, prio: u8 },
    Unsubscribe { signal: QSignal, prio: u8 },
    Post { signal: QSignal, prio: u8, n_free: u16, margin: Margin },
    PostAttempt { signal: QSignal, prio: u8, n_free: u16, margin: Margin },
    PostLifo { signal: QSignal, prio: u8, n_free: u16 },
    Get { signal: QSignal, prio: u8, n_free: u16 },
    Dispatch { signal: QSignal, prio: u8 },
    NewEvt { signal: QSignal, pool_id: u8 },
    NewAttempt { signal: QSignal, pool_id: u8 },
    Publish { signal: QSignal, subscribers: u32 },
    TimeEvtArm { signal: QSignal, prio: u8, ctr: u32, interval: u32, rate: u8 },
    TimeEvtAutoDisarm { signal: QSignal, prio: u8 },
    TimeEvtDisarmAttempt { signal: QSignal, prio: u8 },
    TimeEvtDisarm { signal: QSignal, prio: u8, ctr: u32 },
    TimeEvtPost { signal: QSignal, prio: u8, rate: u8 },
    SchedLock { prev: u8, ceiling: u8 },
    SchedUnlock { ceiling: u8, restored: u8 },
    SchedNext { next: u8, prev: u8 },
    SchedIdle { prev: u8 },
    Fatal { module: &'static str, code: u32 },
}

impl QsRecord {
    /// Record identifier
    pub const fn id(&self) -> u8 {
        use records::*;
        match self {
            QsRecord::Subscribe { .. } => actv::SUBSCRIBE,
            QsRecord::Unsubscribe { .. } => actv::UNSUBSCRIBE,
            QsRecord::Post { .. } => actv::POST,
            QsRecord::PostAttempt { .. } => actv::POST_ATTEMPT,
            QsRecord::PostLifo { .. } => actv::POST_LIFO,
            QsRecord::Get { .. } => actv::GET,
            QsRecord::Dispatch { .. } => actv::DISPATCH,
            QsRecord::NewEvt { .. } => pool::NEW,
            QsRecord::NewAttempt { .. } => pool::NEW_ATTEMPT,
            QsRecord::Publish { .. } => pool::PUBLISH,
            QsRecord::TimeEvtArm { .. } => time_evt::ARM,
            QsRecord::TimeEvtAutoDisarm { .. } => time_evt::AUTO_DISARM,
            QsRecord::TimeEvtDisarmAttempt { .. } => time_evt::DISARM_ATTEMPT,
            QsRecord::TimeEvtDisarm { .. } => time_evt::DISARM,
            QsRecord::TimeEvtPost { .. } => time_evt::POST,
            QsRecord::SchedLock { .. } => sched::LOCK,
            QsRecord::SchedUnlock { .. } => sched::UNLOCK,
            QsRecord::SchedNext { .. } => sched::NEXT,
            QsRecord::SchedIdle { .. } => sched::IDLE,
            QsRecord::Fatal { .. } => FATAL,
        }
    }
}

/// Trace callback installed in the kernel configuration
pub type TraceHook = fn(&QsRecord);
