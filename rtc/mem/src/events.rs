//! Reference-counted event handles

use crate::pools::EventPool;
use core::fmt;
use critical_section::CriticalSection;
use rtc_core::{Margin, QResult, QSignal};

/// Immutable event that lives for the whole program and is never recycled.
///
/// ```
/// use rtc_core::QSignal;
/// use rtc_mem::{QEvt, StaticEvt};
///
/// static TICK: StaticEvt = StaticEvt::new(QSignal::new(10));
/// let evt = QEvt::from_static(&TICK);
/// assert_eq!(evt.pool_id(), 0);
/// ```
#[derive(Debug)]
pub struct StaticEvt {
    signal: QSignal,
    payload: &'static [u8],
}

impl StaticEvt {
    /// Signal-only static event
    pub const fn new(signal: QSignal) -> Self {
        Self {
            signal,
            payload: &[],
        }
    }

    /// Static event with a constant payload
    pub const fn with_payload(signal: QSignal, payload: &'static [u8]) -> Self {
        Self { signal, payload }
    }

    pub const fn signal(&self) -> QSignal {
        self.signal
    }
}

#[derive(Clone, Copy)]
enum Origin {
    Static(&'static StaticEvt),
    Pool {
        pool: &'static dyn EventPool,
        block: u16,
        len: u16,
    },
}

/// One counted reference to an event.
///
/// Holding a `QEvt` keeps the event alive. Cloning adds a reference and
/// dropping removes one; when the last reference to a pool event goes away the
/// block returns to its pool. Moving a `QEvt` into a queue hands the
/// reference over without touching the count.
pub struct QEvt {
    signal: QSignal,
    origin: Origin,
}

impl QEvt {
    /// Wrap a static event; such events are never counted or recycled
    pub const fn from_static(evt: &'static StaticEvt) -> Self {
        Self {
            signal: evt.signal,
            origin: Origin::Static(evt),
        }
    }

    /// Allocate a block from `pool` and fill it with `payload`.
    ///
    /// The new event starts with a reference count of one.
    pub fn alloc(
        pool: &'static dyn EventPool,
        signal: QSignal,
        payload: &[u8],
        margin: Margin,
        cs: CriticalSection<'_>,
    ) -> QResult<Self> {
        let block = pool.alloc(margin, payload, cs)?;
        Ok(Self {
            signal,
            origin: Origin::Pool {
                pool,
                block,
                len: payload.len() as u16,
            },
        })
    }

    /// Signal of the event
    pub fn signal(&self) -> QSignal {
        self.signal
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        match self.origin {
            Origin::Static(evt) => evt.payload,
            // SAFETY: `self` is a live reference, so the block stays
            // allocated for at least as long as the returned borrow.
            Origin::Pool { pool, block, len } => unsafe { pool.payload(block, len as usize) },
        }
    }

    /// Owning pool (`1..=MAX_EPOOL`), or 0 for static events
    pub fn pool_id(&self) -> u8 {
        match self.origin {
            Origin::Static(_) => 0,
            Origin::Pool { pool, .. } => pool.pool_id(),
        }
    }

    /// Whether this is an immutable static event
    pub fn is_static(&self) -> bool {
        matches!(self.origin, Origin::Static(_))
    }

    /// Current reference count; always 0 for static events
    pub fn ref_count(&self) -> u8 {
        match self.origin {
            Origin::Static(_) => 0,
            Origin::Pool { pool, block, .. } => {
                critical_section::with(|cs| pool.ref_count(block, cs))
            }
        }
    }

    /// Add a reference inside an already-entered critical section.
    ///
    /// Fails with [`QError::RefCountOverflow`](rtc_core::QError::RefCountOverflow)
    /// when the block cannot take another reference.
    pub fn clone_in(&self, cs: CriticalSection<'_>) -> QResult<Self> {
        if let Origin::Pool { pool, block, .. } = self.origin {
            pool.retain(block, cs)?;
        }
        Ok(Self {
            signal: self.signal,
            origin: self.origin,
        })
    }
}

impl Clone for QEvt {
    /// # Panics
    ///
    /// Panics when the block already carries the maximum number of
    /// references. Kernel paths use [`QEvt::clone_in`] and report the
    /// overflow through the fatal-error handler instead.
    fn clone(&self) -> Self {
        match critical_section::with(|cs| self.clone_in(cs)) {
            Ok(evt) => evt,
            Err(err) => panic!("{} on {}", err, self.signal),
        }
    }
}

impl Drop for QEvt {
    fn drop(&mut self) {
        if let Origin::Pool { pool, block, .. } = self.origin {
            let recycled = critical_section::with(|cs| pool.release(block, cs));
            if recycled {
                log::trace!(
                    "{} recycled to pool {}",
                    self.signal,
                    pool.pool_id()
                );
            }
        }
    }
}

impl fmt::Debug for QEvt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QEvt")
            .field("signal", &self.signal)
            .field("pool_id", &self.pool_id())
            .field("len", &self.payload().len())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QEvt {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QEvt({}, pool {})", self.signal, self.pool_id());
    }
}

/// Macro to declare a static, signal-only event
#[macro_export]
macro_rules! static_event {
    ($name:ident, $signal:expr) => {
        static $name: $crate::StaticEvt = $crate::StaticEvt::new($signal);
    };
    ($name:ident, $signal:expr, $payload:expr) => {
        static $name: $crate::StaticEvt = $crate::StaticEvt::with_payload($signal, $payload);
    };
}
