#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! # RTC Core
//!
//! Core types shared by every layer of the run-to-completion kernel: signals,
//! priorities, allocation margins, time-event counters, compile-time
//! capacities and the error taxonomy reported to the fatal-error handler.

use core::fmt;

pub mod config;
pub mod events;
pub mod margin;
pub mod priorities;
pub mod time;

pub use config::*;
pub use events::*;
pub use margin::*;
pub use priorities::*;
pub use time::*;

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the kernel
pub type QResult<T> = Result<T, QError>;

/// Error conditions detected by the kernel.
///
/// Only [`QError::QueueFull`] and [`QError::OutOfMemory`] are ever returned to
/// callers, and only when they supplied a finite [`Margin`]. Every other
/// variant is a design-time or usage error and ends up in the fatal-error
/// handler together with its [`QError::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QError {
    /// Event queue has fewer free slots than the requested margin
    QueueFull,
    /// Event pool has fewer free blocks than the requested margin
    OutOfMemory,
    /// Event queue overflow with no margin
    QueueOverflow,
    /// Event pool exhausted with no margin
    PoolExhausted,
    /// No registered pool has blocks large enough for the payload
    InvalidSize,
    /// Pools must be registered in increasing block-size order
    PoolOrder,
    /// More pools than `MAX_EPOOL`
    TooManyPools,
    /// An event block already carries the maximum number of references
    RefCountOverflow,
    /// Priority is zero or above `MAX_ACTIVE`
    InvalidPriority,
    /// Another active object already owns this priority
    DuplicatePriority,
    /// Target active object was never started
    NotRegistered,
    /// Task-level API invoked from interrupt context
    WrongContext,
    /// Dispatch re-entered an active object that is already running
    Reentrant,
    /// Signal outside the publish-subscribe range
    InvalidSignal,
    /// Tick rate outside `0..MAX_TICK_RATE`
    InvalidTickRate,
    /// Time event armed with a zero timeout
    InvalidTimeout,
    /// Too many time events armed at one tick rate
    TimerListFull,
}

impl QError {
    /// Numeric code handed to the fatal-error handler
    pub const fn code(self) -> u32 {
        match self {
            QError::QueueFull => 100,
            QError::OutOfMemory => 110,
            QError::QueueOverflow => 120,
            QError::PoolExhausted => 130,
            QError::InvalidSize => 140,
            QError::PoolOrder => 150,
            QError::TooManyPools => 160,
            QError::RefCountOverflow => 170,
            QError::InvalidPriority => 200,
            QError::DuplicatePriority => 210,
            QError::NotRegistered => 220,
            QError::WrongContext => 230,
            QError::Reentrant => 240,
            QError::InvalidSignal => 300,
            QError::InvalidTickRate => 400,
            QError::InvalidTimeout => 410,
            QError::TimerListFull => 420,
        }
    }

    /// Whether the caller is expected to recover locally.
    pub const fn is_recoverable(self) -> bool {
        matches!(self, QError::QueueFull | QError::OutOfMemory)
    }
}

impl fmt::Display for QError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QError::QueueFull => write!(f, "Event queue margin exceeded"),
            QError::OutOfMemory => write!(f, "Event pool margin exceeded"),
            QError::QueueOverflow => write!(f, "Event queue overflow"),
            QError::PoolExhausted => write!(f, "Event pool exhausted"),
            QError::InvalidSize => write!(f, "No event pool large enough"),
            QError::PoolOrder => write!(f, "Event pools registered out of order"),
            QError::TooManyPools => write!(f, "Too many event pools"),
            QError::RefCountOverflow => write!(f, "Event reference count overflow"),
            QError::InvalidPriority => write!(f, "Invalid priority level"),
            QError::DuplicatePriority => write!(f, "Priority already registered"),
            QError::NotRegistered => write!(f, "Active object not registered"),
            QError::WrongContext => write!(f, "Task-level API called from ISR"),
            QError::Reentrant => write!(f, "Active object dispatched re-entrantly"),
            QError::InvalidSignal => write!(f, "Signal out of publish range"),
            QError::InvalidTickRate => write!(f, "Invalid tick rate"),
            QError::InvalidTimeout => write!(f, "Time event armed with zero ticks"),
            QError::TimerListFull => write!(f, "Too many armed time events"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for QError {}

#[cfg(feature = "defmt")]
impl defmt::Format for QError {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QError({=u32})", self.code());
    }
}

/// Signature of the fatal-error handler.
///
/// Receives a module identifier and a numeric code. Must not return.
pub type OnError = fn(&'static str, u32) -> !;

/// Handler used until the application installs its own.
///
/// Panics with the module and code so host tests can observe the failure.
pub fn default_on_error(module: &'static str, code: u32) -> ! {
    panic!("fatal error in {module}: code {code}")
}
