//! Compile-time capacities of the kernel registries.
//!
//! Every table in the kernel is a fixed-size array sized by these constants.
//! Nothing grows after initialization.

/// Highest priority an active object may use (priorities are `1..=MAX_ACTIVE`)
pub const MAX_ACTIVE: usize = 32;

/// Number of event pools that can be registered
pub const MAX_EPOOL: usize = 3;

/// Number of independent tick rates
pub const MAX_TICK_RATE: usize = 4;

/// Signals `0..MAX_PUB_SIGNAL` can be published
pub const MAX_PUB_SIGNAL: usize = 64;

/// Time events that may be armed simultaneously at one tick rate
pub const MAX_TIMEEVT_PER_RATE: usize = 16;

const _: () = assert!(MAX_ACTIVE < 64, "priority sets are 64-bit masks");
const _: () = assert!(MAX_EPOOL < u8::MAX as usize);
