#![no_std]
#![allow(unsafe_code)] // Event pools hand out shared views into static blocks

//! # RTC Memory Management
//!
//! Fixed-block event pools and the reference-counted event handle built on
//! top of them. All bookkeeping happens inside a critical section, so pools
//! can be shared between task level and interrupt handlers without a heap.

pub mod events;
pub mod pools;

pub use events::*;
pub use pools::*;

/// Memory pool statistics for debugging and capacity planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QPoolStats {
    /// Total number of blocks in the pool
    pub total_blocks: usize,
    /// Number of free blocks currently available
    pub free_blocks: usize,
    /// Number of blocks currently in use
    pub used_blocks: usize,
    /// Minimum number of free blocks ever reached
    pub min_free_blocks: usize,
}

impl QPoolStats {
    /// Create new pool statistics
    pub const fn new(total_blocks: usize) -> Self {
        Self {
            total_blocks,
            free_blocks: total_blocks,
            used_blocks: 0,
            min_free_blocks: total_blocks,
        }
    }

    /// Update statistics after allocation
    pub fn on_alloc(&mut self) {
        self.used_blocks += 1;
        self.free_blocks -= 1;
        if self.free_blocks < self.min_free_blocks {
            self.min_free_blocks = self.free_blocks;
        }
    }

    /// Update statistics after deallocation
    pub fn on_dealloc(&mut self) {
        if self.used_blocks > 0 {
            self.used_blocks -= 1;
            self.free_blocks += 1;
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "QPoolStats{{ total: {}, free: {}, used: {}, min_free: {} }}",
            self.total_blocks,
            self.free_blocks,
            self.used_blocks,
            self.min_free_blocks
        );
    }
}
