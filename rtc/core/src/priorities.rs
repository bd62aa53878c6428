//! Priority management for active objects

use crate::{QError, QResult, MAX_ACTIVE};
use core::fmt;

/// Type-safe priority level for active objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QPriority(u8);

impl QPriority {
    /// Minimum priority level (lowest priority)
    pub const MIN: QPriority = QPriority(1);

    /// Maximum priority level (highest priority)
    pub const MAX: QPriority = QPriority(MAX_ACTIVE as u8);

    /// Priority of the idle loop; never assigned to an active object
    pub const IDLE: QPriority = QPriority(0);

    /// Create a new priority level
    pub fn new(priority: u8) -> QResult<Self> {
        if priority == 0 || priority as usize > MAX_ACTIVE {
            Err(QError::InvalidPriority)
        } else {
            Ok(QPriority(priority))
        }
    }

    /// Create priority without validation (const fn)
    pub const fn new_unchecked(priority: u8) -> Self {
        QPriority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Check if this priority can be assigned to an active object
    pub const fn is_valid(self) -> bool {
        self.0 > 0 && self.0 as usize <= MAX_ACTIVE
    }
}

impl fmt::Display for QPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPriority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Priority mask used for the ready set and subscriber sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QPriorityMask(u64);

impl QPriorityMask {
    /// Empty priority mask
    pub const EMPTY: Self = Self(0);

    /// Create a new empty priority mask
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Raw bit pattern, bit `p - 1` standing for priority `p`
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Set a priority in the mask
    pub fn set(&mut self, priority: QPriority) {
        if priority.is_valid() {
            self.0 |= 1u64 << (priority.0 - 1);
        }
    }

    /// Clear a priority in the mask
    pub fn clear(&mut self, priority: QPriority) {
        if priority.is_valid() {
            self.0 &= !(1u64 << (priority.0 - 1));
        }
    }

    /// Check if a priority is set in the mask
    pub const fn is_set(&self, priority: QPriority) -> bool {
        if !priority.is_valid() {
            false
        } else {
            (self.0 & (1u64 << (priority.0 - 1))) != 0
        }
    }

    /// Check if the mask is empty
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of priorities in the mask
    pub const fn len(&self) -> u32 {
        self.0.count_ones()
    }

    /// Find the highest priority set in the mask
    pub fn highest_priority(&self) -> Option<QPriority> {
        if self.is_empty() {
            None
        } else {
            let msb = 63 - self.0.leading_zeros();
            Some(QPriority((msb + 1) as u8))
        }
    }

    /// Iterate the members from the highest priority down
    pub fn iter_desc(self) -> impl Iterator<Item = QPriority> {
        let mut rest = self;
        core::iter::from_fn(move || {
            let top = rest.highest_priority()?;
            rest.clear(top);
            Some(top)
        })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPriorityMask {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "PriorityMask({=u64:b})", self.0);
    }
}

/// Macro to create compile-time priority constants
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        $crate::QPriority::new_unchecked($value)
    };
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec;

    #[test]
    fn test_priority_creation() {
        assert!(QPriority::new(0).is_err());
        assert!(QPriority::new(1).is_ok());
        assert!(QPriority::new(MAX_ACTIVE as u8).is_ok());
        assert!(QPriority::new(MAX_ACTIVE as u8 + 1).is_err());
    }

    #[test]
    fn test_priority_mask() {
        let mut mask = QPriorityMask::new();
        assert!(mask.is_empty());

        let p1 = QPriority::new(1).unwrap();
        let p5 = QPriority::new(5).unwrap();

        mask.set(p1);
        mask.set(p5);

        assert!(mask.is_set(p1));
        assert!(mask.is_set(p5));
        assert!(!mask.is_set(QPriority::new(3).unwrap()));
        assert_eq!(mask.len(), 2);

        assert_eq!(mask.highest_priority(), Some(p5));
    }

    #[test]
    fn mask_iterates_highest_first() {
        let mut mask = QPriorityMask::new();
        for p in [2u8, 7, 4, 32] {
            mask.set(QPriority::new(p).unwrap());
        }
        let order: Vec<u8> = mask.iter_desc().map(|p| p.raw()).collect();
        assert_eq!(order, [32, 7, 4, 2]);
    }

    #[test]
    fn idle_priority_is_never_a_member() {
        let mut mask = QPriorityMask::new();
        mask.set(QPriority::IDLE);
        assert!(mask.is_empty());
        assert!(!mask.is_set(QPriority::IDLE));
    }
}
