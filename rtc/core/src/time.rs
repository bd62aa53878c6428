//! Time event counters

use core::fmt;

/// Countdown of a time event, in ticks of its tick rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct QTimeEvtCtr(pub u32);

impl QTimeEvtCtr {
    /// Zero time counter
    pub const ZERO: Self = Self(0);

    /// Create a new time counter
    pub const fn new(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Get the raw tick count
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Decrement the counter by one tick
    pub fn decrement(&mut self) -> bool {
        if self.0 > 0 {
            self.0 -= 1;
            self.0 == 0 // Return true if reached zero
        } else {
            false
        }
    }
}

impl fmt::Display for QTimeEvtCtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ticks", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QTimeEvtCtr {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}ticks", self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_reports_expiry_once() {
        let mut ctr = QTimeEvtCtr::new(2);
        assert!(!ctr.decrement());
        assert!(ctr.decrement());
        assert_eq!(ctr, QTimeEvtCtr::ZERO);
        assert!(!ctr.decrement());
    }
}
