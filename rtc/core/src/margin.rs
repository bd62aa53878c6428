//! Allocation and delivery margins

use core::fmt;

/// Headroom policy for pool allocation and queue insertion.
///
/// With [`Margin::Keep`] the operation succeeds only while more than `n`
/// blocks/slots are free, i.e. at least `n` stay free afterwards. Failure is
/// reported to the caller. With [`Margin::Unconditional`] the operation
/// succeeds whenever anything is free at all, and running out is a fatal
/// sizing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    /// No margin check; exhaustion is fatal
    Unconditional,
    /// Keep at least this many blocks/slots free
    Keep(u16),
}

impl Margin {
    /// Decide whether an operation may consume one of `n_free` resources.
    ///
    /// Returns `Some(true)` when it may, `Some(false)` when the margin
    /// rejects it and `None` when an unconditional request finds nothing free.
    pub const fn admits(self, n_free: u16) -> Option<bool> {
        match self {
            Margin::Unconditional => {
                if n_free > 0 {
                    Some(true)
                } else {
                    None
                }
            }
            Margin::Keep(margin) => Some(n_free > margin),
        }
    }

    /// Whether the caller tolerates a failed request
    pub const fn is_tolerant(self) -> bool {
        matches!(self, Margin::Keep(_))
    }
}

impl fmt::Display for Margin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Margin::Unconditional => write!(f, "unconditional"),
            Margin::Keep(n) => write!(f, "keep {n}"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Margin {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Margin::Unconditional => defmt::write!(fmt, "unconditional"),
            Margin::Keep(n) => defmt::write!(fmt, "keep {}", n),
        }
    }
}
