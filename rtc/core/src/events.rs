//! Signal identifiers

use core::fmt;

/// Type-safe event signal identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QSignal(pub u16);

impl QSignal {
    /// Create a new signal from a raw value
    pub const fn new(signal: u16) -> Self {
        QSignal(signal)
    }

    /// Get the raw signal value
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<u16> for QSignal {
    #[inline]
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for QSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QSignal({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QSignal {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QSignal({})", self.0);
    }
}

/// Declare a block of signal constants.
///
/// ```
/// rtc_core::define_signals! {
///     TIMEOUT = 4,
///     BUTTON = 5,
/// }
/// assert_eq!(BUTTON.raw(), 5);
/// ```
#[macro_export]
macro_rules! define_signals {
    ($($name:ident = $value:expr),* $(,)?) => {
        $(
            pub const $name: $crate::QSignal = $crate::QSignal::new($value);
        )*
    };
}
