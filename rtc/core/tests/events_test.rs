//! Signal tests for rtc-core

use rtc_core::QSignal;

rtc_core::define_signals! {
    TIMEOUT = 4,
    BUTTON_PRESSED = 5,
}

#[test]
fn test_signal_creation() {
    let sig1 = QSignal::new(1);
    let sig2 = QSignal::new(2);
    assert_ne!(sig1, sig2);
}

#[test]
fn test_signal_equality() {
    let sig1 = QSignal::new(42);
    let sig2 = QSignal::from(42);
    assert_eq!(sig1, sig2);
}

#[test]
fn test_signal_display() {
    assert_eq!(TIMEOUT.to_string(), "QSignal(4)");
}

#[test]
fn test_define_signals() {
    assert_eq!(BUTTON_PRESSED.raw(), 5);
}
