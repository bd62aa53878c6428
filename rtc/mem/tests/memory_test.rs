//! Memory management tests for rtc-mem

use rtc_core::{Margin, QError, QSignal};
use rtc_mem::{static_event, EventPool, QEvt, QMPool, StaticEvt};

#[test]
fn event_starts_with_one_reference() {
    static POOL: QMPool<8, 4> = QMPool::new();

    let evt = critical_section::with(|cs| {
        QEvt::alloc(&POOL, QSignal::new(10), &[1, 2, 3], Margin::Unconditional, cs)
    })
    .unwrap();

    assert_eq!(evt.signal(), QSignal::new(10));
    assert_eq!(evt.payload(), &[1, 2, 3]);
    assert_eq!(evt.ref_count(), 1);
    assert!(!evt.is_static());
    assert_eq!(POOL.n_free(), 3);
}

#[test]
fn last_reference_recycles_block() {
    static POOL: QMPool<4, 2> = QMPool::new();

    let first = critical_section::with(|cs| {
        QEvt::alloc(&POOL, QSignal::new(11), &[7], Margin::Keep(0), cs)
    })
    .unwrap();
    let second = first.clone();
    let third = critical_section::with(|cs| second.clone_in(cs)).unwrap();
    assert_eq!(first.ref_count(), 3);
    assert_eq!(third.payload(), &[7]);

    drop(first);
    drop(second);
    assert_eq!(third.ref_count(), 1);
    assert_eq!(POOL.n_free(), 1);

    drop(third);
    assert_eq!(POOL.n_free(), 2);
    assert_eq!(POOL.n_min(), 1);
}

#[test]
fn recycled_block_is_handed_out_again() {
    static POOL: QMPool<4, 1> = QMPool::new();

    for round in 0u8..3 {
        let evt = critical_section::with(|cs| {
            QEvt::alloc(&POOL, QSignal::new(12), &[round], Margin::Unconditional, cs)
        })
        .unwrap();
        assert_eq!(evt.payload(), &[round]);
    }
    assert_eq!(POOL.n_free(), 1);
}

#[test]
fn margin_rejection_leaves_pool_untouched() {
    static POOL: QMPool<4, 2> = QMPool::new();

    let held = critical_section::with(|cs| {
        QEvt::alloc(&POOL, QSignal::new(13), &[], Margin::Keep(0), cs)
    })
    .unwrap();
    let res = critical_section::with(|cs| {
        QEvt::alloc(&POOL, QSignal::new(13), &[], Margin::Keep(1), cs)
    });
    assert_eq!(res.unwrap_err(), QError::OutOfMemory);
    assert_eq!(POOL.n_free(), 1);
    drop(held);
}

#[test]
fn clone_in_refuses_past_max_references() {
    static POOL: QMPool<4, 1> = QMPool::new();

    let evt = critical_section::with(|cs| {
        QEvt::alloc(&POOL, QSignal::new(14), &[1], Margin::Unconditional, cs)
    })
    .unwrap();
    let copies: Vec<QEvt> = (1..u8::MAX).map(|_| evt.clone()).collect();
    assert_eq!(evt.ref_count(), u8::MAX);

    let res = critical_section::with(|cs| evt.clone_in(cs));
    assert_eq!(res.unwrap_err(), QError::RefCountOverflow);
    assert_eq!(evt.ref_count(), u8::MAX);

    drop(copies);
    assert_eq!(evt.ref_count(), 1);
    drop(evt);
    assert_eq!(POOL.n_free(), 1);
}

#[test]
#[should_panic(expected = "Event reference count overflow")]
fn clone_past_max_references_panics() {
    static POOL: QMPool<4, 1> = QMPool::new();

    let evt = critical_section::with(|cs| {
        QEvt::alloc(&POOL, QSignal::new(15), &[], Margin::Unconditional, cs)
    })
    .unwrap();
    let _copies: Vec<QEvt> = (0..u8::MAX).map(|_| evt.clone()).collect();
}

static_event!(PING, QSignal::new(20));
static_event!(CONFIG, QSignal::new(21), b"cfg");

#[test]
fn static_events_are_not_counted() {
    let evt = QEvt::from_static(&PING);
    let copy = evt.clone();
    assert!(copy.is_static());
    assert_eq!(copy.pool_id(), 0);
    assert_eq!(copy.ref_count(), 0);
    assert!(copy.payload().is_empty());

    let cfg = QEvt::from_static(&CONFIG);
    assert_eq!(cfg.signal(), QSignal::new(21));
    assert_eq!(cfg.payload(), b"cfg");
}

#[test]
fn unregistered_pool_reports_id_zero() {
    static POOL: QMPool<4, 1> = QMPool::new();
    static OTHER: StaticEvt = StaticEvt::with_payload(QSignal::new(22), &[5]);

    assert_eq!(POOL.pool_id(), 0);
    POOL.set_pool_id(2);
    let evt = critical_section::with(|cs| {
        QEvt::alloc(&POOL, OTHER.signal(), &[5], Margin::Unconditional, cs)
    })
    .unwrap();
    assert_eq!(evt.pool_id(), 2);
}
