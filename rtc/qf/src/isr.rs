//! Services callable from interrupt handlers

use crate::crit::IsrLock;
use crate::{Active, QF};
use core::marker::PhantomData;
use rtc_core::{Margin, QSignal};
use rtc_mem::QEvt;

/// Proof that the caller runs inside an interrupt handler.
///
/// Obtained from [`QF::isr_entry`]. Posts made through it only mark the
/// target ready; the scheduler gets a chance to run when the outermost
/// context is dropped.
///
/// ```ignore
/// fn sys_tick() {
///     let isr = QF.isr_entry();
///     isr.tick(0);
/// } // exit notification
/// ```
pub struct IsrContext {
    qf: &'static QF,
    // stays on the interrupted core
    _not_send: PhantomData<*const ()>,
}

impl IsrContext {
    pub(crate) fn new(qf: &'static QF) -> Self {
        Self {
            qf,
            _not_send: PhantomData,
        }
    }

    pub fn qf(&self) -> &'static QF {
        self.qf
    }

    /// ISR flavour of [`QF::post`]
    pub fn post(&self, ao: &'static dyn Active, e: QEvt, margin: Margin) -> bool {
        self.qf.post_via::<IsrLock>(ao, e, margin, false)
    }

    /// ISR flavour of [`QF::post_lifo`]
    pub fn post_lifo(&self, ao: &'static dyn Active, e: QEvt, margin: Margin) -> bool {
        self.qf.post_via::<IsrLock>(ao, e, margin, true)
    }

    /// ISR flavour of [`QF::publish`]; the scheduler is not locked
    pub fn publish(&self, e: QEvt, margin: Margin) {
        self.qf.publish_via::<IsrLock>(e, margin)
    }

    /// ISR flavour of [`QF::tick`]
    pub fn tick(&self, rate: u8) {
        self.qf.tick_via::<IsrLock>(rate)
    }

    /// ISR flavour of [`QF::new_evt`]
    pub fn new_evt(&self, signal: QSignal, payload: &[u8], margin: Margin) -> Option<QEvt> {
        self.qf.new_evt_via::<IsrLock>(signal, payload, margin)
    }
}

impl Drop for IsrContext {
    fn drop(&mut self) {
        self.qf.isr_exit();
    }
}
