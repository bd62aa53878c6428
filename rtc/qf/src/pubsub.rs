//! Publish-subscribe event delivery

use crate::crit::{CritLock, TaskLock};
use crate::registry::same_active;
use crate::trace::QsRecord;
use crate::{module, Active, SchedStatus, QF};
use rtc_core::{Margin, QError, QPriorityMask, QSignal, MAX_PUB_SIGNAL};
use rtc_mem::QEvt;

impl QF {
    fn check_signal(&self, signal: QSignal) -> usize {
        let index = usize::from(signal.raw());
        if index >= MAX_PUB_SIGNAL {
            self.fatal(module::PS, QError::InvalidSignal);
        }
        index
    }

    fn check_subscriber(&self, ao: &'static dyn Active) {
        let registered = self
            .active(ao.prio())
            .map_or(false, |found| same_active(found, ao));
        if !registered {
            self.fatal(module::PS, QError::NotRegistered);
        }
    }

    /// Deliver future publications of `signal` to `ao`
    pub fn subscribe(&self, ao: &'static dyn Active, signal: QSignal) {
        self.require_task(module::PS);
        let index = self.check_signal(signal);
        self.check_subscriber(ao);
        critical_section::with(|cs| self.subscribers.borrow_ref_mut(cs)[index].set(ao.prio()));
        log::debug!("{} subscribed to {}", ao.prio(), signal);
        self.emit(QsRecord::Subscribe {
            signal,
            prio: ao.prio().raw(),
        });
    }

    /// Stop delivering `signal` to `ao`
    pub fn unsubscribe(&self, ao: &'static dyn Active, signal: QSignal) {
        self.require_task(module::PS);
        let index = self.check_signal(signal);
        self.check_subscriber(ao);
        critical_section::with(|cs| self.subscribers.borrow_ref_mut(cs)[index].clear(ao.prio()));
        self.emit(QsRecord::Unsubscribe {
            signal,
            prio: ao.prio().raw(),
        });
    }

    /// Remove every subscription of `ao`
    pub fn unsubscribe_all(&self, ao: &'static dyn Active) {
        self.require_task(module::PS);
        self.check_subscriber(ao);
        critical_section::with(|cs| {
            for set in self.subscribers.borrow_ref_mut(cs).iter_mut() {
                set.clear(ao.prio());
            }
        });
    }

    /// Current subscribers of `signal`
    pub fn subscribers(&self, signal: QSignal) -> QPriorityMask {
        let index = self.check_signal(signal);
        critical_section::with(|cs| self.subscribers.borrow_ref(cs)[index])
    }

    /// Hand one reference of `e` to every subscriber of its signal, highest
    /// priority first, each post honouring `margin`.
    ///
    /// The scheduler is locked up to the highest subscriber while the
    /// references are handed out, so no subscriber runs before all of them
    /// got theirs. The caller's reference is released at the end.
    pub fn publish(&self, e: QEvt, margin: Margin) {
        self.require_task(module::PS);
        self.publish_via::<TaskLock>(e, margin);
    }

    pub(crate) fn publish_via<L: CritLock>(&self, e: QEvt, margin: Margin) {
        let signal = e.signal();
        let index = self.check_signal(signal);
        let subscribers = L::with(|cs| self.subscribers.borrow_ref(cs)[index]);

        log::trace!("publish {} to {} subscribers", signal, subscribers.len());
        self.emit(QsRecord::Publish {
            signal,
            subscribers: subscribers.len(),
        });

        let lock = match subscribers.highest_priority() {
            Some(top) if !L::FROM_ISR => self.sched_lock(top.raw()),
            _ => SchedStatus::Unlocked,
        };

        for prio in subscribers.iter_desc() {
            let Some(ao) = self.active(prio) else {
                self.fatal(module::PS, QError::NotRegistered)
            };
            let copy = match L::with(|cs| e.clone_in(cs)) {
                Ok(copy) => copy,
                Err(err) => self.fatal(module::PS, err),
            };
            self.post_via::<L>(ao, copy, margin, false);
        }
        drop(e);

        self.sched_unlock(lock);
    }
}
