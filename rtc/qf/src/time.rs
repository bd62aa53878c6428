//! Time events and the multi-rate tick engine.

use crate::crit::{CritLock, TaskLock};
use crate::registry::Delivery;
use crate::trace::QsRecord;
use crate::{module, Active, QF};
use core::cell::Cell;
use critical_section::Mutex;
use heapless::Vec;
use rtc_core::{
    Margin, QError, QPriorityMask, QResult, QSignal, QTimeEvtCtr, MAX_TICK_RATE, MAX_TIMEEVT_PER_RATE,
};
use rtc_mem::{QEvt, StaticEvt};

type TimerList = Vec<&'static QTimeEvt, MAX_TIMEEVT_PER_RATE>;

/// Worst case per tick: an auto-disarm and a post for every timer
const TICK_RECORDS: usize = 2 * MAX_TIMEEVT_PER_RATE;

/// Armed time events, one list per tick rate, in arming order
pub(crate) struct TimerLists([TimerList; MAX_TICK_RATE]);

impl TimerLists {
    pub(crate) const fn new() -> Self {
        const EMPTY: TimerList = Vec::new();
        Self([EMPTY; MAX_TICK_RATE])
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerState {
    ctr: QTimeEvtCtr,
    interval: u32,
    linked: bool,
}

/// A timer that posts its own static event to its owner when it expires.
///
/// ```ignore
/// static TIMEOUT: QTimeEvt = QTimeEvt::new(&BLINKY, TIMEOUT_SIG, 0);
/// QF.arm(&TIMEOUT, 10, 10); // every 10 ticks of rate 0
/// ```
pub struct QTimeEvt {
    owner: &'static dyn Active,
    evt: StaticEvt,
    rate: u8,
    state: Mutex<Cell<TimerState>>,
}

impl QTimeEvt {
    pub const fn new(owner: &'static dyn Active, signal: QSignal, rate: u8) -> Self {
        Self {
            owner,
            evt: StaticEvt::new(signal),
            rate,
            state: Mutex::new(Cell::new(TimerState {
                ctr: QTimeEvtCtr::ZERO,
                interval: 0,
                linked: false,
            })),
        }
    }

    pub fn signal(&self) -> QSignal {
        self.evt.signal()
    }

    pub fn tick_rate(&self) -> u8 {
        self.rate
    }

    /// Ticks left until expiry; zero while disarmed
    pub fn current_ctr(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow(cs).get().ctr.ticks())
    }

    pub fn is_armed(&self) -> bool {
        critical_section::with(|cs| self.state.borrow(cs).get().linked)
    }

    fn prio(&self) -> u8 {
        self.owner.prio().raw()
    }
}

impl QF {
    fn check_rate(&self, rate: u8) {
        if usize::from(rate) >= MAX_TICK_RATE {
            self.fatal(module::TIME, QError::InvalidTickRate);
        }
    }

    /// Arm `te` to expire after `n_ticks` and then every `interval` ticks
    /// (0 for a one-shot).
    ///
    /// Arming a running timer only rewrites its countdown and interval.
    pub fn arm(&self, te: &'static QTimeEvt, n_ticks: u32, interval: u32) {
        if n_ticks == 0 {
            self.fatal(module::TIME, QError::InvalidTimeout);
        }
        self.check_rate(te.rate);

        let res = critical_section::with(|cs| -> QResult<()> {
            let cell = te.state.borrow(cs);
            let mut state = cell.get();
            if !state.linked {
                let mut lists = self.timers.borrow_ref_mut(cs);
                lists.0[usize::from(te.rate)]
                    .push(te)
                    .map_err(|_| QError::TimerListFull)?;
                state.linked = true;
            }
            state.ctr = QTimeEvtCtr::new(n_ticks);
            state.interval = interval;
            cell.set(state);
            Ok(())
        });
        if let Err(err) = res {
            self.fatal(module::TIME, err);
        }

        log::debug!(
            "arm {} for {} in {} ticks, interval {}",
            te.signal(),
            te.owner.prio(),
            n_ticks,
            interval
        );
        self.emit(QsRecord::TimeEvtArm {
            signal: te.signal(),
            prio: te.prio(),
            ctr: n_ticks,
            interval,
            rate: te.rate,
        });
    }

    /// Stop `te`. Returns `true` if it was running.
    pub fn disarm(&self, te: &'static QTimeEvt) -> bool {
        let was_armed = critical_section::with(|cs| {
            let cell = te.state.borrow(cs);
            let mut state = cell.get();
            if !state.linked {
                return None;
            }
            let left = state.ctr.ticks();
            self.timers.borrow_ref_mut(cs).0[usize::from(te.rate)]
                .retain(|t| !core::ptr::eq(*t, te));
            state.linked = false;
            state.ctr = QTimeEvtCtr::ZERO;
            cell.set(state);
            Some(left)
        });

        match was_armed {
            Some(ctr) => {
                self.emit(QsRecord::TimeEvtDisarm {
                    signal: te.signal(),
                    prio: te.prio(),
                    ctr,
                });
                true
            }
            None => {
                self.emit(QsRecord::TimeEvtDisarmAttempt {
                    signal: te.signal(),
                    prio: te.prio(),
                });
                false
            }
        }
    }

    /// Restart the countdown of `te` at `n_ticks`, keeping its interval.
    ///
    /// Returns `true` if the timer was running; a disarmed timer is armed.
    pub fn rearm(&self, te: &'static QTimeEvt, n_ticks: u32) -> bool {
        if n_ticks == 0 {
            self.fatal(module::TIME, QError::InvalidTimeout);
        }
        self.check_rate(te.rate);

        let res = critical_section::with(|cs| -> QResult<(bool, u32)> {
            let cell = te.state.borrow(cs);
            let mut state = cell.get();
            let was_armed = state.linked;
            if !was_armed {
                self.timers.borrow_ref_mut(cs).0[usize::from(te.rate)]
                    .push(te)
                    .map_err(|_| QError::TimerListFull)?;
                state.linked = true;
            }
            state.ctr = QTimeEvtCtr::new(n_ticks);
            cell.set(state);
            Ok((was_armed, state.interval))
        });

        match res {
            Ok((was_armed, interval)) => {
                self.emit(QsRecord::TimeEvtArm {
                    signal: te.signal(),
                    prio: te.prio(),
                    ctr: n_ticks,
                    interval,
                    rate: te.rate,
                });
                was_armed
            }
            Err(err) => self.fatal(module::TIME, err),
        }
    }

    /// Whether no time event is armed at `rate`
    pub fn no_active_timers(&self, rate: u8) -> bool {
        self.check_rate(rate);
        critical_section::with(|cs| self.timers.borrow_ref(cs).0[usize::from(rate)].is_empty())
    }

    /// Advance every time event of `rate` by one tick from task level
    pub fn tick(&self, rate: u8) {
        self.require_task(module::TIME);
        self.tick_via::<TaskLock>(rate);
    }

    pub(crate) fn tick_via<L: CritLock>(&self, rate: u8) {
        self.check_rate(rate);

        let mut ready = QPriorityMask::EMPTY;
        let mut records: Vec<QsRecord, TICK_RECORDS> = Vec::new();
        let res = L::with(|cs| -> QResult<()> {
            let mut lists = self.timers.borrow_ref_mut(cs);
            let list = &mut lists.0[usize::from(rate)];
            let mut i = 0;
            while i < list.len() {
                let te = list[i];
                let cell = te.state.borrow(cs);
                let mut state = cell.get();
                if !state.ctr.decrement() {
                    cell.set(state);
                    i += 1;
                    continue;
                }

                let periodic = state.interval != 0;
                if periodic {
                    state.ctr = QTimeEvtCtr::new(state.interval);
                    i += 1;
                } else {
                    state.linked = false;
                    let _ = list.remove(i);
                    let _ = records.push(QsRecord::TimeEvtAutoDisarm {
                        signal: te.signal(),
                        prio: te.prio(),
                    });
                }
                cell.set(state);

                let _ = records.push(QsRecord::TimeEvtPost {
                    signal: te.signal(),
                    prio: te.prio(),
                    rate,
                });
                let evt = QEvt::from_static(&te.evt);
                match self.deliver(te.owner, evt, Margin::Unconditional, false, cs)? {
                    Delivery::Queued { became_ready, .. } => {
                        if became_ready {
                            ready.set(te.owner.prio());
                        }
                    }
                    Delivery::Rejected { .. } => return Err(QError::QueueOverflow),
                }
            }
            Ok(())
        });

        for record in records {
            self.emit(record);
        }
        if let Err(err) = res {
            self.fatal(module::TIME, err);
        }

        if !L::FROM_ISR {
            if let Some(prio) = ready.highest_priority() {
                log::trace!("tick {} made {} ready", rate, prio);
                self.notify_ready(prio);
            }
        }
    }
}
