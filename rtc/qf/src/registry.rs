//! The framework instance: pools, active objects, ready set and scheduler lock.

use crate::crit::{CritLock, TaskLock};
use crate::queue::PostOutcome;
use crate::time::TimerLists;
use crate::trace::QsRecord;
use crate::{module, Active, IsrContext, Kernel, KernelConfig};
use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::{CriticalSection, Mutex};
use heapless::Vec;
use rtc_core::{
    Margin, QError, QPriority, QPriorityMask, QResult, QSignal, MAX_ACTIVE, MAX_EPOOL,
    MAX_PUB_SIGNAL,
};
use rtc_mem::{EventPool, QEvt};

/// Previous scheduler lock state, returned by [`QF::sched_lock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedStatus {
    /// The ceiling was raised; holds the ceiling to restore
    Locked(u8),
    /// The requested ceiling was not above the current one
    Unlocked,
}

impl SchedStatus {
    pub fn is_locked(self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SchedState {
    ready: QPriorityMask,
    lock_ceiling: u8,
    isr_nest: u8,
}

/// Where a post ended up
pub(crate) enum Delivery {
    Queued { became_ready: bool, n_free: u16 },
    Rejected { n_free: u16 },
}

type ActiveTable = [Option<&'static dyn Active>; MAX_ACTIVE + 1];

pub(crate) fn same_active(a: &dyn Active, b: &dyn Active) -> bool {
    core::ptr::eq(a as *const dyn Active as *const u8, b as *const dyn Active as *const u8)
}

/// One instance of the active-object framework.
///
/// Everything is statically sized, so a `QF` lives in a `static`:
///
/// ```
/// use rtc_qf::QF;
///
/// static QF: QF = QF::new();
/// assert!(!QF.in_isr());
/// ```
pub struct QF {
    pools: Mutex<RefCell<Vec<&'static dyn EventPool, MAX_EPOOL>>>,
    actives: Mutex<RefCell<ActiveTable>>,
    pub(crate) subscribers: Mutex<RefCell<[QPriorityMask; MAX_PUB_SIGNAL]>>,
    pub(crate) timers: Mutex<RefCell<TimerLists>>,
    sched: Mutex<Cell<SchedState>>,
    config: Mutex<Cell<KernelConfig>>,
    kernel: Mutex<Cell<Option<&'static dyn Kernel>>>,
    stop: AtomicBool,
}

impl QF {
    pub const fn new() -> Self {
        Self {
            pools: Mutex::new(RefCell::new(Vec::new())),
            actives: Mutex::new(RefCell::new([None; MAX_ACTIVE + 1])),
            subscribers: Mutex::new(RefCell::new([QPriorityMask::EMPTY; MAX_PUB_SIGNAL])),
            timers: Mutex::new(RefCell::new(TimerLists::new())),
            sched: Mutex::new(Cell::new(SchedState {
                ready: QPriorityMask::EMPTY,
                lock_ceiling: 0,
                isr_nest: 0,
            })),
            config: Mutex::new(Cell::new(KernelConfig::DEFAULT)),
            kernel: Mutex::new(Cell::new(None)),
            stop: AtomicBool::new(false),
        }
    }

    /// Apply the kernel configuration
    pub fn init(&self, config: KernelConfig) {
        critical_section::with(|cs| self.config.borrow(cs).set(config));
        log::info!("{}: framework initialized", config.name);
    }

    pub fn config(&self) -> KernelConfig {
        critical_section::with(|cs| self.config.borrow(cs).get())
    }

    /// Connect the scheduler that wants post/ISR/unlock notifications
    pub fn attach_kernel(&self, kernel: &'static dyn Kernel) {
        critical_section::with(|cs| self.kernel.borrow(cs).set(Some(kernel)));
    }

    fn kernel(&self) -> Option<&'static dyn Kernel> {
        critical_section::with(|cs| self.kernel.borrow(cs).get())
    }

    pub(crate) fn notify_ready(&self, prio: QPriority) {
        if let Some(kernel) = self.kernel() {
            kernel.on_ready(prio);
        }
    }

    /// Report a fatal error and never return
    pub fn fatal(&self, module: &'static str, err: QError) -> ! {
        let config = self.config();
        log::error!("{}: fatal {} in {} (code {})", config.name, err, module, err.code());
        self.emit(QsRecord::Fatal {
            module,
            code: err.code(),
        });
        (config.on_error)(module, err.code())
    }

    /// Forward a record to the trace hook, if any
    pub fn emit(&self, record: QsRecord) {
        if let Some(hook) = self.config().trace_hook {
            hook(&record);
        }
    }

    // --- context --------------------------------------------------------

    /// Whether an interrupt handler is currently running
    pub fn in_isr(&self) -> bool {
        critical_section::with(|cs| self.sched.borrow(cs).get().isr_nest > 0)
    }

    pub(crate) fn require_task(&self, module: &'static str) {
        if self.in_isr() {
            self.fatal(module, QError::WrongContext);
        }
    }

    /// Notify the framework that an interrupt handler was entered.
    ///
    /// The returned context gives access to the ISR-safe services; dropping
    /// it is the matching exit notification.
    pub fn isr_entry(&'static self) -> IsrContext {
        critical_section::with(|cs| {
            let cell = self.sched.borrow(cs);
            let mut state = cell.get();
            state.isr_nest += 1;
            cell.set(state);
        });
        IsrContext::new(self)
    }

    pub(crate) fn isr_exit(&self) {
        let outermost = critical_section::with(|cs| {
            let cell = self.sched.borrow(cs);
            let mut state = cell.get();
            debug_assert!(state.isr_nest > 0, "unbalanced ISR exit");
            state.isr_nest = state.isr_nest.saturating_sub(1);
            cell.set(state);
            state.isr_nest == 0
        });
        if outermost {
            if let Some(kernel) = self.kernel() {
                kernel.on_isr_exit();
            }
        }
    }

    // --- event pools ----------------------------------------------------

    /// Register an event pool.
    ///
    /// Pools must be registered in strictly increasing block-size order; the
    /// first one gets pool id 1.
    pub fn pool_init(&self, pool: &'static dyn EventPool) {
        let res = critical_section::with(|cs| -> QResult<u8> {
            let mut pools = self.pools.borrow_ref_mut(cs);
            if let Some(last) = pools.last() {
                if last.block_size() >= pool.block_size() {
                    return Err(QError::PoolOrder);
                }
            }
            pools.push(pool).map_err(|_| QError::TooManyPools)?;
            let id = pools.len() as u8;
            pool.set_pool_id(id);
            Ok(id)
        });
        match res {
            Ok(id) => log::debug!(
                "pool {} registered: {} blocks of {} bytes",
                id,
                pool.capacity(),
                pool.block_size()
            ),
            Err(err) => self.fatal(module::POOL, err),
        }
    }

    /// Lowest number of free blocks ever seen in pool `pool_id` (1-based)
    pub fn pool_min_free(&self, pool_id: u8) -> usize {
        let res = critical_section::with(|cs| {
            let pools = self.pools.borrow_ref(cs);
            let index = usize::from(pool_id).checked_sub(1)?;
            pools.get(index).map(|pool| pool.stats(cs).min_free_blocks)
        });
        match res {
            Some(n) => n,
            None => self.fatal(module::POOL, QError::InvalidSize),
        }
    }

    /// Allocate an event from the smallest pool that fits `payload`.
    ///
    /// Returns `None` only when `margin` is [`Margin::Keep`] and the chosen
    /// pool cannot honour it. Running dry with [`Margin::Unconditional`] is
    /// fatal, as is a payload no registered pool can hold.
    pub fn new_evt(&self, signal: QSignal, payload: &[u8], margin: Margin) -> Option<QEvt> {
        self.require_task(module::POOL);
        self.new_evt_via::<TaskLock>(signal, payload, margin)
    }

    pub(crate) fn new_evt_via<L: CritLock>(
        &self,
        signal: QSignal,
        payload: &[u8],
        margin: Margin,
    ) -> Option<QEvt> {
        let res = L::with(|cs| -> Result<QEvt, (QError, u8)> {
            let pools = self.pools.borrow_ref(cs);
            let pool = pools
                .iter()
                .copied()
                .find(|pool| pool.block_size() >= payload.len())
                .ok_or((QError::InvalidSize, 0))?;
            QEvt::alloc(pool, signal, payload, margin, cs).map_err(|err| (err, pool.pool_id()))
        });

        match res {
            Ok(evt) => {
                log::trace!("new {} from pool {}", signal, evt.pool_id());
                self.emit(QsRecord::NewEvt {
                    signal,
                    pool_id: evt.pool_id(),
                });
                Some(evt)
            }
            Err((QError::OutOfMemory, pool_id)) => {
                log::warn!("pool {} has no {} within margin {}", pool_id, signal, margin);
                self.emit(QsRecord::NewAttempt { signal, pool_id });
                None
            }
            Err((err, _)) => self.fatal(module::POOL, err),
        }
    }

    // --- active objects -------------------------------------------------

    /// Register `ao` at its priority and run its initial transition
    pub fn start_active(&'static self, ao: &'static dyn Active, init: Option<QEvt>) {
        self.require_task(module::ACTV);
        let prio = ao.prio();
        let res = critical_section::with(|cs| {
            if !prio.is_valid() {
                return Err(QError::InvalidPriority);
            }
            let mut actives = self.actives.borrow_ref_mut(cs);
            let slot = &mut actives[usize::from(prio.raw())];
            if slot.is_some() {
                return Err(QError::DuplicatePriority);
            }
            *slot = Some(ao);
            Ok(())
        });
        if let Err(err) = res {
            self.fatal(module::ACTV, err);
        }

        log::debug!("active object started at {}", prio);
        ao.init(self, init);
    }

    /// Active object registered at `prio`
    pub fn active(&self, prio: QPriority) -> Option<&'static dyn Active> {
        if !prio.is_valid() {
            return None;
        }
        critical_section::with(|cs| self.actives.borrow_ref(cs)[usize::from(prio.raw())])
    }

    pub(crate) fn is_registered(&self, ao: &dyn Active, cs: CriticalSection<'_>) -> bool {
        let prio = ao.prio();
        prio.is_valid()
            && self.actives.borrow_ref(cs)[usize::from(prio.raw())]
                .map_or(false, |registered| same_active(registered, ao))
    }

    /// Queue `e` for `ao` inside an existing critical section and update the
    /// ready set. The event is released when the queue refuses it.
    pub(crate) fn deliver(
        &self,
        ao: &dyn Active,
        e: QEvt,
        margin: Margin,
        lifo: bool,
        cs: CriticalSection<'_>,
    ) -> QResult<Delivery> {
        if !self.is_registered(ao, cs) {
            return Err(QError::NotRegistered);
        }

        let outcome = if lifo {
            ao.queue().post_lifo(e, margin, cs)
        } else {
            ao.queue().post(e, margin, cs)
        };

        match outcome {
            PostOutcome::Delivered { was_empty, n_free } => {
                if was_empty {
                    let cell = self.sched.borrow(cs);
                    let mut state = cell.get();
                    state.ready.set(ao.prio());
                    cell.set(state);
                }
                Ok(Delivery::Queued {
                    became_ready: was_empty,
                    n_free,
                })
            }
            PostOutcome::Rejected(_) => {
                let n_free = (ao.queue().capacity() - ao.queue().count(cs)) as u16;
                Ok(Delivery::Rejected { n_free })
            }
            PostOutcome::Overflow(_) => Err(QError::QueueOverflow),
        }
    }

    /// Post `e` to `ao` (FIFO).
    ///
    /// Returns `false` when `margin` rejected the event, in which case the
    /// reference is released. Overflowing a queue with
    /// [`Margin::Unconditional`] is fatal.
    pub fn post(&self, ao: &'static dyn Active, e: QEvt, margin: Margin) -> bool {
        self.require_task(module::QUEUE);
        self.post_via::<TaskLock>(ao, e, margin, false)
    }

    /// Post `e` to the front of `ao`'s queue, ahead of everything queued.
    ///
    /// Capacity and `margin` are checked as for [`post`](Self::post).
    pub fn post_lifo(&self, ao: &'static dyn Active, e: QEvt, margin: Margin) -> bool {
        self.require_task(module::QUEUE);
        self.post_via::<TaskLock>(ao, e, margin, true)
    }

    pub(crate) fn post_via<L: CritLock>(
        &self,
        ao: &'static dyn Active,
        e: QEvt,
        margin: Margin,
        lifo: bool,
    ) -> bool {
        let prio = ao.prio();
        let signal = e.signal();
        let res = L::with(|cs| self.deliver(ao, e, margin, lifo, cs));

        match res {
            Ok(Delivery::Queued {
                became_ready,
                n_free,
            }) => {
                log::trace!("post {} to {}", signal, prio);
                self.emit(if lifo {
                    QsRecord::PostLifo {
                        signal,
                        prio: prio.raw(),
                        n_free,
                    }
                } else {
                    QsRecord::Post {
                        signal,
                        prio: prio.raw(),
                        n_free,
                        margin,
                    }
                });
                if became_ready && !L::FROM_ISR {
                    self.notify_ready(prio);
                }
                true
            }
            Ok(Delivery::Rejected { n_free }) => {
                log::warn!("{} rejected {} (margin {}, {} free)", prio, signal, margin, n_free);
                self.emit(QsRecord::PostAttempt {
                    signal,
                    prio: prio.raw(),
                    n_free,
                    margin,
                });
                false
            }
            Err(err) => self.fatal(module::QUEUE, err),
        }
    }

    /// Take one event from the queue at `prio` and run it through the owner.
    ///
    /// The ready bit is cleared once the queue drains. Returns `false` when
    /// there was nothing to dispatch.
    pub fn dispatch_one(&'static self, prio: QPriority) -> bool {
        if !prio.is_valid() {
            return false;
        }
        let taken = critical_section::with(|cs| {
            let ao = self.actives.borrow_ref(cs)[usize::from(prio.raw())]?;
            let evt = ao.queue().take(cs);
            if ao.queue().count(cs) == 0 {
                let cell = self.sched.borrow(cs);
                let mut state = cell.get();
                state.ready.clear(prio);
                cell.set(state);
            }
            evt.map(|evt| (ao, evt))
        });

        let Some((ao, evt)) = taken else {
            return false;
        };
        log::trace!("dispatch {} to {}", evt.signal(), prio);
        self.emit(QsRecord::Dispatch {
            signal: evt.signal(),
            prio: prio.raw(),
        });
        ao.dispatch(self, evt);
        true
    }

    // --- scheduling -----------------------------------------------------

    /// Priorities with pending events
    pub fn ready_set(&self) -> QPriorityMask {
        critical_section::with(|cs| self.sched.borrow(cs).get().ready)
    }

    /// Highest ready priority above both `floor` and the scheduler lock
    pub fn ready_above(&self, floor: u8) -> Option<QPriority> {
        critical_section::with(|cs| {
            let state = self.sched.borrow(cs).get();
            state
                .ready
                .highest_priority()
                .filter(|p| p.raw() > floor && p.raw() > state.lock_ceiling)
        })
    }

    /// Current scheduler lock ceiling (0 when unlocked)
    pub fn lock_ceiling(&self) -> u8 {
        critical_section::with(|cs| self.sched.borrow(cs).get().lock_ceiling)
    }

    /// Keep priorities up to `ceiling` from being scheduled.
    ///
    /// Locks nest: a request at or below the current ceiling changes nothing
    /// and returns [`SchedStatus::Unlocked`].
    pub fn sched_lock(&self, ceiling: u8) -> SchedStatus {
        self.require_task(module::ACTV);
        let status = critical_section::with(|cs| {
            let cell = self.sched.borrow(cs);
            let mut state = cell.get();
            if ceiling > state.lock_ceiling {
                let prev = state.lock_ceiling;
                state.lock_ceiling = ceiling;
                cell.set(state);
                SchedStatus::Locked(prev)
            } else {
                SchedStatus::Unlocked
            }
        });
        if let SchedStatus::Locked(prev) = status {
            self.emit(QsRecord::SchedLock { prev, ceiling });
        }
        status
    }

    /// Undo a [`sched_lock`](Self::sched_lock)
    pub fn sched_unlock(&self, status: SchedStatus) {
        let SchedStatus::Locked(restored) = status else {
            return;
        };
        self.require_task(module::ACTV);
        let lowered = critical_section::with(|cs| {
            let cell = self.sched.borrow(cs);
            let mut state = cell.get();
            if state.lock_ceiling > restored {
                let ceiling = state.lock_ceiling;
                state.lock_ceiling = restored;
                cell.set(state);
                Some(ceiling)
            } else {
                None
            }
        });
        if let Some(ceiling) = lowered {
            self.emit(QsRecord::SchedUnlock { ceiling, restored });
            if let Some(kernel) = self.kernel() {
                kernel.on_sched_unlock();
            }
        }
    }

    /// Ask the running kernel loop to return
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl Default for QF {
    fn default() -> Self {
        Self::new()
    }
}
