//! Active object trait and base implementation

use crate::{module, EventQueue, QEQueue, QF};
use rtc_core::{Margin, QError, QPriority};
use rtc_mem::QEvt;

/// An encapsulated, event-driven object with its own queue and priority.
///
/// The framework only ever talks to active objects through this trait, so
/// objects with different behaviors and queue sizes share one registry.
pub trait Active: Sync {
    /// Unique priority of this object
    fn prio(&self) -> QPriority;

    /// The object's event queue
    fn queue(&self) -> &dyn EventQueue;

    /// Take the initial transition
    fn init(&'static self, qf: &'static QF, e: Option<QEvt>);

    /// Run one RTC step for `e`
    fn dispatch(&'static self, qf: &'static QF, e: QEvt);
}

/// State machine driven by an active object.
///
/// Handlers run to completion and must not block. They may post, publish
/// and arm time events through the context.
pub trait ActiveBehavior: Send {
    /// Initial transition; `init` is the optional event given to
    /// [`QF::start_active`]
    fn on_start(&mut self, ctx: &mut ActiveContext, init: Option<&QEvt>) {
        let _ = (ctx, init);
    }

    /// Handle one event
    fn on_event(&mut self, ctx: &mut ActiveContext, e: &QEvt);
}

/// What a behavior can see of the object running it
pub struct ActiveContext {
    qf: &'static QF,
    me: &'static dyn Active,
}

impl ActiveContext {
    pub fn new(qf: &'static QF, me: &'static dyn Active) -> Self {
        Self { qf, me }
    }

    /// The framework instance
    pub fn qf(&self) -> &'static QF {
        self.qf
    }

    /// The object being dispatched
    pub fn me(&self) -> &'static dyn Active {
        self.me
    }

    pub fn prio(&self) -> QPriority {
        self.me.prio()
    }

    /// Post `e` to `target`; see [`QF::post`]
    pub fn post(&self, target: &'static dyn Active, e: QEvt, margin: Margin) -> bool {
        self.qf.post(target, e, margin)
    }

    /// Post `e` to the running object itself
    pub fn post_self(&self, e: QEvt, margin: Margin) -> bool {
        self.qf.post(self.me, e, margin)
    }

    /// Publish `e`; see [`QF::publish`]
    pub fn publish(&self, e: QEvt, margin: Margin) {
        self.qf.publish(e, margin)
    }
}

/// Active object with a behavior `B` and a queue of `N` events.
///
/// ```
/// use rtc_core::priority;
/// use rtc_mem::QEvt;
/// use rtc_qf::{ActiveBehavior, ActiveContext, QActive};
///
/// struct Blinky {
///     toggles: u32,
/// }
///
/// impl ActiveBehavior for Blinky {
///     fn on_event(&mut self, _ctx: &mut ActiveContext, _e: &QEvt) {
///         self.toggles += 1;
///     }
/// }
///
/// static BLINKY: QActive<Blinky, 4> = QActive::new(priority!(1), Blinky { toggles: 0 });
/// ```
pub struct QActive<B: ActiveBehavior, const N: usize> {
    prio: QPriority,
    queue: QEQueue<N>,
    behavior: spin::Mutex<B>,
}

impl<B: ActiveBehavior, const N: usize> QActive<B, N> {
    pub const fn new(prio: QPriority, behavior: B) -> Self {
        Self {
            prio,
            queue: QEQueue::new(),
            behavior: spin::Mutex::new(behavior),
        }
    }

    /// Direct access to the queue, mainly for diagnostics
    pub fn event_queue(&self) -> &QEQueue<N> {
        &self.queue
    }

    /// Inspect the behavior between dispatch steps.
    ///
    /// Returns `None` while a step is running.
    pub fn with_behavior<R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        self.behavior.try_lock().map(|mut b| f(&mut *b))
    }
}

impl<B: ActiveBehavior + 'static, const N: usize> Active for QActive<B, N> {
    fn prio(&self) -> QPriority {
        self.prio
    }

    fn queue(&self) -> &dyn EventQueue {
        &self.queue
    }

    fn init(&'static self, qf: &'static QF, e: Option<QEvt>) {
        let Some(mut behavior) = self.behavior.try_lock() else {
            qf.fatal(module::ACTV, QError::Reentrant)
        };
        let mut ctx = ActiveContext::new(qf, self);
        behavior.on_start(&mut ctx, e.as_ref());
    }

    fn dispatch(&'static self, qf: &'static QF, e: QEvt) {
        let Some(mut behavior) = self.behavior.try_lock() else {
            qf.fatal(module::ACTV, QError::Reentrant)
        };
        let mut ctx = ActiveContext::new(qf, self);
        behavior.on_event(&mut ctx, &e);
    }
}
