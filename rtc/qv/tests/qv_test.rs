//! Cooperative scheduling

use rtc_qf::*;
use rtc_qv::QV;
use std::sync::Mutex as StdMutex;

type Log = StdMutex<Vec<&'static str>>;

static PING: StaticEvt = StaticEvt::new(QSignal::new(10));

/// Logs its name, then optionally forwards a ping to `next`
struct Step {
    name: &'static str,
    log: &'static Log,
    next: Option<&'static dyn Active>,
}

impl ActiveBehavior for Step {
    fn on_event(&mut self, ctx: &mut ActiveContext, _e: &QEvt) {
        self.log.lock().unwrap().push(self.name);
        if let Some(next) = self.next {
            ctx.post(next, QEvt::from_static(&PING), Margin::Keep(0));
            self.log.lock().unwrap().push("posted");
        }
    }
}

fn ping(qf: &'static QF, ao: &'static dyn Active) {
    assert!(qf.post(ao, QEvt::from_static(&PING), Margin::Keep(0)));
}

#[test]
fn higher_priority_runs_first() {
    static QF: QF = QF::new();
    static KERNEL: QV = QV::new(&QF);
    static LOG: Log = StdMutex::new(Vec::new());
    static LOW: QActive<Step, 4> = QActive::new(
        priority!(3),
        Step {
            name: "low",
            log: &LOG,
            next: None,
        },
    );
    static HIGH: QActive<Step, 4> = QActive::new(
        priority!(5),
        Step {
            name: "high",
            log: &LOG,
            next: None,
        },
    );

    KERNEL.init();
    QF.start_active(&LOW, None);
    QF.start_active(&HIGH, None);

    ping(&QF, &LOW);
    ping(&QF, &HIGH);
    ping(&QF, &HIGH);

    assert_eq!(KERNEL.run_until_idle(), 3);
    assert_eq!(*LOG.lock().unwrap(), ["high", "high", "low"]);
}

#[test]
fn posting_never_preempts_the_running_step() {
    static QF: QF = QF::new();
    static KERNEL: QV = QV::new(&QF);
    static LOG: Log = StdMutex::new(Vec::new());
    static LOW: QActive<Step, 4> = QActive::new(
        priority!(1),
        Step {
            name: "low",
            log: &LOG,
            next: Some(&HIGH),
        },
    );
    static HIGH: QActive<Step, 4> = QActive::new(
        priority!(6),
        Step {
            name: "high",
            log: &LOG,
            next: None,
        },
    );

    KERNEL.init();
    QF.start_active(&LOW, None);
    QF.start_active(&HIGH, None);

    ping(&QF, &LOW);
    KERNEL.run_until_idle();
    assert_eq!(*LOG.lock().unwrap(), ["low", "posted", "high"]);
}

#[test]
fn scheduler_lock_holds_back_low_priorities() {
    static QF: QF = QF::new();
    static KERNEL: QV = QV::new(&QF);
    static LOG: Log = StdMutex::new(Vec::new());
    static LOW: QActive<Step, 4> = QActive::new(
        priority!(3),
        Step {
            name: "low",
            log: &LOG,
            next: None,
        },
    );
    static HIGH: QActive<Step, 4> = QActive::new(
        priority!(6),
        Step {
            name: "high",
            log: &LOG,
            next: None,
        },
    );

    KERNEL.init();
    QF.start_active(&LOW, None);
    QF.start_active(&HIGH, None);

    let status = QF.sched_lock(5);
    ping(&QF, &LOW);
    ping(&QF, &HIGH);
    assert_eq!(KERNEL.run_until_idle(), 1);
    assert_eq!(*LOG.lock().unwrap(), ["high"]);

    QF.sched_unlock(status);
    assert_eq!(KERNEL.run_until_idle(), 1);
    assert_eq!(*LOG.lock().unwrap(), ["high", "low"]);
}

#[test]
fn run_idles_with_interrupts_disabled_until_stopped() {
    static QF: QF = QF::new();
    static KERNEL: QV = QV::new(&QF);
    static LOG: Log = StdMutex::new(Vec::new());
    static AO: QActive<Step, 4> = QActive::new(
        priority!(2),
        Step {
            name: "event",
            log: &LOG,
            next: None,
        },
    );

    fn startup() {
        LOG.lock().unwrap().push("startup");
    }

    fn idle(guard: IdleGuard) {
        assert!(guard.interrupts_disabled());
        let first = !LOG.lock().unwrap().contains(&"idle");
        LOG.lock().unwrap().push("idle");
        if first {
            // an interrupt arrives while idle
            let isr = QF.isr_entry();
            assert!(isr.post(&AO, QEvt::from_static(&PING), Margin::Keep(0)));
        } else {
            QF.stop();
        }
        guard.wait_for_interrupt();
    }

    fn cleanup() {
        LOG.lock().unwrap().push("cleanup");
    }

    QF.init(
        KernelConfig::builder()
            .on_startup(startup)
            .on_idle(idle)
            .on_cleanup(cleanup)
            .build(),
    );
    KERNEL.init();
    QF.start_active(&AO, None);

    KERNEL.run();
    assert_eq!(
        *LOG.lock().unwrap(),
        ["startup", "idle", "event", "idle", "cleanup"]
    );
}

#[test]
fn pending_events_drain_before_stop() {
    static QF: QF = QF::new();
    static KERNEL: QV = QV::new(&QF);
    static LOG: Log = StdMutex::new(Vec::new());
    static AO: QActive<Step, 4> = QActive::new(
        priority!(4),
        Step {
            name: "event",
            log: &LOG,
            next: None,
        },
    );

    fn startup() {
        QF.stop();
    }

    fn idle(_guard: IdleGuard) {
        panic!("idle must not run after a stop request");
    }

    QF.init(
        KernelConfig::builder()
            .on_startup(startup)
            .on_idle(idle)
            .build(),
    );
    KERNEL.init();
    QF.start_active(&AO, None);
    ping(&QF, &AO);
    ping(&QF, &AO);

    KERNEL.run();
    assert_eq!(*LOG.lock().unwrap(), ["event", "event"]);
    assert!(QF.ready_set().is_empty());
}

#[test]
fn scheduling_is_traced() {
    static QF: QF = QF::new();
    static KERNEL: QV = QV::new(&QF);
    static LOG: Log = StdMutex::new(Vec::new());
    static RECORDS: StdMutex<Vec<(u8, u8)>> = StdMutex::new(Vec::new());
    static AO: QActive<Step, 4> = QActive::new(
        priority!(2),
        Step {
            name: "event",
            log: &LOG,
            next: None,
        },
    );

    fn hook(record: &QsRecord) {
        match *record {
            QsRecord::SchedNext { next, prev } => RECORDS.lock().unwrap().push((next, prev)),
            QsRecord::SchedIdle { prev } => RECORDS.lock().unwrap().push((0, prev)),
            _ => {}
        }
    }

    fn startup() {
        QF.stop();
    }

    QF.init(
        KernelConfig::builder()
            .on_startup(startup)
            .trace_hook(hook)
            .build(),
    );
    KERNEL.init();
    QF.start_active(&AO, None);
    ping(&QF, &AO);
    KERNEL.run();

    assert_eq!(*RECORDS.lock().unwrap(), [(2, 0)]);
}
