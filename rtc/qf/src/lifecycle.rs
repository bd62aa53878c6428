//! Kernel configuration, idle handling and the scheduler hook.

#![allow(unsafe_code)]

use crate::trace::TraceHook;
use core::fmt;
use critical_section::RestoreState;
use rtc_core::{default_on_error, OnError, QPriority};

/// Callbacks and identity of one framework instance.
///
/// Built with [`KernelConfig::builder`] and applied with
/// [`QF::init`](crate::QF::init):
///
/// ```
/// use rtc_qf::KernelConfig;
///
/// fn idle(guard: rtc_qf::IdleGuard) {
///     guard.enable_interrupts();
/// }
///
/// let config = KernelConfig::builder()
///     .name("blinky")
///     .on_idle(idle)
///     .build();
/// assert_eq!(config.name, "blinky");
/// ```
#[derive(Clone, Copy)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Called once by `run()` before the first dispatch
    pub on_startup: fn(),
    /// Called whenever nothing is ready to run
    pub on_idle: fn(IdleGuard),
    /// Called once when `run()` returns after [`QF::stop`](crate::QF::stop)
    pub on_cleanup: fn(),
    /// Fatal-error handler; never returns
    pub on_error: OnError,
    pub trace_hook: Option<TraceHook>,
}

fn nop() {}

fn default_idle(guard: IdleGuard) {
    guard.wait_for_interrupt();
}

impl KernelConfig {
    pub const DEFAULT: Self = Self {
        name: "RTC",
        on_startup: nop,
        on_idle: default_idle,
        on_cleanup: nop,
        on_error: default_on_error,
        trace_hook: None,
    };

    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("name", &self.name)
            .field("trace_hook", &self.trace_hook.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the kernel name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the startup callback.
    pub fn on_startup(mut self, callback: fn()) -> Self {
        self.config.on_startup = callback;
        self
    }

    /// Sets the idle callback.
    pub fn on_idle(mut self, callback: fn(IdleGuard)) -> Self {
        self.config.on_idle = callback;
        self
    }

    /// Sets the cleanup callback.
    pub fn on_cleanup(mut self, callback: fn()) -> Self {
        self.config.on_cleanup = callback;
        self
    }

    /// Sets the fatal-error handler.
    pub fn on_error(mut self, handler: OnError) -> Self {
        self.config.on_error = handler;
        self
    }

    /// Installs a trace hook.
    pub fn trace_hook(mut self, hook: TraceHook) -> Self {
        self.config.trace_hook = Some(hook);
        self
    }

    /// Builds the kernel configuration.
    pub fn build(self) -> KernelConfig {
        self.config
    }
}

/// Interrupt state handed to the idle callback.
///
/// Under the cooperative kernel the callback runs with interrupts disabled,
/// so that the decision to go idle and the idle action itself cannot race an
/// interrupt that makes an object ready. The callback must consume the guard
/// with [`enable_interrupts`](Self::enable_interrupts) or
/// [`wait_for_interrupt`](Self::wait_for_interrupt); dropping it also
/// re-enables interrupts.
pub struct IdleGuard {
    restore: Option<RestoreState>,
}

impl IdleGuard {
    /// Disable interrupts until the guard is consumed
    pub fn disabled() -> Self {
        // SAFETY: released exactly once, in `Drop`.
        let restore = unsafe { critical_section::acquire() };
        Self {
            restore: Some(restore),
        }
    }

    /// Guard for kernels that idle with interrupts enabled
    pub const fn enabled() -> Self {
        Self { restore: None }
    }

    /// Whether interrupts are still disabled
    pub fn interrupts_disabled(&self) -> bool {
        self.restore.is_some()
    }

    /// Re-enable interrupts and return
    pub fn enable_interrupts(self) {
        drop(self);
    }

    /// Re-enable interrupts and sleep until the next one arrives
    pub fn wait_for_interrupt(self) {
        drop(self);
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

impl Drop for IdleGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            // SAFETY: `restore` came from the matching `acquire` in
            // `disabled()` and is taken out so it is released only once.
            unsafe { critical_section::release(restore) };
        }
    }
}

impl fmt::Debug for IdleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleGuard")
            .field("interrupts_disabled", &self.interrupts_disabled())
            .finish()
    }
}

/// Scheduler notifications.
///
/// The framework calls these outside of any critical section. A cooperative
/// kernel ignores them; a preemptive kernel uses them to run higher-priority
/// work synchronously.
pub trait Kernel: Sync {
    /// A task-level post or tick made `prio` ready
    fn on_ready(&self, prio: QPriority);

    /// The outermost interrupt handler is returning
    fn on_isr_exit(&self);

    /// The scheduler lock was lowered
    fn on_sched_unlock(&self);
}
