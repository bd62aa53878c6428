//! Task-level and ISR-level locking.
//!
//! Every service that exists in both a task and an interrupt flavour is
//! written once, generic over [`CritLock`]. Both locks enter the same
//! `critical-section` implementation; they differ in the context checks the
//! framework performs around it and in whether the kernel is notified right
//! after the operation or only at the outermost ISR exit.

use critical_section::CriticalSection;

/// Execution context of a kernel service
pub trait CritLock {
    /// Whether the caller runs inside an interrupt handler
    const FROM_ISR: bool;

    /// Run `f` inside a critical section
    #[inline]
    fn with<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
        critical_section::with(f)
    }
}

/// Lock used by task-level services
pub struct TaskLock;

/// Lock used by services invoked through an [`IsrContext`](crate::IsrContext)
pub struct IsrLock;

impl CritLock for TaskLock {
    const FROM_ISR: bool = false;
}

impl CritLock for IsrLock {
    const FROM_ISR: bool = true;
}
