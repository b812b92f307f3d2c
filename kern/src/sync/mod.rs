//! Blocking synchronization primitives: a priority-inheriting `Mutex`, a
//! plain `FastMutex`, a `ConditionVariable`, and a counting `Semaphore`.
//! Grounded on `examples/original_source/miosix/kernel/sync.{h,cpp}`; the
//! teacher has no equivalent (its tasks never block on each other).

pub mod condvar;
pub mod fast_mutex;
pub mod mutex;
pub mod semaphore;

pub use condvar::ConditionVariable;
pub use fast_mutex::FastMutex;
pub use mutex::Mutex;
pub use semaphore::Semaphore;

use core::ptr::NonNull;

use crate::thread::{Thread, ThreadFlags};

/// Outcome of a timed wait: did it return because of a deadline, or because
/// someone woke it the ordinary way?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedWaitResult {
    NoTimeout,
    Timeout,
}

/// Moves a thread that just became runnable the rest of the way to READY.
/// If [`ConditionVariable::wait`] left it a mutex to reacquire, attempts
/// that reacquire now; a blocked reacquire leaves the thread `WAITING` on
/// the mutex's own list instead of marking it READY, exactly as if it had
/// called `lock` itself after waking.
///
/// # Safety
/// Caller holds interrupts disabled or the kernel paused.
pub unsafe fn thaw(thread: NonNull<Thread>) -> mutex::LockOutcome {
    let t = &mut *thread.as_ptr();
    match t.pending_relock.take() {
        Some((m, depth)) => (*m.as_ptr()).lock_to_depth(thread, depth),
        None => {
            t.set_run_state(ThreadFlags::READY);
            mutex::LockOutcome::Acquired
        }
    }
}
