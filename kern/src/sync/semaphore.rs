//! A counting semaphore, usable from thread context and from interrupt
//! handlers. Grounded on `Semaphore` in
//! `examples/original_source/miosix/kernel/sync.h` (the `IRQ*` variants are
//! its interrupt-context-safe counterparts of `signal`/`wait`). Used by
//! `vfs::pipe` to block readers and writers on an empty/full ring buffer.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use intrusive::IntrusiveList;

use super::TimedWaitResult;
use crate::thread::{Thread, ThreadFlags, TimeoutTarget, WaitTag};
use crate::time::Timestamp;

struct State {
    count: i32,
    waiting: IntrusiveList<Thread, WaitTag>,
}

pub struct Semaphore {
    state: UnsafeCell<State>,
}

unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn new(initial_count: u32) -> Self {
        Semaphore {
            state: UnsafeCell::new(State { count: initial_count as i32, waiting: IntrusiveList::new() }),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut State {
        unsafe { &mut *self.state.get() }
    }

    pub fn count(&self) -> i32 {
        self.state().count
    }

    /// Increments the counter, waking at most one waiter. Returns that
    /// waiter's thread, if any, so the caller can decide whether to yield
    /// to it (the original's `hppw` handling).
    ///
    /// # Safety
    /// Caller holds interrupts disabled or the kernel paused. Callable from
    /// interrupt context (this is the `IRQsignal` equivalent).
    pub unsafe fn signal(&self) -> Option<crate::thread::ThreadId> {
        let state = self.state();
        state.count += 1;
        let woken = state.waiting.pop_front()?;
        let t = &mut *woken.as_ptr();
        t.set_run_state(ThreadFlags::READY);
        Some(t.id)
    }

    /// Decrements the counter if positive without blocking.
    ///
    /// # Safety
    /// Same as [`Self::signal`]. Callable from interrupt context (this is
    /// the `IRQtryWait` equivalent).
    pub unsafe fn try_wait(&self) -> bool {
        let state = self.state();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Blocks `current` until the counter is positive, then decrements it.
    /// Returns `true` if it had to block.
    ///
    /// # Safety
    /// Caller holds interrupts disabled or the kernel paused; `current`
    /// points at the thread actually executing this call. Not callable from
    /// interrupt context (unlike `try_wait`/`signal`): a thread that must
    /// block needs somewhere to resume.
    pub unsafe fn wait(&self, current: NonNull<Thread>) -> bool {
        if self.try_wait() {
            return false;
        }
        let cur = &mut *current.as_ptr();
        cur.set_run_state(ThreadFlags::WAITING);
        self.state().waiting.push_back(current);
        true
    }

    /// As [`Self::wait`], but also records `deadline`.
    ///
    /// # Safety
    /// Same as [`Self::wait`].
    pub unsafe fn timed_wait(&self, current: NonNull<Thread>, deadline: Timestamp) -> bool {
        let blocked = self.wait(current);
        if blocked {
            let cur = &mut *current.as_ptr();
            cur.wakeup_time = Some(deadline);
            cur.timeout_target = Some(TimeoutTarget::Semaphore(NonNull::from(self)));
        }
        blocked
    }

    /// Called by the scheduler when a `timed_wait` deadline elapses.
    ///
    /// # Safety
    /// Same as [`Self::wait`].
    pub unsafe fn expire(&self, thread: NonNull<Thread>) -> TimedWaitResult {
        let state = self.state();
        if state.waiting.iter().any(|t| core::ptr::eq(t, thread.as_ptr())) {
            state.waiting.remove(thread);
            let t = &mut *thread.as_ptr();
            t.timeout_target = None;
            t.set_run_state(ThreadFlags::READY);
            TimedWaitResult::Timeout
        } else {
            TimedWaitResult::NoTimeout
        }
    }

    /// Resets the counter to zero, returning its previous value.
    ///
    /// # Safety
    /// Same as [`Self::signal`]. Callable from interrupt context.
    pub unsafe fn reset(&self) -> i32 {
        let state = self.state();
        core::mem::replace(&mut state.count, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadId;
    use abi::Priority;

    fn thread(id: usize) -> Thread {
        Thread::new(ThreadId(id), None, 0, 0, Priority(10), false)
    }

    #[test]
    fn try_wait_succeeds_only_when_positive() {
        let s = Semaphore::new(1);
        unsafe {
            assert!(s.try_wait());
            assert!(!s.try_wait());
        }
    }

    #[test]
    fn wait_on_empty_blocks_and_signal_wakes_fifo() {
        let s = Semaphore::new(0);
        let mut a = thread(0);
        let mut b = thread(1);
        let a_ptr = NonNull::from(&mut a);
        let b_ptr = NonNull::from(&mut b);
        unsafe {
            assert!(s.wait(a_ptr));
            assert!(s.wait(b_ptr));
            assert_eq!(s.signal(), Some(ThreadId(0)));
            assert!(a.flags.contains(ThreadFlags::READY));
            assert_eq!(s.signal(), Some(ThreadId(1)));
        }
    }

    #[test]
    fn signal_with_no_waiters_just_increments() {
        let s = Semaphore::new(0);
        unsafe {
            assert_eq!(s.signal(), None);
            assert_eq!(s.count(), 1);
        }
    }

    #[test]
    fn expire_removes_only_if_still_waiting() {
        let s = Semaphore::new(0);
        let mut a = thread(0);
        let a_ptr = NonNull::from(&mut a);
        unsafe {
            assert!(s.timed_wait(a_ptr, Timestamp::from(50)));
            assert_eq!(s.expire(a_ptr), TimedWaitResult::Timeout);
            assert_eq!(s.expire(a_ptr), TimedWaitResult::NoTimeout);
        }
    }

    #[test]
    fn reset_returns_previous_count() {
        let s = Semaphore::new(3);
        unsafe {
            assert_eq!(s.reset(), 3);
            assert_eq!(s.count(), 0);
        }
    }
}
