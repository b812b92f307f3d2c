//! A plain FIFO mutex with no priority inheritance, for critical sections
//! that never run under a priority-inverted caller and can't afford
//! inheritance's bookkeeping. Grounded on `FastMutex` in
//! `examples/original_source/miosix/kernel/sync.h`, which wraps a
//! non-recursive-capable `pthread_mutex_t`-style primitive.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::thread::{Thread, ThreadFlags, WaitTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    Blocked,
    Deadlock,
}

struct State {
    owner: Option<NonNull<Thread>>,
    recursive: bool,
    depth: u32,
    waiting: intrusive::IntrusiveList<Thread, WaitTag>,
}

pub struct FastMutex {
    state: UnsafeCell<State>,
}

unsafe impl Sync for FastMutex {}

impl FastMutex {
    pub const fn new(recursive: bool) -> Self {
        FastMutex {
            state: UnsafeCell::new(State {
                owner: None,
                recursive,
                depth: 0,
                waiting: intrusive::IntrusiveList::new(),
            }),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut State {
        unsafe { &mut *self.state.get() }
    }

    /// # Safety
    /// Caller holds interrupts disabled or the kernel paused; `current`
    /// points at the thread actually executing this call.
    pub unsafe fn lock(&self, current: NonNull<Thread>) -> LockOutcome {
        let state = self.state();
        match state.owner {
            None => {
                state.owner = Some(current);
                state.depth = 1;
                LockOutcome::Acquired
            }
            Some(owner) if owner == current => {
                if state.recursive {
                    state.depth += 1;
                    LockOutcome::Acquired
                } else {
                    LockOutcome::Deadlock
                }
            }
            Some(_) => {
                let cur = &mut *current.as_ptr();
                cur.set_run_state(ThreadFlags::WAITING);
                state.waiting.push_back(current);
                LockOutcome::Blocked
            }
        }
    }

    /// # Safety
    /// Same as [`Self::lock`].
    pub unsafe fn try_lock(&self, current: NonNull<Thread>) -> LockOutcome {
        let state = self.state();
        match state.owner {
            None => self.lock(current),
            Some(owner) if owner == current && state.recursive => {
                state.depth += 1;
                LockOutcome::Acquired
            }
            _ => LockOutcome::Deadlock,
        }
    }

    /// Returns the thread that became the new owner, if any, so the
    /// dispatcher can mark it ready.
    ///
    /// # Safety
    /// Same as [`Self::lock`]; `current` must be the recorded owner.
    pub unsafe fn unlock(&self, current: NonNull<Thread>) -> Option<crate::thread::ThreadId> {
        let state = self.state();
        debug_assert_eq!(state.owner, Some(current));
        if state.depth > 1 {
            state.depth -= 1;
            return None;
        }
        state.depth = 0;
        match state.waiting.pop_front() {
            None => {
                state.owner = None;
                None
            }
            Some(next) => {
                state.owner = Some(next);
                state.depth = 1;
                let next_ref = &mut *next.as_ptr();
                next_ref.set_run_state(ThreadFlags::READY);
                Some(next_ref.id)
            }
        }
    }
}
