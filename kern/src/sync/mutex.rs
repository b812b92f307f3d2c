//! A priority-inheriting mutex.
//!
//! Grounded on `Mutex::PKlock`/`PKtryLock`/`PKunlock`/
//! `PKunlockAllDepthLevels` in
//! `examples/original_source/miosix/kernel/sync.cpp`. That code runs its
//! wait loop inline (`do { IRQwait(); yield(); } while(owner != self)`)
//! because every thread there keeps its own call stack across a context
//! switch. Here the kernel/scheduler boundary is explicit (as in the
//! teacher's `task.rs`/`kipc.rs` split): these methods are single-shot state
//! transitions over the thread table, reporting an outcome instead of
//! blocking in place. The syscall dispatcher owns the actual suspend step,
//! parking the thread and later, once it's rescheduled, driving the
//! continuation (a condvar rewait's reacquire, in particular) by calling
//! back in.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use intrusive::{Link, Linked};

use crate::thread::{OwnedMutexesTag, Thread, ThreadFlags, WaitTag};

/// Result of attempting to lock a [`Mutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller now owns the mutex.
    Acquired,
    /// The mutex was held by someone else; the caller has been enqueued on
    /// its wait list and marked `WAITING`. The dispatcher must switch away.
    Blocked,
    /// The caller already owns this (non-recursive) mutex.
    Deadlock,
}

struct MutexState {
    owner: Option<NonNull<Thread>>,
    recursive: bool,
    depth: u32,
    waiting: intrusive::IntrusiveList<Thread, WaitTag>,
}

/// Meant to be a static or global object, exactly like the original: the
/// kernel doesn't allocate or free these, and nothing here assumes it can
/// move once threads start referencing it through `Thread::mutex_waiting`.
pub struct Mutex {
    link: Link<Mutex>,
    state: UnsafeCell<MutexState>,
}

// Safety: every method requires the caller to hold interrupts disabled or
// the kernel paused, which on this single-core target serializes all access.
unsafe impl Sync for Mutex {}

impl Linked<OwnedMutexesTag> for Mutex {
    fn link(&self) -> &Link<Self> {
        &self.link
    }
}

impl Mutex {
    pub const fn new(recursive: bool) -> Self {
        Mutex {
            link: Link::new(),
            state: UnsafeCell::new(MutexState {
                owner: None,
                recursive,
                depth: 0,
                waiting: intrusive::IntrusiveList::new(),
            }),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut MutexState {
        unsafe { &mut *self.state.get() }
    }

    pub fn is_locked(&self) -> bool {
        self.state().owner.is_some()
    }

    /// Priority of the most important thread currently waiting, if any.
    pub fn highest_waiter_priority(&self) -> Option<abi::Priority> {
        let front = self.state().waiting.front()?;
        Some(unsafe { front.as_ref() }.priority())
    }

    /// # Safety
    /// Caller holds interrupts disabled or the kernel paused; `current`
    /// points at the thread actually executing this call.
    pub unsafe fn lock(&self, current: NonNull<Thread>) -> LockOutcome {
        self.lock_to_depth(current, 1)
    }

    /// As [`Self::lock`], but on immediate acquisition sets the recursion
    /// depth to `depth` instead of 1. Used by
    /// [`super::condvar::ConditionVariable::wait`]'s reacquire step to
    /// restore the depth that was released by
    /// [`Self::unlock_all_depth_levels`].
    ///
    /// # Safety
    /// Same as [`Self::lock`].
    pub unsafe fn lock_to_depth(&self, current: NonNull<Thread>, depth: u32) -> LockOutcome {
        let state = self.state();
        match state.owner {
            None => {
                state.owner = Some(current);
                state.depth = depth;
                (*current.as_ptr()).mutex_locked.push_back(NonNull::from(self));
                LockOutcome::Acquired
            }
            Some(owner) if owner == current => {
                if state.recursive {
                    state.depth += depth;
                    LockOutcome::Acquired
                } else {
                    LockOutcome::Deadlock
                }
            }
            Some(owner) => {
                let cur = &mut *current.as_ptr();
                let waiter_priority = cur.priority();
                cur.set_run_state(ThreadFlags::WAITING);
                cur.mutex_waiting = Some(NonNull::from(self));
                state
                    .waiting
                    .insert_ordered(current, |node| waiter_priority.is_more_important_than(&node.priority()));
                inherit_priority(owner, waiter_priority);
                LockOutcome::Blocked
            }
        }
    }

    /// Non-blocking: acquires the mutex only if it is free or already held
    /// by `current`.
    ///
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

    /// Releases one level of recursion. Returns `NextTask::Same` if the
    /// caller still owns the mutex afterward (a deeper recursive lock was
    /// released) or nothing else was waiting; otherwise names the waiter
    /// that became the new owner, for the dispatcher to weigh against the
    /// caller's restored priority.
    ///
    /// # Safety
    /// Same as [`Self::lock`]; `current` must be the recorded owner.
    pub unsafe fn unlock(&self, current: NonNull<Thread>) -> UnlockOutcome {
        let state = self.state();
        debug_assert_eq!(state.owner, Some(current));
        if state.depth > 1 {
            state.depth -= 1;
            return UnlockOutcome::StillOwned;
        }
        self.release(current)
    }

    /// Releases every level of recursion at once, returning the depth the
    /// caller must pass back to [`Self::lock_to_depth`] to restore it.
    /// Grounded on `PKunlockAllDepthLevels`, used by
    /// [`super::condvar::ConditionVariable::wait`].
    ///
    /// # Safety
    /// Same as [`Self::unlock`].
    pub unsafe fn unlock_all_depth_levels(&self, current: NonNull<Thread>) -> (u32, UnlockOutcome) {
        let depth = self.state().depth;
        (depth, self.release(current))
    }

    unsafe fn release(&self, current: NonNull<Thread>) -> UnlockOutcome {
        let state = self.state();
        let cur = &mut *current.as_ptr();
        cur.mutex_locked.remove(NonNull::from(self));

        let mut restored = cur.saved_priority();
        for held in cur.mutex_locked.iter() {
            if let Some(w) = held.highest_waiter_priority() {
                restored = restored.most_important_of(&w);
            }
        }
        cur.set_effective_priority(restored);
        state.depth = 0;

        match state.waiting.pop_front() {
            None => {
                state.owner = None;
                UnlockOutcome::Released
            }
            Some(next) => {
                state.owner = Some(next);
                state.depth = 1;
                let next_ref = &mut *next.as_ptr();
                next_ref.mutex_waiting = None;
                next_ref.set_run_state(ThreadFlags::READY);
                next_ref.mutex_locked.push_back(NonNull::from(self));
                if let Some(still_waiting) = self.highest_waiter_priority() {
                    if still_waiting.is_more_important_than(&next_ref.priority()) {
                        next_ref.set_effective_priority(still_waiting);
                    }
                }
                let should_yield = next_ref.priority().is_more_important_than(&restored);
                UnlockOutcome::Woke { thread: next_ref.id, should_yield }
            }
        }
    }
}

/// Boosts `owner` to `waiter_priority` if that's more important than its
/// current priority, and propagates the boost transitively through any
/// mutex `owner` is itself blocked on, re-sorting that mutex's wait list to
/// match (`PKlock`'s "walk the chain" loop).
unsafe fn inherit_priority(mut owner: NonNull<Thread>, waiter_priority: abi::Priority) {
    loop {
        let owner_ref = &mut *owner.as_ptr();
        if !waiter_priority.is_more_important_than(&owner_ref.priority()) {
            return;
        }
        owner_ref.set_effective_priority(waiter_priority);
        let Some(blocking_mutex) = owner_ref.mutex_waiting else { return };
        let blocking_state = (*blocking_mutex.as_ptr()).state();
        blocking_state.waiting.remove(owner);
        blocking_state
            .waiting
            .insert_ordered(owner, |node| node.priority().is_more_important_than(&waiter_priority));
        match blocking_state.owner {
            Some(next_owner) => owner = next_owner,
            None => return,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The caller still owns the mutex (a recursive level was released).
    StillOwned,
    /// The mutex is now free; nobody was waiting.
    Released,
    /// A waiter became the new owner. `should_yield` mirrors
    /// `mutexLessOp`: the caller's own restored priority is less important
    /// than the new owner's, so the caller should give it the CPU now.
    Woke { thread: crate::thread::ThreadId, should_yield: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadId;
    use abi::Priority;

    fn thread(id: usize, prio: u8) -> Thread {
        Thread::new(ThreadId(id), None, 0, 0, Priority(prio), false)
    }

    #[test]
    fn lock_when_free_succeeds_immediately() {
        let m = Mutex::new(false);
        let mut a = thread(0, 10);
        let a_ptr = NonNull::from(&mut a);
        unsafe {
            assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
            assert!(m.is_locked());
        }
    }

    #[test]
    fn second_locker_blocks_and_queues() {
        let m = Mutex::new(false);
        let mut a = thread(0, 10);
        let mut b = thread(1, 5);
        let a_ptr = NonNull::from(&mut a);
        let b_ptr = NonNull::from(&mut b);
        unsafe {
            assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
            assert_eq!(m.lock(b_ptr), LockOutcome::Blocked);
            assert!(b.flags.contains(ThreadFlags::WAITING));
            assert_eq!(m.highest_waiter_priority(), Some(Priority(5)));
        }
    }

    #[test]
    fn non_recursive_relock_by_owner_deadlocks() {
        let m = Mutex::new(false);
        let mut a = thread(0, 10);
        let a_ptr = NonNull::from(&mut a);
        unsafe {
            assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
            assert_eq!(m.lock(a_ptr), LockOutcome::Deadlock);
        }
    }

    #[test]
    fn recursive_mutex_tracks_depth() {
        let m = Mutex::new(true);
        let mut a = thread(0, 10);
        let a_ptr = NonNull::from(&mut a);
        unsafe {
            assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
            assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
            assert_eq!(m.unlock(a_ptr), UnlockOutcome::StillOwned);
            assert_eq!(m.unlock(a_ptr), UnlockOutcome::Released);
        }
    }

    #[test]
    fn unlock_wakes_highest_priority_waiter() {
        let m = Mutex::new(false);
        let mut a = thread(0, 10);
        let mut low = thread(1, 20);
        let mut high = thread(2, 1);
        let a_ptr = NonNull::from(&mut a);
        let low_ptr = NonNull::from(&mut low);
        let high_ptr = NonNull::from(&mut high);
        unsafe {
            assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
            assert_eq!(m.lock(low_ptr), LockOutcome::Blocked);
            assert_eq!(m.lock(high_ptr), LockOutcome::Blocked);
            match m.unlock(a_ptr) {
                UnlockOutcome::Woke { thread, should_yield } => {
                    assert_eq!(thread, ThreadId(2));
                    assert!(should_yield);
                }
                other => panic!("expected Woke, got {other:?}"),
            }
            assert!(high.flags.contains(ThreadFlags::READY));
            assert!(!high.flags.contains(ThreadFlags::WAITING));
        }
    }

    #[test]
    fn blocking_on_held_mutex_boosts_owner_priority() {
        let m = Mutex::new(false);
        let mut a = thread(0, 20);
        let mut b = thread(1, 1);
        let a_ptr = NonNull::from(&mut a);
        let b_ptr = NonNull::from(&mut b);
        unsafe {
            assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
            assert_eq!(m.lock(b_ptr), LockOutcome::Blocked);
            assert_eq!(a.priority(), Priority(1));
            assert_eq!(a.saved_priority(), Priority(20));
        }
    }
}
