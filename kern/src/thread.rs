//! Threads: per-thread state, the `NextTask` scheduling hint, and forced
//! faults. Grounded on the teacher's `sys/kern/src/task.rs`, adapted from a
//! "one task = one process = one priority" IPC model to a kernel that has
//! many lightweight threads (possibly several per process) blocking on
//! mutexes, condition variables, and semaphores.

use core::ptr::NonNull;

use abi::{FaultData, Priority, RealtimeClass, SchedulingParams};
use intrusive::{ArcIntrusive, Link, Linked};

use crate::process::Process;
use crate::sync::condvar::ConditionVariable;
use crate::sync::mutex::Mutex;
use crate::sync::semaphore::Semaphore;
use crate::time::Timestamp;

bitflags::bitflags! {
    /// Exactly one of READY/SLEEPING/WAITING/WAITING_ON_JOIN holds at a time
    /// (the "exactly one of {ready, sleeping, waiting}" invariant); DELETED,
    /// DETACHED, and USERSPACE are independent of that and of each other.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ThreadFlags: u32 {
        const READY             = 1 << 0;
        const SLEEPING          = 1 << 1;
        /// Blocked on a mutex, a condition variable, or a semaphore; linked
        /// into that primitive's wait list via `Thread::wait_link`.
        const WAITING           = 1 << 2;
        const WAITING_ON_JOIN   = 1 << 3;
        const DELETED           = 1 << 4;
        const DETACHED          = 1 << 5;
        const USERSPACE         = 1 << 6;
    }
}

const RUN_STATE_MASK: ThreadFlags = ThreadFlags::READY
    .union(ThreadFlags::SLEEPING)
    .union(ThreadFlags::WAITING)
    .union(ThreadFlags::WAITING_ON_JOIN);

/// Index into the kernel's thread table. Threads are never moved once
/// created, so this is stable for the thread's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

/// Tag type for the scheduler's sleep list (a thread blocked in `sleep` or in
/// a timed wait lives here, linked through `Thread::sleep_link`).
pub struct SleepTag;
/// Tag type for a mutex/condvar/semaphore FIFO wait list (a thread can only
/// be waiting on one such primitive at a time, so one link field suffices).
pub struct WaitTag;
/// Tag type for the list of mutexes a thread currently owns (link lives in
/// `Mutex`, not here; this tag exists so `Thread`'s `mutex_locked` field has
/// a name distinct from the wait list).
pub struct OwnedMutexesTag;

/// The primitive a `wakeup_time`-bearing timed wait belongs to.
#[derive(Clone, Copy)]
pub enum TimeoutTarget {
    Condvar(NonNull<ConditionVariable>),
    Semaphore(NonNull<Semaphore>),
}

/// Return value of an operation that may require the scheduler to run again.
/// `#[must_use]` because silently discarding a `NextTask::Other`/`Specific`
/// would leave a higher-priority thread starved until the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum NextTask {
    /// Whatever was running may keep running.
    Same,
    /// A reschedule is needed but the caller doesn't know (or care) which
    /// thread should run next; the scheduler decides.
    Other,
    /// A reschedule is needed and the caller already knows which thread
    /// should run: an optimization available when e.g. releasing a mutex
    /// hands ownership straight to a specific waiter.
    Specific(usize),
}

impl NextTask {
    /// Combines two scheduling hints produced by independent operations into
    /// one. Disagreeing `Specific` recommendations downgrade to `Other`
    /// rather than silently picking one.
    pub fn combine(self, other: Self) -> Self {
        use NextTask::*;
        match (self, other) {
            (x, y) if x == y => x,
            (Specific(_), Specific(_)) => Other,
            (Specific(x), _) | (_, Specific(x)) => Specific(x),
            (Other, _) | (_, Other) => Other,
            (Same, Same) => Same,
        }
    }
}

/// A kernel or user thread.
pub struct Thread {
    pub id: ThreadId,
    /// Optional name, purely for diagnostics (ring-buffer traces, debugging).
    name: Option<&'static str>,

    pub ctxsave: crate::arch::SavedState,

    stack_bottom: usize,
    stack_size: usize,

    /// Effective priority: `saved_priority` boosted by priority inheritance.
    /// Meaningful under every scheduler; under EDF it tracks the deadline
    /// instead (see `scheduling_params`).
    priority: Priority,
    /// Priority absent inheritance; restored when the last inherited-from
    /// mutex is released.
    saved_priority: Priority,
    /// Set only when the control-based scheduler is active.
    pub realtime_class: Option<RealtimeClass>,
    /// Set only when the EDF scheduler is active.
    pub deadline: Option<Timestamp>,

    pub flags: ThreadFlags,

    /// Valid while `flags` contains SLEEPING (or while waiting with a
    /// timeout): the time at which this thread should be woken regardless of
    /// a signal.
    pub wakeup_time: Option<Timestamp>,

    /// Mutexes currently owned by this thread, for priority-inheritance
    /// bookkeeping on unlock. The link field lives in `Mutex`.
    pub mutex_locked: intrusive::IntrusiveList<Mutex, OwnedMutexesTag>,
    /// The mutex this thread is blocked on, if any.
    pub mutex_waiting: Option<NonNull<Mutex>>,
    /// Set by `ConditionVariable::wait`/`timed_wait` when this thread is
    /// woken from a condvar's wait list: the mutex (and recursion depth) it
    /// must reacquire before the blocking call can return to user code. The
    /// scheduler consults this when the thread becomes READY; if
    /// reacquiring blocks again, this is cleared and the thread goes back to
    /// `WAITING` on the mutex's own list instead.
    pub pending_relock: Option<(NonNull<Mutex>, u32)>,
    /// Which timed wait, if any, `wakeup_time` belongs to. Lets the
    /// scheduler's timeout processing find and remove this thread from the
    /// right primitive's wait list when the deadline elapses, without
    /// needing to know in advance what kind of primitive it was waiting on.
    pub timeout_target: Option<TimeoutTarget>,

    /// Set by `join()`'s target when it exits, read by the joiner.
    pub join_result: Option<i32>,
    /// Set while `flags` contains WAITING_ON_JOIN: which thread this one is
    /// waiting to exit. Consulted by `thread::exit` to find and wake a
    /// waiting joiner without a linked list (joins are rare enough that a
    /// linear scan of the thread table is fine, matching the teacher's
    /// scan-based `task.rs` style rather than adding another intrusive
    /// list).
    pub join_target: Option<ThreadId>,

    pub process: Option<ArcIntrusive<Process>>,

    sleep_link: Link<Thread>,
    wait_link: Link<Thread>,
}

// Safety: a `Thread` is only ever reached through kernel-owned pointers
// manipulated with interrupts disabled or the scheduler paused; there is no
// aliasing across real concurrent execution on this single-core target.
unsafe impl Send for Thread {}

impl Thread {
    pub fn new(
        id: ThreadId,
        name: Option<&'static str>,
        stack_bottom: usize,
        stack_size: usize,
        priority: Priority,
        detached: bool,
    ) -> Self {
        let mut flags = ThreadFlags::READY;
        if detached {
            flags |= ThreadFlags::DETACHED;
        }
        Thread {
            id,
            name,
            ctxsave: Default::default(),
            stack_bottom,
            stack_size,
            priority,
            saved_priority: priority,
            realtime_class: None,
            deadline: None,
            flags,
            wakeup_time: None,
            mutex_locked: intrusive::IntrusiveList::new(),
            mutex_waiting: None,
            pending_relock: None,
            timeout_target: None,
            join_result: None,
            join_target: None,
            process: None,
            sleep_link: Link::new(),
            wait_link: Link::new(),
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    pub fn set_name(&mut self, name: &'static str) {
        self.name = Some(name);
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn saved_priority(&self) -> Priority {
        self.saved_priority
    }

    /// Sets both the effective and saved priority, as happens when a thread
    /// changes its own base priority outside of any inheritance chain.
    pub fn set_base_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.saved_priority = priority;
    }

    /// Sets only the effective priority, as happens during priority
    /// inheritance; `saved_priority` is left untouched so it can be restored
    /// later.
    pub fn set_effective_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// The scheduling-parameter view of this thread's priority/deadline,
    /// shaped for comparison with `kerncore::scheduling_order` /
    /// `is_more_urgent`. Which variant is produced is a build-time choice
    /// matching `kern::config::ACTIVE_SCHEDULER`.
    pub fn scheduling_params(&self) -> SchedulingParams {
        cfg_if::cfg_if! {
            if #[cfg(feature = "sched-edf")] {
                SchedulingParams::Edf { deadline: self.deadline.map(u64::from).unwrap_or(u64::MAX) }
            } else if #[cfg(feature = "sched-control")] {
                SchedulingParams::Control {
                    priority: self.priority.0,
                    realtime_class: self.realtime_class.unwrap_or(abi::RealtimeClass::EndOfRound),
                }
            } else {
                SchedulingParams::Fixed { priority: self.priority.0 }
            }
        }
    }

    pub fn is_runnable(&self) -> bool {
        !self.flags.intersects(ThreadFlags::DELETED)
            && self.flags.contains(ThreadFlags::READY)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(ThreadFlags::DELETED)
    }

    pub fn is_detached(&self) -> bool {
        self.flags.contains(ThreadFlags::DETACHED)
    }

    /// Moves this thread into `state`, clearing whichever of
    /// READY/SLEEPING/WAITING_ON_COND/WAITING_ON_JOIN it previously held.
    pub fn set_run_state(&mut self, state: ThreadFlags) {
        debug_assert!(RUN_STATE_MASK.contains(state) && (state & !RUN_STATE_MASK).is_empty());
        self.flags = (self.flags & !RUN_STATE_MASK) | state;
    }

    pub fn stack_range(&self) -> (usize, usize) {
        (self.stack_bottom, self.stack_size)
    }

    /// Checks the stack watermark pattern at the bottom of the stack,
    /// returning `false` if it has been overwritten (stack overflow).
    ///
    /// # Safety
    /// `self.stack_bottom` must point at `self.stack_size` bytes of memory
    /// this thread owns exclusively.
    pub unsafe fn check_watermark(&self) -> bool {
        let words = self.stack_bottom as *const u32;
        (0..crate::config::WATERMARK_LEN).all(|i| {
            core::ptr::read_volatile(words.add(i)) == crate::config::WATERMARK_FILL
        })
    }
}

impl Linked<SleepTag> for Thread {
    fn link(&self) -> &Link<Self> {
        &self.sleep_link
    }
}

impl Linked<WaitTag> for Thread {
    fn link(&self) -> &Link<Self> {
        &self.wait_link
    }
}

/// Puts the thread at `index` into a forced fault condition: if it belongs
/// to a process, the fault is recorded on the process and the thread is
/// marked DELETED (the process continues if other threads remain); if it's
/// a bare kernel thread, a fault is fatal to the whole system.
///
/// Returns a `NextTask` hint on the assumption that the faulting thread is
/// often the currently-running one.
pub fn force_fault(threads: &mut [Thread], index: usize, fault: FaultData) -> NextTask {
    let had_process = threads[index].process.is_some();
    if !had_process {
        crate::fail::kernel_halt(format_args!("kernel thread fault: {:?}", fault.kind));
    }
    threads[index].flags |= ThreadFlags::DELETED;
    threads[index].flags &= !ThreadFlags::READY;
    if let Some(process) = &threads[index].process {
        process.record_fault(fault);
    }
    NextTask::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: usize, prio: u8) -> Thread {
        Thread::new(ThreadId(id), None, 0, 0, Priority(prio), false)
    }

    #[test]
    fn next_task_combine_prefers_agreement() {
        assert_eq!(NextTask::Same.combine(NextTask::Same), NextTask::Same);
        assert_eq!(NextTask::Other.combine(NextTask::Same), NextTask::Other);
        assert_eq!(NextTask::Same.combine(NextTask::Other), NextTask::Other);
    }

    #[test]
    fn next_task_combine_disagreeing_specifics_downgrade() {
        assert_eq!(
            NextTask::Specific(1).combine(NextTask::Specific(2)),
            NextTask::Other
        );
        assert_eq!(
            NextTask::Specific(1).combine(NextTask::Specific(1)),
            NextTask::Specific(1)
        );
    }

    #[test]
    fn next_task_combine_specific_wins_over_other_or_same() {
        assert_eq!(
            NextTask::Specific(3).combine(NextTask::Same),
            NextTask::Specific(3)
        );
        assert_eq!(
            NextTask::Other.combine(NextTask::Specific(3)),
            NextTask::Specific(3)
        );
    }

    #[test]
    fn new_thread_starts_ready_with_matching_saved_priority() {
        let t = thread(0, 5);
        assert!(t.is_runnable());
        assert_eq!(t.priority(), t.saved_priority());
    }

    #[test]
    fn set_run_state_clears_previous_run_state_only() {
        let mut t = thread(0, 5);
        t.flags |= ThreadFlags::DETACHED;
        t.set_run_state(ThreadFlags::SLEEPING);
        assert!(t.flags.contains(ThreadFlags::SLEEPING));
        assert!(!t.flags.contains(ThreadFlags::READY));
        assert!(t.flags.contains(ThreadFlags::DETACHED));
    }

    #[test]
    fn effective_priority_can_diverge_from_saved_during_inheritance() {
        let mut t = thread(0, 10);
        t.set_effective_priority(Priority(2));
        assert_eq!(t.priority(), Priority(2));
        assert_eq!(t.saved_priority(), Priority(10));
    }
}
