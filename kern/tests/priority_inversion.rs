//! Cross-module scenario tests driving `kern::sync::mutex::Mutex` and
//! `kern::thread::Thread` together the way `kern::syscalls`'s `MutexLock`/
//! `MutexUnlock`/`CondSignal` handlers do, without going through the
//! syscall dispatcher itself. Priorities follow this kernel's convention
//! (a higher `Priority` value is more important), the same one exercised by
//! `kern::sync::mutex`'s own unit tests.

use std::ptr::NonNull;

use abi::Priority;
use kern::sync::condvar::ConditionVariable;
use kern::sync::mutex::{LockOutcome, Mutex, UnlockOutcome};
use kern::thread::{Thread, ThreadFlags, ThreadId};

fn thread(id: usize, prio: u8) -> Thread {
    Thread::new(ThreadId(id), None, 0, 0, Priority(prio), false)
}

/// The trace from the priority-inversion scenario: L holds a mutex H wants,
/// M is ready at a priority in between the two and must not run until H is
/// done, and L's effective priority is boosted for exactly as long as it
/// blocks H.
#[test]
fn low_priority_holder_is_boosted_until_high_priority_waiter_is_served() {
    let x = Mutex::new(false);
    let mut l = thread(0, 1); // least important
    let mut m = thread(1, 2); // middle
    let mut h = thread(2, 3); // most important
    let l_ptr = NonNull::from(&mut l);
    let h_ptr = NonNull::from(&mut h);

    let mut trace = Vec::new();

    // L_run: L takes the mutex first.
    unsafe {
        assert_eq!(x.lock(l_ptr), LockOutcome::Acquired);
    }
    trace.push("L_run");

    // H_block: H wants the mutex and blocks behind L.
    unsafe {
        assert_eq!(x.lock(h_ptr), LockOutcome::Blocked);
    }
    trace.push("H_block");
    assert!(h.flags.contains(ThreadFlags::WAITING));

    // L_boost_3: L's effective priority is now H's.
    assert_eq!(l.priority(), Priority(3));
    assert_eq!(l.saved_priority(), Priority(1));
    trace.push("L_boost_3");

    // M becomes ready in the meantime; it must not preempt L, since L is
    // (transitively) running on H's behalf.
    m.set_run_state(ThreadFlags::READY);
    assert!(l.priority().is_more_important_than(&m.priority()));

    // L_unlock: ownership passes straight to H; L's priority is restored.
    let outcome = unsafe { x.unlock(l_ptr) };
    trace.push("L_unlock");
    match outcome {
        UnlockOutcome::Woke { thread, should_yield } => {
            assert_eq!(thread, ThreadId(2));
            assert!(should_yield);
        }
        other => panic!("expected L's unlock to wake H, got {other:?}"),
    }
    assert_eq!(l.priority(), Priority(1));
    assert!(h.flags.contains(ThreadFlags::READY));

    // H_run / H_finish: H now owns the mutex uncontested.
    trace.push("H_run");
    assert_eq!(unsafe { x.unlock(h_ptr) }, UnlockOutcome::Released);
    trace.push("H_finish");

    // M_run: only now is M the most important ready thread left.
    trace.push("M_run");
    assert!(m.priority().is_more_important_than(&l.priority()));

    assert_eq!(trace, ["L_run", "H_block", "L_boost_3", "L_unlock", "H_run", "H_finish", "M_run"]);
}

/// Multiple waiters at different priorities queue strictly in priority
/// order regardless of arrival order, and same-priority waiters stay FIFO.
#[test]
fn waiters_are_served_in_priority_order_then_fifo() {
    let x = Mutex::new(false);
    let mut owner = thread(0, 5);
    let mut first = thread(1, 20);
    let mut second = thread(2, 20);
    let mut urgent = thread(3, 30);
    let owner_ptr = NonNull::from(&mut owner);
    let first_ptr = NonNull::from(&mut first);
    let second_ptr = NonNull::from(&mut second);
    let urgent_ptr = NonNull::from(&mut urgent);

    unsafe {
        assert_eq!(x.lock(owner_ptr), LockOutcome::Acquired);
        assert_eq!(x.lock(first_ptr), LockOutcome::Blocked);
        assert_eq!(x.lock(second_ptr), LockOutcome::Blocked);
        assert_eq!(x.lock(urgent_ptr), LockOutcome::Blocked);
    }

    // Most important waiter served first...
    match unsafe { x.unlock(owner_ptr) } {
        UnlockOutcome::Woke { thread, .. } => assert_eq!(thread, ThreadId(3)),
        other => panic!("expected Woke, got {other:?}"),
    }
    // ...then the two equal-priority waiters in arrival order.
    match unsafe { x.unlock(urgent_ptr) } {
        UnlockOutcome::Woke { thread, .. } => assert_eq!(thread, ThreadId(1)),
        other => panic!("expected Woke, got {other:?}"),
    }
    match unsafe { x.unlock(first_ptr) } {
        UnlockOutcome::Woke { thread, .. } => assert_eq!(thread, ThreadId(2)),
        other => panic!("expected Woke, got {other:?}"),
    }
    assert_eq!(unsafe { x.unlock(second_ptr) }, UnlockOutcome::Released);
}

/// A signal sent while the waiter's reacquire would still block must not be
/// lost just because the waiter can't resume immediately: once the mutex
/// frees up, the waiter finishes the handoff without needing a second
/// signal.
#[test]
fn signal_survives_a_relock_that_has_to_block() {
    let m = Mutex::new(false);
    let cv = ConditionVariable::new();
    let mut a = thread(0, 10);
    let mut b = thread(1, 10);
    let a_ptr = NonNull::from(&mut a);
    let b_ptr = NonNull::from(&mut b);

    unsafe {
        assert_eq!(m.lock(a_ptr), LockOutcome::Acquired);
        cv.wait(a_ptr, &m);
        // b grabs the now-free mutex before a is signaled.
        assert_eq!(m.lock(b_ptr), LockOutcome::Acquired);
        // b signals; a's relock attempt blocks behind b instead of
        // completing, but the wakeup itself is not lost.
        assert!(!cv.signal(b.priority()));
    }
    assert!(a.flags.contains(ThreadFlags::WAITING));
    assert_eq!(a.mutex_waiting, Some(NonNull::from(&m)));
    assert!(a.pending_relock.is_none());

    // When b releases, a finally gets the mutex it was signaled for --
    // no second signal was required.
    match unsafe { m.unlock(b_ptr) } {
        UnlockOutcome::Woke { thread, .. } => assert_eq!(thread, ThreadId(0)),
        other => panic!("expected a to inherit the mutex, got {other:?}"),
    }
    assert!(a.flags.contains(ThreadFlags::READY));
}
