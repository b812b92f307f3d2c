//! Earliest-deadline-first scheduling: ordering is handled generically by
//! `kerncore::priority::scheduling_order` comparing `Thread::deadline`, so
//! this module only covers deadline bookkeeping that EDF-specific code
//! (periodic task release, deadline-miss detection) needs.

use crate::thread::Thread;
use crate::time::Timestamp;

/// Assigns `thread`'s next absolute deadline, `period` ticks from `now`.
/// Called when a periodic thread is released for its next job.
pub fn release(thread: &mut Thread, now: Timestamp, period: u64) {
    thread.deadline = now.checked_add(period);
}

/// Whether `thread` is past its own deadline as of `now` — a schedulability
/// violation the caller may want to log or fault on, depending on policy.
pub fn missed_deadline(thread: &Thread, now: Timestamp) -> bool {
    thread.deadline.is_some_and(|d| now > d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadId;
    use abi::Priority;

    #[test]
    fn release_sets_deadline_relative_to_now() {
        let mut t = Thread::new(ThreadId(0), None, 0, 0, Priority(0), false);
        release(&mut t, Timestamp::from(100), 50);
        assert_eq!(t.deadline, Some(Timestamp::from(150)));
    }

    #[test]
    fn missed_deadline_detects_overrun() {
        let mut t = Thread::new(ThreadId(0), None, 0, 0, Priority(0), false);
        t.deadline = Some(Timestamp::from(100));
        assert!(!missed_deadline(&t, Timestamp::from(100)));
        assert!(missed_deadline(&t, Timestamp::from(101)));
    }
}
