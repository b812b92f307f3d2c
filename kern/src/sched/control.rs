//! Control-based scheduling: `abi::RealtimeClass` dominates ordering
//! (handled generically by `kerncore::priority::scheduling_order`), and a
//! thread's time slice is proportional to its priority within
//! `config::BURST_MIN..=BURST_MAX`, so more important threads still get
//! longer uninterrupted bursts once they're the ones running. After a burst
//! completes, an `Immediate`-class thread demotes to `NextBurst` and a
//! `NextBurst` thread demotes to `EndOfRound`, so that within one "round" no
//! class starves the ones behind it; `reset_for_new_round` restores
//! everyone to `Immediate` at the start of the next round.

use abi::RealtimeClass;

use crate::config::{BURST_MAX, BURST_MIN, PRIORITY_MAX, PRIORITY_MIN};
use crate::thread::Thread;

pub fn time_slice(thread: &Thread) -> u32 {
    let highest = (PRIORITY_MAX - 1) as u32;
    let span = highest - PRIORITY_MIN as u32;
    if span == 0 {
        return BURST_MAX;
    }
    let importance = (thread.priority().0 as u32).saturating_sub(PRIORITY_MIN as u32);
    BURST_MIN + (BURST_MAX - BURST_MIN) * importance / span
}

/// Demotes `thread`'s realtime class by one step at the end of its burst.
pub fn demote_after_burst(thread: &mut Thread) {
    thread.realtime_class = Some(match thread.realtime_class.unwrap_or(RealtimeClass::EndOfRound) {
        RealtimeClass::Immediate => RealtimeClass::NextBurst,
        RealtimeClass::NextBurst | RealtimeClass::EndOfRound => RealtimeClass::EndOfRound,
    });
}

/// Restores every thread to `Immediate` at the start of a new scheduling
/// round, once everyone has had their `EndOfRound` turn.
pub fn reset_for_new_round(threads: &mut [Thread]) {
    for t in threads {
        t.realtime_class = Some(RealtimeClass::Immediate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadId;
    use abi::Priority;

    #[test]
    fn demotion_steps_through_classes_and_stops() {
        let mut t = Thread::new(ThreadId(0), None, 0, 0, Priority(PRIORITY_MIN), false);
        t.realtime_class = Some(RealtimeClass::Immediate);
        demote_after_burst(&mut t);
        assert_eq!(t.realtime_class, Some(RealtimeClass::NextBurst));
        demote_after_burst(&mut t);
        assert_eq!(t.realtime_class, Some(RealtimeClass::EndOfRound));
        demote_after_burst(&mut t);
        assert_eq!(t.realtime_class, Some(RealtimeClass::EndOfRound));
    }

    #[test]
    fn higher_priority_gets_longer_burst() {
        let high = Thread::new(ThreadId(0), None, 0, 0, Priority(PRIORITY_MAX - 1), false);
        let low = Thread::new(ThreadId(1), None, 0, 0, Priority(PRIORITY_MIN), false);
        assert!(time_slice(&high) >= time_slice(&low));
    }
}
