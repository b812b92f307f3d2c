//! Urgency comparisons for the three selectable scheduling policies. Each
//! policy orders its own [`abi::SchedulingParams`] variant; comparing across
//! variants is a caller bug (a single build only ever instantiates one kind)
//! and is reported as `None` rather than panicking, so kernel code can
//! `debug_assert` on it instead of trusting an `unwrap`.

use abi::{RealtimeClass, SchedulingParams};
use core::cmp::Ordering;

fn realtime_class_rank(class: RealtimeClass) -> u8 {
    match class {
        RealtimeClass::Immediate => 0,
        RealtimeClass::NextBurst => 1,
        RealtimeClass::EndOfRound => 2,
    }
}

/// Orders two scheduling parameters of the same kind by urgency.
/// `Ordering::Greater` means `a` is more urgent (should run first) than `b`.
/// Returns `None` if `a` and `b` are different kinds of [`SchedulingParams`].
pub fn scheduling_order(a: &SchedulingParams, b: &SchedulingParams) -> Option<Ordering> {
    match (a, b) {
        (
            SchedulingParams::Fixed { priority: pa },
            SchedulingParams::Fixed { priority: pb },
        ) => {
            // Higher numeric priority is more important.
            Some(pa.cmp(pb))
        }
        (
            SchedulingParams::Control { priority: pa, realtime_class: ca },
            SchedulingParams::Control { priority: pb, realtime_class: cb },
        ) => {
            // Realtime class dominates; priority only breaks ties within a
            // class, higher numeric priority winning.
            let class_order = realtime_class_rank(*cb).cmp(&realtime_class_rank(*ca));
            Some(class_order.then_with(|| pa.cmp(pb)))
        }
        (
            SchedulingParams::Edf { deadline: da },
            SchedulingParams::Edf { deadline: db },
        ) => {
            // Earlier deadline is more urgent.
            Some(db.cmp(da))
        }
        _ => None,
    }
}

/// Convenience wrapper: is `a` strictly more urgent than `b`?
pub fn is_more_urgent(a: &SchedulingParams, b: &SchedulingParams) -> bool {
    matches!(scheduling_order(a, b), Some(Ordering::Greater))
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::SchedulingParams::*;

    #[test]
    fn fixed_higher_number_wins() {
        let high = Fixed { priority: 5 };
        let low = Fixed { priority: 1 };
        assert!(is_more_urgent(&high, &low));
        assert!(!is_more_urgent(&low, &high));
        assert_eq!(scheduling_order(&high, &high), Some(Ordering::Equal));
    }

    #[test]
    fn control_class_dominates_priority() {
        let immediate_low_prio = Control { priority: 1, realtime_class: RealtimeClass::Immediate };
        let end_of_round_high_prio = Control { priority: 200, realtime_class: RealtimeClass::EndOfRound };
        assert!(is_more_urgent(&immediate_low_prio, &end_of_round_high_prio));
    }

    #[test]
    fn control_priority_breaks_ties_within_class() {
        let a = Control { priority: 5, realtime_class: RealtimeClass::NextBurst };
        let b = Control { priority: 1, realtime_class: RealtimeClass::NextBurst };
        assert!(is_more_urgent(&a, &b));
    }

    #[test]
    fn edf_earlier_deadline_wins() {
        let sooner = Edf { deadline: 100 };
        let later = Edf { deadline: 500 };
        assert!(is_more_urgent(&sooner, &later));
    }

    #[test]
    fn mismatched_kinds_are_incomparable() {
        let fixed = Fixed { priority: 1 };
        let edf = Edf { deadline: 1 };
        assert_eq!(scheduling_order(&fixed, &edf), None);
    }
}
