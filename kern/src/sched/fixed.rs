//! Fixed-priority round robin: the default scheduler. Every ready thread at
//! the same priority gets an equal, fixed-length slice
//! (`config::MAX_TIME_SLICE` ticks) before the next one at that priority
//! runs; a thread only yields early by blocking or by a higher-priority
//! thread becoming ready.

use crate::config::MAX_TIME_SLICE;
use crate::thread::Thread;

/// Ticks `thread` may run before a tick-driven preemption check forces a
/// reschedule among threads of the same priority.
pub fn time_slice(_thread: &Thread) -> u32 {
    MAX_TIME_SLICE
}
