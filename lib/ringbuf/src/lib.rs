#![no_std]

//! Fixed-capacity ring buffer for kernel event instrumentation.
//!
//! This is the diagnostics layer used in place of textual logging: a
//! `ringbuf!`-declared static records the last `N` events of a `Copy` type
//! with `ringbuf_entry!`, at no heap cost and no UART required. A debug
//! harness or test can then read the buffer back to check what the
//! scheduler or a mutex did, which is how the priority-inversion and
//! mutex-ordering scenarios are verified.
//!
//! Unlike the fuller-featured version of this crate, there is no entry
//! de-duplication and no per-variant event counting here — this kernel has
//! no out-of-band inspection tool to make use of either, so the simplest
//! ring buffer that preserves ordering is all that's needed.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// A single-writer cell usable from a `static`. Panics if a second borrow is
/// attempted while one is outstanding, which would indicate a ring buffer
/// being written to from two contexts at once (e.g. a non-reentrant
/// recording call interrupted by an IRQ that also records).
pub struct RingCell<T> {
    borrowed: AtomicBool,
    cell: UnsafeCell<T>,
}

impl<T> RingCell<T> {
    pub const fn new(contents: T) -> Self {
        Self { borrowed: AtomicBool::new(false), cell: UnsafeCell::new(contents) }
    }

    /// Returns `None` instead of panicking if already borrowed, so a
    /// recursive recording attempt is silently dropped rather than
    /// corrupting the buffer or panicking from inside a fault handler.
    pub fn try_borrow_mut(&self) -> Option<RingCellGuard<'_, T>> {
        if self.borrowed.swap(true, Ordering::Acquire) {
            return None;
        }
        Some(RingCellGuard { contents: unsafe { &mut *self.cell.get() }, borrow: &self.borrowed })
    }
}

unsafe impl<T> Sync for RingCell<T> where for<'a> &'a mut T: Send {}

pub struct RingCellGuard<'a, T> {
    contents: &'a mut T,
    borrow: &'a AtomicBool,
}

impl<T> Drop for RingCellGuard<'_, T> {
    fn drop(&mut self) {
        self.borrow.store(false, Ordering::Release);
    }
}

impl<T> core::ops::Deref for RingCellGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.contents
    }
}

impl<T> core::ops::DerefMut for RingCellGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.contents
    }
}

/// A single recorded event: the source line that recorded it and its
/// payload.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy> {
    pub line: u16,
    pub generation: u16,
    pub payload: T,
}

/// A ring buffer of parametrized payload type and size. Instantiating this
/// directly is unusual — use the [`ringbuf!`] macro.
#[derive(Debug)]
pub struct Ringbuf<T: Copy, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy, const N: usize> Ringbuf<T, N> {
    fn do_record(&mut self, line: u16, payload: T) {
        let last = self.last.unwrap_or(usize::MAX);
        let ndx = {
            let last_plus_1 = last.wrapping_add(1);
            if last_plus_1 >= self.buffer.len() {
                0
            } else {
                last_plus_1
            }
        };
        // Safety: `ndx` was just checked against `self.buffer.len()`.
        let ent = unsafe { self.buffer.get_unchecked_mut(ndx) };
        *ent = RingbufEntry { line, payload, generation: ent.generation.wrapping_add(1) };
        self.last = Some(ndx);
    }

    /// Entries in recording order, oldest first, skipping never-written
    /// slots. Intended for tests and debug inspection, not for use on the
    /// hot path.
    pub fn entries_oldest_first(&self) -> impl Iterator<Item = &RingbufEntry<T>> {
        let written = self.buffer.iter().filter(|e| e.generation != 0).count();
        let start = match self.last {
            Some(last) if written == self.buffer.len() => (last + 1) % self.buffer.len(),
            _ => 0,
        };
        (0..written).map(move |i| &self.buffer[(start + i) % self.buffer.len()])
    }
}

/// Implemented by things `ringbuf_entry!` can record into.
pub trait RecordEntry<T: Copy> {
    fn record_entry(&self, line: u16, payload: T);
}

impl<T: Copy, const N: usize> RecordEntry<T> for RingCell<Ringbuf<T, N>> {
    fn record_entry(&self, line: u16, payload: T) {
        // If already borrowed we're being re-entered (e.g. from an IRQ handler
        // nested inside a recording call); drop the entry rather than risk
        // corrupting the buffer or panicking from fault-handling code.
        let Some(mut ring) = self.try_borrow_mut() else {
            return;
        };
        ring.do_record(line, payload);
    }
}

impl<T: Copy> RecordEntry<T> for () {
    fn record_entry(&self, _line: u16, _payload: T) {}
}

/// Declares a ring buffer in the current module or context.
///
/// `ringbuf!(NAME, Type, N, init)` declares a static named `NAME` holding
/// `N` entries of `Type`, all initialized to `init`. Omitting `NAME`
/// defaults it to `__RINGBUF`, the common case of one ring buffer per
/// module.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        static $name: $crate::RingCell<$crate::Ringbuf<$t, $n>> =
            $crate::RingCell::new($crate::Ringbuf {
                last: None,
                buffer: [$crate::RingbufEntry { line: 0, generation: 0, payload: $init }; $n],
            });
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
        static $name: () = ();
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

/// Records `expr` into the ring buffer named `NAME` (or `__RINGBUF` if
/// omitted), tagging it with the call site's line number.
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let (p, buf) = ($payload, &$buf);
        $crate::RecordEntry::record_entry(buf, line!() as u16, p);
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    ringbuf!(TEST_RINGBUF, u32, 4, 0);

    #[test]
    fn records_in_order_and_wraps() {
        for i in 1..=6u32 {
            ringbuf_entry!(TEST_RINGBUF, i);
        }
        let guard = TEST_RINGBUF.try_borrow_mut().unwrap();
        let recorded: std::vec::Vec<u32> =
            guard.entries_oldest_first().map(|e| e.payload).collect();
        // Capacity 4, six entries recorded: only the last four survive, in order.
        assert_eq!(recorded, std::vec![3, 4, 5, 6]);
    }

    #[test]
    fn reentrant_record_is_dropped_not_panicking() {
        ringbuf!(REENTRANT, u32, 2, 0);
        let guard = REENTRANT.try_borrow_mut().unwrap();
        // Buffer is already borrowed; this must be a silent no-op.
        ringbuf_entry!(REENTRANT, 99u32);
        assert!(guard.last.is_none());
    }
}
