//! Grounded on `Semaphore`/`IRQwait`/`IRQsignal` in
//! `examples/original_source/miosix/kernel/sync.h`. Unlike the mutex and
//! condition variable, nothing about this wrapper is pthread-specific — POSIX
//! named/unnamed semaphores aren't part of this kernel's ABI, so this is
//! exposed directly as the counting semaphore it is.

use abi::{Errno, Sysnum};
use kern::sync::semaphore::Semaphore as KernelSemaphore;

use crate::syscall_result;

#[repr(transparent)]
pub struct Semaphore {
    inner: KernelSemaphore,
}

impl Semaphore {
    pub const fn new(initial_count: u32) -> Self {
        Semaphore { inner: KernelSemaphore::new(initial_count) }
    }

    fn addr(&self) -> u32 {
        core::ptr::addr_of!(self.inner) as u32
    }

    /// Blocks until the count is positive, then decrements it.
    pub fn wait(&self) {
        let _ = syscall_result(Sysnum::SemWait, self.addr(), 0, 0, 0);
    }

    /// Decrements the count only if it is already positive.
    pub fn try_wait(&self) -> Result<(), Errno> {
        syscall_result(Sysnum::SemTryWait, self.addr(), 0, 0, 0).map(|_| ())
    }

    /// Increments the count, waking one waiter if any are blocked.
    pub fn post(&self) {
        let _ = syscall_result(Sysnum::SemPost, self.addr(), 0, 0, 0);
    }
}
