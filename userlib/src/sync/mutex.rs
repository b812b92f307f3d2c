//! Grounded on `pthread_mutex_init`/`_lock`/`_trylock`/`_unlock` in
//! `examples/original_source/miosix/kernel/pthread.cpp`: a `pthread_mutex_t`
//! is the native `Mutex` plus an attribute-selected recursive mode. Here the
//! recursive flag and depth counter already live in `kern::sync::mutex::Mutex`
//! itself (see that type's `recursive`/`depth` fields), so this wrapper adds
//! nothing but the syscall trampoline.

use abi::{Errno, Sysnum};
use kern::sync::mutex::Mutex as KernelMutex;

use crate::syscall_result;

/// A priority-inheriting mutex, resident in this process's own memory and
/// addressed by the kernel through the `MutexLock`/`MutexTryLock`/
/// `MutexUnlock` syscalls.
///
/// Must be placed at a `'static` address (a `static` or a `Box::leak`'d
/// allocation) before any thread other than its creator can safely share it
/// — the kernel tracks it by raw pointer across calls.
#[repr(transparent)]
pub struct Mutex {
    inner: KernelMutex,
}

impl Mutex {
    /// `recursive` selects `PTHREAD_MUTEX_RECURSIVE`-style behavior: a
    /// non-recursive mutex reports [`Errno::Deadlock`] if its own owner tries
    /// to lock it again.
    pub const fn new(recursive: bool) -> Self {
        Mutex { inner: KernelMutex::new(recursive) }
    }

    pub(crate) fn addr(&self) -> u32 {
        core::ptr::addr_of!(self.inner) as u32
    }

    /// Blocks until the mutex is acquired. Fails only if the mutex is
    /// non-recursive and already held by the calling thread.
    pub fn lock(&self) -> Result<(), Errno> {
        syscall_result(Sysnum::MutexLock, self.addr(), 0, 0, 0).map(|_| ())
    }

    /// Acquires the mutex only if it is immediately available.
    pub fn try_lock(&self) -> Result<(), Errno> {
        syscall_result(Sysnum::MutexTryLock, self.addr(), 0, 0, 0).map(|_| ())
    }

    /// Releases one level of recursion. Undefined which thread's call is
    /// honored if the calling thread does not actually hold the mutex — same
    /// contract as POSIX `pthread_mutex_unlock`.
    pub fn unlock(&self) {
        let _ = syscall_result(Sysnum::MutexUnlock, self.addr(), 0, 0, 0);
    }
}

// `KernelMutex` is already `Sync` (it arbitrates all state on the other
// side of the syscall trap); this wrapper inherits that automatically.
