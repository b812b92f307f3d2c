//! pthread-compatible synchronization primitives, built by forwarding onto a
//! kernel-resident [`kern::sync`] object through the corresponding syscall.
//!
//! Grounded on `examples/original_source/miosix/kernel/pthread.cpp`'s
//! `pthread_mutex_t`/`pthread_cond_t` wrappers, which are thin shims over the
//! native `Mutex`/`ConditionVariable` types. Here the "native" object and the
//! "wrapper" are separated by the syscall boundary instead of by an in-process
//! call: a [`Mutex`]/[`CondVar`] *is* a `kern::sync::mutex::Mutex`/
//! `ConditionVariable`, embedded directly (these kernels are statically
//! linked, single-image systems, so the same struct that the kernel's
//! priority-inheritance code walks by pointer can simply live in this
//! process's own static data), and all the arbitration the native type
//! performs happens inside the trap.

mod condvar;
mod mutex;
mod semaphore;

pub use condvar::CondVar;
pub use mutex::Mutex;
pub use semaphore::Semaphore;
