//! Common error-handling support.
//!
//! Kernel code shouldn't spend its time hand-rolling error plumbing, so
//! syscall implementations return a `Result<_, UserError>` and let this
//! module sort out whether the calling thread gets an errno back or gets
//! faulted.

use abi::{Errno, FaultData};

use crate::thread::{NextTask, Thread};

/// An error committed by user code when interacting with a syscall.
///
/// This is the error type returned internally by syscall implementations.
#[derive(Clone, Debug)]
pub enum UserError {
    /// A recoverable error: the calling thread gets `errno` back in its
    /// return register. May still cause a context switch, as indicated by
    /// `NextTask` (e.g. a `MutexUnlock` that wakes a higher-priority
    /// waiter).
    Recoverable(Errno, NextTask),
    /// An unrecoverable error: the calling thread is faulted and is no
    /// longer runnable.
    Unrecoverable(FaultData),
}

impl From<FaultData> for UserError {
    fn from(f: FaultData) -> Self {
        Self::Unrecoverable(f)
    }
}

impl UserError {
    /// Convenience constructor for the common case of a recoverable error
    /// that doesn't force a reschedule.
    pub fn recoverable(errno: Errno) -> Self {
        Self::Recoverable(errno, NextTask::Same)
    }
}

/// Resolves a `UserError` against the faulting thread (if any), returning
/// the `NextTask` the scheduler should act on and, for recoverable errors,
/// the errno to write into the thread's return register.
pub fn resolve(
    err: UserError,
    threads: &mut [Thread],
    faulting: usize,
) -> (NextTask, Option<Errno>) {
    match err {
        UserError::Recoverable(errno, next) => (next, Some(errno)),
        UserError::Unrecoverable(fault) => {
            let next = crate::thread::force_fault(threads, faulting, fault);
            (next, None)
        }
    }
}
