//! Per-process state: the two MPU-backed memory regions, the process's
//! open-file table, and fault bookkeeping.
//!
//! Grounded on the region-table/fault-storage role the teacher's `Task`
//! plays in `sys/kern/src/task.rs`, generalized to a process that can own
//! more than one thread (this kernel has real blocking threads, not a single
//! IPC-serialized task).

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use abi::{Errno, FaultData};
use intrusive::IntrusiveRefCounted;

use crate::mpu::MpuConfig;
use crate::vfs::fd::FileDescriptorTable;

/// A process's memory image: base/size of the code region and of the
/// data (stack+bss+heap) region it was loaded with.
#[derive(Debug, Clone, Copy)]
pub struct ProcessImage {
    pub code_base: u32,
    pub code_size: u32,
    pub data_base: u32,
    pub data_size: u32,
}

/// Assigns process ids in creation order. This kernel never spawns a child
/// process from a running one (see `ProcessSpawn`'s `NotSupported` stub), so
/// every process's parent is conceptually the kernel itself, i.e. pid 0 --
/// there is no process hierarchy for `getppid` to walk.
static NEXT_PID: AtomicUsize = AtomicUsize::new(1);

pub struct Process {
    ref_count: AtomicUsize,
    pub image: ProcessImage,
    pub mpu_config: MpuConfig,
    pub fd_table: FileDescriptorTable,
    pub pid: u32,
    live_threads: AtomicUsize,
    /// Set by `thread::force_fault` when one of this process's threads
    /// faults. A second fault while one is already recorded overwrites it,
    /// mirroring the teacher's "double faults are expected to be super
    /// rare, original fault information is lost" policy.
    fault: UnsafeCell<Option<FaultData>>,
}

// Safety: `fault` is only ever written from `record_fault`, which is called
// with interrupts disabled (the same discipline that makes `force_fault`
// safe to call at all), and only ever read by the process's own owner after
// every thread has stopped running.
unsafe impl Sync for Process {}

impl IntrusiveRefCounted for Process {
    fn ref_count(&self) -> &AtomicUsize {
        &self.ref_count
    }
}

impl Process {
    pub fn new(image: ProcessImage, thread_count: usize) -> Result<Self, Errno> {
        let mpu_config = MpuConfig::for_process(
            image.code_base,
            image.code_size,
            image.data_base,
            image.data_size,
        )?;
        Ok(Process {
            ref_count: AtomicUsize::new(0),
            image,
            mpu_config,
            fd_table: FileDescriptorTable::new(),
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed) as u32,
            live_threads: AtomicUsize::new(thread_count),
            fault: UnsafeCell::new(None),
        })
    }

    /// Records a fault against this process. Called with interrupts
    /// disabled from `thread::force_fault`.
    pub fn record_fault(&self, fault: FaultData) {
        unsafe {
            *self.fault.get() = Some(fault);
        }
    }

    pub fn last_fault(&self) -> Option<FaultData> {
        unsafe { *self.fault.get() }
    }

    /// Called when one of the process's threads exits or is deleted.
    /// Returns `true` if that was the last thread, meaning the whole
    /// process should now be torn down.
    pub fn thread_exited(&self) -> bool {
        self.live_threads.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn is_fully_stopped(&self) -> bool {
        self.live_threads.load(Ordering::Acquire) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::FaultKind;

    fn image() -> ProcessImage {
        ProcessImage {
            code_base: 0x0800_0000,
            code_size: 0x1000,
            data_base: 0x2000_0000,
            data_size: 0x1000,
        }
    }

    #[test]
    fn last_thread_exiting_reports_fully_stopped() {
        let p = Process::new(image(), 2).unwrap();
        assert!(!p.thread_exited());
        assert!(!p.is_fully_stopped());
        assert!(p.thread_exited());
        assert!(p.is_fully_stopped());
    }

    #[test]
    fn record_fault_overwrites_previous_fault() {
        let p = Process::new(image(), 1).unwrap();
        p.record_fault(FaultData::new(FaultKind::DivideByZero, 0, 0));
        p.record_fault(FaultData::new(FaultKind::StackOverflow, 4, 0));
        assert_eq!(p.last_fault().unwrap().kind, FaultKind::StackOverflow);
    }
}
