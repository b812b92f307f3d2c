//! Host-testable architecture backend: no real register file, no real MPU,
//! no real interrupts. Lets the rest of the kernel run under `cargo test` on
//! the development machine. Grounded on the teacher's own `arch::fake`, which
//! plays exactly this role for its task/IPC core.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::mpu::MpuConfig;
use crate::thread::Thread;
use crate::time::Timestamp;

#[derive(Default, Debug, Clone, Copy)]
pub struct SavedState {
    args: [u32; 4],
    ret: u32,
    sp: u32,
}

impl super::ArchState for SavedState {
    fn stack_pointer(&self) -> u32 {
        self.sp
    }

    fn syscall_descriptor(&self) -> u32 {
        self.args[0]
    }

    fn arg0(&self) -> u32 {
        self.args[0]
    }
    fn arg1(&self) -> u32 {
        self.args[1]
    }
    fn arg2(&self) -> u32 {
        self.args[2]
    }
    fn arg3(&self) -> u32 {
        self.args[3]
    }

    fn set_return(&mut self, value: u32) {
        self.ret = value;
    }
}

impl SavedState {
    /// Test-only helper: lets a test pretend a thread trapped in with a
    /// given syscall number and arguments.
    pub fn set_args(&mut self, descriptor: u32, args: [u32; 3]) {
        self.args[0] = descriptor;
        self.args[1] = args[0];
        self.args[2] = args[1];
        self.args[3] = args[2];
    }

    pub fn ret(&self) -> u32 {
        self.ret
    }
}

pub fn reset() -> ! {
    panic!("system reset");
}

static TICK: AtomicU32 = AtomicU32::new(0);

pub fn disable_irq() {}

pub fn enable_irq() {}

pub fn wait_for_interrupt() {}

pub fn apply_memory_protection(_config: Option<&MpuConfig>) {}

/// # Safety
/// No-op on the fake backend; any pointer is accepted.
pub unsafe fn set_current_thread(_thread: &Thread) {}

pub fn start_first_thread(_tick_divisor: u32, _thread: &mut Thread) -> ! {
    panic!("entering userland (fake backend has no userland to enter)");
}

pub fn now() -> Timestamp {
    Timestamp::from(u64::from(TICK.fetch_add(1, Ordering::Relaxed)))
}

/// No real exception frame to build on the fake backend; records just
/// enough (the entry point and first argument) for tests to observe that
/// thread creation wired up the right values.
pub fn initialize_stack(entry: u32, stack_base: u32, stack_size: u32, arg0: u32) -> SavedState {
    let mut s = SavedState::default();
    s.sp = stack_base + stack_size;
    s.args = [entry, arg0, 0, 0];
    s
}

/// Test-only: advances the fake clock by `ticks` without going through
/// `now()`'s own increment-by-one-per-call behavior.
#[cfg(test)]
pub fn advance(ticks: u32) {
    TICK.fetch_add(ticks, Ordering::Relaxed);
}
