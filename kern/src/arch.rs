//! Architecture-specific support.
//!
//! Each architecture backend defines the same set of names (a `SavedState`
//! type implementing [`ArchState`], plus the free functions below); this
//! module picks one with `cfg_if!` and re-exports it, so the rest of the
//! kernel never names a concrete architecture.

use crate::mpu::MpuConfig;
use crate::thread::Thread;
use crate::time::Timestamp;

cfg_if::cfg_if! {
    if #[cfg(not(target_pointer_width = "32"))] {
        compile_error!("non-32-bit targets not supported (even for simulation)");
    } else if #[cfg(target_arch = "arm")] {
        pub mod arm_m;
        pub use arm_m::*;
    } else {
        pub mod fake;
        pub use fake::*;
    }
}

/// Accessors onto the register state saved by a context switch, used by the
/// syscall dispatcher to read arguments and write the return value without
/// knowing the concrete architecture.
pub trait ArchState: Default + core::fmt::Debug {
    /// Current stack pointer, for stack-overflow watermark checks.
    fn stack_pointer(&self) -> u32;
    /// The syscall number the trapping instruction requested.
    fn syscall_descriptor(&self) -> u32;
    fn arg0(&self) -> u32;
    fn arg1(&self) -> u32;
    fn arg2(&self) -> u32;
    fn arg3(&self) -> u32;
    /// Writes the single return word the syscall produces.
    fn set_return(&mut self, value: u32);
}

/// Resets the system. Never returns.
pub fn reset() -> ! {
    arch_impl::reset()
}

/// Masks maskable interrupts (`InterruptDisable`, see the concurrency model).
pub fn disable_irq() {
    arch_impl::disable_irq()
}

pub fn enable_irq() {
    arch_impl::enable_irq()
}

/// Halts the processor until the next interrupt, without lowering power
/// below what's needed to still service one (`wfi`). Used by the idle
/// thread; interrupts must be enabled when this is called or it never
/// returns.
pub fn wait_for_interrupt() {
    arch_impl::wait_for_interrupt()
}

/// Installs `config`'s MPU regions and drops to unprivileged mode, or (if
/// `config` is `None`) installs the kernel-default all-access configuration
/// and stays privileged.
pub fn apply_memory_protection(config: Option<&MpuConfig>) {
    arch_impl::apply_memory_protection(config)
}

/// Records `thread` as the currently-running thread, for use by trap handlers
/// that can't otherwise find their way back to the scheduler's notion of
/// "current".
///
/// # Safety
/// `thread` must remain valid and not move for as long as it is current.
pub unsafe fn set_current_thread(thread: &Thread) {
    arch_impl::set_current_thread(thread)
}

/// Restores `thread`'s saved state and jumps to it. Used exactly once, at
/// boot, to hand off from the kernel's initialization stack to the first
/// scheduled thread. Never returns.
pub fn start_first_thread(tick_divisor: u32, thread: &mut Thread) -> ! {
    arch_impl::start_first_thread(tick_divisor, thread)
}

/// Current monotonic kernel time.
pub fn now() -> Timestamp {
    arch_impl::now()
}

/// Builds the initial saved state for a thread that has never run: an
/// exception frame positioned so that, the first time it's restored, control
/// lands at `entry` with `arg0` in its first argument register and the
/// thread's own stack at `[stack_base, stack_base + stack_size)`. Grounded on
/// the teacher's `arch::{arm_m, fake}::reinitialize`.
pub fn initialize_stack(entry: u32, stack_base: u32, stack_size: u32, arg0: u32) -> SavedState {
    arch_impl::initialize_stack(entry, stack_base, stack_size, arg0)
}

#[cfg(target_arch = "arm")]
use arm_m as arch_impl;
#[cfg(not(target_arch = "arm"))]
use fake as arch_impl;
