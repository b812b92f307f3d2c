//! Architecture support for ARMv6/7/8-M.
//!
//! Follows the teacher's split: `SVCall` does a full register save/restore
//! because syscalls usually block and cause a context switch; `SysTick` does
//! not, and instead sets `PendSV` pending when it decides a switch is needed,
//! so the (cheap) common case of a tick with no switch stays cheap.

use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use crate::mpu::MpuConfig;
use crate::thread::Thread;
use crate::time::Timestamp;

/// Registers that must survive a context switch. `r0`-`r3` and the other
/// AAPCS caller-saved registers are already on the stack by the time a
/// handler runs, courtesy of the hardware; these are the ones software has
/// to save by hand.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SavedState {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    psp: u32,
    exc_return: u32,
}

impl super::ArchState for SavedState {
    fn stack_pointer(&self) -> u32 {
        self.psp
    }

    fn syscall_descriptor(&self) -> u32 {
        // Stacked by hardware at the bottom of the exception frame; read
        // back via the saved PSP rather than a dedicated field.
        unsafe { core::ptr::read_volatile(self.psp as *const u32) }
    }

    fn arg0(&self) -> u32 {
        unsafe { core::ptr::read_volatile((self.psp + 4) as *const u32) }
    }
    fn arg1(&self) -> u32 {
        unsafe { core::ptr::read_volatile((self.psp + 8) as *const u32) }
    }
    fn arg2(&self) -> u32 {
        unsafe { core::ptr::read_volatile((self.psp + 12) as *const u32) }
    }
    fn arg3(&self) -> u32 {
        unsafe { core::ptr::read_volatile((self.psp + 16) as *const u32) }
    }

    fn set_return(&mut self, value: u32) {
        unsafe { core::ptr::write_volatile(self.psp as *mut u32, value) }
    }
}

/// The currently-running thread, recorded so trap handlers (which have no
/// other way to find it) can locate its `SavedState`.
#[no_mangle]
static CURRENT_THREAD_PTR: AtomicPtr<Thread> = AtomicPtr::new(core::ptr::null_mut());

static CLOCK_FREQ_KHZ: AtomicU32 = AtomicU32::new(0);
static TICKS: AtomicU32 = AtomicU32::new(0);

pub fn reset() -> ! {
    cortex_m::peripheral::SCB::sys_reset()
}

pub fn disable_irq() {
    cortex_m::interrupt::disable();
}

pub fn enable_irq() {
    unsafe { cortex_m::interrupt::enable() };
}

pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

/// Installs `config`'s two MPU regions and switches to unprivileged
/// execution, or (on `None`) installs a kernel-default configuration that
/// grants full access and stays privileged.
pub fn apply_memory_protection(config: Option<&MpuConfig>) {
    match config {
        Some(config) => {
            // Safety: `config` holds register values computed by
            // `MpuConfig::for_process`, which enforces the alignment and
            // power-of-two invariants the MPU hardware requires.
            unsafe {
                write_mpu_region(0, config.code_region_value());
                write_mpu_region(1, config.data_region_value());
            }
        }
        None => unsafe { disable_mpu_regions() },
    }
}

unsafe fn write_mpu_region(slot: u32, value: (u32, u32)) {
    let mpu = &*cortex_m::peripheral::MPU::PTR;
    mpu.rnr.write(slot);
    mpu.rbar.write(value.0);
    mpu.rasr.write(value.1);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn disable_mpu_regions() {
    let mpu = &*cortex_m::peripheral::MPU::PTR;
    mpu.ctrl.write(0);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// # Safety
/// `thread` must outlive its tenure as current (it is not moved or dropped
/// while `CURRENT_THREAD_PTR` points at it).
pub unsafe fn set_current_thread(thread: &Thread) {
    CURRENT_THREAD_PTR.store(thread as *const Thread as *mut Thread, Ordering::Release);
}

pub fn start_first_thread(tick_divisor: u32, thread: &mut Thread) -> ! {
    unsafe {
        set_current_thread(thread);
    }
    let systick = unsafe { &*cortex_m::peripheral::SYST::PTR };
    unsafe {
        systick.rvr.write(tick_divisor - 1);
        systick.cvr.write(0);
        systick.csr.write(0b111);
    }
    apply_memory_protection(None);
    // Safety: the initial thread's `ctxsave` was populated by thread
    // creation with a valid entry-point stack frame; this never returns
    // because it jumps directly into thread code via an exception return.
    unsafe { enter_first_thread(&thread.ctxsave) }
}

extern "C" {
    fn enter_first_thread(state: *const SavedState) -> !;
}

core::arch::global_asm! {
    ".global enter_first_thread",
    "enter_first_thread:",
    "  ldr r0, [r0, #32]",     // psp field offset within SavedState
    "  msr psp, r0",
    "  movs r0, #2",           // unprivileged, PSP
    "  msr control, r0",
    "  isb",
    "  bx lr",
}

pub fn now() -> Timestamp {
    Timestamp::from(u64::from(TICKS.load(Ordering::Relaxed)))
}

/// Exception-stacked registers the hardware pushes automatically on entry
/// to `SVCall`/any exception, and therefore the layout a thread sees as its
/// own `r0`-`r3`/`r12`/`lr`/`pc`/`xpsr` the first time it's scheduled.
#[repr(C)]
#[derive(Default)]
struct ExceptionFrame {
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

/// Thumb state bit, the only flag a freshly created thread needs set.
const INITIAL_XPSR: u32 = 1 << 24;
/// `EXC_RETURN`: return to thread mode, use PSP, no floating-point state.
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

pub fn initialize_stack(entry: u32, stack_base: u32, stack_size: u32, arg0: u32) -> SavedState {
    let initial_sp = (stack_base + stack_size) & !0x7;
    let frame_addr = initial_sp - core::mem::size_of::<ExceptionFrame>() as u32;
    let frame = ExceptionFrame {
        r0: arg0,
        r12: 0,
        // Branching here (entry function returning) faults immediately
        // rather than running off into unrelated memory.
        lr: 0xFFFF_FFFF,
        pc: entry | 1, // set the Thumb bit
        xpsr: INITIAL_XPSR,
        ..Default::default()
    };
    // Safety: `frame_addr` was derived from a region the caller has already
    // validated as this thread's own writable stack.
    unsafe {
        core::ptr::write_volatile(frame_addr as *mut ExceptionFrame, frame);
    }
    SavedState {
        psp: frame_addr,
        exc_return: EXC_RETURN_THREAD_PSP,
        ..Default::default()
    }
}

/// SysTick handler: advances the kernel clock. Does not itself reschedule;
/// callers decide whether the new time demands a `PendSV`.
#[no_mangle]
pub extern "C" fn SysTick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Test/debug hook matching the teacher's `set_clock_freq`.
///
/// # Safety
/// Must be called before the SysTick reload value is programmed, and only
/// once.
pub unsafe fn set_clock_freq(khz: u32) {
    CLOCK_FREQ_KHZ.store(khz, Ordering::Relaxed);
}
