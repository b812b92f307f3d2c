//! Compile-time kernel configuration. The original system configures these
//! knobs in a per-board settings header; here they're associated constants
//! so a board integration crate can override them by depending on a
//! differently-configured build rather than by patching a header at flash
//! time.

/// Number of fixed-priority levels, one FIFO ready queue each. Valid thread
/// priorities span `1..PRIORITY_MAX` (numerically higher is more important);
/// priority 0 is reserved for the idle thread and is never assigned to a
/// real thread.
pub const PRIORITY_MAX: u8 = 32;
/// Numerically lowest priority a real (non-idle) thread may hold.
pub const PRIORITY_MIN: u8 = 1;
/// Priority reserved for the idle thread: numerically below every valid
/// thread priority, so it never preempts anything.
pub const PRIORITY_IDLE: u8 = 0;
/// Ticks a thread may run before the fixed-priority scheduler preempts it
/// in favor of another ready thread at the same priority.
pub const MAX_TIME_SLICE: u32 = 20;
/// Number of `u32`s of stack watermark pattern checked to detect stack
/// overflow.
pub const WATERMARK_LEN: usize = 4;
pub const WATERMARK_FILL: u32 = 0xDEAD_BEEF;
/// Upper bound on simultaneously open file descriptors per process.
pub const MAX_OPEN_FILES: usize = 16;
/// Upper bound on simultaneously mounted filesystems.
pub const MAX_MOUNTS: usize = 8;
/// Control scheduler burst-length bounds, in ticks.
pub const BURST_MIN: u32 = 1;
pub const BURST_MAX: u32 = 64;
/// Maximum depth of symlink redirection the VFS resolver will follow before
/// giving up.
pub const MAX_SYMLINK_DEPTH: u8 = 8;
/// Pipe ring buffer capacity in bytes.
pub const PIPE_BUFFER_SIZE: usize = 256;
/// Longest absolute path (including mountpoint prefixes) the VFS stores or
/// resolves without allocation.
pub const MAX_PATH_LEN: usize = 128;

cfg_if::cfg_if! {
    if #[cfg(feature = "sched-edf")] {
        pub const ACTIVE_SCHEDULER: &str = "edf";
    } else if #[cfg(feature = "sched-control")] {
        pub const ACTIVE_SCHEDULER: &str = "control";
    } else {
        pub const ACTIVE_SCHEDULER: &str = "fixed";
    }
}
