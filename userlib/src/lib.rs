#![cfg_attr(not(test), no_std)]

//! The library linked into code that runs as an unprivileged thread: raw
//! syscall stubs plus the pthread-compatible synchronization wrappers built
//! on top of them.
//!
//! Grounded on the teacher's `sys/userlib/src/lib.rs`, but simplified: the
//! teacher's `sys_send`/`sys_recv` stubs are naked functions with hand-spilled
//! `r4`-`r11` because Hubris's IPC marshals a variable-shaped message through
//! registers the compiler doesn't know about. This kernel's syscall ABI is a
//! fixed five-register call (`r0` = syscall number and return value, `r1`-`r3`
//! = the first three arguments, `r12` = a fourth), which `core::arch::asm!`
//! can describe directly with named operands -- no naked function or
//! register spilling required.

use abi::{Errno, Sysnum};

pub mod sync;

/// Raw syscall trap. Returns the kernel's return-register value unchanged;
/// callers that expect a negative-errno convention go through
/// [`syscall_result`] instead.
#[inline(always)]
fn raw_syscall(nr: Sysnum, a0: u32, a1: u32, a2: u32, a3: u32) -> u32 {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "arm")] {
            let ret: u32;
            unsafe {
                core::arch::asm!(
                    "svc #0",
                    inout("r0") nr as u32 => ret,
                    in("r1") a0,
                    in("r2") a1,
                    in("r3") a2,
                    in("r12") a3,
                    options(nostack),
                );
            }
            ret
        } else {
            let _ = (nr, a0, a1, a2, a3);
            unimplemented!("userlib syscalls require target_arch = \"arm\"")
        }
    }
}

/// Performs `nr` and interprets the return register as the kernel's
/// negative-errno convention: any non-negative value is the call's success
/// payload, any negative value is `-(errno as i32)`.
fn syscall_result(nr: Sysnum, a0: u32, a1: u32, a2: u32, a3: u32) -> Result<u32, Errno> {
    let raw = raw_syscall(nr, a0, a1, a2, a3) as i32;
    if raw < 0 {
        Err(Errno::try_from(raw).unwrap_or(Errno::InvalidArgument))
    } else {
        Ok(raw as u32)
    }
}

/// Gives up the remainder of the calling thread's time slice.
pub fn thread_yield() {
    let _ = syscall_result(Sysnum::ThreadYield, 0, 0, 0, 0);
}

/// Creates a new thread in the calling process, running `entry` on
/// `[stack_base, stack_base + stack_size)`, at `priority` (higher is more
/// important). Returns the new thread's id.
///
/// `entry` is called with no arguments and must never return — the fresh
/// stack frame the kernel builds for it has no valid return address, so
/// returning faults immediately instead of running off into unrelated code.
/// A thread that is done should call [`thread_exit`] explicitly.
pub fn thread_create(entry: extern "C" fn() -> !, stack_base: u32, stack_size: u32, priority: u8) -> Result<u32, Errno> {
    syscall_result(Sysnum::ThreadCreate, entry as u32, stack_base, stack_size, u32::from(priority))
}

/// Blocks until thread `id` has exited, returning its exit code.
pub fn thread_join(id: u32) -> Result<i32, Errno> {
    syscall_result(Sysnum::ThreadJoin, id, 0, 0, 0).map(|code| code as i32)
}

/// Ends the calling thread, making `code` available to a joiner.
pub fn thread_exit(code: i32) -> ! {
    let _ = syscall_result(Sysnum::ThreadExit, code as u32, 0, 0, 0);
    unreachable!("a thread does not resume after ThreadExit");
}

/// Sleeps the calling thread for at least `nanos`.
pub fn thread_sleep(nanos: u64) {
    let lo = nanos as u32;
    let hi = (nanos >> 32) as u32;
    let _ = syscall_result(Sysnum::ThreadSleep, lo, hi, 0, 0);
}

/// Current monotonic kernel time, in scheduler ticks since boot.
pub fn get_time() -> u64 {
    let mut ticks: u64 = 0;
    let addr = core::ptr::addr_of_mut!(ticks) as u32;
    let _ = syscall_result(Sysnum::GetTime, addr, 0, 0, 0);
    ticks
}

/// Sleeps the calling thread for at least `nanos`, measured from now (as
/// opposed to [`thread_sleep`]'s absolute deadline).
pub fn nanosleep(nanos: u64) {
    let lo = nanos as u32;
    let hi = (nanos >> 32) as u32;
    let _ = syscall_result(Sysnum::Nanosleep, lo, hi, 0, 0);
}

/// The calling thread's process id.
pub fn get_pid() -> u32 {
    syscall_result(Sysnum::GetPid, 0, 0, 0, 0).unwrap_or(0)
}

/// The calling process's parent id. Always 0: this kernel never spawns a
/// child process from a running one, so there is no process hierarchy.
pub fn get_ppid() -> u32 {
    syscall_result(Sysnum::GetPpid, 0, 0, 0, 0).unwrap_or(0)
}

pub mod fs {
    //! Thin wrappers over the VFS syscalls. Paths are passed as NUL-terminated
    //! byte slices (callers own the termination; no allocator lives here to
    //! add it for them).

    use abi::{Errno, OpenFlags, Stat, Sysnum};

    use super::syscall_result;

    pub fn open(path: &[u8], flags: OpenFlags, mode: u32) -> Result<i32, Errno> {
        debug_assert!(path.last() == Some(&0), "path must be NUL-terminated");
        syscall_result(Sysnum::Open, path.as_ptr() as u32, flags.bits(), mode, 0).map(|fd| fd as i32)
    }

    pub fn close(fd: i32) -> Result<(), Errno> {
        syscall_result(Sysnum::Close, fd as u32, 0, 0, 0).map(|_| ())
    }

    pub fn read(fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        syscall_result(Sysnum::Read, fd as u32, buf.as_mut_ptr() as u32, buf.len() as u32, 0)
            .map(|n| n as usize)
    }

    pub fn write(fd: i32, buf: &[u8]) -> Result<usize, Errno> {
        syscall_result(Sysnum::Write, fd as u32, buf.as_ptr() as u32, buf.len() as u32, 0)
            .map(|n| n as usize)
    }

    pub fn ioctl(fd: i32, request: u32, arg: usize) -> Result<usize, Errno> {
        syscall_result(Sysnum::Ioctl, fd as u32, request, arg as u32, 0).map(|n| n as usize)
    }

    pub fn stat(path: &[u8]) -> Result<Stat, Errno> {
        debug_assert!(path.last() == Some(&0), "path must be NUL-terminated");
        let mut out = Stat::default();
        let out_addr = core::ptr::addr_of_mut!(out) as u32;
        syscall_result(Sysnum::Stat, path.as_ptr() as u32, out_addr, 0, 0)?;
        Ok(out)
    }

    pub fn unlink(path: &[u8]) -> Result<(), Errno> {
        debug_assert!(path.last() == Some(&0), "path must be NUL-terminated");
        syscall_result(Sysnum::Unlink, path.as_ptr() as u32, 0, 0, 0).map(|_| ())
    }

    pub fn mkdir(path: &[u8], mode: u32) -> Result<(), Errno> {
        debug_assert!(path.last() == Some(&0), "path must be NUL-terminated");
        syscall_result(Sysnum::Mkdir, path.as_ptr() as u32, mode, 0, 0).map(|_| ())
    }

    pub fn rmdir(path: &[u8]) -> Result<(), Errno> {
        debug_assert!(path.last() == Some(&0), "path must be NUL-terminated");
        syscall_result(Sysnum::Rmdir, path.as_ptr() as u32, 0, 0, 0).map(|_| ())
    }

    pub fn rename(old_path: &[u8], new_path: &[u8]) -> Result<(), Errno> {
        debug_assert!(old_path.last() == Some(&0), "path must be NUL-terminated");
        debug_assert!(new_path.last() == Some(&0), "path must be NUL-terminated");
        syscall_result(Sysnum::Rename, old_path.as_ptr() as u32, new_path.as_ptr() as u32, 0, 0).map(|_| ())
    }

    /// `stat`: follows symlinks.
    pub fn lstat(path: &[u8]) -> Result<Stat, Errno> {
        debug_assert!(path.last() == Some(&0), "path must be NUL-terminated");
        let mut out = Stat::default();
        let out_addr = core::ptr::addr_of_mut!(out) as u32;
        syscall_result(Sysnum::Lstat, path.as_ptr() as u32, out_addr, 0, 0)?;
        Ok(out)
    }

    pub fn fstat(fd: i32) -> Result<Stat, Errno> {
        let mut out = Stat::default();
        let out_addr = core::ptr::addr_of_mut!(out) as u32;
        syscall_result(Sysnum::Fstat, fd as u32, out_addr, 0, 0)?;
        Ok(out)
    }

    pub fn readlink(path: &[u8], out: &mut [u8]) -> Result<usize, Errno> {
        debug_assert!(path.last() == Some(&0), "path must be NUL-terminated");
        syscall_result(Sysnum::Readlink, path.as_ptr() as u32, out.as_mut_ptr() as u32, out.len() as u32, 0)
            .map(|n| n as usize)
    }

    /// Where a [`lseek`] offset is measured from.
    #[repr(u32)]
    pub enum Whence {
        Start = 0,
        Current = 1,
        End = 2,
    }

    pub fn lseek(fd: i32, whence: Whence, offset: i32) -> Result<u64, Errno> {
        syscall_result(Sysnum::Lseek, fd as u32, whence as u32, offset as u32, 0).map(u64::from)
    }

    pub fn fcntl(fd: i32, cmd: u32, arg: usize) -> Result<usize, Errno> {
        syscall_result(Sysnum::Fcntl, fd as u32, cmd, arg as u32, 0).map(|n| n as usize)
    }

    pub fn ftruncate(fd: i32, length: u64) -> Result<(), Errno> {
        let lo = length as u32;
        let hi = (length >> 32) as u32;
        syscall_result(Sysnum::Ftruncate, fd as u32, lo, hi, 0).map(|_| ())
    }

    pub fn getdents(fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        syscall_result(Sysnum::Getdents, fd as u32, buf.as_mut_ptr() as u32, buf.len() as u32, 0)
            .map(|n| n as usize)
    }

    pub fn isatty(fd: i32) -> bool {
        syscall_result(Sysnum::Isatty, fd as u32, 0, 0, 0).map(|v| v != 0).unwrap_or(false)
    }

    pub fn dup(fd: i32) -> Result<i32, Errno> {
        syscall_result(Sysnum::Dup, fd as u32, 0, 0, 0).map(|new_fd| new_fd as i32)
    }
}
