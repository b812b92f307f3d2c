//! Architecture-independent syscall dispatch. Grounded on the teacher's
//! `sys/kern/src/syscalls.rs`: a `match` on the syscall number delegating to
//! one function per call, each returning `Result<(u32, NextTask), UserError>`
//! (the success path's `u32` is the value written into the thread's return
//! register — mirroring the teacher's `safe_syscall_entry`/per-syscall
//! function split, generalized from IPC send/recv to this kernel's richer
//! thread/sync/VFS surface), with `err::resolve` doing the common
//! recoverable-vs-fault handling afterward.
//!
//! Argument marshaling reads straight out of `Thread::ctxsave` (the
//! `ArchState` accessors), and every pointer-shaped argument is checked
//! against the calling process's MPU configuration before use, per spec.md
//! §4.4's "conceptual" syscall dispatch description.

use core::mem::size_of;
use core::ptr::NonNull;

use abi::{Errno, OpenFlags, Priority, Sysnum};

use crate::arch::ArchState;
use crate::config::{MAX_PATH_LEN, PRIORITY_MAX, PRIORITY_MIN};
use crate::err::UserError;
use crate::sync::condvar::ConditionVariable;
use crate::sync::mutex::{LockOutcome, Mutex, UnlockOutcome};
use crate::sync::semaphore::Semaphore;
use crate::thread::{NextTask, Thread, ThreadFlags, ThreadId};
use crate::time::Timestamp;
use crate::vfs::mount::MountTable;
use crate::vfs::SeekFrom;

/// Lower bound the spec imposes on a `sleep`/timed-wait deadline, to avoid
/// underflow in the time-conversion math for a near-zero requested delay.
const MIN_TIMEOUT_NS: u64 = 100_000;

/// Everything a syscall handler needs beyond the thread table itself.
pub struct SyscallContext<'a> {
    pub threads: &'a mut [Thread],
    pub current: usize,
    pub mounts: &'a MountTable,
    pub now: Timestamp,
}

/// Entry point called once the architecture layer has saved the trapping
/// thread's registers into `ctxsave`. Returns the scheduling hint the
/// caller (the arch-specific trap handler) should act on.
pub fn safe_syscall_entry(ctx: &mut SyscallContext) -> NextTask {
    let nr = ctx.threads[ctx.current].ctxsave.syscall_descriptor();
    let result = match Sysnum::try_from(nr) {
        Ok(sysnum) => dispatch(ctx, sysnum),
        Err(errno) => Err(UserError::recoverable(errno)),
    };
    match result {
        Ok((value, next)) => {
            ctx.threads[ctx.current].ctxsave.set_return(value);
            next
        }
        Err(err) => {
            let (next, errno) = crate::err::resolve(err, ctx.threads, ctx.current);
            if let Some(errno) = errno {
                ctx.threads[ctx.current].ctxsave.set_return(errno_to_word(errno));
            }
            next
        }
    }
}

fn errno_to_word(errno: Errno) -> u32 {
    (-(errno as i32)) as u32
}

fn dispatch(ctx: &mut SyscallContext, sysnum: Sysnum) -> Result<(u32, NextTask), UserError> {
    match sysnum {
        Sysnum::ThreadCreate => thread_create(ctx),
        Sysnum::ThreadYield => Ok((0, NextTask::Other)),
        Sysnum::ThreadJoin => thread_join(ctx),
        Sysnum::ThreadExit => thread_exit(ctx),
        Sysnum::ThreadSleep => thread_sleep(ctx),
        Sysnum::MutexLock => mutex_lock(ctx),
        Sysnum::MutexTryLock => mutex_try_lock(ctx),
        Sysnum::MutexUnlock => mutex_unlock(ctx),
        Sysnum::CondWait => cond_wait(ctx),
        Sysnum::CondTimedWait => cond_timed_wait(ctx),
        Sysnum::CondSignal => cond_signal(ctx),
        Sysnum::CondBroadcast => cond_broadcast(ctx),
        Sysnum::SemWait => sem_wait(ctx),
        Sysnum::SemTryWait => sem_try_wait(ctx),
        Sysnum::SemPost => sem_post(ctx),
        Sysnum::Open => vfs_open(ctx),
        Sysnum::Close => vfs_close(ctx),
        Sysnum::Read => vfs_read(ctx),
        Sysnum::Write => vfs_write(ctx),
        Sysnum::Ioctl => vfs_ioctl(ctx),
        Sysnum::Stat => vfs_stat(ctx),
        Sysnum::Unlink => vfs_unlink(ctx),
        Sysnum::Mkdir => vfs_mkdir(ctx),
        Sysnum::ProcessSpawn | Sysnum::ProcessWait => {
            Err(UserError::recoverable(Errno::NotSupported))
        }
        Sysnum::GetTime => get_time(ctx),
        Sysnum::GetPid => get_pid(ctx),
        Sysnum::GetPpid => Ok((0, NextTask::Same)),
        Sysnum::Lseek => vfs_lseek(ctx),
        Sysnum::Fstat => vfs_fstat(ctx),
        Sysnum::Lstat => vfs_lstat(ctx),
        Sysnum::Rename => vfs_rename(ctx),
        Sysnum::Rmdir => vfs_rmdir(ctx),
        Sysnum::Fcntl => vfs_fcntl(ctx),
        Sysnum::Ftruncate => vfs_ftruncate(ctx),
        Sysnum::Getdents => vfs_getdents(ctx),
        Sysnum::Isatty => vfs_isatty(ctx),
        Sysnum::Dup => vfs_dup(ctx),
        Sysnum::Readlink => vfs_readlink(ctx),
        Sysnum::Nanosleep => nanosleep(ctx),
    }
}

fn current_process_mpu<'a>(ctx: &'a SyscallContext) -> Result<&'a crate::mpu::MpuConfig, UserError> {
    Ok(&ctx.threads[ctx.current]
        .process
        .as_ref()
        .ok_or_else(|| UserError::recoverable(Errno::InvalidArgument))?
        .mpu_config)
}

// --- Thread lifecycle ----------------------------------------------------

/// Creates a new thread in the calling thread's process, running `entry`
/// (arg0) on the caller-supplied stack `[stack_base, stack_base +
/// stack_size)` (arg1/arg2), at `priority` (arg3). The new thread's control
/// block is taken from any slot whose previous occupant is DELETED and
/// either DETACHED (nobody will ever join it) or already joined (its
/// `join_result` was consumed) — this kernel has no allocator, so the thread
/// table is the only pool of control blocks there is, and reuse is the only
/// way `ThreadCreate` can ever succeed more than `threads.len()` times
/// total.
fn thread_create(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let entry = ctx.threads[ctx.current].ctxsave.arg0();
    let stack_base = ctx.threads[ctx.current].ctxsave.arg1();
    let stack_size = ctx.threads[ctx.current].ctxsave.arg2();
    let priority = ctx.threads[ctx.current].ctxsave.arg3();

    if priority < u32::from(PRIORITY_MIN) || priority > u32::from(PRIORITY_MAX - 1) {
        return Err(UserError::recoverable(Errno::InvalidArgument));
    }
    if !current_process_mpu(ctx)?.within_for_writing(stack_base, stack_size) {
        return Err(UserError::recoverable(Errno::BadAddress));
    }

    let slot = ctx
        .threads
        .iter()
        .position(|t| t.is_deleted() && (t.is_detached() || t.join_result.is_none()))
        .ok_or_else(|| UserError::recoverable(Errno::OutOfMemory))?;

    let process = ctx.threads[ctx.current].process.clone();
    let mut thread = Thread::new(
        ThreadId(slot),
        None,
        stack_base as usize,
        stack_size as usize,
        Priority(priority as u8),
        false,
    );
    thread.ctxsave = crate::arch::initialize_stack(entry, stack_base, stack_size, 0);
    thread.process = process;
    ctx.threads[slot] = thread;
    Ok((slot as u32, NextTask::Other))
}

fn thread_exit(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let code = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let exiting_idx = ctx.current;
    let exiting_id = ctx.threads[exiting_idx].id;

    ctx.threads[exiting_idx].flags |= ThreadFlags::DELETED;
    ctx.threads[exiting_idx].flags &= !ThreadFlags::READY;
    ctx.threads[exiting_idx].join_result = Some(code);

    if let Some(joiner) = ctx.threads.iter().position(|t| {
        t.flags.contains(ThreadFlags::WAITING_ON_JOIN) && t.join_target == Some(exiting_id)
    }) {
        let code = ctx.threads[exiting_idx].join_result.take().unwrap_or(code);
        ctx.threads[joiner].join_result = Some(code);
        ctx.threads[joiner].join_target = None;
        ctx.threads[joiner].set_run_state(ThreadFlags::READY);
    }

    if let Some(process) = ctx.threads[exiting_idx].process.clone() {
        process.thread_exited();
    }
    Ok((0, NextTask::Other))
}

fn thread_join(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let target = ThreadId(ctx.threads[ctx.current].ctxsave.arg0() as usize);
    let target_idx = ctx
        .threads
        .iter()
        .position(|t| t.id == target)
        .ok_or_else(|| UserError::recoverable(Errno::InvalidArgument))?;

    if target_idx == ctx.current {
        return Err(UserError::recoverable(Errno::InvalidArgument));
    }

    if ctx.threads[target_idx].is_deleted() {
        let code = ctx.threads[target_idx].join_result.take().unwrap_or(0);
        return Ok((code as u32, NextTask::Same));
    }

    ctx.threads[ctx.current].join_target = Some(target);
    ctx.threads[ctx.current].set_run_state(ThreadFlags::WAITING_ON_JOIN);
    Ok((0, NextTask::Other))
}

/// Clamps a caller-requested sleep length to the spec's `MIN_TIMEOUT_NS`
/// lower bound, widening the two 32-bit argument words into one `u64` of
/// nanoseconds.
fn clamp_deadline_ns(lo: u32, hi: u32) -> u64 {
    ((u64::from(hi) << 32) | u64::from(lo)).max(MIN_TIMEOUT_NS)
}

fn thread_sleep(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let lo = ctx.threads[ctx.current].ctxsave.arg0();
    let hi = ctx.threads[ctx.current].ctxsave.arg1();
    let deadline_ns = clamp_deadline_ns(lo, hi);
    ctx.threads[ctx.current].wakeup_time = Some(Timestamp::from(deadline_ns));
    ctx.threads[ctx.current].set_run_state(ThreadFlags::SLEEPING);
    Ok((0, NextTask::Other))
}

/// `nanosleep`: unlike `ThreadSleep`'s absolute deadline, this takes a
/// duration relative to now (arg0/arg1, low/high words of nanoseconds).
fn nanosleep(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let lo = ctx.threads[ctx.current].ctxsave.arg0();
    let hi = ctx.threads[ctx.current].ctxsave.arg1();
    let duration_ns = clamp_deadline_ns(lo, hi);
    ctx.threads[ctx.current].wakeup_time = Some(ctx.now + duration_ns);
    ctx.threads[ctx.current].set_run_state(ThreadFlags::SLEEPING);
    Ok((0, NextTask::Other))
}

fn current_process(ctx: &SyscallContext) -> Result<&intrusive::ArcIntrusive<crate::process::Process>, UserError> {
    ctx.threads[ctx.current].process.as_ref().ok_or_else(|| UserError::recoverable(Errno::InvalidArgument))
}

/// `getpid`: returns the calling thread's process id.
fn get_pid(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    Ok((current_process(ctx)?.pid, NextTask::Same))
}

// --- Sync primitives ------------------------------------------------------
//
// A user-space `Mutex`/`ConditionVariable`/`Semaphore` lives in the calling
// process's data region; the pointer it's addressed by comes straight from
// userspace, so every access here first checks it against the process's MPU
// configuration exactly as spec.md's syscall-dispatch section describes.

fn validated_ptr<T>(ctx: &SyscallContext, addr: u32) -> Result<NonNull<T>, UserError> {
    if !current_process_mpu(ctx)?.within_for_writing(addr, size_of::<T>() as u32) {
        return Err(UserError::recoverable(Errno::BadAddress));
    }
    NonNull::new(addr as *mut T).ok_or_else(|| UserError::recoverable(Errno::InvalidArgument))
}

fn current_ptr(ctx: &mut SyscallContext) -> NonNull<Thread> {
    NonNull::from(&mut ctx.threads[ctx.current])
}

fn mutex_lock(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let mutex: NonNull<Mutex> = validated_ptr(ctx, addr)?;
    let cur = current_ptr(ctx);
    match unsafe { mutex.as_ref().lock(cur) } {
        LockOutcome::Acquired => Ok((0, NextTask::Same)),
        LockOutcome::Blocked => Ok((0, NextTask::Other)),
        LockOutcome::Deadlock => Err(UserError::recoverable(Errno::Deadlock)),
    }
}

fn mutex_try_lock(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let mutex: NonNull<Mutex> = validated_ptr(ctx, addr)?;
    let cur = current_ptr(ctx);
    match unsafe { mutex.as_ref().try_lock(cur) } {
        LockOutcome::Acquired => Ok((0, NextTask::Same)),
        _ => Err(UserError::recoverable(Errno::WouldBlock)),
    }
}

fn mutex_unlock(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let mutex: NonNull<Mutex> = validated_ptr(ctx, addr)?;
    let cur = current_ptr(ctx);
    match unsafe { mutex.as_ref().unlock(cur) } {
        UnlockOutcome::StillOwned | UnlockOutcome::Released => Ok((0, NextTask::Same)),
        UnlockOutcome::Woke { should_yield, .. } => {
            Ok((0, if should_yield { NextTask::Other } else { NextTask::Same }))
        }
    }
}

fn cond_wait(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let mutex_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let cond_addr = ctx.threads[ctx.current].ctxsave.arg1();
    let mutex: NonNull<Mutex> = validated_ptr(ctx, mutex_addr)?;
    let cond: NonNull<ConditionVariable> = validated_ptr(ctx, cond_addr)?;
    let cur = current_ptr(ctx);
    unsafe {
        cond.as_ref().wait(cur, mutex.as_ref());
    }
    Ok((0, NextTask::Other))
}

fn cond_timed_wait(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let mutex_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let cond_addr = ctx.threads[ctx.current].ctxsave.arg1();
    let lo = ctx.threads[ctx.current].ctxsave.arg2();
    let hi = ctx.threads[ctx.current].ctxsave.arg3();
    let deadline = Timestamp::from(clamp_deadline_ns(lo, hi));
    let mutex: NonNull<Mutex> = validated_ptr(ctx, mutex_addr)?;
    let cond: NonNull<ConditionVariable> = validated_ptr(ctx, cond_addr)?;
    let cur = current_ptr(ctx);
    unsafe {
        cond.as_ref().timed_wait(cur, mutex.as_ref(), deadline);
    }
    Ok((0, NextTask::Other))
}

fn cond_signal(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let cond: NonNull<ConditionVariable> = validated_ptr(ctx, addr)?;
    let priority = ctx.threads[ctx.current].priority();
    let woke_more_important = unsafe { cond.as_ref().signal(priority) };
    Ok((0, if woke_more_important { NextTask::Other } else { NextTask::Same }))
}

fn cond_broadcast(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let cond: NonNull<ConditionVariable> = validated_ptr(ctx, addr)?;
    let priority = ctx.threads[ctx.current].priority();
    let woke_more_important = unsafe { cond.as_ref().broadcast(priority) };
    Ok((0, if woke_more_important { NextTask::Other } else { NextTask::Same }))
}

fn sem_wait(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let sem: NonNull<Semaphore> = validated_ptr(ctx, addr)?;
    let cur = current_ptr(ctx);
    let blocked = unsafe { sem.as_ref().wait(cur) };
    Ok((0, if blocked { NextTask::Other } else { NextTask::Same }))
}

fn sem_try_wait(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let sem: NonNull<Semaphore> = validated_ptr(ctx, addr)?;
    if unsafe { sem.as_ref().try_wait() } {
        Ok((0, NextTask::Same))
    } else {
        Err(UserError::recoverable(Errno::WouldBlock))
    }
}

fn sem_post(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let addr = ctx.threads[ctx.current].ctxsave.arg0();
    let sem: NonNull<Semaphore> = validated_ptr(ctx, addr)?;
    let woken = unsafe { sem.as_ref().signal() };
    Ok((0, if woken.is_some() { NextTask::Other } else { NextTask::Same }))
}

// --- VFS -------------------------------------------------------------

/// Copies a NUL-terminated userspace path string out into a kernel-owned
/// buffer, after checking it lies within the calling process's regions.
fn read_user_path<'b>(ctx: &SyscallContext, addr: u32, buf: &'b mut [u8]) -> Result<&'b str, UserError> {
    if !current_process_mpu(ctx)?.within_for_reading_nul_terminated(addr, buf.len() as u32) {
        return Err(UserError::recoverable(Errno::BadAddress));
    }
    let src = addr as *const u8;
    let mut len = 0;
    while len < buf.len() {
        // Safety: the byte range was just checked against the process's MPU
        // regions above.
        let byte = unsafe { *src.add(len) };
        if byte == 0 {
            break;
        }
        buf[len] = byte;
        len += 1;
    }
    core::str::from_utf8(&buf[..len]).map_err(|_| UserError::recoverable(Errno::InvalidArgument))
}

fn user_buffer<'b>(ctx: &SyscallContext, addr: u32, len: u32, writable: bool) -> Result<&'b mut [u8], UserError> {
    let mpu = current_process_mpu(ctx)?;
    let ok = if writable { mpu.within_for_writing(addr, len) } else { mpu.within_for_reading(addr, len) };
    if !ok {
        return Err(UserError::recoverable(Errno::BadAddress));
    }
    // Safety: `mpu` just confirmed this range belongs to the calling
    // process's own code or data region.
    Ok(unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len as usize) })
}

fn resolve_path<'b>(
    ctx: &SyscallContext,
    path_addr: u32,
    path_buf: &mut [u8; MAX_PATH_LEN],
    remainder_buf: &'b mut [u8; MAX_PATH_LEN],
) -> Result<(intrusive::ArcIntrusive<dyn crate::vfs::FilesystemBase>, &'b str), UserError> {
    let path = read_user_path(ctx, path_addr, path_buf)?;
    let (fs, remainder_len) =
        crate::vfs::path::resolve(ctx.mounts, "/", path, remainder_buf).map_err(UserError::recoverable)?;
    let remainder = core::str::from_utf8(&remainder_buf[..remainder_len])
        .map_err(|_| UserError::recoverable(Errno::InvalidArgument))?;
    Ok((fs, remainder))
}

fn current_fd_table(ctx: &mut SyscallContext) -> Result<&mut crate::vfs::fd::FileDescriptorTable, UserError> {
    let process = ctx.threads[ctx.current]
        .process
        .as_ref()
        .ok_or_else(|| UserError::recoverable(Errno::InvalidArgument))?;
    // Safety: the fd table is only ever touched while handling a syscall
    // trap from one of this process's own threads, which on this
    // single-core target can't run concurrently with this one.
    let table = core::ptr::addr_of!(process.fd_table) as *mut crate::vfs::fd::FileDescriptorTable;
    Ok(unsafe { &mut *table })
}

fn vfs_open(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let path_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let flags = OpenFlags::from_bits_truncate(ctx.threads[ctx.current].ctxsave.arg1());
    let mode = ctx.threads[ctx.current].ctxsave.arg2();

    let mut path_buf = [0u8; MAX_PATH_LEN];
    let mut remainder_buf = [0u8; MAX_PATH_LEN];
    let (fs, remainder) = resolve_path(ctx, path_addr, &mut path_buf, &mut remainder_buf)?;
    let file = fs.open(remainder, flags, mode).map_err(UserError::recoverable)?;

    let fd = current_fd_table(ctx)?.install(file).map_err(UserError::recoverable)?;
    Ok((fd as u32, NextTask::Same))
}

fn vfs_close(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    current_fd_table(ctx)?.close(fd).map_err(UserError::recoverable)?;
    Ok((0, NextTask::Same))
}

fn vfs_read(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let buf_addr = ctx.threads[ctx.current].ctxsave.arg1();
    let buf_len = ctx.threads[ctx.current].ctxsave.arg2();
    let buf = user_buffer(ctx, buf_addr, buf_len, true)?;
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    let n = file.read(buf).map_err(UserError::recoverable)?;
    Ok((n as u32, NextTask::Same))
}

fn vfs_write(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let buf_addr = ctx.threads[ctx.current].ctxsave.arg1();
    let buf_len = ctx.threads[ctx.current].ctxsave.arg2();
    let buf = user_buffer(ctx, buf_addr, buf_len, false)?;
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    let n = file.write(buf).map_err(UserError::recoverable)?;
    Ok((n as u32, NextTask::Same))
}

fn vfs_ioctl(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let request = ctx.threads[ctx.current].ctxsave.arg1();
    let arg = ctx.threads[ctx.current].ctxsave.arg2() as usize;
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    let n = file.ioctl(request, arg).map_err(UserError::recoverable)?;
    Ok((n as u32, NextTask::Same))
}

fn vfs_stat(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let path_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let out_addr = ctx.threads[ctx.current].ctxsave.arg1();

    let mut path_buf = [0u8; MAX_PATH_LEN];
    let mut remainder_buf = [0u8; MAX_PATH_LEN];
    let (fs, remainder) = resolve_path(ctx, path_addr, &mut path_buf, &mut remainder_buf)?;
    let stat = fs.lstat(remainder).map_err(UserError::recoverable)?;

    let out: NonNull<abi::Stat> = validated_ptr(ctx, out_addr)?;
    // Safety: `validated_ptr` confirmed `out` is writable for `size_of::<Stat>()`.
    unsafe {
        core::ptr::write_volatile(out.as_ptr(), stat);
    }
    Ok((0, NextTask::Same))
}

fn vfs_unlink(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let path_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let mut path_buf = [0u8; MAX_PATH_LEN];
    let mut remainder_buf = [0u8; MAX_PATH_LEN];
    let (fs, remainder) = resolve_path(ctx, path_addr, &mut path_buf, &mut remainder_buf)?;
    fs.unlink(remainder).map_err(UserError::recoverable)?;
    Ok((0, NextTask::Same))
}

fn vfs_mkdir(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let path_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let mode = ctx.threads[ctx.current].ctxsave.arg1();
    let mut path_buf = [0u8; MAX_PATH_LEN];
    let mut remainder_buf = [0u8; MAX_PATH_LEN];
    let (fs, remainder) = resolve_path(ctx, path_addr, &mut path_buf, &mut remainder_buf)?;
    fs.mkdir(remainder, mode).map_err(UserError::recoverable)?;
    Ok((0, NextTask::Same))
}

fn vfs_rmdir(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let path_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let mut path_buf = [0u8; MAX_PATH_LEN];
    let mut remainder_buf = [0u8; MAX_PATH_LEN];
    let (fs, remainder) = resolve_path(ctx, path_addr, &mut path_buf, &mut remainder_buf)?;
    fs.rmdir(remainder).map_err(UserError::recoverable)?;
    Ok((0, NextTask::Same))
}

/// `rename`'s two paths must resolve to the same filesystem; this kernel has
/// no cross-filesystem rename (there's no dedicated EXDEV in this ABI, so
/// that case surfaces as `NotSupported`).
fn vfs_rename(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let old_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let new_addr = ctx.threads[ctx.current].ctxsave.arg1();

    let mut old_path_buf = [0u8; MAX_PATH_LEN];
    let mut old_remainder_buf = [0u8; MAX_PATH_LEN];
    let (old_fs, old_remainder) = resolve_path(ctx, old_addr, &mut old_path_buf, &mut old_remainder_buf)?;

    let mut new_path_buf = [0u8; MAX_PATH_LEN];
    let mut new_remainder_buf = [0u8; MAX_PATH_LEN];
    let (new_fs, new_remainder) = resolve_path(ctx, new_addr, &mut new_path_buf, &mut new_remainder_buf)?;

    if old_fs.fs_id() != new_fs.fs_id() {
        return Err(UserError::recoverable(Errno::NotSupported));
    }
    old_fs.rename(old_remainder, new_remainder).map_err(UserError::recoverable)?;
    Ok((0, NextTask::Same))
}

fn vfs_lstat(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let path_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let out_addr = ctx.threads[ctx.current].ctxsave.arg1();

    let mut path_buf = [0u8; MAX_PATH_LEN];
    let mut remainder_buf = [0u8; MAX_PATH_LEN];
    let path = read_user_path(ctx, path_addr, &mut path_buf)?;
    let (fs, remainder_len) =
        crate::vfs::path::resolve_no_follow(ctx.mounts, "/", path, &mut remainder_buf).map_err(UserError::recoverable)?;
    let remainder = core::str::from_utf8(&remainder_buf[..remainder_len])
        .map_err(|_| UserError::recoverable(Errno::InvalidArgument))?;
    let stat = fs.lstat(remainder).map_err(UserError::recoverable)?;

    let out: NonNull<abi::Stat> = validated_ptr(ctx, out_addr)?;
    // Safety: `validated_ptr` confirmed `out` is writable for `size_of::<Stat>()`.
    unsafe {
        core::ptr::write_volatile(out.as_ptr(), stat);
    }
    Ok((0, NextTask::Same))
}

fn vfs_readlink(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let path_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let buf_addr = ctx.threads[ctx.current].ctxsave.arg1();
    let buf_len = ctx.threads[ctx.current].ctxsave.arg2();

    let mut path_buf = [0u8; MAX_PATH_LEN];
    let mut remainder_buf = [0u8; MAX_PATH_LEN];
    let path = read_user_path(ctx, path_addr, &mut path_buf)?;
    let (fs, remainder_len) =
        crate::vfs::path::resolve_no_follow(ctx.mounts, "/", path, &mut remainder_buf).map_err(UserError::recoverable)?;
    let remainder = core::str::from_utf8(&remainder_buf[..remainder_len])
        .map_err(|_| UserError::recoverable(Errno::InvalidArgument))?;

    let mut target_buf = [0u8; MAX_PATH_LEN];
    let target_len = fs.readlink(remainder, &mut target_buf).map_err(UserError::recoverable)?;

    let out = user_buffer(ctx, buf_addr, buf_len, true)?;
    let n = target_len.min(out.len());
    out[..n].copy_from_slice(&target_buf[..n]);
    Ok((n as u32, NextTask::Same))
}

fn vfs_lseek(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let whence = ctx.threads[ctx.current].ctxsave.arg1();
    let offset = ctx.threads[ctx.current].ctxsave.arg2() as i32;

    let pos = match whence {
        0 => SeekFrom::Start(offset.max(0) as u64),
        1 => SeekFrom::Current(offset as i64),
        2 => SeekFrom::End(offset as i64),
        _ => return Err(UserError::recoverable(Errno::InvalidArgument)),
    };
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    let new_pos = file.lseek(pos).map_err(UserError::recoverable)?;
    Ok((new_pos as u32, NextTask::Same))
}

fn vfs_fstat(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let out_addr = ctx.threads[ctx.current].ctxsave.arg1();
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    let stat = file.fstat().map_err(UserError::recoverable)?;

    let out: NonNull<abi::Stat> = validated_ptr(ctx, out_addr)?;
    // Safety: `validated_ptr` confirmed `out` is writable for `size_of::<Stat>()`.
    unsafe {
        core::ptr::write_volatile(out.as_ptr(), stat);
    }
    Ok((0, NextTask::Same))
}

fn vfs_fcntl(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let cmd = ctx.threads[ctx.current].ctxsave.arg1();
    let arg = ctx.threads[ctx.current].ctxsave.arg2() as usize;
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    let result = file.fcntl(cmd, arg).map_err(UserError::recoverable)?;
    Ok((result as u32, NextTask::Same))
}

fn vfs_ftruncate(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let lo = ctx.threads[ctx.current].ctxsave.arg1();
    let hi = ctx.threads[ctx.current].ctxsave.arg2();
    let length = (u64::from(hi) << 32) | u64::from(lo);
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    file.ftruncate(length).map_err(UserError::recoverable)?;
    Ok((0, NextTask::Same))
}

fn vfs_getdents(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let buf_addr = ctx.threads[ctx.current].ctxsave.arg1();
    let buf_len = ctx.threads[ctx.current].ctxsave.arg2();
    let buf = user_buffer(ctx, buf_addr, buf_len, true)?;
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    let n = file.getdents(buf).map_err(UserError::recoverable)?;
    Ok((n as u32, NextTask::Same))
}

fn vfs_isatty(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let file = current_fd_table(ctx)?.get(fd).map_err(UserError::recoverable)?.clone();
    Ok((file.isatty() as u32, NextTask::Same))
}

fn vfs_dup(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let fd = ctx.threads[ctx.current].ctxsave.arg0() as i32;
    let new_fd = current_fd_table(ctx)?.dup(fd).map_err(UserError::recoverable)?;
    Ok((new_fd as u32, NextTask::Same))
}

/// Writes the current monotonic time (64 bits, in scheduler ticks) into the
/// caller-supplied output pointer (arg0); a single 32-bit return register
/// isn't wide enough to carry it directly.
fn get_time(ctx: &mut SyscallContext) -> Result<(u32, NextTask), UserError> {
    let out_addr = ctx.threads[ctx.current].ctxsave.arg0();
    let out: NonNull<u64> = validated_ptr(ctx, out_addr)?;
    // Safety: `validated_ptr` confirmed `out` is writable for 8 bytes.
    unsafe {
        core::ptr::write_volatile(out.as_ptr(), u64::from(ctx.now));
    }
    Ok((0, NextTask::Same))
}
