//! Wire types shared between the kernel and userspace code linked against
//! `userlib`. Everything here is `#[repr(C)]`/zerocopy-friendly so it can
//! cross the syscall boundary or be written into a ROMFS image without a
//! serialization pass.

#![no_std]

use bitflags::bitflags;
use zerocopy::{Immutable, IntoBytes, KnownLayout, TryFromBytes};

/// Negative-errno space returned across the syscall boundary. A successful
/// syscall returns a non-negative value; a failed one returns `-(errno as
/// i32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum Errno {
    BadFileDescriptor = 1,
    NoSuchFile = 2,
    FileExists = 3,
    NotDirectory = 4,
    IsDirectory = 5,
    NotEmpty = 6,
    NameTooLong = 7,
    ReadOnlyFilesystem = 8,
    Busy = 9,
    Deadlock = 10,
    Timeout = 11,
    BadAddress = 12,
    NotSupported = 13,
    OutOfMemory = 14,
    Overflow = 15,
    InvalidArgument = 16,
    Interrupted = 17,
    WouldBlock = 18,
    NoSpace = 19,
    BrokenPipe = 20,
}

impl Errno {
    /// The value placed in a syscall's return register on failure.
    pub fn to_raw(self) -> i32 {
        -(self as i32)
    }
}

impl TryFrom<i32> for Errno {
    type Error = ();

    /// Recovers an `Errno` from a syscall's raw (negative) return value, the
    /// inverse of [`Errno::to_raw`]. Used on the calling side of the
    /// boundary, where only the `i32` survives the trip through a register.
    fn try_from(value: i32) -> Result<Self, ()> {
        use Errno::*;
        Ok(match -value {
            1 => BadFileDescriptor,
            2 => NoSuchFile,
            3 => FileExists,
            4 => NotDirectory,
            5 => IsDirectory,
            6 => NotEmpty,
            7 => NameTooLong,
            8 => ReadOnlyFilesystem,
            9 => Busy,
            10 => Deadlock,
            11 => Timeout,
            12 => BadAddress,
            13 => NotSupported,
            14 => OutOfMemory,
            15 => Overflow,
            16 => InvalidArgument,
            17 => Interrupted,
            18 => WouldBlock,
            19 => NoSpace,
            20 => BrokenPipe,
            _ => return Err(()),
        })
    }
}

/// A fault that cannot be represented as an `Errno` return: the kernel
/// revokes the offending thread's CPU time instead of answering its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    MemoryAccess,
    StackOverflow,
    BusError,
    DivideByZero,
    IllegalInstruction,
    InvalidSyscall,
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultData {
    pub kind: FaultKind,
    pub pc: u32,
    pub arg: u32,
}

impl FaultData {
    pub fn new(kind: FaultKind, pc: u32, arg: u32) -> Self {
        Self { kind, pc, arg }
    }
}

/// A thread's scheduling parameters. Exactly one variant is meaningful at a
/// time, selected by the build's active scheduler feature; all three are
/// represented here so wire records (e.g. thread-creation syscall args) have
/// a stable shape independent of which scheduler is compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingParams {
    /// Fixed-priority, round-robin-within-priority scheduling. Higher
    /// numeric value is more important, matching [`Priority`]'s ordering
    /// convention.
    Fixed { priority: u8 },
    /// Control-based scheduling: a nominal priority plus a realtime class
    /// that determines how aggressively a burst extension preempts.
    Control {
        priority: u8,
        realtime_class: RealtimeClass,
    },
    /// Earliest-deadline-first scheduling: an absolute deadline in kernel
    /// ticks.
    Edf { deadline: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeClass {
    Immediate,
    NextBurst,
    EndOfRound,
}

/// A fixed-priority scheduling priority: numerically higher is more
/// important, and 0 is reserved for the idle thread (the spec's "-1",
/// shifted up by one since this wraps an unsigned byte). Deliberately does
/// not implement `PartialOrd`/`Ord` even though a derived `Ord` would agree
/// with this convention: going through [`Priority::is_more_important_than`]
/// keeps call sites self-describing instead of relying on readers to recall
/// which direction is "greater".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Priority(pub u8);

impl Priority {
    pub fn is_more_important_than(&self, other: &Priority) -> bool {
        self.0 > other.0
    }

    pub fn most_important_of(&self, other: &Priority) -> Priority {
        if self.is_more_important_than(other) {
            *self
        } else {
            *other
        }
    }
}

/// Syscall numbers. Mirrors the kernel's `syscalls` dispatch table; kept in
/// one place so kernel and userlib can't drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Sysnum {
    ThreadCreate = 0,
    ThreadYield = 1,
    ThreadJoin = 2,
    ThreadExit = 3,
    ThreadSleep = 4,
    MutexLock = 5,
    MutexTryLock = 6,
    MutexUnlock = 7,
    CondWait = 8,
    CondTimedWait = 9,
    CondSignal = 10,
    CondBroadcast = 11,
    SemWait = 12,
    SemTryWait = 13,
    SemPost = 14,
    Open = 15,
    Close = 16,
    Read = 17,
    Write = 18,
    Ioctl = 19,
    Stat = 20,
    Unlink = 21,
    Mkdir = 22,
    ProcessSpawn = 23,
    ProcessWait = 24,
    GetTime = 25,
    GetPid = 26,
    GetPpid = 27,
    Lseek = 28,
    Fstat = 29,
    Lstat = 30,
    Rename = 31,
    Rmdir = 32,
    Fcntl = 33,
    Ftruncate = 34,
    Getdents = 35,
    Isatty = 36,
    Dup = 37,
    Readlink = 38,
    Nanosleep = 39,
}

impl TryFrom<u32> for Sysnum {
    type Error = Errno;

    fn try_from(value: u32) -> Result<Self, Errno> {
        use Sysnum::*;
        Ok(match value {
            0 => ThreadCreate,
            1 => ThreadYield,
            2 => ThreadJoin,
            3 => ThreadExit,
            4 => ThreadSleep,
            5 => MutexLock,
            6 => MutexTryLock,
            7 => MutexUnlock,
            8 => CondWait,
            9 => CondTimedWait,
            10 => CondSignal,
            11 => CondBroadcast,
            12 => SemWait,
            13 => SemTryWait,
            14 => SemPost,
            15 => Open,
            16 => Close,
            17 => Read,
            18 => Write,
            19 => Ioctl,
            20 => Stat,
            21 => Unlink,
            22 => Mkdir,
            23 => ProcessSpawn,
            24 => ProcessWait,
            25 => GetTime,
            26 => GetPid,
            27 => GetPpid,
            28 => Lseek,
            29 => Fstat,
            30 => Lstat,
            31 => Rename,
            32 => Rmdir,
            33 => Fcntl,
            34 => Ftruncate,
            35 => Getdents,
            36 => Isatty,
            37 => Dup,
            38 => Readlink,
            39 => Nanosleep,
            _ => return Err(Errno::InvalidArgument),
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
        const EXCLUSIVE = 1 << 3;
        const TRUNCATE = 1 << 4;
        const APPEND = 1 << 5;
        const NONBLOCK = 1 << 6;
        const DIRECTORY = 1 << 7;
        const SYNC = 1 << 8;
    }
}

/// `Stat::st_mode` file-type bits, POSIX `S_IFMT`/`S_IFLNK` convention.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;

/// ioctl request codes understood by `TerminalDevice`.
pub const IOCTL_SYNC: u32 = 1;
pub const IOCTL_TCGETATTR: u32 = 2;
pub const IOCTL_TCSETATTR_NOW: u32 = 3;
pub const IOCTL_TCSETATTR_DRAIN: u32 = 4;
pub const IOCTL_TCSETATTR_FLUSH: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub st_dev: u16,
    pub st_ino: u32,
    pub st_mode: u32,
    pub st_size: u64,
    pub st_nlink: u32,
}

/// ROMFS on-disk layout (spec §6): a fixed 32-byte marker, a 16-byte version
/// string, a little-endian file count, then that many fixed-size file
/// records.
pub const ROMFS_MARKER: [u8; 32] = [0x77; 32];
pub const ROMFS_VERSION: [u8; 16] = *b"RomFs 1.01\0\0\0\0\0\0";
pub const ROMFS_FILE_NAME_MAX: usize = 56;

#[derive(Debug, Clone, Copy, IntoBytes, TryFromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RomFsFileRecord {
    pub name: [u8; ROMFS_FILE_NAME_MAX],
    pub start: u32,
    pub length: u32,
}
