//! The virtual filesystem layer: the `FileBase`/`FilesystemBase` capability
//! traits concrete filesystems and device drivers implement, the mount
//! table, the per-process file-descriptor table, path resolution, and the
//! terminal line discipline. Grounded on the VFS contract in
//! `examples/original_source/miosix/filesystem/*`; the teacher has no VFS of
//! its own; its closest analogue is `drv/*`'s "implement a trait, get picked
//! up by the kernel" pattern.

pub mod console;
pub mod fd;
pub mod mount;
pub mod path;
pub mod pipe;
pub mod tty;

use abi::{OpenFlags, Stat};
use intrusive::IntrusiveRefCounted;

/// Where `lseek` measures its offset from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}

/// An open file. Implemented by device drivers and by concrete filesystems'
/// file types (e.g. `fs-romfs`'s read-only file handle).
pub trait FileBase: IntrusiveRefCounted {
    fn read(&self, buf: &mut [u8]) -> Result<usize, abi::Errno>;
    fn write(&self, buf: &[u8]) -> Result<usize, abi::Errno>;
    fn lseek(&self, pos: SeekFrom) -> Result<u64, abi::Errno>;
    fn fstat(&self) -> Result<Stat, abi::Errno>;
    fn isatty(&self) -> bool {
        false
    }
    fn sync(&self) -> Result<(), abi::Errno> {
        Ok(())
    }
    fn ioctl(&self, request: u32, arg: usize) -> Result<usize, abi::Errno> {
        match request {
            abi::IOCTL_SYNC => self.sync().map(|()| 0),
            _ => Err(abi::Errno::NotSupported),
        }
    }
    fn getdents(&self, _buf: &mut [u8]) -> Result<usize, abi::Errno> {
        Err(abi::Errno::NotDirectory)
    }
    fn fcntl(&self, _cmd: u32, _arg: usize) -> Result<usize, abi::Errno> {
        Err(abi::Errno::NotSupported)
    }
    fn ftruncate(&self, _length: u64) -> Result<(), abi::Errno> {
        Err(abi::Errno::NotSupported)
    }
}

/// A mountable filesystem. Implemented by concrete filesystems (`fs-romfs`
/// is the one shipped here); device drivers that want a single well-known
/// path (a console, a pipe endpoint) typically implement this with a
/// filesystem of exactly one file.
pub trait FilesystemBase: IntrusiveRefCounted {
    /// This filesystem's unique id, used to populate `Stat::st_dev` so that
    /// `(st_dev, st_ino)` is globally unique across mounts.
    fn fs_id(&self) -> u16;

    fn open(
        &self,
        name: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<intrusive::ArcIntrusive<dyn FileBase>, abi::Errno>;

    fn lstat(&self, name: &str) -> Result<Stat, abi::Errno>;
    fn unlink(&self, name: &str) -> Result<(), abi::Errno>;
    fn rename(&self, old_name: &str, new_name: &str) -> Result<(), abi::Errno>;
    fn mkdir(&self, name: &str, mode: u32) -> Result<(), abi::Errno>;
    fn rmdir(&self, name: &str) -> Result<(), abi::Errno>;

    fn readlink(&self, _name: &str, _out: &mut [u8]) -> Result<usize, abi::Errno> {
        Err(abi::Errno::NotSupported)
    }
    fn supports_symlinks(&self) -> bool {
        false
    }

    /// Used before unmount: refuses to unmount a filesystem with open files.
    fn are_all_files_closed(&self) -> bool;
}
