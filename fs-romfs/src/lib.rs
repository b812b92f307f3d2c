#![cfg_attr(not(test), no_std)]

//! A read-only filesystem over a flat file table packed into a
//! memory-mapped flash image. Grounded on
//! `examples/original_source/miosix/filesystem/romfs/romfs.cpp`'s
//! `MemoryMappedRomFs`/`MemoryMappedRomFsFile` — the teacher has no
//! filesystem of its own to adapt (Hubris tasks are linked into the flash
//! image directly rather than loaded from one at runtime), so this crate's
//! shape follows the original's instead, translated onto the `FileBase`/
//! `FilesystemBase` traits `kern::vfs` defines.
//!
//! The on-disk layout is a flat table: there are no directory entries, and
//! a name like `"b/c"` is just a file name that happens to contain a slash,
//! matched against the whole mount-relative path as one opaque string.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use abi::{Errno, OpenFlags, Stat, ROMFS_FILE_NAME_MAX, ROMFS_MARKER, ROMFS_VERSION, RomFsFileRecord};
use intrusive::{ArcIntrusive, IntrusiveRefCounted};
use kern::vfs::{FileBase, FilesystemBase, SeekFrom};

const RECORD_SIZE: usize = core::mem::size_of::<RomFsFileRecord>();
const HEADER_LEN: usize = ROMFS_MARKER.len() + ROMFS_VERSION.len() + 4;

/// Inode of the filesystem root directory; file inodes start at 2, matching
/// the original (`findFile`'s `*inode = i + 2`).
const ROOT_INODE: u32 = 1;

/// Upper bound on file/directory handles this filesystem can have open at
/// once. Unrelated to how many files the image itself may contain.
const MAX_OPEN_HANDLES: usize = 16;

/// A single entry in the parsed file table: a name plus its span within the
/// image.
#[derive(Clone, Copy)]
struct Entry<'a> {
    name: &'a str,
    start: u32,
    length: u32,
}

/// A memory-mapped, read-only ROMFS filesystem.
pub struct RomFs {
    count: AtomicUsize,
    image: &'static [u8],
    file_count: u32,
    fs_id: u16,
    handles: [Handle; MAX_OPEN_HANDLES],
}

impl IntrusiveRefCounted for RomFs {
    fn ref_count(&self) -> &AtomicUsize {
        &self.count
    }
}

impl RomFs {
    /// Parses `image`'s header and validates the marker and version string.
    /// Fails with `Errno::NoSuchFile` if `image` does not look like a
    /// ROMFS image (mirrors the original's `failed` flag, checked eagerly
    /// here instead of lazily on first `open`/`lstat`, since Rust lets
    /// construction itself fail).
    pub fn new(image: &'static [u8], fs_id: u16) -> Result<Self, Errno> {
        if image.len() < HEADER_LEN {
            return Err(Errno::NoSuchFile);
        }
        if image[..ROMFS_MARKER.len()] != ROMFS_MARKER[..] {
            return Err(Errno::NoSuchFile);
        }
        let version_start = ROMFS_MARKER.len();
        let version_end = version_start + ROMFS_VERSION.len();
        if image[version_start..version_end] != ROMFS_VERSION[..] {
            return Err(Errno::NoSuchFile);
        }
        let count_bytes: [u8; 4] = image[version_end..version_end + 4]
            .try_into()
            .map_err(|_| Errno::NoSuchFile)?;
        let file_count = u32::from_le_bytes(count_bytes);
        let table_end = HEADER_LEN + file_count as usize * RECORD_SIZE;
        if image.len() < table_end {
            return Err(Errno::NoSuchFile);
        }
        Ok(RomFs {
            count: AtomicUsize::new(0),
            image,
            file_count,
            fs_id,
            handles: core::array::from_fn(|_| Handle::empty()),
        })
    }

    fn entry(&self, index: u32) -> Entry<'_> {
        entry_at(self.image, index)
    }

    /// Mirrors `findFile`: a linear scan of the flat table for an exact
    /// name match. Returns the matching entry and its inode (`index + 2`).
    fn find(&self, name: &str) -> Option<(u32, Entry<'_>)> {
        if name.len() > ROMFS_FILE_NAME_MAX {
            return None;
        }
        (0..self.file_count).find_map(|i| {
            let entry = self.entry(i);
            (entry.name == name).then_some((i + 2, entry))
        })
    }

    /// Strips the mount-relative path's leading `/`, leaving the flat name
    /// as stored in the table. `""` (the mountpoint root) stays `""`.
    fn flat_name(name: &str) -> &str {
        name.strip_prefix('/').unwrap_or(name)
    }

    fn claim_handle(&self) -> Result<&Handle, Errno> {
        self.handles
            .iter()
            .find(|h| h.count.load(Ordering::Acquire) == 0)
            .ok_or(Errno::OutOfMemory)
    }
}

impl FilesystemBase for RomFs {
    fn fs_id(&self) -> u16 {
        self.fs_id
    }

    fn open(&self, name: &str, flags: OpenFlags, _mode: u32) -> Result<ArcIntrusive<dyn FileBase>, Errno> {
        if flags.intersects(OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::APPEND) {
            return Err(Errno::ReadOnlyFilesystem);
        }
        let name = Self::flat_name(name);
        let handle = self.claim_handle()?;
        if name.is_empty() {
            handle.open_dir(self.fs_id, self.image, self.file_count);
        } else {
            let (inode, entry) = self.find(name).ok_or(Errno::NoSuchFile)?;
            handle.open_file(self.image, self.fs_id, inode, entry.start, entry.length);
        }
        let ptr: core::ptr::NonNull<dyn FileBase> = core::ptr::NonNull::from(handle);
        Ok(unsafe { ArcIntrusive::from_raw(ptr) })
    }

    fn lstat(&self, name: &str) -> Result<Stat, Errno> {
        let name = Self::flat_name(name);
        if name.is_empty() {
            return Ok(dir_stat(ROOT_INODE, self.fs_id));
        }
        let (inode, entry) = self.find(name).ok_or(Errno::NoSuchFile)?;
        Ok(file_stat(inode, self.fs_id, entry.length))
    }

    fn unlink(&self, _name: &str) -> Result<(), Errno> {
        Err(Errno::ReadOnlyFilesystem)
    }

    fn rename(&self, _old_name: &str, _new_name: &str) -> Result<(), Errno> {
        Err(Errno::ReadOnlyFilesystem)
    }

    fn mkdir(&self, _name: &str, _mode: u32) -> Result<(), Errno> {
        Err(Errno::ReadOnlyFilesystem)
    }

    fn rmdir(&self, _name: &str) -> Result<(), Errno> {
        Err(Errno::ReadOnlyFilesystem)
    }

    fn are_all_files_closed(&self) -> bool {
        self.handles.iter().all(|h| h.count.load(Ordering::Acquire) == 0)
    }
}

fn entry_at(image: &[u8], index: u32) -> Entry<'_> {
    let offset = HEADER_LEN + index as usize * RECORD_SIZE;
    let record = &image[offset..offset + RECORD_SIZE];
    let name_bytes = &record[..ROMFS_FILE_NAME_MAX];
    let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name = core::str::from_utf8(&name_bytes[..name_len]).unwrap_or("");
    let start = u32::from_le_bytes(record[ROMFS_FILE_NAME_MAX..ROMFS_FILE_NAME_MAX + 4].try_into().unwrap());
    let length = u32::from_le_bytes(record[ROMFS_FILE_NAME_MAX + 4..ROMFS_FILE_NAME_MAX + 8].try_into().unwrap());
    Entry { name, start, length }
}

fn file_stat(inode: u32, fs_id: u16, length: u32) -> Stat {
    Stat { st_dev: fs_id, st_ino: inode, st_mode: abi::S_IFREG | 0o755, st_size: u64::from(length), st_nlink: 1 }
}

fn dir_stat(inode: u32, fs_id: u16) -> Stat {
    Stat { st_dev: fs_id, st_ino: inode, st_mode: abi::S_IFDIR | 0o755, st_size: 0, st_nlink: 1 }
}

/// One open file or directory handle. A fixed pool embedded in `RomFs`
/// stands in for a per-open allocation: `count` reaching zero marks a slot
/// free for the next `open` to claim, the same reuse-by-scan discipline
/// `kern::syscalls::thread_create` uses for thread control blocks.
struct Handle {
    count: AtomicUsize,
    state: UnsafeCell<HandleState>,
}

#[derive(Clone, Copy)]
enum HandleState {
    Unopened,
    File { image: &'static [u8], fs_id: u16, inode: u32, start: u32, length: u32, seek: u64 },
    Dir { fs_id: u16, image: &'static [u8], file_count: u32, next: u32 },
}

// Safety: `state` is only written by `open_file`/`open_dir` before the
// handle is published (via `ArcIntrusive::from_raw`, which happens after),
// and thereafter only by `&self` methods that accept races the same way
// `vfs::pipe::PipeCore` does — this filesystem, like that one, is not
// meant to have the same fd used concurrently from two threads.
unsafe impl Sync for Handle {}

impl Handle {
    const fn empty() -> Self {
        Handle { count: AtomicUsize::new(0), state: UnsafeCell::new(HandleState::Unopened) }
    }

    fn open_file(&self, image: &'static [u8], fs_id: u16, inode: u32, start: u32, length: u32) {
        unsafe {
            *self.state.get() = HandleState::File { image, fs_id, inode, start, length, seek: 0 };
        }
    }

    fn open_dir(&self, fs_id: u16, image: &'static [u8], file_count: u32) {
        unsafe {
            *self.state.get() = HandleState::Dir { fs_id, image, file_count, next: 0 };
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut HandleState {
        unsafe { &mut *self.state.get() }
    }
}

impl IntrusiveRefCounted for Handle {
    fn ref_count(&self) -> &AtomicUsize {
        &self.count
    }
}

impl FileBase for Handle {
    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        match self.state() {
            HandleState::File { image, start, length, seek, .. } => {
                if *seek >= u64::from(*length) {
                    return Ok(0);
                }
                let remaining = u64::from(*length) - *seek;
                let n = buf.len().min(remaining as usize);
                let from = *start as usize + *seek as usize;
                buf[..n].copy_from_slice(&image[from..from + n]);
                *seek += n as u64;
                Ok(n)
            }
            HandleState::Dir { .. } => Err(Errno::IsDirectory),
            HandleState::Unopened => Err(Errno::BadFileDescriptor),
        }
    }

    fn write(&self, _buf: &[u8]) -> Result<usize, Errno> {
        Err(Errno::ReadOnlyFilesystem)
    }

    fn lseek(&self, pos: SeekFrom) -> Result<u64, Errno> {
        match self.state() {
            HandleState::File { length, seek, .. } => {
                let base = match pos {
                    SeekFrom::Start(offset) => offset as i64,
                    SeekFrom::Current(offset) => *seek as i64 + offset,
                    SeekFrom::End(offset) => i64::from(*length) + offset,
                };
                if base < 0 {
                    return Err(Errno::Overflow);
                }
                *seek = base as u64;
                Ok(*seek)
            }
            HandleState::Dir { .. } => Err(Errno::IsDirectory),
            HandleState::Unopened => Err(Errno::BadFileDescriptor),
        }
    }

    fn fstat(&self) -> Result<Stat, Errno> {
        match self.state() {
            HandleState::File { fs_id, inode, length, .. } => Ok(file_stat(*inode, *fs_id, *length)),
            HandleState::Dir { fs_id, .. } => Ok(dir_stat(ROOT_INODE, *fs_id)),
            HandleState::Unopened => Err(Errno::BadFileDescriptor),
        }
    }

    /// Entries are written as `[u8 name_len][name_len bytes of name]`, one
    /// per call's worth of buffer space; there is no shared POSIX `dirent`
    /// layout to target here since nothing upstream of this crate defines
    /// one. Returns the number of bytes emitted so far, advancing an
    /// internal cursor, never emitting a partial entry into `buf`.
    fn getdents(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        let (image, file_count, next) = match self.state() {
            HandleState::Dir { image, file_count, next, .. } => (*image, *file_count, next),
            HandleState::File { .. } => return Err(Errno::NotDirectory),
            HandleState::Unopened => return Err(Errno::BadFileDescriptor),
        };
        let mut written = 0usize;
        while *next < file_count {
            let name = entry_at(image, *next).name;
            let needed = 1 + name.len();
            if written + needed > buf.len() {
                break;
            }
            buf[written] = name.len() as u8;
            buf[written + 1..written + 1 + name.len()].copy_from_slice(name.as_bytes());
            written += needed;
            *next += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, start: u32, length: u32) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        bytes[ROMFS_FILE_NAME_MAX..ROMFS_FILE_NAME_MAX + 4].copy_from_slice(&start.to_le_bytes());
        bytes[ROMFS_FILE_NAME_MAX + 4..ROMFS_FILE_NAME_MAX + 8].copy_from_slice(&length.to_le_bytes());
        bytes
    }

    /// Builds the three-file conformance image: `"a"` -> `"x"`, `"b/c"` ->
    /// `"yy"`, `"d"` -> 1024 bytes of `0x5A`.
    fn three_file_image() -> &'static [u8] {
        let mut image = std::vec::Vec::new();
        image.extend_from_slice(&ROMFS_MARKER);
        image.extend_from_slice(&ROMFS_VERSION);
        image.extend_from_slice(&3u32.to_le_bytes());

        let body_start = HEADER_LEN + 3 * RECORD_SIZE;
        let bodies: [&[u8]; 3] = [b"x", b"yy", &[0x5A; 1024]];
        let mut offset = body_start as u32;
        let names = ["a", "b/c", "d"];
        for (name, body) in names.iter().zip(bodies.iter()) {
            image.extend_from_slice(&record(name, offset, body.len() as u32));
            offset += body.len() as u32;
        }
        for body in bodies {
            image.extend_from_slice(body);
        }
        std::boxed::Box::leak(image.into_boxed_slice())
    }

    #[test]
    fn stat_and_read_match_the_three_file_image() {
        let fs = RomFs::new(three_file_image(), 7).unwrap();

        let stat = fs.lstat("/b/c").unwrap();
        assert_eq!(stat.st_size, 2);
        assert_eq!(stat.st_mode & abi::S_IFMT, abi::S_IFREG);

        let file = fs.open("/b/c", OpenFlags::READ, 0).unwrap();
        let mut buf = [0u8; 8];
        let n = file.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"yy");

        let d = fs.open("/d", OpenFlags::READ, 0).unwrap();
        let mut full = [0u8; 1024];
        let mut total = 0;
        loop {
            let n = d.read(&mut full[total..]).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 1024);
        assert!(full.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn open_for_writing_is_rejected() {
        let fs = RomFs::new(three_file_image(), 0).unwrap();
        assert_eq!(fs.open("/a", OpenFlags::WRITE, 0).unwrap_err(), Errno::ReadOnlyFilesystem);
    }

    #[test]
    fn open_missing_file_is_no_such_file() {
        let fs = RomFs::new(three_file_image(), 0).unwrap();
        assert_eq!(fs.open("/missing", OpenFlags::READ, 0).unwrap_err(), Errno::NoSuchFile);
    }

    #[test]
    fn seek_past_start_then_read_resumes_from_there() {
        let fs = RomFs::new(three_file_image(), 0).unwrap();
        let file = fs.open("/d", OpenFlags::READ, 0).unwrap();
        assert_eq!(file.lseek(SeekFrom::Start(1000)).unwrap(), 1000);
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 8);
        assert!(buf.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn bad_marker_is_rejected_at_mount_time() {
        let mut image = std::vec::Vec::from(three_file_image());
        image[0] = 0;
        let leaked: &'static [u8] = std::boxed::Box::leak(image.into_boxed_slice());
        assert_eq!(RomFs::new(leaked, 0).unwrap_err(), Errno::NoSuchFile);
    }

    #[test]
    fn handle_pool_exhaustion_reports_out_of_memory() {
        let fs = RomFs::new(three_file_image(), 0).unwrap();
        let mut kept = std::vec::Vec::new();
        for _ in 0..MAX_OPEN_HANDLES {
            kept.push(fs.open("/a", OpenFlags::READ, 0).unwrap());
        }
        assert_eq!(fs.open("/a", OpenFlags::READ, 0).unwrap_err(), Errno::OutOfMemory);
    }
}
