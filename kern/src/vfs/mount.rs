//! The mount table: longest-mountpoint-prefix dispatch from a normalized
//! absolute path to the `FilesystemBase` that owns it. Grounded on
//! `examples/original_source/miosix/filesystem/filesystem.cpp`'s mountpoint
//! list and its longest-prefix-match `getMountpoint`, reshaped from a
//! `std::vector`-backed list to a fixed `[Option<_>; MAX_MOUNTS]` table (no
//! allocator).

use abi::Errno;
use intrusive::ArcIntrusive;

use crate::config::{MAX_MOUNTS, MAX_PATH_LEN};
use crate::vfs::FilesystemBase;

struct MountEntry {
    prefix: [u8; MAX_PATH_LEN],
    prefix_len: usize,
    fs: ArcIntrusive<dyn FilesystemBase>,
}

pub struct MountTable {
    entries: [Option<MountEntry>; MAX_MOUNTS],
}

impl MountTable {
    pub fn new() -> Self {
        MountTable { entries: core::array::from_fn(|_| None) }
    }

    /// Mounts `fs` at `prefix`, a normalized absolute path. Fails with
    /// `FileExists` if something is already mounted at exactly that path,
    /// `NameTooLong` if `prefix` doesn't fit `MAX_PATH_LEN`, `OutOfMemory`
    /// if the table is full.
    pub fn mount(&mut self, prefix: &str, fs: ArcIntrusive<dyn FilesystemBase>) -> Result<(), Errno> {
        if !prefix.starts_with('/') {
            return Err(Errno::InvalidArgument);
        }
        if prefix.len() > MAX_PATH_LEN {
            return Err(Errno::NameTooLong);
        }
        if self.entries.iter().flatten().any(|e| e.prefix() == prefix) {
            return Err(Errno::FileExists);
        }
        let slot = self.entries.iter().position(Option::is_none).ok_or(Errno::OutOfMemory)?;
        let mut bytes = [0u8; MAX_PATH_LEN];
        bytes[..prefix.len()].copy_from_slice(prefix.as_bytes());
        self.entries[slot] = Some(MountEntry { prefix: bytes, prefix_len: prefix.len(), fs });
        Ok(())
    }

    /// Unmounts the filesystem mounted at exactly `prefix`. Fails with
    /// `Busy` if it still has open files, `NoSuchFile` if nothing is
    /// mounted there.
    pub fn unmount(&mut self, prefix: &str) -> Result<(), Errno> {
        let slot = self
            .entries
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.prefix() == prefix))
            .ok_or(Errno::NoSuchFile)?;
        let entry = self.entries[slot].as_ref().unwrap();
        if !entry.fs.are_all_files_closed() {
            return Err(Errno::Busy);
        }
        self.entries[slot] = None;
        Ok(())
    }

    /// Finds the longest mounted prefix of `path` (a normalized absolute
    /// path) and returns that filesystem plus the path remainder relative
    /// to the mountpoint, always starting with `/` (or empty for the
    /// mountpoint's own root). A prefix only matches at a path-component
    /// boundary: `/mnt` does not match `/mnt2/foo`.
    pub fn resolve<'p>(&self, path: &'p str) -> Result<(&ArcIntrusive<dyn FilesystemBase>, &'p str), Errno> {
        let mut best: Option<(&MountEntry, usize)> = None;
        for entry in self.entries.iter().flatten() {
            let prefix = entry.prefix();
            if !path.starts_with(prefix) {
                continue;
            }
            let boundary_ok = prefix == "/"
                || path.len() == prefix.len()
                || path.as_bytes()[prefix.len()] == b'/';
            if !boundary_ok {
                continue;
            }
            let better = match best {
                Some((_, len)) => prefix.len() > len,
                None => true,
            };
            if better {
                best = Some((entry, prefix.len()));
            }
        }
        let (entry, prefix_len) = best.ok_or(Errno::NoSuchFile)?;
        let remainder = &path[prefix_len..];
        Ok((&entry.fs, remainder))
    }
}

impl MountEntry {
    fn prefix(&self) -> &str {
        core::str::from_utf8(&self.prefix[..self.prefix_len]).unwrap_or("")
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    struct Fake {
        count: AtomicUsize,
        id: u16,
    }

    impl intrusive::IntrusiveRefCounted for Fake {
        fn ref_count(&self) -> &AtomicUsize {
            &self.count
        }
    }

    impl FilesystemBase for Fake {
        fn fs_id(&self) -> u16 {
            self.id
        }
        fn open(
            &self,
            _name: &str,
            _flags: abi::OpenFlags,
            _mode: u32,
        ) -> Result<ArcIntrusive<dyn crate::vfs::FileBase>, Errno> {
            Err(Errno::NotSupported)
        }
        fn lstat(&self, _name: &str) -> Result<abi::Stat, Errno> {
            Err(Errno::NotSupported)
        }
        fn unlink(&self, _name: &str) -> Result<(), Errno> {
            Err(Errno::NotSupported)
        }
        fn rename(&self, _old_name: &str, _new_name: &str) -> Result<(), Errno> {
            Err(Errno::NotSupported)
        }
        fn mkdir(&self, _name: &str, _mode: u32) -> Result<(), Errno> {
            Err(Errno::NotSupported)
        }
        fn rmdir(&self, _name: &str) -> Result<(), Errno> {
            Err(Errno::NotSupported)
        }
        fn are_all_files_closed(&self) -> bool {
            true
        }
    }

    fn fake(id: u16) -> ArcIntrusive<dyn FilesystemBase> {
        let leaked: &'static mut Fake = std::boxed::Box::leak(std::boxed::Box::new(Fake { count: AtomicUsize::new(0), id }));
        let ptr: core::ptr::NonNull<dyn FilesystemBase> = core::ptr::NonNull::from(leaked);
        unsafe { ArcIntrusive::from_raw(ptr) }
    }

    #[test]
    fn resolves_to_longest_matching_mountpoint() {
        let mut table = MountTable::new();
        table.mount("/", fake(0)).unwrap();
        table.mount("/mnt", fake(1)).unwrap();
        table.mount("/mnt/flash", fake(2)).unwrap();

        let (fs, rest) = table.resolve("/mnt/flash/a").unwrap();
        assert_eq!(fs.fs_id(), 2);
        assert_eq!(rest, "/a");

        let (fs, rest) = table.resolve("/mnt/other").unwrap();
        assert_eq!(fs.fs_id(), 1);
        assert_eq!(rest, "/other");
    }

    #[test]
    fn prefix_match_respects_component_boundary() {
        let mut table = MountTable::new();
        table.mount("/", fake(0)).unwrap();
        table.mount("/mnt", fake(1)).unwrap();

        let (fs, rest) = table.resolve("/mnt2/foo").unwrap();
        assert_eq!(fs.fs_id(), 0);
        assert_eq!(rest, "/mnt2/foo");
    }

    #[test]
    fn mounting_twice_at_same_path_fails() {
        let mut table = MountTable::new();
        table.mount("/mnt", fake(0)).unwrap();
        assert_eq!(table.mount("/mnt", fake(1)), Err(Errno::FileExists));
    }

    #[test]
    fn resolve_without_root_mount_fails() {
        let table = MountTable::new();
        assert_eq!(table.resolve("/a").unwrap_err(), Errno::NoSuchFile);
    }
}
