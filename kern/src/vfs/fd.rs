//! Per-process file-descriptor table. Grounded on the small fixed-capacity
//! slot tables the teacher uses for task-local resources (no allocator), and
//! on spec.md's `dup`/`close` contract.

use abi::Errno;
use intrusive::ArcIntrusive;

use crate::config::MAX_OPEN_FILES;
use crate::vfs::FileBase;

pub struct FileDescriptorTable {
    slots: [Option<ArcIntrusive<dyn FileBase>>; MAX_OPEN_FILES],
}

impl FileDescriptorTable {
    pub fn new() -> Self {
        FileDescriptorTable { slots: core::array::from_fn(|_| None) }
    }

    /// Installs `file` in the lowest-numbered free slot, POSIX `open`-style.
    /// Fails with `OutOfMemory` (no dedicated EMFILE errno in this ABI) once
    /// `config::MAX_OPEN_FILES` are already open.
    pub fn install(&mut self, file: ArcIntrusive<dyn FileBase>) -> Result<i32, Errno> {
        let slot = self.slots.iter().position(Option::is_none).ok_or(Errno::OutOfMemory)?;
        self.slots[slot] = Some(file);
        Ok(slot as i32)
    }

    pub fn get(&self, fd: i32) -> Result<&ArcIntrusive<dyn FileBase>, Errno> {
        self.slot(fd)?.as_ref().ok_or(Errno::BadFileDescriptor)
    }

    pub fn close(&mut self, fd: i32) -> Result<(), Errno> {
        let slot = self.slot_mut(fd)?;
        if slot.take().is_none() {
            return Err(Errno::BadFileDescriptor);
        }
        Ok(())
    }

    /// `dup`: installs another reference to the same open file at the
    /// lowest-numbered free slot.
    pub fn dup(&mut self, fd: i32) -> Result<i32, Errno> {
        let file = self.get(fd)?.clone();
        self.install(file)
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn slot(&self, fd: i32) -> Result<&Option<ArcIntrusive<dyn FileBase>>, Errno> {
        usize::try_from(fd).ok().and_then(|i| self.slots.get(i)).ok_or(Errno::BadFileDescriptor)
    }

    fn slot_mut(&mut self, fd: i32) -> Result<&mut Option<ArcIntrusive<dyn FileBase>>, Errno> {
        usize::try_from(fd).ok().and_then(|i| self.slots.get_mut(i)).ok_or(Errno::BadFileDescriptor)
    }
}

impl Default for FileDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::SeekFrom;
    use core::sync::atomic::AtomicUsize;

    struct Dummy {
        count: AtomicUsize,
    }

    impl intrusive::IntrusiveRefCounted for Dummy {
        fn ref_count(&self) -> &AtomicUsize {
            &self.count
        }
    }

    impl FileBase for Dummy {
        fn read(&self, _buf: &mut [u8]) -> Result<usize, Errno> {
            Ok(0)
        }
        fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
            Ok(buf.len())
        }
        fn lseek(&self, _pos: SeekFrom) -> Result<u64, Errno> {
            Ok(0)
        }
        fn fstat(&self) -> Result<abi::Stat, Errno> {
            Err(Errno::NotSupported)
        }
    }

    fn dummy() -> ArcIntrusive<dyn FileBase> {
        let leaked: &'static mut Dummy = std::boxed::Box::leak(std::boxed::Box::new(Dummy {
            count: AtomicUsize::new(0),
        }));
        let ptr: core::ptr::NonNull<dyn FileBase> = core::ptr::NonNull::from(leaked);
        unsafe { ArcIntrusive::from_raw(ptr) }
    }

    #[test]
    fn install_returns_lowest_free_slot() {
        let mut table = FileDescriptorTable::new();
        assert_eq!(table.install(dummy()).unwrap(), 0);
        assert_eq!(table.install(dummy()).unwrap(), 1);
    }

    #[test]
    fn close_frees_the_slot_for_reuse() {
        let mut table = FileDescriptorTable::new();
        let fd = table.install(dummy()).unwrap();
        table.close(fd).unwrap();
        assert_eq!(table.install(dummy()).unwrap(), fd);
    }

    #[test]
    fn close_of_unopened_fd_errors() {
        let mut table = FileDescriptorTable::new();
        assert_eq!(table.close(3), Err(Errno::BadFileDescriptor));
    }

    #[test]
    fn dup_shares_the_same_file() {
        let mut table = FileDescriptorTable::new();
        let fd = table.install(dummy()).unwrap();
        let dupped = table.dup(fd).unwrap();
        assert_ne!(fd, dupped);
        assert_eq!(table.open_count(), 2);
    }
}
