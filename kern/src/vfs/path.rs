//! Path resolution: normalize, find the owning mountpoint, and follow
//! symlinks up to `config::MAX_SYMLINK_DEPTH` deep. Grounded on spec.md §4.5
//! and `kerncore::path`'s allocation-free normalizer/`Components` iterator;
//! the `StringPart` temporary-NUL-termination trick the original uses to
//! avoid allocating a substring is replaced by `kerncore::path` working
//! directly over `&str` slices (see that module's doc comment), so this
//! resolver needs no unsafe string surgery to get the same "no heap
//! allocation in the hot path" guarantee.

use abi::{Errno, S_IFLNK, S_IFMT};
use intrusive::ArcIntrusive;

use crate::config::{MAX_PATH_LEN, MAX_SYMLINK_DEPTH};
use crate::vfs::mount::MountTable;
use crate::vfs::FilesystemBase;

/// Resolves `path` (relative to `cwd` if not absolute) against `mounts`,
/// writing the path remainder relative to the owning filesystem's root into
/// `out` and returning `(filesystem, remainder_len)`. Follows symlinks when
/// the owning filesystem reports `supports_symlinks()`, bounded by
/// `MAX_SYMLINK_DEPTH` redirections to prevent livelock on a cyclic link.
/// This is the `stat`/`open` resolution behavior; see [`resolve_no_follow`]
/// for `lstat`'s "don't follow the final component" variant.
pub fn resolve(
    mounts: &MountTable,
    cwd: &str,
    path: &str,
    out: &mut [u8],
) -> Result<(ArcIntrusive<dyn FilesystemBase>, usize), Errno> {
    resolve_inner(mounts, cwd, path, out, true)
}

/// Like [`resolve`], but if the final path component is itself a symlink, it
/// is returned unresolved rather than followed -- `lstat`'s contract.
/// Symlinks encountered while resolving earlier components are still
/// followed, since those components must name directories to traverse.
pub fn resolve_no_follow(
    mounts: &MountTable,
    cwd: &str,
    path: &str,
    out: &mut [u8],
) -> Result<(ArcIntrusive<dyn FilesystemBase>, usize), Errno> {
    resolve_inner(mounts, cwd, path, out, false)
}

fn resolve_inner(
    mounts: &MountTable,
    cwd: &str,
    path: &str,
    out: &mut [u8],
    follow_final: bool,
) -> Result<(ArcIntrusive<dyn FilesystemBase>, usize), Errno> {
    let mut buf = [0u8; MAX_PATH_LEN];
    let mut current_len = normalize_relative(cwd, path, &mut buf)?;

    for step in 0..=MAX_SYMLINK_DEPTH {
        let current = core::str::from_utf8(&buf[..current_len]).map_err(|_| Errno::InvalidArgument)?;
        let (fs, remainder) = mounts.resolve(current)?;

        let is_symlink = fs.supports_symlinks()
            && fs.lstat(remainder).is_ok_and(|stat| stat.st_mode & S_IFMT == S_IFLNK);

        if !is_symlink || (step == 0 && !follow_final) {
            let n = remainder.len().min(out.len());
            out[..n].copy_from_slice(&remainder.as_bytes()[..n]);
            return Ok((fs.clone(), n));
        }

        let mut target = [0u8; MAX_PATH_LEN];
        let target_len = fs.readlink(remainder, &mut target)?;
        let target_str = core::str::from_utf8(&target[..target_len]).map_err(|_| Errno::InvalidArgument)?;
        current_len = normalize_relative(current, target_str, &mut buf)?;
    }

    // The ABI has no dedicated ELOOP; a redirection chain this deep is
    // malformed input as far as the caller is concerned.
    Err(Errno::InvalidArgument)
}

fn normalize_relative(cwd: &str, path: &str, out: &mut [u8; MAX_PATH_LEN]) -> Result<usize, Errno> {
    if path.starts_with('/') {
        return kerncore::path::normalize(path, out);
    }
    let mut combined = [0u8; MAX_PATH_LEN];
    if cwd.len() + 1 + path.len() > combined.len() {
        return Err(Errno::NameTooLong);
    }
    let mut w = 0;
    combined[w..w + cwd.len()].copy_from_slice(cwd.as_bytes());
    w += cwd.len();
    combined[w] = b'/';
    w += 1;
    combined[w..w + path.len()].copy_from_slice(path.as_bytes());
    w += path.len();
    let combined_str = core::str::from_utf8(&combined[..w]).map_err(|_| Errno::InvalidArgument)?;
    kerncore::path::normalize(combined_str, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    struct Root;

    impl intrusive::IntrusiveRefCounted for Root {
        fn ref_count(&self) -> &AtomicUsize {
            static COUNT: AtomicUsize = AtomicUsize::new(0);
            &COUNT
        }
    }

    impl FilesystemBase for Root {
        fn fs_id(&self) -> u16 {
            0
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

    fn root_fs() -> ArcIntrusive<dyn FilesystemBase> {
        let leaked: &'static mut Root = std::boxed::Box::leak(std::boxed::Box::new(Root));
        let ptr: core::ptr::NonNull<dyn FilesystemBase> = core::ptr::NonNull::from(leaked);
        unsafe { ArcIntrusive::from_raw(ptr) }
    }

    #[test]
    fn resolves_absolute_path_against_root_mount() {
        let mut mounts = MountTable::new();
        mounts.mount("/", root_fs()).unwrap();
        let mut out = [0u8; 64];
        let (fs, n) = resolve(&mounts, "/", "/a/b", &mut out).unwrap();
        assert_eq!(fs.fs_id(), 0);
        assert_eq!(&out[..n], b"/a/b");
    }

    #[test]
    fn resolves_relative_path_against_cwd() {
        let mut mounts = MountTable::new();
        mounts.mount("/", root_fs()).unwrap();
        let mut out = [0u8; 64];
        let (_, n) = resolve(&mounts, "/a", "b/../c", &mut out).unwrap();
        assert_eq!(&out[..n], b"/a/c");
    }

    #[test]
    fn no_matching_mount_fails() {
        let mounts = MountTable::new();
        let mut out = [0u8; 64];
        assert_eq!(resolve(&mounts, "/", "/a", &mut out).unwrap_err(), Errno::NoSuchFile);
    }
}
