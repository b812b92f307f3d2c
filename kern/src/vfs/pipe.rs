//! An anonymous pipe: a fixed-capacity ring buffer with independent read and
//! write endpoints. Grounded on the ring-buffer shape of
//! `examples/original_source/miosix/kernel/sync.h`'s `Semaphore` users (the
//! pipe is itself built on top of `sync::semaphore::Semaphore` for the
//! "wake whoever is waiting for space/data" signal) and on spec.md's
//! explicit correction of the original's `use_count==3` "unconnected"
//! heuristic: this tracks `reader_count`/`writer_count` directly instead of
//! inferring connectedness from the intrusive refcount.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use abi::{Errno, Stat};
use intrusive::IntrusiveRefCounted;

use crate::config::PIPE_BUFFER_SIZE;
use crate::sync::semaphore::Semaphore;
use crate::vfs::{FileBase, SeekFrom};

/// The shared ring buffer plus endpoint bookkeeping both ends of a pipe
/// point at.
pub struct PipeCore {
    count: AtomicUsize,
    buffer: UnsafeCell<[u8; PIPE_BUFFER_SIZE]>,
    state: UnsafeCell<RingState>,
    /// Signaled once per call that adds bytes to an empty buffer.
    pub not_empty: Semaphore,
    /// Signaled once per call that frees space in a full buffer.
    pub not_full: Semaphore,
}

struct RingState {
    start: usize,
    len: usize,
    readers: u32,
    writers: u32,
}

unsafe impl Sync for PipeCore {}

impl IntrusiveRefCounted for PipeCore {
    fn ref_count(&self) -> &AtomicUsize {
        &self.count
    }
}

impl PipeCore {
    pub fn new() -> Self {
        PipeCore {
            count: AtomicUsize::new(0),
            buffer: UnsafeCell::new([0; PIPE_BUFFER_SIZE]),
            state: UnsafeCell::new(RingState { start: 0, len: 0, readers: 1, writers: 1 }),
            not_empty: Semaphore::new(0),
            not_full: Semaphore::new(0),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut RingState {
        unsafe { &mut *self.state.get() }
    }

    fn buffer(&self) -> &mut [u8; PIPE_BUFFER_SIZE] {
        unsafe { &mut *self.buffer.get() }
    }

    /// Copies as much of `data` as currently fits, wrapping the ring.
    /// Returns the number of bytes actually written, which may be less than
    /// `data.len()` (including zero) if the buffer is full. Wakes at most
    /// one reader if this call transitioned the buffer from empty to
    /// nonempty.
    fn write_bytes(&self, data: &[u8]) -> usize {
        let was_empty = self.state().len == 0;
        let capacity = PIPE_BUFFER_SIZE;
        let n = data.len().min(capacity - self.state().len);
        let buffer = self.buffer();
        let state = self.state();
        let write_pos = (state.start + state.len) % capacity;
        for (i, &byte) in data[..n].iter().enumerate() {
            buffer[(write_pos + i) % capacity] = byte;
        }
        state.len += n;
        if n > 0 && was_empty {
            unsafe {
                self.not_empty.signal();
            }
        }
        n
    }

    /// Copies as much as fits into `buf` out of the ring, in FIFO order.
    /// Returns the number of bytes actually read (may be less than
    /// `buf.len()`, including zero, if the buffer is empty). Wakes at most
    /// one writer if this call transitioned the buffer from full to
    /// non-full.
    fn read_bytes(&self, buf: &mut [u8]) -> usize {
        let was_full = self.state().len == PIPE_BUFFER_SIZE;
        let capacity = PIPE_BUFFER_SIZE;
        let state = self.state();
        let n = buf.len().min(state.len);
        let buffer = self.buffer();
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            *slot = buffer[(state.start + i) % capacity];
        }
        state.start = (state.start + n) % capacity;
        state.len -= n;
        if n > 0 && was_full {
            unsafe {
                self.not_full.signal();
            }
        }
        n
    }

    fn readers(&self) -> u32 {
        self.state().readers
    }

    fn writers(&self) -> u32 {
        self.state().writers
    }

    /// Called when a read endpoint is fully closed (its last file
    /// descriptor dropped); wakes any writer blocked on `not_full` so it
    /// can observe `BrokenPipe` instead of waiting forever.
    pub unsafe fn close_reader(&self) {
        let state = self.state();
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.not_full.signal();
        }
    }

    /// Called when a write endpoint is fully closed; wakes any reader
    /// blocked on `not_empty` so it can observe end-of-stream.
    pub unsafe fn close_writer(&self) {
        let state = self.state();
        state.writers = state.writers.saturating_sub(1);
        if state.writers == 0 {
            self.not_empty.signal();
        }
    }
}

impl Default for PipeCore {
    fn default() -> Self {
        Self::new()
    }
}

/// The read end of a pipe. `FileBase::write` is unsupported.
pub struct ReadEnd {
    count: AtomicUsize,
    core: intrusive::ArcIntrusive<PipeCore>,
}

/// The write end of a pipe. `FileBase::read` is unsupported.
pub struct WriteEnd {
    count: AtomicUsize,
    core: intrusive::ArcIntrusive<PipeCore>,
}

impl ReadEnd {
    pub fn new(core: intrusive::ArcIntrusive<PipeCore>) -> Self {
        ReadEnd { count: AtomicUsize::new(0), core }
    }
}

impl WriteEnd {
    pub fn new(core: intrusive::ArcIntrusive<PipeCore>) -> Self {
        WriteEnd { count: AtomicUsize::new(0), core }
    }
}

impl IntrusiveRefCounted for ReadEnd {
    fn ref_count(&self) -> &AtomicUsize {
        &self.count
    }
}

impl IntrusiveRefCounted for WriteEnd {
    fn ref_count(&self) -> &AtomicUsize {
        &self.count
    }
}

fn pipe_stat(size: u64) -> Stat {
    Stat { st_dev: 0, st_ino: 0, st_mode: 0, st_size: size, st_nlink: 1 }
}

impl FileBase for ReadEnd {
    /// Reads whatever is available without blocking. A return of `Ok(0)`
    /// means either nothing is available yet (the writer is still
    /// connected: the caller should block on `self.core.not_empty` and
    /// retry, the same single-shot-primitive pattern `kern::sync` uses) or
    /// the writer has fully closed (end of stream: there is no difference
    /// in the return value between the two, matching a real pipe's
    /// `read()` returning 0 at EOF).
    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        Ok(self.core.read_bytes(buf))
    }

    fn write(&self, _buf: &[u8]) -> Result<usize, Errno> {
        Err(Errno::NotSupported)
    }

    fn lseek(&self, _pos: SeekFrom) -> Result<u64, Errno> {
        Err(Errno::NotSupported)
    }

    fn fstat(&self) -> Result<Stat, Errno> {
        Ok(pipe_stat(0))
    }
}

impl FileBase for WriteEnd {
    fn read(&self, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(Errno::NotSupported)
    }

    /// Writes whatever fits without blocking. A partial (including zero)
    /// write means the buffer is full: the caller should block on
    /// `self.core.not_full` and retry the remainder. If the read end has
    /// fully closed, this returns `BrokenPipe` instead of silently
    /// discarding data.
    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        if self.core.readers() == 0 {
            return Err(Errno::BrokenPipe);
        }
        Ok(self.core.write_bytes(buf))
    }

    fn lseek(&self, _pos: SeekFrom) -> Result<u64, Errno> {
        Err(Errno::NotSupported)
    }

    fn fstat(&self) -> Result<Stat, Errno> {
        Ok(pipe_stat(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pipe() -> intrusive::ArcIntrusive<PipeCore> {
        let leaked: &'static mut PipeCore = std::boxed::Box::leak(std::boxed::Box::new(PipeCore::new()));
        unsafe { intrusive::ArcIntrusive::from_raw(core::ptr::NonNull::from(leaked)) }
    }

    #[test]
    fn write_more_than_capacity_is_partial() {
        let core = new_pipe();
        let writer = WriteEnd::new(core);
        let data = [b'x'; PIPE_BUFFER_SIZE + 1];
        assert_eq!(writer.write(&data).unwrap(), PIPE_BUFFER_SIZE);
        assert_eq!(writer.write(&data[PIPE_BUFFER_SIZE..]).unwrap(), 0);
    }

    #[test]
    fn full_stream_is_read_back_in_order_after_drain() {
        let core = new_pipe();
        let reader = ReadEnd::new(core.clone());
        let writer = WriteEnd::new(core);

        let total = PIPE_BUFFER_SIZE + 1;
        let data: std::vec::Vec<u8> = (0..total).map(|i| (i % 256) as u8).collect();

        let first = writer.write(&data).unwrap();
        assert_eq!(first, PIPE_BUFFER_SIZE);

        let mut collected = std::vec::Vec::new();
        let mut out = [0u8; 64];
        loop {
            let n = reader.read(&mut out).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&out[..n]);
        }
        assert_eq!(collected.len(), PIPE_BUFFER_SIZE);

        let remaining = writer.write(&data[first..]).unwrap();
        assert_eq!(remaining, 1);
        let n = reader.read(&mut out).unwrap();
        assert_eq!(&out[..n], &data[PIPE_BUFFER_SIZE..]);

        collected.extend_from_slice(&out[..n]);
        assert_eq!(collected, data);
    }

    #[test]
    fn write_after_reader_closed_is_broken_pipe() {
        let core = new_pipe();
        let writer = WriteEnd::new(core.clone());
        unsafe {
            core.close_reader();
        }
        assert_eq!(writer.write(b"x"), Err(Errno::BrokenPipe));
    }

    #[test]
    fn read_after_writer_closed_returns_eof() {
        let core = new_pipe();
        let reader = ReadEnd::new(core.clone());
        unsafe {
            core.close_writer();
        }
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
