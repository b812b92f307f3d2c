//! The line-discipline wrapper around a raw character device. Grounded on
//! spec.md's `TerminalDevice` contract (§4), itself a Rust reshaping of
//! `examples/original_source/miosix/kernel/console/*`'s canonical-mode
//! terminal handling (CRLF translation, echo, backspace erase sequence).

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use abi::{Errno, Stat};
use intrusive::IntrusiveRefCounted;

use crate::vfs::{FileBase, SeekFrom};

/// Backspace byte: DEL.
const DEL: u8 = 0x7F;
/// Backspace byte: BS.
const BS: u8 = 0x08;

/// Wraps any [`FileBase`] character device with canonical-mode line
/// discipline. Writes are never serialized (to permit a concurrent reader),
/// but reads are, since backspace handling must see a consistent echo
/// state. `set_echo`/`set_binary` are not behind the read mutex: they're
/// expected to be set once at open time, not raced against in-flight reads.
pub struct TerminalDevice<D: FileBase> {
    count: AtomicUsize,
    inner: D,
    echo: AtomicBool,
    binary: AtomicBool,
    /// Non-blocking reentrancy guard for `read_canonical`: canonical reads
    /// are not expected to contend (one console, one reader), so a full
    /// blocking mutex with thread-queue bookkeeping would be overkill here;
    /// a second concurrent reader gets `Errno::Busy` instead of blocking.
    reading: AtomicBool,
    /// A byte read from `inner` while looking ahead past a `\r` for a
    /// paired `\n`, not itself part of the line just returned. Consumed by
    /// the next `read_canonical` call before touching `inner` again.
    pending: Cell<Option<u8>>,
}

impl<D: FileBase> IntrusiveRefCounted for TerminalDevice<D> {
    fn ref_count(&self) -> &AtomicUsize {
        &self.count
    }
}

impl<D: FileBase> TerminalDevice<D> {
    pub fn new(inner: D) -> Self {
        TerminalDevice {
            count: AtomicUsize::new(0),
            inner,
            echo: AtomicBool::new(false),
            binary: AtomicBool::new(false),
            reading: AtomicBool::new(false),
            pending: Cell::new(None),
        }
    }

    pub fn set_echo(&self, enabled: bool) {
        self.echo.store(enabled, Ordering::Relaxed);
    }

    pub fn is_echo_enabled(&self) -> bool {
        self.echo.load(Ordering::Relaxed)
    }

    pub fn set_binary(&self, enabled: bool) {
        self.binary.store(enabled, Ordering::Relaxed);
    }

    pub fn is_binary(&self) -> bool {
        self.binary.load(Ordering::Relaxed)
    }

    fn echo_byte(&self, byte: u8) {
        if self.is_echo_enabled() {
            let _ = self.inner.write(&[byte]);
        }
    }

    /// Reads one line (up to `buf.len()` bytes) in canonical mode: `\r`,
    /// `\n`, and `\r\n` are all accepted as end-of-line and normalized to a
    /// single trailing `\n`; `DEL`/`BS` erase the previously accepted byte
    /// and, if echoing, emit the three-byte `BS SP BS` erase sequence.
    /// Guarded by `reading` so two readers can't interleave backspace
    /// state; a contending reader gets `Busy` rather than blocking (see the
    /// field doc comment).
    fn read_canonical(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if self.reading.swap(true, Ordering::Acquire) {
            return Err(Errno::Busy);
        }
        let result = self.read_canonical_locked(buf);
        self.reading.store(false, Ordering::Release);
        result
    }

    /// Reads the next input byte, preferring a byte left over from a
    /// previous call's `\r`-lookahead before touching `inner`.
    fn next_byte(&self) -> Result<Option<u8>, Errno> {
        if let Some(b) = self.pending.take() {
            return Ok(Some(b));
        }
        let mut one = [0u8; 1];
        let n = self.inner.read(&mut one)?;
        Ok((n != 0).then_some(one[0]))
    }

    fn read_canonical_locked(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        let mut written = 0usize;
        while written < buf.len() {
            let c = match self.next_byte()? {
                Some(c) => c,
                None => break,
            };
            match c {
                b'\r' => {
                    // \r and \r\n both normalize to a single \n; a \n
                    // immediately following \r is swallowed as the second
                    // half of the pair, anything else is pushed back for
                    // the next read.
                    if let Some(next) = self.next_byte()? {
                        if next != b'\n' {
                            self.pending.set(Some(next));
                        }
                    }
                    self.echo_byte(b'\n');
                    buf[written] = b'\n';
                    written += 1;
                    break;
                }
                b'\n' => {
                    self.echo_byte(b'\n');
                    buf[written] = b'\n';
                    written += 1;
                    break;
                }
                DEL | BS => {
                    if written > 0 {
                        written -= 1;
                        if self.is_echo_enabled() {
                            let _ = self.inner.write(&[BS, b' ', BS]);
                        }
                    }
                }
                _ => {
                    self.echo_byte(c);
                    buf[written] = c;
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

impl<D: FileBase> FileBase for TerminalDevice<D> {
    fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        if self.is_binary() {
            self.inner.read(buf)
        } else {
            self.read_canonical(buf)
        }
    }

    /// Replaces each `\n` with `\r\n` in non-binary mode. Not serialized:
    /// concurrent writers may interleave at the byte-sequence level, same
    /// as the original.
    fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        if self.is_binary() {
            return self.inner.write(buf);
        }
        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.split_last() {
                Some((b'\n', body)) => {
                    self.inner.write(body)?;
                    self.inner.write(b"\r\n")?;
                }
                _ => {
                    self.inner.write(chunk)?;
                }
            }
        }
        Ok(buf.len())
    }

    fn lseek(&self, _pos: SeekFrom) -> Result<u64, Errno> {
        Err(Errno::NotSupported)
    }

    fn fstat(&self) -> Result<Stat, Errno> {
        self.inner.fstat()
    }

    fn isatty(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;

    struct FakeDevice {
        count: AtomicUsize,
        input: RefCell<std::collections::VecDeque<u8>>,
        output: RefCell<std::vec::Vec<u8>>,
    }

    impl IntrusiveRefCounted for FakeDevice {
        fn ref_count(&self) -> &AtomicUsize {
            &self.count
        }
    }

    impl FakeDevice {
        fn with_input(data: &[u8]) -> Self {
            FakeDevice {
                count: AtomicUsize::new(0),
                input: RefCell::new(data.iter().copied().collect()),
                output: RefCell::new(std::vec::Vec::new()),
            }
        }
    }

    impl FileBase for FakeDevice {
        fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
            let mut input = self.input.borrow_mut();
            let mut n = 0;
            while n < buf.len() {
                match input.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
        fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
            self.output.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn lseek(&self, _pos: SeekFrom) -> Result<u64, Errno> {
            Ok(0)
        }
        fn fstat(&self) -> Result<Stat, Errno> {
            Err(Errno::NotSupported)
        }
    }

    #[test]
    fn write_translates_newline_to_crlf() {
        let tty = TerminalDevice::new(FakeDevice::with_input(b""));
        tty.write(b"hi\nthere").unwrap();
        assert_eq!(tty.inner.output.borrow().as_slice(), b"hi\r\nthere");
    }

    #[test]
    fn read_accepts_lone_cr_as_eol() {
        let tty = TerminalDevice::new(FakeDevice::with_input(b"hi\r"));
        let mut buf = [0u8; 16];
        let n = tty.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi\n");
    }

    #[test]
    fn read_collapses_crlf_pair_to_single_newline() {
        let tty = TerminalDevice::new(FakeDevice::with_input(b"hi\r\n"));
        let mut buf = [0u8; 16];
        let n = tty.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi\n");
    }

    #[test]
    fn backspace_erases_last_byte_and_echoes_erase_sequence() {
        let tty = TerminalDevice::new(FakeDevice::with_input(&[b'h', b'i', DEL, b'!', b'\n']));
        tty.set_echo(true);
        let mut buf = [0u8; 16];
        let n = tty.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"h!\n");
        let echoed = tty.inner.output.borrow().clone();
        assert!(echoed.windows(3).any(|w| w == [BS, b' ', BS]));
    }

    #[test]
    fn binary_mode_bypasses_line_discipline() {
        let tty = TerminalDevice::new(FakeDevice::with_input(b"a\nb"));
        tty.set_binary(true);
        let mut buf = [0u8; 16];
        let n = tty.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"a\nb");
    }
}
