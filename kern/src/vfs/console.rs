//! The process-wide default console singleton. Grounded on spec.md's
//! description of `DefaultConsole`: a BSP-installed low-level device, a
//! no-op "null device" before installation so early boot code (and
//! `kern::fail::kernel_halt` when nothing has ever run) can always write
//! through it safely.

use core::cell::UnsafeCell;
use core::fmt::{self, Write};

/// A raw byte sink/source a board integration provides (UART, semihosting,
/// whatever). Line discipline (`\n` translation, echo, backspace handling)
/// is layered on top by [`super::tty::TerminalDevice`], not here.
pub trait ConsoleDevice: Sync {
    fn write_bytes(&self, bytes: &[u8]);
    fn read_byte(&self) -> Option<u8> {
        None
    }
}

struct Slot(UnsafeCell<Option<&'static dyn ConsoleDevice>>);

// Safety: installed at most once during boot with interrupts disabled, and
// never mutated again; reads race-free with writes through `DefaultConsole`
// on this single-core target as long as that discipline holds.
unsafe impl Sync for Slot {}

static DEVICE: Slot = Slot(UnsafeCell::new(None));

/// A zero-sized handle to the currently-installed console device. Cheap to
/// construct anywhere; every operation checks installation and is a no-op
/// if none has happened yet.
pub struct DefaultConsole;

impl DefaultConsole {
    /// Installs `device` as the low-level console. Mirrors the original's
    /// `IRQ_set`: called once by board bring-up code.
    ///
    /// # Safety
    /// Must not race with any read/write through `DefaultConsole`, and must
    /// not be called more than once.
    pub unsafe fn install(device: &'static dyn ConsoleDevice) {
        *DEVICE.0.get() = Some(device);
    }

    fn device() -> Option<&'static dyn ConsoleDevice> {
        unsafe { *DEVICE.0.get() }
    }

    pub fn is_installed() -> bool {
        Self::device().is_some()
    }

    pub fn read_byte(&self) -> Option<u8> {
        Self::device().and_then(|d| d.read_byte())
    }
}

impl Write for DefaultConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(device) = Self::device() {
            device.write_bytes(s.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_before_install_are_silently_dropped() {
        let mut console = DefaultConsole;
        assert!(write!(console, "hello").is_ok());
        assert!(!DefaultConsole::is_installed());
    }
}
