//! Output that is safe to produce from inside a signal handler.
//!
//! Rust's `print!` takes the stdout lock and may allocate, so handlers
//! format into a stack buffer and hand the bytes to `write(2)` directly.

use std::fmt;

const CAPACITY: usize = 1280;

/// Fixed-capacity line buffer. Text past the capacity is dropped.
pub struct SioBuf {
    bytes: [u8; CAPACITY],
    len: usize,
}

impl SioBuf {
    pub const fn new() -> Self {
        Self {
            bytes: [0; CAPACITY],
            len: 0,
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let room = CAPACITY - self.len;
        let take = bytes.len().min(room);
        self.bytes[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Write the buffered bytes to standard output, retrying short writes.
    pub fn flush(&mut self) {
        let mut written = 0;
        while written < self.len {
            let rest = &self.as_bytes()[written..];
            let rc = unsafe { libc::write(libc::STDOUT_FILENO, rest.as_ptr().cast(), rest.len()) };
            if rc < 0 {
                if errno::errno().0 == libc::EINTR {
                    continue;
                }
                break;
            }
            written += rc as usize;
        }
        self.len = 0;
    }
}

impl Default for SioBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for SioBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

/// Format a line and write it to stdout without allocating.
macro_rules! sio_println {
    ($($arg:tt)*) => {{
        use ::std::fmt::Write as _;
        let mut buf = $crate::sio::SioBuf::new();
        let _ = ::std::writeln!(buf, $($arg)*);
        buf.flush();
    }};
}

pub(crate) use sio_println;

/// Keeps `errno` intact across a signal handler, which may otherwise clobber
/// the value the interrupted code is about to inspect.
pub struct ErrnoGuard(errno::Errno);

impl ErrnoGuard {
    pub fn save() -> Self {
        Self(errno::errno())
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        errno::set_errno(self.0);
    }
}
