//! # Async-Signal-Safe Writer
//!
//! Output sink for the fault path. Only `write(2)` and `fsync(2)` are used:
//! both are on the async-signal-safe list in signal-safety(7), unlike anything
//! behind `std::io::Stderr` (which takes a reentrant lock and may buffer).
//!
//! Diagnostics are best-effort, so nothing here reports failure to callers.

use std::io;
use std::os::fd::RawFd;

/// Byte sink usable from a signal handler.
pub trait RawOutput
{
    /// Write all of `bytes`, or as many as the sink accepts before failing.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Push written data towards the device. Best-effort.
    fn sync(&mut self) {}
}

/// Writer over a raw file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdWriter
{
    fd: RawFd,
}

impl FdWriter
{
    /// Writer over an arbitrary descriptor. The descriptor is not owned and is
    /// never closed.
    pub const fn new(fd: RawFd) -> Self
    {
        Self { fd }
    }

    /// Writer over the process's standard error stream.
    pub const fn stderr() -> Self
    {
        Self::new(libc::STDERR_FILENO)
    }

    /// Writer over the process's standard output stream.
    pub const fn stdout() -> Self
    {
        Self::new(libc::STDOUT_FILENO)
    }

    /// Underlying descriptor.
    pub const fn fd(&self) -> RawFd
    {
        self.fd
    }
}

impl RawOutput for FdWriter
{
    fn write_bytes(&mut self, bytes: &[u8])
    {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            // SAFETY: the pointer and length come from a live slice; write(2)
            // does not retain either past the call.
            let written = unsafe { libc::write(self.fd, remaining.as_ptr().cast(), remaining.len()) };

            if written < 0 {
                // `last_os_error` reads errno without allocating.
                if io::Error::last_os_error().raw_os_error() == Some(libc::EAGAIN) {
                    continue;
                }
                return;
            }

            // A zero-length write will not make progress.
            if written == 0 {
                return;
            }

            remaining = &remaining[written as usize..];
        }
    }

    fn sync(&mut self)
    {
        // SAFETY: fsync only inspects the descriptor; a bad one yields EBADF/EINVAL.
        unsafe {
            libc::fsync(self.fd);
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn pipe() -> (RawFd, RawFd)
    {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "pipe() failed");
        (fds[0], fds[1])
    }

    fn read_all(fd: RawFd) -> Vec<u8>
    {
        let mut out = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = unsafe { libc::read(fd, chunk.as_mut_ptr().cast(), chunk.len()) };
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n as usize]);
        }
        out
    }

    #[test]
    fn test_writes_every_byte()
    {
        let (read_end, write_end) = pipe();
        let mut writer = FdWriter::new(write_end);

        writer.write_bytes(b"[fatal] faultline: ");
        writer.write_bytes(b"dump\n");
        writer.sync();
        unsafe { libc::close(write_end) };

        assert_eq!(read_all(read_end), b"[fatal] faultline: dump\n");
        unsafe { libc::close(read_end) };
    }

    #[test]
    fn test_empty_write_is_noop()
    {
        let (read_end, write_end) = pipe();
        FdWriter::new(write_end).write_bytes(&[]);
        unsafe { libc::close(write_end) };

        assert!(read_all(read_end).is_empty());
        unsafe { libc::close(read_end) };
    }

    #[test]
    fn test_bad_descriptor_is_swallowed()
    {
        // Must return instead of spinning or panicking.
        let mut writer = FdWriter::new(-1);
        writer.write_bytes(b"lost");
        writer.sync();
    }

    #[test]
    fn test_standard_streams()
    {
        assert_eq!(FdWriter::stderr().fd(), libc::STDERR_FILENO);
        assert_eq!(FdWriter::stdout().fd(), libc::STDOUT_FILENO);
    }
}
