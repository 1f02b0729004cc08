//! # Backtrace Formatter
//!
//! Renders [`FrameRecord`]s into fixed-size buffers. `core::fmt` machinery
//! is fine to use here: `write!` into a [`FixedBuf`] never allocates, the
//! buffer just stops accepting bytes once it is full.
//!
//! ## Layout
//!
//! ```text
//!   1#  [0x000055d4c2a1b2c3]  faultline::crash::segv+0x1f
//!                             /usr/bin/faultline (symbol at 0x000055d4c2a1b2a4)
//!                             src/crash.rs:42
//!   2#  [0x00007f3a11223344]
//!                             /usr/lib/libc.so.6
//! ```
//!
//! The first line always carries the index and address; continuation lines are
//! indented to the column after the address.

use std::fmt::{self, Write};

use crate::demangle::SymbolDisplay;
use crate::types::FrameRecord;

/// Capacity of the per-frame scratch line (`LINE_MAX` on Linux is 2048,
/// doubled to leave room for long C++ names and source paths).
pub const LINE_CAPACITY: usize = 4096;

/// Column where continuation lines start:
/// `"{:>3}#  [0x{:016x}]  "` is 3 + 1 + 2 + 1 + 18 + 1 + 2 characters.
pub const CONTINUATION_INDENT: usize = 28;

/// Scratch buffer for one rendered frame.
pub type LineBuffer = FixedBuf<LINE_CAPACITY>;

/// Fixed-capacity text buffer that truncates instead of growing
///
/// Implements [`fmt::Write`] and never returns `fmt::Error`, so a long
/// `write!` keeps going and simply drops what does not fit.
pub struct FixedBuf<const N: usize>
{
    bytes: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> FixedBuf<N>
{
    /// Empty buffer.
    pub const fn new() -> Self
    {
        Self {
            bytes: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Forget the contents, keeping the storage.
    pub fn clear(&mut self)
    {
        self.len = 0;
        self.truncated = false;
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8]
    {
        &self.bytes[..self.len]
    }

    /// Number of bytes written so far.
    pub const fn len(&self) -> usize
    {
        self.len
    }

    /// Whether nothing has been written.
    pub const fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// Fixed capacity in bytes.
    pub const fn capacity(&self) -> usize
    {
        N
    }

    /// Whether any write was cut short.
    pub const fn is_truncated(&self) -> bool
    {
        self.truncated
    }

    /// Append raw bytes, truncating at capacity.
    pub fn push_bytes(&mut self, bytes: &[u8])
    {
        let room = N - self.len;
        let take = bytes.len().min(room);
        self.bytes[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
        if take < bytes.len() {
            self.truncated = true;
        }
    }

    /// Make sure the buffer ends with a newline, overwriting the last byte if
    /// the buffer is full.
    pub fn terminate_line(&mut self)
    {
        if N == 0 || self.as_bytes().last() == Some(&b'\n') {
            return;
        }
        if self.len == N {
            self.bytes[N - 1] = b'\n';
        } else {
            self.bytes[self.len] = b'\n';
            self.len += 1;
        }
    }
}

impl<const N: usize> Default for FixedBuf<N>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for FixedBuf<N>
{
    fn write_str(&mut self, s: &str) -> fmt::Result
    {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for FixedBuf<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("FixedBuf")
            .field("contents", &String::from_utf8_lossy(self.as_bytes()))
            .field("truncated", &self.truncated)
            .finish()
    }
}

/// Render `record` into `out`, replacing its previous contents.
///
/// The output always ends with a newline, even when truncated.
pub fn format_record<const N: usize>(out: &mut FixedBuf<N>, record: &FrameRecord<'_>)
{
    out.clear();

    // FixedBuf::write_str is infallible; the results below carry no information.
    let _ = write!(out, "{:>3}#  [{}]", record.index, record.address);

    match (record.symbol, record.module) {
        (Some(symbol), module) => {
            let _ = writeln!(out, "  {}+{:#x}", SymbolDisplay(symbol.name), symbol.offset);
            if let Some(module) = module {
                let _ = writeln!(
                    out,
                    "{:indent$}{module} (symbol at {})",
                    "",
                    symbol.base,
                    indent = CONTINUATION_INDENT
                );
            }
        }
        (None, Some(module)) => {
            let _ = writeln!(out);
            let _ = writeln!(out, "{:indent$}{module}", "", indent = CONTINUATION_INDENT);
        }
        (None, None) => {
            let _ = writeln!(out);
        }
    }

    if let Some(source) = record.source {
        let _ = write!(out, "{:indent$}{}", "", source.path, indent = CONTINUATION_INDENT);
        if let Some(line) = source.line {
            let _ = write!(out, ":{line}");
        }
        let _ = writeln!(out);
    }

    out.terminate_line();
}
