//! # Stack Capture
//!
//! Collects return addresses of the current call chain into a fixed buffer.
//!
//! The capturer itself is a trait so the dump pipeline can be driven by a
//! scripted stack in tests; [`Backtrace`] is the production implementation
//! on top of glibc's `backtrace(3)`.

use crate::types::Address;

/// Maximum number of frames captured per fault. Deeper frames are dropped.
pub const FRAME_CAPACITY: usize = 256;

/// Source of return addresses.
pub trait StackCapture
{
    /// Fill `buffer` with return addresses, innermost first, and return how
    /// many entries were written.
    fn capture(&mut self, buffer: &mut [usize]) -> usize;
}

/// Captures the calling thread's stack with `backtrace(3)`
///
/// glibc loads its unwinder lazily on the first call, which allocates; call
/// [`Backtrace::warm_up`] once outside the signal handler before relying on it
/// from one.
#[derive(Debug, Default, Clone, Copy)]
pub struct Backtrace;

impl Backtrace
{
    /// Run one throwaway capture so later captures do not load libraries.
    pub fn warm_up()
    {
        let mut scratch = [0usize; 4];
        let _ = Backtrace.capture(&mut scratch);
    }
}

impl StackCapture for Backtrace
{
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn capture(&mut self, buffer: &mut [usize]) -> usize
    {
        crate::platform::linux::backtrace(buffer)
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn capture(&mut self, _buffer: &mut [usize]) -> usize
    {
        0
    }
}

/// Fixed-capacity buffer of captured return addresses.
pub struct FrameBuffer
{
    frames: [usize; FRAME_CAPACITY],
    len: usize,
    saturated: bool,
}

impl FrameBuffer
{
    /// Empty buffer.
    pub const fn new() -> Self
    {
        Self {
            frames: [0; FRAME_CAPACITY],
            len: 0,
            saturated: false,
        }
    }

    /// Replace the contents with a fresh capture and return the frame count.
    ///
    /// The count is clamped to [`FRAME_CAPACITY`] even if the capturer
    /// misreports.
    pub fn fill<C: StackCapture + ?Sized>(&mut self, capture: &mut C) -> usize
    {
        let reported = capture.capture(&mut self.frames);
        self.len = reported.min(FRAME_CAPACITY);
        self.saturated = self.len == FRAME_CAPACITY;
        self.len
    }

    /// Drop every frame above the first one equal to `origin`.
    ///
    /// Used to hide the handler's own frames and the signal trampoline so the
    /// interrupted instruction comes first. Returns whether `origin` was
    /// found; if not, the buffer is left as captured.
    pub fn trim_to(&mut self, origin: Address) -> bool
    {
        let Some(skip) = self.frames[..self.len]
            .iter()
            .position(|&raw| Address::from(raw) == origin)
        else {
            return false;
        };
        self.frames.copy_within(skip..self.len, 0);
        self.len -= skip;
        true
    }

    /// Number of captured frames.
    pub const fn len(&self) -> usize
    {
        self.len
    }

    /// Whether no frame was captured.
    pub const fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// Whether the capture used every slot (deeper frames may be missing).
    ///
    /// Stays set after [`FrameBuffer::trim_to`].
    pub const fn is_full(&self) -> bool
    {
        self.saturated
    }

    /// Captured addresses, innermost first.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_
    {
        self.frames[..self.len].iter().map(|&raw| Address::from(raw))
    }
}

impl Default for FrameBuffer
{
    fn default() -> Self
    {
        Self::new()
    }
}
