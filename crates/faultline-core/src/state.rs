//! # Process-Wide Fault State
//!
//! The signal handler cannot take arguments, so the buffers and the
//! debug-info session it needs live in one process-wide [`ProcessState`].
//! Access goes through a three-phase atomic:
//!
//! ```text
//!            arm()                 enter()
//! UNARMED ──────────▶ IDLE ◀──────────────────▶ DISPATCHING
//!                           guard dropped
//! ```
//!
//! Only the holder of a [`DispatchGuard`] touches the [`FaultState`]. A
//! signal that arrives while another dispatch is in progress (a fault inside
//! the handler, or a second thread faulting) sees [`Entry::Reentered`].

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::capture::FrameBuffer;
use crate::format::LineBuffer;
use crate::session::DebugInfoSession;
use crate::types::{Address, ProcessId};

const UNARMED: u8 = 0;
const IDLE: u8 = 1;
const DISPATCHING: u8 = 2;

/// Everything the dump pipeline needs, sized before any fault.
pub struct FaultState
{
    pub(crate) pid: ProcessId,
    pub(crate) session: Option<Box<dyn DebugInfoSession>>,
    pub(crate) frames: FrameBuffer,
    pub(crate) line: LineBuffer,
    pub(crate) origin: Option<Address>,
}

impl FaultState
{
    /// State bound to `pid` with an open session.
    pub fn new(pid: ProcessId, session: Box<dyn DebugInfoSession>) -> Self
    {
        Self {
            pid,
            session: Some(session),
            frames: FrameBuffer::new(),
            line: LineBuffer::new(),
            origin: None,
        }
    }

    /// State with no session; dumps report the session as unavailable.
    pub fn without_session(pid: ProcessId) -> Self
    {
        Self {
            pid,
            session: None,
            frames: FrameBuffer::new(),
            line: LineBuffer::new(),
            origin: None,
        }
    }

    /// Process the session is bound to.
    pub const fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// The session, open or closed.
    pub fn session(&self) -> Option<&dyn DebugInfoSession>
    {
        self.session.as_deref()
    }

    /// Address of the interrupted instruction for the next dump.
    ///
    /// When set, frames above it (the handler and the signal trampoline) are
    /// left out of the dump. Consumed by that dump.
    pub fn set_origin(&mut self, origin: Option<Address>)
    {
        self.origin = origin;
    }

    /// Frames from the most recent capture.
    pub const fn frames(&self) -> &FrameBuffer
    {
        &self.frames
    }
}

impl std::fmt::Debug for FaultState
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("FaultState")
            .field("pid", &self.pid)
            .field("session_open", &self.session.as_ref().map(|session| session.is_open()))
            .field("frames", &self.frames.len())
            .finish()
    }
}

/// Owner of the single [`FaultState`] shared with the signal handler.
pub struct ProcessState
{
    phase: AtomicU8,
    state: UnsafeCell<Option<FaultState>>,
}

// SAFETY: `state` is only written by `arm` and only borrowed through a
// `DispatchGuard`, and both require winning a compare-and-swap on `phase`
// first. At most one thread can hold that access at a time.
unsafe impl Sync for ProcessState {}

/// Result of trying to enter the dispatcher.
pub enum Entry<'a>
{
    /// Exclusive access; dropping the guard returns to idle.
    Acquired(DispatchGuard<'a>),
    /// Another dispatch is already running.
    Reentered,
    /// [`ProcessState::arm`] has not completed.
    Unarmed,
}

impl ProcessState
{
    /// Unarmed state, usable in a `static`.
    pub const fn new() -> Self
    {
        Self {
            phase: AtomicU8::new(UNARMED),
            state: UnsafeCell::new(None),
        }
    }

    /// Store `state` and move to idle. Returns `false` (dropping `state`) if
    /// already armed.
    pub fn arm(&self, state: FaultState) -> bool
    {
        if self
            .phase
            .compare_exchange(UNARMED, DISPATCHING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        // SAFETY: the CAS above moved the phase out of UNARMED, and no other
        // path touches `state` until it reads IDLE.
        unsafe {
            *self.state.get() = Some(state);
        }
        self.phase.store(IDLE, Ordering::Release);
        true
    }

    /// Whether [`arm`](Self::arm) has completed.
    pub fn is_armed(&self) -> bool
    {
        self.phase.load(Ordering::Acquire) != UNARMED
    }

    /// Try to take exclusive access for one dispatch.
    pub fn enter(&self) -> Entry<'_>
    {
        match self
            .phase
            .compare_exchange(IDLE, DISPATCHING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(DISPATCHING) => return Entry::Reentered,
            Err(_) => return Entry::Unarmed,
        }

        // SAFETY: winning IDLE -> DISPATCHING grants exclusive access until
        // the guard stores IDLE again.
        match unsafe { (*self.state.get()).as_mut() } {
            Some(state) => Entry::Acquired(DispatchGuard {
                phase: &self.phase,
                state,
            }),
            None => {
                self.phase.store(IDLE, Ordering::Release);
                Entry::Unarmed
            }
        }
    }
}

impl Default for ProcessState
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Exclusive access to the armed [`FaultState`].
pub struct DispatchGuard<'a>
{
    phase: &'a AtomicU8,
    state: &'a mut FaultState,
}

impl Deref for DispatchGuard<'_>
{
    type Target = FaultState;

    fn deref(&self) -> &FaultState
    {
        self.state
    }
}

impl DerefMut for DispatchGuard<'_>
{
    fn deref_mut(&mut self) -> &mut FaultState
    {
        self.state
    }
}

impl Drop for DispatchGuard<'_>
{
    fn drop(&mut self)
    {
        self.phase.store(IDLE, Ordering::Release);
    }
}
