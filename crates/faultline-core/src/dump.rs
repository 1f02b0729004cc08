//! # Dump Pipeline
//!
//! refresh modules → capture stack → drop the frames above the interrupted
//! instruction → resolve, format and write each frame → close the session.
//!
//! Each frame is written as soon as it is formatted, so a second fault
//! halfway through still leaves the frames printed so far on stderr. Nothing
//! here allocates; the only buffers used are the ones inside [`FaultState`].

use std::fmt::Write;

use crate::capture::StackCapture;
use crate::error::SessionError;
use crate::format::format_record;
use crate::resolve::resolve_frame;
use crate::state::FaultState;
use crate::writer::RawOutput;

const DUMP_HEADER: &[u8] = b"[fatal] faultline: dump\n";
const SESSION_UNAVAILABLE: &[u8] = b"[fatal] faultline: session unavailable\n";
const FRAMES_DROPPED: &[u8] = b"[fatal] faultline: frame limit reached, outer frames may be missing\n";

/// How far a dump got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpOutcome
{
    /// Every captured frame was written.
    Complete
    {
        /// Number of frames written.
        frames: usize,
    },
    /// The module list could not be refreshed; no frame was written.
    EnumerationFailed(SessionError),
    /// No open session (never opened, or closed by an earlier dump).
    Unavailable,
}

/// Run the dump pipeline against `state`, writing to `out`.
///
/// The session is closed afterwards whether or not enumeration succeeded, so
/// a second dump on the same state reports [`DumpOutcome::Unavailable`].
pub fn dump<C, W>(state: &mut FaultState, capture: &mut C, out: &mut W) -> DumpOutcome
where
    C: StackCapture + ?Sized,
    W: RawOutput + ?Sized,
{
    let FaultState {
        pid,
        session,
        frames,
        line,
        origin,
    } = state;

    out.write_bytes(DUMP_HEADER);
    let origin = origin.take();

    let Some(session) = session.as_deref_mut().filter(|session| session.is_open()) else {
        out.write_bytes(SESSION_UNAVAILABLE);
        return DumpOutcome::Unavailable;
    };

    if let Err(err) = session.enumerate_modules(*pid) {
        line.clear();
        let _ = write!(line, "[fatal] faultline: module enumeration failed: {err}");
        line.terminate_line();
        out.write_bytes(line.as_bytes());
        session.close();
        return DumpOutcome::EnumerationFailed(err);
    }

    frames.fill(capture);
    if let Some(origin) = origin {
        frames.trim_to(origin);
    }
    let count = frames.len();
    for (position, address) in frames.addresses().enumerate() {
        let record = resolve_frame(&*session, position + 1, address);
        format_record(line, &record);
        out.write_bytes(line.as_bytes());
    }
    if frames.is_full() {
        out.write_bytes(FRAMES_DROPPED);
    }

    session.close();
    DumpOutcome::Complete { frames: count }
}
