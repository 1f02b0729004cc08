//! # Fault Dispatcher
//!
//! [`handle_fault`] is the function registered with `sigaction`. It takes the
//! process-wide [`ProcessState`] guard and hands over to [`dispatch`], which
//! does the actual work and only *reports* what should happen next. Exiting
//! is left to the handler so the rest can be tested in-process.

use std::fmt::Write;

use libc::c_int;

use crate::capture::StackCapture;
use crate::config::MIN_SIGNAL_STACK;
use crate::dump::dump;
use crate::signal::{classify, SignalClass};
use crate::state::{FaultState, ProcessState};
use crate::writer::RawOutput;

/// State shared with [`handle_fault`].
pub(crate) static PROCESS: ProcessState = ProcessState::new();

/// What the handler does once the dump is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition
{
    /// `_exit(EXIT_FAILURE)` without running any cleanup.
    Terminate,
    /// Return from the handler and let the default action run (abort).
    Return,
}

/// Report `signal` and dump the stack into `out`.
///
/// Writes the prologue `[fatal] faultline: received <description> (<signo>)`,
/// runs the dump pipeline and syncs `out` before and after.
pub fn dispatch<C, W>(signal: c_int, state: &mut FaultState, capture: &mut C, out: &mut W) -> Disposition
where
    C: StackCapture + ?Sized,
    W: RawOutput + ?Sized,
{
    out.sync();
    let class = prologue(signal, state, out);

    let _ = dump(state, capture, out);
    out.sync();

    disposition(class)
}

/// Report `signal` without dumping, for a handler stuck on a signal stack of
/// `stack_size` bytes, below [`MIN_SIGNAL_STACK`].
///
/// Writes the prologue and one line naming the stack size. The session is
/// left untouched. The returned [`Disposition`] is the same as for
/// [`dispatch`].
pub fn report_small_stack<W>(signal: c_int, stack_size: usize, state: &mut FaultState, out: &mut W) -> Disposition
where
    W: RawOutput + ?Sized,
{
    out.sync();
    let class = prologue(signal, state, out);

    state.line.clear();
    let _ = write!(
        state.line,
        "[fatal] faultline: no dump, signal stack of {stack_size} bytes is below {MIN_SIGNAL_STACK}; \
         call faultline_core::prepare_thread on this thread"
    );
    state.line.terminate_line();
    out.write_bytes(state.line.as_bytes());
    out.sync();

    disposition(class)
}

fn prologue<W>(signal: c_int, state: &mut FaultState, out: &mut W) -> &'static SignalClass
where
    W: RawOutput + ?Sized,
{
    let class = classify(signal);
    state.line.clear();
    let _ = write!(
        state.line,
        "[fatal] faultline: received {} ({signal})",
        class.description
    );
    state.line.terminate_line();
    out.write_bytes(state.line.as_bytes());
    class
}

const fn disposition(class: &SignalClass) -> Disposition
{
    if class.terminal {
        Disposition::Terminate
    } else {
        Disposition::Return
    }
}

#[cfg(target_os = "linux")]
const REENTERED: &[u8] = b"[fatal] faultline: fault while handling fault, exiting\n";

/// Signal handler for every classified signal.
///
/// - armed and idle on a large enough stack: dispatch, then `_exit` or return
///   per [`Disposition`]
/// - armed and idle on a small alternate stack: one notice, then the same
/// - already dispatching: one line, then `_exit(EXIT_FAILURE)`
/// - not armed: restore the default action and re-raise
#[cfg(target_os = "linux")]
pub(crate) extern "C" fn handle_fault(signal: c_int, _info: *mut libc::siginfo_t, context: *mut libc::c_void)
{
    use crate::capture::Backtrace;
    use crate::platform::linux;
    use crate::state::Entry;
    use crate::types::Address;
    use crate::writer::FdWriter;

    linux::sync_fd(libc::STDOUT_FILENO);
    let mut out = FdWriter::stderr();

    let disposition = match PROCESS.enter() {
        Entry::Acquired(mut guard) => match linux::active_alt_stack() {
            Some(size) if size < MIN_SIGNAL_STACK => report_small_stack(signal, size, &mut guard, &mut out),
            _ => {
                // SAFETY: `context` is the third argument of this SA_SIGINFO handler.
                let origin = unsafe { linux::interrupted_pc(context) };
                guard.set_origin(origin.map(Address::from));
                dispatch(signal, &mut guard, &mut Backtrace, &mut out)
            }
        },
        Entry::Reentered => {
            out.write_bytes(REENTERED);
            linux::exit_immediately(libc::EXIT_FAILURE)
        }
        Entry::Unarmed => {
            linux::restore_default(signal);
            linux::raise(signal);
            return;
        }
    };

    if disposition == Disposition::Terminate {
        linux::exit_immediately(libc::EXIT_FAILURE);
    }
}
