//! # Signal Classification
//!
//! Fixed table mapping a signal number to a description and a termination
//! policy. `strsignal(3)` is not async-signal-safe, so descriptions are
//! static strings.
//!
//! Abort is the one non-terminal entry: `abort(3)` unblocks and raises
//! `SIGABRT`, and if the handler returns it restores the default disposition
//! and raises again. Exiting from the handler would skip that (and the core
//! image it may produce), so the dispatcher just returns.

use libc::c_int;

/// Description and termination policy for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalClass
{
    /// Signal number (`SIGSEGV`, ...).
    pub signal: c_int,
    /// Short human-readable name, printed in the prologue.
    pub description: &'static str,
    /// Whether the dispatcher must terminate the process after the dump.
    pub terminal: bool,
}

impl SignalClass
{
    const fn new(signal: c_int, description: &'static str, terminal: bool) -> Self
    {
        Self {
            signal,
            description,
            terminal,
        }
    }
}

/// Signals the dispatcher is registered for.
pub const HANDLED_SIGNALS: &[SignalClass] = &[
    SignalClass::new(libc::SIGSEGV, "segmentation fault", true),
    SignalClass::new(libc::SIGABRT, "abort", false),
    SignalClass::new(libc::SIGBUS, "bus error", true),
    SignalClass::new(libc::SIGILL, "illegal instruction", true),
    SignalClass::new(libc::SIGFPE, "floating point exception", true),
];

/// Classification used for any signal missing from [`HANDLED_SIGNALS`].
pub const UNKNOWN_SIGNAL: SignalClass = SignalClass::new(0, "unknown signal", true);

/// Look up `signal` in the fixed table.
///
/// Unlisted signals are reported as unknown and treated as terminal.
pub fn classify(signal: c_int) -> &'static SignalClass
{
    HANDLED_SIGNALS
        .iter()
        .find(|class| class.signal == signal)
        .unwrap_or(&UNKNOWN_SIGNAL)
}
