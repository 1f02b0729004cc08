//! # Process-Wide Initialization
//!
//! [`install`] runs once per process: it opens the debug-info session, arms
//! the shared fault state and registers the dispatcher for every signal in
//! [`HANDLED_SIGNALS`]. It never fails the caller. If the session cannot be
//! opened, faults simply keep their default behavior.
//!
//! ## Threads
//!
//! The handler runs on whichever thread received the signal, on that
//! thread's alternate signal stack if it has one. `install` gives its own
//! thread a stack of [`Config::alt_stack_size`]. Threads spawned with
//! `std::thread` start with std's much smaller stack: call [`prepare_thread`]
//! first thing in each worker, or a fault there prints a one-line notice
//! instead of a backtrace.
//!
//! With the `auto-install` feature, `install` runs from an ELF constructor
//! before `main`. std then leaves spawned threads without an alternate stack,
//! so their faults are dumped on the thread's own stack; a stack overflow on
//! such a thread still needs [`prepare_thread`].
//!
//! ## Example
//!
//! ```rust,no_run
//! fn main()
//! {
//!     let installation = faultline_core::install();
//!     if !installation.is_armed() {
//!         eprintln!("running without crash diagnostics: {installation:?}");
//!     }
//!     // application code
//! }
//! ```

use once_cell::sync::OnceCell;
use tracing::info;

use crate::capture::Backtrace;
use crate::config::{Config, MIN_SIGNAL_STACK};
use crate::dump::{dump, DumpOutcome};
use crate::error::{FaultlineError, Result};
use crate::session::{DebugInfoSession, DwarfSession};
use crate::signal::HANDLED_SIGNALS;
use crate::state::FaultState;
use crate::types::ProcessId;
use crate::writer::RawOutput;

static INSTALLATION: OnceCell<Installation> = OnceCell::new();

/// Outcome of the one-time initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installation
{
    /// Handlers registered.
    Armed
    {
        /// Process the session is bound to.
        pid: ProcessId,
        /// Number of signals whose handler was registered.
        signals: usize,
    },
    /// Faults keep their default behavior.
    Disabled(DisabledReason),
}

impl Installation
{
    /// Whether the handlers are active.
    pub const fn is_armed(&self) -> bool
    {
        matches!(self, Installation::Armed { .. })
    }
}

/// Why initialization left the handlers unregistered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason
{
    /// Turned off by [`Config::enabled`].
    Configured,
    /// The debug-info session could not be opened.
    SessionUnavailable(String),
    /// No fault handling on this target.
    Unsupported,
}

/// Install the fault handlers with the environment [`Config`] and a
/// [`DwarfSession`].
///
/// Only the first call in a process does anything; later calls return the
/// first result.
pub fn install() -> &'static Installation
{
    install_with(Config::from_env(), |pid| {
        let session: Box<dyn DebugInfoSession> = Box::new(DwarfSession::open(pid)?);
        Ok(session)
    })
}

/// Install the fault handlers with an explicit config and session factory.
///
/// `open` is called at most once, with the current process id. An error from
/// it is logged as a warning and yields [`DisabledReason::SessionUnavailable`].
pub fn install_with<F>(config: Config, open: F) -> &'static Installation
where
    F: FnOnce(ProcessId) -> Result<Box<dyn DebugInfoSession>>,
{
    INSTALLATION.get_or_init(|| initialize(config, open))
}

/// Result of the first [`install`] call, if any.
pub fn installation() -> Option<&'static Installation>
{
    INSTALLATION.get()
}

fn initialize<F>(config: Config, open: F) -> Installation
where
    F: FnOnce(ProcessId) -> Result<Box<dyn DebugInfoSession>>,
{
    if !config.enabled {
        info!("crash diagnostics disabled by configuration");
        return Installation::Disabled(DisabledReason::Configured);
    }

    arm(config, open)
}

#[cfg(target_os = "linux")]
fn arm<F>(config: Config, open: F) -> Installation
where
    F: FnOnce(ProcessId) -> Result<Box<dyn DebugInfoSession>>,
{
    use tracing::warn;

    use crate::dispatch::{handle_fault, PROCESS};
    use crate::platform::linux;

    let pid = ProcessId::current();
    Backtrace::warm_up();

    let session = match open(pid) {
        Ok(session) => session,
        Err(err) => {
            warn!(%err, "crash diagnostics disabled: cannot open debug info session");
            return Installation::Disabled(DisabledReason::SessionUnavailable(err.to_string()));
        }
    };

    if !PROCESS.arm(FaultState::new(pid, session)) {
        warn!("fault state was already armed, keeping the existing session");
    }

    if config.alt_stack_size > 0 {
        if let Err(source) = linux::install_alt_stack(config.alt_stack_size.max(MIN_SIGNAL_STACK)) {
            let err = FaultlineError::AltStack(source);
            warn!(%err, "stack overflows will not be reported");
        }
    }

    let mut registered = 0;
    for class in HANDLED_SIGNALS {
        match linux::register(class.signal, handle_fault) {
            Ok(()) => registered += 1,
            Err(source) => {
                let err = FaultlineError::SignalRegistration {
                    signal: class.signal,
                    source,
                };
                warn!(%err, signal = class.description, "signal keeps its default disposition");
            }
        }
    }

    info!(pid = %pid, signals = registered, "crash diagnostics armed");
    Installation::Armed {
        pid,
        signals: registered,
    }
}

#[cfg(not(target_os = "linux"))]
fn arm<F>(_config: Config, _open: F) -> Installation
where
    F: FnOnce(ProcessId) -> Result<Box<dyn DebugInfoSession>>,
{
    tracing::warn!("crash diagnostics are not supported on this platform");
    Installation::Disabled(DisabledReason::Unsupported)
}

/// Give the calling thread an alternate signal stack of `size` bytes, at
/// least [`MIN_SIGNAL_STACK`].
///
/// [`install`] only does this for the thread it runs on. Call it at the top of
/// every other thread that should get a backtrace on a fault; without it a
/// `std::thread` worker is left on std's few-KiB stack and only gets a notice.
///
/// ## Example
///
/// ```rust,no_run
/// let worker = std::thread::spawn(|| {
///     faultline_core::prepare_thread(faultline_core::config::DEFAULT_ALT_STACK_SIZE)
///         .expect("alternate signal stack");
///     // work
/// });
/// worker.join().unwrap();
/// ```
///
/// # Errors
///
/// [`FaultlineError::AltStack`] if `sigaltstack(2)` fails and
/// [`FaultlineError::Unsupported`] off Linux.
pub fn prepare_thread(size: usize) -> Result<()>
{
    #[cfg(target_os = "linux")]
    {
        crate::platform::linux::install_alt_stack(size.max(MIN_SIGNAL_STACK)).map_err(FaultlineError::AltStack)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = size;
        Err(FaultlineError::Unsupported)
    }
}

/// Print the calling thread's stack to `out` without any fault.
///
/// Opens a fresh [`DwarfSession`] and runs the same pipeline the signal
/// handler runs; the process-wide state is not touched.
///
/// # Errors
///
/// [`FaultlineError::SessionOpen`] if the session cannot be opened.
pub fn trace_current_thread<W>(out: &mut W) -> Result<DumpOutcome>
where
    W: RawOutput + ?Sized,
{
    let pid = ProcessId::current();
    let session = DwarfSession::open(pid)?;
    let mut state = Box::new(FaultState::new(pid, Box::new(session)));
    Ok(dump(&mut state, &mut Backtrace, out))
}
