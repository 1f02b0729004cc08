//! # Error Types
//!
//! Two error types, split by *when* they can occur:
//!
//! - [`FaultlineError`]: setup-time failures (opening the debug-info session,
//!   parsing module images, registering handlers). These may carry owned data
//!   because they are created before any fault.
//! - [`SessionError`]: failures reported from inside the signal handler. This
//!   type is `Copy` and holds no heap data, so its `Display` output can be
//!   formatted into a fixed buffer while handling a fault.
//!
//! We use `thiserror` to generate the `Error` trait implementations.

use thiserror::Error;

/// Setup-time error for faultline operations
///
/// None of these escape [`install`](crate::install): initialization logs them
/// and degrades to "no crash diagnostics" instead of failing the host program.
#[derive(Error, Debug)]
pub enum FaultlineError
{
    /// The debug-info session could not be opened for the process
    ///
    /// Usually means `/proc/<pid>/maps` is unreadable (no procfs mounted,
    /// sandboxing, or the process does not exist).
    #[error("Failed to open debug info session: {0}")]
    SessionOpen(String),

    /// A module image could not be parsed as an object file
    #[error("Invalid module image {path}: {reason}")]
    InvalidImage
    {
        /// Path of the offending image
        path: String,
        /// Parser message
        reason: String,
    },

    /// `sigaction(2)` rejected the handler for a signal
    #[error("Failed to register handler for signal {signal}: {source}")]
    SignalRegistration
    {
        /// Signal number
        signal: i32,
        /// OS error reported by `sigaction`
        source: std::io::Error,
    },

    /// The alternate signal stack could not be installed
    #[error("Failed to install alternate signal stack: {0}")]
    AltStack(std::io::Error),

    /// Fault handling is not available on this target
    #[error("Fault handling is not supported on this platform")]
    Unsupported,

    /// Error reported by a debug-info session query
    #[error(transparent)]
    Session(#[from] SessionError),

    /// I/O error (reading module images, procfs, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error reported by a [`DebugInfoSession`](crate::session::DebugInfoSession)
///
/// Created inside the signal handler, so it must stay `Copy` and must not own
/// heap memory.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError
{
    /// The module map could not be opened or read
    #[error("cannot read module map (errno {errno})")]
    MapsUnavailable
    {
        /// Raw OS error code
        errno: i32,
    },

    /// The session was already released by an earlier dump
    #[error("debug info session already closed")]
    Closed,
}

/// Convenience type alias for `Result<T, FaultlineError>`
///
/// ```rust
/// use faultline_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, FaultlineError>;
