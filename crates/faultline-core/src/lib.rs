//! # faultline-core
//!
//! Fatal-signal handling with in-process backtrace symbolication.
//!
//! On `SIGSEGV`, `SIGBUS`, `SIGILL`, `SIGFPE` or `SIGABRT` the installed
//! handler captures the faulting thread's stack, resolves every return
//! address to module, symbol and source line, and writes the result to
//! stderr. Terminal signals then `_exit(1)`; abort returns to `abort(3)`.
//!
//! ## Pipeline
//!
//! ```text
//! install ─▶ handle_fault ─▶ dispatch ─▶ dump
//!                                         ├─ StackCapture::capture
//!                                         ├─ resolve_frame ─▶ DebugInfoSession
//!                                         ├─ format_record ─▶ FixedBuf
//!                                         └─ RawOutput::write_bytes
//! ```
//!
//! ## Features
//!
//! - `auto-install`: run [`install`] from an ELF constructor, before `main`
//!
//! ## Platform Support
//!
//! - **Linux (glibc)**: full support
//! - **Linux (musl)**: handlers install, but no frames are captured
//! - **Other**: [`install`] reports [`Installation::Disabled`]
//!
//! ## Why unsafe code is needed
//!
//! Signal handling goes through `sigaction`, `sigaltstack`, `raw write(2)` and
//! glibc's `backtrace(3)`, and the handler reaches its state through a
//! process-wide cell. These are wrapped in safe functions in [`platform`],
//! [`writer`] and [`state`].

#![allow(unsafe_code)] // Required for signal handling and raw syscalls

pub mod capture;
pub mod config;
pub mod demangle;
pub mod dispatch;
pub mod dump;
pub mod error;
pub mod format;
pub mod install;
pub mod platform;
pub mod prelude;
pub mod resolve;
pub mod session;
pub mod signal;
#[cfg(all(feature = "auto-install", target_os = "linux"))]
mod startup;
pub mod state;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{dispatch, Disposition};
pub use dump::{dump, DumpOutcome};
pub use error::{FaultlineError, Result, SessionError};
pub use install::{install, install_with, prepare_thread, trace_current_thread, DisabledReason, Installation};
pub use session::{DebugInfoSession, DwarfSession};
pub use types::{Address, FrameRecord, ProcessId};
