//! # Debug-Info Session
//!
//! The query interface the dump pipeline uses to turn an address into a
//! module, symbol and source line, plus the default provider built on
//! `object` + `gimli` + `addr2line`.
//!
//! ## Lifecycle
//!
//! ```text
//! open(pid)                     (startup, may allocate freely)
//!   └─ enumerate_modules(pid)   (fault time, refreshes the module list)
//!        └─ resolve_address / module_name / symbol_info / line_info
//!   └─ close()                  (end of the dump, session is single-use)
//! ```
//!
//! Every query after [`DebugInfoSession::close`] answers "unknown".
//!
//! ## Signal safety
//!
//! Everything except `open` may run inside a signal handler. Implementations
//! should keep those methods free of allocation and locks. [`DwarfSession`]
//! does so for everything but source-line lookups; see
//! [`DwarfSession::line_info`](dwarf::DwarfSession) for the residual risk.

pub mod dwarf;
pub mod image;
pub mod maps;

pub use dwarf::DwarfSession;
pub use image::{ModuleImage, SymbolEntry};
pub use maps::{ModuleSlot, ModuleTable};

use crate::error::SessionError;
use crate::types::{Address, ModuleRef, ProcessId, SourceLine, SymbolInfo};

/// Address-resolution capability bound to one process.
pub trait DebugInfoSession: Send
{
    /// Refresh the list of modules mapped into `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MapsUnavailable`] when the module list cannot
    /// be read and [`SessionError::Closed`] after [`close`](Self::close).
    fn enumerate_modules(&mut self, pid: ProcessId) -> Result<(), SessionError>;

    /// Module containing `address`, if any.
    fn resolve_address(&self, address: Address) -> Option<ModuleRef>;

    /// Display name of `module` (its path for file-backed modules).
    fn module_name(&self, module: ModuleRef) -> Option<&str>;

    /// Symbol covering `address` inside `module`.
    ///
    /// The returned offset is exactly `address - base`.
    fn symbol_info(&self, module: ModuleRef, address: Address) -> Option<SymbolInfo<'_>>;

    /// Source file and line for `address` inside `module`.
    ///
    /// Independent of [`symbol_info`](Self::symbol_info): either may succeed
    /// without the other.
    fn line_info(&self, module: ModuleRef, address: Address) -> Option<SourceLine<'_>>;

    /// Release the session. Must not free memory.
    fn close(&mut self);

    /// Whether [`close`](Self::close) has not been called yet.
    fn is_open(&self) -> bool;
}
