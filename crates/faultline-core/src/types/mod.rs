//! # Types
//!
//! Plain data types shared by the capture, resolution and formatting stages.
//!
//! None of them own heap memory on the fault path: a [`FrameRecord`] borrows
//! every string it carries from the debug-info session.

pub mod address;
pub mod frame;
pub mod process;

// Re-export all public types
pub use address::Address;
pub use frame::{FrameRecord, ModuleRef, SourceLine, SymbolInfo};
pub use process::ProcessId;
