//! Common module for library exports

pub use crate::capture::{Backtrace, FrameBuffer, StackCapture, FRAME_CAPACITY};
pub use crate::error::{FaultlineError, Result, SessionError};
pub use crate::format::{format_record, FixedBuf, LineBuffer};
pub use crate::session::{DebugInfoSession, DwarfSession};
pub use crate::state::{FaultState, ProcessState};
pub use crate::types::{Address, FrameRecord, ModuleRef, ProcessId, SourceLine, SymbolInfo};
pub use crate::writer::{FdWriter, RawOutput};
