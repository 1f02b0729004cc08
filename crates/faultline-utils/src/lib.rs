//! # faultline utilities
//!
//! Logging setup for the faultline tools, built on `tracing`.
//!
//! Library code in `faultline-core` only emits `tracing` events; binaries
//! call [`init_logging`] (or [`init_logging_with_level`]) once to decide
//! where those events go.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogGuard, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
