//! # Platform-Specific Implementations
//!
//! Thin safe wrappers over the OS interfaces the fault handler needs:
//!
//! - **Linux**: `sigaction`, `sigaltstack`, `_exit`, `fsync` and glibc's
//!   `backtrace(3)`
//!   - See: [sigaction(2) man page](https://man7.org/linux/man-pages/man2/sigaction.2.html)
//!   - See: [signal-safety(7) man page](https://man7.org/linux/man-pages/man7/signal-safety.7.html)
//!
//! Other targets compile without a platform module; installation then
//! reports [`Installation::Disabled`](crate::install::Installation).

#[cfg(target_os = "linux")]
pub mod linux;
