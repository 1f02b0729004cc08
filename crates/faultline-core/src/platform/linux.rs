//! # Linux Signal Plumbing
//!
//! Every function here is async-signal-safe unless its docs say otherwise,
//! so the handler path may call them freely.
//!
//! ## Dependencies
//!
//! - **libc crate**: `sigaction`, `sigaltstack`, `signal`, `raise`, `_exit`,
//!   `fsync`, and glibc's `backtrace(3)`

use std::io;
use std::mem;
use std::ptr;

use libc::{c_int, c_void};

/// Signature of a handler registered with [`register`].
pub type SignalHandler = extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void);

/// Install `handler` for `signal` with `SA_SIGINFO | SA_NODEFER | SA_ONSTACK`
///
/// `SA_SIGINFO` hands the handler the interrupted context (see
/// [`interrupted_pc`]). `SA_NODEFER` keeps the signal unblocked while the
/// handler runs, so a second fault inside the handler re-enters it instead of
/// hanging on a blocked signal. `SA_ONSTACK` runs the handler on the alternate
/// stack when one is installed for the faulting thread.
///
/// Not async-signal-safe in spirit: call during setup only.
///
/// # Errors
///
/// The OS error from `sigaction(2)`, e.g. `EINVAL` for `SIGKILL`.
pub fn register(signal: c_int, handler: SignalHandler) -> io::Result<()>
{
    // SAFETY: an all-zero sigaction is a valid "no flags, empty mask" value.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler as usize as libc::sighandler_t;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER | libc::SA_ONSTACK;

    // SAFETY: `action` is a live, exclusively borrowed sigaction.
    unsafe {
        libc::sigemptyset(&mut action.sa_mask);
    }

    // SAFETY: `action` is fully initialized; the old action is not requested.
    if unsafe { libc::sigaction(signal, &action, ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Current disposition of `signal` (`SIG_DFL`, `SIG_IGN` or a handler address).
///
/// # Errors
///
/// The OS error from `sigaction(2)`.
pub fn current_disposition(signal: c_int) -> io::Result<libc::sighandler_t>
{
    // SAFETY: zeroed sigaction is a valid output buffer.
    let mut old: libc::sigaction = unsafe { mem::zeroed() };
    // SAFETY: a null new action only queries; `old` is writable.
    if unsafe { libc::sigaction(signal, ptr::null(), &mut old) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(old.sa_sigaction)
}

/// Give the calling thread an alternate signal stack of at least `size` bytes.
///
/// The stack is leaked: it has to outlive any handler invocation on this
/// thread, and the thread may exit without telling us.
///
/// # Errors
///
/// The OS error from `sigaltstack(2)`.
pub fn install_alt_stack(size: usize) -> io::Result<()>
{
    const WORD: usize = mem::size_of::<u128>();

    let words = (size.max(libc::SIGSTKSZ) + WORD - 1) / WORD;
    let stack: &'static mut [u128] = Vec::leak(vec![0u128; words]);

    let descriptor = libc::stack_t {
        ss_sp: stack.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: words * WORD,
    };

    // SAFETY: the stack memory is leaked and therefore valid forever.
    if unsafe { libc::sigaltstack(&descriptor, ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Size of the alternate signal stack the caller is running on, if any.
///
/// `None` outside a handler, or inside one that runs on the thread's normal
/// stack.
pub fn active_alt_stack() -> Option<usize>
{
    // SAFETY: zeroed stack_t is a valid output buffer.
    let mut current: libc::stack_t = unsafe { mem::zeroed() };
    // SAFETY: a null new stack only queries; `current` is writable.
    if unsafe { libc::sigaltstack(ptr::null(), &mut current) } != 0 {
        return None;
    }
    (current.ss_flags & libc::SS_ONSTACK != 0).then_some(current.ss_size)
}

/// Program counter of the interrupted instruction, read from the `ucontext_t`
/// an `SA_SIGINFO` handler receives.
///
/// # Safety
///
/// `context` must be null or the third argument of a running `SA_SIGINFO`
/// handler.
#[cfg(all(target_env = "gnu", any(target_arch = "x86_64", target_arch = "aarch64")))]
pub unsafe fn interrupted_pc(context: *mut c_void) -> Option<usize>
{
    // SAFETY: per the caller contract the pointer is null or a live ucontext_t.
    let context = unsafe { context.cast::<libc::ucontext_t>().as_ref() }?;

    #[cfg(target_arch = "x86_64")]
    let pc = context.uc_mcontext.gregs[libc::REG_RIP as usize] as usize;
    #[cfg(target_arch = "aarch64")]
    let pc = context.uc_mcontext.pc as usize;

    (pc != 0).then_some(pc)
}

/// Program counter of the interrupted instruction (unknown on this target).
///
/// # Safety
///
/// Always safe; kept `unsafe` to match the targets that read the context.
#[cfg(not(all(target_env = "gnu", any(target_arch = "x86_64", target_arch = "aarch64"))))]
pub unsafe fn interrupted_pc(_context: *mut c_void) -> Option<usize>
{
    None
}

/// Reset `signal` to its default action.
pub fn restore_default(signal: c_int)
{
    // SAFETY: `signal(2)` with SIG_DFL is async-signal-safe.
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
    }
}

/// Send `signal` to the calling thread.
pub fn raise(signal: c_int)
{
    // SAFETY: `raise(3)` is async-signal-safe.
    unsafe {
        libc::raise(signal);
    }
}

/// Terminate the process without running exit handlers or destructors.
pub fn exit_immediately(code: c_int) -> !
{
    // SAFETY: `_exit(2)` is async-signal-safe and never returns.
    unsafe { libc::_exit(code) }
}

/// Flush kernel buffers for `fd`. Errors (e.g. `EINVAL` on a pipe) are ignored.
pub fn sync_fd(fd: c_int)
{
    // SAFETY: `fsync(2)` is async-signal-safe and tolerates any fd value.
    unsafe {
        libc::fsync(fd);
    }
}

/// Capture return addresses of the calling thread into `buffer`.
///
/// Allocates the first time it runs in a process (glibc loads libgcc_s);
/// call it once before relying on it from a signal handler.
#[cfg(target_env = "gnu")]
pub fn backtrace(buffer: &mut [usize]) -> usize
{
    let size = c_int::try_from(buffer.len()).unwrap_or(c_int::MAX);
    // SAFETY: `buffer` provides `size` writable pointer-sized slots.
    let written = unsafe { libc::backtrace(buffer.as_mut_ptr().cast(), size) };
    usize::try_from(written).unwrap_or(0)
}
