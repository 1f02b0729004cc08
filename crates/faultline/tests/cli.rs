//! End-to-end tests: run the `faultline` binary and inspect how it dies

#![cfg(target_os = "linux")]

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

fn faultline(args: &[&str]) -> Output
{
    Command::new(env!("CARGO_BIN_EXE_faultline"))
        .args(args)
        .env_remove("FAULTLINE_DISABLE")
        .env_remove("FAULTLINE_LOG_FILE")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run faultline binary")
}

fn stderr(output: &Output) -> String
{
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_segv_prints_backtrace_and_exits_1()
{
    let output = faultline(&["crash", "segv"]);
    let text = stderr(&output);

    assert_eq!(output.status.code(), Some(1), "{text}");
    assert!(text.contains("[fatal] faultline: received segmentation fault"), "{text}");
    assert!(text.contains("[fatal] faultline: dump"), "{text}");
    assert!(text.contains("  1#  [0x"), "{text}");
}

#[test]
fn test_null_deref_exits_1()
{
    let output = faultline(&["crash", "null-deref"]);
    let text = stderr(&output);

    assert_eq!(output.status.code(), Some(1), "{text}");
    assert!(text.contains(&format!("segmentation fault ({})", libc::SIGSEGV)), "{text}");
}

#[test]
fn test_fpe_and_bus_are_terminal()
{
    for (kind, description) in [("fpe", "floating point exception"), ("bus", "bus error")] {
        let output = faultline(&["crash", kind]);
        let text = stderr(&output);
        assert_eq!(output.status.code(), Some(1), "{kind}: {text}");
        assert!(text.contains(description), "{kind}: {text}");
    }
}

#[test]
fn test_abort_reports_then_dies_by_sigabrt()
{
    let output = faultline(&["crash", "abort"]);
    let text = stderr(&output);

    assert_eq!(output.status.signal(), Some(libc::SIGABRT), "{text}");
    assert!(text.contains("[fatal] faultline: received abort"), "{text}");
    assert!(text.contains("  1#"), "{text}");
}

#[test]
fn test_stack_overflow_is_reported()
{
    let output = faultline(&["crash", "stack-overflow"]);
    let text = stderr(&output);

    assert_eq!(output.status.code(), Some(1), "{text}");
    assert!(text.contains("segmentation fault"), "{text}");
}

#[test]
fn test_disabled_falls_back_to_default_action()
{
    let output = Command::new(env!("CARGO_BIN_EXE_faultline"))
        .args(["crash", "abort"])
        .env("FAULTLINE_DISABLE", "1")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run faultline binary");
    let text = stderr(&output);

    assert_eq!(output.status.signal(), Some(libc::SIGABRT), "{text}");
    assert!(!text.contains("[fatal] faultline"), "{text}");
}

#[test]
fn test_trace_succeeds()
{
    let output = faultline(&["trace"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout.starts_with("[fatal] faultline: dump\n"), "{stdout}");
    assert!(stdout.contains("  1#  [0x"), "{stdout}");
}

#[test]
fn test_modules_lists_binary()
{
    let output = faultline(&["modules"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout.contains("faultline"), "{stdout}");
}

#[test]
fn test_resolve_unmapped_address()
{
    let output = faultline(&["resolve", "0x10"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout, "  1#  [0x0000000000000010]\n");
}

#[test]
fn test_resolve_rejects_garbage()
{
    let output = faultline(&["resolve", "0xzz"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid address"));
}
