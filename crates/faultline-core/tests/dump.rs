//! Tests for the dump pipeline and the dispatcher

mod common;

use common::{FakeModule, FakeSession, Recorder, Scripted};
use faultline_core::capture::FRAME_CAPACITY;
use faultline_core::config::MIN_SIGNAL_STACK;
use faultline_core::dispatch::{dispatch, report_small_stack, Disposition};
use faultline_core::dump::{dump, DumpOutcome};
use faultline_core::error::SessionError;
use faultline_core::format::LINE_CAPACITY;
use faultline_core::state::{Entry, FaultState, ProcessState};
use faultline_core::types::{Address, ProcessId};

const PID: ProcessId = ProcessId(4242);

fn state_with(session: FakeSession) -> FaultState
{
    FaultState::new(PID, Box::new(session))
}

fn libc_module() -> FakeModule
{
    FakeModule::new("/usr/lib/libc.so.6", 0x7000, 0x8000)
}

fn app_module() -> FakeModule
{
    FakeModule::new("/usr/bin/app", 0x1000, 0x2000)
        .symbol(0x1000, "_ZN3app4main17h0123456789abcdefE")
        .symbol(0x1400, "helper")
        .line(0x1000, 0x1100, "src/main.rs", Some(12))
}

/// Lines after the dump header.
fn frame_lines(out: &Recorder) -> Vec<String>
{
    let lines = out.lines();
    assert_eq!(lines.first().map(String::as_str), Some("[fatal] faultline: dump"));
    lines[1..].to_vec()
}

#[test]
fn test_each_frame_gets_one_indexed_entry()
{
    let mut state = state_with(FakeSession::default());
    let mut out = Recorder::default();

    let outcome = dump(&mut state, &mut Scripted(vec![0x10, 0x20, 0x30, 0x40, 0x50]), &mut out);

    assert_eq!(outcome, DumpOutcome::Complete { frames: 5 });
    let lines = frame_lines(&out);
    assert_eq!(lines.len(), 5);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.starts_with(&format!("{:>3}#  [", i + 1)), "line {i}: {line}");
    }
    assert!(lines[0].contains("0x0000000000000010"));
    assert!(lines[4].contains("0x0000000000000050"));
}

#[test]
fn test_empty_capture_writes_only_header()
{
    let mut state = state_with(FakeSession::default());
    let mut out = Recorder::default();

    let outcome = dump(&mut state, &mut Scripted(Vec::new()), &mut out);

    assert_eq!(outcome, DumpOutcome::Complete { frames: 0 });
    assert!(frame_lines(&out).is_empty());
}

#[test]
fn test_capture_is_capped_at_capacity()
{
    let mut state = state_with(FakeSession::default());
    let mut out = Recorder::default();
    let addresses: Vec<usize> = (1..=FRAME_CAPACITY + 44).collect();

    let outcome = dump(&mut state, &mut Scripted(addresses), &mut out);

    assert_eq!(outcome, DumpOutcome::Complete { frames: FRAME_CAPACITY });
    let lines = frame_lines(&out);
    let frames: Vec<&String> = lines.iter().filter(|line| line.contains("#  [")).collect();
    assert_eq!(frames.len(), FRAME_CAPACITY);
    assert!(frames[FRAME_CAPACITY - 1].starts_with("256#"));
    assert!(lines.last().unwrap().contains("frame limit reached"));
}

#[test]
fn test_full_resolution_reports_exact_offset()
{
    let mut state = state_with(FakeSession::new(vec![app_module()]));
    let mut out = Recorder::default();

    dump(&mut state, &mut Scripted(vec![0x1010]), &mut out);

    let lines = frame_lines(&out);
    assert_eq!(lines[0], "  1#  [0x0000000000001010]  app::main+0x10");
    assert!(lines[1].ends_with("/usr/bin/app (symbol at 0x0000000000001000)"));
    assert!(lines[2].ends_with("src/main.rs:12"));
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_offset_is_relative_to_nearest_symbol()
{
    let mut state = state_with(FakeSession::new(vec![app_module()]));
    let mut out = Recorder::default();

    dump(&mut state, &mut Scripted(vec![0x1423]), &mut out);

    let lines = frame_lines(&out);
    assert!(lines[0].ends_with("helper+0x23"));
    assert!(lines[1].ends_with("(symbol at 0x0000000000001400)"));
}

#[test]
fn test_module_without_symbol()
{
    let mut state = state_with(FakeSession::new(vec![libc_module()]));
    let mut out = Recorder::default();

    dump(&mut state, &mut Scripted(vec![0x7abc]), &mut out);

    let lines = frame_lines(&out);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "  1#  [0x0000000000007abc]");
    assert_eq!(lines[1].trim_start(), "/usr/lib/libc.so.6");
    assert!(!out.text().contains('+'));
}

#[test]
fn test_unknown_address_prints_only_address()
{
    let mut state = state_with(FakeSession::new(vec![app_module(), libc_module()]));
    let mut out = Recorder::default();

    dump(&mut state, &mut Scripted(vec![0xdead_0000]), &mut out);

    assert_eq!(frame_lines(&out), vec!["  1#  [0x00000000dead0000]".to_string()]);
}

#[test]
fn test_source_line_without_symbol()
{
    let module = FakeModule::new("/opt/lib/libplugin.so", 0x5000, 0x6000).line(0x5000, 0x5100, "plugin.c", Some(88));
    let mut state = state_with(FakeSession::new(vec![module]));
    let mut out = Recorder::default();

    dump(&mut state, &mut Scripted(vec![0x5050]), &mut out);

    let lines = frame_lines(&out);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1].trim_start(), "/opt/lib/libplugin.so");
    assert_eq!(lines[2].trim_start(), "plugin.c:88");
}

#[test]
fn test_symbol_without_source_line()
{
    let mut state = state_with(FakeSession::new(vec![app_module()]));
    let mut out = Recorder::default();

    dump(&mut state, &mut Scripted(vec![0x1404]), &mut out);

    let lines = frame_lines(&out);
    assert_eq!(lines.len(), 2);
    assert!(!out.text().contains("src/main.rs"));
}

#[test]
fn test_oversized_symbol_is_truncated()
{
    let huge = "x".repeat(5000);
    let module = FakeModule::new("/usr/bin/app", 0x1000, 0x2000).symbol(0x1000, &huge);
    let mut state = state_with(FakeSession::new(vec![module]));
    let mut out = Recorder::default();

    let outcome = dump(&mut state, &mut Scripted(vec![0x1001, 0x1002]), &mut out);

    assert_eq!(outcome, DumpOutcome::Complete { frames: 2 });
    let frame_writes = &out.writes[1..];
    assert_eq!(frame_writes.len(), 2);
    for write in frame_writes {
        assert!(write.len() <= LINE_CAPACITY);
        assert_eq!(write.last(), Some(&b'\n'));
    }
    assert!(frame_lines(&out).iter().any(|line| line.starts_with("  2#")));
}

#[test]
fn test_frames_above_origin_are_skipped()
{
    let mut state = state_with(FakeSession::new(vec![app_module()]));
    state.set_origin(Some(Address::new(0x1010)));
    let mut out = Recorder::default();

    let outcome = dump(&mut state, &mut Scripted(vec![0x7100, 0x7200, 0x1010, 0x1404]), &mut out);

    assert_eq!(outcome, DumpOutcome::Complete { frames: 2 });
    let lines = frame_lines(&out);
    assert_eq!(lines[0], "  1#  [0x0000000000001010]  app::main+0x10");
    assert!(lines.iter().any(|line| line.starts_with("  2#") && line.ends_with("helper+0x4")));
    assert!(!out.text().contains("0x0000000000007100"));
}

#[test]
fn test_missing_origin_keeps_every_frame()
{
    let mut state = state_with(FakeSession::default());
    state.set_origin(Some(Address::new(0xffff)));
    let mut out = Recorder::default();

    assert_eq!(
        dump(&mut state, &mut Scripted(vec![0x10, 0x20, 0x30]), &mut out),
        DumpOutcome::Complete { frames: 3 }
    );
}

#[test]
fn test_small_stack_reports_without_dumping()
{
    let mut state = state_with(FakeSession::new(vec![app_module()]));
    let mut out = Recorder::default();

    let disposition = report_small_stack(libc::SIGSEGV, 8192, &mut state, &mut out);

    assert_eq!(disposition, Disposition::Terminate);
    let lines = out.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], format!("[fatal] faultline: received segmentation fault ({})", libc::SIGSEGV));
    assert!(lines[1].contains("signal stack of 8192 bytes"), "{}", lines[1]);
    assert!(lines[1].contains(&MIN_SIGNAL_STACK.to_string()));
    assert!(lines[1].contains("prepare_thread"));
    assert!(state.session().unwrap().is_open());
    assert_eq!(out.syncs, 2);
}

#[test]
fn test_small_stack_abort_still_returns()
{
    let mut state = FaultState::without_session(PID);
    let mut out = Recorder::default();

    assert_eq!(
        report_small_stack(libc::SIGABRT, 4096, &mut state, &mut out),
        Disposition::Return
    );
}

#[test]
fn test_enumeration_failure_stops_and_closes()
{
    let mut state = state_with(FakeSession::failing(SessionError::MapsUnavailable { errno: 2 }));
    let mut out = Recorder::default();

    let outcome = dump(&mut state, &mut Scripted(vec![0x10, 0x20]), &mut out);

    assert_eq!(outcome, DumpOutcome::EnumerationFailed(SessionError::MapsUnavailable { errno: 2 }));
    assert_eq!(
        frame_lines(&out),
        vec!["[fatal] faultline: module enumeration failed: cannot read module map (errno 2)".to_string()]
    );
    assert!(!state.session().unwrap().is_open());
}

#[test]
fn test_session_is_single_use()
{
    let mut state = state_with(FakeSession::new(vec![app_module()]));

    let mut first = Recorder::default();
    assert_eq!(dump(&mut state, &mut Scripted(vec![0x1010]), &mut first), DumpOutcome::Complete { frames: 1 });
    assert!(!state.session().unwrap().is_open());

    let mut second = Recorder::default();
    assert_eq!(dump(&mut state, &mut Scripted(vec![0x1010]), &mut second), DumpOutcome::Unavailable);
    assert!(second.text().contains("session unavailable"));
    assert!(!second.text().contains("1#"));
}

#[test]
fn test_missing_session_is_reported()
{
    let mut state = FaultState::without_session(PID);
    let mut out = Recorder::default();

    assert_eq!(dump(&mut state, &mut Scripted(vec![0x10]), &mut out), DumpOutcome::Unavailable);
    assert_eq!(out.lines().len(), 2);
}

#[test]
fn test_abort_returns_control()
{
    let mut state = state_with(FakeSession::default());
    let mut out = Recorder::default();

    let disposition = dispatch(libc::SIGABRT, &mut state, &mut Scripted(vec![0x10]), &mut out);

    assert_eq!(disposition, Disposition::Return);
    assert_eq!(out.lines()[0], format!("[fatal] faultline: received abort ({})", libc::SIGABRT));
    assert_eq!(out.syncs, 2);
}

#[test]
fn test_segv_terminates()
{
    let mut state = state_with(FakeSession::new(vec![app_module()]));
    let mut out = Recorder::default();

    let disposition = dispatch(libc::SIGSEGV, &mut state, &mut Scripted(vec![0x1010]), &mut out);

    assert_eq!(disposition, Disposition::Terminate);
    let lines = out.lines();
    assert_eq!(lines[0], format!("[fatal] faultline: received segmentation fault ({})", libc::SIGSEGV));
    assert_eq!(lines[1], "[fatal] faultline: dump");
    assert!(lines[2].starts_with("  1#"));
}

#[test]
fn test_terminal_even_without_session()
{
    let mut state = FaultState::without_session(PID);
    let mut out = Recorder::default();

    assert_eq!(
        dispatch(libc::SIGBUS, &mut state, &mut Scripted(Vec::new()), &mut out),
        Disposition::Terminate
    );
}

#[test]
fn test_unknown_signal_terminates()
{
    let mut state = state_with(FakeSession::default());
    let mut out = Recorder::default();

    let disposition = dispatch(libc::SIGUSR1, &mut state, &mut Scripted(Vec::new()), &mut out);

    assert_eq!(disposition, Disposition::Terminate);
    assert!(out.lines()[0].contains("unknown signal"));
}

#[test]
fn test_reentry_is_detected_while_dispatching()
{
    let process = ProcessState::new();
    assert!(process.arm(state_with(FakeSession::new(vec![app_module()]))));

    let mut out = Recorder::default();
    {
        let Entry::Acquired(mut guard) = process.enter() else {
            panic!("armed state must grant entry");
        };
        assert!(matches!(process.enter(), Entry::Reentered));
        assert_eq!(
            dispatch(libc::SIGABRT, &mut guard, &mut Scripted(vec![0x1010]), &mut out),
            Disposition::Return
        );
    }

    // Back to idle after an abort; the session itself stays closed.
    let Entry::Acquired(guard) = process.enter() else {
        panic!("guard must return the state to idle");
    };
    assert!(!guard.session().unwrap().is_open());
}
