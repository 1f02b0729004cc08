//! Tests for successful installation
//!
//! Lives in its own test binary: installation is process-wide and cannot be
//! undone.

#![cfg(target_os = "linux")]

use faultline_core::config::Config;
use faultline_core::install::{install, install_with, installation, Installation};
use faultline_core::platform::linux::current_disposition;
use faultline_core::session::{DebugInfoSession, DwarfSession};
use faultline_core::signal::HANDLED_SIGNALS;
use faultline_core::types::ProcessId;

fn arm() -> &'static Installation
{
    install_with(Config::default(), |pid| {
        let session: Box<dyn DebugInfoSession> = Box::new(DwarfSession::open(pid)?);
        Ok(session)
    })
}

#[test]
fn test_install_arms_every_signal()
{
    let installation = arm();

    assert_eq!(
        *installation,
        Installation::Armed {
            pid: ProcessId::current(),
            signals: HANDLED_SIGNALS.len(),
        }
    );
    for class in HANDLED_SIGNALS {
        let handler = current_disposition(class.signal).unwrap();
        assert_ne!(handler, libc::SIG_DFL, "{} not registered", class.description);
    }
}

#[test]
fn test_install_is_idempotent()
{
    let first = arm();
    let second = install();
    let third = install_with(Config::default(), |_| panic!("factory must not run twice"));

    assert!(std::ptr::eq(first, second));
    assert!(std::ptr::eq(first, third));
    assert!(std::ptr::eq(first, installation().unwrap()));
}
