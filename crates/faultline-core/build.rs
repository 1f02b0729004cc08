//! Build script for faultline-core
//!
//! This script checks build requirements before compilation:
//! - Minimum Rust version (`Option::is_some_and` needs Rust 1.70.0+)
//! - Target support (fault handling relies on `/proc` and glibc's `backtrace(3)`)
//!
//! Unsupported targets still compile; installation then reports itself as disabled.

use std::env;

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 70, 0);

        if rustc_version < min_rust_version {
            panic!(
                "faultline-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    // Cargo exposes the *target* configuration to build scripts through env vars,
    // `cfg!` here would describe the host instead.
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();

    if target_os != "linux" {
        println!("cargo:warning=faultline-core: fault handlers are only installed on Linux (target_os = {target_os})");
    } else if target_env != "gnu" {
        println!("cargo:warning=faultline-core: backtrace(3) is unavailable on {target_env}, captured stacks will be empty");
    }
}
