//! Symbol demangling without allocation.
//!
//! `rustc_demangle::try_demangle` only parses the name; the returned
//! `Demangle` renders itself through `fmt::Display`, so writing it into a
//! fixed buffer never touches the heap. Non-Rust names are printed raw.
//!
//! - Rust legacy: `_ZN...E`
//! - Rust v0: `_R...`
//! - Everything else (C, C++ Itanium): left as-is

use std::fmt;

use rustc_demangle::try_demangle;

/// Display adapter printing the demangled form of a linkage name
///
/// The hash suffix of legacy Rust symbols is dropped (`{:#}` form).
#[derive(Debug, Clone, Copy)]
pub struct SymbolDisplay<'a>(pub &'a str);

impl fmt::Display for SymbolDisplay<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match try_demangle(self.0) {
            Ok(demangled) => write!(f, "{demangled:#}"),
            Err(_) => f.write_str(self.0),
        }
    }
}
