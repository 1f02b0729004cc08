//! Resolved frame types.

use super::Address;

/// Opaque handle to a module known by a debug-info session
///
/// Only meaningful to the session that produced it, and only until that
/// session's next module refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleRef(pub usize);

/// Symbol covering an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo<'a>
{
    /// Raw (possibly mangled) linkage name.
    pub name: &'a str,
    /// Distance from `base` to the queried address.
    pub offset: u64,
    /// Runtime address of the symbol's first instruction.
    pub base: Address,
    /// Symbol size in bytes, if the symbol table records one.
    pub size: Option<u64>,
}

/// Source position for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLine<'a>
{
    /// Source file path as recorded in the line table.
    pub path: &'a str,
    /// Line number, if known.
    pub line: Option<u32>,
}

/// One displayable backtrace entry
///
/// Every field except `index` and `address` is optional, and each one is
/// filled independently. Resolution degrades from full information down to a
/// bare address without any sentinel values:
///
/// | module | symbol | source | rendered as                       |
/// |--------|--------|--------|-----------------------------------|
/// | -      | -      | -      | address                           |
/// | yes    | -      | any    | address, module [, source]        |
/// | yes    | yes    | any    | address, symbol+offset, module... |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord<'a>
{
    /// 1-based position, 1 = innermost frame.
    pub index: usize,
    /// Captured return address.
    pub address: Address,
    /// Name of the module containing `address`.
    pub module: Option<&'a str>,
    /// Enclosing symbol.
    pub symbol: Option<SymbolInfo<'a>>,
    /// Source file and line.
    pub source: Option<SourceLine<'a>>,
}

impl<'a> FrameRecord<'a>
{
    /// Record with nothing resolved beyond the raw address.
    pub const fn unresolved(index: usize, address: Address) -> Self
    {
        Self {
            index,
            address,
            module: None,
            symbol: None,
            source: None,
        }
    }
}
