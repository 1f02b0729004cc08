//! Module image parsing: symbol tables and DWARF line info.
//!
//! Everything here runs at session open. The parsed data is fully owned so
//! the fault-time lookups only walk existing memory.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use addr2line::Context;
use gimli::{Dwarf, EndianArcSlice, RunTimeEndian};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use tracing::debug;

use crate::error::{FaultlineError, Result};
use crate::types::SourceLine;

type OwnedReader = EndianArcSlice<RunTimeEndian>;

/// Directory searched for separate debug files by build id.
const DEBUG_ROOT: &str = "/usr/lib/debug";

/// Function symbol from `.symtab` or `.dynsym`, in link-time addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry
{
    pub address: u64,
    pub size: u64,
    pub name: Box<str>,
}

/// Parsed module: sorted function symbols and an optional line-table context.
pub struct ModuleImage
{
    path: PathBuf,
    link_base: u64,
    symbols: Vec<SymbolEntry>,
    context: Option<Context<OwnedReader>>,
    debug_file: Option<PathBuf>,
}

impl ModuleImage
{
    /// Read and parse the object file at `path`.
    ///
    /// When the file has no `.debug_info`, a separate debug file is looked up
    /// by build id and then by `.gnu_debuglink`. Missing DWARF is not an
    /// error; the image then only answers symbol queries.
    ///
    /// # Errors
    ///
    /// [`FaultlineError::Io`] if the file cannot be read,
    /// [`FaultlineError::InvalidImage`] if it is not an object file.
    pub fn load(path: &Path) -> Result<Self>
    {
        let data = fs::read(path)?;
        let file = object::File::parse(&*data).map_err(|err| invalid_image(path, err))?;

        let link_base = link_base(&file);
        let mut symbols = collect_symbols(&file);
        let mut debug_file = None;

        let context = if has_dwarf(&file) {
            build_context(&file).map_err(|err| debug!(path = %path.display(), %err, "unusable DWARF")).ok()
        } else if let Some(candidate) = find_debug_file(path, &file) {
            let context = load_debug_file(&candidate, &mut symbols);
            debug_file = Some(candidate);
            context
        } else {
            None
        };

        symbols.sort_by(|a, b| a.address.cmp(&b.address).then(b.size.cmp(&a.size)));
        symbols.dedup_by_key(|symbol| symbol.address);

        Ok(Self {
            path: path.to_path_buf(),
            link_base,
            symbols,
            context,
            debug_file,
        })
    }

    /// Path the image was loaded from.
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Separate debug file used for line info, if any.
    pub fn debug_file(&self) -> Option<&Path>
    {
        self.debug_file.as_deref()
    }

    /// Link-time address of the file-offset-0 segment.
    pub const fn link_base(&self) -> u64
    {
        self.link_base
    }

    /// Number of distinct function symbols.
    pub fn symbol_count(&self) -> usize
    {
        self.symbols.len()
    }

    /// Whether source lines can be resolved.
    pub const fn has_line_info(&self) -> bool
    {
        self.context.is_some()
    }

    /// Function symbol covering link-time address `address`.
    ///
    /// A symbol with no recorded size covers everything up to the next one.
    pub fn symbol_at(&self, address: u64) -> Option<&SymbolEntry>
    {
        let after = self.symbols.partition_point(|symbol| symbol.address <= address);
        let symbol = self.symbols.get(after.checked_sub(1)?)?;
        if symbol.size == 0 || address - symbol.address < symbol.size {
            Some(symbol)
        } else {
            None
        }
    }

    /// Source line for link-time address `address`.
    ///
    /// addr2line parses each compilation unit's line program the first time
    /// it is queried, which allocates. This is the one query that is not
    /// allocation-free.
    pub fn location_at(&self, address: u64) -> Option<SourceLine<'_>>
    {
        let location = self.context.as_ref()?.find_location(address).ok()??;
        Some(SourceLine {
            path: location.file?,
            line: location.line,
        })
    }
}

impl std::fmt::Debug for ModuleImage
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ModuleImage")
            .field("path", &self.path)
            .field("link_base", &format_args!("{:#x}", self.link_base))
            .field("symbols", &self.symbols.len())
            .field("line_info", &self.context.is_some())
            .field("debug_file", &self.debug_file)
            .finish()
    }
}

fn invalid_image(path: &Path, err: impl std::fmt::Display) -> FaultlineError
{
    FaultlineError::InvalidImage {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn link_base(file: &object::File<'_>) -> u64
{
    file.segments()
        .find(|segment| segment.file_range().0 == 0)
        .map(|segment| segment.address())
        .or_else(|| file.segments().map(|segment| segment.address()).min())
        .unwrap_or(0)
}

fn collect_symbols(file: &object::File<'_>) -> Vec<SymbolEntry>
{
    file.symbols()
        .chain(file.dynamic_symbols())
        .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.is_definition() && symbol.address() != 0)
        .filter_map(|symbol| {
            let name = symbol.name().ok().filter(|name| !name.is_empty())?;
            Some(SymbolEntry {
                address: symbol.address(),
                size: symbol.size(),
                name: name.into(),
            })
        })
        .collect()
}

fn has_dwarf(file: &object::File<'_>) -> bool
{
    file.section_by_name(".debug_info").is_some_and(|section| section.size() > 0)
}

fn build_context(file: &object::File<'_>) -> std::result::Result<Context<OwnedReader>, gimli::Error>
{
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let dwarf = Dwarf::load(|id| {
        let data = file
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[]));
        Ok::<_, gimli::Error>(EndianArcSlice::new(Arc::<[u8]>::from(&*data), endian))
    })?;
    Context::from_dwarf(dwarf)
}

fn load_debug_file(path: &Path, symbols: &mut Vec<SymbolEntry>) -> Option<Context<OwnedReader>>
{
    let data = fs::read(path).map_err(|err| debug!(path = %path.display(), %err, "unreadable debug file")).ok()?;
    let file = object::File::parse(&*data)
        .map_err(|err| debug!(path = %path.display(), %err, "unparsable debug file"))
        .ok()?;

    // Stripped binaries keep only .dynsym; the debug file has the full table.
    symbols.extend(collect_symbols(&file));
    build_context(&file).map_err(|err| debug!(path = %path.display(), %err, "unusable DWARF")).ok()
}

fn find_debug_file(path: &Path, file: &object::File<'_>) -> Option<PathBuf>
{
    if let Ok(Some(build_id)) = file.build_id() {
        if let Some(candidate) = build_id_path(build_id).filter(|candidate| candidate.is_file()) {
            return Some(candidate);
        }
    }

    let (link, _crc) = file.gnu_debuglink().ok()??;
    let link = std::str::from_utf8(link).ok()?;
    let dir = path.parent()?;
    let nested = Path::new(DEBUG_ROOT).join(dir.strip_prefix("/").unwrap_or(dir));

    [dir.join(link), dir.join(".debug").join(link), nested.join(link)]
        .into_iter()
        .find(|candidate| candidate != path && candidate.is_file())
}

fn build_id_path(build_id: &[u8]) -> Option<PathBuf>
{
    let (head, tail) = build_id.split_first()?;
    if tail.is_empty() {
        return None;
    }
    let mut name = String::with_capacity(tail.len() * 2 + 6);
    for byte in tail {
        let _ = write!(name, "{byte:02x}");
    }
    name.push_str(".debug");
    Some(Path::new(DEBUG_ROOT).join(".build-id").join(format!("{head:02x}")).join(name))
}
