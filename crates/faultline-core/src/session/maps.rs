//! Module table built from `/proc/<pid>/maps`.
//!
//! Each line of the maps file is one mapping:
//!
//! ```text
//! 55d4c2a00000-55d4c2a1b000 r--p 00000000 fd:01 1835 /usr/bin/faultline
//! start        end          perms offset  dev   inode path
//! ```
//!
//! Mappings of the same file are folded into one [`ModuleSlot`] spanning the
//! lowest start to the highest end. The runtime load base of a module is the
//! start of its file-offset-0 mapping.
//!
//! Refreshing runs inside the signal handler, so it only uses `open`, `read`
//! and `close`. Lines are assembled in a fixed buffer, and the table is a
//! slice allocated once at startup.

use std::fmt::Write;
use std::io;

use crate::error::SessionError;
use crate::format::FixedBuf;
use crate::types::ProcessId;

/// Maximum number of distinct files tracked per refresh. Extra files are ignored.
pub const MODULE_CAPACITY: usize = 512;

/// Maximum stored path length. Longer paths are truncated.
pub const MODULE_PATH_CAPACITY: usize = 512;

const MAPS_LINE_CAPACITY: usize = MODULE_PATH_CAPACITY + 128;
const READ_CHUNK: usize = 4096;

/// One file-backed module folded from its mappings.
#[derive(Clone, Copy)]
pub struct ModuleSlot
{
    start: u64,
    end: u64,
    load_base: Option<u64>,
    executable: bool,
    path: [u8; MODULE_PATH_CAPACITY],
    path_len: usize,
}

impl ModuleSlot
{
    const EMPTY: Self = Self {
        start: 0,
        end: 0,
        load_base: None,
        executable: false,
        path: [0; MODULE_PATH_CAPACITY],
        path_len: 0,
    };

    /// Lowest mapped address.
    pub const fn start(&self) -> u64
    {
        self.start
    }

    /// One past the highest mapped address.
    pub const fn end(&self) -> u64
    {
        self.end
    }

    /// Start of the mapping at file offset 0, if one is mapped.
    pub const fn load_base(&self) -> Option<u64>
    {
        self.load_base
    }

    /// Whether any mapping of the file is executable.
    pub const fn is_executable(&self) -> bool
    {
        self.executable
    }

    /// Whether `address` lies within the module's span.
    pub const fn contains(&self, address: u64) -> bool
    {
        address >= self.start && address < self.end
    }

    /// Raw path bytes (possibly truncated).
    pub fn path_bytes(&self) -> &[u8]
    {
        &self.path[..self.path_len]
    }

    /// Path as text. A truncated multi-byte character is cut off.
    pub fn path(&self) -> &str
    {
        let bytes = self.path_bytes();
        match std::str::from_utf8(bytes) {
            Ok(path) => path,
            Err(err) => std::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default(),
        }
    }

    fn absorb(&mut self, mapping: &Mapping<'_>)
    {
        self.start = self.start.min(mapping.start);
        self.end = self.end.max(mapping.end);
        self.executable |= mapping.executable;
        if mapping.offset == 0 {
            self.load_base = Some(self.load_base.map_or(mapping.start, |base| base.min(mapping.start)));
        }
    }
}

impl std::fmt::Debug for ModuleSlot
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ModuleSlot")
            .field("start", &format_args!("{:#x}", self.start))
            .field("end", &format_args!("{:#x}", self.end))
            .field("load_base", &self.load_base)
            .field("executable", &self.executable)
            .field("path", &self.path())
            .finish()
    }
}

/// One parsed line of a maps file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping<'a>
{
    pub start: u64,
    pub end: u64,
    pub offset: u64,
    pub executable: bool,
    pub path: &'a [u8],
}

/// Parse one maps line. Returns `None` for malformed lines and for mappings
/// that are not backed by a file (`[heap]`, `[vdso]`, anonymous memory).
pub fn parse_line(line: &[u8]) -> Option<Mapping<'_>>
{
    let mut rest = line;
    let range = next_field(&mut rest)?;
    let perms = next_field(&mut rest)?;
    let offset = next_field(&mut rest)?;
    let _dev = next_field(&mut rest)?;
    let _inode = next_field(&mut rest)?;

    let path = trim_end(trim_start(rest));
    if path.first() != Some(&b'/') {
        return None;
    }

    let dash = range.iter().position(|&b| b == b'-')?;
    let start = parse_hex(&range[..dash])?;
    let end = parse_hex(&range[dash + 1..])?;
    if end <= start {
        return None;
    }

    Some(Mapping {
        start,
        end,
        offset: parse_hex(offset)?,
        executable: perms.get(2) == Some(&b'x'),
        path,
    })
}

fn next_field<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]>
{
    let trimmed = trim_start(rest);
    let len = trimmed.iter().position(|&b| b == b' ').unwrap_or(trimmed.len());
    if len == 0 {
        return None;
    }
    let (field, tail) = trimmed.split_at(len);
    *rest = tail;
    Some(field)
}

fn trim_start(bytes: &[u8]) -> &[u8]
{
    let skip = bytes.iter().position(|&b| b != b' ' && b != b'\t').unwrap_or(bytes.len());
    &bytes[skip..]
}

fn trim_end(bytes: &[u8]) -> &[u8]
{
    let keep = bytes
        .iter()
        .rposition(|&b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
        .map_or(0, |pos| pos + 1);
    &bytes[..keep]
}

fn parse_hex(digits: &[u8]) -> Option<u64>
{
    if digits.is_empty() || digits.len() > 16 {
        return None;
    }
    digits.iter().try_fold(0u64, |acc, &b| {
        let nibble = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return None,
        };
        Some((acc << 4) | u64::from(nibble))
    })
}

/// Fixed-capacity table of modules.
pub struct ModuleTable
{
    slots: Box<[ModuleSlot]>,
    len: usize,
}

impl ModuleTable
{
    /// Allocate an empty table with room for [`MODULE_CAPACITY`] modules.
    ///
    /// Call at startup; refreshing afterwards reuses the storage.
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            slots: vec![ModuleSlot::EMPTY; MODULE_CAPACITY].into_boxed_slice(),
            len: 0,
        }
    }

    /// Drop every module, keeping the storage.
    pub fn clear(&mut self)
    {
        self.len = 0;
    }

    /// Number of modules.
    pub const fn len(&self) -> usize
    {
        self.len
    }

    /// Whether the table holds no module.
    pub const fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// Module at `index`.
    pub fn get(&self, index: usize) -> Option<&ModuleSlot>
    {
        self.slots[..self.len].get(index)
    }

    /// Modules in the order they were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleSlot> + '_
    {
        self.slots[..self.len].iter()
    }

    /// Index of the executable module whose span contains `address`.
    pub fn find(&self, address: u64) -> Option<usize>
    {
        self.iter().position(|slot| slot.executable && slot.contains(address))
    }

    /// Fold `mapping` into the slot for its file, creating one if needed.
    pub fn insert(&mut self, mapping: &Mapping<'_>)
    {
        let stored_len = mapping.path.len().min(MODULE_PATH_CAPACITY);
        let stored = &mapping.path[..stored_len];

        if let Some(slot) = self.slots[..self.len].iter_mut().find(|slot| slot.path_bytes() == stored) {
            slot.absorb(mapping);
            return;
        }

        if self.len == MODULE_CAPACITY {
            return;
        }

        let slot = &mut self.slots[self.len];
        *slot = ModuleSlot {
            start: mapping.start,
            end: mapping.end,
            ..ModuleSlot::EMPTY
        };
        slot.path[..stored_len].copy_from_slice(stored);
        slot.path_len = stored_len;
        slot.absorb(mapping);
        self.len += 1;
    }

    /// Rebuild the table from the complete contents of a maps file.
    pub fn load_from_bytes(&mut self, contents: &[u8])
    {
        let mut parser = MapsParser::new();
        self.clear();
        parser.feed(self, contents);
        parser.finish(self);
    }
}

impl Default for ModuleTable
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Incremental line splitter for maps data arriving in arbitrary chunks.
pub struct MapsParser
{
    line: [u8; MAPS_LINE_CAPACITY],
    len: usize,
}

impl MapsParser
{
    pub const fn new() -> Self
    {
        Self {
            line: [0; MAPS_LINE_CAPACITY],
            len: 0,
        }
    }

    /// Forget any partial line.
    pub fn reset(&mut self)
    {
        self.len = 0;
    }

    /// Consume a chunk, inserting every completed line into `table`.
    pub fn feed(&mut self, table: &mut ModuleTable, chunk: &[u8])
    {
        for &byte in chunk {
            if byte == b'\n' {
                self.flush(table);
            } else if self.len < MAPS_LINE_CAPACITY {
                self.line[self.len] = byte;
                self.len += 1;
            }
        }
    }

    /// Insert a trailing line that had no newline.
    pub fn finish(&mut self, table: &mut ModuleTable)
    {
        if self.len > 0 {
            self.flush(table);
        }
    }

    fn flush(&mut self, table: &mut ModuleTable)
    {
        if let Some(mapping) = parse_line(&self.line[..self.len]) {
            table.insert(&mapping);
        }
        self.len = 0;
    }
}

impl Default for MapsParser
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Pre-allocated buffers for [`refresh`].
pub struct MapsScratch
{
    chunk: [u8; READ_CHUNK],
    parser: MapsParser,
}

impl MapsScratch
{
    pub const fn new() -> Self
    {
        Self {
            chunk: [0; READ_CHUNK],
            parser: MapsParser::new(),
        }
    }
}

impl Default for MapsScratch
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Re-read `/proc/<pid>/maps` into `table` without allocating.
///
/// # Errors
///
/// [`SessionError::MapsUnavailable`] if the file cannot be opened or read.
/// The table may be partially filled in the read-error case.
pub fn refresh(table: &mut ModuleTable, scratch: &mut MapsScratch, pid: ProcessId) -> Result<(), SessionError>
{
    let mut path = FixedBuf::<32>::new();
    let _ = write!(path, "/proc/{pid}/maps\0");
    if path.is_truncated() {
        return Err(SessionError::MapsUnavailable { errno: libc::ENAMETOOLONG });
    }

    // SAFETY: `path` is NUL-terminated above and outlives the call.
    let fd = unsafe { libc::open(path.as_bytes().as_ptr().cast(), libc::O_RDONLY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(SessionError::MapsUnavailable { errno: last_errno() });
    }

    let MapsScratch { chunk, parser } = scratch;
    table.clear();
    parser.reset();

    let result = loop {
        // SAFETY: `chunk` is a live, writable buffer of the length passed.
        let n = unsafe { libc::read(fd, chunk.as_mut_ptr().cast(), chunk.len()) };
        if n < 0 {
            let errno = last_errno();
            if errno == libc::EINTR {
                continue;
            }
            break Err(SessionError::MapsUnavailable { errno });
        }
        if n == 0 {
            parser.finish(table);
            break Ok(());
        }
        parser.feed(table, &chunk[..n as usize]);
    };

    // SAFETY: `fd` was opened above and is closed exactly once.
    unsafe {
        libc::close(fd);
    }
    result
}

fn last_errno() -> i32
{
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
