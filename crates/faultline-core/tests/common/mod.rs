//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use faultline_core::capture::StackCapture;
use faultline_core::error::SessionError;
use faultline_core::session::DebugInfoSession;
use faultline_core::types::{Address, ModuleRef, ProcessId, SourceLine, SymbolInfo};
use faultline_core::writer::RawOutput;

/// One module known to [`FakeSession`].
#[derive(Debug, Clone, Default)]
pub struct FakeModule
{
    pub name: Option<String>,
    pub start: u64,
    pub end: u64,
    /// (base address, name)
    pub symbols: Vec<(u64, String)>,
    /// (start, end, path, line)
    pub lines: Vec<(u64, u64, String, Option<u32>)>,
}

impl FakeModule
{
    pub fn new(name: &str, start: u64, end: u64) -> Self
    {
        Self {
            name: Some(name.to_string()),
            start,
            end,
            ..Self::default()
        }
    }

    pub fn symbol(mut self, base: u64, name: &str) -> Self
    {
        self.symbols.push((base, name.to_string()));
        self
    }

    pub fn line(mut self, start: u64, end: u64, path: &str, line: Option<u32>) -> Self
    {
        self.lines.push((start, end, path.to_string(), line));
        self
    }
}

/// In-memory session answering from a fixed module list.
#[derive(Debug, Default)]
pub struct FakeSession
{
    pub modules: Vec<FakeModule>,
    pub enumerate_error: Option<SessionError>,
    pub enumerations: usize,
    pub closed: bool,
}

impl FakeSession
{
    pub fn new(modules: Vec<FakeModule>) -> Self
    {
        Self {
            modules,
            ..Self::default()
        }
    }

    pub fn failing(error: SessionError) -> Self
    {
        Self {
            enumerate_error: Some(error),
            ..Self::default()
        }
    }

    fn module(&self, module: ModuleRef) -> Option<&FakeModule>
    {
        if self.closed {
            return None;
        }
        self.modules.get(module.0)
    }
}

impl DebugInfoSession for FakeSession
{
    fn enumerate_modules(&mut self, _pid: ProcessId) -> Result<(), SessionError>
    {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.enumerations += 1;
        match self.enumerate_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn resolve_address(&self, address: Address) -> Option<ModuleRef>
    {
        if self.closed {
            return None;
        }
        self.modules
            .iter()
            .position(|module| address.value() >= module.start && address.value() < module.end)
            .map(ModuleRef)
    }

    fn module_name(&self, module: ModuleRef) -> Option<&str>
    {
        self.module(module)?.name.as_deref()
    }

    fn symbol_info(&self, module: ModuleRef, address: Address) -> Option<SymbolInfo<'_>>
    {
        let (base, name) = self
            .module(module)?
            .symbols
            .iter()
            .filter(|(base, _)| *base <= address.value())
            .max_by_key(|(base, _)| *base)?;
        Some(SymbolInfo {
            name,
            offset: address.value() - base,
            base: Address::new(*base),
            size: None,
        })
    }

    fn line_info(&self, module: ModuleRef, address: Address) -> Option<SourceLine<'_>>
    {
        let (_, _, path, line) = self
            .module(module)?
            .lines
            .iter()
            .find(|(start, end, _, _)| address.value() >= *start && address.value() < *end)?;
        Some(SourceLine { path, line: *line })
    }

    fn close(&mut self)
    {
        self.closed = true;
    }

    fn is_open(&self) -> bool
    {
        !self.closed
    }
}

/// Capture that reports a fixed list of addresses.
pub struct Scripted(pub Vec<usize>);

impl StackCapture for Scripted
{
    fn capture(&mut self, buffer: &mut [usize]) -> usize
    {
        let count = self.0.len().min(buffer.len());
        buffer[..count].copy_from_slice(&self.0[..count]);
        count
    }
}

/// Output sink that records every write separately.
#[derive(Debug, Default)]
pub struct Recorder
{
    pub writes: Vec<Vec<u8>>,
    pub syncs: usize,
}

impl Recorder
{
    pub fn text(&self) -> String
    {
        String::from_utf8_lossy(&self.writes.concat()).into_owned()
    }

    pub fn lines(&self) -> Vec<String>
    {
        self.text().lines().map(str::to_string).collect()
    }
}

impl RawOutput for Recorder
{
    fn write_bytes(&mut self, bytes: &[u8])
    {
        self.writes.push(bytes.to_vec());
    }

    fn sync(&mut self)
    {
        self.syncs += 1;
    }
}
