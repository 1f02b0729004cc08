//! Default [`DebugInfoSession`] backed by procfs, `object` and `addr2line`.

use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::{debug, info};

use super::image::ModuleImage;
use super::maps::{self, MapsScratch, ModuleSlot, ModuleTable, MODULE_CAPACITY};
use super::DebugInfoSession;
use crate::error::{FaultlineError, Result, SessionError};
use crate::types::{Address, ModuleRef, ProcessId, SourceLine, SymbolInfo};

/// Debug-info session for a live process
///
/// [`open`](Self::open) does all the expensive work up front: it reads the
/// module map and parses every executable module's symbol table and DWARF.
/// [`enumerate_modules`](DebugInfoSession::enumerate_modules) later re-reads
/// the map into pre-allocated storage and re-attaches the parsed images by
/// path. Modules mapped after `open` therefore resolve by name only.
///
/// ## Example
///
/// ```rust,no_run
/// use faultline_core::session::{DebugInfoSession, DwarfSession};
/// use faultline_core::types::{Address, ProcessId};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>>
/// {
///     let pid = ProcessId::current();
///     let mut session = DwarfSession::open(pid)?;
///     session.enumerate_modules(pid)?;
///
///     let address = Address::from(main as usize);
///     if let Some(module) = session.resolve_address(address) {
///         println!("{:?}", session.symbol_info(module, address));
///     }
///     Ok(())
/// }
/// ```
pub struct DwarfSession
{
    pid: ProcessId,
    table: ModuleTable,
    scratch: Box<MapsScratch>,
    images: Vec<ModuleImage>,
    slot_images: Box<[Option<usize>]>,
    open: bool,
}

impl DwarfSession
{
    /// Open a session for `pid`.
    ///
    /// Modules that cannot be parsed are skipped and logged at debug level.
    ///
    /// # Errors
    ///
    /// [`FaultlineError::SessionOpen`] if the module map of `pid` is unreadable.
    pub fn open(pid: ProcessId) -> Result<Self>
    {
        let mut table = ModuleTable::new();
        let mut scratch = Box::new(MapsScratch::new());
        maps::refresh(&mut table, &mut scratch, pid).map_err(|err| FaultlineError::SessionOpen(err.to_string()))?;

        let images: Vec<ModuleImage> = table
            .iter()
            .filter(|slot| slot.is_executable())
            .filter_map(|slot| match ModuleImage::load(Path::new(slot.path())) {
                Ok(image) => {
                    debug!(
                        path = slot.path(),
                        symbols = image.symbol_count(),
                        line_info = image.has_line_info(),
                        "loaded module image"
                    );
                    Some(image)
                }
                Err(err) => {
                    debug!(path = slot.path(), %err, "skipping module image");
                    None
                }
            })
            .collect();

        let mut session = Self {
            pid,
            table,
            scratch,
            images,
            slot_images: vec![None; MODULE_CAPACITY].into_boxed_slice(),
            open: true,
        };
        session.link_images();

        info!(
            pid = %pid,
            modules = session.table.len(),
            images = session.images.len(),
            "debug info session opened"
        );
        Ok(session)
    }

    /// Process this session was opened for.
    pub const fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// Modules found by the last refresh.
    pub fn modules(&self) -> &ModuleTable
    {
        &self.table
    }

    /// Parsed image attached to `module`, if any.
    pub fn image(&self, module: ModuleRef) -> Option<&ModuleImage>
    {
        let index = (*self.slot_images.get(module.0)?)?;
        self.images.get(index)
    }

    fn link_images(&mut self)
    {
        for (index, slot) in self.table.iter().enumerate() {
            self.slot_images[index] = self
                .images
                .iter()
                .position(|image| image.path().as_os_str().as_bytes() == slot.path_bytes());
        }
    }

    fn slot(&self, module: ModuleRef) -> Option<&ModuleSlot>
    {
        if !self.open {
            return None;
        }
        self.table.get(module.0)
    }

    /// Slot, image and load bias (runtime minus link-time address) of `module`.
    fn linked(&self, module: ModuleRef) -> Option<(&ModuleImage, u64)>
    {
        let slot = self.slot(module)?;
        let image = self.image(module)?;
        let runtime_base = slot.load_base().unwrap_or(slot.start());
        Some((image, runtime_base.wrapping_sub(image.link_base())))
    }
}

impl DebugInfoSession for DwarfSession
{
    fn enumerate_modules(&mut self, pid: ProcessId) -> std::result::Result<(), SessionError>
    {
        if !self.open {
            return Err(SessionError::Closed);
        }
        maps::refresh(&mut self.table, &mut self.scratch, pid)?;
        self.link_images();
        Ok(())
    }

    fn resolve_address(&self, address: Address) -> Option<ModuleRef>
    {
        if !self.open {
            return None;
        }
        self.table.find(address.value()).map(ModuleRef)
    }

    fn module_name(&self, module: ModuleRef) -> Option<&str>
    {
        Some(self.slot(module)?.path()).filter(|path| !path.is_empty())
    }

    fn symbol_info(&self, module: ModuleRef, address: Address) -> Option<SymbolInfo<'_>>
    {
        let (image, bias) = self.linked(module)?;
        let symbol = image.symbol_at(address.value().wrapping_sub(bias))?;
        let base = Address::new(symbol.address.wrapping_add(bias));
        Some(SymbolInfo {
            name: &symbol.name,
            offset: address.offset_from(base)?,
            base,
            size: (symbol.size > 0).then_some(symbol.size),
        })
    }

    /// Resolved through addr2line, which may allocate the first time a
    /// compilation unit is touched. A fault inside the allocator can therefore
    /// deadlock here; symbol names and module paths are already written by then.
    fn line_info(&self, module: ModuleRef, address: Address) -> Option<SourceLine<'_>>
    {
        let (image, bias) = self.linked(module)?;
        image.location_at(address.value().wrapping_sub(bias))
    }

    fn close(&mut self)
    {
        self.open = false;
    }

    fn is_open(&self) -> bool
    {
        self.open
    }
}
