//! Frame resolution: one captured address to one [`FrameRecord`].

use crate::session::DebugInfoSession;
use crate::types::{Address, FrameRecord};

/// Build the record for frame `index` at `address`.
///
/// Each piece of information is queried independently, so a frame can have a
/// source line without a symbol or a symbol without a source line. An address
/// outside every known module stays unresolved.
///
/// ## Example
///
/// ```rust,no_run
/// use faultline_core::resolve::resolve_frame;
/// use faultline_core::session::{DebugInfoSession, DwarfSession};
/// use faultline_core::types::{Address, ProcessId};
///
/// let session = DwarfSession::open(ProcessId::current()).unwrap();
/// let record = resolve_frame(&session, 1, Address::new(0x1000));
/// assert!(record.symbol.is_none());
/// ```
pub fn resolve_frame<'s, S>(session: &'s S, index: usize, address: Address) -> FrameRecord<'s>
where
    S: DebugInfoSession + ?Sized,
{
    let mut record = FrameRecord::unresolved(index, address);
    let Some(module) = session.resolve_address(address) else {
        return record;
    };

    record.module = session.module_name(module);
    record.symbol = session.symbol_info(module, address);
    record.source = session.line_info(module, address);
    record
}
