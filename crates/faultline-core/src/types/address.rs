//! Instruction address type.

use std::fmt;

/// Strongly typed instruction address
///
/// Captured return addresses are machine words; they are widened to `u64` here
/// so the resolver and formatter work the same on 32- and 64-bit targets.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::Address;
///
/// let addr = Address::from(0x1010_u64);
/// assert_eq!(addr.offset_from(Address::new(0x1000)), Some(0x10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// Usable in const contexts, unlike `Address::from`.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Distance from `base` up to this address
    ///
    /// Returns `None` when `base` lies above this address, so a symbol whose
    /// start is after the queried address never yields a bogus offset.
    ///
    /// ```rust
    /// use faultline_core::types::Address;
    ///
    /// assert_eq!(Address::new(0x20).offset_from(Address::new(0x30)), None);
    /// ```
    pub const fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }

    /// Subtract an offset from this address, checking for underflow
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Add an offset to this address, checking for overflow
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value as u64)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
