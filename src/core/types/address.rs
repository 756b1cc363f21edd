//! Memory address wrapper type with hex parsing

use super::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An address in the target's virtual address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub usize);

impl Address {
    pub const fn new(value: usize) -> Self {
        Address(value)
    }

    pub const fn null() -> Self {
        Address(0)
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the address is aligned to the specified boundary
    pub const fn is_aligned(&self, alignment: usize) -> bool {
        alignment != 0 && self.0 % alignment == 0
    }

    /// Aligns the address up to a power-of-two boundary, saturating at the top of the space
    pub const fn align_up(&self, alignment: usize) -> Self {
        if alignment == 0 {
            return *self;
        }
        match self.0.checked_add(alignment - 1) {
            Some(v) => Address(v & !(alignment - 1)),
            None => Address(usize::MAX & !(alignment - 1)),
        }
    }

    /// Aligns the address down to a power-of-two boundary
    pub const fn align_down(&self, alignment: usize) -> Self {
        if alignment == 0 {
            return *self;
        }
        Address(self.0 & !(alignment - 1))
    }

    /// Adds a signed offset, returning `None` when the result leaves the address space
    pub fn checked_offset(&self, offset: i64) -> Option<Self> {
        let delta = isize::try_from(offset).ok()?;
        self.0.checked_add_signed(delta).map(Address)
    }

    /// Adds an unsigned byte count, returning `None` on overflow
    pub fn checked_add(&self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Address)
    }

    /// Signed distance `self - origin`
    pub fn offset_from(&self, origin: Address) -> i64 {
        (self.0 as i128 - origin.0 as i128) as i64
    }

    pub const fn as_usize(&self) -> usize {
        self.0
    }
}

impl FromStr for Address {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            usize::from_str_radix(hex, 16)
        } else if let Some(hex) = s.strip_prefix('$') {
            usize::from_str_radix(hex, 16)
        } else if s.chars().any(|c| c.is_ascii_alphabetic()) {
            usize::from_str_radix(s, 16)
        } else {
            s.parse::<usize>()
        };

        value
            .map(Address::new)
            .map_err(|_| MemoryError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Address::new(value)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value as usize)
    }
}

/// Parses an address, used by request decoding
pub fn parse_address(s: &str) -> MemoryResult<Address> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing() {
        assert_eq!(Address::from_str("0x1000").unwrap(), Address::new(0x1000));
        assert_eq!(Address::from_str("0X1000").unwrap(), Address::new(0x1000));
        assert_eq!(Address::from_str("$1000").unwrap(), Address::new(0x1000));
        assert_eq!(
            Address::from_str("DEADBEEF").unwrap(),
            Address::new(0xDEADBEEF)
        );
        assert_eq!(Address::from_str("4096").unwrap(), Address::new(4096));
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn test_address_alignment() {
        let addr = Address::new(0x1005);
        assert!(!addr.is_aligned(4));
        assert_eq!(addr.align_down(4), Address::new(0x1004));
        assert_eq!(addr.align_up(4), Address::new(0x1008));
        assert_eq!(Address::new(usize::MAX).align_up(0x1000).0 % 0x1000, 0);
    }

    #[test]
    fn test_checked_offset() {
        let addr = Address::new(0x1000);
        assert_eq!(addr.checked_offset(0x10), Some(Address::new(0x1010)));
        assert_eq!(addr.checked_offset(-0x10), Some(Address::new(0x0FF0)));
        assert_eq!(addr.checked_offset(-0x2000), None);
        assert_eq!(Address::new(usize::MAX).checked_offset(1), None);
        assert_eq!(Address::new(0x1010).offset_from(addr), 0x10);
        assert_eq!(addr.offset_from(Address::new(0x1010)), -0x10);
    }

    #[test]
    fn test_address_display() {
        let addr = Address::new(0xDEADBEEF);
        assert_eq!(format!("{}", addr), "0x00000000DEADBEEF");
        assert_eq!(format!("{:x}", addr), "0x00000000deadbeef");
    }
}
