//! Region model: immutable snapshots of scannable memory ranges

use super::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page protection as the scanner sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Protection {
    pub const fn new(read: bool, write: bool, execute: bool) -> Self {
        Protection {
            read,
            write,
            execute,
        }
    }

    pub const fn read_only() -> Self {
        Protection::new(true, false, false)
    }

    pub const fn read_write() -> Self {
        Protection::new(true, true, false)
    }

    pub const fn read_execute() -> Self {
        Protection::new(true, false, true)
    }

    pub const fn no_access() -> Self {
        Protection::new(false, false, false)
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' }
        )
    }
}

/// A contiguous range of target memory. Re-enumerated per scan, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub base: Address,
    pub size: usize,
    pub protection: Protection,
    /// Name of the image backing the region, if any
    pub module: Option<String>,
}

impl MemoryRegion {
    pub fn new(base: Address, size: usize, protection: Protection) -> Self {
        MemoryRegion {
            base,
            size,
            protection,
            module: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// One past the last byte; saturates at the top of the address space
    pub fn end(&self) -> Address {
        Address::new(self.base.as_usize().saturating_add(self.size))
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }

    /// True when `len` bytes starting at `address` lie inside the region
    pub fn contains_range(&self, address: Address, len: usize) -> bool {
        self.contains(address)
            && address
                .as_usize()
                .checked_add(len)
                .map_or(false, |end| end <= self.end().as_usize())
    }

    pub fn is_readable(&self) -> bool {
        self.protection.read
    }

    /// Case-insensitive module match, as module names are on Windows
    pub fn belongs_to(&self, module: &str) -> bool {
        self.module
            .as_deref()
            .map_or(false, |name| name.eq_ignore_ascii_case(module))
    }
}

/// Output of the region collaborator: what could be enumerated plus an optional
/// warning when the walk stopped early.
#[derive(Debug, Clone, Default)]
pub struct RegionEnumeration {
    pub regions: Vec<MemoryRegion>,
    pub partial: Option<String>,
}

impl RegionEnumeration {
    pub fn complete(regions: Vec<MemoryRegion>) -> Self {
        RegionEnumeration {
            regions,
            partial: None,
        }
    }

    pub fn partial(regions: Vec<MemoryRegion>, reason: impl Into<String>) -> Self {
        RegionEnumeration {
            regions,
            partial: Some(reason.into()),
        }
    }
}

/// Finds the region containing `address` in a list sorted by base address
pub fn find_region(regions: &[MemoryRegion], address: Address) -> Option<&MemoryRegion> {
    let idx = regions.partition_point(|r| r.base <= address);
    let candidate = regions.get(idx.checked_sub(1)?)?;
    candidate.contains(address).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(base: usize, size: usize) -> MemoryRegion {
        MemoryRegion::new(Address::new(base), size, Protection::read_write())
    }

    #[test]
    fn test_region_bounds() {
        let r = region(0x1000, 0x100);
        assert_eq!(r.end(), Address::new(0x1100));
        assert!(r.contains(Address::new(0x10FF)));
        assert!(!r.contains(Address::new(0x1100)));
        assert!(r.contains_range(Address::new(0x10FC), 4));
        assert!(!r.contains_range(Address::new(0x10FD), 4));
    }

    #[test]
    fn test_find_region() {
        let regions = vec![region(0x1000, 0x100), region(0x3000, 0x100)];
        assert_eq!(find_region(&regions, Address::new(0x1050)).unwrap().base, Address::new(0x1000));
        assert!(find_region(&regions, Address::new(0x2000)).is_none());
        assert!(find_region(&regions, Address::new(0x0500)).is_none());
        assert_eq!(find_region(&regions, Address::new(0x30FF)).unwrap().base, Address::new(0x3000));
    }

    #[test]
    fn test_module_match_is_case_insensitive() {
        let r = region(0x1000, 0x10).with_module("Game.exe");
        assert!(r.belongs_to("game.EXE"));
        assert!(!r.belongs_to("other.dll"));
    }

    #[test]
    fn test_protection_display() {
        assert_eq!(Protection::read_execute().to_string(), "r-x");
        assert_eq!(Protection::no_access().to_string(), "---");
    }
}
