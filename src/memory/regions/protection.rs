//! Windows page protection decoding
//!
//! Raw `PAGE_*` values from `VirtualQueryEx` are reduced to the scanner's
//! read/write/execute view. Kept platform-neutral so it can be tested anywhere.

use crate::core::types::Protection;

/// Memory protection flags as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionFlags {
    value: u32,
}

impl ProtectionFlags {
    pub const PAGE_NOACCESS: u32 = 0x01;
    pub const PAGE_READONLY: u32 = 0x02;
    pub const PAGE_READWRITE: u32 = 0x04;
    pub const PAGE_WRITECOPY: u32 = 0x08;
    pub const PAGE_EXECUTE: u32 = 0x10;
    pub const PAGE_EXECUTE_READ: u32 = 0x20;
    pub const PAGE_EXECUTE_READWRITE: u32 = 0x40;
    pub const PAGE_EXECUTE_WRITECOPY: u32 = 0x80;
    pub const PAGE_GUARD: u32 = 0x100;

    pub const MEM_COMMIT: u32 = 0x1000;

    pub fn new(value: u32) -> Self {
        ProtectionFlags { value }
    }

    /// Guard pages fault on first touch, so they count as unreadable
    pub fn is_readable(&self) -> bool {
        const READABLE: u32 = ProtectionFlags::PAGE_READONLY
            | ProtectionFlags::PAGE_READWRITE
            | ProtectionFlags::PAGE_WRITECOPY
            | ProtectionFlags::PAGE_EXECUTE_READ
            | ProtectionFlags::PAGE_EXECUTE_READWRITE
            | ProtectionFlags::PAGE_EXECUTE_WRITECOPY;

        (self.value & READABLE) != 0 && !self.is_guard()
    }

    pub fn is_writable(&self) -> bool {
        (self.value
            & (Self::PAGE_READWRITE
                | Self::PAGE_WRITECOPY
                | Self::PAGE_EXECUTE_READWRITE
                | Self::PAGE_EXECUTE_WRITECOPY))
            != 0
    }

    pub fn is_executable(&self) -> bool {
        (self.value
            & (Self::PAGE_EXECUTE
                | Self::PAGE_EXECUTE_READ
                | Self::PAGE_EXECUTE_READWRITE
                | Self::PAGE_EXECUTE_WRITECOPY))
            != 0
    }

    pub fn is_guard(&self) -> bool {
        (self.value & Self::PAGE_GUARD) != 0
    }

    pub fn raw(&self) -> u32 {
        self.value
    }
}

impl From<ProtectionFlags> for Protection {
    fn from(flags: ProtectionFlags) -> Self {
        Protection::new(flags.is_readable(), flags.is_writable(), flags.is_executable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection_decoding() {
        let rw: Protection = ProtectionFlags::new(ProtectionFlags::PAGE_READWRITE).into();
        assert_eq!(rw, Protection::read_write());

        let rx: Protection = ProtectionFlags::new(ProtectionFlags::PAGE_EXECUTE_READ).into();
        assert_eq!(rx, Protection::read_execute());

        let x = ProtectionFlags::new(ProtectionFlags::PAGE_EXECUTE);
        assert!(!x.is_readable());
        assert!(x.is_executable());
    }

    #[test]
    fn test_guard_pages_are_unreadable() {
        let guarded =
            ProtectionFlags::new(ProtectionFlags::PAGE_READWRITE | ProtectionFlags::PAGE_GUARD);
        assert!(guarded.is_guard());
        assert!(!guarded.is_readable());
        assert!(guarded.is_writable());
        assert!(!ProtectionFlags::new(ProtectionFlags::PAGE_NOACCESS).is_readable());
    }
}
