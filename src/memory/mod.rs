//! Memory access layer consumed by the scanning core
//!
//! The scanner, session and pointer code never talk to the operating system
//! directly. Everything goes through [`ProcessMemory`], a narrow capability
//! interface with three concerns:
//! - enumerating readable regions
//! - bounded reads and writes of raw bytes
//! - resolving a module name to its base address
//!
//! Two implementations live here: [`SnapshotMemory`], an in-memory image used
//! for offline dumps and tests, and (on Windows) [`native::WindowsProcess`].

pub mod regions;
pub mod snapshot;

#[cfg(windows)]
pub mod native;

pub use regions::RegionFilter;
pub use snapshot::SnapshotMemory;

use crate::core::types::{
    Address, MemoryError, MemoryResult, MemoryValue, RegionEnumeration, ValueType,
};

/// Capability interface over a target's address space.
///
/// Implementations are read concurrently by every scan worker, so they must
/// not keep a shared mutable cursor.
pub trait ProcessMemory: Send + Sync {
    /// Lists the regions the scanner may read. A walk that stops early returns
    /// what it has plus a warning rather than failing.
    fn enumerate_regions(&self) -> RegionEnumeration;

    /// Fills `buf` from `address`. Short reads are errors.
    fn read_into(&self, address: Address, buf: &mut [u8]) -> MemoryResult<()>;

    /// Writes `data` at `address`
    fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()>;

    /// Base address of a loaded module, matched case-insensitively
    fn resolve_module_base(&self, module: &str) -> MemoryResult<Address>;

    /// Reads `len` bytes into a fresh buffer
    fn read_bytes(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(address, &mut buf)?;
        Ok(buf)
    }

    /// Fills `buf` one page at a time, skipping pages that fail.
    ///
    /// Returns the readable runs as merged `(start, end)` offsets into `buf`.
    fn read_pages(
        &self,
        address: Address,
        buf: &mut [u8],
        page_size: usize,
    ) -> Vec<(usize, usize)> {
        let page = page_size.max(1);
        let base = address.as_usize();
        let mut runs: Vec<(usize, usize)> = Vec::new();
        let mut offset = 0;

        while offset < buf.len() {
            let boundary = ((base + offset) / page + 1) * page;
            let end = (boundary - base).min(buf.len());
            if self.read_into(Address::new(base + offset), &mut buf[offset..end]).is_ok() {
                match runs.last_mut() {
                    Some(run) if run.1 == offset => run.1 = end,
                    _ => runs.push((offset, end)),
                }
            }
            offset = end;
        }

        runs
    }

    /// Reads a little-endian pointer of `width` bytes (4 or 8)
    fn read_pointer(&self, address: Address, width: usize) -> MemoryResult<Address> {
        match width {
            4 => {
                let mut raw = [0u8; 4];
                self.read_into(address, &mut raw)?;
                Ok(Address::new(u32::from_le_bytes(raw) as usize))
            }
            8 => {
                let mut raw = [0u8; 8];
                self.read_into(address, &mut raw)?;
                Ok(Address::new(u64::from_le_bytes(raw) as usize))
            }
            other => Err(MemoryError::UnsupportedOperation(format!(
                "pointer width {} is not supported",
                other
            ))),
        }
    }

    /// Reads a typed value. `len` is only consulted for bytes and strings.
    fn read_value(
        &self,
        address: Address,
        value_type: ValueType,
        len: usize,
    ) -> MemoryResult<MemoryValue> {
        let width = value_type.size().unwrap_or(len);
        let bytes = self.read_bytes(address, width)?;
        MemoryValue::from_bytes(&bytes, value_type).ok_or_else(|| {
            MemoryError::unreadable(address, format!("short read for {}", value_type))
        })
    }

    /// Writes a typed value in its little-endian image
    fn write_value(&self, address: Address, value: &MemoryValue) -> MemoryResult<()> {
        self.write_bytes(address, &value.to_bytes())
    }
}

impl<T: ProcessMemory + ?Sized> ProcessMemory for std::sync::Arc<T> {
    fn enumerate_regions(&self) -> RegionEnumeration {
        (**self).enumerate_regions()
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> MemoryResult<()> {
        (**self).read_into(address, buf)
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        (**self).write_bytes(address, data)
    }

    fn resolve_module_base(&self, module: &str) -> MemoryResult<Address> {
        (**self).resolve_module_base(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MemoryRegion, Protection};
    use std::sync::Arc;

    fn image() -> SnapshotMemory {
        let mut mem = SnapshotMemory::new();
        let mut bytes = vec![0u8; 0x100];
        bytes[0x10..0x18].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        mem.add_region(
            MemoryRegion::new(Address::new(0x4000), 0x100, Protection::read_write()),
            bytes,
        );
        mem
    }

    #[test]
    fn test_read_pointer_widths() {
        let mem = image();
        assert_eq!(
            mem.read_pointer(Address::new(0x4010), 8).unwrap(),
            Address::new(0x1122_3344_5566_7788)
        );
        assert_eq!(
            mem.read_pointer(Address::new(0x4010), 4).unwrap(),
            Address::new(0x5566_7788)
        );
        assert!(mem.read_pointer(Address::new(0x4010), 2).is_err());
    }

    #[test]
    fn test_read_pages_skips_holes() {
        let mut mem = SnapshotMemory::new();
        mem.add_region(
            MemoryRegion::new(Address::new(0x10000), 0x3000, Protection::read_write()),
            vec![0xAB; 0x3000],
        );
        mem.mark_unreadable(Address::new(0x11000), 0x1000);

        // Starts mid-page so the first run is short
        let mut buf = vec![0u8; 0x2F00];
        let runs = mem.read_pages(Address::new(0x10100), &mut buf, 0x1000);
        assert_eq!(runs, vec![(0, 0xF00), (0x1F00, 0x2F00)]);
        assert_eq!(buf[0x1F00], 0xAB);
        assert_eq!(buf[0x1000], 0);
    }

    #[test]
    fn test_typed_round_trip_through_trait_object() {
        let mem: Arc<dyn ProcessMemory> = Arc::new(image());
        mem.write_value(Address::new(0x4020), &MemoryValue::I16(-3)).unwrap();
        let value = mem.read_value(Address::new(0x4020), ValueType::I16, 0).unwrap();
        assert_eq!(value, MemoryValue::I16(-3));

        let text = mem.read_value(Address::new(0x4020), ValueType::Bytes, 2).unwrap();
        assert_eq!(text, MemoryValue::Bytes(vec![0xFD, 0xFF]));
    }
}
