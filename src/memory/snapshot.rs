//! In-memory address space image
//!
//! `SnapshotMemory` holds a set of regions with their bytes and behaves like a
//! live target: reads fail on unreadable pages, writes are visible to later
//! reads, and modules resolve to the lowest region carrying their name. Used
//! for offline dumps, benchmarks and tests.

use super::ProcessMemory;
use crate::core::types::{
    Address, MemoryError, MemoryRegion, MemoryResult, MemoryValue, RegionEnumeration,
};
use std::collections::HashSet;
use std::sync::RwLock;

const DEFAULT_PAGE_SIZE: usize = 0x1000;

#[derive(Debug)]
struct SnapshotRegion {
    region: MemoryRegion,
    bytes: Vec<u8>,
}

/// An address space held entirely in process memory
#[derive(Debug)]
pub struct SnapshotMemory {
    regions: RwLock<Vec<SnapshotRegion>>,
    unreadable_pages: HashSet<usize>,
    page_size: usize,
    partial: Option<String>,
}

impl Default for SnapshotMemory {
    fn default() -> Self {
        SnapshotMemory::new()
    }
}

impl SnapshotMemory {
    pub fn new() -> Self {
        SnapshotMemory::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// `page_size` must be a power of two
    pub fn with_page_size(page_size: usize) -> Self {
        SnapshotMemory {
            regions: RwLock::new(Vec::new()),
            unreadable_pages: HashSet::new(),
            page_size: page_size.max(1).next_power_of_two(),
            partial: None,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Adds a region; `bytes` is resized to the region size
    pub fn add_region(&mut self, region: MemoryRegion, mut bytes: Vec<u8>) {
        bytes.resize(region.size, 0);
        let regions = self.regions.get_mut().unwrap_or_else(|e| e.into_inner());
        let idx = regions.partition_point(|r| r.region.base < region.base);
        regions.insert(idx, SnapshotRegion { region, bytes });
    }

    /// Marks every page touched by `[address, address + len)` unreadable
    pub fn mark_unreadable(&mut self, address: Address, len: usize) {
        if len == 0 {
            return;
        }
        let first = address.align_down(self.page_size).as_usize();
        let last = address.as_usize().saturating_add(len - 1);
        let mut page = first;
        while page <= last {
            self.unreadable_pages.insert(page);
            match page.checked_add(self.page_size) {
                Some(next) => page = next,
                None => break,
            }
        }
    }

    /// Makes `enumerate_regions` report a partial walk
    pub fn set_partial(&mut self, reason: impl Into<String>) {
        self.partial = Some(reason.into());
    }

    /// Writes a value, ignoring protection. Test images use this to simulate
    /// the target changing between scan rounds.
    pub fn poke(&self, address: Address, value: &MemoryValue) -> MemoryResult<()> {
        self.store(address, &value.to_bytes(), false)
    }

    /// Writes a pointer-width little-endian value, ignoring protection
    pub fn poke_pointer(
        &self,
        address: Address,
        target: Address,
        width: usize,
    ) -> MemoryResult<()> {
        let raw = (target.as_usize() as u64).to_le_bytes();
        self.store(address, &raw[..width.min(8)], false)
    }

    fn pages_readable(&self, address: Address, len: usize) -> bool {
        if self.unreadable_pages.is_empty() || len == 0 {
            return true;
        }
        let mut page = address.align_down(self.page_size).as_usize();
        let end = address.as_usize().saturating_add(len);
        while page < end {
            if self.unreadable_pages.contains(&page) {
                return false;
            }
            match page.checked_add(self.page_size) {
                Some(next) => page = next,
                None => break,
            }
        }
        true
    }

    fn store(&self, address: Address, data: &[u8], check_protection: bool) -> MemoryResult<()> {
        let mut regions = self.regions.write().unwrap_or_else(|e| e.into_inner());
        let idx = regions.partition_point(|r| r.region.base <= address);
        let target = idx
            .checked_sub(1)
            .and_then(|i| regions.get_mut(i))
            .filter(|r| r.region.contains_range(address, data.len()))
            .ok_or_else(|| MemoryError::write_failed(address, "address is not mapped"))?;

        if check_protection && !target.region.protection.write {
            return Err(MemoryError::write_failed(address, "region is not writable"));
        }

        let start = address.as_usize() - target.region.base.as_usize();
        target.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl ProcessMemory for SnapshotMemory {
    fn enumerate_regions(&self) -> RegionEnumeration {
        let regions = self.regions.read().unwrap_or_else(|e| e.into_inner());
        let listed = regions.iter().map(|r| r.region.clone()).collect();
        match &self.partial {
            Some(reason) => RegionEnumeration::partial(listed, reason.clone()),
            None => RegionEnumeration::complete(listed),
        }
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> MemoryResult<()> {
        let regions = self.regions.read().unwrap_or_else(|e| e.into_inner());
        let idx = regions.partition_point(|r| r.region.base <= address);
        let source = idx
            .checked_sub(1)
            .and_then(|i| regions.get(i))
            .filter(|r| r.region.contains_range(address, buf.len()))
            .ok_or_else(|| MemoryError::unreadable(address, "address is not mapped"))?;

        if !source.region.is_readable() || !self.pages_readable(address, buf.len()) {
            return Err(MemoryError::unreadable(address, "page is not readable"));
        }

        let start = address.as_usize() - source.region.base.as_usize();
        buf.copy_from_slice(&source.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        self.store(address, data, true)
    }

    fn resolve_module_base(&self, module: &str) -> MemoryResult<Address> {
        let regions = self.regions.read().unwrap_or_else(|e| e.into_inner());
        regions
            .iter()
            .filter(|r| r.region.belongs_to(module))
            .map(|r| r.region.base)
            .min()
            .ok_or_else(|| MemoryError::ModuleNotFound(module.to_string()))
    }
}
