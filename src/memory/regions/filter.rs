//! Memory region filtering functionality

use crate::core::types::{Address, MemoryRegion};
use serde::{Deserialize, Serialize};

/// Criteria a region must meet to be scanned.
///
/// Address ranges clip regions rather than reject them, so a range that
/// starts mid-region still scans the overlapping part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegionFilter {
    /// Inclusive start, exclusive end
    pub address_range: Option<(Address, Address)>,
    /// Filter by writable regions only
    pub writable_only: bool,
    /// Filter by executable regions only
    pub executable_only: bool,
    /// Only regions backed by this module
    pub module: Option<String>,
    /// Filter by minimum size
    pub min_size: Option<usize>,
}

impl RegionFilter {
    /// Create a filter that accepts every readable region
    pub fn new() -> Self {
        RegionFilter::default()
    }

    /// Set address range filter
    pub fn with_address_range(mut self, start: Address, end: Address) -> Self {
        self.address_range = Some((start, end));
        self
    }

    /// Filter for writable regions only
    pub fn writable(mut self) -> Self {
        self.writable_only = true;
        self
    }

    /// Filter for executable regions only
    pub fn executable(mut self) -> Self {
        self.executable_only = true;
        self
    }

    /// Restrict to regions of one module
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Set minimum size filter
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = Some(size);
        self
    }

    /// Check if a region matches the filter criteria, ignoring the address range
    pub fn matches(&self, region: &MemoryRegion) -> bool {
        if !region.is_readable() || region.size == 0 {
            return false;
        }

        if self.writable_only && !region.protection.write {
            return false;
        }

        if self.executable_only && !region.protection.execute {
            return false;
        }

        if let Some(module) = &self.module {
            if !region.belongs_to(module) {
                return false;
            }
        }

        if let Some(min) = self.min_size {
            if region.size < min {
                return false;
            }
        }

        true
    }

    /// Apply the filter: drop non-matching regions, clip the rest to the
    /// address range and return them sorted by base address.
    pub fn apply(&self, regions: Vec<MemoryRegion>) -> Vec<MemoryRegion> {
        let mut kept: Vec<MemoryRegion> = regions
            .into_iter()
            .filter(|region| self.matches(region))
            .filter_map(|region| self.clip(region))
            .collect();

        kept.sort_by_key(|region| region.base);
        kept
    }

    fn clip(&self, mut region: MemoryRegion) -> Option<MemoryRegion> {
        let Some((start, end)) = self.address_range else {
            return Some(region);
        };

        let lo = region.base.max(start);
        let hi = region.end().min(end);
        if lo >= hi {
            return None;
        }

        region.base = lo;
        region.size = hi.as_usize() - lo.as_usize();
        Some(region)
    }

    /// Total bytes the filter would scan
    pub fn total_size(&self, regions: &[MemoryRegion]) -> usize {
        regions
            .iter()
            .filter(|region| self.matches(region))
            .filter_map(|region| self.clip(region.clone()))
            .map(|region| region.size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Protection;

    fn region(base: usize, size: usize, protection: Protection) -> MemoryRegion {
        MemoryRegion::new(Address::new(base), size, protection)
    }

    #[test]
    fn test_region_filter_matching() {
        let rw = region(0x1000, 0x2000, Protection::read_write());
        let rx = region(0x8000, 0x1000, Protection::read_execute()).with_module("game.exe");
        let none = region(0xA000, 0x1000, Protection::no_access());

        assert!(RegionFilter::new().matches(&rw));
        assert!(!RegionFilter::new().matches(&none));
        assert!(!RegionFilter::new().executable().matches(&rw));
        assert!(RegionFilter::new().executable().matches(&rx));
        assert!(!RegionFilter::new().writable().matches(&rx));
        assert!(RegionFilter::new().in_module("GAME.EXE").matches(&rx));
        assert!(!RegionFilter::new().in_module("game.exe").matches(&rw));
        assert!(!RegionFilter::new().with_min_size(0x4000).matches(&rw));
    }

    #[test]
    fn test_apply_clips_and_sorts() {
        let regions = vec![
            region(0x8000, 0x1000, Protection::read_write()),
            region(0x1000, 0x2000, Protection::read_write()),
            region(0xA000, 0x1000, Protection::read_write()),
        ];

        let filter =
            RegionFilter::new().with_address_range(Address::new(0x2000), Address::new(0x8800));
        let kept = filter.apply(regions.clone());

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].base, Address::new(0x2000));
        assert_eq!(kept[0].size, 0x1000);
        assert_eq!(kept[1].base, Address::new(0x8000));
        assert_eq!(kept[1].size, 0x800);
        assert_eq!(filter.total_size(&regions), 0x1800);
    }

    #[test]
    fn test_filter_deserializes_with_defaults() {
        let filter: RegionFilter = serde_json::from_str(r#"{"writableOnly":true}"#).unwrap();
        assert!(filter.writable_only);
        assert!(filter.module.is_none());
        assert!(filter.address_range.is_none());
    }
}
