//! Region selection for scans
//!
//! Regions come from the [`ProcessMemory`](super::ProcessMemory) collaborator
//! as immutable snapshots. This module decides which of them a scan touches.

pub mod filter;
pub mod protection;

pub use filter::RegionFilter;
pub use protection::ProtectionFlags;

use crate::core::types::{MemoryError, MemoryRegion, RegionEnumeration};
use tracing::warn;

/// Enumerates regions through `memory` and applies `filter`.
///
/// A partial enumeration is logged and passed on to the caller as a
/// `RegionEnumerationPartial` warning, never fatal.
pub fn select_regions(
    memory: &dyn super::ProcessMemory,
    filter: &RegionFilter,
) -> (Vec<MemoryRegion>, Option<MemoryError>) {
    let RegionEnumeration { regions, partial } = memory.enumerate_regions();

    let warning = partial.map(MemoryError::RegionEnumerationPartial);
    if let Some(warning) = &warning {
        warn!(
            warning = %warning,
            regions = regions.len(),
            "Scanning the regions enumerated so far"
        );
    }

    (filter.apply(regions), warning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Address, Protection};
    use crate::memory::SnapshotMemory;

    #[test]
    fn test_select_regions_reports_partial_walk() {
        let mut mem = SnapshotMemory::new();
        mem.add_region(
            MemoryRegion::new(Address::new(0x2000), 0x10, Protection::read_write()),
            vec![0; 0x10],
        );
        mem.add_region(
            MemoryRegion::new(Address::new(0x1000), 0x10, Protection::no_access()),
            vec![0; 0x10],
        );
        mem.set_partial("access denied at 0x3000");

        let (regions, partial) = select_regions(&mem, &RegionFilter::new());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].base, Address::new(0x2000));
        match partial {
            Some(MemoryError::RegionEnumerationPartial(reason)) => {
                assert_eq!(reason, "access denied at 0x3000")
            }
            other => panic!("expected a partial enumeration warning, got {:?}", other),
        }
    }
}
