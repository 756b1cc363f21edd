//! Native Windows accessor over `ReadProcessMemory` and friends

use super::regions::ProtectionFlags;
use super::ProcessMemory;
use crate::core::types::{
    Address, MemoryError, MemoryRegion, MemoryResult, ProcessId, RegionEnumeration,
};
use crate::windows::bindings::psapi::LoadedModule;
use crate::windows::bindings::{kernel32, psapi};
use crate::windows::Handle;
use tracing::debug;

/// Highest user-mode address on 64-bit Windows
const USER_SPACE_END: usize = 0x7FFF_FFFF_FFFF;

/// An attached target process
pub struct WindowsProcess {
    handle: Handle,
    pid: ProcessId,
}

impl WindowsProcess {
    /// Opens `pid` with read, write and query access
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let raw = kernel32::open_process(pid, kernel32::SCAN_ACCESS)?;
        debug!(pid, "Opened target process");
        Ok(WindowsProcess {
            handle: Handle::new(raw),
            pid,
        })
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    fn modules(&self) -> MemoryResult<Vec<LoadedModule>> {
        unsafe { psapi::list_modules(self.handle.raw()) }
    }
}

fn module_for(modules: &[LoadedModule], address: usize) -> Option<&str> {
    modules
        .iter()
        .find(|m| address >= m.base && address < m.base.saturating_add(m.size))
        .map(|m| m.name.as_str())
}

impl ProcessMemory for WindowsProcess {
    fn enumerate_regions(&self) -> RegionEnumeration {
        let modules = self.modules().unwrap_or_default();
        let mut regions = Vec::new();
        let mut current = 0usize;

        while current < USER_SPACE_END {
            let mbi = match unsafe { kernel32::virtual_query_ex(self.handle.raw(), current) } {
                Ok(mbi) => mbi,
                Err(err) => {
                    let reason = format!("stopped at 0x{:X}: {}", current, err);
                    return RegionEnumeration::partial(regions, reason);
                }
            };

            let base = mbi.BaseAddress as usize;
            let size = mbi.RegionSize;
            let flags = ProtectionFlags::new(mbi.Protect);

            if mbi.State == ProtectionFlags::MEM_COMMIT && flags.is_readable() {
                let mut region = MemoryRegion::new(Address::new(base), size, flags.into());
                if let Some(name) = module_for(&modules, base) {
                    region = region.with_module(name);
                }
                regions.push(region);
            }

            match base.checked_add(size) {
                Some(next) if next > current => current = next,
                _ => break,
            }
        }

        RegionEnumeration::complete(regions)
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> MemoryResult<()> {
        unsafe { kernel32::read_process_memory(self.handle.raw(), address.as_usize(), buf) }
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        unsafe { kernel32::write_process_memory(self.handle.raw(), address.as_usize(), data) }
    }

    fn resolve_module_base(&self, module: &str) -> MemoryResult<Address> {
        self.modules()?
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(module))
            .map(|m| Address::new(m.base))
            .ok_or_else(|| MemoryError::ModuleNotFound(module.to_string()))
    }
}
