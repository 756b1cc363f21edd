//! Chain resolution and write-back

use super::chain::{PointerBase, PointerChain};
use crate::core::types::{Address, MemoryError, MemoryResult, MemoryValue, ValueType};
use crate::memory::ProcessMemory;
use crate::scan::WorkerPool;
use std::sync::Arc;
use tracing::trace;

/// Limits and target layout for pointer work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSettings {
    /// 4 or 8
    pub pointer_width: usize,
    /// Longest chain `resolve` accepts
    pub max_chain_depth: usize,
    /// Deepest search `find_paths` accepts
    pub max_path_depth: usize,
    /// Pointer reads one path search may spend
    pub max_path_reads: u64,
    /// Partial path steps one path search may record
    pub max_paths: usize,
}

impl Default for PointerSettings {
    fn default() -> Self {
        PointerSettings {
            pointer_width: std::mem::size_of::<usize>(),
            max_chain_depth: 16,
            max_path_depth: 5,
            max_path_reads: 50_000_000,
            max_paths: 1_000_000,
        }
    }
}

/// Resolves chains against one target
pub struct PointerResolver {
    pub(super) memory: Arc<dyn ProcessMemory>,
    pub(super) pool: Arc<WorkerPool>,
    pub(super) settings: PointerSettings,
}

impl PointerResolver {
    pub fn new(
        memory: Arc<dyn ProcessMemory>,
        pool: Arc<WorkerPool>,
        settings: PointerSettings,
    ) -> Self {
        PointerResolver { memory, pool, settings }
    }

    pub fn settings(&self) -> &PointerSettings {
        &self.settings
    }

    /// Start address of a chain
    pub fn base_address(&self, base: &PointerBase) -> MemoryResult<Address> {
        match base {
            PointerBase::Absolute { address } => Ok(*address),
            PointerBase::Module { name, offset } => {
                let module = self.memory.resolve_module_base(name)?;
                module
                    .checked_offset(*offset)
                    .ok_or_else(|| MemoryError::InvalidAddress(format!("{}{:+#x}", name, offset)))
            }
        }
    }

    /// Final address the chain points at
    pub fn resolve(&self, chain: &PointerChain) -> MemoryResult<Address> {
        let trace = self.resolve_trace(chain)?;
        Ok(trace.last().copied().unwrap_or_default())
    }

    /// The base followed by the value read at every hop
    pub fn resolve_trace(&self, chain: &PointerChain) -> MemoryResult<Vec<Address>> {
        if chain.depth() > self.settings.max_chain_depth {
            return Err(MemoryError::ChainTooLong {
                depth: chain.depth(),
                max: self.settings.max_chain_depth,
            });
        }

        let mut current = self.base_address(&chain.base)?;
        let mut trace = Vec::with_capacity(chain.depth() + 1);
        trace.push(current);

        for offset in &chain.offsets {
            let slot = current.checked_offset(*offset).ok_or_else(|| {
                MemoryError::unreadable(current, format!("offset {:#x} overflows", offset))
            })?;
            current = self.memory.read_pointer(slot, self.settings.pointer_width)?;
            trace!(slot = %slot, value = %current, "Dereferenced");
            trace.push(current);
        }

        Ok(trace)
    }

    /// Reads a value at the chain's final address
    pub fn read_value(
        &self,
        chain: &PointerChain,
        value_type: ValueType,
        len: usize,
    ) -> MemoryResult<MemoryValue> {
        let address = self.resolve(chain)?;
        self.memory.read_value(address, value_type, len)
    }

    /// Resolves the chain and writes `value` at its final address
    pub fn write_value(&self, chain: &PointerChain, value: &MemoryValue) -> MemoryResult<Address> {
        let address = self.resolve(chain)?;
        self.memory.write_value(address, value)?;
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MemoryRegion, Protection};
    use crate::memory::SnapshotMemory;
    use pretty_assertions::assert_eq;

    const MODULE: usize = 0x140000000;
    const HEAP: usize = 0x2000000;

    fn resolver(max_chain_depth: usize) -> (Arc<SnapshotMemory>, PointerResolver) {
        let mut mem = SnapshotMemory::new();
        mem.add_region(
            MemoryRegion::new(Address::new(MODULE), 0x1000, Protection::read_only())
                .with_module("game.exe"),
            vec![0; 0x1000],
        );
        mem.add_region(
            MemoryRegion::new(Address::new(HEAP), 0x1000, Protection::read_write()),
            vec![0; 0x1000],
        );
        let mem = Arc::new(mem);

        mem.poke_pointer(Address::new(MODULE + 0x110), Address::new(HEAP + 0x200), 8)
            .unwrap();
        mem.poke_pointer(Address::new(HEAP + 0x208), Address::new(HEAP + 0x500), 8)
            .unwrap();

        let settings = PointerSettings {
            pointer_width: 8,
            max_chain_depth,
            ..PointerSettings::default()
        };
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let resolver = PointerResolver::new(mem.clone(), pool, settings);
        (mem, resolver)
    }

    #[test]
    fn test_resolve_two_hops() {
        let (_, resolver) = resolver(16);
        let chain = PointerChain::module("game.exe", 0x100, vec![0x10, 0x8]);

        assert_eq!(resolver.resolve(&chain).unwrap(), Address::new(HEAP + 0x500));
        assert_eq!(
            resolver.resolve_trace(&chain).unwrap(),
            vec![
                Address::new(MODULE + 0x100),
                Address::new(HEAP + 0x200),
                Address::new(HEAP + 0x500)
            ]
        );
    }

    #[test]
    fn test_resolve_without_offsets_is_base() {
        let (_, resolver) = resolver(16);
        let chain = PointerChain::absolute(Address::new(0x1234), vec![]);
        assert_eq!(resolver.resolve(&chain).unwrap(), Address::new(0x1234));
    }

    #[test]
    fn test_chain_limits_and_failures() {
        let (_, resolver) = resolver(1);
        let chain = PointerChain::module("game.exe", 0x100, vec![0x10, 0x8]);
        assert!(matches!(
            resolver.resolve(&chain),
            Err(MemoryError::ChainTooLong { depth: 2, max: 1 })
        ));

        let missing = PointerChain::module("other.dll", 0, vec![0]);
        assert!(matches!(resolver.resolve(&missing), Err(MemoryError::ModuleNotFound(_))));

        let wild = PointerChain::absolute(Address::new(0x10), vec![0]);
        assert!(matches!(resolver.resolve(&wild), Err(MemoryError::UnreadableAddress { .. })));
    }

    #[test]
    fn test_write_through_chain() {
        let (mem, resolver) = resolver(16);
        let chain = PointerChain::module("game.exe", 0x100, vec![0x10, 0x8]);

        let written = resolver.write_value(&chain, &MemoryValue::F32(99.5)).unwrap();
        assert_eq!(written, Address::new(HEAP + 0x500));
        assert_eq!(mem.read_value(written, ValueType::F32, 0).unwrap(), MemoryValue::F32(99.5));
        assert_eq!(resolver.read_value(&chain, ValueType::F32, 0).unwrap(), MemoryValue::F32(99.5));
    }
}
