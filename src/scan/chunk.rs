//! Chunk scheduler: splits regions into bounded work units
//!
//! Chunk boundaries fall on absolute multiples of the chunk size, so every
//! value alignment up to the chunk size lines up identically in each chunk.
//! A chunk reads up to `width - 1` bytes past its owned span; a value belongs
//! to the chunk whose owned span holds its first byte, which finds each
//! boundary-straddling value exactly once.

use crate::core::types::{Address, MemoryRegion};

/// One unit of first-scan work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub base: Address,
    /// Bytes whose matches this chunk reports
    pub owned: usize,
    /// Extra bytes read past `owned` for values straddling the end
    pub overlap: usize,
}

impl Chunk {
    pub fn read_len(&self) -> usize {
        self.owned + self.overlap
    }

    pub fn owned_end(&self) -> Address {
        Address::new(self.base.as_usize() + self.owned)
    }
}

/// A contiguous read covering a run of sorted candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBatch {
    pub base: Address,
    pub len: usize,
    /// Indices into the candidate list this batch covers
    pub first: usize,
    pub count: usize,
}

/// Partitions address space for the worker pool
#[derive(Debug, Clone, Copy)]
pub struct ChunkScheduler {
    chunk_size: usize,
    max_gap: usize,
}

impl ChunkScheduler {
    /// `chunk_size` is rounded up to a power of two
    pub fn new(chunk_size: usize, max_gap: usize) -> Self {
        ChunkScheduler {
            chunk_size: chunk_size.max(1).next_power_of_two(),
            max_gap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Splits `regions` into chunks for values `width` bytes wide.
    ///
    /// Overlap never crosses into the next region: regions are separate
    /// snapshots and a value spanning two of them is not reported.
    pub fn partition(&self, regions: &[MemoryRegion], width: usize) -> Vec<Chunk> {
        let tail = width.max(1) - 1;
        let mut chunks = Vec::new();

        for region in regions {
            let start = region.base.as_usize();
            let end = start.saturating_add(region.size);
            let mut cursor = start;

            while cursor < end {
                let boundary = (cursor / self.chunk_size)
                    .checked_add(1)
                    .and_then(|n| n.checked_mul(self.chunk_size))
                    .unwrap_or(usize::MAX);
                let owned_end = boundary.min(end);

                chunks.push(Chunk {
                    base: Address::new(cursor),
                    owned: owned_end - cursor,
                    overlap: tail.min(end - owned_end),
                });
                cursor = owned_end;
            }
        }

        chunks
    }

    /// Groups sorted, unique candidate addresses into contiguous reads no
    /// longer than one chunk, splitting wherever two neighbours are further
    /// than `max_gap` bytes apart.
    pub fn batch_addresses(&self, addresses: &[Address], width: usize) -> Vec<ReadBatch> {
        let width = width.max(1);
        let mut batches: Vec<ReadBatch> = Vec::new();

        for (index, address) in addresses.iter().enumerate() {
            let start = address.as_usize();
            let end = start.saturating_add(width);

            if let Some(batch) = batches.last_mut() {
                let batch_end = batch.base.as_usize() + batch.len;
                let gap = start.saturating_sub(batch_end);
                let span = end - batch.base.as_usize();
                if gap <= self.max_gap && span <= self.chunk_size.max(width) {
                    batch.len = span.max(batch.len);
                    batch.count += 1;
                    continue;
                }
            }

            batches.push(ReadBatch {
                base: *address,
                len: end - start,
                first: index,
                count: 1,
            });
        }

        batches
    }
}
