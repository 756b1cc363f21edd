//! Offset path search and base candidate discovery
//!
//! `find_paths` walks forward from known starting addresses: every
//! pointer-width slot within `max_offset` of a node is dereferenced, and
//! values that land inside a readable region become the next layer. A path is
//! reported whenever a dereference yields the target. Cycles are not
//! detected; depth is the only bound.

use super::resolver::PointerResolver;
use crate::core::types::{find_region, Address, MemoryError, MemoryRegion, MemoryResult, Offset};
use crate::memory::regions::{select_regions, RegionFilter};
use crate::scan::value::first_aligned;
use crate::scan::{ChunkScheduler, RoundControl};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Upper bound on the work a path search will do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEstimate {
    /// Slots read around each node
    pub slots: u64,
    /// `max_depth * slots * from`
    pub reads: u64,
    pub budget: u64,
    pub within_budget: bool,
}

/// A starting address and the offsets that lead from it to the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerPath {
    pub base: Address,
    pub offsets: Vec<Offset>,
}

/// How a base candidate is anchored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BaseKind {
    /// Inside a module image, stable across restarts
    Static { module: String, module_offset: Offset },
    /// Heap or stack, moves between runs
    Dynamic,
}

/// A pointer-sized value that points at or just below the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseCandidate {
    /// Where the pointer is stored
    pub address: Address,
    /// What it points at
    pub value: Address,
    /// `target - value`, the offset a chain ending here would need
    pub offset: Offset,
    pub kind: BaseKind,
}

impl BaseCandidate {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, BaseKind::Static { .. })
    }
}

const BASE_SCAN_CHUNK: usize = 1024 * 1024;
const BASE_SCAN_PAGE: usize = 0x1000;

/// Little-endian pointer of 4 or 8 bytes
fn decode_pointer(raw: &[u8]) -> usize {
    let mut bytes = [0u8; 8];
    bytes[..raw.len()].copy_from_slice(raw);
    u64::from_le_bytes(bytes) as usize
}

/// End of a partial path: where it started and its last step, if any
#[derive(Debug, Clone, Copy)]
struct Trail {
    base: Address,
    last: Option<usize>,
}

/// Offsets of every partial path, stored once per step with a parent link
struct StepArena {
    steps: Vec<(Option<usize>, Offset)>,
    limit: usize,
}

impl StepArena {
    fn new(limit: usize) -> Self {
        StepArena { steps: Vec::new(), limit }
    }

    fn len(&self) -> usize {
        self.steps.len()
    }

    fn extend(&mut self, trail: Trail, offset: Offset) -> MemoryResult<Trail> {
        if self.steps.len() >= self.limit {
            return Err(MemoryError::TooManyPaths { limit: self.limit });
        }
        self.steps.push((trail.last, offset));
        Ok(Trail {
            base: trail.base,
            last: Some(self.steps.len() - 1),
        })
    }

    fn path(&self, trail: Trail) -> PointerPath {
        let mut offsets = Vec::new();
        let mut cursor = trail.last;
        while let Some(index) = cursor {
            let (parent, offset) = self.steps[index];
            offsets.push(offset);
            cursor = parent;
        }
        offsets.reverse();
        PointerPath { base: trail.base, offsets }
    }
}

impl PointerResolver {
    /// Cost of a `find_paths` call, computed without touching memory
    pub fn estimate_paths(&self, from: usize, max_depth: usize, max_offset: u64) -> PathEstimate {
        let width = self.settings.pointer_width as u64;
        let slots = 2 * (max_offset / width) + 1;
        let reads = (max_depth as u64).saturating_mul(slots).saturating_mul(from as u64);
        let budget = self.settings.max_path_reads;

        PathEstimate {
            slots,
            reads,
            budget,
            within_budget: reads <= budget,
        }
    }

    /// Every offset sequence of at most `max_depth` steps leading from one of
    /// `from` to `to`, shortest first and then by signed offsets.
    ///
    /// Partial paths share their prefixes, and the search stops with
    /// `TooManyPaths` once more than `max_paths` steps have been recorded.
    pub fn find_paths(
        &self,
        from: &[Address],
        to: Address,
        max_depth: usize,
        max_offset: u64,
    ) -> MemoryResult<Vec<PointerPath>> {
        if max_depth > self.settings.max_path_depth {
            return Err(MemoryError::ChainTooLong {
                depth: max_depth,
                max: self.settings.max_path_depth,
            });
        }
        let estimate = self.estimate_paths(from.len(), max_depth, max_offset);
        if !estimate.within_budget {
            return Err(MemoryError::SearchBudgetExceeded {
                estimated: estimate.reads,
                budget: estimate.budget,
            });
        }

        let mut regions = self.memory.enumerate_regions().regions;
        regions.sort_by_key(|r| r.base);
        let width = self.settings.pointer_width;
        let step = width as i64;
        let reach = (max_offset / width as u64) as i64 * step;
        let offsets: Vec<Offset> = (-reach..=reach).step_by(width).collect();

        // node address -> every path reaching it
        let mut frontier: BTreeMap<Address, Vec<Trail>> = BTreeMap::new();
        for base in from {
            frontier.entry(*base).or_default().push(Trail { base: *base, last: None });
        }

        let mut steps = StepArena::new(self.settings.max_paths);
        let mut found = Vec::new();
        let mut reads: u64 = 0;

        for depth in 1..=max_depth {
            reads += frontier.len() as u64 * offsets.len() as u64;
            if reads > estimate.budget {
                return Err(MemoryError::SearchBudgetExceeded {
                    estimated: reads,
                    budget: estimate.budget,
                });
            }

            let nodes: Vec<(Address, Vec<Trail>)> =
                std::mem::take(&mut frontier).into_iter().collect();
            let edges: Vec<(usize, Offset, Address)> = nodes
                .par_iter()
                .enumerate()
                .flat_map_iter(|(index, (node, _))| {
                    offsets.iter().filter_map(move |&offset| {
                        let slot = node.checked_offset(offset)?;
                        let value = self.memory.read_pointer(slot, width).ok()?;
                        Some((index, offset, value))
                    })
                })
                .collect();

            for (index, offset, value) in edges {
                let hits_target = value == to;
                let expands = depth < max_depth && find_region(&regions, value).is_some();
                if !hits_target && !expands {
                    continue;
                }
                for trail in &nodes[index].1 {
                    let next = steps.extend(*trail, offset)?;
                    if hits_target {
                        found.push(next);
                    }
                    if expands {
                        frontier.entry(value).or_default().push(next);
                    }
                }
            }

            debug!(
                depth,
                frontier = frontier.len(),
                found = found.len(),
                steps = steps.len(),
                "Path search layer done"
            );
            if frontier.is_empty() {
                break;
            }
        }

        let mut paths: Vec<PointerPath> =
            found.into_iter().map(|trail| steps.path(trail)).collect();
        paths.sort_by(|a, b| {
            (a.offsets.len(), &a.offsets, a.base).cmp(&(b.offsets.len(), &b.offsets, b.base))
        });
        info!(paths = paths.len(), reads, "Pointer path search complete");
        Ok(paths)
    }

    /// Pointer-aligned values in readable memory that point into
    /// `[target - max_offset, target]`. Static candidates come first, then
    /// the smallest offsets.
    ///
    /// A chunk that cannot be read whole is re-read by page, so one guard
    /// page only hides the slots it covers.
    pub fn find_base_candidates(
        &self,
        target: Address,
        max_offset: u64,
        limit: usize,
    ) -> MemoryResult<Vec<BaseCandidate>> {
        let width = self.settings.pointer_width;
        let low = target.as_usize().saturating_sub(max_offset as usize);
        let high = target.as_usize();

        let (regions, _) = select_regions(&*self.memory, &RegionFilter::new());
        let chunks = ChunkScheduler::new(BASE_SCAN_CHUNK, 0).partition(&regions, width);

        let outcome = self.pool.run(&chunks, &RoundControl::unbounded(), |chunk| {
            let mut buf = vec![0u8; chunk.read_len()];
            let runs = match self.memory.read_into(chunk.base, &mut buf) {
                Ok(()) => vec![(0, buf.len())],
                Err(e) => {
                    debug!(base = %chunk.base, error = %e, "Chunk read failed, retrying by page");
                    self.memory.read_pages(chunk.base, &mut buf, BASE_SCAN_PAGE)
                }
            };

            let mut hits = Vec::new();
            for (start, end) in runs {
                let run_base = chunk.base.as_usize() + start;
                let first = start + first_aligned(Address::new(run_base), width);
                for offset in (first..chunk.owned.min(end)).step_by(width) {
                    if offset + width > end {
                        break;
                    }
                    let value = decode_pointer(&buf[offset..offset + width]);
                    if (low..=high).contains(&value) {
                        let address = Address::new(chunk.base.as_usize() + offset);
                        hits.push((address, Address::new(value)));
                    }
                }
            }
            hits
        })?;

        let mut candidates: Vec<BaseCandidate> = outcome
            .completed()
            .flatten()
            .map(|(address, value)| BaseCandidate {
                address,
                value,
                offset: target.offset_from(value),
                kind: self.classify(&regions, address),
            })
            .collect();

        candidates.sort_by_key(|c| (!c.is_static(), c.offset, c.address));
        candidates.truncate(limit);
        Ok(candidates)
    }

    fn classify(&self, regions: &[MemoryRegion], address: Address) -> BaseKind {
        let module = find_region(regions, address).and_then(|region| region.module.clone());
        match module {
            Some(name) => match self.memory.resolve_module_base(&name) {
                Ok(base) => BaseKind::Static {
                    module_offset: address.offset_from(base),
                    module: name,
                },
                Err(_) => BaseKind::Dynamic,
            },
            None => BaseKind::Dynamic,
        }
    }
}
