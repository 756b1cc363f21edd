//! Round execution: first scans, refinements and one-shot AOB scans
//!
//! A round partitions its work with the [`ChunkScheduler`], fans it out over
//! the [`WorkerPool`] and merges the per-job hit lists only after the join.
//! Nothing here mutates a session; callers install the returned
//! [`CandidateSet`] themselves.

use super::candidates::CandidateSet;
use super::chunk::{Chunk, ChunkScheduler, ReadBatch};
use super::control::RoundControl;
use super::pattern::{FuzzyHit, Pattern};
use super::value::ValueMatcher;
use super::worker::WorkerPool;
use crate::core::types::{
    Address, Criterion, MemoryError, MemoryResult, ScanType, ValueType,
};
use crate::memory::regions::{select_regions, RegionFilter};
use crate::memory::ProcessMemory;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Tunables shared by every round of a store
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub chunk_size: usize,
    pub page_size: usize,
    pub max_candidates: usize,
    pub refine_batch_gap: usize,
    pub use_simd: bool,
    pub scan_timeout: Option<Duration>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            chunk_size: 1024 * 1024,
            page_size: 0x1000,
            max_candidates: 10_000_000,
            refine_batch_gap: 256,
            use_simd: true,
            scan_timeout: None,
        }
    }
}

impl ScanSettings {
    pub fn scheduler(&self) -> ChunkScheduler {
        ChunkScheduler::new(self.chunk_size, self.refine_batch_gap)
    }
}

/// Per-round options supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanOptions {
    pub filter: RegionFilter,
    /// Overrides the natural alignment of the value type
    pub alignment: Option<usize>,
}

/// Counters recorded with every round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDiagnostics {
    pub regions: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub bytes_scanned: u64,
    pub unreadable_bytes: u64,
    /// Candidates dropped on refinement because they could not be re-read
    pub dropped_unreadable: usize,
    /// Matches beyond the candidate cap that were discarded
    pub truncated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_enumeration: Option<String>,
}

/// A compiled round: a value predicate or a byte pattern
#[derive(Debug, Clone)]
pub enum Matcher {
    Value(ValueMatcher),
    Pattern {
        pattern: Pattern,
        max_distance: Option<u32>,
    },
}

impl Matcher {
    /// Compiles `scan_type` + `criterion` for a session of `value_type`.
    ///
    /// `width` is the established width of an existing session, if any.
    pub fn compile(
        value_type: ValueType,
        scan_type: ScanType,
        criterion: &Criterion,
        width: Option<usize>,
    ) -> MemoryResult<Self> {
        if scan_type != ScanType::Pattern {
            return ValueMatcher::compile(value_type, scan_type, criterion, width)
                .map(Matcher::Value);
        }

        scan_type.check_criterion(criterion)?;
        if !matches!(value_type, ValueType::Bytes | ValueType::String) {
            return Err(MemoryError::type_mismatch(format!(
                "pattern scans produce byte values, session type is {}",
                value_type
            )));
        }
        let (text, max_distance) = match criterion {
            Criterion::Pattern { pattern, max_distance } => (pattern, *max_distance),
            _ => return Err(MemoryError::invalid_criterion("pattern scan needs a pattern")),
        };
        let pattern = Pattern::parse(text)?;
        if let Some(w) = width {
            if w != pattern.len() {
                return Err(MemoryError::type_mismatch(format!(
                    "pattern is {} bytes, session values are {} bytes",
                    pattern.len(),
                    w
                )));
            }
        }

        Ok(Matcher::Pattern { pattern, max_distance })
    }

    pub fn width(&self) -> usize {
        match self {
            Matcher::Value(matcher) => matcher.width(),
            Matcher::Pattern { pattern, .. } => pattern.len(),
        }
    }

    pub fn needs_previous(&self) -> bool {
        match self {
            Matcher::Value(matcher) => matcher.needs_previous(),
            Matcher::Pattern { .. } => false,
        }
    }

    /// Natural alignment, or `requested` after checking it is a power of two
    /// dividing the width
    pub fn alignment(&self, requested: Option<usize>) -> MemoryResult<usize> {
        let natural = match self {
            Matcher::Value(matcher) => matcher.value_type().alignment(),
            Matcher::Pattern { .. } => 1,
        };
        match requested {
            None => Ok(natural),
            Some(align) if align.is_power_of_two() && self.width() % align == 0 => Ok(align),
            Some(align) => Err(MemoryError::invalid_criterion(format!(
                "alignment {} must be a power of two dividing the value width {}",
                align,
                self.width()
            ))),
        }
    }

    /// Re-tests one candidate window
    pub fn test(&self, current: &[u8], previous: Option<&[u8]>) -> bool {
        match self {
            Matcher::Value(matcher) => matcher.matches(current, previous),
            Matcher::Pattern { pattern, max_distance: None } => pattern.matches_at(current),
            Matcher::Pattern { pattern, max_distance: Some(limit) } => {
                pattern.distance_at(current, *limit).is_some()
            }
        }
    }
}

/// Everything a round needs besides its matcher
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub memory: &'a dyn ProcessMemory,
    pub pool: &'a WorkerPool,
    pub settings: &'a ScanSettings,
}

/// One AOB hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AobMatch {
    pub address: Address,
    /// Differing known bytes, for fuzzy scans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
}

/// Owned bytes matched per pass over a buffer; bounds the offset list
const MATCH_WINDOW: usize = 64 * 1024;

/// Chunks dispatched per worker thread before their hits are merged
const WAVE_PER_THREAD: usize = 4;

/// Hits of one chunk job, or of a whole round once merged.
///
/// At most `limit` hits are stored. Later ones only bump `overflow`.
struct ChunkHits {
    limit: usize,
    width: usize,
    keep_values: bool,
    addresses: Vec<Address>,
    /// Parallel to `addresses` for fuzzy scans, empty otherwise
    distances: Vec<u32>,
    values: Vec<u8>,
    overflow: usize,
    bytes_scanned: u64,
    unreadable_bytes: u64,
}

impl ChunkHits {
    fn new(limit: usize, width: usize, keep_values: bool) -> Self {
        ChunkHits {
            limit,
            width,
            keep_values,
            addresses: Vec::new(),
            distances: Vec::new(),
            values: Vec::new(),
            overflow: 0,
            bytes_scanned: 0,
            unreadable_bytes: 0,
        }
    }

    fn push(&mut self, address: Address, distance: Option<u32>, value: &[u8]) {
        if self.addresses.len() >= self.limit {
            self.overflow += 1;
            return;
        }
        self.addresses.push(address);
        if let Some(distance) = distance {
            self.distances.push(distance);
        }
        if self.keep_values {
            self.values.extend_from_slice(value);
        }
    }

    /// Appends the hits of a chunk above every chunk absorbed so far
    fn absorb(&mut self, other: ChunkHits) {
        let room = self.limit.saturating_sub(self.addresses.len());
        let take = other.addresses.len().min(room);
        self.overflow += other.overflow + other.addresses.len() - take;
        self.addresses.extend_from_slice(&other.addresses[..take]);
        self.distances.extend(other.distances.iter().take(take));
        if self.keep_values {
            self.values.extend_from_slice(&other.values[..take * self.width]);
        }
        self.bytes_scanned += other.bytes_scanned;
        self.unreadable_bytes += other.unreadable_bytes;
    }
}

#[derive(Default)]
struct BatchSurvivors {
    addresses: Vec<Address>,
    values: Vec<u8>,
    dropped: usize,
}

/// Scans every selected region and returns the matches as a fresh set.
///
/// Past the candidate cap only the lowest addresses are kept; the rest are
/// counted in [`RoundDiagnostics::truncated`].
pub fn first_scan(
    ctx: ScanContext<'_>,
    matcher: &Matcher,
    value_type: ValueType,
    options: &ScanOptions,
    control: &RoundControl,
) -> MemoryResult<(CandidateSet, RoundDiagnostics)> {
    let width = matcher.width();
    let align = matcher.alignment(options.alignment)?;
    let (hits, diagnostics) = run_chunks(ctx, matcher, &options.filter, align, true, control)?;

    Ok((
        CandidateSet::from_parts(value_type, width, hits.addresses, hits.values),
        diagnostics,
    ))
}

/// One-shot pattern scan that creates no session
pub fn aob_scan(
    ctx: ScanContext<'_>,
    pattern: Pattern,
    max_distance: Option<u32>,
    module: Option<&str>,
    control: &RoundControl,
) -> MemoryResult<(Vec<AobMatch>, RoundDiagnostics)> {
    let mut filter = RegionFilter::new();
    if let Some(name) = module {
        ctx.memory.resolve_module_base(name)?;
        filter = filter.in_module(name);
    }

    let matcher = Matcher::Pattern { pattern, max_distance };
    let (hits, diagnostics) = run_chunks(ctx, &matcher, &filter, 1, false, control)?;

    let matches = hits
        .addresses
        .iter()
        .enumerate()
        .map(|(i, &address)| AobMatch {
            address,
            distance: hits.distances.get(i).copied(),
        })
        .collect();
    Ok((matches, diagnostics))
}

/// Re-reads every candidate and keeps those `matcher` still accepts.
///
/// The result is always a subset of `candidates`. Candidates that cannot be
/// read, or whose batch job failed, are dropped and counted.
pub fn refine(
    ctx: ScanContext<'_>,
    matcher: &Matcher,
    candidates: &CandidateSet,
    control: &RoundControl,
) -> MemoryResult<(CandidateSet, RoundDiagnostics)> {
    let width = candidates.width();
    let batches = ctx.settings.scheduler().batch_addresses(candidates.addresses(), width);

    let outcome = ctx.pool.run(&batches, control, |batch| {
        refine_batch(ctx.memory, matcher, candidates, batch)
    })?;

    let mut diagnostics = RoundDiagnostics {
        chunks: batches.len(),
        failed_chunks: outcome.failed,
        ..RoundDiagnostics::default()
    };

    let mut addresses = Vec::new();
    let mut values = Vec::new();
    for (batch, result) in batches.iter().zip(outcome.results) {
        match result {
            Some(survivors) => {
                diagnostics.dropped_unreadable += survivors.dropped;
                diagnostics.bytes_scanned += (batch.count * width) as u64;
                addresses.extend(survivors.addresses);
                values.extend(survivors.values);
            }
            None => diagnostics.dropped_unreadable += batch.count,
        }
    }

    if diagnostics.dropped_unreadable > 0 {
        debug!(dropped = diagnostics.dropped_unreadable, "Unreadable candidates dropped");
    }

    Ok((
        CandidateSet::from_parts(candidates.value_type(), width, addresses, values),
        diagnostics,
    ))
}

/// Scans the selected regions in address order, one wave of chunks at a time.
///
/// Each job stores at most the room left under the cap when its wave starts,
/// so a round holds at most one wave of surplus hits. Once the cap is full,
/// later jobs only count what they find.
fn run_chunks(
    ctx: ScanContext<'_>,
    matcher: &Matcher,
    filter: &RegionFilter,
    align: usize,
    keep_values: bool,
    control: &RoundControl,
) -> MemoryResult<(ChunkHits, RoundDiagnostics)> {
    let (mut regions, partial) = select_regions(ctx.memory, filter);
    regions.sort_by_key(|region| region.base);
    let width = matcher.width();
    let chunks = ctx.settings.scheduler().partition(&regions, width);
    trace!(regions = regions.len(), chunks = chunks.len(), "Dispatching chunks");

    let cap = ctx.settings.max_candidates;
    let wave_len = ctx.pool.threads().max(1) * WAVE_PER_THREAD;
    let mut merged = ChunkHits::new(cap, width, keep_values);
    let mut failed = 0;

    for wave in chunks.chunks(wave_len) {
        let limit = cap.saturating_sub(merged.addresses.len());
        let outcome = ctx.pool.run(wave, control, |chunk| {
            scan_chunk(ctx, matcher, chunk, align, limit, keep_values, control)
        })?;
        failed += outcome.failed;
        for hits in outcome.completed() {
            merged.absorb(hits);
        }
    }

    if merged.overflow > 0 {
        warn!(
            cap,
            discarded = merged.overflow,
            "Candidate cap reached, keeping the lowest addresses"
        );
    }

    let diagnostics = RoundDiagnostics {
        regions: regions.len(),
        chunks: chunks.len(),
        failed_chunks: failed,
        bytes_scanned: merged.bytes_scanned,
        unreadable_bytes: merged.unreadable_bytes,
        truncated: merged.overflow,
        partial_enumeration: partial.map(|warning| warning.to_string()),
        ..RoundDiagnostics::default()
    };
    Ok((merged, diagnostics))
}

fn scan_chunk(
    ctx: ScanContext<'_>,
    matcher: &Matcher,
    chunk: &Chunk,
    align: usize,
    limit: usize,
    keep_values: bool,
    control: &RoundControl,
) -> ChunkHits {
    let mut buf = vec![0u8; chunk.read_len()];
    let mut out = ChunkHits::new(limit, matcher.width(), keep_values);

    match ctx.memory.read_into(chunk.base, &mut buf) {
        Ok(()) => {
            out.bytes_scanned = chunk.owned as u64;
            let span = Span { buf: &buf, base: chunk.base, owned: chunk.owned };
            match_span(ctx.settings, matcher, span, align, control, &mut out);
        }
        Err(e) => {
            debug!(
                base = %chunk.base,
                len = buf.len(),
                error = %e,
                "Chunk read failed, retrying by page"
            );
            scan_by_page(ctx, matcher, chunk, &mut buf, align, control, &mut out);
        }
    }

    out
}

/// Re-reads a failed chunk one page at a time and matches each readable run
fn scan_by_page(
    ctx: ScanContext<'_>,
    matcher: &Matcher,
    chunk: &Chunk,
    buf: &mut [u8],
    align: usize,
    control: &RoundControl,
    out: &mut ChunkHits,
) {
    let runs = ctx.memory.read_pages(chunk.base, buf, ctx.settings.page_size);

    let covered: usize = runs
        .iter()
        .map(|&(start, end)| end.min(chunk.owned).saturating_sub(start))
        .sum();
    out.bytes_scanned = covered as u64;
    out.unreadable_bytes = (chunk.owned - covered) as u64;

    for (start, end) in runs {
        if start >= chunk.owned {
            break;
        }
        let span = Span {
            buf: &buf[start..end],
            base: Address::new(chunk.base.as_usize() + start),
            owned: chunk.owned.min(end) - start,
        };
        match_span(ctx.settings, matcher, span, align, control, out);
    }
}

/// Bytes read from `base`; matches may start in the first `owned` of them
#[derive(Clone, Copy)]
struct Span<'a> {
    buf: &'a [u8],
    base: Address,
    owned: usize,
}

/// Matches `span` one window at a time so the offset lists stay small
fn match_span(
    settings: &ScanSettings,
    matcher: &Matcher,
    span: Span<'_>,
    align: usize,
    control: &RoundControl,
    out: &mut ChunkHits,
) {
    let width = matcher.width();
    let start = span.base.as_usize();
    let mut offsets = Vec::new();
    let mut fuzzy: Vec<FuzzyHit> = Vec::new();
    let mut window = 0;

    while window < span.owned {
        if window > 0 && control.is_stopped() {
            return;
        }
        let buf = &span.buf[window..];
        let owned = (span.owned - window).min(MATCH_WINDOW);
        offsets.clear();
        fuzzy.clear();

        match matcher {
            Matcher::Value(value) => {
                let base = Address::new(start + window);
                value.scan(buf, base, owned, align, settings.use_simd, &mut offsets)
            }
            Matcher::Pattern { pattern, max_distance: None } => {
                if settings.use_simd {
                    pattern.find_simd(buf, owned, control, &mut offsets);
                } else {
                    pattern.find_scalar(buf, owned, control, &mut offsets);
                }
            }
            Matcher::Pattern { pattern, max_distance: Some(limit) } => {
                pattern.find_fuzzy(buf, owned, *limit, control, &mut fuzzy);
            }
        }

        let hits = offsets
            .iter()
            .map(|&offset| (offset, None))
            .chain(fuzzy.iter().map(|hit| (hit.offset, Some(hit.distance))));
        for (offset, distance) in hits {
            let at = window + offset;
            if (start + at) % align != 0 {
                continue;
            }
            out.push(Address::new(start + at), distance, &span.buf[at..at + width]);
        }

        window += owned;
    }
}

fn refine_batch(
    memory: &dyn ProcessMemory,
    matcher: &Matcher,
    candidates: &CandidateSet,
    batch: &ReadBatch,
) -> BatchSurvivors {
    let width = candidates.width();
    let range = batch.first..batch.first + batch.count;
    let addresses = &candidates.addresses()[range.clone()];
    let mut survivors = BatchSurvivors::default();

    let mut keep = |index: usize, address: Address, current: &[u8]| {
        if matcher.test(current, Some(candidates.value_bytes(index))) {
            survivors.addresses.push(address);
            survivors.values.extend_from_slice(current);
        }
    };

    match memory.read_bytes(batch.base, batch.len) {
        Ok(buf) => {
            for (index, address) in range.zip(addresses) {
                let offset = address.as_usize() - batch.base.as_usize();
                keep(index, *address, &buf[offset..offset + width]);
            }
        }
        Err(_) => {
            let mut current = vec![0u8; width];
            let mut dropped = 0;
            for (index, address) in range.zip(addresses) {
                match memory.read_into(*address, &mut current) {
                    Ok(()) => keep(index, *address, &current),
                    Err(_) => dropped += 1,
                }
            }
            survivors.dropped = dropped;
        }
    }

    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MemoryRegion, MemoryValue, Protection};
    use crate::memory::SnapshotMemory;
    use pretty_assertions::assert_eq;

    fn settings() -> ScanSettings {
        ScanSettings {
            chunk_size: 0x1000,
            ..ScanSettings::default()
        }
    }

    fn image() -> SnapshotMemory {
        let mut bytes = vec![0u8; 0x3000];
        for offset in [0x10usize, 0xFFE, 0x1FFC, 0x2800] {
            bytes[offset..offset + 4].copy_from_slice(&1234i32.to_le_bytes());
        }
        let mut mem = SnapshotMemory::new();
        mem.add_region(
            MemoryRegion::new(Address::new(0x10000), 0x3000, Protection::read_write()),
            bytes,
        );
        mem
    }

    fn exact_i32(value: i32) -> Matcher {
        let criterion = Criterion::value(MemoryValue::I32(value));
        Matcher::compile(ValueType::I32, ScanType::Exact, &criterion, None).unwrap()
    }

    fn scan(
        ctx: ScanContext<'_>,
        matcher: &Matcher,
        options: &ScanOptions,
    ) -> (CandidateSet, RoundDiagnostics) {
        let value_type = match matcher {
            Matcher::Value(value) => value.value_type(),
            Matcher::Pattern { .. } => ValueType::Bytes,
        };
        first_scan(ctx, matcher, value_type, options, &RoundControl::unbounded()).unwrap()
    }

    fn found(set: &CandidateSet) -> Vec<usize> {
        set.addresses().iter().map(|a| a.as_usize()).collect()
    }

    #[test]
    fn test_first_scan_respects_alignment() {
        let mem = image();
        let pool = WorkerPool::new(2).unwrap();
        let settings = settings();
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };

        let (set, diag) = scan(ctx, &exact_i32(1234), &ScanOptions::default());
        assert_eq!(found(&set), vec![0x10010, 0x11FFC, 0x12800]);
        assert_eq!(diag.chunks, 3);
        assert_eq!(diag.bytes_scanned, 0x3000);

        let options = ScanOptions {
            alignment: Some(2),
            ..ScanOptions::default()
        };
        let (set, _) = scan(ctx, &exact_i32(1234), &options);
        assert_eq!(set.len(), 4);
        assert!(set.contains(Address::new(0x10FFE)));
    }

    #[test]
    fn test_partial_enumeration_is_a_warning() {
        let mut mem = image();
        mem.set_partial("access denied at 0x20000");
        let pool = WorkerPool::new(1).unwrap();
        let settings = settings();
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };

        let (set, diag) = scan(ctx, &exact_i32(1234), &ScanOptions::default());
        assert_eq!(set.len(), 3);
        assert_eq!(
            diag.partial_enumeration.as_deref(),
            Some("Region enumeration incomplete: access denied at 0x20000")
        );
    }

    #[test]
    fn test_bad_alignment_rejected() {
        let matcher = exact_i32(1);
        assert!(matches!(matcher.alignment(Some(3)), Err(MemoryError::InvalidCriterion(_))));
        assert!(matches!(matcher.alignment(Some(8)), Err(MemoryError::InvalidCriterion(_))));
        assert_eq!(matcher.alignment(Some(1)).unwrap(), 1);
    }

    #[test]
    fn test_unreadable_page_falls_back() {
        let mut mem = image();
        mem.mark_unreadable(Address::new(0x11000), 0x1000);
        let pool = WorkerPool::new(2).unwrap();
        let settings = ScanSettings {
            chunk_size: 0x2000,
            ..ScanSettings::default()
        };
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };

        let (set, diag) = scan(ctx, &exact_i32(1234), &ScanOptions::default());
        assert_eq!(found(&set), vec![0x10010, 0x12800]);
        assert_eq!(diag.unreadable_bytes, 0x1000);
    }

    #[test]
    fn test_candidate_cap() {
        let mem = image();
        let pool = WorkerPool::new(1).unwrap();
        let settings = ScanSettings {
            max_candidates: 2,
            ..settings()
        };
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };

        let (set, diag) = scan(ctx, &exact_i32(1234), &ScanOptions::default());
        assert_eq!(found(&set), vec![0x10010, 0x11FFC]);
        assert_eq!(diag.truncated, 1);
    }

    #[test]
    fn test_cap_keeps_lowest_addresses_across_waves() {
        let mut mem = SnapshotMemory::new();
        mem.add_region(
            MemoryRegion::new(Address::new(0x40000), 0x10000, Protection::read_write()),
            vec![7; 0x10000],
        );
        // One thread, so 16 chunks run as four waves of four
        let pool = WorkerPool::new(1).unwrap();
        let settings = ScanSettings {
            max_candidates: 0x1800,
            ..settings()
        };
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };
        let criterion = Criterion::value(MemoryValue::U8(7));
        let matcher = Matcher::compile(ValueType::U8, ScanType::Exact, &criterion, None).unwrap();

        let (set, diag) = scan(ctx, &matcher, &ScanOptions::default());
        assert_eq!(set.len(), 0x1800);
        assert_eq!(set.addresses()[0], Address::new(0x40000));
        assert_eq!(set.addresses()[0x17FF], Address::new(0x417FF));
        assert_eq!(diag.truncated, 0x10000 - 0x1800);
        assert_eq!(diag.bytes_scanned, 0x10000);
    }

    #[test]
    fn test_value_across_match_window() {
        let mut bytes = vec![0u8; 2 * MATCH_WINDOW];
        let at = MATCH_WINDOW - 2;
        bytes[at..at + 4].copy_from_slice(&1234i32.to_le_bytes());
        let mut mem = SnapshotMemory::new();
        mem.add_region(
            MemoryRegion::new(Address::new(0x100000), bytes.len(), Protection::read_write()),
            bytes,
        );
        let pool = WorkerPool::new(1).unwrap();
        let settings = ScanSettings {
            chunk_size: 4 * MATCH_WINDOW,
            ..ScanSettings::default()
        };
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };
        let options = ScanOptions {
            alignment: Some(1),
            ..ScanOptions::default()
        };

        let (set, _) = scan(ctx, &exact_i32(1234), &options);
        assert_eq!(found(&set), vec![0x100000 + at]);
    }

    #[test]
    fn test_refine_drops_changed_and_unreadable() {
        let mem = image();
        let pool = WorkerPool::new(2).unwrap();
        let settings = settings();
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };
        let (set, _) = scan(ctx, &exact_i32(1234), &ScanOptions::default());

        mem.poke(Address::new(0x10010), &MemoryValue::I32(99)).unwrap();
        let unchanged =
            Matcher::compile(ValueType::I32, ScanType::Unchanged, &Criterion::None, Some(4))
                .unwrap();
        let (next, diag) = refine(ctx, &unchanged, &set, &RoundControl::unbounded()).unwrap();

        assert_eq!(next.addresses(), &[Address::new(0x11FFC), Address::new(0x12800)]);
        assert_eq!(diag.dropped_unreadable, 0);
    }

    #[test]
    fn test_aob_scan_in_module() {
        let mut mem = image();
        let mut code = vec![0x90u8; 0x100];
        code[0x20..0x24].copy_from_slice(&[0x48, 0x89, 0x5C, 0x24]);
        code[0x60..0x64].copy_from_slice(&[0x48, 0x89, 0x5C, 0x25]);
        mem.add_region(
            MemoryRegion::new(Address::new(0x400000), 0x100, Protection::read_execute())
                .with_module("game.exe"),
            code,
        );
        let pool = WorkerPool::new(2).unwrap();
        let settings = settings();
        let ctx = ScanContext {
            memory: &mem,
            pool: &pool,
            settings: &settings,
        };
        let control = RoundControl::unbounded();

        let pattern = Pattern::parse("48 89 ?? 24").unwrap();
        let (hits, _) = aob_scan(ctx, pattern.clone(), None, Some("GAME.EXE"), &control).unwrap();
        assert_eq!(
            hits,
            vec![AobMatch {
                address: Address::new(0x400020),
                distance: None
            }]
        );

        let (fuzzy, _) =
            aob_scan(ctx, pattern.clone(), Some(1), Some("game.exe"), &control).unwrap();
        assert_eq!(
            fuzzy,
            vec![
                AobMatch {
                    address: Address::new(0x400020),
                    distance: Some(0)
                },
                AobMatch {
                    address: Address::new(0x400060),
                    distance: Some(1)
                },
            ]
        );

        let missing = aob_scan(ctx, pattern, None, Some("other.dll"), &control);
        assert!(matches!(missing, Err(MemoryError::ModuleNotFound(_))));
    }
}
