//! Heap use of a first scan under a small candidate cap
//!
//! Kept in its own binary: the counting allocator sees every thread.

use memory_scan_core::core::types::{
    Address, Criterion, MemoryRegion, Protection, ScanType, ValueType,
};
use memory_scan_core::memory::SnapshotMemory;
use memory_scan_core::scan::{
    RoundControl, ScanContext, ScanOptions, ScanSession, ScanSettings, WorkerPool,
};
use pretty_assertions::assert_eq;
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Counting;

static LIVE: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            let live = LIVE.fetch_add(layout.size(), Ordering::SeqCst) + layout.size();
            PEAK.fetch_max(live, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        LIVE.fetch_sub(layout.size(), Ordering::SeqCst);
    }
}

#[global_allocator]
static ALLOCATOR: Counting = Counting;

const IMAGE: usize = 16 * 1024 * 1024;
const CAP: usize = 1000;

#[test]
fn test_unknown_scan_memory_bounded_by_cap() {
    let mut mem = SnapshotMemory::new();
    mem.add_region(
        MemoryRegion::new(Address::new(0x10000000), IMAGE, Protection::read_write()),
        vec![0u8; IMAGE],
    );
    let pool = WorkerPool::new(2).unwrap();
    let settings = ScanSettings {
        max_candidates: CAP,
        ..ScanSettings::default()
    };
    let ctx = ScanContext {
        memory: &mem,
        pool: &pool,
        settings: &settings,
    };
    let mut session = ScanSession::new(1);

    let baseline = LIVE.load(Ordering::SeqCst);
    PEAK.store(baseline, Ordering::SeqCst);

    // Every byte matches an unknown u8 scan
    let record = session
        .start_scan(
            ctx,
            ValueType::U8,
            ScanType::Unknown,
            Criterion::None,
            &ScanOptions::default(),
            &RoundControl::unbounded(),
        )
        .unwrap();
    let peak = PEAK.load(Ordering::SeqCst) - baseline;

    assert_eq!(record.matches, CAP);
    assert_eq!(record.diagnostics.truncated, IMAGE - CAP);
    let addresses = session.candidates().unwrap().addresses();
    assert_eq!(addresses.last(), Some(&Address::new(0x10000000 + CAP - 1)));

    // Two 1 MiB chunk buffers plus small offset windows, never one entry per byte
    assert!(peak < 8 * 1024 * 1024, "first scan peaked at {} bytes", peak);
}
