//! Lane-batched fast paths
//!
//! Equality is a plain byte compare: the target is repeated across a 16-byte
//! block and each block is matched with one SSE2 compare plus a movemask on
//! x86_64 (a byte loop elsewhere). `Equal` value scans and the AOB anchor
//! search both go through that kernel. The ordering predicates load `LANES`
//! values into an array and fold them into a bitmask with branch-free
//! comparisons, leaving vectorisation of that loop to the compiler.
//!
//! Every function here must report exactly what its scalar counterpart
//! reports; the proptests in `tests/simd_equivalence_test.rs` hold them to it.

use super::value::{Predicate, Scalar};

/// Values per batch
pub const LANES: usize = 16;

const ALL_LANES: u32 = u32::MAX >> (32 - LANES);

/// Folds `pred` over one batch. Bit `i` is set when lane `i` matches.
///
/// Previous-value predicates have no meaning without a previous value and
/// produce an empty mask, as the scalar path does.
#[inline(always)]
fn lane_mask<T: Scalar>(pred: &Predicate<T>, lanes: &[T; LANES]) -> u32 {
    let mut mask = 0u32;

    macro_rules! fold {
        (|$v:ident| $test:expr) => {
            for (i, &$v) in lanes.iter().enumerate() {
                mask |= ($test as u32) << i;
            }
        };
    }

    match *pred {
        Predicate::Any => return ALL_LANES,
        Predicate::Equal(target) => fold!(|v| v.same(target)),
        Predicate::Between(low, high) => fold!(|v| (v >= low) & (v <= high)),
        Predicate::Above(target) => fold!(|v| v > target),
        Predicate::Below(target) => fold!(|v| v < target),
        _ => {}
    }
    mask
}

/// Scans naturally aligned values of `T` starting at offset `start`.
///
/// Reports offsets in `[start, owned)` whose value fits entirely in `buf`,
/// ascending, exactly like `ValueMatcher::scan_scalar` with `align == WIDTH`.
pub fn scan_lanes<T: Scalar>(
    pred: &Predicate<T>,
    buf: &[u8],
    start: usize,
    owned: usize,
    hits: &mut Vec<usize>,
) {
    let width = T::WIDTH;
    if start >= owned || start + width > buf.len() {
        return;
    }

    // Slots whose start is owned and whose value is fully inside the buffer
    let by_owned = (owned - start + width - 1) / width;
    let by_buffer = (buf.len() - start) / width;
    let slots = by_owned.min(by_buffer);

    let data = &buf[start..start + slots * width];
    if let Predicate::Equal(target) = *pred {
        let image = target.le_bytes();
        return scan_equal(&image[..width], data, start, hits);
    }

    let mut batches = data.chunks_exact(width * LANES);
    let mut offset = start;

    for batch in &mut batches {
        let mut lanes = [T::load(batch); LANES];
        for (lane, raw) in lanes.iter_mut().zip(batch.chunks_exact(width)) {
            *lane = T::load(raw);
        }

        let mut mask = lane_mask(pred, &lanes);
        while mask != 0 {
            let bit = mask.trailing_zeros() as usize;
            hits.push(offset + bit * width);
            mask &= mask - 1;
        }
        offset += width * LANES;
    }

    for raw in batches.remainder().chunks_exact(width) {
        if pred.test(T::load(raw), None) {
            hits.push(offset);
        }
        offset += width;
    }
}

/// Bytes per compare block
const BLOCK: usize = 16;

#[cfg(target_arch = "x86_64")]
mod kernel {
    use super::BLOCK;
    use std::arch::x86_64::*;

    /// Bit `i` is set when `block[i] == pattern[i]`
    #[inline(always)]
    pub fn eq_mask(block: &[u8], pattern: &[u8; BLOCK]) -> u32 {
        assert!(block.len() >= BLOCK);
        // SAFETY: SSE2 is baseline on x86_64 and both loads are unaligned
        // 16-byte reads from slices at least that long.
        unsafe {
            let lhs = _mm_loadu_si128(block.as_ptr() as *const __m128i);
            let rhs = _mm_loadu_si128(pattern.as_ptr() as *const __m128i);
            _mm_movemask_epi8(_mm_cmpeq_epi8(lhs, rhs)) as u32
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod kernel {
    use super::BLOCK;

    /// Bit `i` is set when `block[i] == pattern[i]`
    #[inline(always)]
    pub fn eq_mask(block: &[u8], pattern: &[u8; BLOCK]) -> u32 {
        let mut mask = 0u32;
        for (i, (&b, &p)) in block[..BLOCK].iter().zip(pattern).enumerate() {
            mask |= ((b == p) as u32) << i;
        }
        mask
    }
}

/// First-byte positions of the slots in a block, per slot width
fn slot_starts(width: usize) -> u32 {
    match width {
        1 => 0xFFFF,
        2 => 0x5555,
        4 => 0x1111,
        _ => 0x0101,
    }
}

/// Reports the `width`-byte slots of `data` equal to `target`.
///
/// `data` starts on a slot boundary at absolute offset `offset` and holds
/// whole slots; `width` divides the block size.
fn scan_equal(target: &[u8], data: &[u8], mut offset: usize, hits: &mut Vec<usize>) {
    let width = target.len();
    let mut pattern = [0u8; BLOCK];
    for (i, byte) in pattern.iter_mut().enumerate() {
        *byte = target[i % width];
    }

    let starts = slot_starts(width);
    let mut blocks = data.chunks_exact(BLOCK);
    for block in &mut blocks {
        let bytes = kernel::eq_mask(block, &pattern);
        // A slot matches when all of its bytes do
        let mut whole = bytes;
        for shift in 1..width {
            whole &= bytes >> shift;
        }
        let mut mask = whole & starts;
        while mask != 0 {
            let bit = mask.trailing_zeros() as usize;
            hits.push(offset + bit);
            mask &= mask - 1;
        }
        offset += BLOCK;
    }

    for raw in blocks.remainder().chunks_exact(width) {
        if raw == target {
            hits.push(offset);
        }
        offset += width;
    }
}

/// Finds every position in `haystack[..limit]` holding `needle`, 16 bytes at
/// a time. Positions are relative to `haystack` and ascending.
pub fn find_byte(haystack: &[u8], limit: usize, needle: u8, hits: &mut Vec<usize>) {
    let limit = limit.min(haystack.len());
    let data = &haystack[..limit];
    let pattern = [needle; BLOCK];
    let mut blocks = data.chunks_exact(BLOCK);
    let mut offset = 0;

    for block in &mut blocks {
        let mut mask = kernel::eq_mask(block, &pattern);
        while mask != 0 {
            let bit = mask.trailing_zeros() as usize;
            hits.push(offset + bit);
            mask &= mask - 1;
        }
        offset += BLOCK;
    }

    for (i, &b) in blocks.remainder().iter().enumerate() {
        if b == needle {
            hits.push(offset + i);
        }
    }
}

/// Masked window compare: `(window & mask) == needle` over equal-length
/// slices, eight bytes per step.
#[inline]
pub fn masked_eq(window: &[u8], needle: &[u8], mask: &[u8]) -> bool {
    let len = needle.len();
    if window.len() < len || mask.len() != len {
        return false;
    }

    let mut i = 0;
    while i + 8 <= len {
        let w = u64::from_le_bytes(word(&window[i..i + 8]));
        let n = u64::from_le_bytes(word(&needle[i..i + 8]));
        let m = u64::from_le_bytes(word(&mask[i..i + 8]));
        if w & m != n {
            return false;
        }
        i += 8;
    }

    while i < len {
        if window[i] & mask[i] != needle[i] {
            return false;
        }
        i += 1;
    }
    true
}

#[inline(always)]
fn word(bytes: &[u8]) -> [u8; 8] {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_mask_equal() {
        let mut lanes = [0u32; LANES];
        lanes[3] = 9;
        lanes[15] = 9;
        assert_eq!(lane_mask(&Predicate::Equal(9u32), &lanes), (1 << 3) | (1 << 15));
        assert_eq!(lane_mask(&Predicate::Any, &lanes), ALL_LANES);
        assert_eq!(lane_mask(&Predicate::<u32>::Changed, &lanes), 0);
    }

    #[test]
    fn test_scan_lanes_with_tail_and_overlap() {
        // 40 u16 slots: two full batches plus a tail of 8
        let mut buf = vec![0u8; 80];
        for slot in [0usize, 17, 33, 39] {
            buf[slot * 2..slot * 2 + 2].copy_from_slice(&0xBEEFu16.to_le_bytes());
        }

        let mut hits = Vec::new();
        scan_lanes(&Predicate::Equal(0xBEEFu16), &buf, 0, 80, &mut hits);
        assert_eq!(hits, vec![0, 34, 66, 78]);

        let mut owned = Vec::new();
        scan_lanes(&Predicate::Equal(0xBEEFu16), &buf, 0, 70, &mut owned);
        assert_eq!(owned, vec![0, 34, 66]);
    }

    #[test]
    fn test_eq_mask() {
        let mut block = [0u8; BLOCK];
        block[0] = 0xAA;
        block[9] = 0xAA;
        block[15] = 0xAA;
        let marked = (1 << 0) | (1 << 9) | (1 << 15);
        assert_eq!(kernel::eq_mask(&block, &[0xAA; BLOCK]), marked);
        assert_eq!(kernel::eq_mask(&block, &[0x00; BLOCK]), 0xFFFF & !marked);
    }

    #[test]
    fn test_equal_slots_need_every_byte() {
        // u32 slots: 0x11223344 whole at slot 1 and 6, half of it at slot 3
        let mut buf = vec![0u8; 36];
        for slot in [1usize, 6] {
            buf[slot * 4..slot * 4 + 4].copy_from_slice(&0x1122_3344u32.to_le_bytes());
        }
        buf[12..14].copy_from_slice(&[0x44, 0x33]);
        buf[32..36].copy_from_slice(&0x1122_3344u32.to_le_bytes());

        let mut hits = Vec::new();
        scan_lanes(&Predicate::Equal(0x1122_3344u32), &buf, 0, 36, &mut hits);
        assert_eq!(hits, vec![4, 24, 32]);

        let mut scalar = Vec::new();
        for offset in (0..36).step_by(4) {
            if u32::load(&buf[offset..]) == 0x1122_3344 {
                scalar.push(offset);
            }
        }
        assert_eq!(hits, scalar);
    }

    #[test]
    fn test_equal_slots_every_width() {
        let buf: Vec<u8> = (0..96u32).map(|i| (i * 7 % 5) as u8).collect();
        let mut hits = Vec::new();

        scan_lanes(&Predicate::Equal(3u8), &buf, 0, 96, &mut hits);
        let expected: Vec<usize> = (0..96).filter(|&i| buf[i] == 3).collect();
        assert_eq!(hits, expected);

        hits.clear();
        let target = u16::load(&buf[10..]);
        scan_lanes(&Predicate::Equal(target), &buf, 0, 96, &mut hits);
        let expected: Vec<usize> =
            (0..96).step_by(2).filter(|&i| u16::load(&buf[i..]) == target).collect();
        assert_eq!(hits, expected);

        hits.clear();
        let target = i64::load(&buf[40..]);
        scan_lanes(&Predicate::Equal(target), &buf, 0, 96, &mut hits);
        let expected: Vec<usize> =
            (0..96).step_by(8).filter(|&i| i64::load(&buf[i..]) == target).collect();
        assert_eq!(hits, expected);
        assert!(hits.contains(&40));
    }

    #[test]
    fn test_find_byte() {
        let mut hay = vec![0u8; 37];
        hay[0] = 0x48;
        hay[16] = 0x48;
        hay[36] = 0x48;
        let mut hits = Vec::new();
        find_byte(&hay, 37, 0x48, &mut hits);
        assert_eq!(hits, vec![0, 16, 36]);

        hits.clear();
        find_byte(&hay, 36, 0x48, &mut hits);
        assert_eq!(hits, vec![0, 16]);
    }

    #[test]
    fn test_masked_eq() {
        let window = [0x48, 0x89, 0x5C, 0x24, 0x10, 0x20, 0x30, 0x40, 0x50];
        let needle = [0x48, 0x89, 0x00, 0x24, 0x10, 0x20, 0x30, 0x40, 0x50];
        let mask = [0xFF, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(masked_eq(&window, &needle, &mask));

        let mut other = window;
        other[8] = 0x51;
        assert!(!masked_eq(&other, &needle, &mask));
    }
}
