//! Array-of-bytes patterns with wildcards
//!
//! Three search strategies share one [`Pattern`]:
//! - [`Pattern::find_scalar`]: Boyer-Moore-Horspool adapted for wildcards
//! - [`Pattern::find_simd`]: 16-byte anchor search plus masked word compares
//! - [`Pattern::find_fuzzy`]: Hamming distance over the known bytes
//!
//! The first two must report identical offsets.

use super::control::RoundControl;
use super::simd;
use crate::core::types::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Start positions scanned between cancellation checks
const CHECK_INTERVAL: usize = 64 * 1024;

/// One pattern position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternByte {
    pub value: u8,
    pub wildcard: bool,
}

/// A parsed pattern. Never empty and never all wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    bytes: Vec<PatternByte>,
    /// Known bytes in place, zero under wildcards
    needle: Vec<u8>,
    /// 0xFF for known positions, 0x00 for wildcards
    mask: Vec<u8>,
    /// Length up to and including the last known byte
    search_len: usize,
    /// Horspool shift for the byte under the window's last searched position
    skip: Box<[usize; 256]>,
    /// Index of the first known byte
    anchor: usize,
}

/// A fuzzy match and how many known bytes differed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyHit {
    pub offset: usize,
    pub distance: u32,
}

impl Pattern {
    /// Parses `"48 8B ?? 24"`. Tokens are two hex digits or a wildcard (`??`
    /// or `?`), separated by whitespace.
    pub fn parse(text: &str) -> MemoryResult<Self> {
        let mut bytes = Vec::new();

        for token in text.split_whitespace() {
            if token == "??" || token == "?" {
                bytes.push(None);
                continue;
            }
            if token.len() != 2 {
                return Err(MemoryError::InvalidPattern(format!(
                    "token '{}' must be two hex digits",
                    token
                )));
            }
            let mut byte = [0u8; 1];
            hex::decode_to_slice(token, &mut byte)
                .map_err(|_| MemoryError::InvalidPattern(format!("'{}' is not hex", token)))?;
            bytes.push(Some(byte[0]));
        }

        Pattern::from_bytes(&bytes)
    }

    /// Builds a pattern from positions where `None` is a wildcard
    pub fn from_bytes(bytes: &[Option<u8>]) -> MemoryResult<Self> {
        if bytes.is_empty() {
            return Err(MemoryError::InvalidPattern("empty pattern".to_string()));
        }
        let Some(last_known) = bytes.iter().rposition(Option::is_some) else {
            return Err(MemoryError::InvalidPattern(
                "pattern has no concrete bytes".to_string(),
            ));
        };
        let anchor = bytes.iter().position(Option::is_some).unwrap_or(last_known);

        let needle: Vec<u8> = bytes.iter().map(|b| b.unwrap_or(0)).collect();
        let mask: Vec<u8> = bytes.iter().map(|b| if b.is_some() { 0xFF } else { 0x00 }).collect();
        let search_len = last_known + 1;

        Ok(Pattern {
            bytes: bytes
                .iter()
                .map(|b| PatternByte {
                    value: b.unwrap_or(0),
                    wildcard: b.is_none(),
                })
                .collect(),
            skip: Box::new(build_skip_table(&bytes[..search_len])),
            needle,
            mask,
            search_len,
            anchor,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[PatternByte] {
        &self.bytes
    }

    /// True when `window` starts with a match
    #[inline]
    pub fn matches_at(&self, window: &[u8]) -> bool {
        if window.len() < self.len() {
            return false;
        }
        // Right to left, as Horspool verifies
        (0..self.search_len)
            .rev()
            .all(|i| self.mask[i] == 0 || window[i] == self.needle[i])
    }

    /// Hamming distance over known positions, or `None` once it exceeds `limit`
    #[inline]
    pub fn distance_at(&self, window: &[u8], limit: u32) -> Option<u32> {
        if window.len() < self.len() {
            return None;
        }
        let mut distance = 0u32;
        for i in 0..self.search_len {
            if self.mask[i] != 0 && window[i] != self.needle[i] {
                distance += 1;
                if distance > limit {
                    return None;
                }
            }
        }
        Some(distance)
    }

    /// Number of start positions in `buf` that are owned and leave room for
    /// the whole pattern
    fn start_limit(&self, buf: &[u8], owned: usize) -> usize {
        if buf.len() < self.len() {
            return 0;
        }
        owned.min(buf.len() - self.len() + 1)
    }

    /// Horspool search. Pushes ascending offsets of every match starting in
    /// `[0, owned)`. Returns early, with partial results, once `control` stops.
    pub fn find_scalar(
        &self,
        buf: &[u8],
        owned: usize,
        control: &RoundControl,
        hits: &mut Vec<usize>,
    ) {
        let limit = self.start_limit(buf, owned);
        let last = self.search_len - 1;
        let tail = self.needle[last];
        let mut next_check = CHECK_INTERVAL;
        let mut pos = 0;

        while pos < limit {
            if pos >= next_check {
                if control.is_stopped() {
                    return;
                }
                next_check = pos + CHECK_INTERVAL;
            }

            let c = buf[pos + last];
            if c == tail && self.matches_at(&buf[pos..]) {
                hits.push(pos);
            }
            pos += self.skip[c as usize];
        }
    }

    /// Vectorised search: anchor-byte candidates 16 at a time, then a masked
    /// compare of the whole window eight bytes per step.
    pub fn find_simd(
        &self,
        buf: &[u8],
        owned: usize,
        control: &RoundControl,
        hits: &mut Vec<usize>,
    ) {
        let limit = self.start_limit(buf, owned);
        let anchor_byte = self.needle[self.anchor];
        let len = self.len();
        let mut candidates = Vec::new();
        let mut segment = 0;

        while segment < limit {
            if segment > 0 && control.is_stopped() {
                return;
            }
            let end = (segment + CHECK_INTERVAL).min(limit);

            candidates.clear();
            let window = &buf[segment + self.anchor..];
            simd::find_byte(window, end - segment, anchor_byte, &mut candidates);

            for &rel in &candidates {
                let start = segment + rel;
                if simd::masked_eq(&buf[start..start + len], &self.needle, &self.mask) {
                    hits.push(start);
                }
            }
            segment = end;
        }
    }

    /// Every start in `[0, owned)` whose known bytes differ in at most
    /// `max_distance` places
    pub fn find_fuzzy(
        &self,
        buf: &[u8],
        owned: usize,
        max_distance: u32,
        control: &RoundControl,
        hits: &mut Vec<FuzzyHit>,
    ) {
        let limit = self.start_limit(buf, owned);

        for pos in 0..limit {
            if pos > 0 && pos % CHECK_INTERVAL == 0 && control.is_stopped() {
                return;
            }
            if let Some(distance) = self.distance_at(&buf[pos..], max_distance) {
                hits.push(FuzzyHit { offset: pos, distance });
            }
        }
    }
}

/// Horspool shifts for a pattern whose last position is known.
///
/// A wildcard at index `w` can align with any byte, so no shift may exceed
/// `len - 1 - w`; with a wildcard right before the last position every shift
/// is 1.
fn build_skip_table(bytes: &[Option<u8>]) -> [usize; 256] {
    let len = bytes.len();
    let last_wildcard = bytes[..len - 1].iter().rposition(Option::is_none);
    let default_shift = match last_wildcard {
        Some(w) => len - 1 - w,
        None => len,
    };

    let mut table = [default_shift; 256];
    let first_known = last_wildcard.map_or(0, |w| w + 1);
    for (j, byte) in bytes.iter().enumerate().take(len - 1).skip(first_known) {
        if let Some(b) = byte {
            table[*b as usize] = len - 1 - j;
        }
    }
    table
}

impl FromStr for Pattern {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if b.wildcard {
                f.write_str("??")?;
            } else {
                write!(f, "{:02X}", b.value)?;
            }
        }
        Ok(())
    }
}
