//! Ordered enumeration of candidate suffixes.
//!
//! Numbers are walked in width buckets: every value that fits in one byte,
//! then every two-byte value starting again from zero, and so on. The
//! `start`/`stop` bounds are logical indices into that bucketed numbering, so
//! a shard that begins at zero also covers every narrower width before it.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use log::warn;

use crate::error::{RecoveryError, Result};

/// Widest candidate whose bucket still fits in a `u64` index.
pub const MAX_CANDIDATE_LENGTH: usize = 7;

/// Producers beyond this would make the first shard too small to reach the
/// widest bucket, leaving gaps in the narrower ones.
pub const MAX_PRODUCERS: usize = 255;

/// A hypothesis for the missing tail of the archive.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Candidate(Vec<u8>);

impl Candidate {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Big-endian encoding of `number` on exactly `width` bytes.
    pub fn from_number(number: u64, width: usize) -> Self {
        let be = number.to_be_bytes();
        Self(be[be.len() - width..].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric value of the bytes read as a big-endian integer.
    pub fn value(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate(0x{})", self.to_hex())
    }
}

/// Number of distinct values representable on `width` bytes, `None` once it
/// no longer fits in a `u64`.
pub fn bucket_size(width: usize) -> Option<u64> {
    u32::try_from(width)
        .ok()
        .and_then(|w| 256u64.checked_pow(w))
}

/// Smallest width (at least one byte) able to hold `number`.
pub fn minimal_width(number: u64) -> usize {
    let mut width = 1;
    while bucket_size(width).map_or(false, |size| size <= number) {
        width += 1;
    }
    width
}

/// Lazy, finite walk over the bucketed numbering in `[start, stop)`.
#[derive(Debug, Clone)]
pub struct SuffixEnumerator {
    number: u64,
    stop: u64,
    width: usize,
}

impl SuffixEnumerator {
    pub fn new(range: Range<u64>) -> Self {
        Self {
            number: range.start,
            stop: range.end,
            width: minimal_width(range.start),
        }
    }

    /// Exact number of candidates still to be yielded.
    pub fn remaining(&self) -> u64 {
        if self.number >= self.stop {
            return 0;
        }
        let mut count = 0u64;
        let mut from = self.number;
        let mut width = self.width;
        loop {
            match bucket_size(width) {
                Some(end) if end < self.stop => {
                    count += end.saturating_sub(from);
                    from = 0;
                    width += 1;
                }
                _ => return count + (self.stop - from),
            }
        }
    }
}

impl Iterator for SuffixEnumerator {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        if self.number >= self.stop {
            return None;
        }
        // Crossing into a wider bucket restarts the numbering at zero.
        if bucket_size(self.width).map_or(false, |size| size <= self.number) {
            self.width += 1;
            self.number = 0;
        }
        let candidate = Candidate::from_number(self.number, self.width);
        self.number += 1;
        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Split `[0, total)` into `shards` contiguous ranges; the first
/// `total % shards` ranges take one extra element.
pub fn partition(total: u64, shards: usize) -> Vec<Range<u64>> {
    let shards = shards.max(1) as u64;
    let base = total / shards;
    let extra = total % shards;
    let mut start = 0;
    (0..shards)
        .map(|i| {
            let len = base + u64::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Producer shards for the attempt at candidate length `length`.
///
/// The space is `[0, 256^length)`; shard zero walks every narrower width
/// first, so the producer count is capped to keep that shard wide enough.
pub fn attempt_shards(length: usize, producers: usize) -> Result<Vec<Range<u64>>> {
    if length == 0 || length > MAX_CANDIDATE_LENGTH {
        return Err(RecoveryError::LengthOverflow(length));
    }
    let total = bucket_size(length).ok_or(RecoveryError::LengthOverflow(length))?;
    let producers = if producers > MAX_PRODUCERS {
        warn!(
            "Capping producers from {} to {} so shards tile the candidate space",
            producers, MAX_PRODUCERS
        );
        MAX_PRODUCERS
    } else {
        producers.max(1)
    };
    Ok(partition(total, producers))
}

/// Exact candidate count of an attempt, summed across its shards.
pub fn attempt_candidate_count(shards: &[Range<u64>]) -> u64 {
    shards
        .iter()
        .map(|range| SuffixEnumerator::new(range.clone()).remaining())
        .sum()
}
