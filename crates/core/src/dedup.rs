//! Content-addressed deduplication index
//!
//! Tracks previously stored byte regions within one arena tag so equal
//! content can be served from the same address. Lookup hashes the
//! scatter-gather input with a fast 64-bit mixer and confirms candidates
//! byte-for-byte, so collisions cost a comparison, never a wrong hit.
//!
//! The index is append-only for the lifetime of its builder. Parent-chain
//! lookup order is the builder's concern; the index itself only answers for
//! the bytes it has seen.

use std::collections::HashMap;
use std::ptr::NonNull;

const HASH_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Fast non-cryptographic 64-bit content hash over a scatter-gather stream.
///
/// FNV-1a style byte fold with a splitmix64 finalizer; the same parts split
/// differently hashes identically because only the byte stream matters.
pub fn content_hash(parts: &[&[u8]]) -> u64 {
    let mut h = HASH_SEED;
    for part in parts {
        for &b in *part {
            h = (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    // splitmix64 finalizer
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^ (h >> 31)
}

#[derive(Debug, Clone, Copy)]
struct Stored {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
}

/// Hash-indexed lookup over previously stored bytes.
///
/// # Safety invariants
///
/// Entries point into the arena owned by the same builder as this index;
/// they stay valid exactly as long as that arena is not reset. The builder
/// drops (or clears) the index together with the arena.
#[derive(Default)]
pub struct DedupIndex {
    buckets: HashMap<u64, Vec<Stored>>,
    entries: u64,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u64 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Find a previously stored region whose bytes equal the concatenation
    /// of `parts` at the given alignment. `hash` must be
    /// `content_hash(parts)`.
    pub fn lookup(&self, parts: &[&[u8]], align: usize, hash: u64) -> Option<NonNull<u8>> {
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let bucket = self.buckets.get(&hash)?;
        bucket
            .iter()
            .find(|s| s.len == total && s.align == align && stored_eq(s, parts))
            .map(|s| s.ptr)
    }

    /// Record a freshly stored region under `hash`.
    pub fn insert(&mut self, hash: u64, ptr: NonNull<u8>, len: usize, align: usize) {
        self.buckets
            .entry(hash)
            .or_default()
            .push(Stored { ptr, len, align });
        self.entries += 1;
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.entries = 0;
    }
}

fn stored_eq(stored: &Stored, parts: &[&[u8]]) -> bool {
    // Safety: entries point into the live arena (see type invariant) and
    // span exactly `stored.len` bytes.
    let bytes = unsafe { std::slice::from_raw_parts(stored.ptr.as_ptr(), stored.len) };
    let mut at = 0;
    for part in parts {
        if bytes[at..at + part.len()] != **part {
            return false;
        }
        at += part.len();
    }
    true
}
