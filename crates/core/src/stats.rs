//! Arena allocation counters
//!
//! Every backend tracks the same small set of counters so diagnostics and
//! tests can observe allocator behaviour without reaching into backend
//! internals. Counters are plain integers: arenas are single-owner and all
//! mutation happens on the owning thread.

use crate::arena::AllocTag;

/// Observable allocator information, as reported by `ArenaBackend::info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaInfo {
    /// Backend name ("auto", "fixed", ...)
    pub backend: &'static str,
    /// Lifetime-class tag of the owning builder
    pub tag: AllocTag,
    /// Number of allocations served
    pub allocations: u64,
    /// Total bytes handed out
    pub bytes_allocated: u64,
    /// Total bytes released back (hints included)
    pub bytes_freed: u64,
    /// High-water mark of live bytes
    pub peak_bytes: u64,
}

/// Internal counter block shared by the backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArenaStats {
    pub allocations: u64,
    pub bytes_allocated: u64,
    pub bytes_freed: u64,
    pub peak_bytes: u64,
}

impl ArenaStats {
    #[inline]
    pub fn record_alloc(&mut self, size: usize) {
        self.allocations += 1;
        self.bytes_allocated += size as u64;
        let live = self.bytes_allocated - self.bytes_freed;
        if live > self.peak_bytes {
            self.peak_bytes = live;
        }
    }

    #[inline]
    pub fn record_free(&mut self, size: usize) {
        self.bytes_freed += size as u64;
    }

    pub fn info(&self, backend: &'static str, tag: AllocTag) -> ArenaInfo {
        ArenaInfo {
            backend,
            tag,
            allocations: self.allocations,
            bytes_allocated: self.bytes_allocated,
            bytes_freed: self.bytes_freed,
            peak_bytes: self.peak_bytes,
        }
    }
}
