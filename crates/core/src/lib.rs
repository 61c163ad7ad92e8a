//! Yon Core: allocation foundation for the yon data model
//!
//! This crate provides the value-model-agnostic memory primitives: arenas
//! with tag-scoped lifetimes, the variable-length size codec used as the
//! wire prefix for stored records, and the content-addressed dedup index.
//!
//! Key design principles:
//! - Arena: all out-of-place bytes belong to one tag and die together
//! - Backends: type-erased so scratch and long-lived builders differ only
//!   in construction
//! - Dedup: equal bytes under one tag resolve to one address
//!
//! # Modules
//!
//! - `arena`: `ArenaBackend` trait, `BumpArena` ("auto"), `FixedArena`
//! - `varint`: continuation-bit size codec
//! - `dedup`: content hash + dedup index
//! - `stats`: observable allocator counters

pub mod arena;
pub mod dedup;
pub mod stats;
pub mod varint;

// Re-export key types and functions
pub use arena::{AllocTag, ArenaBackend, BumpArena, FixedArena};
pub use dedup::{DedupIndex, content_hash};
pub use stats::{ArenaInfo, ArenaStats};
