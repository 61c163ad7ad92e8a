//! Yon: a space-efficient YAML/JSON data model
//!
//! A value is a single machine word ([`PackedValue`]): null, booleans,
//! small integers, short strings and single-precision floats pack into the
//! word itself, everything else is a tagged pointer into an arena owned by
//! a [`ValueBuilder`]. Builders deduplicate stored content, so equal values
//! built under one builder are pointer-equal, and comparison degenerates to
//! word equality.
//!
//! Key design principles:
//! - Value: one word, in-place whenever an in-place encoding exists
//! - Builder: owns the arena and the dedup index; values die with it
//! - Encoder/iterator: drive a well-formed event stream over any value
//!
//! # Modules
//!
//! - `packed`: the tagged word, predicates, accessors, compare, relocate
//! - `scalar`: native scalar dispatch and defaulting casts
//! - `builder`: arena-backed construction, dedup, internalize, scopes
//! - `seq_ops` / `map_ops`: persistent collection operations
//! - `ops`: the closed operation dispatcher
//! - `emit`: document encoder driving an event sink
//! - `iter`: pull-based event iterator
//! - `document`: document directories and document state
//! - `serialize`: owned `TypedValue` mirror for persistence
//! - `error`: error kinds of the encoder/iterator boundary

pub mod builder;
pub mod document;
pub mod emit;
pub mod error;
pub mod iter;
pub mod map_ops;
pub mod ops;
pub mod packed;
pub mod scalar;
pub mod seq_ops;
pub mod serialize;

// Re-export key types and functions
pub use builder::{
    BuilderConfig, LOCAL_BUILD_CEILING, LOCAL_BUILD_INITIAL, ValueBuilder, build_local,
    with_builder, with_current_builder,
};
pub use document::{DocumentState, TagDirective, VersionDirective};
pub use emit::{
    CollectingSink, EmitEvent, EmitFlags, Encoder, EventSink, NodeAttrs, OwnedEvent,
    format_scalar_into, shorten_tag,
};
pub use error::{Error, SinkError};
pub use iter::{EventIter, GUARANTEED_DEPTH, IterEvent, IterFlags};
pub use ops::{Op, OpArgs, OpFlags, dispatch};
pub use packed::{
    CompareOptions, INLINE_INT_MAX, INLINE_INT_MIN, INLINE_STR_MAX, Indirect, IndirectFlags,
    NodeStyle, PackedValue, Pair, StrView, ValueKind, compare, compare_with, relocate,
};
pub use scalar::{FromPacked, Scalar, cast};
pub use serialize::{SerializeError, TypedValue, from_bytes, from_typed, to_bytes, to_typed};

// The allocation foundation is part of the public surface: custom backends
// and diagnostics come from there.
pub use yon_core::arena::{AllocTag, ArenaBackend, BumpArena, FixedArena};
pub use yon_core::stats::ArenaInfo;
