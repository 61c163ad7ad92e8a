//! Value builder: arena-backed construction with deduplication
//!
//! A [`ValueBuilder`] owns one arena (one lifetime class) and produces
//! [`PackedValue`]s into it. Constructors always prefer the in-place
//! encoding; out-of-place storage routes through the dedup index, so equal
//! content under one builder resolves to one address and word equality
//! becomes content equality for internalized values.
//!
//! Builders chain: a child keeps a borrow of its parent and reads the
//! parent's dedup index and arena for `internalize`/lookup, never mutating
//! it. Dropping (or resetting) a builder dangles every out-of-place value
//! built under it at once; in-place values are self-contained and survive.
//!
//! Allocation failures are recoverable: the failed constructor returns
//! [`PackedValue::INVALID`] and the builder counts the failure, which is how
//! the [`build_local`] retry harness decides to double its scratch buffer.

use crate::packed::{
    CompareOptions, INLINE_STR_MAX, Indirect, PackedValue, Pair, ValueKind, compare_with,
};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::ptr::NonNull;
use tracing::{debug, warn};
use yon_core::arena::{AllocTag, ArenaBackend, BumpArena, FixedArena};
use yon_core::dedup::{DedupIndex, content_hash};
use yon_core::stats::ArenaInfo;
use yon_core::varint;

const WORD: usize = size_of::<usize>();

/// Builder behaviour switches.
#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    /// Content-addressed deduplication of out-of-place storage.
    pub dedup: bool,
    /// Refuse mapping construction when a later key equals an earlier one.
    pub reject_duplicate_keys: bool,
    /// Compare mapping keys set-wise, ignoring insertion order. The default
    /// is order-sensitive because mapping order is preserved.
    pub key_order_insensitive: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            dedup: true,
            reject_duplicate_keys: false,
            key_order_insensitive: false,
        }
    }
}

/// Arena-owning value factory.
pub struct ValueBuilder<'p> {
    arena: RefCell<Box<dyn ArenaBackend>>,
    dedup: Option<RefCell<DedupIndex>>,
    parent: Option<&'p ValueBuilder<'p>>,
    alloc_failures: Cell<u64>,
    config: BuilderConfig,
}

impl ValueBuilder<'static> {
    /// Builder over the growing "auto" arena with default configuration.
    pub fn auto(tag: AllocTag) -> Self {
        Self::from_backend(Box::new(BumpArena::new(tag)), BuilderConfig::default())
    }

    /// Builder over a fixed-size linear arena (exact failure semantics).
    pub fn fixed(tag: AllocTag, capacity: usize) -> Self {
        Self::from_backend(
            Box::new(FixedArena::with_capacity(tag, capacity)),
            BuilderConfig::default(),
        )
    }

    /// Builder over the "auto" arena with explicit configuration.
    pub fn with_config(tag: AllocTag, config: BuilderConfig) -> Self {
        Self::from_backend(Box::new(BumpArena::new(tag)), config)
    }

    pub fn from_backend(backend: Box<dyn ArenaBackend>, config: BuilderConfig) -> Self {
        Self {
            arena: RefCell::new(backend),
            dedup: config.dedup.then(|| RefCell::new(DedupIndex::new())),
            parent: None,
            alloc_failures: Cell::new(0),
            config,
        }
    }
}

impl<'p> ValueBuilder<'p> {
    /// Child builder with its own arena under `tag`, chained to `self` for
    /// dedup lookup and arena-membership queries. The child only reads the
    /// parent.
    pub fn child(&'p self, tag: AllocTag) -> ValueBuilder<'p> {
        let config = self.config;
        ValueBuilder {
            arena: RefCell::new(Box::new(BumpArena::new(tag))),
            dedup: config.dedup.then(|| RefCell::new(DedupIndex::new())),
            parent: Some(self),
            alloc_failures: Cell::new(0),
            config,
        }
    }

    pub fn config(&self) -> BuilderConfig {
        self.config
    }

    /// Comparison options this builder's configuration asks for.
    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            unordered_mappings: self.config.key_order_insensitive,
        }
    }

    pub fn tag(&self) -> AllocTag {
        self.arena.borrow().tag()
    }

    /// Allocation failures observed so far.
    pub fn alloc_failures(&self) -> u64 {
        self.alloc_failures.get()
    }

    /// Allocator counter snapshot.
    pub fn info(&self) -> ArenaInfo {
        self.arena.borrow().info()
    }

    /// Return unused arena capacity where the backend can.
    pub fn trim(&self) {
        self.arena.borrow_mut().trim();
    }

    /// Drop every value built so far. Previously returned out-of-place
    /// values dangle after this.
    pub fn reset(&mut self) {
        self.arena.borrow_mut().reset();
        if let Some(idx) = &self.dedup {
            idx.borrow_mut().clear();
        }
        self.alloc_failures.set(0);
    }

    // =========================================================================
    // Storage
    // =========================================================================

    /// Store a scatter-gather byte region, deduplicating when enabled.
    fn store_bytes(&self, parts: &[&[u8]], align: usize) -> Option<NonNull<u8>> {
        let hash = self.dedup.is_some().then(|| content_hash(parts));
        if let Some(hash) = hash
            && let Some(hit) = self.lookup_chain(parts, align, hash)
        {
            return Some(hit);
        }
        let stored = self.arena.borrow_mut().storev(parts, align);
        match stored {
            Some(ptr) => {
                if let (Some(hash), Some(idx)) = (hash, &self.dedup) {
                    let len = parts.iter().map(|p| p.len()).sum();
                    idx.borrow_mut().insert(hash, ptr, len, align);
                }
                Some(ptr)
            }
            None => {
                self.alloc_failures.set(self.alloc_failures.get() + 1);
                warn!(tag = self.tag(), "arena allocation failed");
                None
            }
        }
    }

    /// Walk the parent chain from the innermost builder, stopping at the
    /// first dedup-disabled link.
    fn lookup_chain(&self, parts: &[&[u8]], align: usize, hash: u64) -> Option<NonNull<u8>> {
        let mut link: Option<&ValueBuilder<'_>> = Some(self);
        while let Some(gb) = link {
            let idx = gb.dedup.as_ref()?;
            if let Some(hit) = idx.borrow().lookup(parts, align, hash) {
                return Some(hit);
            }
            link = gb.parent;
        }
        None
    }

    /// Whether `ptr` lives in this builder's arena or any ancestor's.
    fn owns(&self, ptr: *const u8) -> bool {
        let mut link: Option<&ValueBuilder<'_>> = Some(self);
        while let Some(gb) = link {
            if gb.arena.borrow().contains(ptr) {
                return true;
            }
            link = gb.parent;
        }
        false
    }

    // =========================================================================
    // Scalar constructors
    // =========================================================================

    /// Build any supported scalar, preferring the in-place encoding.
    pub fn scalar<T: crate::scalar::Scalar>(&self, v: T) -> PackedValue {
        match T::pack_in_place(v) {
            Some(packed) => packed,
            None => T::store_out_of_place(v, self),
        }
    }

    pub fn int(&self, v: i64) -> PackedValue {
        self.scalar(v)
    }

    pub fn uint(&self, v: u64) -> PackedValue {
        self.scalar(v)
    }

    pub fn float(&self, v: f64) -> PackedValue {
        self.scalar(v)
    }

    pub fn boolean(&self, v: bool) -> PackedValue {
        PackedValue::from_bool(v)
    }

    pub fn null(&self) -> PackedValue {
        PackedValue::NULL
    }

    pub fn string(&self, s: &str) -> PackedValue {
        self.bytes(s.as_bytes())
    }

    /// Byte-sequence string. Short inputs pack into the word; longer ones
    /// store a length-prefixed, NUL-terminated record.
    pub fn bytes(&self, bytes: &[u8]) -> PackedValue {
        match PackedValue::from_inline_str(bytes) {
            Some(v) => v,
            None => self.store_string_bytes(bytes),
        }
    }

    pub(crate) fn store_int_record(&self, bits: u64, unsigned_ext: bool) -> PackedValue {
        let value = bits.to_ne_bytes();
        let ext = (unsigned_ext as u64).to_ne_bytes();
        match self.store_bytes(&[&value, &ext], 8) {
            Some(ptr) => PackedValue::int_record(ptr),
            None => PackedValue::INVALID,
        }
    }

    pub(crate) fn store_float_record(&self, v: f64) -> PackedValue {
        let bytes = v.to_bits().to_ne_bytes();
        match self.store_bytes(&[&bytes], 8) {
            Some(ptr) => PackedValue::float_record(ptr),
            None => PackedValue::INVALID,
        }
    }

    pub(crate) fn store_string_bytes(&self, bytes: &[u8]) -> PackedValue {
        debug_assert!(bytes.len() > INLINE_STR_MAX);
        let (prefix, n) = varint::encode_array(bytes.len());
        match self.store_bytes(&[&prefix[..n], bytes, &[0u8]], 8) {
            Some(ptr) => PackedValue::string_record(ptr),
            None => PackedValue::INVALID,
        }
    }

    // =========================================================================
    // Collection constructors
    // =========================================================================

    /// Build a sequence. Items are internalized into this builder first;
    /// any Invalid item poisons the result.
    pub fn sequence(&self, items: &[PackedValue]) -> PackedValue {
        if items.iter().any(|v| v.is_invalid()) {
            return PackedValue::INVALID;
        }
        if items.is_empty() {
            return PackedValue::EMPTY_SEQUENCE;
        }
        let mut local = Vec::with_capacity(items.len());
        for item in items {
            let v = self.internalize(*item);
            if v.is_invalid() {
                return PackedValue::INVALID;
            }
            local.push(v);
        }
        self.make_sequence_raw(&local)
    }

    /// Build a mapping from key/value pairs, preserving insertion order.
    /// Rejects duplicate keys when the builder is configured to.
    pub fn mapping(&self, pairs: &[Pair]) -> PackedValue {
        if pairs
            .iter()
            .any(|p| p.key.is_invalid() || p.value.is_invalid())
        {
            return PackedValue::INVALID;
        }
        if pairs.is_empty() {
            return PackedValue::EMPTY_MAPPING;
        }
        if self.config.reject_duplicate_keys {
            let opts = self.compare_options();
            for (i, pair) in pairs.iter().enumerate() {
                for earlier in &pairs[..i] {
                    if compare_with(earlier.key, pair.key, opts) == Some(Ordering::Equal) {
                        return PackedValue::INVALID;
                    }
                }
            }
        }
        let mut local = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let key = self.internalize(pair.key);
            let value = self.internalize(pair.value);
            if key.is_invalid() || value.is_invalid() {
                return PackedValue::INVALID;
            }
            local.push(Pair { key, value });
        }
        self.make_mapping_raw(&local)
    }

    /// Store a sequence record from already-internalized items.
    pub(crate) fn make_sequence_raw(&self, items: &[PackedValue]) -> PackedValue {
        if items.is_empty() {
            return PackedValue::EMPTY_SEQUENCE;
        }
        let count = items.len().to_ne_bytes();
        match self.store_bytes(&[&count, words_bytes(items)], 16) {
            Some(ptr) => PackedValue::sequence_record(ptr),
            None => PackedValue::INVALID,
        }
    }

    /// Store a mapping record from already-internalized pairs.
    pub(crate) fn make_mapping_raw(&self, pairs: &[Pair]) -> PackedValue {
        if pairs.is_empty() {
            return PackedValue::EMPTY_MAPPING;
        }
        let count = pairs.len().to_ne_bytes();
        match self.store_bytes(&[&count, pairs_bytes(pairs)], 16) {
            Some(ptr) => PackedValue::mapping_record(ptr),
            None => PackedValue::INVALID,
        }
    }

    // =========================================================================
    // Indirect constructors
    // =========================================================================

    /// Build an indirect decorator. Anchor and tag must be strings when
    /// present; a decorator with no fields at all is invalid input.
    pub fn indirect(&self, ind: Indirect) -> PackedValue {
        if !ind.has_value() && !ind.has_anchor() && !ind.has_tag() {
            return PackedValue::INVALID;
        }
        for field in [ind.anchor, ind.tag] {
            if !field.is_invalid() && !field.is_string() {
                return PackedValue::INVALID;
            }
        }

        let mut fields: [PackedValue; 3] = [PackedValue::INVALID; 3];
        let mut n = 0;
        for src in [ind.value, ind.anchor, ind.tag] {
            if !src.is_invalid() {
                let v = self.internalize(src);
                if v.is_invalid() {
                    return PackedValue::INVALID;
                }
                fields[n] = v;
                n += 1;
            }
        }

        let flag_word = ind.flag_word().to_ne_bytes();
        match self.store_bytes(&[&flag_word, words_bytes(&fields[..n])], 16) {
            Some(ptr) => PackedValue::indirect_record(ptr),
            None => PackedValue::INVALID,
        }
    }

    /// Build an alias: a reference-by-name to a previously anchored node.
    pub fn alias(&self, anchor: &str) -> PackedValue {
        let anchor = self.string(anchor);
        if anchor.is_invalid() {
            return PackedValue::INVALID;
        }
        self.indirect(Indirect {
            anchor,
            ..Indirect::default()
        })
    }

    // =========================================================================
    // Copy and internalize
    // =========================================================================

    /// Return `v` unchanged when its storage already lives in this builder's
    /// arena chain, otherwise deep-copy it in. In-place values pass through.
    pub fn internalize(&self, v: PackedValue) -> PackedValue {
        if v.is_in_place() {
            return v;
        }
        if self.owns(v.record_ptr()) {
            return v;
        }
        self.copy(v)
    }

    /// Deep-copy any out-of-place parts of `v` into this builder. Empty
    /// strings and collections come back in their canonical in-place form.
    pub fn copy(&self, v: PackedValue) -> PackedValue {
        match v.raw_kind() {
            ValueKind::Invalid => PackedValue::INVALID,
            _ if v.is_in_place() => v,
            ValueKind::Int => {
                let wide = v.as_wide_int_nocheck();
                if let Ok(narrow) = i64::try_from(wide)
                    && let Some(inline) = PackedValue::from_inline_int(narrow)
                {
                    return inline;
                }
                if wide > i64::MAX as i128 {
                    self.store_int_record(wide as u64, true)
                } else {
                    self.store_int_record(wide as i64 as u64, false)
                }
            }
            ValueKind::Float => self.float(v.as_float_nocheck()),
            ValueKind::String => self.bytes(v.as_str_nocheck().as_bytes()),
            ValueKind::Sequence => {
                let mut local = Vec::with_capacity(v.sequence_items().len());
                for item in v.sequence_items() {
                    let copied = self.copy(*item);
                    if copied.is_invalid() {
                        return PackedValue::INVALID;
                    }
                    local.push(copied);
                }
                self.make_sequence_raw(&local)
            }
            ValueKind::Mapping => {
                let mut local = Vec::with_capacity(v.mapping_pairs().len());
                for pair in v.mapping_pairs() {
                    let key = self.copy(pair.key);
                    let value = self.copy(pair.value);
                    if key.is_invalid() || value.is_invalid() {
                        return PackedValue::INVALID;
                    }
                    local.push(Pair { key, value });
                }
                self.make_mapping_raw(&local)
            }
            ValueKind::Indirect | ValueKind::Alias => {
                let ind = v.indirect_nocheck();
                let copy_field = |f: PackedValue| {
                    if f.is_invalid() {
                        PackedValue::INVALID
                    } else {
                        self.copy(f)
                    }
                };
                self.indirect(Indirect {
                    style: ind.style,
                    value: copy_field(ind.value),
                    anchor: copy_field(ind.anchor),
                    tag: copy_field(ind.tag),
                })
            }
            // Null/Bool are always in-place; handled above.
            ValueKind::Null | ValueKind::Bool => v,
        }
    }
}

#[inline]
fn words_bytes(words: &[PackedValue]) -> &[u8] {
    // Safety: PackedValue is repr(transparent) over usize; no padding.
    unsafe { std::slice::from_raw_parts(words.as_ptr() as *const u8, words.len() * WORD) }
}

#[inline]
fn pairs_bytes(pairs: &[Pair]) -> &[u8] {
    // Safety: Pair is repr(C) of two words; no padding.
    unsafe { std::slice::from_raw_parts(pairs.as_ptr() as *const u8, pairs.len() * 2 * WORD) }
}

// ============================================================================
// Thread-local current builder
// ============================================================================

thread_local! {
    static CURRENT_BUILDER: Cell<Option<NonNull<ValueBuilder<'static>>>> =
        const { Cell::new(None) };
}

/// Install `gb` as the thread's current builder for the duration of `f`,
/// restoring the previous one on exit (including on panic). Scopes nest.
pub fn with_builder<R>(gb: &ValueBuilder<'_>, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<NonNull<ValueBuilder<'static>>>);
    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT_BUILDER.with(|c| c.set(self.0));
        }
    }

    let erased = NonNull::from(gb).cast::<ValueBuilder<'static>>();
    let prev = CURRENT_BUILDER.with(|c| c.replace(Some(erased)));
    let _restore = Restore(prev);
    f()
}

/// Run `f` against the thread's current builder, if one is installed.
pub fn with_current_builder<R>(f: impl FnOnce(&ValueBuilder<'_>) -> R) -> Option<R> {
    CURRENT_BUILDER.with(|c| c.get()).map(|ptr| {
        // Safety: the pointer was installed by `with_builder`, whose scope
        // is still live (scopes nest strictly and restore on exit).
        let gb = unsafe { ptr.as_ref() };
        f(gb)
    })
}

// ============================================================================
// Local-build retry harness
// ============================================================================

/// First scratch buffer size for [`build_local`].
pub const LOCAL_BUILD_INITIAL: usize = 256;

/// Scratch buffers stop doubling at this ceiling.
pub const LOCAL_BUILD_CEILING: usize = 64 * 1024;

/// Build a value through a scratch fixed-arena builder, then internalize the
/// result into `dst`.
///
/// The closure runs against a linear arena starting at
/// [`LOCAL_BUILD_INITIAL`] bytes; when it fails with allocation failures the
/// buffer doubles and the closure reruns, up to [`LOCAL_BUILD_CEILING`].
/// `f` must be side-effect free: it may run several times.
pub fn build_local(
    dst: &ValueBuilder<'_>,
    f: impl Fn(&ValueBuilder<'_>) -> PackedValue,
) -> PackedValue {
    let mut capacity = LOCAL_BUILD_INITIAL;
    loop {
        let scratch = ValueBuilder::fixed(dst.tag(), capacity);
        let v = f(&scratch);
        if !v.is_invalid() && scratch.alloc_failures() == 0 {
            return dst.internalize(v);
        }
        if scratch.alloc_failures() == 0 {
            // Invalid for a non-allocation reason: retrying cannot help.
            return PackedValue::INVALID;
        }
        if capacity >= LOCAL_BUILD_CEILING {
            return PackedValue::INVALID;
        }
        capacity *= 2;
        debug!(capacity, "scratch arena exhausted, doubling");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::compare;
    use serial_test::serial;

    #[test]
    fn test_inline_scalars_bypass_arena() {
        let gb = ValueBuilder::auto(0);
        let v = gb.int(42);
        assert!(v.is_in_place());
        assert_eq!(v.as_int_nocheck(), 42);
        assert_eq!(gb.info().allocations, 0);

        assert!(gb.boolean(true).is_in_place());
        assert!(gb.null().is_null());
        assert!(gb.string("short").is_in_place());
        assert!(gb.float(1.5).is_in_place());
    }

    #[test]
    fn test_out_of_place_string() {
        let gb = ValueBuilder::auto(0);
        let v = gb.string("hello world");
        assert!(!v.is_in_place());
        assert_eq!(v.to_bits() & 0b111, 0b110);
        let view = v.as_str_nocheck();
        assert_eq!(view.as_bytes(), b"hello world");
        assert_eq!(v.string_size_nocheck(), 11);
    }

    #[test]
    fn test_out_of_place_int_and_float() {
        let gb = ValueBuilder::auto(0);

        let big = i64::MAX;
        let v = gb.int(big);
        assert!(!v.is_in_place());
        assert_eq!(v.to_bits() & 0b111, 0b010);
        assert_eq!(v.as_int_nocheck(), big);
        assert!(!v.is_unsigned_range());

        let v = gb.uint(u64::MAX);
        assert!(v.is_unsigned_range());
        assert_eq!(v.as_wide_int_nocheck(), u64::MAX as i128);

        let v = gb.float(std::f64::consts::PI);
        assert!(!v.is_in_place());
        assert_eq!(v.as_float_nocheck(), std::f64::consts::PI);
    }

    #[test]
    fn test_dedup_word_equality() {
        let gb = ValueBuilder::auto(0);
        let a = gb.string("xyz_long_enough_to_be_out_of_place");
        let b = gb.string("xyz_long_enough_to_be_out_of_place");
        assert!(!a.is_in_place());
        assert_eq!(a, b); // pointer-equal, not just content-equal

        let c = gb.int(i64::MAX);
        let d = gb.int(i64::MAX);
        assert_eq!(c, d);
    }

    #[test]
    fn test_dedup_disabled() {
        let gb = ValueBuilder::with_config(
            0,
            BuilderConfig {
                dedup: false,
                ..BuilderConfig::default()
            },
        );
        let a = gb.string("xyz_long_enough_to_be_out_of_place");
        let b = gb.string("xyz_long_enough_to_be_out_of_place");
        assert_ne!(a, b);
        assert_eq!(compare(a, b), Some(Ordering::Equal));
    }

    #[test]
    fn test_parent_chain_dedup() {
        let parent = ValueBuilder::auto(0);
        let from_parent = parent.string("shared content, long enough");

        let child = parent.child(1);
        let from_child = child.string("shared content, long enough");
        // The child found the parent's bytes; no new storage.
        assert_eq!(from_parent, from_child);
        assert_eq!(child.info().allocations, 0);
    }

    #[test]
    fn test_sequence_construction() {
        let gb = ValueBuilder::auto(0);
        let items = [gb.int(1), gb.int(2), gb.int(3)];
        let seq = gb.sequence(&items);
        assert!(seq.is_sequence());
        assert!(!seq.is_in_place());
        let got = seq.sequence_items();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_int_nocheck(), 1);
        assert_eq!(got[2].as_int_nocheck(), 3);

        assert_eq!(gb.sequence(&[]), PackedValue::EMPTY_SEQUENCE);
        assert_eq!(
            gb.sequence(&[PackedValue::INVALID]),
            PackedValue::INVALID
        );
    }

    #[test]
    fn test_mapping_preserves_insertion_order() {
        let gb = ValueBuilder::auto(0);
        let pairs = [
            Pair { key: gb.string("a"), value: gb.int(1) },
            Pair { key: gb.string("b"), value: gb.int(2) },
            Pair { key: gb.string("c"), value: gb.int(3) },
        ];
        let map = gb.mapping(&pairs);
        assert!(map.is_mapping());
        let got = map.mapping_pairs();
        let keys: Vec<_> = got
            .iter()
            .map(|p| p.key.as_str_nocheck().to_str_lossy().into_owned())
            .collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(map.mapping_get_str("b").as_int_nocheck(), 2);
        assert!(map.mapping_get_str("d").is_invalid());
    }

    #[test]
    fn test_duplicate_key_rejection() {
        let gb = ValueBuilder::with_config(
            0,
            BuilderConfig {
                reject_duplicate_keys: true,
                ..BuilderConfig::default()
            },
        );
        let pairs = [
            Pair { key: gb.string("k"), value: gb.int(1) },
            Pair { key: gb.string("k"), value: gb.int(2) },
        ];
        assert_eq!(gb.mapping(&pairs), PackedValue::INVALID);

        // Without rejection the second pair is kept as-is.
        let gb = ValueBuilder::auto(0);
        let pairs = [
            Pair { key: gb.string("k"), value: gb.int(1) },
            Pair { key: gb.string("k"), value: gb.int(2) },
        ];
        let map = gb.mapping(&pairs);
        assert_eq!(map.mapping_pairs().len(), 2);
    }

    #[test]
    fn test_key_order_insensitive_duplicate_rejection() {
        let gb = ValueBuilder::with_config(
            0,
            BuilderConfig {
                reject_duplicate_keys: true,
                key_order_insensitive: true,
                ..BuilderConfig::default()
            },
        );
        let k1 = gb.mapping(&[
            Pair { key: gb.string("x"), value: gb.int(1) },
            Pair { key: gb.string("y"), value: gb.int(2) },
        ]);
        let k2 = gb.mapping(&[
            Pair { key: gb.string("y"), value: gb.int(2) },
            Pair { key: gb.string("x"), value: gb.int(1) },
        ]);
        assert_ne!(k1, k2);

        // Set-wise the two keys are the same: rejected.
        let pairs = [
            Pair { key: k1, value: gb.int(1) },
            Pair { key: k2, value: gb.int(2) },
        ];
        assert_eq!(gb.mapping(&pairs), PackedValue::INVALID);

        // Under order-sensitive comparison they are distinct keys.
        let strict = ValueBuilder::with_config(
            1,
            BuilderConfig {
                reject_duplicate_keys: true,
                ..BuilderConfig::default()
            },
        );
        let map = strict.mapping(&pairs);
        assert_eq!(map.mapping_pairs().len(), 2);
    }

    #[test]
    fn test_indirect_and_alias() {
        let gb = ValueBuilder::auto(0);
        let v = gb.indirect(Indirect {
            value: gb.int(7),
            anchor: gb.string("a"),
            ..Indirect::default()
        });
        assert!(v.is_indirect());
        assert_eq!(v.kind(), ValueKind::Int);
        let ind = v.indirect_nocheck();
        assert_eq!(ind.value.as_int_nocheck(), 7);
        assert_eq!(ind.anchor.as_str_nocheck().as_bytes(), b"a");
        assert!(ind.tag.is_invalid());

        let alias = gb.alias("a");
        assert!(alias.is_alias());
        assert_eq!(alias.kind(), ValueKind::Alias);

        // Anchor must be a string; an empty decorator is invalid input.
        assert_eq!(gb.indirect(Indirect::default()), PackedValue::INVALID);
        assert_eq!(
            gb.indirect(Indirect {
                value: gb.int(1),
                anchor: gb.int(2),
                ..Indirect::default()
            }),
            PackedValue::INVALID
        );
    }

    #[test]
    fn test_internalize_same_arena_is_identity() {
        let gb = ValueBuilder::auto(0);
        let v = gb.string("some string that is out of place");
        assert_eq!(gb.internalize(v), v);

        // In-place values are identity everywhere.
        let other = ValueBuilder::auto(1);
        assert_eq!(other.internalize(gb.int(5)), gb.int(5));
    }

    #[test]
    fn test_internalize_across_builders_copies() {
        let a = ValueBuilder::auto(0);
        let b = ValueBuilder::auto(1);
        let src = a.sequence(&[a.string("first element, out of place"), a.int(2)]);
        let dst = b.internalize(src);
        assert_ne!(src, dst);
        assert_eq!(compare(src, dst), Some(Ordering::Equal));
        // Children were rewritten into b's arena.
        let item = dst.sequence_items()[0];
        assert!(b.internalize(item) == item);
    }

    #[test]
    fn test_internalize_into_parent_chain_is_identity() {
        let parent = ValueBuilder::auto(0);
        let v = parent.string("stored in the parent arena ...");
        let child = parent.child(1);
        // The bytes live in an ancestor arena; no copy.
        assert_eq!(child.internalize(v), v);
    }

    #[test]
    fn test_copy_canonicalizes_empties() {
        let a = ValueBuilder::auto(0);
        let b = ValueBuilder::auto(1);
        // Force an empty collection through copy: canonical in-place word.
        assert_eq!(b.copy(PackedValue::EMPTY_SEQUENCE), PackedValue::EMPTY_SEQUENCE);
        assert_eq!(b.copy(PackedValue::EMPTY_MAPPING), PackedValue::EMPTY_MAPPING);
        let nested = a.sequence(&[a.sequence(&[])]);
        let copied = b.copy(nested);
        assert_eq!(copied.sequence_items()[0], PackedValue::EMPTY_SEQUENCE);
    }

    #[test]
    fn test_allocation_failure_counts_and_sentinels() {
        let gb = ValueBuilder::fixed(0, 16);
        // 1-byte prefix + 16 bytes + NUL exceeds the 16-byte arena: Invalid.
        let v = gb.string("fits in sixteen?");
        assert!(v.is_invalid());
        assert_eq!(gb.alloc_failures(), 1);

        // Count word + two item words exceed the arena as well.
        let also = gb.sequence(&[gb.int(1), gb.int(2)]);
        assert!(also.is_invalid());
        assert!(gb.alloc_failures() >= 2);
    }

    #[test]
    #[serial]
    fn test_with_builder_scope_nests_and_restores() {
        let outer = ValueBuilder::auto(0);
        let inner = ValueBuilder::auto(1);

        assert!(with_current_builder(|_| ()).is_none());
        with_builder(&outer, || {
            let tag = with_current_builder(|gb| gb.tag()).unwrap();
            assert_eq!(tag, 0);
            with_builder(&inner, || {
                let tag = with_current_builder(|gb| gb.tag()).unwrap();
                assert_eq!(tag, 1);
            });
            let tag = with_current_builder(|gb| gb.tag()).unwrap();
            assert_eq!(tag, 0);
        });
        assert!(with_current_builder(|_| ()).is_none());
    }

    #[test]
    fn test_build_local_retries_until_fit() {
        let dst = ValueBuilder::auto(0);
        // Needs well over the initial 256 bytes of scratch.
        let text = "x".repeat(1024);
        let v = build_local(&dst, |scratch| {
            let items = [scratch.string(&text), scratch.int(1)];
            scratch.sequence(&items)
        });
        assert!(v.is_sequence());
        assert_eq!(
            v.sequence_items()[0].as_str_nocheck().as_bytes(),
            text.as_bytes()
        );
        // The result lives in dst now.
        assert_eq!(dst.internalize(v), v);
    }

    #[test]
    fn test_build_local_gives_up_at_ceiling() {
        let dst = ValueBuilder::auto(0);
        let text = "y".repeat(LOCAL_BUILD_CEILING * 2);
        let v = build_local(&dst, |scratch| scratch.string(&text));
        assert!(v.is_invalid());
    }
}
