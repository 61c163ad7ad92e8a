//! Tagged-word value representation
//!
//! Encodes a YAML/JSON value into a single machine word. Small scalars pack
//! directly into the word; everything else is a tagged pointer into the
//! owning builder's arena.
//!
//! ## Word layout (64-bit)
//!
//! ```text
//! low 4 bits   meaning
//! ──────────   ──────────────────────────────────────────────────────────
//!   0000       sequence pointer (all-zero word = empty sequence)
//!   1000       mapping pointer  (word 0b1000   = empty mapping)
//!   x001       inline int, 61-bit signed        (value in bits 63..3)
//!   x010       out-of-place int record pointer  (8-byte aligned)
//!   x011       inline float                     (f32 bits in 63..32)
//!   x100       out-of-place f64 pointer         (8-byte aligned)
//!   x101       inline string, len ≤ 7           (len in 6..4, bytes 63..8)
//!   x110       out-of-place string pointer      (8-byte aligned)
//!   0111       indirect record pointer          (16-byte aligned)
//!   1111       escape code: Null / False / True / Invalid
//! ```
//!
//! Collections and indirects are 16-byte aligned so bit 3 stays available
//! as the mapping/escape discriminator; the other record pointers only need
//! 8-byte alignment because their bit 3 is part of the address. 32-bit
//! targets narrow inline ints to 29 bits and inline strings to 3 bytes, and
//! store floats out-of-place only.
//!
//! # Safety invariants
//!
//! - A word whose tag is a pointer was produced by a `ValueBuilder` into its
//!   live arena (or assembled via the unsafe [`PackedValue::from_bits`]).
//! - Holders must not outlive the builder that produced the word: after the
//!   builder resets or drops, pointer-bearing words dangle. In-place words
//!   are self-contained and live forever.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::ptr::NonNull;
use yon_core::varint;

// ============================================================================
// Constants
// ============================================================================

/// Low three bits select the primary encoding.
pub const TYPE_MASK: usize = 0b111;

/// Low four bits select the dispatch-table row.
pub const DISPATCH_MASK: usize = 0b1111;

pub(crate) const TAG_COLLECTION: usize = 0b000;
pub(crate) const TAG_INT_INLINE: usize = 0b001;
pub(crate) const TAG_INT_PTR: usize = 0b010;
pub(crate) const TAG_FLOAT_INLINE: usize = 0b011;
pub(crate) const TAG_FLOAT_PTR: usize = 0b100;
pub(crate) const TAG_STR_INLINE: usize = 0b101;
pub(crate) const TAG_STR_PTR: usize = 0b110;
pub(crate) const TAG_INDIRECT: usize = 0b111;

/// Bit 3: mapping discriminator on collection words, escape marker on 0b111.
pub(crate) const MAP_BIT: usize = 0b1000;

const ESCAPE_NULL: usize = 0x0F;
const ESCAPE_FALSE: usize = 0x1F;
const ESCAPE_TRUE: usize = 0x2F;
const ESCAPE_INVALID: usize = usize::MAX;

/// Number of value bits available to an inline signed integer.
pub const INLINE_INT_BITS: u32 = usize::BITS - 3;

/// Longest byte string that packs into the word itself.
pub const INLINE_STR_MAX: usize = usize::BITS as usize / 8 - 1;

/// Inclusive inline integer range.
pub const INLINE_INT_MIN: i64 = -(1i64 << (INLINE_INT_BITS - 1));
pub const INLINE_INT_MAX: i64 = (1i64 << (INLINE_INT_BITS - 1)) - 1;

const WORD: usize = size_of::<usize>();

// ============================================================================
// Kinds and styles
// ============================================================================

/// The observable kind set of the value model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Invalid,
    Null,
    Bool,
    Int,
    Float,
    String,
    Sequence,
    Mapping,
    Indirect,
    Alias,
}

/// Presentation style carried by an indirect decorator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum NodeStyle {
    #[default]
    Any,
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
    Block,
    Flow,
}

impl NodeStyle {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Plain,
            2 => Self::SingleQuoted,
            3 => Self::DoubleQuoted,
            4 => Self::Literal,
            5 => Self::Folded,
            6 => Self::Block,
            7 => Self::Flow,
            _ => Self::Any,
        }
    }
}

bitflags::bitflags! {
    /// Presence bits of an indirect record's flag word. The node style
    /// lives in bits 8..12 of the same word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IndirectFlags: usize {
        const HAS_VALUE  = 1 << 0;
        const HAS_ANCHOR = 1 << 1;
        const HAS_TAG    = 1 << 2;
    }
}

const STYLE_SHIFT: u32 = 8;
const STYLE_MASK: usize = 0xF << STYLE_SHIFT;

/// Materialized indirect decorator. Absent fields hold
/// [`PackedValue::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indirect {
    pub style: NodeStyle,
    pub value: PackedValue,
    pub anchor: PackedValue,
    pub tag: PackedValue,
}

impl Default for Indirect {
    fn default() -> Self {
        Self {
            style: NodeStyle::Any,
            value: PackedValue::INVALID,
            anchor: PackedValue::INVALID,
            tag: PackedValue::INVALID,
        }
    }
}

impl Indirect {
    pub fn has_value(&self) -> bool {
        !self.value.is_invalid()
    }

    pub fn has_anchor(&self) -> bool {
        !self.anchor.is_invalid()
    }

    pub fn has_tag(&self) -> bool {
        !self.tag.is_invalid()
    }

    /// An alias is an indirect carrying an anchor but no value.
    pub fn is_alias(&self) -> bool {
        !self.has_value() && self.has_anchor()
    }

    pub(crate) fn flag_word(&self) -> usize {
        let mut flags = IndirectFlags::empty();
        if self.has_value() {
            flags |= IndirectFlags::HAS_VALUE;
        }
        if self.has_anchor() {
            flags |= IndirectFlags::HAS_ANCHOR;
        }
        if self.has_tag() {
            flags |= IndirectFlags::HAS_TAG;
        }
        flags.bits() | ((self.style.code() as usize) << STYLE_SHIFT)
    }
}

/// One key/value entry of a mapping record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub key: PackedValue,
    pub value: PackedValue,
}

// ============================================================================
// PackedValue
// ============================================================================

/// A single-word YAML/JSON value.
///
/// `Copy` and word-comparable: derived equality is *word* equality, the
/// dedup fast path. Logical equality is [`PackedValue::compare`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PackedValue(usize);

/// Row of the 16-entry dispatch table, before escape resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
    Seq,
    Map,
    Int,
    Float,
    Str,
    Indirect,
    Escape,
}

const DISPATCH: [Row; 16] = [
    Row::Seq,      // 0000 sequence
    Row::Int,      // 0001 inline int
    Row::Int,      // 0010 int record
    Row::Float,    // 0011 inline float
    Row::Float,    // 0100 float record
    Row::Str,      // 0101 inline string
    Row::Str,      // 0110 string record
    Row::Indirect, // 0111 indirect record
    Row::Map,      // 1000 mapping
    Row::Int,      // 1001 inline int
    Row::Int,      // 1010 int record
    Row::Float,    // 1011 inline float
    Row::Float,    // 1100 float record
    Row::Str,      // 1101 inline string
    Row::Str,      // 1110 string record
    Row::Escape,   // 1111 null/false/true/invalid
];

impl PackedValue {
    // =========================================================================
    // Canonical words
    // =========================================================================

    /// The invalid sentinel. Never part of a well-formed stream.
    pub const INVALID: Self = Self(ESCAPE_INVALID);

    pub const NULL: Self = Self(ESCAPE_NULL);
    pub const TRUE: Self = Self(ESCAPE_TRUE);
    pub const FALSE: Self = Self(ESCAPE_FALSE);

    /// Canonical empty sequence: the all-zero word.
    pub const EMPTY_SEQUENCE: Self = Self(0);

    /// Canonical empty mapping: only the discriminator bit set.
    pub const EMPTY_MAPPING: Self = Self(MAP_BIT);

    // =========================================================================
    // Raw access
    // =========================================================================

    /// The raw word.
    #[inline(always)]
    pub fn to_bits(self) -> usize {
        self.0
    }

    /// Reassemble a value from a raw word.
    ///
    /// # Safety
    /// If the word carries a pointer tag, the pointer must reference a live,
    /// correctly aligned record in an arena that outlives every use of the
    /// returned value.
    #[inline(always)]
    pub unsafe fn from_bits(bits: usize) -> Self {
        Self(bits)
    }

    #[inline(always)]
    fn row(self) -> Row {
        DISPATCH[self.0 & DISPATCH_MASK]
    }

    /// Address part of a pointer-tagged word.
    #[inline(always)]
    fn record_addr(self) -> usize {
        match self.0 & TYPE_MASK {
            TAG_COLLECTION | TAG_INDIRECT => self.0 & !DISPATCH_MASK,
            _ => self.0 & !TYPE_MASK,
        }
    }

    /// Record pointer of an out-of-place value, for arena-membership tests.
    pub(crate) fn record_ptr(self) -> *const u8 {
        debug_assert!(!self.is_in_place(), "record_ptr on in-place value");
        self.record_addr() as *const u8
    }

    /// Follow one level of indirect wrapping, the same resolution kind
    /// classification applies. Aliases and plain values pass through.
    pub fn resolved(self) -> PackedValue {
        if self.raw_kind() == ValueKind::Indirect {
            let ind = self.indirect_nocheck();
            if ind.has_value() {
                return ind.value;
            }
        }
        self
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Kind of this value. Indirects resolve to the wrapped value's kind
    /// (one level only); an indirect with no value is an [`ValueKind::Alias`].
    pub fn kind(self) -> ValueKind {
        match self.raw_kind() {
            ValueKind::Indirect => {
                let ind = self.indirect_nocheck();
                if !ind.has_value() {
                    ValueKind::Alias
                } else {
                    match ind.value.raw_kind() {
                        // Wrapping another indirect only happens under
                        // external mutation; do not chase further.
                        ValueKind::Indirect => ValueKind::Indirect,
                        k => k,
                    }
                }
            }
            k => k,
        }
    }

    /// Kind without dereferencing indirect records.
    pub fn raw_kind(self) -> ValueKind {
        match self.row() {
            Row::Seq => ValueKind::Sequence,
            Row::Map => ValueKind::Mapping,
            Row::Int => ValueKind::Int,
            Row::Float => ValueKind::Float,
            Row::Str => ValueKind::String,
            Row::Indirect => ValueKind::Indirect,
            Row::Escape => match self.0 {
                ESCAPE_NULL => ValueKind::Null,
                ESCAPE_FALSE | ESCAPE_TRUE => ValueKind::Bool,
                _ => ValueKind::Invalid,
            },
        }
    }

    #[inline(always)]
    pub fn is_invalid(self) -> bool {
        self.0 == ESCAPE_INVALID
    }

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.0 == ESCAPE_NULL
    }

    #[inline(always)]
    pub fn is_bool(self) -> bool {
        self.0 == ESCAPE_TRUE || self.0 == ESCAPE_FALSE
    }

    #[inline(always)]
    pub fn is_int(self) -> bool {
        self.row() == Row::Int
    }

    #[inline(always)]
    pub fn is_float(self) -> bool {
        self.row() == Row::Float
    }

    #[inline(always)]
    pub fn is_string(self) -> bool {
        self.row() == Row::Str
    }

    #[inline(always)]
    pub fn is_sequence(self) -> bool {
        self.row() == Row::Seq
    }

    #[inline(always)]
    pub fn is_mapping(self) -> bool {
        self.row() == Row::Map
    }

    #[inline(always)]
    pub fn is_indirect(self) -> bool {
        self.row() == Row::Indirect
    }

    /// Whether this value is an alias (indirect with anchor, no value).
    pub fn is_alias(self) -> bool {
        self.is_indirect() && self.kind() == ValueKind::Alias
    }

    /// True iff the word carries no pointer: inline scalars, escape codes,
    /// and the canonical empty collections.
    pub fn is_in_place(self) -> bool {
        match self.0 & TYPE_MASK {
            TAG_INT_INLINE | TAG_FLOAT_INLINE | TAG_STR_INLINE => true,
            TAG_INDIRECT => self.0 & MAP_BIT != 0, // escape codes
            TAG_COLLECTION => self.record_addr() == 0,
            _ => false,
        }
    }

    // =========================================================================
    // In-place constructors
    // =========================================================================

    pub fn from_bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    /// Pack an integer into the word, if it fits the inline range.
    pub fn from_inline_int(v: i64) -> Option<Self> {
        if (INLINE_INT_MIN..=INLINE_INT_MAX).contains(&v) {
            Some(Self(((v as usize) << 3) | TAG_INT_INLINE))
        } else {
            None
        }
    }

    /// Pack a float into the word. Only doubles that survive the f32
    /// round-trip pack, and only on 64-bit targets; the inline form holds
    /// single precision.
    pub fn from_inline_float(v: f64) -> Option<Self> {
        #[cfg(target_pointer_width = "64")]
        {
            let narrow = v as f32;
            if f64::from(narrow) == v {
                let bits = (narrow.to_bits() as usize) << 32;
                return Some(Self(bits | TAG_FLOAT_INLINE));
            }
        }
        let _ = v;
        None
    }

    /// Pack a short byte string (≤ [`INLINE_STR_MAX`]) into the word.
    pub fn from_inline_str(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > INLINE_STR_MAX {
            return None;
        }
        let mut word = TAG_STR_INLINE | (bytes.len() << 4);
        for (i, &b) in bytes.iter().enumerate() {
            word |= (b as usize) << (8 + 8 * i);
        }
        Some(Self(word))
    }

    // =========================================================================
    // Pointer constructors (builder-side)
    // =========================================================================

    #[inline]
    fn tagged_ptr(ptr: NonNull<u8>, tag: usize, align: usize) -> Self {
        let addr = ptr.as_ptr() as usize;
        debug_assert_eq!(addr % align, 0, "record pointer misaligned for tag");
        Self(addr | tag)
    }

    pub(crate) fn int_record(ptr: NonNull<u8>) -> Self {
        Self::tagged_ptr(ptr, TAG_INT_PTR, 8)
    }

    pub(crate) fn float_record(ptr: NonNull<u8>) -> Self {
        Self::tagged_ptr(ptr, TAG_FLOAT_PTR, 8)
    }

    pub(crate) fn string_record(ptr: NonNull<u8>) -> Self {
        Self::tagged_ptr(ptr, TAG_STR_PTR, 8)
    }

    pub(crate) fn sequence_record(ptr: NonNull<u8>) -> Self {
        Self::tagged_ptr(ptr, TAG_COLLECTION, 16)
    }

    pub(crate) fn mapping_record(ptr: NonNull<u8>) -> Self {
        Self::tagged_ptr(ptr, TAG_COLLECTION | MAP_BIT, 16)
    }

    pub(crate) fn indirect_record(ptr: NonNull<u8>) -> Self {
        Self::tagged_ptr(ptr, TAG_INDIRECT, 16)
    }

    // =========================================================================
    // Scalar accessors
    // =========================================================================

    /// Integer value, truncated to i64. For unsigned-range-extended records
    /// this wraps; use [`PackedValue::as_wide_int_nocheck`] for the exact
    /// numeric value.
    pub fn as_int_nocheck(self) -> i64 {
        debug_assert!(self.is_int(), "as_int_nocheck on non-int");
        if self.0 & TYPE_MASK == TAG_INT_INLINE {
            (self.0 as isize >> 3) as i64
        } else {
            self.int_record_nocheck().0 as i64
        }
    }

    /// Exact numeric value of an integer, widened so the unsigned range
    /// extension never overflows.
    pub fn as_wide_int_nocheck(self) -> i128 {
        debug_assert!(self.is_int(), "as_wide_int_nocheck on non-int");
        if self.0 & TYPE_MASK == TAG_INT_INLINE {
            (self.0 as isize >> 3) as i128
        } else {
            let (bits, ext) = self.int_record_nocheck();
            if ext {
                bits as i128
            } else {
                bits as i64 as i128
            }
        }
    }

    /// Whether this integer carries the unsigned-range-extend flag.
    pub fn is_unsigned_range(self) -> bool {
        self.is_int() && self.0 & TYPE_MASK == TAG_INT_PTR && self.int_record_nocheck().1
    }

    fn int_record_nocheck(self) -> (u64, bool) {
        // Record layout: { bits: u64, unsigned_ext: u64 }, align 8.
        let ptr = self.record_addr() as *const u64;
        unsafe { (*ptr, *ptr.add(1) != 0) }
    }

    pub fn as_float_nocheck(self) -> f64 {
        debug_assert!(self.is_float(), "as_float_nocheck on non-float");
        // Inline floats only exist on 64-bit targets.
        #[cfg(target_pointer_width = "64")]
        if self.0 & TYPE_MASK == TAG_FLOAT_INLINE {
            return f64::from(f32::from_bits((self.0 >> 32) as u32));
        }
        unsafe { *(self.record_addr() as *const f64) }
    }

    pub fn as_bool_nocheck(self) -> bool {
        debug_assert!(self.is_bool(), "as_bool_nocheck on non-bool");
        self.0 == ESCAPE_TRUE
    }

    /// Decoded string bytes. Inline bytes are copied out of the word; arena
    /// strings borrow the record.
    pub fn as_str_nocheck(&self) -> StrView<'_> {
        debug_assert!(self.is_string(), "as_str_nocheck on non-string");
        if self.0 & TYPE_MASK == TAG_STR_INLINE {
            let len = (self.0 >> 4) & 0x7;
            let mut short = [0u8; 8];
            for (i, slot) in short.iter_mut().enumerate().take(len) {
                *slot = (self.0 >> (8 + 8 * i)) as u8;
            }
            StrView {
                short,
                short_len: len as u8,
                long: None,
            }
        } else {
            let base = self.record_addr() as *const u8;
            // Record layout: varint length, bytes, trailing NUL. The length
            // is authoritative; the NUL exists for C interop only.
            unsafe {
                let head = std::slice::from_raw_parts(base, varint::MAX_ENCODED_LEN);
                let (len, prefix) = varint::decode_nocheck(head);
                StrView {
                    short: [0; 8],
                    short_len: 0,
                    long: Some(std::slice::from_raw_parts(base.add(prefix), len)),
                }
            }
        }
    }

    /// Byte length of a string value.
    pub fn string_size_nocheck(&self) -> usize {
        self.as_str_nocheck().len()
    }

    // =========================================================================
    // Collection accessors
    // =========================================================================

    /// Zero-copy view of a sequence's items. The canonical empty word yields
    /// an empty slice without dereferencing.
    pub fn sequence_items(&self) -> &[PackedValue] {
        debug_assert!(self.is_sequence(), "sequence_items on non-sequence");
        let addr = self.record_addr();
        if addr == 0 {
            return &[];
        }
        unsafe {
            let count = *(addr as *const usize);
            std::slice::from_raw_parts((addr + WORD) as *const PackedValue, count)
        }
    }

    /// Zero-copy view of a mapping's pairs, in insertion order.
    pub fn mapping_pairs(&self) -> &[Pair] {
        debug_assert!(self.is_mapping(), "mapping_pairs on non-mapping");
        let addr = self.record_addr();
        if addr == 0 {
            return &[];
        }
        unsafe {
            let count = *(addr as *const usize);
            std::slice::from_raw_parts((addr + WORD) as *const Pair, count)
        }
    }

    /// Linear-scan key lookup. Returns [`PackedValue::INVALID`] when the key
    /// is absent or `self` is not a mapping.
    pub fn mapping_get(self, key: PackedValue) -> PackedValue {
        if !self.is_mapping() {
            return Self::INVALID;
        }
        for pair in self.mapping_pairs() {
            if compare(pair.key, key) == Some(Ordering::Equal) {
                return pair.value;
            }
        }
        Self::INVALID
    }

    /// Convenience lookup by string key.
    pub fn mapping_get_str(self, key: &str) -> PackedValue {
        if !self.is_mapping() {
            return Self::INVALID;
        }
        for pair in self.mapping_pairs() {
            if pair.key.is_string() && pair.key.as_str_nocheck().as_bytes() == key.as_bytes() {
                return pair.value;
            }
        }
        Self::INVALID
    }

    // =========================================================================
    // Indirect accessors
    // =========================================================================

    /// Materialize an indirect decorator, filling absent fields with
    /// [`PackedValue::INVALID`].
    pub fn indirect_nocheck(self) -> Indirect {
        debug_assert!(self.is_indirect(), "indirect_nocheck on non-indirect");
        let addr = self.record_addr();
        unsafe {
            let flag_word = *(addr as *const usize);
            let flags = IndirectFlags::from_bits_truncate(flag_word);
            let style = NodeStyle::from_code(((flag_word & STYLE_MASK) >> STYLE_SHIFT) as u8);
            let mut field = (addr + WORD) as *const PackedValue;
            let mut next = || {
                let v = *field;
                field = field.add(1);
                v
            };
            Indirect {
                style,
                value: if flags.contains(IndirectFlags::HAS_VALUE) {
                    next()
                } else {
                    Self::INVALID
                },
                anchor: if flags.contains(IndirectFlags::HAS_ANCHOR) {
                    next()
                } else {
                    Self::INVALID
                },
                tag: if flags.contains(IndirectFlags::HAS_TAG) {
                    next()
                } else {
                    Self::INVALID
                },
            }
        }
    }
}

// ============================================================================
// String view
// ============================================================================

/// Borrowed view of a string value's bytes.
///
/// Inline strings are copied out of the word (at most [`INLINE_STR_MAX`]
/// bytes); out-of-place strings borrow the arena record.
#[derive(Clone, Copy)]
pub struct StrView<'a> {
    short: [u8; 8],
    short_len: u8,
    long: Option<&'a [u8]>,
}

impl<'a> StrView<'a> {
    pub fn as_bytes(&self) -> &[u8] {
        match self.long {
            Some(bytes) => bytes,
            None => &self.short[..self.short_len as usize],
        }
    }

    /// Strict UTF-8 view, `None` for binary content.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Lossy UTF-8 view for display and event text.
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for StrView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Knobs for logical comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// Treat mappings as equal when they hold the same key set with equal
    /// values regardless of insertion order. The default is strict
    /// order-sensitive equality because mapping order is preserved.
    pub unordered_mappings: bool,
}

fn kind_rank(kind: ValueKind) -> u8 {
    match kind {
        ValueKind::Null => 0,
        ValueKind::Bool => 1,
        ValueKind::Int => 2,
        ValueKind::Float => 3,
        ValueKind::String => 4,
        ValueKind::Sequence => 5,
        ValueKind::Mapping => 6,
        ValueKind::Alias => 7,
        ValueKind::Indirect => 8,
        ValueKind::Invalid => u8::MAX,
    }
}

/// Total-order comparison under default options.
///
/// Returns `None` (the "invalid" sentinel) when either side is Invalid;
/// `Some(Equal)` is logical equality. Word equality short-circuits, the
/// property dedup-internalized values rely on.
pub fn compare(a: PackedValue, b: PackedValue) -> Option<Ordering> {
    compare_with(a, b, CompareOptions::default())
}

pub fn compare_with(a: PackedValue, b: PackedValue, opts: CompareOptions) -> Option<Ordering> {
    if a.is_invalid() || b.is_invalid() {
        return None;
    }
    if a == b {
        return Some(Ordering::Equal);
    }

    let (ka, kb) = (a.kind(), b.kind());
    let rank_cmp = kind_rank(ka).cmp(&kind_rank(kb));
    if rank_cmp != Ordering::Equal {
        return Some(rank_cmp);
    }

    let (da, ua) = strip_decoration(a);
    let (db, ub) = strip_decoration(b);

    let body = match ka {
        ValueKind::Null => Ordering::Equal,
        ValueKind::Bool => ua.as_bool_nocheck().cmp(&ub.as_bool_nocheck()),
        ValueKind::Int => ua.as_wide_int_nocheck().cmp(&ub.as_wide_int_nocheck()),
        ValueKind::Float => ua.as_float_nocheck().total_cmp(&ub.as_float_nocheck()),
        ValueKind::String => ua
            .as_str_nocheck()
            .as_bytes()
            .cmp(ub.as_str_nocheck().as_bytes()),
        ValueKind::Sequence => compare_sequences(ua, ub, opts)?,
        ValueKind::Mapping => compare_mappings(ua, ub, opts)?,
        ValueKind::Alias => {
            compare_optional(da.map(|d| d.anchor), db.map(|d| d.anchor), opts)?
        }
        ValueKind::Indirect => {
            // Doubly wrapped values: compare the inner indirect words.
            compare_optional(da.map(|d| d.value), db.map(|d| d.value), opts)?
        }
        ValueKind::Invalid => return None,
    };
    if body != Ordering::Equal {
        return Some(body);
    }

    // Equal underlying values: decorations break the tie so a decorated
    // node never compares equal to a plain one (they serialize differently).
    Some(compare_decorations(da, db, opts)?)
}

/// Split a possibly indirect value into its decoration and underlying value.
fn strip_decoration(v: PackedValue) -> (Option<Indirect>, PackedValue) {
    if v.raw_kind() == ValueKind::Indirect {
        let ind = v.indirect_nocheck();
        let under = ind.value;
        (Some(ind), under)
    } else {
        (None, v)
    }
}

fn compare_sequences(
    a: PackedValue,
    b: PackedValue,
    opts: CompareOptions,
) -> Option<Ordering> {
    let (ia, ib) = (a.sequence_items(), b.sequence_items());
    for (x, y) in ia.iter().zip(ib.iter()) {
        match compare_with(*x, *y, opts)? {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(ia.len().cmp(&ib.len()))
}

fn compare_mappings(a: PackedValue, b: PackedValue, opts: CompareOptions) -> Option<Ordering> {
    let (pa, pb) = (a.mapping_pairs(), b.mapping_pairs());
    if opts.unordered_mappings && pa.len() == pb.len() {
        let mut all_found = true;
        for pair in pa {
            let other = b.mapping_get(pair.key);
            if other.is_invalid()
                || compare_with(pair.value, other, opts)? != Ordering::Equal
            {
                all_found = false;
                break;
            }
        }
        if all_found {
            return Some(Ordering::Equal);
        }
        // Not set-equal: fall through to the order-sensitive walk so the
        // result is still a total order.
    }
    for (x, y) in pa.iter().zip(pb.iter()) {
        match compare_with(x.key, y.key, opts)? {
            Ordering::Equal => {}
            other => return Some(other),
        }
        match compare_with(x.value, y.value, opts)? {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(pa.len().cmp(&pb.len()))
}

/// Compare optional decoration fields; absent sorts before present.
fn compare_optional(
    a: Option<PackedValue>,
    b: Option<PackedValue>,
    opts: CompareOptions,
) -> Option<Ordering> {
    match (normalize_absent(a), normalize_absent(b)) {
        (None, None) => Some(Ordering::Equal),
        (None, Some(_)) => Some(Ordering::Less),
        (Some(_), None) => Some(Ordering::Greater),
        (Some(x), Some(y)) => compare_with(x, y, opts),
    }
}

fn normalize_absent(v: Option<PackedValue>) -> Option<PackedValue> {
    v.filter(|v| !v.is_invalid())
}

fn compare_decorations(
    a: Option<Indirect>,
    b: Option<Indirect>,
    opts: CompareOptions,
) -> Option<Ordering> {
    match (&a, &b) {
        (None, None) => return Some(Ordering::Equal),
        (None, Some(_)) => return Some(Ordering::Less),
        (Some(_), None) => return Some(Ordering::Greater),
        _ => {}
    }
    let (da, db) = (a?, b?);
    match compare_optional(Some(da.anchor), Some(db.anchor), opts)? {
        Ordering::Equal => {}
        other => return Some(other),
    }
    match compare_optional(Some(da.tag), Some(db.tag), opts)? {
        Ordering::Equal => {}
        other => return Some(other),
    }
    Some(da.style.cmp(&db.style))
}

// ============================================================================
// Relocation
// ============================================================================

/// Rewrite every pointer of `v` lying in `[start, end)` by `delta`, walking
/// into child words stored in the *destination* records. Used after moving
/// an arena block; the caller has already copied the bytes.
///
/// In-place values and pointers outside the range pass through unchanged.
///
/// # Safety
/// The destination region (`[start + delta, end + delta)`) must hold a
/// byte-for-byte copy of the source block, be writable, and contain every
/// record reachable from `v` whose pointer lies in the range.
pub unsafe fn relocate(
    start: *const u8,
    end: *const u8,
    v: PackedValue,
    delta: isize,
) -> PackedValue {
    if v.is_in_place() {
        return v;
    }
    let addr = v.record_addr();
    if addr < start as usize || addr >= end as usize {
        return v;
    }
    let new_addr = (addr as isize + delta) as usize;
    let tag_bits = v.0 - addr;

    unsafe {
        match v.row() {
            Row::Seq | Row::Map => {
                let count = *(new_addr as *const usize);
                let words = match v.row() {
                    Row::Seq => count,
                    _ => count * 2,
                };
                let items = (new_addr + WORD) as *mut PackedValue;
                for i in 0..words {
                    let slot = items.add(i);
                    *slot = relocate(start, end, *slot, delta);
                }
            }
            Row::Indirect => {
                let flag_word = *(new_addr as *const usize);
                let flags = IndirectFlags::from_bits_truncate(flag_word);
                let fields = flags.bits().count_ones() as usize;
                let items = (new_addr + WORD) as *mut PackedValue;
                for i in 0..fields {
                    let slot = items.add(i);
                    *slot = relocate(start, end, *slot, delta);
                }
            }
            // Scalar records hold no child pointers.
            Row::Int | Row::Float | Row::Str | Row::Escape => {}
        }
    }

    PackedValue(new_addr | tag_bits)
}

// ============================================================================
// Debug
// ============================================================================

impl Default for PackedValue {
    /// The sentinel: absent fields and unfilled argument slots default to
    /// Invalid, never to a well-formed value.
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Debug for PackedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.raw_kind() {
            ValueKind::Invalid => write!(f, "Invalid"),
            ValueKind::Null => write!(f, "Null"),
            ValueKind::Bool => write!(f, "Bool({})", self.as_bool_nocheck()),
            ValueKind::Int => write!(f, "Int({})", self.as_wide_int_nocheck()),
            ValueKind::Float => write!(f, "Float({})", self.as_float_nocheck()),
            ValueKind::String => write!(f, "String({:?})", self.as_str_nocheck()),
            ValueKind::Sequence => write!(f, "Sequence[{}]", self.sequence_items().len()),
            ValueKind::Mapping => write!(f, "Mapping[{}]", self.mapping_pairs().len()),
            ValueKind::Indirect | ValueKind::Alias => {
                write!(f, "Indirect(0x{:x})", self.record_addr())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_value_size() {
        assert_eq!(size_of::<PackedValue>(), size_of::<usize>());
        assert_eq!(align_of::<PackedValue>(), align_of::<usize>());
    }

    #[test]
    fn test_escape_codes() {
        assert!(PackedValue::NULL.is_null());
        assert!(PackedValue::TRUE.is_bool());
        assert!(PackedValue::FALSE.is_bool());
        assert!(PackedValue::INVALID.is_invalid());

        assert!(PackedValue::TRUE.as_bool_nocheck());
        assert!(!PackedValue::FALSE.as_bool_nocheck());

        // All escapes sit on the 1111 dispatch row and are in-place.
        for v in [PackedValue::NULL, PackedValue::TRUE, PackedValue::FALSE] {
            assert_eq!(v.to_bits() & DISPATCH_MASK, 0b1111);
            assert!(v.is_in_place());
        }
        assert_eq!(PackedValue::INVALID.to_bits(), usize::MAX);
    }

    #[test]
    fn test_inline_int_encoding() {
        let v = PackedValue::from_inline_int(42).unwrap();
        assert!(v.is_int());
        assert!(v.is_in_place());
        assert_eq!(v.to_bits() & 0b111, 0b001);
        assert_eq!(v.as_int_nocheck(), 42);

        let v = PackedValue::from_inline_int(-42).unwrap();
        assert_eq!(v.as_int_nocheck(), -42);

        let v = PackedValue::from_inline_int(0).unwrap();
        assert_eq!(v.as_int_nocheck(), 0);
    }

    #[test]
    fn test_inline_int_range_boundaries() {
        let v = PackedValue::from_inline_int(INLINE_INT_MAX).unwrap();
        assert_eq!(v.as_int_nocheck(), INLINE_INT_MAX);

        let v = PackedValue::from_inline_int(INLINE_INT_MIN).unwrap();
        assert_eq!(v.as_int_nocheck(), INLINE_INT_MIN);

        assert!(PackedValue::from_inline_int(INLINE_INT_MAX + 1).is_none());
        assert!(PackedValue::from_inline_int(INLINE_INT_MIN - 1).is_none());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_inline_float_encoding() {
        let v = PackedValue::from_inline_float(2.5).unwrap();
        assert!(v.is_float());
        assert!(v.is_in_place());
        assert_eq!(v.to_bits() & 0b111, 0b011);
        assert_eq!(v.as_float_nocheck(), 2.5);

        let v = PackedValue::from_inline_float(-0.0).unwrap();
        assert_eq!(v.as_float_nocheck().to_bits(), (-0.0f64).to_bits());

        // Infinities survive the f32 round-trip.
        let v = PackedValue::from_inline_float(f64::INFINITY).unwrap();
        assert!(v.as_float_nocheck().is_infinite());

        // A double with f64-only precision does not pack.
        assert!(PackedValue::from_inline_float(std::f64::consts::PI).is_none());
        // NaN never packs (the round-trip compare fails on purpose).
        assert!(PackedValue::from_inline_float(f64::NAN).is_none());
    }

    #[test]
    fn test_inline_string_encoding() {
        let v = PackedValue::from_inline_str(b"hi").unwrap();
        assert!(v.is_string());
        assert!(v.is_in_place());
        assert_eq!(v.to_bits() & 0b111, 0b101);
        assert_eq!(v.as_str_nocheck().as_bytes(), b"hi");
        assert_eq!(v.string_size_nocheck(), 2);

        // Empty string is inline, never out-of-place.
        let v = PackedValue::from_inline_str(b"").unwrap();
        assert!(v.is_in_place());
        assert!(v.as_str_nocheck().is_empty());

        let longest = &b"abcdefg"[..INLINE_STR_MAX];
        let v = PackedValue::from_inline_str(longest).unwrap();
        assert_eq!(v.as_str_nocheck().as_bytes(), longest);

        assert!(PackedValue::from_inline_str(b"too long for a word").is_none());
    }

    #[test]
    fn test_inline_canonicality() {
        // Two constructions of the same in-place value are word-equal.
        assert_eq!(
            PackedValue::from_inline_int(7).unwrap(),
            PackedValue::from_inline_int(7).unwrap()
        );
        assert_eq!(
            PackedValue::from_inline_str(b"abc").unwrap(),
            PackedValue::from_inline_str(b"abc").unwrap()
        );
        assert_eq!(PackedValue::from_bool(true), PackedValue::TRUE);
    }

    #[test]
    fn test_empty_collections() {
        let s = PackedValue::EMPTY_SEQUENCE;
        assert!(s.is_sequence());
        assert!(s.is_in_place());
        assert!(s.sequence_items().is_empty());
        assert_eq!(s.to_bits(), 0);

        let m = PackedValue::EMPTY_MAPPING;
        assert!(m.is_mapping());
        assert!(m.is_in_place());
        assert!(m.mapping_pairs().is_empty());
        assert_eq!(m.to_bits(), 0b1000);

        assert_eq!(m.mapping_get(PackedValue::NULL), PackedValue::INVALID);
    }

    #[test]
    fn test_dispatch_rows() {
        assert_eq!(PackedValue::EMPTY_SEQUENCE.kind(), ValueKind::Sequence);
        assert_eq!(PackedValue::EMPTY_MAPPING.kind(), ValueKind::Mapping);
        assert_eq!(PackedValue::NULL.kind(), ValueKind::Null);
        assert_eq!(PackedValue::TRUE.kind(), ValueKind::Bool);
        assert_eq!(PackedValue::INVALID.kind(), ValueKind::Invalid);
        assert_eq!(
            PackedValue::from_inline_int(1).unwrap().kind(),
            ValueKind::Int
        );
        assert_eq!(
            PackedValue::from_inline_str(b"x").unwrap().kind(),
            ValueKind::String
        );
    }

    #[test]
    fn test_compare_in_place_scalars() {
        let one = PackedValue::from_inline_int(1).unwrap();
        let two = PackedValue::from_inline_int(2).unwrap();
        assert_eq!(compare(one, two), Some(Ordering::Less));
        assert_eq!(compare(two, one), Some(Ordering::Greater));
        assert_eq!(compare(one, one), Some(Ordering::Equal));

        let a = PackedValue::from_inline_str(b"aa").unwrap();
        let b = PackedValue::from_inline_str(b"ab").unwrap();
        assert_eq!(compare(a, b), Some(Ordering::Less));

        // Kind rank orders across kinds.
        assert_eq!(compare(PackedValue::NULL, one), Some(Ordering::Less));
        assert_eq!(compare(one, a), Some(Ordering::Less));
    }

    #[test]
    fn test_compare_invalid_sentinel() {
        let one = PackedValue::from_inline_int(1).unwrap();
        assert_eq!(compare(PackedValue::INVALID, one), None);
        assert_eq!(compare(one, PackedValue::INVALID), None);
        // Even Invalid vs Invalid is the sentinel, not equality.
        assert_eq!(compare(PackedValue::INVALID, PackedValue::INVALID), None);
    }

    #[test]
    fn test_node_style_codes() {
        for style in [
            NodeStyle::Any,
            NodeStyle::Plain,
            NodeStyle::SingleQuoted,
            NodeStyle::DoubleQuoted,
            NodeStyle::Literal,
            NodeStyle::Folded,
            NodeStyle::Block,
            NodeStyle::Flow,
        ] {
            assert_eq!(NodeStyle::from_code(style.code()), style);
        }
        assert_eq!(NodeStyle::from_code(0xE), NodeStyle::Any);
    }

    #[test]
    fn test_compare_out_of_place_content() {
        use crate::builder::ValueBuilder;

        let a = ValueBuilder::auto(0);
        let b = ValueBuilder::auto(1);
        let x = a.string("content equality across arenas!");
        let y = b.string("content equality across arenas!");
        assert_ne!(x, y); // different arenas, different words
        assert_eq!(compare(x, y), Some(Ordering::Equal));

        let wide = a.uint(u64::MAX);
        let signed = a.int(i64::MAX);
        assert_eq!(compare(signed, wide), Some(Ordering::Less));
    }

    #[test]
    fn test_compare_collections_elementwise() {
        use crate::builder::ValueBuilder;

        let gb = ValueBuilder::auto(0);
        let a = gb.sequence(&[gb.int(1), gb.int(2)]);
        let b = gb.sequence(&[gb.int(1), gb.int(3)]);
        let c = gb.sequence(&[gb.int(1)]);
        assert_eq!(compare(a, b), Some(Ordering::Less));
        assert_eq!(compare(b, a), Some(Ordering::Greater));
        // Prefix orders before the longer sequence.
        assert_eq!(compare(c, a), Some(Ordering::Less));
    }

    #[test]
    fn test_mapping_compare_order_sensitivity() {
        use crate::builder::ValueBuilder;

        let gb = ValueBuilder::auto(0);
        let ab = gb.mapping(&[
            Pair { key: gb.string("a"), value: gb.int(1) },
            Pair { key: gb.string("b"), value: gb.int(2) },
        ]);
        let ba = gb.mapping(&[
            Pair { key: gb.string("b"), value: gb.int(2) },
            Pair { key: gb.string("a"), value: gb.int(1) },
        ]);

        // Default: insertion order is part of the value.
        assert_ne!(compare(ab, ba), Some(Ordering::Equal));

        // Key-order-insensitive mode sees the same set.
        let opts = CompareOptions { unordered_mappings: true };
        assert_eq!(compare_with(ab, ba, opts), Some(Ordering::Equal));

        let other = gb.mapping(&[
            Pair { key: gb.string("b"), value: gb.int(9) },
            Pair { key: gb.string("a"), value: gb.int(1) },
        ]);
        assert_ne!(compare_with(ab, other, opts), Some(Ordering::Equal));
    }

    #[test]
    fn test_decorated_never_equals_plain() {
        use crate::builder::ValueBuilder;

        let gb = ValueBuilder::auto(0);
        let plain = gb.int(7);
        let decorated = gb.indirect(Indirect {
            value: gb.int(7),
            anchor: gb.string("a"),
            ..Indirect::default()
        });
        // Same underlying number, different event streams.
        assert_ne!(compare(plain, decorated), Some(Ordering::Equal));
        // But the decorated value still classifies as Int.
        assert_eq!(decorated.kind(), ValueKind::Int);
    }

    #[test]
    fn test_relocate_moved_block() {
        use crate::builder::{BuilderConfig, ValueBuilder};
        use yon_core::arena::{ArenaBackend, FixedArena};

        let src = FixedArena::with_capacity(0, 4096);
        let src_base = src.base_ptr();
        let cap = src.capacity();
        let gb = ValueBuilder::from_backend(Box::new(src), BuilderConfig::default());

        let anchored = gb.indirect(Indirect {
            value: gb.string("an anchored string that lives out of place"),
            anchor: gb.string("long-enough-anchor"),
            ..Indirect::default()
        });
        let root = gb.sequence(&[
            gb.string("a long string that lives out of place"),
            gb.int(5),
            gb.mapping(&[Pair { key: gb.string("key"), value: gb.int(i64::MAX) }]),
            anchored,
        ]);

        // Move the whole block into a second aligned buffer.
        let mut dst = FixedArena::with_capacity(1, 4096);
        let dst_base = dst.alloc(cap, 16).unwrap().as_ptr();
        unsafe { std::ptr::copy_nonoverlapping(src_base, dst_base, cap) };
        let delta = dst_base as isize - src_base as isize;

        let moved =
            unsafe { relocate(src_base, src_base.wrapping_add(cap), root, delta) };

        // The root pointer shifted by exactly delta; content is unchanged.
        assert_eq!(moved.to_bits() as isize - root.to_bits() as isize, delta);
        assert_eq!(compare(moved, root), Some(Ordering::Equal));

        let items = moved.sequence_items();
        assert_eq!(
            items[0].as_str_nocheck().as_bytes(),
            b"a long string that lives out of place"
        );
        // In-place values pass through untouched.
        assert_eq!(items[1], root.sequence_items()[1]);
        assert_eq!(items[2].mapping_get_str("key").as_int_nocheck(), i64::MAX);
        let ind = items[3].indirect_nocheck();
        assert_eq!(
            ind.anchor.as_str_nocheck().as_bytes(),
            b"long-enough-anchor"
        );

        // A word pointing outside the moved range is left alone.
        let other = ValueBuilder::auto(2);
        let outside = other.string("outside the relocated region!");
        let same = unsafe { relocate(src_base, src_base.wrapping_add(cap), outside, delta) };
        assert_eq!(same, outside);
    }

    #[test]
    fn test_indirect_flag_word() {
        let ind = Indirect {
            style: NodeStyle::DoubleQuoted,
            value: PackedValue::from_inline_int(1).unwrap(),
            anchor: PackedValue::from_inline_str(b"a").unwrap(),
            tag: PackedValue::INVALID,
        };
        let word = ind.flag_word();
        let flags = IndirectFlags::from_bits_truncate(word);
        assert!(flags.contains(IndirectFlags::HAS_VALUE));
        assert!(flags.contains(IndirectFlags::HAS_ANCHOR));
        assert!(!flags.contains(IndirectFlags::HAS_TAG));
        assert_eq!(
            NodeStyle::from_code(((word & STYLE_MASK) >> STYLE_SHIFT) as u8),
            NodeStyle::DoubleQuoted
        );
        assert!(!ind.is_alias());

        let alias = Indirect {
            anchor: PackedValue::from_inline_str(b"a").unwrap(),
            ..Indirect::default()
        };
        assert!(alias.is_alias());
    }
}
