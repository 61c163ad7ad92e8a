//! Sequence operations
//!
//! Collections are immutable: every mutator builds a modified copy through
//! the builder and returns a new value. Bad input (wrong kind, out-of-range
//! index, Invalid anywhere) comes back as [`PackedValue::INVALID`]; nothing
//! here panics on data.
//!
//! Operations resolve one level of indirect wrapping on their collection
//! argument, the same resolution kind classification applies.

use crate::builder::ValueBuilder;
use crate::packed::{PackedValue, compare};
use std::cmp::Ordering;

/// Item at `index`, or Invalid when out of range.
pub fn get_at(seq: PackedValue, index: usize) -> PackedValue {
    let seq = seq.resolved();
    if !seq.is_sequence() {
        return PackedValue::INVALID;
    }
    seq.sequence_items()
        .get(index)
        .copied()
        .unwrap_or(PackedValue::INVALID)
}

/// Whether any item compares equal to `needle`.
pub fn contains(seq: PackedValue, needle: PackedValue) -> bool {
    let seq = seq.resolved();
    seq.is_sequence()
        && seq
            .sequence_items()
            .iter()
            .any(|item| compare(*item, needle) == Some(Ordering::Equal))
}

fn items_of(seq: PackedValue) -> Option<Vec<PackedValue>> {
    let seq = seq.resolved();
    if !seq.is_sequence() {
        return None;
    }
    Some(seq.sequence_items().to_vec())
}

/// New sequence with `item` inserted at `index` (`index == len` appends).
pub fn insert(
    gb: &ValueBuilder<'_>,
    seq: PackedValue,
    index: usize,
    item: PackedValue,
) -> PackedValue {
    if item.is_invalid() {
        return PackedValue::INVALID;
    }
    let Some(mut items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    if index > items.len() {
        return PackedValue::INVALID;
    }
    items.insert(index, item);
    gb.sequence(&items)
}

/// New sequence with the item at `index` replaced.
pub fn replace(
    gb: &ValueBuilder<'_>,
    seq: PackedValue,
    index: usize,
    item: PackedValue,
) -> PackedValue {
    if item.is_invalid() {
        return PackedValue::INVALID;
    }
    let Some(mut items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    let Some(slot) = items.get_mut(index) else {
        return PackedValue::INVALID;
    };
    *slot = item;
    gb.sequence(&items)
}

/// New sequence with `item` appended.
pub fn append(gb: &ValueBuilder<'_>, seq: PackedValue, item: PackedValue) -> PackedValue {
    let Some(items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    insert(gb, seq, items.len(), item)
}

/// New sequence without the item at `index`.
pub fn remove(gb: &ValueBuilder<'_>, seq: PackedValue, index: usize) -> PackedValue {
    let Some(mut items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    if index >= items.len() {
        return PackedValue::INVALID;
    }
    items.remove(index);
    gb.sequence(&items)
}

/// Concatenation of two sequences.
pub fn concat(gb: &ValueBuilder<'_>, a: PackedValue, b: PackedValue) -> PackedValue {
    let (Some(mut items), Some(tail)) = (items_of(a), items_of(b)) else {
        return PackedValue::INVALID;
    };
    items.extend(tail);
    gb.sequence(&items)
}

/// Items in reverse order.
pub fn reverse(gb: &ValueBuilder<'_>, seq: PackedValue) -> PackedValue {
    let Some(mut items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    items.reverse();
    gb.sequence(&items)
}

/// First occurrence of each distinct item, in encounter order.
pub fn unique(gb: &ValueBuilder<'_>, seq: PackedValue) -> PackedValue {
    let Some(items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    let mut kept: Vec<PackedValue> = Vec::with_capacity(items.len());
    for item in items {
        if item.is_invalid() {
            return PackedValue::INVALID;
        }
        if !kept
            .iter()
            .any(|k| compare(*k, item) == Some(Ordering::Equal))
        {
            kept.push(item);
        }
    }
    gb.sequence(&kept)
}

/// Items sorted by the total value order (stable).
pub fn sort(gb: &ValueBuilder<'_>, seq: PackedValue) -> PackedValue {
    let Some(mut items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    if items.iter().any(|v| v.is_invalid()) {
        return PackedValue::INVALID;
    }
    // No Invalid items survive the check above, so compare is total here.
    items.sort_by(|a, b| compare(*a, *b).unwrap_or(Ordering::Equal));
    gb.sequence(&items)
}

/// Items for which `pred` holds.
pub fn filter(
    gb: &ValueBuilder<'_>,
    seq: PackedValue,
    pred: &mut dyn FnMut(PackedValue) -> bool,
) -> PackedValue {
    let Some(items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    let kept: Vec<PackedValue> = items.into_iter().filter(|v| pred(*v)).collect();
    gb.sequence(&kept)
}

/// Transform every item; an Invalid result poisons the whole sequence.
pub fn map(
    gb: &ValueBuilder<'_>,
    seq: PackedValue,
    f: &mut dyn FnMut(&ValueBuilder<'_>, PackedValue) -> PackedValue,
) -> PackedValue {
    let Some(items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let mapped = f(gb, item);
        if mapped.is_invalid() {
            return PackedValue::INVALID;
        }
        out.push(mapped);
    }
    gb.sequence(&out)
}

/// Left fold over the items starting from `init`.
pub fn reduce(
    gb: &ValueBuilder<'_>,
    seq: PackedValue,
    init: PackedValue,
    f: &mut dyn FnMut(&ValueBuilder<'_>, PackedValue, PackedValue) -> PackedValue,
) -> PackedValue {
    let Some(items) = items_of(seq) else {
        return PackedValue::INVALID;
    };
    let mut acc = init;
    for item in items {
        acc = f(gb, acc, item);
        if acc.is_invalid() {
            return PackedValue::INVALID;
        }
    }
    acc
}
