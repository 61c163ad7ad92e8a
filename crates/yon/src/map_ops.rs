//! Mapping operations
//!
//! Mappings preserve insertion order, and every operation here respects it:
//! `assoc` updates a key in place of its original position, `append` adds a
//! pair at the end, `keys`/`values`/`items` enumerate in stored order.
//!
//! As with sequences, mappings are immutable; mutators return new values and
//! bad input yields [`PackedValue::INVALID`].

use crate::builder::ValueBuilder;
use crate::packed::{PackedValue, Pair, compare_with};
use crate::scalar::cast;
use std::cmp::Ordering;

fn pairs_of(map: PackedValue) -> Option<Vec<Pair>> {
    let map = map.resolved();
    if !map.is_mapping() {
        return None;
    }
    Some(map.mapping_pairs().to_vec())
}

/// Key equality under the builder's configured comparison options.
fn key_eq(gb: &ValueBuilder<'_>, a: PackedValue, b: PackedValue) -> bool {
    compare_with(a, b, gb.compare_options()) == Some(Ordering::Equal)
}

/// Value stored under `key`, or Invalid when absent.
pub fn get(map: PackedValue, key: PackedValue) -> PackedValue {
    map.resolved().mapping_get(key)
}

/// Whether `key` is present.
pub fn contains(map: PackedValue, key: PackedValue) -> bool {
    !get(map, key).is_invalid()
}

/// Value of the `index`-th pair (sequences index their items instead).
pub fn get_at(v: PackedValue, index: usize) -> PackedValue {
    let v = v.resolved();
    if v.is_sequence() {
        return crate::seq_ops::get_at(v, index);
    }
    if !v.is_mapping() {
        return PackedValue::INVALID;
    }
    v.mapping_pairs()
        .get(index)
        .map(|p| p.value)
        .unwrap_or(PackedValue::INVALID)
}

/// New mapping with `key` set to `value`. An existing key keeps its
/// position; a new key appends.
pub fn assoc(
    gb: &ValueBuilder<'_>,
    map: PackedValue,
    key: PackedValue,
    value: PackedValue,
) -> PackedValue {
    if key.is_invalid() || value.is_invalid() {
        return PackedValue::INVALID;
    }
    let Some(mut pairs) = pairs_of(map) else {
        return PackedValue::INVALID;
    };
    match pairs.iter_mut().find(|p| key_eq(gb, p.key, key)) {
        Some(pair) => pair.value = value,
        None => pairs.push(Pair { key, value }),
    }
    gb.mapping(&pairs)
}

/// New mapping without `key`. Removing an absent key is the identity.
pub fn disassoc(gb: &ValueBuilder<'_>, map: PackedValue, key: PackedValue) -> PackedValue {
    let Some(mut pairs) = pairs_of(map) else {
        return PackedValue::INVALID;
    };
    pairs.retain(|p| !key_eq(gb, p.key, key));
    gb.mapping(&pairs)
}

/// New mapping with an existing key's value replaced. Unlike [`assoc`] an
/// absent key is an error.
pub fn set_value(
    gb: &ValueBuilder<'_>,
    map: PackedValue,
    key: PackedValue,
    value: PackedValue,
) -> PackedValue {
    let Some(pairs) = pairs_of(map) else {
        return PackedValue::INVALID;
    };
    if !pairs.iter().any(|p| key_eq(gb, p.key, key)) {
        return PackedValue::INVALID;
    }
    assoc(gb, map, key, value)
}

/// New mapping with the pair blindly appended, even when the key already
/// exists (duplicate-key rejection applies if the builder asks for it).
pub fn append(
    gb: &ValueBuilder<'_>,
    map: PackedValue,
    key: PackedValue,
    value: PackedValue,
) -> PackedValue {
    if key.is_invalid() || value.is_invalid() {
        return PackedValue::INVALID;
    }
    let Some(mut pairs) = pairs_of(map) else {
        return PackedValue::INVALID;
    };
    pairs.push(Pair { key, value });
    gb.mapping(&pairs)
}

/// Keys as a sequence, in insertion order.
pub fn keys(gb: &ValueBuilder<'_>, map: PackedValue) -> PackedValue {
    let Some(pairs) = pairs_of(map) else {
        return PackedValue::INVALID;
    };
    let keys: Vec<PackedValue> = pairs.iter().map(|p| p.key).collect();
    gb.sequence(&keys)
}

/// Values as a sequence, in insertion order.
pub fn values(gb: &ValueBuilder<'_>, map: PackedValue) -> PackedValue {
    let Some(pairs) = pairs_of(map) else {
        return PackedValue::INVALID;
    };
    let values: Vec<PackedValue> = pairs.iter().map(|p| p.value).collect();
    gb.sequence(&values)
}

/// Pairs as a sequence of two-item `[key, value]` sequences.
pub fn items(gb: &ValueBuilder<'_>, map: PackedValue) -> PackedValue {
    let Some(pairs) = pairs_of(map) else {
        return PackedValue::INVALID;
    };
    let mut out = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let item = gb.sequence(&[pair.key, pair.value]);
        if item.is_invalid() {
            return PackedValue::INVALID;
        }
        out.push(item);
    }
    gb.sequence(&out)
}

/// Right-biased merge: pairs of `b` override equal keys of `a`, new keys of
/// `b` append in their own order.
pub fn merge(gb: &ValueBuilder<'_>, a: PackedValue, b: PackedValue) -> PackedValue {
    let Some(overlay) = pairs_of(b) else {
        return PackedValue::INVALID;
    };
    let mut merged = a;
    for pair in overlay {
        merged = assoc(gb, merged, pair.key, pair.value);
        if merged.is_invalid() {
            return PackedValue::INVALID;
        }
    }
    merged
}

/// Walk a path of mapping keys and sequence indices from `root`.
pub fn get_at_path(root: PackedValue, path: &[PackedValue]) -> PackedValue {
    let mut at = root;
    for step in path {
        let here = at.resolved();
        at = if here.is_mapping() {
            here.mapping_get(*step)
        } else if here.is_sequence() {
            let index = cast::<i64>(*step, -1);
            if index < 0 {
                return PackedValue::INVALID;
            }
            crate::seq_ops::get_at(here, index as usize)
        } else {
            return PackedValue::INVALID;
        };
        if at.is_invalid() {
            return PackedValue::INVALID;
        }
    }
    at
}

/// Rebuild `root` with the value at `path` replaced. Mapping steps create
/// missing keys (nested mappings spring into place); sequence indices must
/// be in range.
pub fn set_at_path(
    gb: &ValueBuilder<'_>,
    root: PackedValue,
    path: &[PackedValue],
    value: PackedValue,
) -> PackedValue {
    if value.is_invalid() {
        return PackedValue::INVALID;
    }
    let Some((step, rest)) = path.split_first() else {
        return value;
    };
    let here = root.resolved();
    if here.is_mapping() {
        let child = {
            let existing = here.mapping_get(*step);
            if existing.is_invalid() {
                PackedValue::EMPTY_MAPPING
            } else {
                existing
            }
        };
        let rebuilt = set_at_path(gb, child, rest, value);
        if rebuilt.is_invalid() {
            return PackedValue::INVALID;
        }
        assoc(gb, here, *step, rebuilt)
    } else if here.is_sequence() {
        let index = cast::<i64>(*step, -1);
        if index < 0 {
            return PackedValue::INVALID;
        }
        let child = crate::seq_ops::get_at(here, index as usize);
        if child.is_invalid() {
            return PackedValue::INVALID;
        }
        let rebuilt = set_at_path(gb, child, rest, value);
        if rebuilt.is_invalid() {
            return PackedValue::INVALID;
        }
        crate::seq_ops::replace(gb, here, index as usize, rebuilt)
    } else {
        PackedValue::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc(gb: &ValueBuilder<'_>) -> PackedValue {
        gb.mapping(&[
            Pair { key: gb.string("a"), value: gb.int(1) },
            Pair { key: gb.string("b"), value: gb.int(2) },
            Pair { key: gb.string("c"), value: gb.int(3) },
        ])
    }

    fn key_names(map: PackedValue) -> Vec<String> {
        map.mapping_pairs()
            .iter()
            .map(|p| p.key.as_str_nocheck().to_str_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_get_and_contains() {
        let gb = ValueBuilder::auto(0);
        let map = abc(&gb);
        assert_eq!(get(map, gb.string("b")).as_int_nocheck(), 2);
        assert!(get(map, gb.string("d")).is_invalid());
        assert!(contains(map, gb.string("a")));
        assert!(!contains(map, gb.string("z")));
        assert!(get(gb.int(0), gb.string("a")).is_invalid());
    }

    #[test]
    fn test_assoc_keeps_position_of_existing_key() {
        let gb = ValueBuilder::auto(0);
        let map = abc(&gb);

        let updated = assoc(&gb, map, gb.string("b"), gb.int(20));
        assert_eq!(key_names(updated), ["a", "b", "c"]);
        assert_eq!(get(updated, gb.string("b")).as_int_nocheck(), 20);

        let extended = assoc(&gb, map, gb.string("d"), gb.int(4));
        assert_eq!(key_names(extended), ["a", "b", "c", "d"]);

        // The original mapping is untouched.
        assert_eq!(get(map, gb.string("b")).as_int_nocheck(), 2);
    }

    #[test]
    fn test_disassoc_and_set_value() {
        let gb = ValueBuilder::auto(0);
        let map = abc(&gb);

        let smaller = disassoc(&gb, map, gb.string("b"));
        assert_eq!(key_names(smaller), ["a", "c"]);
        // Absent key: identity content.
        let same = disassoc(&gb, map, gb.string("z"));
        assert_eq!(key_names(same), ["a", "b", "c"]);

        let set = set_value(&gb, map, gb.string("c"), gb.int(30));
        assert_eq!(get(set, gb.string("c")).as_int_nocheck(), 30);
        assert!(set_value(&gb, map, gb.string("z"), gb.int(0)).is_invalid());
    }

    #[test]
    fn test_keys_values_items() {
        let gb = ValueBuilder::auto(0);
        let map = abc(&gb);

        assert_eq!(
            keys(&gb, map)
                .sequence_items()
                .iter()
                .map(|k| k.as_str_nocheck().to_str_lossy().into_owned())
                .collect::<Vec<_>>(),
            ["a", "b", "c"]
        );
        assert_eq!(
            values(&gb, map)
                .sequence_items()
                .iter()
                .map(|v| v.as_int_nocheck())
                .collect::<Vec<_>>(),
            [1, 2, 3]
        );

        let pairs = items(&gb, map);
        let second = pairs.sequence_items()[1];
        assert_eq!(second.sequence_items()[0].as_str_nocheck().as_bytes(), b"b");
        assert_eq!(second.sequence_items()[1].as_int_nocheck(), 2);
    }

    #[test]
    fn test_merge_right_bias() {
        let gb = ValueBuilder::auto(0);
        let base = abc(&gb);
        let overlay = gb.mapping(&[
            Pair { key: gb.string("b"), value: gb.int(20) },
            Pair { key: gb.string("d"), value: gb.int(4) },
        ]);
        let merged = merge(&gb, base, overlay);
        assert_eq!(key_names(merged), ["a", "b", "c", "d"]);
        assert_eq!(get(merged, gb.string("b")).as_int_nocheck(), 20);
        assert_eq!(get(merged, gb.string("a")).as_int_nocheck(), 1);
    }

    #[test]
    fn test_paths() {
        let gb = ValueBuilder::auto(0);
        let inner = gb.sequence(&[gb.int(10), gb.int(20)]);
        let mid = gb.mapping(&[Pair { key: gb.string("list"), value: inner }]);
        let root = gb.mapping(&[Pair { key: gb.string("outer"), value: mid }]);

        let path = [gb.string("outer"), gb.string("list"), gb.int(1)];
        assert_eq!(get_at_path(root, &path).as_int_nocheck(), 20);
        assert!(get_at_path(root, &[gb.string("missing")]).is_invalid());

        let updated = set_at_path(&gb, root, &path, gb.int(99));
        assert_eq!(get_at_path(updated, &path).as_int_nocheck(), 99);
        // Siblings survive the rebuild.
        let sibling = [gb.string("outer"), gb.string("list"), gb.int(0)];
        assert_eq!(get_at_path(updated, &sibling).as_int_nocheck(), 10);

        // Mapping steps create missing keys.
        let fresh = set_at_path(
            &gb,
            PackedValue::EMPTY_MAPPING,
            &[gb.string("x"), gb.string("y")],
            gb.int(1),
        );
        assert_eq!(
            get_at_path(fresh, &[gb.string("x"), gb.string("y")]).as_int_nocheck(),
            1
        );
    }

    #[test]
    fn test_key_matching_honours_builder_comparison_config() {
        use crate::builder::BuilderConfig;

        let gb = ValueBuilder::with_config(
            0,
            BuilderConfig {
                key_order_insensitive: true,
                ..BuilderConfig::default()
            },
        );
        let k_ab = gb.mapping(&[
            Pair { key: gb.string("x"), value: gb.int(1) },
            Pair { key: gb.string("y"), value: gb.int(2) },
        ]);
        let k_ba = gb.mapping(&[
            Pair { key: gb.string("y"), value: gb.int(2) },
            Pair { key: gb.string("x"), value: gb.int(1) },
        ]);
        let map = gb.mapping(&[Pair { key: k_ab, value: gb.int(10) }]);

        // The reordered key matches the stored one: update, not append.
        let updated = assoc(&gb, map, k_ba, gb.int(20));
        assert_eq!(updated.mapping_pairs().len(), 1);
        assert_eq!(updated.mapping_pairs()[0].value.as_int_nocheck(), 20);

        let removed = disassoc(&gb, map, k_ba);
        assert!(removed.mapping_pairs().is_empty());

        // An order-sensitive builder treats it as a different key.
        let strict = ValueBuilder::auto(1);
        let grown = assoc(&strict, map, k_ba, gb.int(20));
        assert_eq!(grown.mapping_pairs().len(), 2);
    }

    #[test]
    fn test_append_allows_duplicates_without_rejection() {
        let gb = ValueBuilder::auto(0);
        let map = abc(&gb);
        let appended = append(&gb, map, gb.string("a"), gb.int(9));
        assert_eq!(appended.mapping_pairs().len(), 4);
        // Lookup still finds the first occurrence.
        assert_eq!(get(appended, gb.string("a")).as_int_nocheck(), 1);
    }
}
