//! Serialization of packed values
//!
//! Provides a serializable representation of the value model for
//! persistence and exchange with external systems.
//!
//! # Why TypedValue?
//!
//! Packed values point into builder arenas and aren't directly
//! serializable. `TypedValue` is an owned mirror that serde/bincode can
//! handle; converting back routes through a builder so the bytes land in an
//! arena again.
//!
//! # Why a pair list instead of a map type?
//!
//! `TypedValue::Mapping` stores pairs in a `Vec` because mapping insertion
//! order is observable and preserved; a hash or tree map would reorder keys
//! and change what the document emits as.
//!
//! # Performance
//!
//! Uses bincode for fast, compact binary serialization.

use crate::builder::ValueBuilder;
use crate::packed::{Indirect, NodeStyle, PackedValue, Pair, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error during serialization/deserialization.
#[derive(Debug)]
pub enum SerializeError {
    /// The Invalid sentinel cannot travel.
    InvalidValue,
    /// Bincode encoding/decoding error (preserves the original error).
    Bincode(Box<bincode::Error>),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue => f.write_str("cannot serialize the Invalid sentinel"),
            Self::Bincode(err) => write!(f, "bincode error: {err}"),
        }
    }
}

impl std::error::Error for SerializeError {}

/// Owned, serializable mirror of the packed value model.
///
/// Strings are carried as UTF-8 text; non-UTF-8 byte content is replaced
/// lossily on conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers past signed max (the unsigned-range extension).
    Uint(u64),
    Float(f64),
    String(String),
    Sequence(Vec<TypedValue>),
    /// Pairs in insertion order.
    Mapping(Vec<(TypedValue, TypedValue)>),
    Indirect {
        style: u8,
        anchor: Option<String>,
        tag: Option<String>,
        value: Option<Box<TypedValue>>,
    },
}

/// Convert a packed value into its owned mirror.
pub fn to_typed(v: PackedValue) -> Result<TypedValue, SerializeError> {
    match v.raw_kind() {
        ValueKind::Invalid => Err(SerializeError::InvalidValue),
        ValueKind::Null => Ok(TypedValue::Null),
        ValueKind::Bool => Ok(TypedValue::Bool(v.as_bool_nocheck())),
        ValueKind::Int => {
            let wide = v.as_wide_int_nocheck();
            match i64::try_from(wide) {
                Ok(narrow) => Ok(TypedValue::Int(narrow)),
                Err(_) => Ok(TypedValue::Uint(wide as u64)),
            }
        }
        ValueKind::Float => Ok(TypedValue::Float(v.as_float_nocheck())),
        ValueKind::String => Ok(TypedValue::String(
            v.as_str_nocheck().to_str_lossy().into_owned(),
        )),
        ValueKind::Sequence => {
            let mut items = Vec::with_capacity(v.sequence_items().len());
            for item in v.sequence_items() {
                items.push(to_typed(*item)?);
            }
            Ok(TypedValue::Sequence(items))
        }
        ValueKind::Mapping => {
            let mut pairs = Vec::with_capacity(v.mapping_pairs().len());
            for pair in v.mapping_pairs() {
                pairs.push((to_typed(pair.key)?, to_typed(pair.value)?));
            }
            Ok(TypedValue::Mapping(pairs))
        }
        ValueKind::Indirect | ValueKind::Alias => {
            let ind = v.indirect_nocheck();
            let text = |field: PackedValue| {
                field
                    .is_string()
                    .then(|| field.as_str_nocheck().to_str_lossy().into_owned())
            };
            Ok(TypedValue::Indirect {
                style: ind.style.code(),
                anchor: text(ind.anchor),
                tag: text(ind.tag),
                value: if ind.has_value() {
                    Some(Box::new(to_typed(ind.value)?))
                } else {
                    None
                },
            })
        }
    }
}

/// Rebuild a packed value from its owned mirror through `gb`.
pub fn from_typed(gb: &ValueBuilder<'_>, tv: &TypedValue) -> PackedValue {
    match tv {
        TypedValue::Null => gb.null(),
        TypedValue::Bool(b) => gb.boolean(*b),
        TypedValue::Int(n) => gb.int(*n),
        TypedValue::Uint(n) => gb.uint(*n),
        TypedValue::Float(f) => gb.float(*f),
        TypedValue::String(s) => gb.string(s),
        TypedValue::Sequence(items) => {
            let mut packed = Vec::with_capacity(items.len());
            for item in items {
                let v = from_typed(gb, item);
                if v.is_invalid() {
                    return PackedValue::INVALID;
                }
                packed.push(v);
            }
            gb.sequence(&packed)
        }
        TypedValue::Mapping(pairs) => {
            let mut packed = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                let key = from_typed(gb, key);
                let value = from_typed(gb, value);
                if key.is_invalid() || value.is_invalid() {
                    return PackedValue::INVALID;
                }
                packed.push(Pair { key, value });
            }
            gb.mapping(&packed)
        }
        TypedValue::Indirect {
            style,
            anchor,
            tag,
            value,
        } => {
            let field = |s: &Option<String>| match s {
                Some(text) => gb.string(text),
                None => PackedValue::INVALID,
            };
            gb.indirect(Indirect {
                style: NodeStyle::from_code(*style),
                value: match value {
                    Some(inner) => {
                        let v = from_typed(gb, inner);
                        if v.is_invalid() {
                            return PackedValue::INVALID;
                        }
                        v
                    }
                    None => PackedValue::INVALID,
                },
                anchor: field(anchor),
                tag: field(tag),
            })
        }
    }
}

/// Serialize a packed value to bincode bytes.
pub fn to_bytes(v: PackedValue) -> Result<Vec<u8>, SerializeError> {
    let typed = to_typed(v)?;
    bincode::serialize(&typed).map_err(|e| SerializeError::Bincode(Box::new(e)))
}

/// Deserialize bincode bytes back into a packed value under `gb`.
pub fn from_bytes(gb: &ValueBuilder<'_>, bytes: &[u8]) -> Result<PackedValue, SerializeError> {
    let typed: TypedValue =
        bincode::deserialize(bytes).map_err(|e| SerializeError::Bincode(Box::new(e)))?;
    Ok(from_typed(gb, &typed))
}
