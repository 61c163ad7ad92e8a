//! Operation framework
//!
//! A single dispatcher over the closed set of value operations. Callers fill
//! an [`OpArgs`] record with the inputs their operation reads and get a
//! value back; data-level problems (wrong kind, missing key, out-of-range
//! index) surface as the Invalid sentinel like everywhere else, while
//! structural misuse (missing callback, missing sink, the external `parse`)
//! is a real error.
//!
//! The `PARALLEL` flag is accepted for compatibility and resolves to
//! sequential execution: builders are single-threaded by contract, so
//! arena-backed inputs cannot fan out.

use crate::builder::ValueBuilder;
use crate::emit::{EmitFlags, Encoder, EventSink};
use crate::error::Error;
use crate::packed::{PackedValue, Pair};
use crate::scalar::cast;
use crate::{map_ops, seq_ops};

/// The closed operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    CreateSeq,
    CreateMap,
    Insert,
    Replace,
    Append,
    Assoc,
    Disassoc,
    Keys,
    Values,
    Items,
    Contains,
    Concat,
    Reverse,
    Merge,
    Unique,
    Sort,
    Filter,
    Map,
    Reduce,
    Get,
    GetAt,
    GetAtPath,
    Set,
    Parse,
    Emit,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpFlags: u32 {
        /// Request parallel execution where applicable. Currently always
        /// resolves to sequential execution.
        const PARALLEL = 1 << 0;
    }
}

/// Per-operation argument record. Fill only what the operation reads.
#[derive(Default)]
pub struct OpArgs<'a> {
    /// Primary collection or value operand.
    pub target: PackedValue,
    /// Secondary collection (`concat`, `merge`).
    pub other: PackedValue,
    pub key: PackedValue,
    pub value: PackedValue,
    pub index: usize,
    /// Items for `create_seq`.
    pub items: &'a [PackedValue],
    /// Pairs for `create_map`.
    pub pairs: &'a [Pair],
    /// Path steps for `get_at_path` / `set`.
    pub path: &'a [PackedValue],
    /// Element callback for `filter` (boolean result) and `map`.
    pub func: Option<&'a mut dyn FnMut(&ValueBuilder<'_>, PackedValue) -> PackedValue>,
    /// Fold callback for `reduce`.
    pub fold: Option<&'a mut dyn FnMut(&ValueBuilder<'_>, PackedValue, PackedValue) -> PackedValue>,
    /// Initial accumulator for `reduce`.
    pub accum: PackedValue,
    /// Event sink for `emit`.
    pub sink: Option<&'a mut dyn EventSink>,
    pub emit_flags: EmitFlags,
}

/// Run one operation against `gb`.
pub fn dispatch(
    gb: &ValueBuilder<'_>,
    op: Op,
    _flags: OpFlags,
    args: OpArgs<'_>,
) -> Result<PackedValue, Error> {
    let OpArgs {
        target,
        other,
        key,
        value,
        index,
        items,
        pairs,
        path,
        func,
        fold,
        accum,
        sink,
        emit_flags,
    } = args;

    let result = match op {
        Op::CreateSeq => gb.sequence(items),
        Op::CreateMap => gb.mapping(pairs),
        Op::Insert => seq_ops::insert(gb, target, index, value),
        Op::Replace => seq_ops::replace(gb, target, index, value),
        Op::Append => {
            if target.resolved().is_mapping() {
                map_ops::append(gb, target, key, value)
            } else {
                seq_ops::append(gb, target, value)
            }
        }
        Op::Assoc => map_ops::assoc(gb, target, key, value),
        Op::Disassoc => map_ops::disassoc(gb, target, key),
        Op::Keys => map_ops::keys(gb, target),
        Op::Values => map_ops::values(gb, target),
        Op::Items => map_ops::items(gb, target),
        Op::Contains => {
            let holder = target.resolved();
            if holder.is_mapping() {
                PackedValue::from_bool(map_ops::contains(target, key))
            } else if holder.is_sequence() {
                PackedValue::from_bool(seq_ops::contains(target, value))
            } else {
                // A non-collection target is a type error, not a "no".
                PackedValue::INVALID
            }
        }
        Op::Concat => seq_ops::concat(gb, target, other),
        Op::Reverse => seq_ops::reverse(gb, target),
        Op::Merge => map_ops::merge(gb, target, other),
        Op::Unique => seq_ops::unique(gb, target),
        Op::Sort => seq_ops::sort(gb, target),
        Op::Filter => {
            let func = func.ok_or(Error::InvalidInput("filter needs a callback"))?;
            seq_ops::filter(gb, target, &mut |v| cast::<bool>(func(gb, v), false))
        }
        Op::Map => {
            let func = func.ok_or(Error::InvalidInput("map needs a callback"))?;
            seq_ops::map(gb, target, func)
        }
        Op::Reduce => {
            let fold = fold.ok_or(Error::InvalidInput("reduce needs a fold callback"))?;
            seq_ops::reduce(gb, target, accum, fold)
        }
        Op::Get => map_ops::get(target, key),
        Op::GetAt => map_ops::get_at(target, index),
        Op::GetAtPath => map_ops::get_at_path(target, path),
        Op::Set => map_ops::set_at_path(gb, target, path, value),
        Op::Parse => {
            return Err(Error::InvalidInput(
                "parsing is handled by the external parser",
            ));
        }
        Op::Emit => {
            let sink = sink.ok_or(Error::InvalidInput("emit needs an event sink"))?;
            let mut encoder = Encoder::new(sink);
            encoder.emit(target, emit_flags)?;
            encoder.sync()?;
            PackedValue::NULL
        }
    };
    Ok(result)
}
