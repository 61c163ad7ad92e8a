//! Scalar type dispatch
//!
//! Routes every supported native scalar type to the right encoder pair: an
//! in-place attempt and an out-of-place fallback. The matrix covers the full
//! C integer/float width set so bindings can hand over whatever width they
//! hold without widening rules of their own.
//!
//! The reverse direction, [`FromPacked`], implements the defaulting casts:
//! `cast::<T>(v, d)` yields the value when `v` holds that kind and the value
//! is exactly representable in `T`, and `d` otherwise.

use crate::builder::ValueBuilder;
use crate::packed::PackedValue;

/// A native scalar the builder can encode.
pub trait Scalar: Copy {
    /// Try the in-place word encoding.
    fn pack_in_place(self) -> Option<PackedValue>;

    /// Store the out-of-place record through `gb`.
    fn store_out_of_place(self, gb: &ValueBuilder<'_>) -> PackedValue;
}

macro_rules! impl_signed_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            fn pack_in_place(self) -> Option<PackedValue> {
                PackedValue::from_inline_int(self as i64)
            }

            fn store_out_of_place(self, gb: &ValueBuilder<'_>) -> PackedValue {
                gb.store_int_record(self as i64 as u64, false)
            }
        }
    )*};
}

macro_rules! impl_unsigned_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            fn pack_in_place(self) -> Option<PackedValue> {
                i64::try_from(self)
                    .ok()
                    .and_then(PackedValue::from_inline_int)
            }

            fn store_out_of_place(self, gb: &ValueBuilder<'_>) -> PackedValue {
                let wide = self as u64;
                // Values past signed max carry the unsigned-range-extend flag.
                gb.store_int_record(wide, wide > i64::MAX as u64)
            }
        }
    )*};
}

impl_signed_scalar!(i8, i16, i32, i64, isize);
impl_unsigned_scalar!(u8, u16, u32, u64, usize);

impl Scalar for bool {
    fn pack_in_place(self) -> Option<PackedValue> {
        Some(PackedValue::from_bool(self))
    }

    fn store_out_of_place(self, _gb: &ValueBuilder<'_>) -> PackedValue {
        PackedValue::from_bool(self)
    }
}

impl Scalar for f32 {
    fn pack_in_place(self) -> Option<PackedValue> {
        PackedValue::from_inline_float(f64::from(self))
    }

    fn store_out_of_place(self, gb: &ValueBuilder<'_>) -> PackedValue {
        gb.store_float_record(f64::from(self))
    }
}

impl Scalar for f64 {
    fn pack_in_place(self) -> Option<PackedValue> {
        PackedValue::from_inline_float(self)
    }

    fn store_out_of_place(self, gb: &ValueBuilder<'_>) -> PackedValue {
        gb.store_float_record(self)
    }
}

// ============================================================================
// Casts
// ============================================================================

/// Defaulting extraction of a native scalar from a value.
pub trait FromPacked: Copy {
    /// The value when `v` holds this kind and is exactly representable,
    /// `default` otherwise.
    fn from_packed(v: PackedValue, default: Self) -> Self;
}

/// Coerce a value to a native scalar width, falling back to `default`.
pub fn cast<T: FromPacked>(v: PackedValue, default: T) -> T {
    T::from_packed(v, default)
}

macro_rules! impl_int_cast {
    ($($t:ty),*) => {$(
        impl FromPacked for $t {
            fn from_packed(v: PackedValue, default: Self) -> Self {
                let v = v.resolved();
                if !v.is_int() {
                    return default;
                }
                // Exact range check through the widened form.
                <$t>::try_from(v.as_wide_int_nocheck()).unwrap_or(default)
            }
        }
    )*};
}

impl_int_cast!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromPacked for bool {
    fn from_packed(v: PackedValue, default: Self) -> Self {
        let v = v.resolved();
        if v.is_bool() {
            v.as_bool_nocheck()
        } else {
            default
        }
    }
}

impl FromPacked for f64 {
    fn from_packed(v: PackedValue, default: Self) -> Self {
        let v = v.resolved();
        if v.is_float() {
            v.as_float_nocheck()
        } else {
            default
        }
    }
}

impl FromPacked for f32 {
    fn from_packed(v: PackedValue, default: Self) -> Self {
        let v = v.resolved();
        if !v.is_float() {
            return default;
        }
        let wide = v.as_float_nocheck();
        let narrow = wide as f32;
        // Exactly representable only: precision loss falls back to default.
        if f64::from(narrow) == wide || wide.is_nan() {
            narrow
        } else {
            default
        }
    }
}
