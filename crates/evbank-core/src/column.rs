//! Typed column values and the time-rebase watermark.
//!
//! A [`ColumnData`] is one field's array for one chunk (or, on the read
//! side, for any concatenation of blocks). The element type is carried in
//! the enum variant; the bank layer persists it via [`DType`] so columns
//! round-trip without schema guesswork.

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Element type of a column, fixed for the lifetime of a field.
///
/// Serialized into the bank index as a short lowercase tag (`"i64"`,
/// `"f32"`, ...), so index files stay human-inspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Boolean, stored as one byte per value.
    Bool,
}

impl DType {
    /// Size of one element in the bank's little-endian encoding.
    pub fn byte_width(&self) -> usize {
        match self {
            DType::I8 | DType::U8 | DType::Bool => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Whether values of this type can be shifted on the time axis.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, DType::Bool)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::Bool => "bool",
        };
        f.write_str(tag)
    }
}

/// Errors produced when decoding or rewriting column values.
#[derive(Debug, Snafu)]
pub enum ColumnError {
    /// The raw byte length is not a multiple of the element width.
    #[snafu(display(
        "Raw data length {len} is not a multiple of {width} (element width of {dtype})"
    ))]
    RaggedBytes {
        /// Element type being decoded.
        dtype: DType,
        /// Width of one element in bytes.
        width: usize,
        /// Offending byte length.
        len: usize,
    },

    /// A time rebase was requested on a non-numeric column.
    #[snafu(display("Cannot rebase a {dtype} column on the time axis"))]
    NotNumeric {
        /// Element type of the offending column.
        dtype: DType,
    },
}

/// Running scalar used to stitch per-chunk-local timestamps into one
/// globally increasing timeline.
///
/// The watermark is one past the last normalized timestamp emitted so far.
/// It starts at integer zero and adopts the time column's numeric domain on
/// the first rebase, so integer timelines never take a detour through
/// floating point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Watermark {
    /// Watermark over an integer time column.
    Int(i128),
    /// Watermark over a floating-point time column.
    Float(f64),
}

impl Watermark {
    /// The initial watermark of a fresh consolidation run.
    pub const ZERO: Watermark = Watermark::Int(0);

    fn as_i128(self) -> i128 {
        match self {
            Watermark::Int(v) => v,
            Watermark::Float(v) => v as i128,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Watermark::Int(v) => v as f64,
            Watermark::Float(v) => v,
        }
    }
}

/// One field's values for one chunk, or a concatenation of stored blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Signed 8-bit values.
    I8(Vec<i8>),
    /// Signed 16-bit values.
    I16(Vec<i16>),
    /// Signed 32-bit values.
    I32(Vec<i32>),
    /// Signed 64-bit values.
    I64(Vec<i64>),
    /// Unsigned 8-bit values.
    U8(Vec<u8>),
    /// Unsigned 16-bit values.
    U16(Vec<u16>),
    /// Unsigned 32-bit values.
    U32(Vec<u32>),
    /// Unsigned 64-bit values.
    U64(Vec<u64>),
    /// 32-bit float values.
    F32(Vec<f32>),
    /// 64-bit float values.
    F64(Vec<f64>),
    /// Boolean values.
    Bool(Vec<bool>),
}

macro_rules! for_each_variant {
    ($self:expr, $values:ident => $body:expr) => {
        match $self {
            ColumnData::I8($values) => $body,
            ColumnData::I16($values) => $body,
            ColumnData::I32($values) => $body,
            ColumnData::I64($values) => $body,
            ColumnData::U8($values) => $body,
            ColumnData::U16($values) => $body,
            ColumnData::U32($values) => $body,
            ColumnData::U64($values) => $body,
            ColumnData::F32($values) => $body,
            ColumnData::F64($values) => $body,
            ColumnData::Bool($values) => $body,
        }
    };
}

impl ColumnData {
    /// An empty column of the given element type.
    pub fn empty(dtype: DType) -> ColumnData {
        match dtype {
            DType::I8 => ColumnData::I8(Vec::new()),
            DType::I16 => ColumnData::I16(Vec::new()),
            DType::I32 => ColumnData::I32(Vec::new()),
            DType::I64 => ColumnData::I64(Vec::new()),
            DType::U8 => ColumnData::U8(Vec::new()),
            DType::U16 => ColumnData::U16(Vec::new()),
            DType::U32 => ColumnData::U32(Vec::new()),
            DType::U64 => ColumnData::U64(Vec::new()),
            DType::F32 => ColumnData::F32(Vec::new()),
            DType::F64 => ColumnData::F64(Vec::new()),
            DType::Bool => ColumnData::Bool(Vec::new()),
        }
    }

    /// Element type of this column.
    pub fn dtype(&self) -> DType {
        match self {
            ColumnData::I8(_) => DType::I8,
            ColumnData::I16(_) => DType::I16,
            ColumnData::I32(_) => DType::I32,
            ColumnData::I64(_) => DType::I64,
            ColumnData::U8(_) => DType::U8,
            ColumnData::U16(_) => DType::U16,
            ColumnData::U32(_) => DType::U32,
            ColumnData::U64(_) => DType::U64,
            ColumnData::F32(_) => DType::F32,
            ColumnData::F64(_) => DType::F64,
            ColumnData::Bool(_) => DType::Bool,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        for_each_variant!(self, values => values.len())
    }

    /// Whether the column holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode the values as little-endian bytes (booleans as `0`/`1`).
    pub fn to_le_bytes(&self) -> Vec<u8> {
        macro_rules! encode {
            ($values:expr) => {{
                let mut out = Vec::with_capacity($values.len() * self.dtype().byte_width());
                for v in $values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                out
            }};
        }
        match self {
            ColumnData::I8(values) => encode!(values),
            ColumnData::I16(values) => encode!(values),
            ColumnData::I32(values) => encode!(values),
            ColumnData::I64(values) => encode!(values),
            ColumnData::U8(values) => values.clone(),
            ColumnData::U16(values) => encode!(values),
            ColumnData::U32(values) => encode!(values),
            ColumnData::U64(values) => encode!(values),
            ColumnData::F32(values) => encode!(values),
            ColumnData::F64(values) => encode!(values),
            ColumnData::Bool(values) => values.iter().map(|v| *v as u8).collect(),
        }
    }

    /// Decode a column from the bank's little-endian encoding.
    pub fn from_le_bytes(dtype: DType, raw: &[u8]) -> Result<ColumnData, ColumnError> {
        let width = dtype.byte_width();
        ensure!(
            raw.len() % width == 0,
            RaggedBytesSnafu {
                dtype,
                width,
                len: raw.len()
            }
        );

        macro_rules! decode {
            ($ty:ty, $variant:ident) => {
                ColumnData::$variant(
                    raw.chunks_exact(width)
                        .map(|c| {
                            let mut buf = [0u8; std::mem::size_of::<$ty>()];
                            buf.copy_from_slice(c);
                            <$ty>::from_le_bytes(buf)
                        })
                        .collect(),
                )
            };
        }
        Ok(match dtype {
            DType::I8 => decode!(i8, I8),
            DType::I16 => decode!(i16, I16),
            DType::I32 => decode!(i32, I32),
            DType::I64 => decode!(i64, I64),
            DType::U8 => ColumnData::U8(raw.to_vec()),
            DType::U16 => decode!(u16, U16),
            DType::U32 => decode!(u32, U32),
            DType::U64 => decode!(u64, U64),
            DType::F32 => decode!(f32, F32),
            DType::F64 => decode!(f64, F64),
            DType::Bool => ColumnData::Bool(raw.iter().map(|b| *b != 0).collect()),
        })
    }

    /// Rewrite the column in place as a continuation of `offset`: subtract
    /// the column's own first element, then add the running offset.
    ///
    /// Returns the updated watermark, one unit (in the column's native
    /// element type) past the last rewritten value. A zero-length column is
    /// left untouched and returns `None` so the caller keeps its current
    /// offset. Integer arithmetic runs through `i128` and wraps back into
    /// the native type, matching the source data's fixed-width semantics.
    pub fn rebase(&mut self, offset: Watermark) -> Result<Option<Watermark>, ColumnError> {
        if self.is_empty() {
            return Ok(None);
        }

        macro_rules! rebase_int {
            ($values:expr, $ty:ty) => {{
                let first = $values[0] as i128;
                let off = offset.as_i128();
                let mut last = off;
                for v in $values.iter_mut() {
                    last = (*v as i128) - first + off;
                    *v = last as $ty;
                }
                Ok(Some(Watermark::Int(last + 1)))
            }};
        }
        macro_rules! rebase_float {
            ($values:expr, $ty:ty) => {{
                let first = $values[0];
                let off = offset.as_f64() as $ty;
                let mut last = off;
                for v in $values.iter_mut() {
                    last = *v - first + off;
                    *v = last;
                }
                Ok(Some(Watermark::Float(last as f64 + 1.0)))
            }};
        }
        match self {
            ColumnData::I8(values) => rebase_int!(values, i8),
            ColumnData::I16(values) => rebase_int!(values, i16),
            ColumnData::I32(values) => rebase_int!(values, i32),
            ColumnData::I64(values) => rebase_int!(values, i64),
            ColumnData::U8(values) => rebase_int!(values, u8),
            ColumnData::U16(values) => rebase_int!(values, u16),
            ColumnData::U32(values) => rebase_int!(values, u32),
            ColumnData::U64(values) => rebase_int!(values, u64),
            ColumnData::F32(values) => rebase_float!(values, f32),
            ColumnData::F64(values) => rebase_float!(values, f64),
            ColumnData::Bool(_) => NotNumericSnafu { dtype: DType::Bool }.fail(),
        }
    }

    /// Render every value as a display string, in order.
    ///
    /// Used by inspection tooling; not a serialization format.
    pub fn values_to_strings(&self) -> Vec<String> {
        for_each_variant!(self, values => values.iter().map(|v| v.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_bytes_roundtrip_all_dtypes() -> Result<(), ColumnError> {
        let cases = vec![
            ColumnData::I8(vec![-1, 0, 127]),
            ColumnData::I16(vec![-300, 42]),
            ColumnData::I32(vec![1, -2, 3]),
            ColumnData::I64(vec![i64::MIN, 0, i64::MAX]),
            ColumnData::U8(vec![0, 255]),
            ColumnData::U16(vec![65535, 1]),
            ColumnData::U32(vec![7]),
            ColumnData::U64(vec![u64::MAX]),
            ColumnData::F32(vec![1.5, -2.25]),
            ColumnData::F64(vec![0.0, 3.141_592_653_589_793]),
            ColumnData::Bool(vec![true, false, true]),
        ];

        for column in cases {
            let raw = column.to_le_bytes();
            assert_eq!(raw.len(), column.len() * column.dtype().byte_width());
            let back = ColumnData::from_le_bytes(column.dtype(), &raw)?;
            assert_eq!(back, column);
        }
        Ok(())
    }

    #[test]
    fn from_le_bytes_rejects_ragged_input() {
        let err = ColumnData::from_le_bytes(DType::I32, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ColumnError::RaggedBytes { len: 3, .. }));
    }

    #[test]
    fn rebase_integer_column_continues_timeline() -> Result<(), ColumnError> {
        // First chunk starts its own timeline at zero.
        let mut t1 = ColumnData::I64(vec![100, 101, 102]);
        let w = t1.rebase(Watermark::ZERO)?.expect("non-empty");
        assert_eq!(t1, ColumnData::I64(vec![0, 1, 2]));
        assert_eq!(w, Watermark::Int(3));

        // Second chunk restarts at zero locally but lands after the first.
        let mut t2 = ColumnData::I64(vec![0, 1, 2]);
        let w = t2.rebase(w)?.expect("non-empty");
        assert_eq!(t2, ColumnData::I64(vec![3, 4, 5]));
        assert_eq!(w, Watermark::Int(6));
        Ok(())
    }

    #[test]
    fn rebase_float_column_uses_native_unit_gap() -> Result<(), ColumnError> {
        let mut t1 = ColumnData::F64(vec![0.0, 0.01, 0.02]);
        let w = t1.rebase(Watermark::ZERO)?.expect("non-empty");
        assert_eq!(w, Watermark::Float(1.02));

        let mut t2 = ColumnData::F64(vec![5.0, 5.01]);
        let w2 = t2.rebase(w)?.expect("non-empty");
        assert_eq!(t2, ColumnData::F64(vec![1.02, 1.03]));
        assert_eq!(w2, Watermark::Float(2.03));
        Ok(())
    }

    #[test]
    fn rebase_empty_column_keeps_offset() -> Result<(), ColumnError> {
        let mut t = ColumnData::I64(Vec::new());
        assert_eq!(t.rebase(Watermark::Int(17))?, None);
        assert_eq!(t, ColumnData::I64(Vec::new()));
        Ok(())
    }

    #[test]
    fn rebase_bool_column_is_rejected() {
        let mut p = ColumnData::Bool(vec![true]);
        let err = p.rebase(Watermark::ZERO).unwrap_err();
        assert!(matches!(err, ColumnError::NotNumeric { dtype: DType::Bool }));
    }

    #[test]
    fn dtype_tags_are_stable() {
        assert_eq!(DType::I64.to_string(), "i64");
        assert_eq!(DType::Bool.to_string(), "bool");
        assert_eq!(serde_json::to_string(&DType::F32).unwrap(), "\"f32\"");
    }
}
