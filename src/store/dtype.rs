use std::fmt;
use std::ops::Range;

use half::f16;

/// Element type of a stored array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
    /// Any non-numeric or unrecognized type (bool, complex, strings, ...)
    Other(String),
}

impl DataType {
    /// Parse a Zarr v3 `data_type` name (`"uint16"`, `"float32"`, ...).
    pub fn from_v3_name(name: &str) -> Self {
        match name {
            "int8" => DataType::Int8,
            "int16" => DataType::Int16,
            "int32" => DataType::Int32,
            "int64" => DataType::Int64,
            "uint8" => DataType::Uint8,
            "uint16" => DataType::Uint16,
            "uint32" => DataType::Uint32,
            "uint64" => DataType::Uint64,
            "float16" => DataType::Float16,
            "float32" => DataType::Float32,
            "float64" => DataType::Float64,
            other => DataType::Other(other.to_string()),
        }
    }

    /// Lowercase name as used by Zarr v3.
    pub fn name(&self) -> &str {
        match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Other(name) => name,
        }
    }

}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded elements in C order, tagged by element type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Uint64(Vec<u64>),
    Float16(Vec<f16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

/// Apply `$body` to the inner vector of every variant, keeping the variant.
macro_rules! map_variants {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            ArrayData::Int8($inner) => ArrayData::Int8($body),
            ArrayData::Int16($inner) => ArrayData::Int16($body),
            ArrayData::Int32($inner) => ArrayData::Int32($body),
            ArrayData::Int64($inner) => ArrayData::Int64($body),
            ArrayData::Uint8($inner) => ArrayData::Uint8($body),
            ArrayData::Uint16($inner) => ArrayData::Uint16($body),
            ArrayData::Uint32($inner) => ArrayData::Uint32($body),
            ArrayData::Uint64($inner) => ArrayData::Uint64($body),
            ArrayData::Float16($inner) => ArrayData::Float16($body),
            ArrayData::Float32($inner) => ArrayData::Float32($body),
            ArrayData::Float64($inner) => ArrayData::Float64($body),
        }
    };
}

macro_rules! with_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            ArrayData::Int8($inner) => $body,
            ArrayData::Int16($inner) => $body,
            ArrayData::Int32($inner) => $body,
            ArrayData::Int64($inner) => $body,
            ArrayData::Uint8($inner) => $body,
            ArrayData::Uint16($inner) => $body,
            ArrayData::Uint32($inner) => $body,
            ArrayData::Uint64($inner) => $body,
            ArrayData::Float16($inner) => $body,
            ArrayData::Float32($inner) => $body,
            ArrayData::Float64($inner) => $body,
        }
    };
}

impl ArrayData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        with_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element type of this data.
    pub fn dtype(&self) -> DataType {
        match self {
            ArrayData::Int8(_) => DataType::Int8,
            ArrayData::Int16(_) => DataType::Int16,
            ArrayData::Int32(_) => DataType::Int32,
            ArrayData::Int64(_) => DataType::Int64,
            ArrayData::Uint8(_) => DataType::Uint8,
            ArrayData::Uint16(_) => DataType::Uint16,
            ArrayData::Uint32(_) => DataType::Uint32,
            ArrayData::Uint64(_) => DataType::Uint64,
            ArrayData::Float16(_) => DataType::Float16,
            ArrayData::Float32(_) => DataType::Float32,
            ArrayData::Float64(_) => DataType::Float64,
        }
    }

    /// Gather the elements inside `ranges` from C-ordered data of `shape`.
    ///
    /// Ranges must already be clamped to `shape` (see
    /// [`resolve_ranges`](super::resolve_ranges)).
    pub fn gather(&self, shape: &[u64], ranges: &[Range<u64>]) -> ArrayData {
        map_variants!(self, v => gather(v, shape, ranges))
    }
}

/// Odometer walk over the selected ranges in C order.
fn gather<T: Copy>(data: &[T], shape: &[u64], ranges: &[Range<u64>]) -> Vec<T> {
    let count: u64 = ranges.iter().map(|r| r.end - r.start).product();
    let mut out = Vec::with_capacity(count as usize);
    if count == 0 {
        return out;
    }

    let rank = shape.len();
    let mut strides = vec![1u64; rank];
    for d in (0..rank.saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }

    let mut index: Vec<u64> = ranges.iter().map(|r| r.start).collect();
    loop {
        let offset: u64 = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(data[offset as usize]);

        let mut d = rank;
        loop {
            if d == 0 {
                return out;
            }
            d -= 1;
            index[d] += 1;
            if index[d] < ranges[d].end {
                break;
            }
            index[d] = ranges[d].start;
        }
    }
}
