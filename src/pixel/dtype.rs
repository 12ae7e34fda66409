use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::LoadError;
use crate::store::{ArrayData, DataType};

/// Element types a renderer buffer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelDtype {
    Uint8,
    Uint16,
    Uint32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl PixelDtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelDtype::Uint8 => "Uint8",
            PixelDtype::Uint16 => "Uint16",
            PixelDtype::Uint32 => "Uint32",
            PixelDtype::Int8 => "Int8",
            PixelDtype::Int16 => "Int16",
            PixelDtype::Int32 => "Int32",
            PixelDtype::Float32 => "Float32",
            PixelDtype::Float64 => "Float64",
        }
    }

    pub fn bytes_per_element(&self) -> usize {
        match self {
            PixelDtype::Uint8 | PixelDtype::Int8 => 1,
            PixelDtype::Uint16 | PixelDtype::Int16 => 2,
            PixelDtype::Uint32 | PixelDtype::Int32 | PixelDtype::Float32 => 4,
            PixelDtype::Float64 => 8,
        }
    }
}

/// A typed renderer buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! each_buffer {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            PixelBuffer::Uint8($inner) => $body,
            PixelBuffer::Uint16($inner) => $body,
            PixelBuffer::Uint32($inner) => $body,
            PixelBuffer::Int8($inner) => $body,
            PixelBuffer::Int16($inner) => $body,
            PixelBuffer::Int32($inner) => $body,
            PixelBuffer::Float32($inner) => $body,
            PixelBuffer::Float64($inner) => $body,
        }
    };
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        each_buffer!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> PixelDtype {
        match self {
            PixelBuffer::Uint8(_) => PixelDtype::Uint8,
            PixelBuffer::Uint16(_) => PixelDtype::Uint16,
            PixelBuffer::Uint32(_) => PixelDtype::Uint32,
            PixelBuffer::Int8(_) => PixelDtype::Int8,
            PixelBuffer::Int16(_) => PixelDtype::Int16,
            PixelBuffer::Int32(_) => PixelDtype::Int32,
            PixelBuffer::Float32(_) => PixelDtype::Float32,
            PixelBuffer::Float64(_) => PixelDtype::Float64,
        }
    }

    /// Minimum and maximum, ignoring NaN. `None` when no finite values exist.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        let mut bounds: Option<(f64, f64)> = None;
        each_buffer!(self, v => {
            for value in v.iter().map(|x| *x as f64) {
                if value.is_nan() {
                    continue;
                }
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(value), hi.max(value)),
                    None => (value, value),
                });
            }
        });
        bounds
    }

    /// Little-endian bytes, as served over HTTP.
    pub fn to_le_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len() * self.dtype().bytes_per_element());
        match self {
            PixelBuffer::Uint8(v) => buf.put_slice(v),
            PixelBuffer::Uint16(v) => v.iter().for_each(|x| buf.put_u16_le(*x)),
            PixelBuffer::Uint32(v) => v.iter().for_each(|x| buf.put_u32_le(*x)),
            PixelBuffer::Int8(v) => v.iter().for_each(|x| buf.put_i8(*x)),
            PixelBuffer::Int16(v) => v.iter().for_each(|x| buf.put_i16_le(*x)),
            PixelBuffer::Int32(v) => v.iter().for_each(|x| buf.put_i32_le(*x)),
            PixelBuffer::Float32(v) => v.iter().for_each(|x| buf.put_f32_le(*x)),
            PixelBuffer::Float64(v) => v.iter().for_each(|x| buf.put_f64_le(*x)),
        }
        buf.freeze()
    }
}

/// Converts store elements into renderer buffers.
///
/// 64-bit integers are truncated to `Uint32` (values above `u32::MAX` wrap),
/// `float16` widens to `Float32`, and everything else passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtypeAdapter {
    target: PixelDtype,
}

impl DtypeAdapter {
    /// Choose the adaptation for a store dtype.
    pub fn for_dtype(dtype: &DataType) -> Result<Self, LoadError> {
        let target = match dtype {
            DataType::Int64 | DataType::Uint64 => PixelDtype::Uint32,
            DataType::Float16 => PixelDtype::Float32,
            DataType::Uint8 => PixelDtype::Uint8,
            DataType::Uint16 => PixelDtype::Uint16,
            DataType::Uint32 => PixelDtype::Uint32,
            DataType::Int8 => PixelDtype::Int8,
            DataType::Int16 => PixelDtype::Int16,
            DataType::Int32 => PixelDtype::Int32,
            DataType::Float32 => PixelDtype::Float32,
            DataType::Float64 => PixelDtype::Float64,
            DataType::Other(name) => return Err(LoadError::UnsupportedType(name.clone())),
        };
        Ok(Self { target })
    }

    pub fn target(&self) -> PixelDtype {
        self.target
    }

    /// Convert decoded store data. The output has the same element count.
    pub fn adapt(&self, data: ArrayData) -> PixelBuffer {
        match data {
            ArrayData::Int64(v) => PixelBuffer::Uint32(v.into_iter().map(|x| x as u32).collect()),
            ArrayData::Uint64(v) => PixelBuffer::Uint32(v.into_iter().map(|x| x as u32).collect()),
            ArrayData::Float16(v) => PixelBuffer::Float32(v.into_iter().map(f32::from).collect()),
            ArrayData::Uint8(v) => PixelBuffer::Uint8(v),
            ArrayData::Uint16(v) => PixelBuffer::Uint16(v),
            ArrayData::Uint32(v) => PixelBuffer::Uint32(v),
            ArrayData::Int8(v) => PixelBuffer::Int8(v),
            ArrayData::Int16(v) => PixelBuffer::Int16(v),
            ArrayData::Int32(v) => PixelBuffer::Int32(v),
            ArrayData::Float32(v) => PixelBuffer::Float32(v),
            ArrayData::Float64(v) => PixelBuffer::Float64(v),
        }
    }
}
