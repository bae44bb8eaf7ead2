//! Host element types that can cross the native boundary.
//!
//! Every host buffer exchanged with the engine is little-endian regardless
//! of the host byte order.

use half::f16;

use crate::DType;

/// A host scalar type with a native `DType` counterpart.
pub trait Element: bytemuck::Pod + Send + Sync + std::fmt::Debug + 'static {
    /// Native dtype this element maps to.
    const DTYPE: DType;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one element from exactly `DTYPE.element_size()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    fn to_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = $dtype;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(v: f64) -> Self {
                    v as $ty
                }
            }
        )*
    };
}

impl_element!(
    f32 => DType::F32,
    f64 => DType::F64,
    u8 => DType::U8,
    i8 => DType::I8,
    i32 => DType::I32,
    i64 => DType::I64,
);

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        f16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    fn from_f64(v: f64) -> Self {
        f16::from_f64(v)
    }
}

/// Encode a slice into little-endian bytes.
pub fn encode_le<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(std::mem::size_of_val(values));
    for &v in values {
        v.write_le(&mut out);
    }
    out
}

/// Decode little-endian bytes into a fresh vector. Trailing partial
/// elements are ignored.
pub fn decode_le<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.element_size())
        .map(T::read_le)
        .collect()
}

/// Decode one element of any dtype into `f64`.
pub fn read_as_f64(dtype: DType, bytes: &[u8]) -> f64 {
    match dtype {
        DType::F32 => f32::read_le(bytes).to_f64(),
        DType::F64 => f64::read_le(bytes),
        DType::F16 => f16::read_le(bytes).to_f64(),
        DType::U8 => bytes[0] as f64,
        DType::I8 => bytes[0] as i8 as f64,
        DType::I32 => i32::read_le(bytes) as f64,
        DType::I64 => i64::read_le(bytes) as f64,
        DType::Bool => (bytes[0] != 0) as u8 as f64,
    }
}

/// Encode an `f64` as one element of any dtype.
pub fn write_from_f64(dtype: DType, v: f64, out: &mut Vec<u8>) {
    match dtype {
        DType::F32 => (v as f32).write_le(out),
        DType::F64 => v.write_le(out),
        DType::F16 => f16::from_f64(v).write_le(out),
        DType::U8 => out.push(v as u8),
        DType::I8 => out.push(v as i8 as u8),
        DType::I32 => (v as i32).write_le(out),
        DType::I64 => (v as i64).write_le(out),
        DType::Bool => out.push((v != 0.0) as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let bytes = encode_le(&[1i32, 256]);
        assert_eq!(bytes, vec![1, 0, 0, 0, 0, 1, 0, 0]);
        assert_eq!(decode_le::<i32>(&bytes), vec![1, 256]);
    }

    #[test]
    fn test_float_values() {
        let values = [1.5f32, -2.25, 0.0];
        assert_eq!(decode_le::<f32>(&encode_le(&values)), values.to_vec());
    }

    #[test]
    fn test_half() {
        let values = [f16::from_f32(0.5), f16::from_f32(-4.0)];
        let bytes = encode_le(&values);
        assert_eq!(bytes.len(), 4);
        assert_eq!(read_as_f64(DType::F16, &bytes[2..4]), -4.0);
    }

    #[test]
    fn test_any_dtype_conversion() {
        for dtype in [DType::F32, DType::F64, DType::F16, DType::I32, DType::I64, DType::U8, DType::I8] {
            let mut out = Vec::new();
            write_from_f64(dtype, 3.0, &mut out);
            assert_eq!(out.len(), dtype.element_size());
            assert_eq!(read_as_f64(dtype, &out), 3.0);
        }
        let mut out = Vec::new();
        write_from_f64(DType::Bool, 2.0, &mut out);
        assert_eq!(out, vec![1]);
    }
}
