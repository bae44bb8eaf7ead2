//! Host transfers.

use ndbind_core::element::{decode_le, encode_le};
use ndbind_core::{DType, Element, NdError, Result};

use crate::array::NdArray;

impl NdArray {
    /// Overwrite the contents with `data`, which must match the element
    /// count and dtype exactly.
    pub fn set<T: Element>(&self, data: &[T]) -> Result<()> {
        let dtype = self.dtype()?;
        if T::DTYPE != dtype {
            return Err(NdError::TypeMismatch {
                expected: dtype,
                actual: T::DTYPE,
            });
        }
        self.set_bytes(&encode_le(data))
    }

    /// Overwrite the contents with raw little-endian bytes.
    pub fn set_bytes(&self, bytes: &[u8]) -> Result<()> {
        let (size, dtype) = (self.size()?, self.dtype()?);
        if bytes.len() != dtype.storage_bytes(size) {
            return Err(NdError::invalid(format!(
                "{} bytes cannot fill {size} elements of {dtype}",
                bytes.len()
            )));
        }
        self.lib().sync_copy_from_cpu(self.handle()?, bytes, size)?;
        self.mark_ready();
        Ok(())
    }

    /// A fresh little-endian copy of the contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (size, dtype) = (self.size()?, self.dtype()?);
        let mut out = vec![0u8; dtype.storage_bytes(size)];
        self.lib().sync_copy_to_cpu(self.handle()?, &mut out, size)?;
        self.mark_ready();
        Ok(out)
    }

    /// Contents as `T`, which must be the array's dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let actual = self.dtype()?;
        if actual != T::DTYPE {
            return Err(NdError::TypeMismatch {
                expected: T::DTYPE,
                actual,
            });
        }
        Ok(decode_le(&self.to_bytes()?))
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        self.to_vec()
    }

    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        self.to_vec()
    }

    pub fn to_i32_vec(&self) -> Result<Vec<i32>> {
        self.to_vec()
    }

    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        self.to_vec()
    }

    pub fn to_u8_vec(&self) -> Result<Vec<u8>> {
        self.to_vec()
    }

    /// Contents widened to `f64` whatever the dtype.
    pub fn to_f64_lossy(&self) -> Result<Vec<f64>> {
        let dtype = self.dtype()?;
        if dtype == DType::F64 {
            return self.to_f64_vec();
        }
        let bytes = self.to_bytes()?;
        Ok(bytes
            .chunks_exact(dtype.element_size())
            .map(|raw| ndbind_core::element::read_as_f64(dtype, raw))
            .collect())
    }
}
