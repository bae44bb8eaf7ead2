use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::NdError;

/// Element data types understood by the native engine.
///
/// The discriminants follow the engine's type-flag numbering, which is what
/// crosses the C boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// 16-bit IEEE 754 half-precision float
    F16,
    /// 8-bit unsigned integer
    U8,
    /// 32-bit signed integer
    I32,
    /// 8-bit signed integer
    I8,
    /// 64-bit signed integer
    I64,
    /// Boolean stored as one byte
    Bool,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 | DType::I8 | DType::Bool => 1,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype.
    pub fn storage_bytes(&self, n: usize) -> usize {
        self.element_size() * n
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    /// Whether this dtype is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, DType::U8 | DType::I8 | DType::I32 | DType::I64)
    }

    /// Native type flag.
    pub fn code(&self) -> i32 {
        match self {
            DType::F32 => 0,
            DType::F64 => 1,
            DType::F16 => 2,
            DType::U8 => 3,
            DType::I32 => 4,
            DType::I8 => 5,
            DType::I64 => 6,
            DType::Bool => 7,
        }
    }

    /// Inverse of [`DType::code`].
    pub fn from_code(code: i32) -> Result<Self, NdError> {
        Ok(match code {
            0 => DType::F32,
            1 => DType::F64,
            2 => DType::F16,
            3 => DType::U8,
            4 => DType::I32,
            5 => DType::I8,
            6 => DType::I64,
            7 => DType::Bool,
            other => {
                return Err(NdError::invalid(format!("unknown native dtype code {other}")))
            }
        })
    }

    /// Name used by the native engine in operator parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::F16 => "float16",
            DType::U8 => "uint8",
            DType::I32 => "int32",
            DType::I8 => "int8",
            DType::I64 => "int64",
            DType::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = NdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(DType::F32),
            "float64" | "f64" => Ok(DType::F64),
            "float16" | "f16" => Ok(DType::F16),
            "uint8" | "u8" => Ok(DType::U8),
            "int32" | "i32" => Ok(DType::I32),
            "int8" | "i8" => Ok(DType::I8),
            "int64" | "i64" => Ok(DType::I64),
            "bool" => Ok(DType::Bool),
            _ => Err(NdError::invalid(format!("unknown dtype: {s}"))),
        }
    }
}
