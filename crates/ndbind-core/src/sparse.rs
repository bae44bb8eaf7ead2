use std::fmt;

use serde::{Deserialize, Serialize};

use crate::NdError;

/// Storage layout of a native array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseFormat {
    /// Dense row-major storage
    #[default]
    Dense,
    /// Row-sparse: a dense block of selected rows plus a row index
    RowSparse,
    /// Compressed sparse row
    Csr,
}

impl SparseFormat {
    /// Native storage-type code.
    pub fn code(&self) -> i32 {
        match self {
            SparseFormat::Dense => 0,
            SparseFormat::RowSparse => 1,
            SparseFormat::Csr => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, NdError> {
        match code {
            0 => Ok(SparseFormat::Dense),
            1 => Ok(SparseFormat::RowSparse),
            2 => Ok(SparseFormat::Csr),
            other => Err(NdError::invalid(format!("unknown native storage type {other}"))),
        }
    }

    pub fn is_sparse(&self) -> bool {
        !matches!(self, SparseFormat::Dense)
    }

    /// Number of auxiliary index arrays the native side keeps for this layout.
    pub fn aux_count(&self) -> usize {
        match self {
            SparseFormat::Dense => 0,
            SparseFormat::RowSparse => 1,
            SparseFormat::Csr => 2,
        }
    }
}

impl fmt::Display for SparseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparseFormat::Dense => write!(f, "default"),
            SparseFormat::RowSparse => write!(f, "row_sparse"),
            SparseFormat::Csr => write!(f, "csr"),
        }
    }
}
