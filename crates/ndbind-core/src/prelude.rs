//! Convenience re-exports for common ndbind-core types.
//!
//! ```rust
//! use ndbind_core::prelude::*;
//! ```

pub use crate::DType;
pub use crate::Device;
pub use crate::Shape;
pub use crate::SparseFormat;
pub use crate::GradReq;
pub use crate::OpParams;
pub use crate::Element;
pub use crate::NdError;
pub use crate::Result;
