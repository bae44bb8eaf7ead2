//! Convenience re-exports.
//!
//! ```rust
//! use ndbind::prelude::*;
//! ```

pub use crate::Engine;
pub use crate::EngineConfig;
pub use crate::NdManager;
pub use crate::NdArray;
pub use crate::NdOps;
pub use crate::GradientCollector;
pub use ndbind_core::prelude::*;
