//! # ndbind
//!
//! Tensors as managed handles to memory owned by a native tensor engine.
//!
//! The engine does the math. This crate owns the pieces around it:
//! - [`Engine`]: loads the native library and its operator table once
//! - [`NdManager`]: a scope that owns arrays and releases them on close
//! - [`NdArray`]: a handle with lazily fetched metadata and a readiness
//!   barrier over the engine's asynchronous execution
//! - [`GradientCollector`]: recording scope for native autograd
//!
//! ```
//! use ndbind::prelude::*;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let manager = engine.new_base_manager();
//! let a = manager.from_slice(&[1.0f32, 2.0, 3.0], [3]).unwrap();
//! let b = a.mul_scalar(2.0).unwrap();
//! assert_eq!(b.to_f32_vec().unwrap(), vec![2.0, 4.0, 6.0]);
//! manager.close();
//! assert!(a.is_released());
//! ```

pub mod config;
pub mod engine;
pub mod readiness;
pub mod manager;
pub mod array;
pub mod ops;
pub mod dump;
pub mod prelude;

mod runtime;

pub use config::{EngineConfig, LibraryKind};
pub use engine::{Capability, Engine};
pub use readiness::Readiness;
pub use manager::NdManager;
pub use array::NdArray;
pub use ops::NdOps;
pub use ops::autograd::GradientCollector;

pub use ndbind_core::{DType, DataDesc, Device, Element, GradReq, NdError, OpParams, Result, Shape, SparseFormat};
