//! # ndbind-core
//!
//! Value types shared by every layer of the ndbind native tensor binding.
//!
//! Provides:
//! - `DType`, `Device`, `Shape` and `SparseFormat` with their native codes
//! - `GradReq` for autograd variable registration
//! - `OpParams`, the typed parameter map handed to native operators
//! - `Element`, the host element types that can cross the native boundary
//! - `NdError`, the error taxonomy of the binding

pub mod dtype;
pub mod device;
pub mod shape;
pub mod sparse;
pub mod grad;
pub mod params;
pub mod element;
pub mod desc;
pub mod error;
pub mod prelude;

pub use dtype::DType;
pub use device::Device;
pub use shape::Shape;
pub use sparse::SparseFormat;
pub use grad::GradReq;
pub use params::{OpParams, ParamValue};
pub use element::Element;
pub use desc::DataDesc;
pub use error::NdError;

pub type Result<T> = std::result::Result<T, NdError>;
