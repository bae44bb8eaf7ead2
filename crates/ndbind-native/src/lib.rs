//! # ndbind-native
//!
//! The boundary between ndbind and a native tensor engine.
//!
//! Provides:
//! - `NativeLibrary`, the C-API-shaped surface the binding consumes
//! - `DylibLibrary`, a runtime-loaded (`libloading`) implementation over the
//!   MXNet C API, with no build-time dependency on the engine
//! - `FunctionTable`, operator names resolved once to native entry points
//! - `NativeResource`, exclusive ownership of one native pointer with
//!   exactly-once release

pub mod handle;
pub mod library;
pub mod ffi;
pub mod function_table;
pub mod resource;

#[cfg(test)]
mod mock;

pub use handle::{OpHandle, RawHandle};
pub use library::NativeLibrary;
pub use ffi::DylibLibrary;
pub use function_table::{FunctionHandle, FunctionTable};
pub use resource::NativeResource;

pub use ndbind_core::{NdError, Result};
