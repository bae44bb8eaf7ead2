//! # ndbind-ref
//!
//! A small in-process tensor engine behind the [`NativeLibrary`] boundary.
//!
//! It behaves like a native engine from the binding's point of view:
//! handles are opaque ids, operator calls are queued and only executed when
//! a wait or host copy forces them, and autograd is driven through marked
//! variables and a recorded tape. Counters make handle lifetimes observable
//! from tests.
//!
//! [`NativeLibrary`]: ndbind_native::NativeLibrary

mod store;
mod kernels;
mod ops;
mod tape;
mod library;

pub use library::ReferenceLibrary;
pub use ops::Op;
