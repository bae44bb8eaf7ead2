//! Exclusive ownership of one native pointer.

use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use tracing::{trace, warn};

use ndbind_core::{NdError, Result};

use crate::handle::RawHandle;
use crate::library::NativeLibrary;

/// A native handle that is freed exactly once.
///
/// Release is a single atomic swap, so concurrent `release` calls free the
/// native memory once and every later call is a no-op. Dropping an
/// unreleased resource releases it. Not `Clone`: a second owner would mean
/// a second free.
pub struct NativeResource {
    ptr: AtomicPtr<std::ffi::c_void>,
    lib: Arc<dyn NativeLibrary>,
}

impl NativeResource {
    pub fn new(handle: RawHandle, lib: Arc<dyn NativeLibrary>) -> Self {
        Self {
            ptr: AtomicPtr::new(handle.as_ptr()),
            lib,
        }
    }

    /// The live handle, or `InvalidArgument` once released.
    pub fn handle(&self) -> Result<RawHandle> {
        let ptr = self.ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            Err(NdError::invalid("native resource already released"))
        } else {
            Ok(RawHandle::from_ptr(ptr))
        }
    }

    pub fn is_released(&self) -> bool {
        self.ptr.load(Ordering::Acquire).is_null()
    }

    pub fn library(&self) -> &Arc<dyn NativeLibrary> {
        &self.lib
    }

    /// Free the native handle. Returns whether this call did the free.
    pub fn release(&self) -> bool {
        let prev = self.ptr.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if prev.is_null() {
            return false;
        }
        let handle = RawHandle::from_ptr(prev);
        match self.lib.free(handle) {
            Ok(()) => trace!("released {handle:?}"),
            Err(e) => warn!("failed to free {handle:?}: {e}"),
        }
        true
    }
}

impl Drop for NativeResource {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for NativeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeResource")
            .field("handle", &RawHandle::from_ptr(self.ptr.load(Ordering::Acquire)))
            .field("library", &self.lib.name())
            .finish()
    }
}
