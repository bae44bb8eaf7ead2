//! Per-array readiness barrier.
//!
//! The engine executes asynchronously. An array starts out pending; the
//! first successful wait marks it ready and later waits return without a
//! native call. The flag never reverts; host copies synchronize on their own.

use std::sync::atomic::{AtomicBool, Ordering};

use ndbind_core::Result;
use ndbind_native::{NativeLibrary, RawHandle};

#[derive(Debug, Default)]
pub struct Readiness {
    ready: AtomicBool,
}

impl Readiness {
    pub fn new(ready: bool) -> Self {
        Self {
            ready: AtomicBool::new(ready),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn wait_to_read(&self, lib: &dyn NativeLibrary, handle: RawHandle) -> Result<()> {
        if !self.is_ready() {
            lib.wait_to_read(handle)?;
            self.mark_ready();
        }
        Ok(())
    }

    pub fn wait_to_write(&self, lib: &dyn NativeLibrary, handle: RawHandle) -> Result<()> {
        if !self.is_ready() {
            lib.wait_to_write(handle)?;
            self.mark_ready();
        }
        Ok(())
    }

    /// Engine-wide barrier, performed unconditionally.
    pub fn wait_all(&self, lib: &dyn NativeLibrary) -> Result<()> {
        lib.wait_all()?;
        self.mark_ready();
        Ok(())
    }
}
