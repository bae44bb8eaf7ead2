//! Opaque native handles.
//!
//! Handles are never dereferenced on the Rust side. Engines that hand out
//! small integer ids instead of real pointers use [`RawHandle::from_id`].

use std::ffi::c_void;
use std::fmt;

/// Opaque pointer to one native array.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(*mut c_void);

// The engine owns the pointee; handles are plain tokens passed back to it.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

impl RawHandle {
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn from_id(id: u64) -> Self {
        Self(id as usize as *mut c_void)
    }

    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn id(&self) -> u64 {
        self.0 as usize as u64
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:p})", self.0)
    }
}

/// Opaque pointer to one resolved native operator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpHandle(*mut c_void);

unsafe impl Send for OpHandle {}
unsafe impl Sync for OpHandle {}

impl OpHandle {
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn from_id(id: u64) -> Self {
        Self(id as usize as *mut c_void)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn id(&self) -> u64 {
        self.0 as usize as u64
    }
}

impl fmt::Debug for OpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpHandle({:p})", self.0)
    }
}
