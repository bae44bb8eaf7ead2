//! Array storage: shared value buffers and the views onto them.

use std::sync::Arc;

use parking_lot::RwLock;

use ndbind_core::{DType, Device, Shape, SparseFormat};

use crate::kernels::cast;

/// Values are held widened to `f64` and narrowed to the array dtype on write.
pub(crate) type Buffer = Arc<RwLock<Vec<f64>>>;

/// A contiguous window of a buffer interpreted with a shape and dtype.
#[derive(Debug, Clone)]
pub(crate) struct View {
    buf: Buffer,
    offset: usize,
    pub shape: Shape,
    pub dtype: DType,
}

impl View {
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        Self {
            buf: Arc::new(RwLock::new(vec![0.0; shape.size()])),
            offset: 0,
            shape,
            dtype,
        }
    }

    pub fn len(&self) -> usize {
        self.shape.size()
    }

    pub fn read(&self) -> Vec<f64> {
        let buf = self.buf.read();
        buf[self.offset..self.offset + self.len()].to_vec()
    }

    /// Overwrite the window, narrowing each value to the view's dtype.
    pub fn write(&self, values: &[f64]) {
        let len = self.len();
        let mut buf = self.buf.write();
        for (dst, &v) in buf[self.offset..self.offset + len].iter_mut().zip(values) {
            *dst = cast(self.dtype, v);
        }
    }

    pub fn accumulate(&self, values: &[f64]) {
        let len = self.len();
        let mut buf = self.buf.write();
        for (dst, &v) in buf[self.offset..self.offset + len].iter_mut().zip(values) {
            *dst = cast(self.dtype, *dst + v);
        }
    }

    /// Same memory, different shape. Sizes must agree.
    pub fn reshaped(&self, shape: Shape) -> Self {
        Self {
            buf: Arc::clone(&self.buf),
            offset: self.offset,
            shape,
            dtype: self.dtype,
        }
    }

    /// A window starting `start` elements into this one.
    pub fn window(&self, start: usize, shape: Shape) -> Self {
        Self {
            buf: Arc::clone(&self.buf),
            offset: self.offset + start,
            shape,
            dtype: self.dtype,
        }
    }
}

/// Everything the engine knows about one live handle.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub view: View,
    pub device: Device,
    pub sparse: SparseFormat,
}

impl Entry {
    pub fn dense(view: View, device: Device) -> Self {
        Self {
            view,
            device,
            sparse: SparseFormat::Dense,
        }
    }
}
