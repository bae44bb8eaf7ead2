//! Operations on native arrays: arithmetic, reduction, shape, gradient, I/O.
//!
//! Every operation resolves its operator through the engine's function
//! table and returns new arrays owned by the caller's scope. The set of
//! supported operations is [`NdOps`]; anything else goes through
//! [`NdArray::invoke`] and fails with `UnsupportedOperation` when the
//! engine does not register it.

pub mod arithmetic;
pub mod reduction;
pub mod shape;
pub mod autograd;
pub mod io;

use ndbind_core::{GradReq, Result, SparseFormat};

use crate::array::NdArray;

/// The capability set of a binding array.
pub trait NdOps: Sized {
    fn add(&self, other: &Self) -> Result<Self>;
    fn sub(&self, other: &Self) -> Result<Self>;
    fn mul(&self, other: &Self) -> Result<Self>;
    fn div(&self, other: &Self) -> Result<Self>;
    fn add_scalar(&self, value: f64) -> Result<Self>;
    fn sub_scalar(&self, value: f64) -> Result<Self>;
    fn mul_scalar(&self, value: f64) -> Result<Self>;
    fn div_scalar(&self, value: f64) -> Result<Self>;
    fn neg(&self) -> Result<Self>;

    fn sum(&self) -> Result<Self>;
    fn mean(&self) -> Result<Self>;
    fn max(&self) -> Result<Self>;
    fn min(&self) -> Result<Self>;
    fn sum_axis(&self, axis: i64, keepdims: bool) -> Result<Self>;
    fn mean_axis(&self, axis: i64, keepdims: bool) -> Result<Self>;
    fn max_axis(&self, axis: i64, keepdims: bool) -> Result<Self>;
    fn min_axis(&self, axis: i64, keepdims: bool) -> Result<Self>;

    fn at(&self, index: usize) -> Result<Self>;
    fn slice(&self, begin: usize, end: usize) -> Result<Self>;
    fn reshape(&self, dims: &[i64]) -> Result<Self>;
    fn split(&self, axis: i64, sections: usize) -> Result<Vec<Self>>;
    fn split_squeeze(&self, axis: i64) -> Result<Vec<Self>>;
    fn zeros_like(&self) -> Result<Self>;
    fn ones_like(&self) -> Result<Self>;
    fn softmax(&self, axis: i64, temperature: Option<f64>) -> Result<Self>;
    fn argsort(&self, axis: i64, ascending: bool) -> Result<Self>;

    fn attach_grad(&self) -> Result<()>;
    fn attach_grad_with(&self, req: GradReq, sparse: Option<SparseFormat>) -> Result<()>;
    fn backward(&self) -> Result<()>;
    fn gradient(&self) -> Result<Self>;

    fn to_bytes(&self) -> Result<Vec<u8>>;
}

impl NdOps for NdArray {
    fn add(&self, other: &Self) -> Result<Self> {
        NdArray::add(self, other)
    }

    fn sub(&self, other: &Self) -> Result<Self> {
        NdArray::sub(self, other)
    }

    fn mul(&self, other: &Self) -> Result<Self> {
        NdArray::mul(self, other)
    }

    fn div(&self, other: &Self) -> Result<Self> {
        NdArray::div(self, other)
    }

    fn add_scalar(&self, value: f64) -> Result<Self> {
        NdArray::add_scalar(self, value)
    }

    fn sub_scalar(&self, value: f64) -> Result<Self> {
        NdArray::sub_scalar(self, value)
    }

    fn mul_scalar(&self, value: f64) -> Result<Self> {
        NdArray::mul_scalar(self, value)
    }

    fn div_scalar(&self, value: f64) -> Result<Self> {
        NdArray::div_scalar(self, value)
    }

    fn neg(&self) -> Result<Self> {
        NdArray::neg(self)
    }

    fn sum(&self) -> Result<Self> {
        NdArray::sum(self)
    }

    fn mean(&self) -> Result<Self> {
        NdArray::mean(self)
    }

    fn max(&self) -> Result<Self> {
        NdArray::max(self)
    }

    fn min(&self) -> Result<Self> {
        NdArray::min(self)
    }

    fn sum_axis(&self, axis: i64, keepdims: bool) -> Result<Self> {
        NdArray::sum_axis(self, axis, keepdims)
    }

    fn mean_axis(&self, axis: i64, keepdims: bool) -> Result<Self> {
        NdArray::mean_axis(self, axis, keepdims)
    }

    fn max_axis(&self, axis: i64, keepdims: bool) -> Result<Self> {
        NdArray::max_axis(self, axis, keepdims)
    }

    fn min_axis(&self, axis: i64, keepdims: bool) -> Result<Self> {
        NdArray::min_axis(self, axis, keepdims)
    }

    fn at(&self, index: usize) -> Result<Self> {
        NdArray::at(self, index)
    }

    fn slice(&self, begin: usize, end: usize) -> Result<Self> {
        NdArray::slice(self, begin, end)
    }

    fn reshape(&self, dims: &[i64]) -> Result<Self> {
        NdArray::reshape(self, dims)
    }

    fn split(&self, axis: i64, sections: usize) -> Result<Vec<Self>> {
        NdArray::split(self, axis, sections)
    }

    fn split_squeeze(&self, axis: i64) -> Result<Vec<Self>> {
        NdArray::split_squeeze(self, axis)
    }

    fn zeros_like(&self) -> Result<Self> {
        NdArray::zeros_like(self)
    }

    fn ones_like(&self) -> Result<Self> {
        NdArray::ones_like(self)
    }

    fn softmax(&self, axis: i64, temperature: Option<f64>) -> Result<Self> {
        NdArray::softmax(self, axis, temperature)
    }

    fn argsort(&self, axis: i64, ascending: bool) -> Result<Self> {
        NdArray::argsort(self, axis, ascending)
    }

    fn attach_grad(&self) -> Result<()> {
        NdArray::attach_grad(self)
    }

    fn attach_grad_with(&self, req: GradReq, sparse: Option<SparseFormat>) -> Result<()> {
        NdArray::attach_grad_with(self, req, sparse)
    }

    fn backward(&self) -> Result<()> {
        NdArray::backward(self)
    }

    fn gradient(&self) -> Result<Self> {
        NdArray::gradient(self)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        NdArray::to_bytes(self)
    }
}
