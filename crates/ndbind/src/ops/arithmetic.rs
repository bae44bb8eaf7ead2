//! Element-wise arithmetic.

use ndbind_core::{NdError, OpParams, Result};

use crate::array::NdArray;

impl NdArray {
    fn binary(&self, op: &str, other: &NdArray) -> Result<NdArray> {
        let (lhs, rhs) = (self.shape()?, other.shape()?);
        if lhs != rhs {
            return Err(NdError::invalid(format!("{op}: shape mismatch {lhs} vs {rhs}")));
        }
        let (lt, rt) = (self.dtype()?, other.dtype()?);
        if lt != rt {
            return Err(NdError::invalid(format!("{op}: dtype mismatch {lt} vs {rt}")));
        }
        self.invoke_one(op, &[self, other], &OpParams::new())
    }

    fn scalar(&self, op: &str, value: f64) -> Result<NdArray> {
        self.invoke_one(op, &[self], &OpParams::new().float("scalar", value))
    }

    /// Element-wise addition: self + other.
    pub fn add(&self, other: &NdArray) -> Result<NdArray> {
        self.binary("elemwise_add", other)
    }

    /// Element-wise subtraction: self - other.
    pub fn sub(&self, other: &NdArray) -> Result<NdArray> {
        self.binary("elemwise_sub", other)
    }

    /// Element-wise multiplication: self * other.
    pub fn mul(&self, other: &NdArray) -> Result<NdArray> {
        self.binary("elemwise_mul", other)
    }

    /// Element-wise division: self / other.
    pub fn div(&self, other: &NdArray) -> Result<NdArray> {
        self.binary("elemwise_div", other)
    }

    pub fn add_scalar(&self, value: f64) -> Result<NdArray> {
        self.scalar("_plus_scalar", value)
    }

    pub fn sub_scalar(&self, value: f64) -> Result<NdArray> {
        self.scalar("_minus_scalar", value)
    }

    pub fn mul_scalar(&self, value: f64) -> Result<NdArray> {
        self.scalar("_mul_scalar", value)
    }

    pub fn div_scalar(&self, value: f64) -> Result<NdArray> {
        self.scalar("_div_scalar", value)
    }

    /// Element-wise negation: -self.
    pub fn neg(&self) -> Result<NdArray> {
        self.invoke_one("negative", &[self], &OpParams::new())
    }
}
