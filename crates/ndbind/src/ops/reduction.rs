//! Reductions over the whole array or along one axis.

use ndbind_core::{OpParams, Result};

use crate::array::NdArray;

impl NdArray {
    fn reduce(&self, op: &str, axis: Option<i64>, keepdims: bool) -> Result<NdArray> {
        let mut params = OpParams::new();
        if let Some(axis) = axis {
            params = params.int("axis", axis);
        }
        if keepdims {
            params = params.flag("keepdims", true);
        }
        self.invoke_one(op, &[self], &params)
    }

    /// Sum of all elements, as a one-element array.
    pub fn sum(&self) -> Result<NdArray> {
        self.reduce("sum", None, false)
    }

    pub fn mean(&self) -> Result<NdArray> {
        self.reduce("mean", None, false)
    }

    pub fn max(&self) -> Result<NdArray> {
        self.reduce("max", None, false)
    }

    pub fn min(&self) -> Result<NdArray> {
        self.reduce("min", None, false)
    }

    /// Sum along `axis`; negative values count from the last axis.
    pub fn sum_axis(&self, axis: i64, keepdims: bool) -> Result<NdArray> {
        self.reduce("sum", Some(axis), keepdims)
    }

    pub fn mean_axis(&self, axis: i64, keepdims: bool) -> Result<NdArray> {
        self.reduce("mean", Some(axis), keepdims)
    }

    pub fn max_axis(&self, axis: i64, keepdims: bool) -> Result<NdArray> {
        self.reduce("max", Some(axis), keepdims)
    }

    pub fn min_axis(&self, axis: i64, keepdims: bool) -> Result<NdArray> {
        self.reduce("min", Some(axis), keepdims)
    }
}
