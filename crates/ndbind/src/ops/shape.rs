//! Views, splitting and shape-preserving transforms.

use ndbind_core::{NdError, OpParams, Result};

use crate::array::NdArray;

impl NdArray {
    /// Sub-array at `index` along the leading axis. Shares memory with `self`.
    pub fn at(&self, index: usize) -> Result<NdArray> {
        let shape = self.shape()?;
        if shape.ndim() == 0 || index >= shape.head() {
            return Err(NdError::invalid(format!("index {index} out of range for shape {shape}")));
        }
        let handle = self.lib().at(self.handle()?, index)?;
        self.adopt_output(handle, None)
    }

    /// Rows `[begin, end)` along the leading axis. Shares memory with `self`.
    pub fn slice(&self, begin: usize, end: usize) -> Result<NdArray> {
        let shape = self.shape()?;
        if shape.ndim() == 0 || begin >= end || end > shape.head() {
            return Err(NdError::invalid(format!(
                "range [{begin}, {end}) out of range for shape {shape}"
            )));
        }
        let handle = self.lib().slice(self.handle()?, begin, end)?;
        self.adopt_output(handle, None)
    }

    /// Same data under a new shape. One dimension may be `-1` and `0`
    /// copies the source dimension.
    pub fn reshape(&self, dims: &[i64]) -> Result<NdArray> {
        let shape = self.shape()?;
        if shape.resolve_reshape(dims).is_none() {
            return Err(NdError::invalid(format!("cannot reshape {shape} into {dims:?}")));
        }
        let handle = self.lib().reshape(self.handle()?, dims, false)?;
        self.adopt_output(handle, None)
    }

    /// `sections` equal parts along `axis`.
    pub fn split(&self, axis: i64, sections: usize) -> Result<Vec<NdArray>> {
        if sections == 0 {
            return Err(NdError::invalid("split needs at least one section"));
        }
        let params = OpParams::new()
            .int("axis", axis)
            .int("num_outputs", sections as i64);
        self.invoke("split", &params)
    }

    /// One array per index along `axis`, with that axis removed.
    pub fn split_squeeze(&self, axis: i64) -> Result<Vec<NdArray>> {
        let shape = self.shape()?;
        let resolved = shape
            .normalize_axis(axis)
            .ok_or_else(|| NdError::invalid(format!("axis {axis} out of range for shape {shape}")))?;
        let params = OpParams::new()
            .int("axis", axis)
            .int("num_outputs", shape.dims()[resolved] as i64)
            .flag("squeeze_axis", true);
        self.invoke("split", &params)
    }

    pub fn zeros_like(&self) -> Result<NdArray> {
        self.invoke_one("zeros_like", &[self], &OpParams::new())
    }

    pub fn ones_like(&self) -> Result<NdArray> {
        self.invoke_one("ones_like", &[self], &OpParams::new())
    }

    /// Softmax along `axis`, optionally scaled by `temperature`.
    pub fn softmax(&self, axis: i64, temperature: Option<f64>) -> Result<NdArray> {
        let mut params = OpParams::new().int("axis", axis);
        if let Some(t) = temperature {
            params = params.float("temperature", t);
        }
        self.invoke_one("softmax", &[self], &params)
    }

    /// Indices that would sort `self` along `axis`.
    pub fn argsort(&self, axis: i64, ascending: bool) -> Result<NdArray> {
        let params = OpParams::new().int("axis", axis).flag("is_ascend", ascending);
        self.invoke_one("argsort", &[self], &params)
    }
}
