//! The native call surface consumed by the binding.

use ndbind_core::{DType, Device, GradReq, NdError, OpParams, Result, Shape, SparseFormat};

use crate::handle::{OpHandle, RawHandle};

/// Everything the binding needs from a native tensor engine.
///
/// Calls are submissions: an engine may execute asynchronously and is only
/// required to have materialized an array once one of the `wait_*` calls,
/// or a host copy, returns for it. Implementations must be internally
/// synchronized; the binding adds no locking around per-array calls.
///
/// The autograd and view entry points have default bodies reporting
/// [`NdError::UnsupportedOperation`] for inference-only engines.
pub trait NativeLibrary: Send + Sync {
    /// Engine name, e.g. `MXNet`.
    fn name(&self) -> &str;

    fn version(&self) -> Result<String>;

    fn gpu_count(&self) -> Result<usize>;

    /// Names of every registered operator.
    fn list_ops(&self) -> Result<Vec<String>>;

    /// Resolve one operator name to its entry point.
    fn get_op(&self, name: &str) -> Result<OpHandle>;

    /// Allocate a new array. With `delay_alloc` the engine may defer the
    /// actual memory allocation until first write.
    fn create(
        &self,
        device: Device,
        shape: &Shape,
        dtype: DType,
        sparse: SparseFormat,
        delay_alloc: bool,
    ) -> Result<RawHandle>;

    fn free(&self, handle: RawHandle) -> Result<()>;

    fn shape(&self, handle: RawHandle) -> Result<Shape>;

    fn dtype(&self, handle: RawHandle) -> Result<DType>;

    fn device(&self, handle: RawHandle) -> Result<Device>;

    fn storage_type(&self, handle: RawHandle) -> Result<SparseFormat>;

    /// Blocking copy of `len` little-endian elements from host memory.
    fn sync_copy_from_cpu(&self, handle: RawHandle, data: &[u8], len: usize) -> Result<()>;

    /// Blocking copy of `len` elements into host memory, little-endian.
    fn sync_copy_to_cpu(&self, handle: RawHandle, out: &mut [u8], len: usize) -> Result<()>;

    fn wait_to_read(&self, handle: RawHandle) -> Result<()>;

    fn wait_to_write(&self, handle: RawHandle) -> Result<()>;

    /// Block until every pending operation in the engine has completed.
    fn wait_all(&self) -> Result<()>;

    /// Invoke an operator. With `outputs == None` the engine allocates the
    /// results and returns new handles; otherwise it writes into `outputs`
    /// and returns them unchanged.
    fn invoke(
        &self,
        op: OpHandle,
        inputs: &[RawHandle],
        outputs: Option<&[RawHandle]>,
        params: &OpParams,
    ) -> Result<Vec<RawHandle>>;

    /// Sub-array at `index` along the leading axis.
    fn at(&self, _handle: RawHandle, _index: usize) -> Result<RawHandle> {
        Err(NdError::unsupported("at"))
    }

    /// Rows `[begin, end)` along the leading axis.
    fn slice(&self, _handle: RawHandle, _begin: usize, _end: usize) -> Result<RawHandle> {
        Err(NdError::unsupported("slice"))
    }

    fn reshape(&self, _handle: RawHandle, _dims: &[i64], _reverse: bool) -> Result<RawHandle> {
        Err(NdError::unsupported("reshape"))
    }

    /// Register `vars` with autograd, writing their gradients into `grads`.
    fn mark_variables(
        &self,
        _vars: &[RawHandle],
        _reqs: &[GradReq],
        _grads: &[RawHandle],
    ) -> Result<()> {
        Err(NdError::unsupported("mark_variables"))
    }

    /// Reverse-mode differentiation from `heads`. A `None` head gradient
    /// seeds with ones.
    fn backward(
        &self,
        _heads: &[RawHandle],
        _head_grads: &[Option<RawHandle>],
        _retain_graph: bool,
        _is_training: bool,
    ) -> Result<()> {
        Err(NdError::unsupported("backward"))
    }

    /// New handle onto the gradient buffer of a marked variable.
    fn get_grad(&self, _handle: RawHandle) -> Result<Option<RawHandle>> {
        Err(NdError::unsupported("get_grad"))
    }

    /// Toggle autograd recording, returning the previous state.
    fn set_recording(&self, _recording: bool) -> Result<bool> {
        Err(NdError::unsupported("set_recording"))
    }

    /// Toggle training mode, returning the previous state.
    fn set_training(&self, _training: bool) -> Result<bool> {
        Err(NdError::unsupported("set_training"))
    }

    fn random_seed(&self, _seed: u32) -> Result<()> {
        Err(NdError::unsupported("random_seed"))
    }
}
