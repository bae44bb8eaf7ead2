//! The tensor handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use ndbind_core::{DType, DataDesc, Device, NdError, OpParams, Result, Shape, SparseFormat};
use ndbind_native::{NativeLibrary, NativeResource, RawHandle};

use crate::manager::{self, ManagerInner, NdManager};
use crate::readiness::Readiness;
use crate::runtime::Runtime;

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ArrayInner {
    pub(crate) id: u64,
    resource: NativeResource,
    runtime: Arc<Runtime>,
    shape: OnceLock<Shape>,
    dtype: OnceLock<DType>,
    device: OnceLock<Device>,
    sparse: OnceLock<SparseFormat>,
    name: Mutex<Option<String>>,
    pub(crate) readiness: Readiness,
    pub(crate) owner: Mutex<Option<Weak<ManagerInner>>>,
    /// Gradient buffer handed to the engine by the last `attach_grad`.
    pub(crate) grad: Mutex<Option<NdArray>>,
}

impl ArrayInner {
    /// Wrap `handle`, taking ownership of it. Known metadata is cached up
    /// front; anything else is fetched on first access.
    pub(crate) fn new(handle: RawHandle, runtime: Arc<Runtime>, desc: Option<&DataDesc>) -> Arc<Self> {
        let resource = NativeResource::new(handle, Arc::clone(runtime.lib_arc()));
        let inner = Self {
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed),
            resource,
            runtime,
            shape: OnceLock::new(),
            dtype: OnceLock::new(),
            device: OnceLock::new(),
            sparse: OnceLock::new(),
            name: Mutex::new(None),
            readiness: Readiness::new(false),
            owner: Mutex::new(None),
            grad: Mutex::new(None),
        };
        if let Some(desc) = desc {
            let _ = inner.shape.set(desc.shape.clone());
            let _ = inner.dtype.set(desc.dtype);
            let _ = inner.device.set(desc.device);
            let _ = inner.sparse.set(desc.sparse);
            *inner.name.lock() = desc.name.clone();
        }
        Arc::new(inner)
    }

    pub(crate) fn release(&self) -> bool {
        self.resource.release()
    }
}

/// Cached value of `cell`, loading it on first access.
fn hydrate<T: Clone>(cell: &OnceLock<T>, load: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(v) = cell.get() {
        return Ok(v.clone());
    }
    let v = load()?;
    Ok(cell.get_or_init(|| v).clone())
}

/// A handle onto one native array.
///
/// Clones refer to the same native array. The native memory is released
/// when the owning [`NdManager`] closes, when [`NdArray::close`] is called,
/// or, for an array without a scope, when the last clone is dropped.
#[derive(Clone)]
pub struct NdArray {
    pub(crate) inner: Arc<ArrayInner>,
}

impl NdArray {
    pub(crate) fn from_inner(inner: Arc<ArrayInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.inner.runtime
    }

    pub(crate) fn lib(&self) -> &dyn NativeLibrary {
        self.inner.runtime.lib()
    }

    /// Process-unique id of this array.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The native handle, or `InvalidArgument` once released.
    pub fn handle(&self) -> Result<RawHandle> {
        self.inner.resource.handle()
    }

    pub fn shape(&self) -> Result<Shape> {
        hydrate(&self.inner.shape, || self.lib().shape(self.handle()?))
    }

    pub fn dtype(&self) -> Result<DType> {
        hydrate(&self.inner.dtype, || self.lib().dtype(self.handle()?))
    }

    pub fn device(&self) -> Result<Device> {
        hydrate(&self.inner.device, || self.lib().device(self.handle()?))
    }

    pub fn sparse_format(&self) -> Result<SparseFormat> {
        hydrate(&self.inner.sparse, || self.lib().storage_type(self.handle()?))
    }

    /// Number of elements.
    pub fn size(&self) -> Result<usize> {
        Ok(self.shape()?.size())
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name.lock().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.inner.name.lock() = Some(name.into());
    }

    pub fn data_desc(&self) -> Result<DataDesc> {
        let mut desc = DataDesc::new(self.shape()?, self.dtype()?)
            .on(self.device()?)
            .with_sparse(self.sparse_format()?);
        desc.name = self.name();
        Ok(desc)
    }

    /// The owning scope, if any.
    pub fn manager(&self) -> Option<NdManager> {
        self.owner().map(NdManager::from_inner)
    }

    pub(crate) fn owner(&self) -> Option<Arc<ManagerInner>> {
        self.inner.owner.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_released(&self) -> bool {
        self.inner.resource.is_released()
    }

    /// Whether both arrays come from the same engine instance.
    pub fn same_engine(&self, other: &NdArray) -> bool {
        Arc::ptr_eq(self.runtime(), other.runtime())
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    pub fn is_ready(&self) -> bool {
        self.inner.readiness.is_ready()
    }

    /// Block until pending writes to this array have completed.
    pub fn wait_to_read(&self) -> Result<()> {
        self.inner.readiness.wait_to_read(self.lib(), self.handle()?)
    }

    /// Block until pending reads and writes of this array have completed.
    pub fn wait_to_write(&self) -> Result<()> {
        self.inner.readiness.wait_to_write(self.lib(), self.handle()?)
    }

    /// Block until the whole engine is idle.
    pub fn wait_all(&self) -> Result<()> {
        self.handle()?;
        self.inner.readiness.wait_all(self.lib())
    }

    pub(crate) fn mark_ready(&self) {
        self.inner.readiness.mark_ready();
    }

    // =========================================================================
    // Copies and conversions
    // =========================================================================

    /// Copy this array's contents into `dest`, converting the element type
    /// if they differ.
    pub fn copy_to(&self, dest: &NdArray) -> Result<()> {
        if !self.same_engine(dest) {
            return Err(NdError::invalid("destination belongs to a different engine"));
        }
        let (src_shape, dest_shape) = (self.shape()?, dest.shape()?);
        if src_shape != dest_shape {
            return Err(NdError::invalid(format!(
                "shape mismatch: cannot copy {src_shape} into {dest_shape}"
            )));
        }
        let dest_handle = dest.handle()?;
        self.runtime()
            .invoke("_copyto", &[self.handle()?], Some(&[dest_handle]), &OpParams::new())?;
        Ok(())
    }

    /// This array on `device`. Without `copy`, an array already there is
    /// returned as is.
    pub fn to_device(&self, device: Device, copy: bool) -> Result<NdArray> {
        if !copy && self.device()? == device {
            return Ok(self.clone());
        }
        let dest = self.new_sibling(device, self.shape()?, self.dtype()?, self.sparse_format()?)?;
        self.copy_to(&dest)?;
        Ok(dest)
    }

    /// This array converted to `dtype`. Without `copy`, an array that
    /// already has that type is returned as is.
    pub fn to_dtype(&self, dtype: DType, copy: bool) -> Result<NdArray> {
        if !copy && self.dtype()? == dtype {
            return Ok(self.clone());
        }
        let dest = self.new_sibling(self.device()?, self.shape()?, dtype, self.sparse_format()?)?;
        self.copy_to(&dest)?;
        Ok(dest)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run any registered operator with this array as the only input.
    pub fn invoke(&self, op: &str, params: &OpParams) -> Result<Vec<NdArray>> {
        self.invoke_with(op, &[self], params)
    }

    /// Run any registered operator. Outputs belong to this array's scope.
    pub fn invoke_with(&self, op: &str, inputs: &[&NdArray], params: &OpParams) -> Result<Vec<NdArray>> {
        let mut handles = Vec::with_capacity(inputs.len());
        for input in inputs {
            if !self.same_engine(input) {
                return Err(NdError::invalid("operand belongs to a different engine"));
            }
            handles.push(input.handle()?);
        }
        let outputs = self.runtime().invoke(op, &handles, None, params)?;
        self.adopt_outputs(outputs, None)
    }

    pub(crate) fn invoke_one(&self, op: &str, inputs: &[&NdArray], params: &OpParams) -> Result<NdArray> {
        self.invoke_with(op, inputs, params)?
            .into_iter()
            .next()
            .ok_or_else(|| NdError::native(op, "operator returned no output"))
    }

    /// Wrap native outputs as arrays in this array's scope.
    pub(crate) fn adopt_outputs(&self, handles: Vec<RawHandle>, desc: Option<&DataDesc>) -> Result<Vec<NdArray>> {
        let owner = self.owner();
        let inners: Vec<Arc<ArrayInner>> = handles
            .into_iter()
            .map(|h| ArrayInner::new(h, Arc::clone(self.runtime()), desc))
            .collect();
        inners
            .into_iter()
            .map(|inner| manager::attach(owner.as_ref(), inner))
            .collect()
    }

    pub(crate) fn adopt_output(&self, handle: RawHandle, desc: Option<&DataDesc>) -> Result<NdArray> {
        let owner = self.owner();
        let inner = ArrayInner::new(handle, Arc::clone(self.runtime()), desc);
        manager::attach(owner.as_ref(), inner)
    }

    /// A new array in this array's scope.
    pub(crate) fn new_sibling(
        &self,
        device: Device,
        shape: Shape,
        dtype: DType,
        sparse: SparseFormat,
    ) -> Result<NdArray> {
        let handle = self.lib().create(device, &shape, dtype, sparse, false)?;
        let desc = DataDesc::new(shape, dtype).on(device).with_sparse(sparse);
        self.adopt_output(handle, Some(&desc))
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Release the native array and leave the owning scope. Idempotent.
    pub fn close(&self) {
        self.inner.release();
        self.detach();
    }

    /// Leave the owning scope without releasing. The native array is then
    /// released when the last clone is dropped.
    pub fn detach(&self) {
        let prev = self.inner.owner.lock().take();
        if let Some(manager) = prev.and_then(|w| w.upgrade()) {
            manager.unregister(self.inner.id);
        }
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("NdArray");
        s.field("id", &self.inner.id);
        // only what is already known; formatting never calls into the engine
        if let Some(shape) = self.inner.shape.get() {
            s.field("shape", shape);
        }
        if let Some(dtype) = self.inner.dtype.get() {
            s.field("dtype", dtype);
        }
        s.field("released", &self.is_released()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, EngineConfig};
    use ndbind_ref::ReferenceLibrary;

    #[test]
    fn test_metadata_hydrates_lazily() {
        let lib = Arc::new(ReferenceLibrary::new());
        let engine = Engine::with_library(lib.clone()).unwrap();
        let manager = engine.new_base_manager();
        let handle = lib
            .create(Device::Cpu, &Shape::new(&[2, 5]), DType::F64, SparseFormat::Dense, false)
            .unwrap();
        let array = manager.from_raw(handle).unwrap();
        assert!(array.inner.shape.get().is_none());
        assert_eq!(array.shape().unwrap(), Shape::new(&[2, 5]));
        assert!(array.inner.shape.get().is_some());
        assert_eq!(array.dtype().unwrap(), DType::F64);
        assert_eq!(array.size().unwrap(), 10);
        assert_eq!(array.sparse_format().unwrap(), SparseFormat::Dense);
    }

    #[test]
    fn test_released_array_reports_invalid() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let manager = engine.new_base_manager();
        let array = manager.create([3], DType::F32).unwrap();
        array.close();
        assert!(matches!(array.handle(), Err(NdError::InvalidArgument(_))));
        assert!(array.wait_to_read().is_err());
        // cached metadata stays readable
        assert_eq!(array.shape().unwrap(), Shape::new(&[3]));
    }

    #[test]
    fn test_debug_does_not_block() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let manager = engine.new_base_manager();
        let array = manager.create([1], DType::U8).unwrap();
        let text = format!("{array:?}");
        assert!(text.contains("NdArray"));
        assert!(text.contains("released: false"));
    }

    #[test]
    fn test_detached_array_released_on_drop() {
        let lib = Arc::new(ReferenceLibrary::new());
        let engine = Engine::with_library(lib.clone()).unwrap();
        let manager = engine.new_base_manager();
        let array = manager.create([3], DType::F32).unwrap();
        array.detach();
        assert!(manager.is_empty());
        assert!(array.manager().is_none());
        assert_eq!(lib.live_handles(), 1);
        drop(array);
        assert_eq!(lib.live_handles(), 0);
    }

    #[test]
    fn test_name_flows_into_desc() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let manager = engine.new_base_manager();
        let array = manager.create([2, 3], DType::F32).unwrap();
        array.set_name("data");
        assert_eq!(array.data_desc().unwrap().to_string(), "data: (2, 3) cpu() float32");
    }
}
