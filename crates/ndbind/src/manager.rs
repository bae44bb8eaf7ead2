//! Scopes that own arrays.
//!
//! Every array belongs to at most one scope. Closing a scope releases each
//! array it owns exactly once and then closes its child scopes. Scopes
//! form a tree: parents track children weakly, so dropping the last handle
//! to a scope closes it.
//!
//! Lock order: an array's owner lock before any registry lock, and two
//! registries in ascending scope id.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use ndbind_core::{DType, DataDesc, Device, Element, NdError, OpParams, Result, Shape, SparseFormat};
use ndbind_native::RawHandle;

use crate::array::{ArrayInner, NdArray};
use crate::runtime::Runtime;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Registry {
    closed: bool,
    arrays: HashMap<u64, Arc<ArrayInner>>,
    children: Vec<Weak<ManagerInner>>,
}

pub(crate) struct ManagerInner {
    id: u64,
    device: Device,
    runtime: Arc<Runtime>,
    parent: Option<Weak<ManagerInner>>,
    registry: Mutex<Registry>,
}

impl ManagerInner {
    fn new(runtime: Arc<Runtime>, device: Device, parent: Option<Weak<ManagerInner>>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            device,
            runtime,
            parent,
            registry: Mutex::new(Registry::default()),
        })
    }

    /// Register a fresh, unowned array.
    fn register(self: &Arc<Self>, array: &Arc<ArrayInner>) -> Result<()> {
        let mut owner = array.owner.lock();
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(NdError::invalid("scope is closed"));
        }
        registry.arrays.insert(array.id, Arc::clone(array));
        *owner = Some(Arc::downgrade(self));
        Ok(())
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.registry.lock().arrays.remove(&id);
    }

    /// Move `array` out of `prev` (if any) and into this registry. The
    /// caller holds the array's owner lock.
    fn move_in(&self, array: &Arc<ArrayInner>, prev: Option<&ManagerInner>) -> Result<()> {
        match prev {
            Some(src) if std::ptr::eq(src, self) => {
                if self.registry.lock().closed {
                    return Err(NdError::invalid("cannot adopt into a closed scope"));
                }
                Ok(())
            }
            Some(src) => {
                let (first, second) = if src.id < self.id { (src, self) } else { (self, src) };
                let mut first = first.registry.lock();
                let mut second = second.registry.lock();
                let (src_reg, dst_reg) = if src.id < self.id {
                    (&mut *first, &mut *second)
                } else {
                    (&mut *second, &mut *first)
                };
                if dst_reg.closed {
                    return Err(NdError::invalid("cannot adopt into a closed scope"));
                }
                if src_reg.arrays.remove(&array.id).is_none() {
                    return Err(NdError::invalid("array was released with its scope"));
                }
                dst_reg.arrays.insert(array.id, Arc::clone(array));
                trace!("array {} moved from scope {} to {}", array.id, src.id, self.id);
                Ok(())
            }
            None => {
                let mut registry = self.registry.lock();
                if registry.closed {
                    return Err(NdError::invalid("cannot adopt into a closed scope"));
                }
                registry.arrays.insert(array.id, Arc::clone(array));
                Ok(())
            }
        }
    }

    fn close(&self) {
        let (arrays, children) = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            (
                std::mem::take(&mut registry.arrays),
                std::mem::take(&mut registry.children),
            )
        };
        let mut count = 0;
        for array in arrays.into_values() {
            let mut owner = array.owner.lock();
            // detached or adopted elsewhere after the registry was drained
            if !owner.as_ref().is_some_and(|w| std::ptr::eq(w.as_ptr(), self)) {
                continue;
            }
            owner.take();
            drop(owner);
            array.release();
            count += 1;
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            child.close();
        }
        trace!("closed scope {} releasing {count} array(s)", self.id);
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Attach a new array to `owner`, or leave it unowned. On failure the
/// array is dropped and its native handle released.
pub(crate) fn attach(owner: Option<&Arc<ManagerInner>>, inner: Arc<ArrayInner>) -> Result<NdArray> {
    if let Some(manager) = owner {
        manager.register(&inner)?;
    }
    Ok(NdArray::from_inner(inner))
}

/// A scope owning native arrays.
///
/// Cloning yields another handle onto the same scope.
#[derive(Clone)]
pub struct NdManager {
    inner: Arc<ManagerInner>,
}

impl NdManager {
    pub(crate) fn root(runtime: Arc<Runtime>, device: Device) -> Self {
        Self {
            inner: ManagerInner::new(runtime, device, None),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.inner.runtime
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Device arrays are created on unless another one is given.
    pub fn device(&self) -> Device {
        self.inner.device
    }

    pub fn parent(&self) -> Option<NdManager> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Self::from_inner)
    }

    pub fn new_sub_manager(&self) -> NdManager {
        self.new_sub_manager_on(self.device())
    }

    /// A child scope, closed when this one closes. A child of a closed
    /// scope starts out closed.
    pub fn new_sub_manager_on(&self, device: Device) -> NdManager {
        let child = ManagerInner::new(
            Arc::clone(&self.inner.runtime),
            device,
            Some(Arc::downgrade(&self.inner)),
        );
        let mut registry = self.inner.registry.lock();
        if registry.closed {
            child.registry.lock().closed = true;
        } else {
            registry.children.retain(|c| c.strong_count() > 0);
            registry.children.push(Arc::downgrade(&child));
        }
        drop(registry);
        NdManager::from_inner(child)
    }

    /// Number of live arrays owned by this scope.
    pub fn len(&self) -> usize {
        self.inner.registry.lock().arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.registry.lock().closed
    }

    pub fn contains(&self, array: &NdArray) -> bool {
        self.inner.registry.lock().arrays.contains_key(&array.id())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(NdError::invalid("scope is closed"))
        } else {
            Ok(())
        }
    }

    /// Take ownership of a native handle with known metadata.
    pub fn from_raw_with(&self, handle: RawHandle, desc: &DataDesc) -> Result<NdArray> {
        let inner = ArrayInner::new(handle, Arc::clone(&self.inner.runtime), Some(desc));
        attach(Some(&self.inner), inner)
    }

    /// Take ownership of a native handle. Metadata is fetched on first use.
    pub fn from_raw(&self, handle: RawHandle) -> Result<NdArray> {
        let inner = ArrayInner::new(handle, Arc::clone(&self.inner.runtime), None);
        attach(Some(&self.inner), inner)
    }

    /// Uninitialized dense array on this scope's device.
    pub fn create(&self, shape: impl Into<Shape>, dtype: DType) -> Result<NdArray> {
        self.create_on(self.device(), shape, dtype, SparseFormat::Dense)
    }

    pub fn create_on(
        &self,
        device: Device,
        shape: impl Into<Shape>,
        dtype: DType,
        sparse: SparseFormat,
    ) -> Result<NdArray> {
        self.ensure_open()?;
        let shape = shape.into();
        let handle = self
            .inner
            .runtime
            .lib()
            .create(device, &shape, dtype, sparse, false)?;
        let desc = DataDesc::new(shape, dtype).on(device).with_sparse(sparse);
        self.from_raw_with(handle, &desc)
    }

    fn filled(&self, op: &str, shape: Shape, dtype: DType) -> Result<NdArray> {
        self.ensure_open()?;
        let params = OpParams::new()
            .shape("shape", &shape)
            .device("ctx", self.device())
            .dtype("dtype", dtype);
        let handles = self.inner.runtime.invoke(op, &[], None, &params)?;
        let desc = DataDesc::new(shape, dtype).on(self.device());
        // own every returned handle before anything can fail
        let inners: Vec<Arc<ArrayInner>> = handles
            .into_iter()
            .map(|h| ArrayInner::new(h, Arc::clone(&self.inner.runtime), Some(&desc)))
            .collect();
        let mut arrays = inners
            .into_iter()
            .map(|inner| attach(Some(&self.inner), inner))
            .collect::<Result<Vec<_>>>()?;
        arrays
            .pop()
            .ok_or_else(|| NdError::native(op, "operator returned no output"))
    }

    pub fn zeros(&self, shape: impl Into<Shape>, dtype: DType) -> Result<NdArray> {
        self.filled("_zeros", shape.into(), dtype)
    }

    pub fn ones(&self, shape: impl Into<Shape>, dtype: DType) -> Result<NdArray> {
        self.filled("_ones", shape.into(), dtype)
    }

    /// Array initialized from host data; `data.len()` must equal the
    /// element count of `shape`.
    pub fn from_slice<T: Element>(&self, data: &[T], shape: impl Into<Shape>) -> Result<NdArray> {
        let shape = shape.into();
        if data.len() != shape.size() {
            return Err(NdError::invalid(format!(
                "{} values cannot fill shape {shape}",
                data.len()
            )));
        }
        let array = self.create(shape, T::DTYPE)?;
        array.set(data)?;
        Ok(array)
    }

    /// Move `array` into this scope, removing it from its previous one.
    pub fn adopt(&self, array: &NdArray) -> Result<()> {
        if !Arc::ptr_eq(&self.inner.runtime, array.runtime()) {
            return Err(NdError::invalid("array belongs to a different engine"));
        }
        if array.is_released() {
            return Err(NdError::invalid("cannot adopt a released array"));
        }
        let inner = &array.inner;
        let mut owner = inner.owner.lock();
        let prev = match owner.as_ref() {
            None => None,
            Some(weak) => match weak.upgrade() {
                Some(prev) => Some(prev),
                None => return Err(NdError::invalid("previous scope is closing")),
            },
        };
        let result = self.inner.move_in(inner, prev.as_deref());
        if result.is_ok() {
            *owner = Some(Arc::downgrade(&self.inner));
        }
        // the previous scope may close on drop and needs the owner lock
        drop(owner);
        drop(prev);
        result
    }

    /// Release every owned array, then close child scopes. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl fmt::Debug for NdManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("NdManager")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device)
            .field("arrays", &registry.arrays.len())
            .field("closed", &registry.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndbind_ref::ReferenceLibrary;

    fn setup() -> (Arc<ReferenceLibrary>, NdManager) {
        let lib = Arc::new(ReferenceLibrary::new());
        let runtime = Runtime::new(lib.clone()).unwrap();
        (lib, NdManager::root(runtime, Device::Cpu))
    }

    #[test]
    fn test_close_releases_children_too() {
        let (lib, root) = setup();
        let child = root.new_sub_manager();
        let grandchild = child.new_sub_manager();
        root.create([2], DType::F32).unwrap();
        child.create([2], DType::F32).unwrap();
        grandchild.create([2], DType::F32).unwrap();
        assert_eq!(lib.live_handles(), 3);

        root.close();
        assert!(child.is_closed() && grandchild.is_closed());
        assert_eq!(lib.live_handles(), 0);
        assert_eq!(lib.free_calls(), 3);
    }

    #[test]
    fn test_dropping_scope_closes_it() {
        let (lib, root) = setup();
        {
            let scope = root.new_sub_manager();
            scope.create([4], DType::F32).unwrap();
            assert_eq!(lib.live_handles(), 1);
        }
        assert_eq!(lib.live_handles(), 0);
    }

    #[test]
    fn test_closed_scope_rejects_new_arrays() {
        let (lib, root) = setup();
        let scope = root.new_sub_manager();
        scope.close();
        assert!(matches!(scope.create([1], DType::F32), Err(NdError::InvalidArgument(_))));
        assert!(scope.new_sub_manager().is_closed());
        assert_eq!(lib.created_handles(), 0);
    }

    #[test]
    fn test_from_slice_checks_length() {
        let (_lib, root) = setup();
        assert!(root.from_slice(&[1.0f32, 2.0], [3]).is_err());
        let a = root.from_slice(&[1i32, 2, 3], [3]).unwrap();
        assert_eq!(a.dtype().unwrap(), DType::I32);
        assert!(root.contains(&a));
    }

    #[test]
    fn test_parent_link() {
        let (_lib, root) = setup();
        let child = root.new_sub_manager_on(Device::Cpu);
        assert_eq!(child.parent().unwrap().id(), root.id());
        assert!(root.parent().is_none());
    }
}
