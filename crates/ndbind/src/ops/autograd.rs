//! Native autograd: variable marking, backward passes and recording scopes.

use std::sync::Arc;

use tracing::warn;

use ndbind_core::{GradReq, NdError, Result, SparseFormat};

use crate::array::NdArray;
use crate::runtime::Runtime;

impl NdArray {
    /// Mark this array as a variable whose gradient is written on backward.
    pub fn attach_grad(&self) -> Result<()> {
        self.attach_grad_with(GradReq::Write, None)
    }

    /// Mark this array as a variable with an explicit request type. The
    /// gradient buffer is allocated in this array's scope, zeroed, in
    /// `sparse` storage when given. Attaching again releases the buffer of
    /// the previous attach.
    pub fn attach_grad_with(&self, req: GradReq, sparse: Option<SparseFormat>) -> Result<()> {
        let grad = match sparse.filter(|s| s.is_sparse()) {
            None => self.zeros_like()?,
            Some(format) => self.new_sibling(self.device()?, self.shape()?, self.dtype()?, format)?,
        };
        if let Err(e) = self
            .lib()
            .mark_variables(&[self.handle()?], &[req], &[grad.handle()?])
        {
            grad.close();
            return Err(e);
        }
        let prev = self.inner.grad.lock().replace(grad);
        if let Some(prev) = prev {
            prev.close();
        }
        Ok(())
    }

    /// Backward pass from this array, seeded with ones.
    pub fn backward(&self) -> Result<()> {
        self.backward_with(None, false, true)
    }

    /// Backward pass from this array. `out_grad` seeds the head gradient;
    /// `None` seeds with ones.
    pub fn backward_with(&self, out_grad: Option<&NdArray>, retain_graph: bool, is_training: bool) -> Result<()> {
        let seed = match out_grad {
            Some(g) => {
                if !self.same_engine(g) {
                    return Err(NdError::invalid("head gradient belongs to a different engine"));
                }
                Some(g.handle()?)
            }
            None => None,
        };
        self.lib()
            .backward(&[self.handle()?], &[seed], retain_graph, is_training)
    }

    /// The gradient buffer of a variable, as a new array in this scope.
    pub fn gradient(&self) -> Result<NdArray> {
        let handle = self
            .lib()
            .get_grad(self.handle()?)?
            .ok_or_else(|| NdError::invalid("no gradient attached; call attach_grad first"))?;
        self.adopt_output(handle, None)
    }
}

/// Records operations for autograd while alive.
///
/// Creation turns native recording and training mode on; dropping the
/// collector restores whatever was set before, so collectors nest.
pub struct GradientCollector {
    runtime: Arc<Runtime>,
    prev_recording: bool,
    prev_training: bool,
}

impl GradientCollector {
    pub(crate) fn begin(runtime: Arc<Runtime>) -> Result<Self> {
        let lib = runtime.lib();
        let prev_recording = lib.set_recording(true)?;
        let prev_training = match lib.set_training(true) {
            Ok(prev) => prev,
            Err(e) => {
                if let Err(rollback) = lib.set_recording(prev_recording) {
                    warn!(error = %rollback, "failed to restore autograd recording state");
                }
                return Err(e);
            }
        };
        Ok(Self {
            runtime,
            prev_recording,
            prev_training,
        })
    }

    /// Backward pass from `target`, seeded with ones.
    pub fn backward(&self, target: &NdArray) -> Result<()> {
        self.backward_with(target, None, false)
    }

    pub fn backward_with(&self, target: &NdArray, out_grad: Option<&NdArray>, retain_graph: bool) -> Result<()> {
        if !Arc::ptr_eq(&self.runtime, target.runtime()) {
            return Err(NdError::invalid("array belongs to a different engine"));
        }
        target.backward_with(out_grad, retain_graph, true)
    }
}

impl Drop for GradientCollector {
    fn drop(&mut self) {
        let lib = self.runtime.lib();
        if let Err(e) = lib.set_recording(self.prev_recording) {
            warn!(error = %e, "failed to restore autograd recording state");
        }
        if let Err(e) = lib.set_training(self.prev_training) {
            warn!(error = %e, "failed to restore training state");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndbind_ref::ReferenceLibrary;

    use ndbind_core::{Device, OpParams, Result};
    use ndbind_native::{NativeLibrary, OpHandle, RawHandle};

    use crate::{DType, Engine, GradReq, NdError, Shape, SparseFormat};

    /// Reference engine without training mode. With `stuck` set, recording
    /// can be switched on but never off again.
    struct NoTraining {
        inner: Arc<ReferenceLibrary>,
        stuck: bool,
    }

    impl NativeLibrary for NoTraining {
        fn name(&self) -> &str {
            "NoTraining"
        }

        fn version(&self) -> Result<String> {
            self.inner.version()
        }

        fn gpu_count(&self) -> Result<usize> {
            self.inner.gpu_count()
        }

        fn list_ops(&self) -> Result<Vec<String>> {
            self.inner.list_ops()
        }

        fn get_op(&self, name: &str) -> Result<OpHandle> {
            self.inner.get_op(name)
        }

        fn create(
            &self,
            device: Device,
            shape: &Shape,
            dtype: DType,
            sparse: SparseFormat,
            delay_alloc: bool,
        ) -> Result<RawHandle> {
            self.inner.create(device, shape, dtype, sparse, delay_alloc)
        }

        fn free(&self, handle: RawHandle) -> Result<()> {
            self.inner.free(handle)
        }

        fn shape(&self, handle: RawHandle) -> Result<Shape> {
            self.inner.shape(handle)
        }

        fn dtype(&self, handle: RawHandle) -> Result<DType> {
            self.inner.dtype(handle)
        }

        fn device(&self, handle: RawHandle) -> Result<Device> {
            self.inner.device(handle)
        }

        fn storage_type(&self, handle: RawHandle) -> Result<SparseFormat> {
            self.inner.storage_type(handle)
        }

        fn sync_copy_from_cpu(&self, handle: RawHandle, data: &[u8], len: usize) -> Result<()> {
            self.inner.sync_copy_from_cpu(handle, data, len)
        }

        fn sync_copy_to_cpu(&self, handle: RawHandle, out: &mut [u8], len: usize) -> Result<()> {
            self.inner.sync_copy_to_cpu(handle, out, len)
        }

        fn wait_to_read(&self, handle: RawHandle) -> Result<()> {
            self.inner.wait_to_read(handle)
        }

        fn wait_to_write(&self, handle: RawHandle) -> Result<()> {
            self.inner.wait_to_write(handle)
        }

        fn wait_all(&self) -> Result<()> {
            self.inner.wait_all()
        }

        fn invoke(
            &self,
            op: OpHandle,
            inputs: &[RawHandle],
            outputs: Option<&[RawHandle]>,
            params: &OpParams,
        ) -> Result<Vec<RawHandle>> {
            self.inner.invoke(op, inputs, outputs, params)
        }

        fn set_recording(&self, recording: bool) -> Result<bool> {
            if self.stuck && !recording {
                return Err(NdError::native("set_recording", "recording cannot be stopped"));
            }
            self.inner.set_recording(recording)
        }
    }

    fn no_training(stuck: bool) -> (Arc<ReferenceLibrary>, Engine) {
        let lib = Arc::new(ReferenceLibrary::new());
        let wrapped = NoTraining {
            inner: lib.clone(),
            stuck,
        };
        (lib, Engine::with_library(Arc::new(wrapped)).unwrap())
    }

    #[test]
    fn test_collector_restores_state() {
        let lib = Arc::new(ReferenceLibrary::new());
        let engine = Engine::with_library(lib.clone()).unwrap();
        assert!(!lib.is_recording());
        {
            let _outer = engine.new_gradient_collector().unwrap();
            assert!(lib.is_recording() && lib.is_training());
            {
                let _inner = engine.new_gradient_collector().unwrap();
            }
            assert!(lib.is_recording());
        }
        assert!(!lib.is_recording());
        assert!(!lib.is_training());
    }

    #[test]
    fn test_product_gradient() {
        let engine = Engine::new(Default::default()).unwrap();
        let m = engine.new_base_manager();
        let x = m.from_slice(&[1.0f32, 2.0, 3.0], [3]).unwrap();
        x.attach_grad().unwrap();
        {
            let collector = engine.new_gradient_collector().unwrap();
            let y = x.mul(&x).unwrap().sum().unwrap();
            collector.backward(&y).unwrap();
        }
        let grad = x.gradient().unwrap();
        assert_eq!(grad.shape().unwrap(), Shape::new(&[3]));
        assert_eq!(grad.to_f32_vec().unwrap(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_add_request_accumulates() {
        let engine = Engine::new(Default::default()).unwrap();
        let m = engine.new_base_manager();
        let x = m.from_slice(&[1.0f64, 1.0], [2]).unwrap();
        x.attach_grad_with(GradReq::Add, None).unwrap();
        for _ in 0..2 {
            let collector = engine.new_gradient_collector().unwrap();
            let y = x.mul_scalar(3.0).unwrap();
            collector.backward(&y).unwrap();
        }
        assert_eq!(x.gradient().unwrap().to_f64_vec().unwrap(), vec![6.0, 6.0]);
    }

    #[test]
    fn test_failed_begin_rolls_back_recording() {
        let (lib, engine) = no_training(false);
        let err = engine.new_gradient_collector().err().unwrap();
        assert!(matches!(err, NdError::UnsupportedOperation { .. }));
        assert!(!lib.is_recording());
    }

    #[test]
    fn test_failed_rollback_keeps_original_error() {
        let (lib, engine) = no_training(true);
        let err = engine.new_gradient_collector().err().unwrap();
        assert!(matches!(err, NdError::UnsupportedOperation { .. }));
        // the rollback failure is only logged
        assert!(lib.is_recording());
    }

    #[test]
    fn test_reattach_releases_previous_buffer() {
        let lib = Arc::new(ReferenceLibrary::new());
        let engine = Engine::with_library(lib.clone()).unwrap();
        let m = engine.new_base_manager();
        let x = m.from_slice(&[1.0f32, 2.0], [2]).unwrap();
        x.attach_grad().unwrap();
        let live = lib.live_handles();
        let freed = lib.free_calls();

        x.attach_grad_with(GradReq::Add, None).unwrap();
        assert_eq!(lib.live_handles(), live);
        assert_eq!(lib.free_calls(), freed + 1);
        assert_eq!(m.len(), 2);

        {
            let collector = engine.new_gradient_collector().unwrap();
            let y = x.mul_scalar(2.0).unwrap();
            collector.backward(&y).unwrap();
        }
        assert_eq!(x.gradient().unwrap().to_f32_vec().unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_gradient_without_attach() {
        let engine = Engine::new(Default::default()).unwrap();
        let m = engine.new_base_manager();
        let x = m.zeros([2], DType::F32).unwrap();
        assert!(matches!(x.gradient(), Err(NdError::InvalidArgument(_))));
    }

    #[test]
    fn test_sparse_grad_buffer() {
        let engine = Engine::new(Default::default()).unwrap();
        let m = engine.new_base_manager();
        let x = m.ones([2, 2], DType::F32).unwrap();
        x.attach_grad_with(GradReq::Write, Some(SparseFormat::RowSparse)).unwrap();
        assert_eq!(m.len(), 2);
    }
}
