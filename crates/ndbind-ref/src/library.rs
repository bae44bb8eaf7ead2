//! [`ReferenceLibrary`]: the reference engine behind the native boundary.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use ndbind_core::element::{read_as_f64, write_from_f64};
use ndbind_core::{DType, Device, GradReq, NdError, OpParams, Result, Shape, SparseFormat};
use ndbind_native::{NativeLibrary, OpHandle, RawHandle};

use crate::ops::{self, Op, Operand};
use crate::store::{Entry, View};
use crate::tape::{self, Mark, Node, Tape, Tracked};

/// Deferred computation, run when a wait or host copy drains the queue.
type Task = Box<dyn FnOnce() -> Result<()> + Send>;

#[derive(Default)]
struct State {
    next_id: u64,
    entries: HashMap<u64, Entry>,
    tape: Tape,
    created: usize,
    free_calls: usize,
    waits: usize,
    wait_alls: usize,
    seed: Option<u32>,
}

impl State {
    fn entry(&self, handle: RawHandle) -> Result<&Entry> {
        self.entries
            .get(&handle.id())
            .ok_or_else(|| NdError::native("lookup", format!("unknown array handle {}", handle.id())))
    }

    fn insert(&mut self, entry: Entry) -> RawHandle {
        self.next_id += 1;
        self.created += 1;
        let handle = RawHandle::from_id(self.next_id);
        trace!("created {handle:?} {} {}", entry.view.shape, entry.view.dtype);
        self.entries.insert(self.next_id, entry);
        handle
    }
}

/// In-process engine with deferred execution and a recorded autograd tape.
///
/// Array values live in host memory regardless of the device an array is
/// created on; `with_gpus` only controls which device ordinals are accepted.
pub struct ReferenceLibrary {
    gpus: usize,
    state: Mutex<State>,
    queue: Mutex<VecDeque<Task>>,
}

impl Default for ReferenceLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceLibrary {
    pub fn new() -> Self {
        Self::with_gpus(0)
    }

    /// An engine reporting `gpus` simulated accelerator devices.
    pub fn with_gpus(gpus: usize) -> Self {
        debug!("reference engine with {gpus} simulated gpu(s)");
        Self {
            gpus,
            state: Mutex::new(State::default()),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Handles created and not yet freed.
    pub fn live_handles(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Every handle ever created, views and gradients included.
    pub fn created_handles(&self) -> usize {
        self.state.lock().created
    }

    /// Calls to `free`, successful or not.
    pub fn free_calls(&self) -> usize {
        self.state.lock().free_calls
    }

    /// Calls to `wait_to_read` and `wait_to_write`.
    pub fn wait_calls(&self) -> usize {
        self.state.lock().waits
    }

    pub fn wait_all_calls(&self) -> usize {
        self.state.lock().wait_alls
    }

    /// Operators submitted but not yet executed.
    pub fn pending_ops(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().tape.is_recording()
    }

    pub fn is_training(&self) -> bool {
        self.state.lock().tape.is_training()
    }

    pub fn recorded_ops(&self) -> usize {
        self.state.lock().tape.len()
    }

    pub fn seed(&self) -> Option<u32> {
        self.state.lock().seed
    }

    fn check_device(&self, device: Device) -> Result<()> {
        match device {
            Device::Gpu(idx) if idx >= self.gpus => Err(NdError::native(
                "device",
                format!("{device} not available ({} gpu(s))", self.gpus),
            )),
            _ => Ok(()),
        }
    }

    /// Execute every queued task in submission order. The first failure is
    /// reported after the queue is empty.
    fn drain(&self) -> Result<()> {
        let mut queue = self.queue.lock();
        let mut first_err = None;
        while let Some(task) = queue.pop_front() {
            if let Err(e) = task() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn view_of(&self, handle: RawHandle) -> Result<View> {
        Ok(self.state.lock().entry(handle)?.view.clone())
    }

    fn derive(&self, handle: RawHandle, f: impl FnOnce(&View) -> Result<View>) -> Result<RawHandle> {
        let mut state = self.state.lock();
        let entry = state.entry(handle)?;
        let derived = Entry {
            view: f(&entry.view)?,
            device: entry.device,
            sparse: entry.sparse,
        };
        Ok(state.insert(derived))
    }
}

impl NativeLibrary for ReferenceLibrary {
    fn name(&self) -> &str {
        "Reference"
    }

    fn version(&self) -> Result<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }

    fn gpu_count(&self) -> Result<usize> {
        Ok(self.gpus)
    }

    fn list_ops(&self) -> Result<Vec<String>> {
        Ok(Op::ALL.iter().map(|op| op.name().to_string()).collect())
    }

    fn get_op(&self, name: &str) -> Result<OpHandle> {
        Op::from_name(name)
            .map(Op::handle)
            .ok_or_else(|| NdError::native("get_op", format!("operator {name} is not registered")))
    }

    fn create(
        &self,
        device: Device,
        shape: &Shape,
        dtype: DType,
        sparse: SparseFormat,
        _delay_alloc: bool,
    ) -> Result<RawHandle> {
        self.check_device(device)?;
        let entry = Entry {
            view: View::zeros(shape.clone(), dtype),
            device,
            sparse,
        };
        Ok(self.state.lock().insert(entry))
    }

    fn free(&self, handle: RawHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.free_calls += 1;
        if state.entries.remove(&handle.id()).is_none() {
            return Err(NdError::native(
                "free",
                format!("handle {} is not live (double free?)", handle.id()),
            ));
        }
        state.tape.unmark(handle.id());
        trace!("freed {handle:?}");
        Ok(())
    }

    fn shape(&self, handle: RawHandle) -> Result<Shape> {
        Ok(self.state.lock().entry(handle)?.view.shape.clone())
    }

    fn dtype(&self, handle: RawHandle) -> Result<DType> {
        Ok(self.state.lock().entry(handle)?.view.dtype)
    }

    fn device(&self, handle: RawHandle) -> Result<Device> {
        Ok(self.state.lock().entry(handle)?.device)
    }

    fn storage_type(&self, handle: RawHandle) -> Result<SparseFormat> {
        Ok(self.state.lock().entry(handle)?.sparse)
    }

    fn sync_copy_from_cpu(&self, handle: RawHandle, data: &[u8], len: usize) -> Result<()> {
        let view = self.view_of(handle)?;
        let width = view.dtype.element_size();
        if len != view.len() || data.len() != len * width {
            return Err(NdError::native(
                "sync_copy_from_cpu",
                format!(
                    "array holds {} elements, got {len} elements in {} bytes",
                    view.len(),
                    data.len()
                ),
            ));
        }
        self.drain()?;
        let values: Vec<f64> = data
            .chunks_exact(width)
            .map(|raw| read_as_f64(view.dtype, raw))
            .collect();
        view.write(&values);
        Ok(())
    }

    fn sync_copy_to_cpu(&self, handle: RawHandle, out: &mut [u8], len: usize) -> Result<()> {
        let view = self.view_of(handle)?;
        let width = view.dtype.element_size();
        if len != view.len() || out.len() != len * width {
            return Err(NdError::native(
                "sync_copy_to_cpu",
                format!(
                    "array holds {} elements, host buffer has room for {len} in {} bytes",
                    view.len(),
                    out.len()
                ),
            ));
        }
        self.drain()?;
        let mut raw = Vec::with_capacity(out.len());
        for v in view.read() {
            write_from_f64(view.dtype, v, &mut raw);
        }
        out.copy_from_slice(&raw);
        Ok(())
    }

    fn wait_to_read(&self, handle: RawHandle) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.entry(handle)?;
            state.waits += 1;
        }
        self.drain()
    }

    fn wait_to_write(&self, handle: RawHandle) -> Result<()> {
        self.wait_to_read(handle)
    }

    fn wait_all(&self) -> Result<()> {
        self.state.lock().wait_alls += 1;
        self.drain()
    }

    fn invoke(
        &self,
        op: OpHandle,
        inputs: &[RawHandle],
        outputs: Option<&[RawHandle]>,
        params: &OpParams,
    ) -> Result<Vec<RawHandle>> {
        let op = Op::from_handle(op)
            .ok_or_else(|| NdError::native("invoke", format!("unknown operator handle {op:?}")))?;
        let mut state = self.state.lock();

        let in_entries = inputs
            .iter()
            .map(|&h| state.entry(h).cloned())
            .collect::<Result<Vec<_>>>()?;
        let metas: Vec<(Shape, DType)> = in_entries
            .iter()
            .map(|e| (e.view.shape.clone(), e.view.dtype))
            .collect();
        let inferred = ops::infer(op, &metas, params)?;

        let (out_handles, out_views) = match outputs {
            Some(outs) => {
                if outs.len() != inferred.len() {
                    return Err(NdError::native(
                        op.name(),
                        format!("expected {} outputs, got {}", inferred.len(), outs.len()),
                    ));
                }
                let mut views = Vec::with_capacity(outs.len());
                for (&h, (shape, _)) in outs.iter().zip(&inferred) {
                    let view = state.entry(h)?.view.clone();
                    if view.len() != shape.size() {
                        return Err(NdError::native(
                            op.name(),
                            format!("output {} cannot hold result {shape}", view.shape),
                        ));
                    }
                    views.push(view);
                }
                (outs.to_vec(), views)
            }
            None => {
                let device = in_entries
                    .first()
                    .map(|e| e.device)
                    .or_else(|| params.get_device("ctx"))
                    .unwrap_or_default();
                self.check_device(device)?;
                let mut handles = Vec::with_capacity(inferred.len());
                let mut views = Vec::with_capacity(inferred.len());
                for (shape, dtype) in inferred {
                    let view = View::zeros(shape, dtype);
                    handles.push(state.insert(Entry::dense(view.clone(), device)));
                    views.push(view);
                }
                (handles, views)
            }
        };

        let in_views: Vec<View> = in_entries.into_iter().map(|e| e.view).collect();
        state.tape.record(Node {
            op,
            params: params.clone(),
            inputs: inputs
                .iter()
                .zip(&in_views)
                .map(|(h, v)| Tracked { id: h.id(), view: v.clone() })
                .collect(),
            outputs: out_handles
                .iter()
                .zip(&out_views)
                .map(|(h, v)| Tracked { id: h.id(), view: v.clone() })
                .collect(),
        });

        let params = params.clone();
        let task: Task = Box::new(move || {
            let operands: Vec<Operand> = in_views.iter().map(|v| (v.read(), v.shape.clone())).collect();
            let results = ops::compute(op, &operands, &params)?;
            for (view, values) in out_views.iter().zip(results) {
                view.write(&values);
            }
            Ok(())
        });
        self.queue.lock().push_back(task);
        Ok(out_handles)
    }

    fn at(&self, handle: RawHandle, index: usize) -> Result<RawHandle> {
        self.derive(handle, |view| {
            let dims = view.shape.dims();
            if dims.is_empty() || index >= dims[0] {
                return Err(NdError::native(
                    "at",
                    format!("index {index} out of range for shape {}", view.shape),
                ));
            }
            let row = view.len() / dims[0];
            let shape = if dims.len() > 1 {
                Shape::new(&dims[1..])
            } else {
                Shape::new(&[1])
            };
            Ok(view.window(index * row, shape))
        })
    }

    fn slice(&self, handle: RawHandle, begin: usize, end: usize) -> Result<RawHandle> {
        self.derive(handle, |view| {
            let dims = view.shape.dims();
            if dims.is_empty() || begin >= end || end > dims[0] {
                return Err(NdError::native(
                    "slice",
                    format!("range [{begin}, {end}) out of range for shape {}", view.shape),
                ));
            }
            let row = view.len() / dims[0];
            Ok(view.window(begin * row, view.shape.with_dim(0, end - begin)))
        })
    }

    fn reshape(&self, handle: RawHandle, dims: &[i64], _reverse: bool) -> Result<RawHandle> {
        self.derive(handle, |view| {
            let shape = view.shape.resolve_reshape(dims).ok_or_else(|| {
                NdError::native("reshape", format!("cannot reshape {} into {dims:?}", view.shape))
            })?;
            Ok(view.reshaped(shape))
        })
    }

    fn mark_variables(&self, vars: &[RawHandle], reqs: &[GradReq], grads: &[RawHandle]) -> Result<()> {
        if vars.len() != reqs.len() || vars.len() != grads.len() {
            return Err(NdError::native(
                "mark_variables",
                "variables, requests and gradients differ in length",
            ));
        }
        let mut state = self.state.lock();
        for ((&var, &req), &grad) in vars.iter().zip(reqs).zip(grads) {
            let var_shape = state.entry(var)?.view.shape.clone();
            let grad_view = state.entry(grad)?.view.clone();
            if grad_view.shape != var_shape {
                return Err(NdError::native(
                    "mark_variables",
                    format!("gradient {} does not match variable {var_shape}", grad_view.shape),
                ));
            }
            state.tape.mark(var.id(), Mark { req, grad: grad_view });
        }
        Ok(())
    }

    fn backward(
        &self,
        heads: &[RawHandle],
        head_grads: &[Option<RawHandle>],
        retain_graph: bool,
        is_training: bool,
    ) -> Result<()> {
        self.drain()?;
        let (nodes, marked, seeds) = {
            let mut state = self.state.lock();
            let mut seeds = Vec::with_capacity(heads.len());
            for (i, &head) in heads.iter().enumerate() {
                let len = state.entry(head)?.view.len();
                let seed = match head_grads.get(i).copied().flatten() {
                    Some(g) => {
                        let g = state.entry(g)?.view.read();
                        if g.len() != len {
                            return Err(NdError::native(
                                "backward",
                                format!("head gradient has {} elements, head has {len}", g.len()),
                            ));
                        }
                        g
                    }
                    None => vec![1.0; len],
                };
                seeds.push((head.id(), seed));
            }
            let (nodes, marked) = state.tape.take_pass(retain_graph);
            (nodes, marked, seeds)
        };
        trace!(
            "backward over {} recorded op(s), training={is_training}",
            nodes.len()
        );
        tape::backward(&nodes, &marked, seeds)
    }

    fn get_grad(&self, handle: RawHandle) -> Result<Option<RawHandle>> {
        let mut state = self.state.lock();
        let device = state.entry(handle)?.device;
        let Some(grad) = state.tape.grad_of(handle.id()).cloned() else {
            return Ok(None);
        };
        Ok(Some(state.insert(Entry::dense(grad, device))))
    }

    fn set_recording(&self, recording: bool) -> Result<bool> {
        Ok(self.state.lock().tape.set_recording(recording))
    }

    fn set_training(&self, training: bool) -> Result<bool> {
        Ok(self.state.lock().tape.set_training(training))
    }

    fn random_seed(&self, seed: u32) -> Result<()> {
        self.state.lock().seed = Some(seed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndbind_core::element::{decode_le, encode_le};

    fn upload(lib: &ReferenceLibrary, values: &[f32], dims: &[usize]) -> RawHandle {
        let h = lib
            .create(Device::Cpu, &Shape::new(dims), DType::F32, SparseFormat::Dense, false)
            .unwrap();
        lib.sync_copy_from_cpu(h, &encode_le(values), values.len()).unwrap();
        h
    }

    fn download(lib: &ReferenceLibrary, h: RawHandle) -> Vec<f32> {
        let n = lib.shape(h).unwrap().size();
        let mut raw = vec![0u8; n * 4];
        lib.sync_copy_to_cpu(h, &mut raw, n).unwrap();
        decode_le(&raw)
    }

    fn call(lib: &ReferenceLibrary, name: &str, inputs: &[RawHandle], params: &OpParams) -> Vec<RawHandle> {
        let op = lib.get_op(name).unwrap();
        lib.invoke(op, inputs, None, params).unwrap()
    }

    #[test]
    fn test_invoke_is_deferred_until_read() {
        let lib = ReferenceLibrary::new();
        let a = upload(&lib, &[1.0, 2.0], &[2]);
        let out = call(&lib, "elemwise_add", &[a, a], &OpParams::new());
        assert_eq!(lib.pending_ops(), 1);
        // metadata never forces execution
        assert_eq!(lib.shape(out[0]).unwrap(), Shape::new(&[2]));
        assert_eq!(lib.pending_ops(), 1);
        lib.wait_to_read(out[0]).unwrap();
        assert_eq!(lib.pending_ops(), 0);
        assert_eq!(download(&lib, out[0]), vec![2.0, 4.0]);
    }

    #[test]
    fn test_queue_runs_in_submission_order() {
        let lib = ReferenceLibrary::new();
        let a = upload(&lib, &[1.0, 2.0], &[2]);
        let b = call(&lib, "_mul_scalar", &[a], &OpParams::new().float("scalar", 3.0))[0];
        let c = call(&lib, "_plus_scalar", &[b], &OpParams::new().float("scalar", 1.0))[0];
        assert_eq!(lib.pending_ops(), 2);
        assert_eq!(download(&lib, c), vec![4.0, 7.0]);
    }

    #[test]
    fn test_double_free_is_reported() {
        let lib = ReferenceLibrary::new();
        let a = upload(&lib, &[1.0], &[1]);
        assert_eq!(lib.live_handles(), 1);
        lib.free(a).unwrap();
        assert!(lib.free(a).is_err());
        assert_eq!(lib.free_calls(), 2);
        assert_eq!(lib.live_handles(), 0);
        assert!(lib.shape(a).is_err());
    }

    #[test]
    fn test_views_share_memory() {
        let lib = ReferenceLibrary::new();
        let a = upload(&lib, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
        let row = lib.at(a, 1).unwrap();
        assert_eq!(lib.shape(row).unwrap(), Shape::new(&[2]));
        assert_eq!(download(&lib, row), vec![3.0, 4.0]);

        let tail = lib.slice(a, 1, 3).unwrap();
        assert_eq!(lib.shape(tail).unwrap(), Shape::new(&[2, 2]));

        let flat = lib.reshape(a, &[-1], false).unwrap();
        lib.sync_copy_from_cpu(flat, &encode_le(&[0.0f32; 6]), 6).unwrap();
        assert_eq!(download(&lib, row), vec![0.0, 0.0]);

        assert!(lib.at(a, 3).is_err());
        assert!(lib.slice(a, 2, 2).is_err());
        assert!(lib.reshape(a, &[4, -1], false).is_err());
    }

    #[test]
    fn test_copyto_converts_dtype() {
        let lib = ReferenceLibrary::new();
        let a = upload(&lib, &[1.5, -2.5], &[2]);
        let dst = lib
            .create(Device::Cpu, &Shape::new(&[2]), DType::I32, SparseFormat::Dense, false)
            .unwrap();
        let op = lib.get_op("_copyto").unwrap();
        let out = lib.invoke(op, &[a], Some(&[dst]), &OpParams::new()).unwrap();
        assert_eq!(out, vec![dst]);
        let mut raw = vec![0u8; 8];
        lib.sync_copy_to_cpu(dst, &mut raw, 2).unwrap();
        assert_eq!(decode_le::<i32>(&raw), vec![1, -2]);
    }

    #[test]
    fn test_gpu_requires_simulated_device() {
        let cpu_only = ReferenceLibrary::new();
        let err = cpu_only.create(Device::Gpu(0), &Shape::new(&[1]), DType::F32, SparseFormat::Dense, false);
        assert!(matches!(err, Err(NdError::NativeExecution { .. })));

        let lib = ReferenceLibrary::with_gpus(2);
        let h = lib
            .create(Device::Gpu(1), &Shape::new(&[1]), DType::F32, SparseFormat::Csr, true)
            .unwrap();
        assert_eq!(lib.device(h).unwrap(), Device::Gpu(1));
        assert_eq!(lib.storage_type(h).unwrap(), SparseFormat::Csr);
    }

    #[test]
    fn test_size_mismatch_on_host_copy() {
        let lib = ReferenceLibrary::new();
        let a = upload(&lib, &[1.0, 2.0], &[2]);
        assert!(lib.sync_copy_from_cpu(a, &encode_le(&[1.0f32]), 1).is_err());
        let mut small = vec![0u8; 4];
        assert!(lib.sync_copy_to_cpu(a, &mut small, 1).is_err());
    }

    #[test]
    fn test_backward_through_recorded_ops() {
        let lib = ReferenceLibrary::new();
        let x = upload(&lib, &[1.0, 2.0, 3.0], &[3]);
        let grad = lib
            .create(Device::Cpu, &Shape::new(&[3]), DType::F32, SparseFormat::Dense, false)
            .unwrap();
        lib.mark_variables(&[x], &[GradReq::Write], &[grad]).unwrap();

        assert!(!lib.set_recording(true).unwrap());
        let sq = call(&lib, "elemwise_mul", &[x, x], &OpParams::new())[0];
        let total = call(&lib, "sum", &[sq], &OpParams::new())[0];
        assert_eq!(lib.recorded_ops(), 2);

        lib.backward(&[total], &[None], false, true).unwrap();
        assert_eq!(lib.recorded_ops(), 0);
        lib.set_recording(false).unwrap();
        let g = lib.get_grad(x).unwrap().unwrap();
        assert_eq!(download(&lib, g), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_unmarked_array_has_no_gradient() {
        let lib = ReferenceLibrary::new();
        let x = upload(&lib, &[1.0], &[1]);
        assert!(lib.get_grad(x).unwrap().is_none());
    }

    #[test]
    fn test_backward_through_argsort_fails() {
        let lib = ReferenceLibrary::new();
        let x = upload(&lib, &[2.0, 1.0], &[2]);
        let grad = lib
            .create(Device::Cpu, &Shape::new(&[2]), DType::F32, SparseFormat::Dense, false)
            .unwrap();
        lib.mark_variables(&[x], &[GradReq::Write], &[grad]).unwrap();
        lib.set_recording(true).unwrap();
        let idx = call(&lib, "argsort", &[x], &OpParams::new())[0];
        let err = lib.backward(&[idx], &[None], false, true).unwrap_err();
        assert!(matches!(err, NdError::NativeExecution { .. }));
        lib.set_recording(false).unwrap();
    }

    #[test]
    fn test_unknown_operator() {
        let lib = ReferenceLibrary::new();
        assert!(lib.get_op("convolution").is_err());
        assert!(lib.invoke(OpHandle::from_id(999), &[], None, &OpParams::new()).is_err());
    }

    #[test]
    fn test_zeros_on_context() {
        let lib = ReferenceLibrary::with_gpus(1);
        let params = OpParams::new()
            .shape("shape", &Shape::new(&[2, 2]))
            .device("ctx", Device::Gpu(0))
            .dtype("dtype", DType::F64);
        let out = call(&lib, "_ones", &[], &params)[0];
        assert_eq!(lib.device(out).unwrap(), Device::Gpu(0));
        assert_eq!(lib.dtype(out).unwrap(), DType::F64);
        let mut raw = vec![0u8; 32];
        lib.sync_copy_to_cpu(out, &mut raw, 4).unwrap();
        assert_eq!(decode_le::<f64>(&raw), vec![1.0; 4]);
    }
}
