//! Minimal in-memory library for unit tests of the boundary types.

use std::collections::HashSet;

use parking_lot::Mutex;

use ndbind_core::{DType, Device, NdError, OpParams, Result, Shape, SparseFormat};

use crate::handle::{OpHandle, RawHandle};
use crate::library::NativeLibrary;

const OPS: [&str; 3] = ["_copyto", "elemwise_add", "sum"];

#[derive(Default)]
struct State {
    next: u64,
    live: HashSet<u64>,
    frees: usize,
    invoked: Vec<String>,
}

pub(crate) struct MockLibrary {
    state: Mutex<State>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next: 1,
                ..State::default()
            }),
        }
    }

    pub fn alloc(&self) -> RawHandle {
        let mut s = self.state.lock();
        let id = s.next;
        s.next += 1;
        s.live.insert(id);
        RawHandle::from_id(id)
    }

    pub fn free_calls(&self) -> usize {
        self.state.lock().frees
    }

    pub fn live(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn invocations(&self) -> Vec<String> {
        self.state.lock().invoked.clone()
    }
}

impl NativeLibrary for MockLibrary {
    fn name(&self) -> &str {
        "mock"
    }

    fn version(&self) -> Result<String> {
        Ok("0.0.0".into())
    }

    fn gpu_count(&self) -> Result<usize> {
        Ok(0)
    }

    fn list_ops(&self) -> Result<Vec<String>> {
        Ok(OPS.iter().map(|s| s.to_string()).collect())
    }

    fn get_op(&self, name: &str) -> Result<OpHandle> {
        OPS.iter()
            .position(|&op| op == name)
            .map(|i| OpHandle::from_id(i as u64 + 1))
            .ok_or_else(|| NdError::unsupported(name))
    }

    fn create(&self, _: Device, _: &Shape, _: DType, _: SparseFormat, _: bool) -> Result<RawHandle> {
        Ok(self.alloc())
    }

    fn free(&self, handle: RawHandle) -> Result<()> {
        let mut s = self.state.lock();
        s.frees += 1;
        if s.live.remove(&handle.id()) {
            Ok(())
        } else {
            Err(NdError::native("free", format!("unknown handle {}", handle.id())))
        }
    }

    fn shape(&self, _: RawHandle) -> Result<Shape> {
        Ok(Shape::scalar())
    }

    fn dtype(&self, _: RawHandle) -> Result<DType> {
        Ok(DType::F32)
    }

    fn device(&self, _: RawHandle) -> Result<Device> {
        Ok(Device::Cpu)
    }

    fn storage_type(&self, _: RawHandle) -> Result<SparseFormat> {
        Ok(SparseFormat::Dense)
    }

    fn sync_copy_from_cpu(&self, _: RawHandle, _: &[u8], _: usize) -> Result<()> {
        Ok(())
    }

    fn sync_copy_to_cpu(&self, _: RawHandle, _: &mut [u8], _: usize) -> Result<()> {
        Ok(())
    }

    fn wait_to_read(&self, _: RawHandle) -> Result<()> {
        Ok(())
    }

    fn wait_to_write(&self, _: RawHandle) -> Result<()> {
        Ok(())
    }

    fn wait_all(&self) -> Result<()> {
        Ok(())
    }

    fn invoke(
        &self,
        op: OpHandle,
        _inputs: &[RawHandle],
        outputs: Option<&[RawHandle]>,
        _params: &OpParams,
    ) -> Result<Vec<RawHandle>> {
        let name = (op.id() as usize)
            .checked_sub(1)
            .and_then(|i| OPS.get(i))
            .ok_or_else(|| NdError::native("invoke", "bad op handle"))?;
        self.state.lock().invoked.push(name.to_string());
        match outputs {
            Some(outs) => Ok(outs.to_vec()),
            None => Ok(vec![self.alloc()]),
        }
    }
}
