//! Runtime-loaded MXNet C API via dlopen.
//!
//! This avoids pinning to a specific engine build: any `libmxnet` exporting
//! the symbols below works. The library is opened once per engine and the
//! resolved function pointers live as long as the `DylibLibrary`.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::debug;

use ndbind_core::{DType, Device, GradReq, NdError, OpParams, Result, Shape, SparseFormat};

use crate::handle::{OpHandle, RawHandle};
use crate::library::NativeLibrary;

// ---------------------------------------------------------------------------
// C types
// ---------------------------------------------------------------------------

pub type MxUint = u32;
pub type NDArrayHandle = *mut c_void;
pub type AtomicSymbolCreator = *mut c_void;

pub const MX_SUCCESS: c_int = 0;

// aux index arrays of sparse storage are int64
const AUX_DTYPE_INT64: c_int = 6;

// ---------------------------------------------------------------------------
// C API function signatures
// ---------------------------------------------------------------------------

type FnGetLastError = unsafe extern "C" fn() -> *const c_char;
type FnGetVersion = unsafe extern "C" fn(*mut c_int) -> c_int;
type FnGetGpuCount = unsafe extern "C" fn(*mut c_int) -> c_int;
type FnRandomSeed = unsafe extern "C" fn(c_int) -> c_int;
type FnNDArrayCreateEx = unsafe extern "C" fn(
    *const MxUint,  // shape
    MxUint,         // ndim
    c_int,          // dev_type
    c_int,          // dev_id
    c_int,          // delay_alloc
    c_int,          // dtype
    *mut NDArrayHandle,
) -> c_int;
type FnNDArrayCreateSparseEx = unsafe extern "C" fn(
    c_int,          // storage_type
    *const MxUint,  // shape
    MxUint,         // ndim
    c_int,          // dev_type
    c_int,          // dev_id
    c_int,          // delay_alloc
    c_int,          // dtype
    MxUint,         // num_aux
    *mut c_int,     // aux_type
    *mut MxUint,    // aux_ndims
    *const MxUint,  // aux_shape
    *mut NDArrayHandle,
) -> c_int;
type FnNDArrayFree = unsafe extern "C" fn(NDArrayHandle) -> c_int;
type FnNDArrayGetShape = unsafe extern "C" fn(
    NDArrayHandle, *mut MxUint, *mut *const MxUint,
) -> c_int;
type FnNDArrayGetInt = unsafe extern "C" fn(NDArrayHandle, *mut c_int) -> c_int;
type FnNDArrayGetContext = unsafe extern "C" fn(
    NDArrayHandle, *mut c_int, *mut c_int,
) -> c_int;
type FnNDArraySyncCopyFromCpu = unsafe extern "C" fn(
    NDArrayHandle, *const c_void, usize,
) -> c_int;
type FnNDArraySyncCopyToCpu = unsafe extern "C" fn(
    NDArrayHandle, *mut c_void, usize,
) -> c_int;
type FnNDArrayWait = unsafe extern "C" fn(NDArrayHandle) -> c_int;
type FnNDArrayWaitAll = unsafe extern "C" fn() -> c_int;
type FnNDArrayAt = unsafe extern "C" fn(NDArrayHandle, MxUint, *mut NDArrayHandle) -> c_int;
type FnNDArraySlice = unsafe extern "C" fn(
    NDArrayHandle, MxUint, MxUint, *mut NDArrayHandle,
) -> c_int;
type FnNDArrayReshape64 = unsafe extern "C" fn(
    NDArrayHandle, c_int, *mut i64, bool, *mut NDArrayHandle,
) -> c_int;
type FnListAllOpNames = unsafe extern "C" fn(*mut MxUint, *mut *const *const c_char) -> c_int;
type FnGetOpHandle = unsafe extern "C" fn(*const c_char, *mut AtomicSymbolCreator) -> c_int;
type FnImperativeInvoke = unsafe extern "C" fn(
    AtomicSymbolCreator,
    c_int,                      // num_inputs
    *mut NDArrayHandle,         // inputs
    *mut c_int,                 // num_outputs (in/out)
    *mut *mut NDArrayHandle,    // outputs (in/out)
    c_int,                      // num_params
    *const *const c_char,       // param_keys
    *const *const c_char,       // param_vals
) -> c_int;
type FnAutogradMarkVariables = unsafe extern "C" fn(
    MxUint, *mut NDArrayHandle, *mut MxUint, *mut NDArrayHandle,
) -> c_int;
type FnAutogradBackwardEx = unsafe extern "C" fn(
    MxUint,                     // num_output
    *mut NDArrayHandle,         // output_handles
    *mut NDArrayHandle,         // ograd_handles
    MxUint,                     // num_variables
    *mut NDArrayHandle,         // var_handles
    c_int,                      // retain_graph
    c_int,                      // create_graph
    c_int,                      // is_train
    *mut *mut NDArrayHandle,    // grad_handles
    *mut *mut c_int,            // grad_stypes
) -> c_int;
type FnNDArrayGetGrad = unsafe extern "C" fn(NDArrayHandle, *mut NDArrayHandle) -> c_int;
type FnAutogradSetFlag = unsafe extern "C" fn(c_int, *mut c_int) -> c_int;

// ---------------------------------------------------------------------------
// Loaded API
// ---------------------------------------------------------------------------

struct MxApi {
    get_last_error: FnGetLastError,
    get_version: FnGetVersion,
    get_gpu_count: FnGetGpuCount,
    random_seed: FnRandomSeed,
    nd_create_ex: FnNDArrayCreateEx,
    nd_create_sparse_ex: FnNDArrayCreateSparseEx,
    nd_free: FnNDArrayFree,
    nd_get_shape: FnNDArrayGetShape,
    nd_get_dtype: FnNDArrayGetInt,
    nd_get_context: FnNDArrayGetContext,
    nd_get_storage_type: FnNDArrayGetInt,
    nd_sync_copy_from_cpu: FnNDArraySyncCopyFromCpu,
    nd_sync_copy_to_cpu: FnNDArraySyncCopyToCpu,
    nd_wait_to_read: FnNDArrayWait,
    nd_wait_to_write: FnNDArrayWait,
    nd_wait_all: FnNDArrayWaitAll,
    nd_at: FnNDArrayAt,
    nd_slice: FnNDArraySlice,
    nd_reshape64: FnNDArrayReshape64,
    list_all_op_names: FnListAllOpNames,
    get_op_handle: FnGetOpHandle,
    imperative_invoke: FnImperativeInvoke,
    autograd_mark_variables: FnAutogradMarkVariables,
    autograd_backward_ex: FnAutogradBackwardEx,
    nd_get_grad: FnNDArrayGetGrad,
    autograd_set_is_recording: FnAutogradSetFlag,
    autograd_set_is_training: FnAutogradSetFlag,
}

/// An engine reached through a dynamically loaded MXNet C API.
pub struct DylibLibrary {
    api: MxApi,
    path: PathBuf,
    // Keeps the function pointers in `api` valid; dropped last.
    _lib: Library,
}

// Safety: the MXNet C API is internally synchronized and the loaded
// function pointers are process-global.
unsafe impl Send for DylibLibrary {}
unsafe impl Sync for DylibLibrary {}

/// Resolve one symbol, copying the function pointer out of the `Symbol`.
unsafe fn symbol<T: Copy>(lib: &Library, path: &Path, name: &str) -> Result<T> {
    let mut raw = name.as_bytes().to_vec();
    raw.push(0);
    lib.get::<T>(&raw)
        .map(|sym| *sym)
        .map_err(|e| NdError::LibraryLoad {
            path: path.display().to_string(),
            message: format!("missing symbol {name}: {e}"),
        })
}

impl DylibLibrary {
    /// Platform file name of the engine library (`libmxnet.so`, ...).
    pub fn default_path() -> PathBuf {
        PathBuf::from(libloading::library_filename("mxnet"))
    }

    /// Open the library at `path` and resolve every entry point.
    ///
    /// Failure is reported once and not retried.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |e: libloading::Error| NdError::LibraryLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let lib = unsafe { Library::new(path) }.map_err(load_err)?;
        let api = unsafe {
            MxApi {
                get_last_error: symbol(&lib, path, "MXGetLastError")?,
                get_version: symbol(&lib, path, "MXGetVersion")?,
                get_gpu_count: symbol(&lib, path, "MXGetGPUCount")?,
                random_seed: symbol(&lib, path, "MXRandomSeed")?,
                nd_create_ex: symbol(&lib, path, "MXNDArrayCreateEx")?,
                nd_create_sparse_ex: symbol(&lib, path, "MXNDArrayCreateSparseEx")?,
                nd_free: symbol(&lib, path, "MXNDArrayFree")?,
                nd_get_shape: symbol(&lib, path, "MXNDArrayGetShape")?,
                nd_get_dtype: symbol(&lib, path, "MXNDArrayGetDType")?,
                nd_get_context: symbol(&lib, path, "MXNDArrayGetContext")?,
                nd_get_storage_type: symbol(&lib, path, "MXNDArrayGetStorageType")?,
                nd_sync_copy_from_cpu: symbol(&lib, path, "MXNDArraySyncCopyFromCPU")?,
                nd_sync_copy_to_cpu: symbol(&lib, path, "MXNDArraySyncCopyToCPU")?,
                nd_wait_to_read: symbol(&lib, path, "MXNDArrayWaitToRead")?,
                nd_wait_to_write: symbol(&lib, path, "MXNDArrayWaitToWrite")?,
                nd_wait_all: symbol(&lib, path, "MXNDArrayWaitAll")?,
                nd_at: symbol(&lib, path, "MXNDArrayAt")?,
                nd_slice: symbol(&lib, path, "MXNDArraySlice")?,
                nd_reshape64: symbol(&lib, path, "MXNDArrayReshape64")?,
                list_all_op_names: symbol(&lib, path, "MXListAllOpNames")?,
                get_op_handle: symbol(&lib, path, "NNGetOpHandle")?,
                imperative_invoke: symbol(&lib, path, "MXImperativeInvoke")?,
                autograd_mark_variables: symbol(&lib, path, "MXAutogradMarkVariables")?,
                autograd_backward_ex: symbol(&lib, path, "MXAutogradBackwardEx")?,
                nd_get_grad: symbol(&lib, path, "MXNDArrayGetGrad")?,
                autograd_set_is_recording: symbol(&lib, path, "MXAutogradSetIsRecording")?,
                autograd_set_is_training: symbol(&lib, path, "MXAutogradSetIsTraining")?,
            }
        };
        debug!("loaded native engine from {}", path.display());
        Ok(Self {
            api,
            path: path.to_path_buf(),
            _lib: lib,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn last_error(&self) -> String {
        let msg = unsafe { (self.api.get_last_error)() };
        if msg.is_null() {
            return "unknown native error".to_string();
        }
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    }

    /// Turn a C API status code into a `Result`.
    fn check(&self, code: c_int, call: &str) -> Result<()> {
        if code == MX_SUCCESS {
            Ok(())
        } else {
            Err(NdError::native(call, self.last_error()))
        }
    }

    fn native_dims(shape: &Shape) -> Result<Vec<MxUint>> {
        shape
            .dims()
            .iter()
            .map(|&d| {
                MxUint::try_from(d)
                    .map_err(|_| NdError::invalid(format!("dimension {d} exceeds native range")))
            })
            .collect()
    }
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| NdError::invalid(format!("interior NUL in '{s}'")))
}

impl NativeLibrary for DylibLibrary {
    fn name(&self) -> &str {
        "MXNet"
    }

    fn version(&self) -> Result<String> {
        let mut v: c_int = 0;
        self.check(unsafe { (self.api.get_version)(&mut v) }, "MXGetVersion")?;
        Ok(format!("{}.{}.{}", v / 10000, (v / 100) % 100, v % 100))
    }

    fn gpu_count(&self) -> Result<usize> {
        let mut count: c_int = 0;
        self.check(unsafe { (self.api.get_gpu_count)(&mut count) }, "MXGetGPUCount")?;
        Ok(count.max(0) as usize)
    }

    fn list_ops(&self) -> Result<Vec<String>> {
        let mut size: MxUint = 0;
        let mut names: *const *const c_char = std::ptr::null();
        self.check(
            unsafe { (self.api.list_all_op_names)(&mut size, &mut names) },
            "MXListAllOpNames",
        )?;
        if names.is_null() {
            return Ok(Vec::new());
        }
        // The name array is owned by the engine and valid until the next call.
        let names = unsafe { std::slice::from_raw_parts(names, size as usize) };
        Ok(names
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            .collect())
    }

    fn get_op(&self, name: &str) -> Result<OpHandle> {
        let c_name = c_string(name)?;
        let mut op: AtomicSymbolCreator = std::ptr::null_mut();
        self.check(
            unsafe { (self.api.get_op_handle)(c_name.as_ptr(), &mut op) },
            "NNGetOpHandle",
        )?;
        if op.is_null() {
            return Err(NdError::unsupported(name));
        }
        Ok(OpHandle::from_ptr(op))
    }

    fn create(
        &self,
        device: Device,
        shape: &Shape,
        dtype: DType,
        sparse: SparseFormat,
        delay_alloc: bool,
    ) -> Result<RawHandle> {
        let dims = Self::native_dims(shape)?;
        let (dev_type, dev_id) = device.to_native();
        let mut out: NDArrayHandle = std::ptr::null_mut();
        if sparse.is_sparse() {
            let num_aux = sparse.aux_count();
            let mut aux_types = vec![AUX_DTYPE_INT64; num_aux];
            let mut aux_ndims: Vec<MxUint> = vec![1; num_aux];
            let aux_shapes: Vec<MxUint> = vec![0; num_aux];
            self.check(
                unsafe {
                    (self.api.nd_create_sparse_ex)(
                        sparse.code(),
                        dims.as_ptr(),
                        dims.len() as MxUint,
                        dev_type,
                        dev_id,
                        delay_alloc as c_int,
                        dtype.code(),
                        num_aux as MxUint,
                        aux_types.as_mut_ptr(),
                        aux_ndims.as_mut_ptr(),
                        aux_shapes.as_ptr(),
                        &mut out,
                    )
                },
                "MXNDArrayCreateSparseEx",
            )?;
        } else {
            self.check(
                unsafe {
                    (self.api.nd_create_ex)(
                        dims.as_ptr(),
                        dims.len() as MxUint,
                        dev_type,
                        dev_id,
                        delay_alloc as c_int,
                        dtype.code(),
                        &mut out,
                    )
                },
                "MXNDArrayCreateEx",
            )?;
        }
        Ok(RawHandle::from_ptr(out))
    }

    fn free(&self, handle: RawHandle) -> Result<()> {
        self.check(unsafe { (self.api.nd_free)(handle.as_ptr()) }, "MXNDArrayFree")
    }

    fn shape(&self, handle: RawHandle) -> Result<Shape> {
        let mut ndim: MxUint = 0;
        let mut data: *const MxUint = std::ptr::null();
        self.check(
            unsafe { (self.api.nd_get_shape)(handle.as_ptr(), &mut ndim, &mut data) },
            "MXNDArrayGetShape",
        )?;
        if ndim == 0 || data.is_null() {
            return Ok(Shape::scalar());
        }
        let dims = unsafe { std::slice::from_raw_parts(data, ndim as usize) };
        Ok(Shape::from(dims.iter().map(|&d| d as usize).collect::<Vec<_>>()))
    }

    fn dtype(&self, handle: RawHandle) -> Result<DType> {
        let mut code: c_int = 0;
        self.check(
            unsafe { (self.api.nd_get_dtype)(handle.as_ptr(), &mut code) },
            "MXNDArrayGetDType",
        )?;
        DType::from_code(code)
    }

    fn device(&self, handle: RawHandle) -> Result<Device> {
        let mut dev_type: c_int = 0;
        let mut dev_id: c_int = 0;
        self.check(
            unsafe { (self.api.nd_get_context)(handle.as_ptr(), &mut dev_type, &mut dev_id) },
            "MXNDArrayGetContext",
        )?;
        Device::from_native(dev_type, dev_id)
    }

    fn storage_type(&self, handle: RawHandle) -> Result<SparseFormat> {
        let mut code: c_int = 0;
        self.check(
            unsafe { (self.api.nd_get_storage_type)(handle.as_ptr(), &mut code) },
            "MXNDArrayGetStorageType",
        )?;
        SparseFormat::from_code(code)
    }

    fn sync_copy_from_cpu(&self, handle: RawHandle, data: &[u8], len: usize) -> Result<()> {
        self.check(
            unsafe {
                (self.api.nd_sync_copy_from_cpu)(handle.as_ptr(), data.as_ptr() as *const c_void, len)
            },
            "MXNDArraySyncCopyFromCPU",
        )
    }

    fn sync_copy_to_cpu(&self, handle: RawHandle, out: &mut [u8], len: usize) -> Result<()> {
        self.check(
            unsafe {
                (self.api.nd_sync_copy_to_cpu)(handle.as_ptr(), out.as_mut_ptr() as *mut c_void, len)
            },
            "MXNDArraySyncCopyToCPU",
        )
    }

    fn wait_to_read(&self, handle: RawHandle) -> Result<()> {
        self.check(
            unsafe { (self.api.nd_wait_to_read)(handle.as_ptr()) },
            "MXNDArrayWaitToRead",
        )
    }

    fn wait_to_write(&self, handle: RawHandle) -> Result<()> {
        self.check(
            unsafe { (self.api.nd_wait_to_write)(handle.as_ptr()) },
            "MXNDArrayWaitToWrite",
        )
    }

    fn wait_all(&self) -> Result<()> {
        self.check(unsafe { (self.api.nd_wait_all)() }, "MXNDArrayWaitAll")
    }

    fn invoke(
        &self,
        op: OpHandle,
        inputs: &[RawHandle],
        outputs: Option<&[RawHandle]>,
        params: &OpParams,
    ) -> Result<Vec<RawHandle>> {
        let (keys, values) = params.to_native();
        let keys = keys.iter().map(|k| c_string(k)).collect::<Result<Vec<_>>>()?;
        let values = values.iter().map(|v| c_string(v)).collect::<Result<Vec<_>>>()?;
        let key_ptrs: Vec<*const c_char> = keys.iter().map(|k| k.as_ptr()).collect();
        let value_ptrs: Vec<*const c_char> = values.iter().map(|v| v.as_ptr()).collect();

        let mut input_ptrs: Vec<NDArrayHandle> = inputs.iter().map(|h| h.as_ptr()).collect();
        let mut output_ptrs: Vec<NDArrayHandle> = outputs
            .map(|outs| outs.iter().map(|h| h.as_ptr()).collect())
            .unwrap_or_default();
        let mut num_outputs = output_ptrs.len() as c_int;
        let mut out_array: *mut NDArrayHandle = if output_ptrs.is_empty() {
            std::ptr::null_mut()
        } else {
            output_ptrs.as_mut_ptr()
        };

        self.check(
            unsafe {
                (self.api.imperative_invoke)(
                    op.as_ptr(),
                    input_ptrs.len() as c_int,
                    input_ptrs.as_mut_ptr(),
                    &mut num_outputs,
                    &mut out_array,
                    key_ptrs.len() as c_int,
                    key_ptrs.as_ptr(),
                    value_ptrs.as_ptr(),
                )
            },
            "MXImperativeInvoke",
        )?;

        if let Some(outs) = outputs {
            return Ok(outs.to_vec());
        }
        if out_array.is_null() || num_outputs <= 0 {
            return Ok(Vec::new());
        }
        // Engine-owned scratch array; copy the handles out before the next call.
        let produced = unsafe { std::slice::from_raw_parts(out_array, num_outputs as usize) };
        Ok(produced.iter().map(|&p| RawHandle::from_ptr(p)).collect())
    }

    fn at(&self, handle: RawHandle, index: usize) -> Result<RawHandle> {
        let mut out: NDArrayHandle = std::ptr::null_mut();
        self.check(
            unsafe { (self.api.nd_at)(handle.as_ptr(), index as MxUint, &mut out) },
            "MXNDArrayAt",
        )?;
        Ok(RawHandle::from_ptr(out))
    }

    fn slice(&self, handle: RawHandle, begin: usize, end: usize) -> Result<RawHandle> {
        let mut out: NDArrayHandle = std::ptr::null_mut();
        self.check(
            unsafe {
                (self.api.nd_slice)(handle.as_ptr(), begin as MxUint, end as MxUint, &mut out)
            },
            "MXNDArraySlice",
        )?;
        Ok(RawHandle::from_ptr(out))
    }

    fn reshape(&self, handle: RawHandle, dims: &[i64], reverse: bool) -> Result<RawHandle> {
        let mut dims = dims.to_vec();
        let mut out: NDArrayHandle = std::ptr::null_mut();
        self.check(
            unsafe {
                (self.api.nd_reshape64)(
                    handle.as_ptr(),
                    dims.len() as c_int,
                    dims.as_mut_ptr(),
                    reverse,
                    &mut out,
                )
            },
            "MXNDArrayReshape64",
        )?;
        Ok(RawHandle::from_ptr(out))
    }

    fn mark_variables(&self, vars: &[RawHandle], reqs: &[GradReq], grads: &[RawHandle]) -> Result<()> {
        if vars.len() != reqs.len() || vars.len() != grads.len() {
            return Err(NdError::invalid(
                "mark_variables: vars, reqs and grads must have equal length",
            ));
        }
        let mut var_ptrs: Vec<NDArrayHandle> = vars.iter().map(|h| h.as_ptr()).collect();
        let mut req_codes: Vec<MxUint> = reqs.iter().map(|r| r.code()).collect();
        let mut grad_ptrs: Vec<NDArrayHandle> = grads.iter().map(|h| h.as_ptr()).collect();
        self.check(
            unsafe {
                (self.api.autograd_mark_variables)(
                    var_ptrs.len() as MxUint,
                    var_ptrs.as_mut_ptr(),
                    req_codes.as_mut_ptr(),
                    grad_ptrs.as_mut_ptr(),
                )
            },
            "MXAutogradMarkVariables",
        )
    }

    fn backward(
        &self,
        heads: &[RawHandle],
        head_grads: &[Option<RawHandle>],
        retain_graph: bool,
        is_training: bool,
    ) -> Result<()> {
        let mut head_ptrs: Vec<NDArrayHandle> = heads.iter().map(|h| h.as_ptr()).collect();
        let mut ograd_ptrs: Vec<NDArrayHandle> = head_grads
            .iter()
            .map(|g| g.map_or(std::ptr::null_mut(), |h| h.as_ptr()))
            .collect();
        let ograds = if ograd_ptrs.is_empty() {
            std::ptr::null_mut()
        } else {
            ograd_ptrs.as_mut_ptr()
        };
        self.check(
            unsafe {
                (self.api.autograd_backward_ex)(
                    head_ptrs.len() as MxUint,
                    head_ptrs.as_mut_ptr(),
                    ograds,
                    0,
                    std::ptr::null_mut(),
                    retain_graph as c_int,
                    0,
                    is_training as c_int,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            },
            "MXAutogradBackwardEx",
        )
    }

    fn get_grad(&self, handle: RawHandle) -> Result<Option<RawHandle>> {
        let mut out: NDArrayHandle = std::ptr::null_mut();
        self.check(
            unsafe { (self.api.nd_get_grad)(handle.as_ptr(), &mut out) },
            "MXNDArrayGetGrad",
        )?;
        Ok((!out.is_null()).then(|| RawHandle::from_ptr(out)))
    }

    fn set_recording(&self, recording: bool) -> Result<bool> {
        let mut prev: c_int = 0;
        self.check(
            unsafe { (self.api.autograd_set_is_recording)(recording as c_int, &mut prev) },
            "MXAutogradSetIsRecording",
        )?;
        Ok(prev != 0)
    }

    fn set_training(&self, training: bool) -> Result<bool> {
        let mut prev: c_int = 0;
        self.check(
            unsafe { (self.api.autograd_set_is_training)(training as c_int, &mut prev) },
            "MXAutogradSetIsTraining",
        )?;
        Ok(prev != 0)
    }

    fn random_seed(&self, seed: u32) -> Result<()> {
        self.check(unsafe { (self.api.random_seed)(seed as c_int) }, "MXRandomSeed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_is_load_error() {
        let err = match DylibLibrary::open("/nonexistent/libmxnet-missing.so") {
            Err(e) => e,
            Ok(_) => panic!("loading a missing library must fail"),
        };
        assert!(matches!(err, NdError::LibraryLoad { .. }));
        assert!(err.to_string().contains("libmxnet-missing"));
    }

    #[test]
    fn test_default_path_names_engine() {
        let path = DylibLibrary::default_path();
        assert!(path.to_string_lossy().contains("mxnet"));
    }

    #[test]
    fn test_native_dims_rejects_overflow() {
        let ok = DylibLibrary::native_dims(&Shape::new(&[1, 3, 32, 32])).unwrap();
        assert_eq!(ok, vec![1, 3, 32, 32]);
        if usize::BITS > 32 {
            let huge = Shape::new(&[(u32::MAX as usize) + 1]);
            assert!(DylibLibrary::native_dims(&huge).is_err());
        }
    }
}
