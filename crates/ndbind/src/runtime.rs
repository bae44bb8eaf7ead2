//! Native library plus its resolved operator table, shared by every array
//! and manager created from one engine.

use std::sync::Arc;

use ndbind_core::{OpParams, Result};
use ndbind_native::{FunctionTable, NativeLibrary, RawHandle};

pub(crate) struct Runtime {
    lib: Arc<dyn NativeLibrary>,
    functions: FunctionTable,
}

impl Runtime {
    pub fn new(lib: Arc<dyn NativeLibrary>) -> Result<Arc<Self>> {
        let functions = FunctionTable::load(lib.as_ref())?;
        Ok(Arc::new(Self { lib, functions }))
    }

    pub fn lib(&self) -> &dyn NativeLibrary {
        self.lib.as_ref()
    }

    pub fn lib_arc(&self) -> &Arc<dyn NativeLibrary> {
        &self.lib
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Resolve `op` and dispatch it.
    pub fn invoke(
        &self,
        op: &str,
        inputs: &[RawHandle],
        outputs: Option<&[RawHandle]>,
        params: &OpParams,
    ) -> Result<Vec<RawHandle>> {
        self.functions
            .lookup(op)?
            .invoke(self.lib(), inputs, outputs, params)
    }
}
