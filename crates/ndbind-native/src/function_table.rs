//! Operator names resolved once to native entry points.

use std::collections::HashMap;

use tracing::debug;

use ndbind_core::{NdError, OpParams, Result};

use crate::handle::{OpHandle, RawHandle};
use crate::library::NativeLibrary;

/// One resolved native operator.
#[derive(Debug, Clone)]
pub struct FunctionHandle {
    name: String,
    op: OpHandle,
}

impl FunctionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> OpHandle {
        self.op
    }

    /// Dispatch through the library's imperative invoke.
    pub fn invoke(
        &self,
        lib: &dyn NativeLibrary,
        inputs: &[RawHandle],
        outputs: Option<&[RawHandle]>,
        params: &OpParams,
    ) -> Result<Vec<RawHandle>> {
        lib.invoke(self.op, inputs, outputs, params)
    }
}

/// Name → entry point map, built once at engine start and read-only after.
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: HashMap<String, FunctionHandle>,
}

impl FunctionTable {
    /// Enumerate and resolve every operator the library exposes.
    pub fn load(lib: &dyn NativeLibrary) -> Result<Self> {
        let names = lib.list_ops()?;
        let mut functions = HashMap::with_capacity(names.len());
        for name in names {
            let op = lib.get_op(&name)?;
            functions.insert(name.clone(), FunctionHandle { name, op });
        }
        debug!("{}: resolved {} native operators", lib.name(), functions.len());
        Ok(Self { functions })
    }

    pub fn lookup(&self, name: &str) -> Result<&FunctionHandle> {
        self.functions
            .get(name)
            .ok_or_else(|| NdError::unsupported(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Operator names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
