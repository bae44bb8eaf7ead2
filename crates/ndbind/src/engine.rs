//! The engine: one loaded native library and the root of its scope tree.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use ndbind_core::{Device, Result};
use ndbind_native::{FunctionTable, NativeLibrary};

use crate::config::{EngineConfig, LibraryKind};
use crate::manager::NdManager;
use crate::ops::autograd::GradientCollector;
use crate::runtime::Runtime;

/// Optional features an engine may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Accelerator support.
    Cuda,
    /// Optimized CPU kernels.
    Mkl,
}

/// A loaded native engine.
///
/// Arrays live in managers derived from [`Engine::new_base_manager`];
/// dropping the engine closes the system manager and with it every scope
/// that is not held elsewhere.
pub struct Engine {
    runtime: Arc<Runtime>,
    config: EngineConfig,
    device: Device,
    system: NdManager,
}

impl Engine {
    /// Load the library described by `config` and its operator table.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let device = config.device()?;
        let lib = config.open_library()?;
        Self::build(lib, config, device)
    }

    /// Wrap an already constructed library with the default configuration.
    pub fn with_library(lib: Arc<dyn NativeLibrary>) -> Result<Self> {
        let config = EngineConfig::default();
        let device = config.device()?;
        Self::build(lib, config, device)
    }

    /// [`Engine::new`] with defaults overridden from `NDBIND_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::default().with_env_overrides()?)
    }

    fn build(lib: Arc<dyn NativeLibrary>, config: EngineConfig, device: Device) -> Result<Self> {
        let runtime = Runtime::new(lib)?;
        if let Some(seed) = config.random_seed {
            runtime.lib().random_seed(seed)?;
            debug!(seed, "random seed applied");
        }
        info!(
            engine = runtime.lib().name(),
            ops = runtime.functions().len(),
            device = %device,
            "engine loaded"
        );
        let system = NdManager::root(Arc::clone(&runtime), device);
        Ok(Self {
            runtime,
            config,
            device,
            system,
        })
    }

    pub fn name(&self) -> &str {
        self.runtime.lib().name()
    }

    pub fn version(&self) -> Result<String> {
        self.runtime.lib().version()
    }

    pub fn gpu_count(&self) -> Result<usize> {
        self.runtime.lib().gpu_count()
    }

    /// Optimized CPU kernels are only reported for the reference engine; a
    /// loaded library is not asked for its build features.
    pub fn has_capability(&self, capability: Capability) -> bool {
        match capability {
            Capability::Mkl => self.config.library == LibraryKind::Reference,
            Capability::Cuda => match self.gpu_count() {
                Ok(n) => n > 0,
                Err(e) => {
                    warn!(error = %e, "gpu count unavailable");
                    false
                }
            },
        }
    }

    /// Operators resolved from the library at load time.
    pub fn function_table(&self) -> &FunctionTable {
        self.runtime.functions()
    }

    pub fn library(&self) -> &Arc<dyn NativeLibrary> {
        self.runtime.lib_arc()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn default_device(&self) -> Device {
        self.device
    }

    /// The root scope. Closing it closes every manager of this engine.
    pub fn system_manager(&self) -> &NdManager {
        &self.system
    }

    /// A new scope on the default device.
    pub fn new_base_manager(&self) -> NdManager {
        self.system.new_sub_manager_on(self.device)
    }

    pub fn new_base_manager_on(&self, device: Device) -> NdManager {
        self.system.new_sub_manager_on(device)
    }

    pub fn set_random_seed(&self, seed: u32) -> Result<()> {
        self.runtime.lib().random_seed(seed)
    }

    /// Start recording operations for autograd until the collector drops.
    pub fn new_gradient_collector(&self) -> Result<GradientCollector> {
        GradientCollector::begin(Arc::clone(&self.runtime))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name())
            .field("library", &self.config.library)
            .field("device", &self.device)
            .field("ops", &self.runtime.functions().len())
            .finish()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.system.close();
    }
}
