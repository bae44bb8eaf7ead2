//! Engine configuration.
//!
//! Sources, later ones overriding earlier ones: [`EngineConfig::default`], a
//! JSON file, then `NDBIND_*` environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ndbind_core::{Device, NdError, Result};
use ndbind_native::{DylibLibrary, NativeLibrary};
use ndbind_ref::ReferenceLibrary;

pub const ENV_LIBRARY: &str = "NDBIND_LIBRARY";
pub const ENV_LIBRARY_PATH: &str = "NDBIND_LIBRARY_PATH";
pub const ENV_DEFAULT_DEVICE: &str = "NDBIND_DEFAULT_DEVICE";
pub const ENV_RANDOM_SEED: &str = "NDBIND_RANDOM_SEED";

/// Which native engine backs the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    /// The in-process reference engine.
    #[default]
    Reference,
    /// A dynamically loaded MXNet C API library.
    Dylib,
}

impl fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryKind::Reference => write!(f, "reference"),
            LibraryKind::Dylib => write!(f, "dylib"),
        }
    }
}

impl FromStr for LibraryKind {
    type Err = NdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" | "ref" => Ok(LibraryKind::Reference),
            "dylib" | "mxnet" | "native" => Ok(LibraryKind::Dylib),
            other => Err(NdError::Config(format!("unknown library kind '{other}'"))),
        }
    }
}

/// Settings used by [`Engine::new`](crate::Engine::new).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine implementation to load.
    pub library: LibraryKind,

    /// Explicit path of the native library. Without it the platform file
    /// name (`libmxnet.so`, `libmxnet.dylib`, `mxnet.dll`) is searched.
    pub library_path: Option<PathBuf>,

    /// Device new base managers allocate on, e.g. `cpu()` or `gpu(0)`.
    pub default_device: String,

    /// Seed applied to the engine's random generators at start-up.
    pub random_seed: Option<u32>,

    /// Accelerator devices the reference engine pretends to have.
    pub simulated_gpus: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library: LibraryKind::Reference,
            library_path: None,
            default_device: "cpu()".into(),
            random_seed: None,
            simulated_gpus: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NdError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NdError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Apply `NDBIND_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(kind) = lookup(ENV_LIBRARY) {
            self.library = kind.parse()?;
        }
        if let Some(path) = lookup(ENV_LIBRARY_PATH) {
            self.library_path = Some(PathBuf::from(path));
        }
        if let Some(device) = lookup(ENV_DEFAULT_DEVICE) {
            self.default_device = device;
        }
        if let Some(seed) = lookup(ENV_RANDOM_SEED) {
            let seed = seed
                .trim()
                .parse()
                .map_err(|_| NdError::Config(format!("{ENV_RANDOM_SEED}: '{seed}' is not a u32")))?;
            self.random_seed = Some(seed);
        }
        Ok(self)
    }

    pub fn device(&self) -> Result<Device> {
        self.default_device
            .parse()
            .map_err(|e| NdError::Config(format!("default_device: {e}")))
    }

    /// Path the dylib engine is loaded from.
    pub fn resolved_library_path(&self) -> PathBuf {
        self.library_path
            .clone()
            .unwrap_or_else(DylibLibrary::default_path)
    }

    /// Construct the configured native library.
    pub fn open_library(&self) -> Result<Arc<dyn NativeLibrary>> {
        match self.library {
            LibraryKind::Reference => Ok(Arc::new(ReferenceLibrary::with_gpus(self.simulated_gpus))),
            LibraryKind::Dylib => Ok(Arc::new(DylibLibrary::open(self.resolved_library_path())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.library, LibraryKind::Reference);
        assert_eq!(config.device().unwrap(), Device::Cpu);
        assert!(config.random_seed.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{"default_device": "gpu(1)", "random_seed": 7}"#).unwrap();
        assert_eq!(config.device().unwrap(), Device::Gpu(1));
        assert_eq!(config.random_seed, Some(7));
        assert_eq!(config.library, LibraryKind::Reference);
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"library": "dylib", "library_path": "/opt/mxnet/libmxnet.so"}}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.library, LibraryKind::Dylib);
        assert_eq!(config.resolved_library_path(), PathBuf::from("/opt/mxnet/libmxnet.so"));
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = EngineConfig::from_json_str("{ library: ").unwrap_err();
        assert!(matches!(err, NdError::Config(_)));
        let err = EngineConfig::from_json_file("/nonexistent/ndbind.json").unwrap_err();
        assert!(matches!(err, NdError::Config(_)));
    }

    #[test]
    fn test_overrides_win() {
        let vars = HashMap::from([
            (ENV_LIBRARY, "dylib"),
            (ENV_DEFAULT_DEVICE, "gpu:2"),
            (ENV_RANDOM_SEED, "42"),
        ]);
        let config = EngineConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.library, LibraryKind::Dylib);
        assert_eq!(config.device().unwrap(), Device::Gpu(2));
        assert_eq!(config.random_seed, Some(42));
    }

    #[test]
    fn test_bad_seed_override() {
        let err = EngineConfig::default()
            .with_overrides(|k| (k == ENV_RANDOM_SEED).then(|| "minus one".to_string()))
            .unwrap_err();
        assert!(matches!(err, NdError::Config(_)));
    }

    #[test]
    fn test_missing_dylib_fails_to_open() {
        let config = EngineConfig {
            library: LibraryKind::Dylib,
            library_path: Some(PathBuf::from("/nonexistent/libmxnet.so")),
            ..EngineConfig::default()
        };
        assert!(matches!(config.open_library(), Err(NdError::LibraryLoad { .. })));
    }
}
