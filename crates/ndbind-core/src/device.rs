use std::fmt;
use std::str::FromStr;

use crate::NdError;

/// Compute device a native array lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// GPU with device index
    Gpu(usize),
}

const DEV_TYPE_CPU: i32 = 1;
const DEV_TYPE_GPU: i32 = 2;
const DEV_TYPE_CPU_PINNED: i32 = 3;

impl Device {
    /// Whether this is a CPU device.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Whether this is a GPU device.
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Gpu(_))
    }

    /// Native `(dev_type, dev_id)` pair.
    pub fn to_native(&self) -> (i32, i32) {
        match self {
            Device::Cpu => (DEV_TYPE_CPU, 0),
            Device::Gpu(idx) => (DEV_TYPE_GPU, *idx as i32),
        }
    }

    /// Inverse of [`Device::to_native`]. Pinned host memory reads back as `Cpu`.
    pub fn from_native(dev_type: i32, dev_id: i32) -> Result<Self, NdError> {
        match dev_type {
            DEV_TYPE_CPU | DEV_TYPE_CPU_PINNED => Ok(Device::Cpu),
            DEV_TYPE_GPU if dev_id >= 0 => Ok(Device::Gpu(dev_id as usize)),
            _ => Err(NdError::invalid(format!(
                "unknown native device ({dev_type}, {dev_id})"
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu()"),
            Device::Gpu(idx) => write!(f, "gpu({idx})"),
        }
    }
}

impl FromStr for Device {
    type Err = NdError;

    /// Accepts `cpu`, `cpu()`, `cpu(0)`, `gpu`, `gpu(N)` and `gpu:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (kind, index) = match s.split_once(['(', ':']) {
            Some((kind, rest)) => (kind, rest.trim_end_matches(')')),
            None => (s.as_str(), ""),
        };
        let index = if index.is_empty() {
            0
        } else {
            index
                .parse::<usize>()
                .map_err(|_| NdError::invalid(format!("invalid device index in '{s}'")))?
        };
        match kind {
            "cpu" => Ok(Device::Cpu),
            "gpu" | "cuda" => Ok(Device::Gpu(index)),
            _ => Err(NdError::invalid(format!("unknown device: {s}"))),
        }
    }
}
