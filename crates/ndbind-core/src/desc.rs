use std::fmt;

use crate::{DType, Device, Shape, SparseFormat};

/// Everything needed to describe a native array without touching its data.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDesc {
    pub name: Option<String>,
    pub shape: Shape,
    pub dtype: DType,
    pub device: Device,
    pub sparse: SparseFormat,
}

impl DataDesc {
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self {
            name: None,
            shape: shape.into(),
            dtype,
            device: Device::Cpu,
            sparse: SparseFormat::Dense,
        }
    }

    pub fn on(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_sparse(mut self, sparse: SparseFormat) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Bytes needed to hold the dense contents.
    pub fn byte_len(&self) -> usize {
        self.dtype.storage_bytes(self.shape.size())
    }
}

impl fmt::Display for DataDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}: ")?;
        }
        write!(f, "{} {} {}", self.shape, self.device, self.dtype)?;
        if self.sparse.is_sparse() {
            write!(f, " {}", self.sparse)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc() {
        let desc = DataDesc::new([2, 3], DType::F32).on(Device::Gpu(0)).named("data");
        assert_eq!(desc.byte_len(), 24);
        assert_eq!(desc.to_string(), "data: (2, 3) gpu(0) float32");
    }
}
