//! Typed parameter sets handed to native operators.
//!
//! The native C API takes parameters as parallel arrays of key and value
//! strings. `OpParams` keeps them typed on the Rust side and renders the
//! engine's textual encoding only at the boundary.

use std::fmt;

use crate::{DType, Device, Shape};

/// One typed operator parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Tuple(Vec<i64>),
    DType(DType),
    Device(Device),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(true) => write!(f, "True"),
            ParamValue::Bool(false) => write!(f, "False"),
            ParamValue::Str(v) => write!(f, "{v}"),
            ParamValue::Tuple(dims) => {
                write!(f, "(")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{d}")?;
                }
                if dims.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            ParamValue::DType(dtype) => write!(f, "{dtype}"),
            ParamValue::Device(Device::Cpu) => write!(f, "cpu(0)"),
            ParamValue::Device(Device::Gpu(idx)) => write!(f, "gpu({idx})"),
        }
    }
}

/// Ordered operator parameter map. Re-adding a key replaces its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpParams {
    entries: Vec<(String, ParamValue)>,
}

impl OpParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: &str, value: ParamValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: ParamValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn int(self, key: &str, value: i64) -> Self {
        self.add(key, ParamValue::Int(value))
    }

    pub fn float(self, key: &str, value: f64) -> Self {
        self.add(key, ParamValue::Float(value))
    }

    pub fn flag(self, key: &str, value: bool) -> Self {
        self.add(key, ParamValue::Bool(value))
    }

    pub fn text(self, key: &str, value: impl Into<String>) -> Self {
        self.add(key, ParamValue::Str(value.into()))
    }

    pub fn shape(self, key: &str, shape: &Shape) -> Self {
        let dims = shape.dims().iter().map(|&d| d as i64).collect();
        self.add(key, ParamValue::Tuple(dims))
    }

    pub fn dtype(self, key: &str, dtype: DType) -> Self {
        self.add(key, ParamValue::DType(dtype))
    }

    pub fn device(self, key: &str, device: Device) -> Self {
        self.add(key, ParamValue::Device(device))
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Int(v) => Some(*v != 0),
            ParamValue::Str(s) => match s.as_str() {
                "True" | "true" | "1" => Some(true),
                "False" | "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_tuple(&self, key: &str) -> Option<&[i64]> {
        match self.get(key)? {
            ParamValue::Tuple(dims) => Some(dims),
            _ => None,
        }
    }

    pub fn get_dtype(&self, key: &str) -> Option<DType> {
        match self.get(key)? {
            ParamValue::DType(dtype) => Some(*dtype),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_device(&self, key: &str) -> Option<Device> {
        match self.get(key)? {
            ParamValue::Device(device) => Some(*device),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys and values in the engine's textual encoding.
    pub fn to_native(&self) -> (Vec<String>, Vec<String>) {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_encoding() {
        let params = OpParams::new()
            .int("axis", -1)
            .flag("keepdims", true)
            .float("scalar", 0.5)
            .shape("shape", &Shape::new(&[3]))
            .dtype("dtype", DType::F16)
            .device("ctx", Device::Gpu(1));
        let (keys, values) = params.to_native();
        assert_eq!(keys, vec!["axis", "keepdims", "scalar", "shape", "dtype", "ctx"]);
        assert_eq!(values, vec!["-1", "True", "0.5", "(3,)", "float16", "gpu(1)"]);
    }

    #[test]
    fn test_replace_keeps_order() {
        let params = OpParams::new().int("a", 1).int("b", 2).int("a", 3);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get_int("a"), Some(3));
        assert_eq!(params.iter().next().map(|(k, _)| k), Some("a"));
    }

    #[test]
    fn test_typed_getters() {
        let params = OpParams::new()
            .int("n", 4)
            .text("flag", "False")
            .shape("shape", &Shape::new(&[2, 2]));
        assert_eq!(params.get_float("n"), Some(4.0));
        assert_eq!(params.get_bool("flag"), Some(false));
        assert_eq!(params.get_tuple("shape"), Some(&[2, 2][..]));
        assert_eq!(params.get_int("missing"), None);
    }
}
