//! Human-readable rendering of array contents.

use std::fmt::Write;
use std::sync::Arc;

use ndbind_core::element::read_as_f64;
use ndbind_core::{DType, Result, Shape};
use ndbind_native::{NativeLibrary, NativeResource, RawHandle};

use crate::array::NdArray;

/// Arrays with this many dimensions or more are not rendered.
pub const MAX_DEPTH: usize = 10;
/// Rows rendered per level before eliding.
pub const MAX_PRINT_ROWS: usize = 10;
/// Items rendered per innermost row before eliding.
pub const MAX_PRINT_ITEMS: usize = 20;

impl NdArray {
    /// Multi-line rendering of the header and contents, for debugging.
    ///
    /// ```text
    /// ND: (2, 3) cpu() float32
    /// [
    ///  [1.0, 2.0, 3.0],
    ///  [4.0, 5.0, 6.0],
    /// ],
    /// ```
    pub fn dump(&self) -> Result<String> {
        let (shape, dtype) = (self.shape()?, self.dtype()?);
        let mut out = String::with_capacity(200);
        let _ = writeln!(out, "ND: {shape} {} {dtype}", self.device()?);
        if shape.ndim() >= MAX_DEPTH {
            out.push_str("[ Exceed max print dimension ]");
            return Ok(out);
        }
        let dumper = Dumper {
            lib: self.runtime().lib_arc(),
            dtype,
        };
        dumper.level(&mut out, self.handle()?, &shape, 0)?;
        Ok(out)
    }
}

struct Dumper<'a> {
    lib: &'a Arc<dyn NativeLibrary>,
    dtype: DType,
}

impl Dumper<'_> {
    fn level(&self, out: &mut String, handle: RawHandle, shape: &Shape, depth: usize) -> Result<()> {
        pad(out, depth);
        out.push('[');
        if shape.ndim() <= 1 {
            self.leaf(out, handle, shape.size())?;
        } else {
            out.push('\n');
            let rows = shape.head();
            let limit = rows.min(MAX_PRINT_ROWS);
            let row_shape = Shape::new(&shape.dims()[1..]);
            for i in 0..limit {
                // the temporary view is released when `row` drops
                let row = NativeResource::new(self.lib.at(handle, i)?, Arc::clone(self.lib));
                self.level(out, row.handle()?, &row_shape, depth + 1)?;
            }
            if rows > limit {
                pad(out, depth + 1);
                let _ = writeln!(out, "... {} more", rows - limit);
            }
            pad(out, depth);
        }
        out.push_str("],\n");
        Ok(())
    }

    fn leaf(&self, out: &mut String, handle: RawHandle, len: usize) -> Result<()> {
        let width = self.dtype.element_size();
        let mut bytes = vec![0u8; self.dtype.storage_bytes(len)];
        self.lib.sync_copy_to_cpu(handle, &mut bytes, len)?;
        let limit = len.min(MAX_PRINT_ITEMS);
        for (i, raw) in bytes.chunks_exact(width).take(limit).enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            format_element(out, self.dtype, read_as_f64(self.dtype, raw));
        }
        if len > limit {
            let _ = write!(out, ", ... {} more", len - limit);
        }
        Ok(())
    }
}

fn pad(out: &mut String, depth: usize) {
    out.extend(std::iter::repeat(' ').take(depth));
}

fn format_element(out: &mut String, dtype: DType, v: f64) {
    let _ = match dtype {
        DType::F16 | DType::F32 => write!(out, "{:?}", v as f32),
        DType::F64 => write!(out, "{v:?}"),
        DType::Bool => write!(out, "{}", v != 0.0),
        DType::U8 | DType::I8 | DType::I32 | DType::I64 => write!(out, "{}", v as i64),
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndbind_ref::ReferenceLibrary;

    use super::*;
    use crate::{Engine, EngineConfig};

    #[test]
    fn test_matrix() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let m = engine.new_base_manager();
        let a = m.from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        assert_eq!(
            a.dump().unwrap(),
            "ND: (2, 3) cpu() float32\n[\n [1.0, 2.0, 3.0],\n [4.0, 5.0, 6.0],\n],\n"
        );
    }

    #[test]
    fn test_long_row_elided() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let m = engine.new_base_manager();
        let data: Vec<i32> = (0..25).collect();
        let a = m.from_slice(&data, [25]).unwrap();
        let text = a.dump().unwrap();
        assert!(text.starts_with("ND: (25) cpu() int32\n[0, 1, 2,"));
        assert!(text.ends_with("18, 19, ... 5 more],\n"));
    }

    #[test]
    fn test_rows_elided() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let m = engine.new_base_manager();
        let a = m.zeros([12, 1], DType::U8).unwrap();
        let text = a.dump().unwrap();
        assert_eq!(text.matches(" [0],\n").count(), 10);
        assert!(text.contains(" ... 2 more\n"));
    }

    #[test]
    fn test_too_deep() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let m = engine.new_base_manager();
        let a = m.zeros(vec![1; 10], DType::F32).unwrap();
        assert!(a.dump().unwrap().ends_with("[ Exceed max print dimension ]"));
    }

    #[test]
    fn test_row_views_released() {
        let lib = Arc::new(ReferenceLibrary::new());
        let engine = Engine::with_library(lib.clone()).unwrap();
        let m = engine.new_base_manager();
        let a = m.zeros([3, 2, 2], DType::F64).unwrap();
        let live = lib.live_handles();
        a.dump().unwrap();
        assert_eq!(lib.live_handles(), live);
    }
}
