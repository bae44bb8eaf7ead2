use smallvec::SmallVec;
use std::fmt;

/// Ordered sequence of non-negative dimension sizes.
///
/// Stack-allocated for up to four dimensions, which covers scalars through
/// NCHW image batches without touching the heap.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Scalar shape (0 dimensions).
    pub fn scalar() -> Self {
        Self {
            dims: SmallVec::new(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Get dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Get size of a specific dimension.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Size of the leading dimension, 1 for scalars.
    pub fn head(&self) -> usize {
        self.dims.first().copied().unwrap_or(1)
    }

    /// Whether this is a scalar (0-dimensional).
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Whether this is a 2-D shape.
    pub fn is_matrix(&self) -> bool {
        self.dims.len() == 2
    }

    /// Shape with `axis` removed.
    pub fn without_axis(&self, axis: usize) -> Shape {
        let dims = self
            .dims
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis)
            .map(|(_, &d)| d)
            .collect();
        Shape { dims }
    }

    /// Shape with `axis` replaced by `size`.
    pub fn with_dim(&self, axis: usize, size: usize) -> Shape {
        let mut dims = self.dims.clone();
        if let Some(d) = dims.get_mut(axis) {
            *d = size;
        }
        Shape { dims }
    }

    /// Normalize a possibly negative axis against this rank.
    pub fn normalize_axis(&self, axis: i64) -> Option<usize> {
        let ndim = self.ndim() as i64;
        let axis = if axis < 0 { axis + ndim } else { axis };
        (0..ndim).contains(&axis).then_some(axis as usize)
    }

    /// Validate and compute a reshape target.
    /// At most one dimension can be -1 (inferred); 0 copies the dimension
    /// at the same position of this shape.
    pub fn resolve_reshape(&self, target: &[i64]) -> Option<Shape> {
        let size = self.size();
        let mut inferred_idx = None;
        let mut known_product: usize = 1;
        let mut result: SmallVec<[usize; 4]> = SmallVec::with_capacity(target.len());

        for (i, &d) in target.iter().enumerate() {
            let dim = match d {
                -1 => {
                    if inferred_idx.is_some() {
                        return None; // multiple -1s
                    }
                    inferred_idx = Some(i);
                    result.push(0);
                    continue;
                }
                0 => *self.dims.get(i)?,
                d if d < 0 => return None,
                d => d as usize,
            };
            known_product = known_product.checked_mul(dim)?;
            result.push(dim);
        }

        if let Some(idx) = inferred_idx {
            if known_product == 0 || size % known_product != 0 {
                return None;
            }
            result[idx] = size / known_product;
        }

        let result_shape = Shape { dims: result };
        if result_shape.size() != size {
            return None;
        }
        Some(result_shape)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape {
            dims: SmallVec::from_vec(dims),
        }
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

macro_rules! impl_shape_from_array {
    ($($n:expr),*) => {
        $(
            impl From<[usize; $n]> for Shape {
                fn from(dims: [usize; $n]) -> Self {
                    Shape::new(&dims)
                }
            }
        )*
    };
}

impl_shape_from_array!(0, 1, 2, 3, 4, 5, 6);
