//! Host kernels over widened `f64` values.
//!
//! Every axis-wise kernel views the array as `[outer, axis, inner]` around
//! the chosen axis and walks it with plain index arithmetic.

use std::cmp::Ordering;

use ndbind_core::element::{read_as_f64, write_from_f64};
use ndbind_core::DType;

/// Round-trip `v` through the storage encoding of `dtype`.
pub(crate) fn cast(dtype: DType, v: f64) -> f64 {
    let mut raw = Vec::with_capacity(8);
    write_from_f64(dtype, v, &mut raw);
    read_as_f64(dtype, &raw)
}

/// `(outer, axis, inner)` extents of `dims` around `axis`.
pub(crate) fn extents(dims: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = dims[..axis].iter().product();
    let inner = dims[axis + 1..].iter().product();
    (outer, dims[axis], inner)
}

pub(crate) fn map(values: &[f64], f: impl Fn(f64) -> f64) -> Vec<f64> {
    values.iter().map(|&v| f(v)).collect()
}

pub(crate) fn zip(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reducer {
    Sum,
    Mean,
    Max,
    Min,
}

/// Reduce over `axis`, or over every element when `axis` is `None`.
pub(crate) fn reduce(values: &[f64], dims: &[usize], axis: Option<usize>, r: Reducer) -> Vec<f64> {
    let (outer, n, inner) = match axis {
        Some(axis) => extents(dims, axis),
        None => (1, values.len(), 1),
    };
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let lane = (0..n).map(|k| values[o * n * inner + k * inner + i]);
            let v = match r {
                Reducer::Sum => lane.sum(),
                Reducer::Mean => lane.sum::<f64>() / n.max(1) as f64,
                Reducer::Max => lane.fold(f64::NEG_INFINITY, f64::max),
                Reducer::Min => lane.fold(f64::INFINITY, f64::min),
            };
            out.push(v);
        }
    }
    out
}

/// Index into the reduced output for every input element.
pub(crate) fn reduced_index(dims: &[usize], axis: Option<usize>) -> Vec<usize> {
    let size: usize = dims.iter().product();
    match axis {
        None => vec![0; size],
        Some(axis) => {
            let (_, n, inner) = extents(dims, axis);
            (0..size)
                .map(|idx| (idx / (n * inner)) * inner + idx % inner)
                .collect()
        }
    }
}

/// Split into `parts` equal chunks along `axis`.
pub(crate) fn split(values: &[f64], dims: &[usize], axis: usize, parts: usize) -> Vec<Vec<f64>> {
    let (outer, n, inner) = extents(dims, axis);
    let chunk = n / parts;
    (0..parts)
        .map(|p| {
            let mut out = Vec::with_capacity(outer * chunk * inner);
            for o in 0..outer {
                let start = o * n * inner + p * chunk * inner;
                out.extend_from_slice(&values[start..start + chunk * inner]);
            }
            out
        })
        .collect()
}

/// Inverse of [`split`]: interleave the chunks back along `axis`.
pub(crate) fn concat(parts: &[Vec<f64>], dims: &[usize], axis: usize) -> Vec<f64> {
    let (outer, n, inner) = extents(dims, axis);
    let chunk = n / parts.len().max(1);
    let mut out = Vec::with_capacity(outer * n * inner);
    for o in 0..outer {
        for part in parts {
            let start = o * chunk * inner;
            out.extend_from_slice(&part[start..start + chunk * inner]);
        }
    }
    out
}

pub(crate) fn softmax(values: &[f64], dims: &[usize], axis: usize, temperature: f64) -> Vec<f64> {
    let (outer, n, inner) = extents(dims, axis);
    let mut out = vec![0.0; values.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| o * n * inner + k * inner + i;
            let max = (0..n).map(|k| values[at(k)]).fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for k in 0..n {
                let e = ((values[at(k)] - max) / temperature).exp();
                out[at(k)] = e;
                total += e;
            }
            for k in 0..n {
                out[at(k)] /= total;
            }
        }
    }
    out
}

/// Gradient of softmax given its output `y` and the output gradient `g`.
pub(crate) fn softmax_grad(y: &[f64], g: &[f64], dims: &[usize], axis: usize, temperature: f64) -> Vec<f64> {
    let (outer, n, inner) = extents(dims, axis);
    let mut out = vec![0.0; y.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| o * n * inner + k * inner + i;
            let dot: f64 = (0..n).map(|k| g[at(k)] * y[at(k)]).sum();
            for k in 0..n {
                out[at(k)] = y[at(k)] * (g[at(k)] - dot) / temperature;
            }
        }
    }
    out
}

/// Positions that would sort each lane along `axis`. Ties keep input order.
pub(crate) fn argsort(values: &[f64], dims: &[usize], axis: usize, ascending: bool) -> Vec<f64> {
    let (outer, n, inner) = extents(dims, axis);
    let mut out = vec![0.0; values.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| o * n * inner + k * inner + i;
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| {
                let ord = values[at(a)].partial_cmp(&values[at(b)]).unwrap_or(Ordering::Equal);
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
            for (k, &src) in order.iter().enumerate() {
                out[at(k)] = src as f64;
            }
        }
    }
    out
}
