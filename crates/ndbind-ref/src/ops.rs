//! Operator registry of the reference engine: shape inference, forward
//! kernels and gradient rules.

use ndbind_core::{DType, NdError, OpParams, Result, Shape};
use ndbind_native::OpHandle;

use crate::kernels::{self, Reducer};

/// Operators registered by the reference engine, under their native names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CopyTo,
    ZerosLike,
    OnesLike,
    Zeros,
    Ones,
    Add,
    Sub,
    Mul,
    Div,
    PlusScalar,
    MinusScalar,
    MulScalar,
    DivScalar,
    Negative,
    Sum,
    Mean,
    Max,
    Min,
    Split,
    Softmax,
    Argsort,
}

impl Op {
    pub const ALL: [Op; 21] = [
        Op::CopyTo,
        Op::ZerosLike,
        Op::OnesLike,
        Op::Zeros,
        Op::Ones,
        Op::Add,
        Op::Sub,
        Op::Mul,
        Op::Div,
        Op::PlusScalar,
        Op::MinusScalar,
        Op::MulScalar,
        Op::DivScalar,
        Op::Negative,
        Op::Sum,
        Op::Mean,
        Op::Max,
        Op::Min,
        Op::Split,
        Op::Softmax,
        Op::Argsort,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Op::CopyTo => "_copyto",
            Op::ZerosLike => "zeros_like",
            Op::OnesLike => "ones_like",
            Op::Zeros => "_zeros",
            Op::Ones => "_ones",
            Op::Add => "elemwise_add",
            Op::Sub => "elemwise_sub",
            Op::Mul => "elemwise_mul",
            Op::Div => "elemwise_div",
            Op::PlusScalar => "_plus_scalar",
            Op::MinusScalar => "_minus_scalar",
            Op::MulScalar => "_mul_scalar",
            Op::DivScalar => "_div_scalar",
            Op::Negative => "negative",
            Op::Sum => "sum",
            Op::Mean => "mean",
            Op::Max => "max",
            Op::Min => "min",
            Op::Split => "split",
            Op::Softmax => "softmax",
            Op::Argsort => "argsort",
        }
    }

    pub fn from_name(name: &str) -> Option<Op> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    pub(crate) fn handle(self) -> OpHandle {
        let idx = Self::ALL.iter().position(|&op| op == self).unwrap_or(0);
        OpHandle::from_id(idx as u64 + 1)
    }

    pub(crate) fn from_handle(op: OpHandle) -> Option<Op> {
        (op.id() as usize)
            .checked_sub(1)
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    fn arity(self) -> usize {
        match self {
            Op::Zeros | Op::Ones => 0,
            Op::Add | Op::Sub | Op::Mul | Op::Div => 2,
            _ => 1,
        }
    }

    fn reducer(self) -> Option<Reducer> {
        match self {
            Op::Sum => Some(Reducer::Sum),
            Op::Mean => Some(Reducer::Mean),
            Op::Max => Some(Reducer::Max),
            Op::Min => Some(Reducer::Min),
            _ => None,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Values of one operand together with its shape.
pub(crate) type Operand = (Vec<f64>, Shape);

fn fail(op: Op, msg: impl Into<String>) -> NdError {
    NdError::native(op.name(), msg)
}

fn axis_param(op: Op, params: &OpParams, shape: &Shape, default: Option<i64>) -> Result<Option<usize>> {
    let raw = params
        .get_int("axis")
        .or_else(|| params.get_tuple("axis").and_then(|t| t.first().copied()))
        .or(default);
    match raw {
        None => Ok(None),
        Some(axis) => shape
            .normalize_axis(axis)
            .map(Some)
            .ok_or_else(|| fail(op, format!("axis {axis} out of range for shape {shape}"))),
    }
}

fn required_axis(op: Op, params: &OpParams, shape: &Shape, default: i64) -> Result<usize> {
    axis_param(op, params, shape, Some(default))?
        .ok_or_else(|| fail(op, "missing axis"))
}

fn scalar_param(op: Op, params: &OpParams) -> Result<f64> {
    params
        .get_float("scalar")
        .ok_or_else(|| fail(op, "missing parameter 'scalar'"))
}

fn temperature(params: &OpParams) -> f64 {
    params.get_float("temperature").unwrap_or(1.0)
}

struct SplitArgs {
    axis: usize,
    parts: usize,
    squeeze: bool,
}

fn split_args(params: &OpParams, shape: &Shape) -> Result<SplitArgs> {
    let axis = required_axis(Op::Split, params, shape, 1)?;
    let parts = params
        .get_int("num_outputs")
        .filter(|&n| n > 0)
        .ok_or_else(|| fail(Op::Split, "num_outputs must be a positive integer"))? as usize;
    let len = shape.dims()[axis];
    if len % parts != 0 {
        return Err(fail(
            Op::Split,
            format!("axis {axis} of length {len} does not split into {parts} equal parts"),
        ));
    }
    let squeeze = params.get_bool("squeeze_axis").unwrap_or(false);
    if squeeze && len / parts != 1 {
        return Err(fail(Op::Split, "squeeze_axis requires parts of length 1"));
    }
    Ok(SplitArgs { axis, parts, squeeze })
}

fn reduced_shape(shape: &Shape, axis: Option<usize>, keepdims: bool) -> Shape {
    let out = match (axis, keepdims) {
        (Some(axis), true) => shape.with_dim(axis, 1),
        (Some(axis), false) => shape.without_axis(axis),
        (None, true) => Shape::from(vec![1; shape.ndim()]),
        (None, false) => Shape::new(&[1]),
    };
    if out.ndim() == 0 {
        Shape::new(&[1])
    } else {
        out
    }
}

/// Output shapes and dtypes for `op` applied to `inputs`.
pub(crate) fn infer(op: Op, inputs: &[(Shape, DType)], params: &OpParams) -> Result<Vec<(Shape, DType)>> {
    if inputs.len() != op.arity() {
        return Err(fail(
            op,
            format!("expected {} inputs, got {}", op.arity(), inputs.len()),
        ));
    }
    let out = match op {
        Op::Zeros | Op::Ones => {
            let dims = params
                .get_tuple("shape")
                .ok_or_else(|| fail(op, "missing parameter 'shape'"))?;
            let dims = dims
                .iter()
                .map(|&d| usize::try_from(d).map_err(|_| fail(op, format!("negative dimension {d}"))))
                .collect::<Result<Vec<_>>>()?;
            let dtype = params.get_dtype("dtype").unwrap_or(DType::F32);
            vec![(Shape::from(dims), dtype)]
        }
        Op::Add | Op::Sub | Op::Mul | Op::Div => {
            let (lhs, rhs) = (&inputs[0], &inputs[1]);
            if lhs.0 != rhs.0 {
                return Err(fail(op, format!("shape mismatch {} vs {}", lhs.0, rhs.0)));
            }
            if lhs.1 != rhs.1 {
                return Err(fail(op, format!("dtype mismatch {} vs {}", lhs.1, rhs.1)));
            }
            vec![lhs.clone()]
        }
        Op::PlusScalar | Op::MinusScalar | Op::MulScalar | Op::DivScalar => {
            scalar_param(op, params)?;
            vec![inputs[0].clone()]
        }
        Op::CopyTo | Op::ZerosLike | Op::OnesLike | Op::Negative => vec![inputs[0].clone()],
        Op::Sum | Op::Mean | Op::Max | Op::Min => {
            let (shape, dtype) = &inputs[0];
            let axis = axis_param(op, params, shape, None)?;
            let keepdims = params.get_bool("keepdims").unwrap_or(false);
            vec![(reduced_shape(shape, axis, keepdims), *dtype)]
        }
        Op::Split => {
            let (shape, dtype) = &inputs[0];
            let args = split_args(params, shape)?;
            let part = shape.dims()[args.axis] / args.parts;
            let part_shape = if args.squeeze {
                shape.without_axis(args.axis)
            } else {
                shape.with_dim(args.axis, part)
            };
            vec![(part_shape, *dtype); args.parts]
        }
        Op::Softmax => {
            let (shape, dtype) = &inputs[0];
            required_axis(op, params, shape, -1)?;
            if temperature(params) == 0.0 {
                return Err(fail(op, "temperature must be non-zero"));
            }
            vec![(shape.clone(), *dtype)]
        }
        Op::Argsort => {
            let (shape, _) = &inputs[0];
            required_axis(op, params, shape, -1)?;
            let dtype = params.get_dtype("dtype").unwrap_or(DType::F32);
            vec![(shape.clone(), dtype)]
        }
    };
    Ok(out)
}

/// Forward computation. Arguments were validated by [`infer`].
pub(crate) fn compute(op: Op, inputs: &[Operand], params: &OpParams) -> Result<Vec<Vec<f64>>> {
    let unary = |f: &dyn Fn(f64) -> f64| vec![kernels::map(&inputs[0].0, f)];
    let binary = |f: &dyn Fn(f64, f64) -> f64| vec![kernels::zip(&inputs[0].0, &inputs[1].0, f)];
    let out = match op {
        Op::CopyTo => vec![inputs[0].0.clone()],
        Op::ZerosLike => unary(&|_| 0.0),
        Op::OnesLike => unary(&|_| 1.0),
        Op::Zeros | Op::Ones => {
            let fill = if op == Op::Ones { 1.0 } else { 0.0 };
            let size: i64 = params.get_tuple("shape").map_or(0, |d| d.iter().product());
            vec![vec![fill; size.max(0) as usize]]
        }
        Op::Add => binary(&|a, b| a + b),
        Op::Sub => binary(&|a, b| a - b),
        Op::Mul => binary(&|a, b| a * b),
        Op::Div => binary(&|a, b| a / b),
        Op::PlusScalar => {
            let s = scalar_param(op, params)?;
            unary(&|a| a + s)
        }
        Op::MinusScalar => {
            let s = scalar_param(op, params)?;
            unary(&|a| a - s)
        }
        Op::MulScalar => {
            let s = scalar_param(op, params)?;
            unary(&|a| a * s)
        }
        Op::DivScalar => {
            let s = scalar_param(op, params)?;
            unary(&|a| a / s)
        }
        Op::Negative => unary(&|a| -a),
        Op::Sum | Op::Mean | Op::Max | Op::Min => {
            let (values, shape) = &inputs[0];
            let axis = axis_param(op, params, shape, None)?;
            let reducer = op.reducer().ok_or_else(|| fail(op, "not a reduction"))?;
            vec![kernels::reduce(values, shape.dims(), axis, reducer)]
        }
        Op::Split => {
            let (values, shape) = &inputs[0];
            let args = split_args(params, shape)?;
            kernels::split(values, shape.dims(), args.axis, args.parts)
        }
        Op::Softmax => {
            let (values, shape) = &inputs[0];
            let axis = required_axis(op, params, shape, -1)?;
            vec![kernels::softmax(values, shape.dims(), axis, temperature(params))]
        }
        Op::Argsort => {
            let (values, shape) = &inputs[0];
            let axis = required_axis(op, params, shape, -1)?;
            let ascending = params.get_bool("is_ascend").unwrap_or(true);
            vec![kernels::argsort(values, shape.dims(), axis, ascending)]
        }
    };
    Ok(out)
}

/// Gradients of the inputs given the gradients of the outputs.
///
/// `None` in `out_grads` means no gradient reached that output. A `None`
/// in the result means the input receives nothing.
pub(crate) fn gradient(
    op: Op,
    params: &OpParams,
    inputs: &[Operand],
    outputs: &[Operand],
    out_grads: &[Option<Vec<f64>>],
) -> Result<Vec<Option<Vec<f64>>>> {
    let first = out_grads.first().and_then(Option::as_ref);
    if first.is_none() && op != Op::Split {
        return Ok(vec![None; inputs.len()]);
    }
    let empty = Vec::new();
    let g = first.unwrap_or(&empty);
    let grads = match op {
        Op::CopyTo | Op::PlusScalar | Op::MinusScalar => vec![Some(g.clone())],
        Op::Negative => vec![Some(kernels::map(g, |v| -v))],
        Op::MulScalar => {
            let s = scalar_param(op, params)?;
            vec![Some(kernels::map(g, |v| v * s))]
        }
        Op::DivScalar => {
            let s = scalar_param(op, params)?;
            vec![Some(kernels::map(g, |v| v / s))]
        }
        Op::Add => vec![Some(g.clone()), Some(g.clone())],
        Op::Sub => vec![Some(g.clone()), Some(kernels::map(g, |v| -v))],
        Op::Mul => {
            let (a, b) = (&inputs[0].0, &inputs[1].0);
            vec![Some(kernels::zip(g, b, |g, b| g * b)), Some(kernels::zip(g, a, |g, a| g * a))]
        }
        Op::Div => {
            let (a, b) = (&inputs[0].0, &inputs[1].0);
            let da = kernels::zip(g, b, |g, b| g / b);
            let db: Vec<f64> = g
                .iter()
                .zip(a.iter().zip(b))
                .map(|(&g, (&a, &b))| -g * a / (b * b))
                .collect();
            vec![Some(da), Some(db)]
        }
        Op::ZerosLike | Op::OnesLike => vec![None],
        Op::Zeros | Op::Ones => Vec::new(),
        Op::Sum | Op::Mean | Op::Max | Op::Min => {
            let (values, shape) = &inputs[0];
            let axis = axis_param(op, params, shape, None)?;
            let index = kernels::reduced_index(shape.dims(), axis);
            let reduced = &outputs[0].0;
            let count = match axis {
                Some(axis) => shape.dims()[axis],
                None => shape.size(),
            }
            .max(1) as f64;
            let grad = index
                .iter()
                .zip(values)
                .map(|(&j, &x)| match op {
                    Op::Sum => g[j],
                    Op::Mean => g[j] / count,
                    // every element equal to the extremum receives the gradient
                    _ => {
                        if x == reduced[j] {
                            g[j]
                        } else {
                            0.0
                        }
                    }
                })
                .collect();
            vec![Some(grad)]
        }
        Op::Softmax => {
            let (_, shape) = &inputs[0];
            let axis = required_axis(op, params, shape, -1)?;
            let y = &outputs[0].0;
            vec![Some(kernels::softmax_grad(y, g, shape.dims(), axis, temperature(params)))]
        }
        Op::Argsort => {
            return Err(fail(op, "operator is not differentiable"));
        }
        Op::Split => {
            let (_, shape) = &inputs[0];
            let args = split_args(params, shape)?;
            // outputs no gradient reached contribute zeros
            let parts: Vec<Vec<f64>> = out_grads
                .iter()
                .zip(outputs)
                .map(|(g, (values, _))| g.clone().unwrap_or_else(|| vec![0.0; values.len()]))
                .collect();
            vec![Some(kernels::concat(&parts, shape.dims(), args.axis))]
        }
    };
    Ok(grads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(dims: &[usize]) -> (Shape, DType) {
        (Shape::new(dims), DType::F32)
    }

    #[test]
    fn test_handles_roundtrip_names() {
        for op in Op::ALL {
            assert_eq!(Op::from_handle(op.handle()), Some(op));
            assert_eq!(Op::from_name(op.name()), Some(op));
        }
        assert_eq!(Op::from_name("convolution"), None);
        assert_eq!(Op::from_handle(OpHandle::from_id(0)), None);
    }

    #[test]
    fn test_infer_reductions() {
        let x = [meta(&[2, 3, 4])];
        let p = OpParams::new().int("axis", 1);
        assert_eq!(infer(Op::Sum, &x, &p).unwrap()[0].0, Shape::new(&[2, 4]));
        let p = OpParams::new().int("axis", -1).flag("keepdims", true);
        assert_eq!(infer(Op::Max, &x, &p).unwrap()[0].0, Shape::new(&[2, 3, 1]));
        assert_eq!(infer(Op::Mean, &x, &OpParams::new()).unwrap()[0].0, Shape::new(&[1]));
        let bad = OpParams::new().int("axis", 3);
        assert!(infer(Op::Min, &x, &bad).is_err());
    }

    #[test]
    fn test_infer_split() {
        let x = [meta(&[2, 6])];
        let p = OpParams::new().int("num_outputs", 3).int("axis", 1);
        let out = infer(Op::Split, &x, &p).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].0, Shape::new(&[2, 2]));

        let p = OpParams::new().int("num_outputs", 4).int("axis", 1);
        assert!(infer(Op::Split, &x, &p).is_err());

        let p = OpParams::new().int("num_outputs", 2).int("axis", 0).flag("squeeze_axis", true);
        let out = infer(Op::Split, &x, &p).unwrap();
        assert_eq!(out[1].0, Shape::new(&[6]));
    }

    #[test]
    fn test_infer_rejects_mismatched_operands() {
        let err = infer(Op::Add, &[meta(&[2]), meta(&[3])], &OpParams::new()).unwrap_err();
        assert!(matches!(err, NdError::NativeExecution { .. }));
        assert!(infer(Op::Negative, &[], &OpParams::new()).is_err());
    }

    #[test]
    fn test_mul_gradient() {
        let a = (vec![2.0, 3.0], Shape::new(&[2]));
        let b = (vec![5.0, 7.0], Shape::new(&[2]));
        let out = (vec![10.0, 21.0], Shape::new(&[2]));
        let grads = gradient(
            Op::Mul,
            &OpParams::new(),
            &[a, b],
            &[out],
            &[Some(vec![1.0, 1.0])],
        )
        .unwrap();
        assert_eq!(grads[0], Some(vec![5.0, 7.0]));
        assert_eq!(grads[1], Some(vec![2.0, 3.0]));
    }

    #[test]
    fn test_mean_gradient_spreads_evenly() {
        let x = (vec![1.0, 2.0, 3.0, 4.0], Shape::new(&[2, 2]));
        let y = (vec![2.5], Shape::new(&[1]));
        let grads = gradient(Op::Mean, &OpParams::new(), &[x], &[y], &[Some(vec![1.0])]).unwrap();
        assert_eq!(grads[0], Some(vec![0.25; 4]));
    }

    #[test]
    fn test_argsort_has_no_gradient() {
        let x = (vec![1.0, 0.0], Shape::new(&[2]));
        let y = (vec![1.0, 0.0], Shape::new(&[2]));
        let err = gradient(Op::Argsort, &OpParams::new(), &[x], &[y], &[Some(vec![1.0, 1.0])]);
        assert!(err.is_err());
    }
}
