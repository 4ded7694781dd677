//! Straightforward CPU kernels for every primitive pool.
//!
//! Matrix kernels honour each operand's [`Layout`]. Integer arithmetic wraps; integer
//! division by zero is an execution error.

use tensorplan_ir::{DType, Layout, OpKind, OpParams, TensorRef};

use crate::error::{ExecutorError, ExecutorResult};
use crate::memory::Element;
use crate::traits::{KernelArgs, KernelSet, OpContext, TypedIo};

/// Arithmetic needed by the reference kernels.
pub trait Numeric: Element {
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn checked_div(self, rhs: Self) -> Option<Self>;
    fn from_count(n: usize) -> Self;
    /// `Exp`, `Sin`, `Cos` and `Abs`; `None` for integers.
    fn float_unary(self, kind: OpKind) -> Option<Self>;
}

macro_rules! impl_numeric_int {
    ($($t:ty),*) => {
        $(
            impl Numeric for $t {
                fn add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }
                fn sub(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }
                fn mul(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }
                fn checked_div(self, rhs: Self) -> Option<Self> {
                    <$t>::checked_div(self, rhs)
                }
                fn from_count(n: usize) -> Self {
                    n as $t
                }
                fn float_unary(self, _kind: OpKind) -> Option<Self> {
                    None
                }
            }
        )*
    };
}

macro_rules! impl_numeric_float {
    ($($t:ty),*) => {
        $(
            impl Numeric for $t {
                fn add(self, rhs: Self) -> Self {
                    self + rhs
                }
                fn sub(self, rhs: Self) -> Self {
                    self - rhs
                }
                fn mul(self, rhs: Self) -> Self {
                    self * rhs
                }
                fn checked_div(self, rhs: Self) -> Option<Self> {
                    Some(self / rhs)
                }
                fn from_count(n: usize) -> Self {
                    n as $t
                }
                fn float_unary(self, kind: OpKind) -> Option<Self> {
                    match kind {
                        OpKind::Exp => Some(self.exp()),
                        OpKind::Sin => Some(self.sin()),
                        OpKind::Cos => Some(self.cos()),
                        OpKind::Abs => Some(self.abs()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_numeric_int!(u8, u16, u32, u64, i8, i16, i32, i64);
impl_numeric_float!(f32, f64);

/// CPU reference implementation of [`KernelSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceKernels;

impl ReferenceKernels {
    pub fn new() -> Self {
        ReferenceKernels
    }
}

impl KernelSet for ReferenceKernels {
    fn name(&self) -> &str {
        "ReferenceKernels"
    }

    fn supports(&self, kind: OpKind, dtype: DType) -> bool {
        if dtype == DType::F16 {
            return false;
        }
        match kind {
            OpKind::ElemAdd
            | OpKind::ElemSub
            | OpKind::ElemMul
            | OpKind::ElemDiv
            | OpKind::Fill
            | OpKind::Copy
            | OpKind::ScalarAdd
            | OpKind::ScalarSub
            | OpKind::ScalarMul
            | OpKind::ScalarDiv
            | OpKind::ArrayAxpy
            | OpKind::ArraySum
            | OpKind::ArrayMean
            | OpKind::MatAdd
            | OpKind::MatSub
            | OpKind::MatTranspose
            | OpKind::MatMul
            | OpKind::MatArrMul
            | OpKind::MatArrAdd => true,
            OpKind::Exp | OpKind::Sin | OpKind::Cos | OpKind::Abs => dtype.is_float(),
            OpKind::ElemRandom
            | OpKind::MatInv
            | OpKind::Group { .. }
            | OpKind::DZero
            | OpKind::DIdentity => false,
        }
    }

    fn execute(&mut self, ctx: &OpContext<'_>, args: KernelArgs<'_>) -> ExecutorResult<()> {
        match args {
            KernelArgs::U8(io) => run(ctx, io),
            KernelArgs::U16(io) => run(ctx, io),
            KernelArgs::U32(io) => run(ctx, io),
            KernelArgs::U64(io) => run(ctx, io),
            KernelArgs::I8(io) => run(ctx, io),
            KernelArgs::I16(io) => run(ctx, io),
            KernelArgs::I32(io) => run(ctx, io),
            KernelArgs::I64(io) => run(ctx, io),
            KernelArgs::F32(io) => run(ctx, io),
            KernelArgs::F64(io) => run(ctx, io),
        }
    }
}

fn run<T: Numeric>(ctx: &OpContext<'_>, mut io: TypedIo<'_, T>) -> ExecutorResult<()> {
    let unsupported = || ExecutorError::UnsupportedOperation {
        op: ctx.id,
        kind: ctx.kind,
        dtype: ctx.dtype,
    };
    let inputs = &io.inputs;
    let (out, mirrors) = io
        .outputs
        .split_first_mut()
        .ok_or_else(|| failed(ctx, "operation has no output"))?;

    let computed: ExecutorResult<()> = match ctx.kind {
        OpKind::ElemAdd => fold(ctx, inputs, out, |a, b| Ok(a.add(b))),
        OpKind::ElemSub => fold(ctx, inputs, out, |a, b| Ok(a.sub(b))),
        OpKind::ElemMul => fold(ctx, inputs, out, |a, b| Ok(a.mul(b))),
        OpKind::ElemDiv => fold(ctx, inputs, out, |a, b| {
            a.checked_div(b).ok_or_else(|| failed(ctx, "integer division by zero"))
        }),
        OpKind::Fill => {
            let value = scalar_param::<T>(ctx, io.params)?;
            out.fill(value);
            Ok(())
        }
        OpKind::Copy => {
            let input = same_len(ctx, inputs, 0, out.len())?;
            out.copy_from_slice(input);
            Ok(())
        }
        OpKind::Exp | OpKind::Sin | OpKind::Cos | OpKind::Abs => {
            let input = same_len(ctx, inputs, 0, out.len())?;
            for (o, &x) in out.iter_mut().zip(input) {
                *o = x.float_unary(ctx.kind).ok_or_else(unsupported)?;
            }
            Ok(())
        }
        OpKind::ScalarAdd | OpKind::ScalarSub | OpKind::ScalarMul | OpKind::ScalarDiv => {
            let s = scalar_param::<T>(ctx, io.params)?;
            let input = same_len(ctx, inputs, 0, out.len())?;
            for (o, &x) in out.iter_mut().zip(input) {
                *o = match ctx.kind {
                    OpKind::ScalarAdd => x.add(s),
                    OpKind::ScalarSub => x.sub(s),
                    OpKind::ScalarMul => x.mul(s),
                    _ => x
                        .checked_div(s)
                        .ok_or_else(|| failed(ctx, "integer division by zero"))?,
                };
            }
            Ok(())
        }
        OpKind::ArrayAxpy => {
            let a = scalar_param::<T>(ctx, io.params)?;
            let x = same_len(ctx, inputs, 0, out.len())?;
            let y = same_len(ctx, inputs, 1, out.len())?;
            for ((o, &xi), &yi) in out.iter_mut().zip(x).zip(y) {
                *o = a.mul(xi).add(yi);
            }
            Ok(())
        }
        OpKind::ArraySum | OpKind::ArrayMean => {
            if out.len() != 1 {
                return Err(shape(ctx, format!("reduction output has {} elements", out.len())));
            }
            let input = operand(ctx, inputs, 0)?;
            let sum = input.iter().fold(T::default(), |acc, &x| acc.add(x));
            out[0] = if ctx.kind == OpKind::ArraySum {
                sum
            } else {
                sum.checked_div(T::from_count(input.len()))
                    .ok_or_else(|| failed(ctx, "mean count is zero in the element type"))?
            };
            Ok(())
        }
        OpKind::MatAdd | OpKind::MatSub => {
            let (rows, cols) = matrix_dims(ctx, ctx.outputs[0])?;
            let a = ctx.inputs[0];
            let b = ctx.inputs[1];
            for t in [a, b] {
                if matrix_dims(ctx, t)? != (rows, cols) {
                    return Err(shape(ctx, format!("{} vs {}", t.shape(), ctx.outputs[0].shape())));
                }
            }
            let (xa, xb) = (operand(ctx, inputs, 0)?, operand(ctx, inputs, 1)?);
            for i in 0..rows {
                for j in 0..cols {
                    let (va, vb) = (xa[at(a, i, j)], xb[at(b, i, j)]);
                    out[at(ctx.outputs[0], i, j)] = if ctx.kind == OpKind::MatAdd {
                        va.add(vb)
                    } else {
                        va.sub(vb)
                    };
                }
            }
            Ok(())
        }
        OpKind::MatTranspose => {
            let src = ctx.inputs[0];
            let (rows, cols) = matrix_dims(ctx, src)?;
            if matrix_dims(ctx, ctx.outputs[0])? != (cols, rows) {
                return Err(shape(ctx, format!("transpose of {} into {}", src.shape(), ctx.outputs[0].shape())));
            }
            let x = operand(ctx, inputs, 0)?;
            for i in 0..rows {
                for j in 0..cols {
                    out[at(ctx.outputs[0], j, i)] = x[at(src, i, j)];
                }
            }
            Ok(())
        }
        OpKind::MatMul => {
            let (a, b, dst) = (ctx.inputs[0], ctx.inputs[1], ctx.outputs[0]);
            let (m, k) = matrix_dims(ctx, a)?;
            let (k2, n) = matrix_dims(ctx, b)?;
            if k != k2 || matrix_dims(ctx, dst)? != (m, n) {
                return Err(shape(ctx, format!("{} x {} into {}", a.shape(), b.shape(), dst.shape())));
            }
            let (xa, xb) = (operand(ctx, inputs, 0)?, operand(ctx, inputs, 1)?);
            for i in 0..m {
                for j in 0..n {
                    let mut acc = T::default();
                    for p in 0..k {
                        acc = acc.add(xa[at(a, i, p)].mul(xb[at(b, p, j)]));
                    }
                    out[at(dst, i, j)] = acc;
                }
            }
            Ok(())
        }
        OpKind::MatArrMul => {
            let mat = ctx.inputs[0];
            let (rows, cols) = matrix_dims(ctx, mat)?;
            let xm = operand(ctx, inputs, 0)?;
            let arr = same_len(ctx, inputs, 1, cols)?;
            if out.len() != rows {
                return Err(shape(ctx, format!("{} x [{}] into {} elements", mat.shape(), cols, out.len())));
            }
            for (i, o) in out.iter_mut().enumerate() {
                *o = (0..cols).fold(T::default(), |acc, j| acc.add(xm[at(mat, i, j)].mul(arr[j])));
            }
            Ok(())
        }
        OpKind::MatArrAdd => {
            let (mat, dst) = (ctx.inputs[0], ctx.outputs[0]);
            let (rows, cols) = matrix_dims(ctx, mat)?;
            if matrix_dims(ctx, dst)? != (rows, cols) {
                return Err(shape(ctx, format!("{} into {}", mat.shape(), dst.shape())));
            }
            let xm = operand(ctx, inputs, 0)?;
            let arr = same_len(ctx, inputs, 1, cols)?;
            for i in 0..rows {
                for j in 0..cols {
                    out[at(dst, i, j)] = xm[at(mat, i, j)].add(arr[j]);
                }
            }
            Ok(())
        }
        OpKind::ElemRandom
        | OpKind::MatInv
        | OpKind::Group { .. }
        | OpKind::DZero
        | OpKind::DIdentity => Err(unsupported()),
    };
    computed?;

    // Every further output receives a copy of the primary result.
    let primary = ctx.outputs[0];
    for (k, mirror) in mirrors.iter_mut().enumerate() {
        let t = ctx.outputs[k + 1];
        if t.shape() != primary.shape() || t.layout() != primary.layout() {
            return Err(shape(
                ctx,
                format!(
                    "output {} {} does not mirror output {} {}",
                    t.id(),
                    t.shape(),
                    primary.id(),
                    primary.shape()
                ),
            ));
        }
        mirror.copy_from_slice(&**out);
    }
    Ok(())
}

/// Left fold across all inputs, element by element.
fn fold<T: Numeric>(
    ctx: &OpContext<'_>,
    inputs: &[&[T]],
    out: &mut [T],
    f: impl Fn(T, T) -> ExecutorResult<T>,
) -> ExecutorResult<()> {
    let first = same_len(ctx, inputs, 0, out.len())?;
    out.copy_from_slice(first);
    for k in 1..inputs.len() {
        let rhs = same_len(ctx, inputs, k, out.len())?;
        for (o, &x) in out.iter_mut().zip(rhs) {
            *o = f(*o, x)?;
        }
    }
    Ok(())
}

fn scalar_param<T: Numeric>(ctx: &OpContext<'_>, params: &OpParams) -> ExecutorResult<T> {
    params
        .scalar::<T>()
        .ok_or_else(|| failed(ctx, "missing or mistyped scalar parameter"))
}

fn operand<'s, T>(ctx: &OpContext<'_>, inputs: &[&'s [T]], k: usize) -> ExecutorResult<&'s [T]> {
    inputs
        .get(k)
        .copied()
        .ok_or_else(|| failed(ctx, &format!("missing input {}", k)))
}

fn same_len<'s, T>(
    ctx: &OpContext<'_>,
    inputs: &[&'s [T]],
    k: usize,
    len: usize,
) -> ExecutorResult<&'s [T]> {
    let input = operand(ctx, inputs, k)?;
    if input.len() != len {
        return Err(shape(ctx, format!("input {} has {} elements, expected {}", k, input.len(), len)));
    }
    Ok(input)
}

fn matrix_dims(ctx: &OpContext<'_>, t: &TensorRef) -> ExecutorResult<(usize, usize)> {
    match t.shape().dims() {
        &[rows, cols] => Ok((rows, cols)),
        _ => Err(shape(ctx, format!("tensor {} is not a matrix: {}", t.id(), t.shape()))),
    }
}

/// Element offset of `(i, j)` in a rank-2 tensor.
fn at(t: &TensorRef, i: usize, j: usize) -> usize {
    let dims = t.shape().dims();
    match t.layout() {
        Layout::RowMajor => i * dims[1] + j,
        Layout::ColMajor => j * dims[0] + i,
    }
}

fn failed(ctx: &OpContext<'_>, what: &str) -> ExecutorError {
    ExecutorError::ExecutionFailed(format!("{} (op {}): {}", ctx.kind, ctx.id, what))
}

fn shape(ctx: &OpContext<'_>, what: String) -> ExecutorError {
    ExecutorError::ShapeMismatch(format!("{} (op {}): {}", ctx.kind, ctx.id, what))
}
