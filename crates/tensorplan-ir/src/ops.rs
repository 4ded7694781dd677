//! Constructor helpers for common operations.
//!
//! Each helper takes the output descriptor first, derives the operation dtype from it and
//! checks that every input shares that dtype.
//!
//! ```
//! use tensorplan_ir::{ops, DType, TensorRef};
//!
//! let a = TensorRef::array(0, DType::F32, 4).unwrap();
//! let b = TensorRef::array(1, DType::F32, 4).unwrap();
//! let c = TensorRef::array(2, DType::F32, 4).unwrap();
//! let add = ops::elm_add(0, &c, &[&a, &b]).unwrap();
//! assert_eq!(add.inputs(), &[0, 1]);
//! ```

use smallvec::SmallVec;

use crate::error::{check_capacity, CapacityKind, IrError, IrResult};
use crate::expr::{ExprNode, OpId};
use crate::graph::OpKind;
use crate::limits::MAX_IN;
use crate::params::{OpParams, ParamValue};
use crate::tensor::{TensorId, TensorRef};

fn build(
    id: OpId,
    kind: OpKind,
    out: &TensorRef,
    inputs: &[&TensorRef],
    params: OpParams,
) -> IrResult<ExprNode> {
    check_capacity(CapacityKind::Inputs, MAX_IN, inputs.len())?;
    let dtype = out.dtype();
    let mut ids: SmallVec<[TensorId; MAX_IN]> = SmallVec::new();
    for t in inputs {
        if t.dtype() != dtype {
            return Err(IrError::DTypeMismatch {
                expected: dtype,
                actual: t.dtype(),
            });
        }
        ids.push(t.id());
    }
    ExprNode::with_params(id, kind, dtype, &ids, &[out.id()], params)
}

fn scalar_param<T: ParamValue>(out: &TensorRef, value: T) -> IrResult<OpParams> {
    if T::DTYPE != out.dtype() {
        return Err(IrError::DTypeMismatch {
            expected: out.dtype(),
            actual: T::DTYPE,
        });
    }
    Ok(OpParams::from_scalar(value))
}

pub fn elm_add(id: OpId, out: &TensorRef, inputs: &[&TensorRef]) -> IrResult<ExprNode> {
    build(id, OpKind::ElemAdd, out, inputs, OpParams::empty())
}

pub fn elm_sub(id: OpId, out: &TensorRef, inputs: &[&TensorRef]) -> IrResult<ExprNode> {
    build(id, OpKind::ElemSub, out, inputs, OpParams::empty())
}

pub fn elm_mul(id: OpId, out: &TensorRef, inputs: &[&TensorRef]) -> IrResult<ExprNode> {
    build(id, OpKind::ElemMul, out, inputs, OpParams::empty())
}

pub fn elm_div(id: OpId, out: &TensorRef, inputs: &[&TensorRef]) -> IrResult<ExprNode> {
    build(id, OpKind::ElemDiv, out, inputs, OpParams::empty())
}

/// Fill every element of `out` with `value`. The value's type must match `out`'s dtype.
pub fn fill<T: ParamValue>(id: OpId, out: &TensorRef, value: T) -> IrResult<ExprNode> {
    let params = scalar_param(out, value)?;
    build(id, OpKind::Fill, out, &[], params)
}

pub fn copy(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::Copy, out, &[input], OpParams::empty())
}

pub fn exp(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::Exp, out, &[input], OpParams::empty())
}

pub fn sin(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::Sin, out, &[input], OpParams::empty())
}

pub fn cos(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::Cos, out, &[input], OpParams::empty())
}

pub fn abs(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::Abs, out, &[input], OpParams::empty())
}

pub fn scalar_add<T: ParamValue>(
    id: OpId,
    out: &TensorRef,
    input: &TensorRef,
    value: T,
) -> IrResult<ExprNode> {
    let params = scalar_param(out, value)?;
    build(id, OpKind::ScalarAdd, out, &[input], params)
}

pub fn scalar_sub<T: ParamValue>(
    id: OpId,
    out: &TensorRef,
    input: &TensorRef,
    value: T,
) -> IrResult<ExprNode> {
    let params = scalar_param(out, value)?;
    build(id, OpKind::ScalarSub, out, &[input], params)
}

pub fn scalar_mul<T: ParamValue>(
    id: OpId,
    out: &TensorRef,
    input: &TensorRef,
    value: T,
) -> IrResult<ExprNode> {
    let params = scalar_param(out, value)?;
    build(id, OpKind::ScalarMul, out, &[input], params)
}

pub fn scalar_div<T: ParamValue>(
    id: OpId,
    out: &TensorRef,
    input: &TensorRef,
    value: T,
) -> IrResult<ExprNode> {
    let params = scalar_param(out, value)?;
    build(id, OpKind::ScalarDiv, out, &[input], params)
}

/// `out = a * x + y`.
pub fn array_axpy<T: ParamValue>(
    id: OpId,
    out: &TensorRef,
    a: T,
    x: &TensorRef,
    y: &TensorRef,
) -> IrResult<ExprNode> {
    let params = scalar_param(out, a)?;
    build(id, OpKind::ArrayAxpy, out, &[x, y], params)
}

pub fn array_sum(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::ArraySum, out, &[input], OpParams::empty())
}

pub fn array_mean(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::ArrayMean, out, &[input], OpParams::empty())
}

pub fn mat_add(id: OpId, out: &TensorRef, a: &TensorRef, b: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::MatAdd, out, &[a, b], OpParams::empty())
}

pub fn mat_sub(id: OpId, out: &TensorRef, a: &TensorRef, b: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::MatSub, out, &[a, b], OpParams::empty())
}

pub fn mat_transpose(id: OpId, out: &TensorRef, input: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::MatTranspose, out, &[input], OpParams::empty())
}

pub fn mat_mul(id: OpId, out: &TensorRef, a: &TensorRef, b: &TensorRef) -> IrResult<ExprNode> {
    build(id, OpKind::MatMul, out, &[a, b], OpParams::empty())
}

pub fn mat_arr_mul(
    id: OpId,
    out: &TensorRef,
    mat: &TensorRef,
    arr: &TensorRef,
) -> IrResult<ExprNode> {
    build(id, OpKind::MatArrMul, out, &[mat, arr], OpParams::empty())
}

pub fn mat_arr_add(
    id: OpId,
    out: &TensorRef,
    mat: &TensorRef,
    arr: &TensorRef,
) -> IrResult<ExprNode> {
    build(id, OpKind::MatArrAdd, out, &[mat, arr], OpParams::empty())
}

/// Group marker over member operation ids.
pub fn group(id: OpId, members: &[OpId], pinned: bool) -> IrResult<ExprNode> {
    ExprNode::group(id, members, pinned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn test_fill_checks_value_type() {
        let out = TensorRef::array(0, DType::F32, 3).unwrap();
        let node = fill(0, &out, 1.5f32).unwrap();
        assert_eq!(node.params().scalar::<f32>(), Some(1.5));
        assert_eq!(
            fill(0, &out, 1.5f64),
            Err(IrError::DTypeMismatch {
                expected: DType::F32,
                actual: DType::F64
            })
        );
    }

    #[test]
    fn test_input_dtype_must_match() {
        let a = TensorRef::array(0, DType::I32, 3).unwrap();
        let out = TensorRef::array(1, DType::F32, 3).unwrap();
        assert!(matches!(
            copy(0, &out, &a),
            Err(IrError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_mat_mul() {
        let a = TensorRef::matrix(0, DType::F64, 2, 3).unwrap();
        let b = TensorRef::matrix(1, DType::F64, 3, 2).unwrap();
        let c = TensorRef::matrix(2, DType::F64, 2, 2).unwrap();
        let node = mat_mul(5, &c, &a, &b).unwrap();
        assert_eq!(node.kind(), OpKind::MatMul);
        assert_eq!(node.dtype(), Some(DType::F64));
        assert_eq!(node.outputs(), &[2]);
    }
}
