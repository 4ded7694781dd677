//! Operation kinds.

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::limits::MAX_IN;

/// Closed set of operation kinds understood by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// N-ary elementwise sum, folded left to right
    ElemAdd,
    ElemSub,
    ElemMul,
    ElemDiv,
    ElemRandom,
    /// Broadcast the parameter scalar into every output element
    Fill,
    Copy,
    Exp,
    Sin,
    Cos,
    Abs,
    /// Elementwise `input + scalar`, scalar held in the parameter bytes
    ScalarAdd,
    ScalarSub,
    ScalarMul,
    ScalarDiv,
    /// `out = a * x + y`, `a` held in the parameter bytes
    ArrayAxpy,
    ArraySum,
    ArrayMean,
    MatAdd,
    MatSub,
    MatTranspose,
    MatMul,
    MatInv,
    /// Matrix times array, broadcast along rows
    MatArrMul,
    MatArrAdd,
    /// Atomic run of member operations; `pinned` fixes its absolute position
    Group { pinned: bool },
    DZero,
    DIdentity,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::ElemAdd => "ELM_ADD",
            OpKind::ElemSub => "ELM_SUB",
            OpKind::ElemMul => "ELM_MUL",
            OpKind::ElemDiv => "ELM_DIV",
            OpKind::ElemRandom => "ELM_RANDOM",
            OpKind::Fill => "ELM_FILL",
            OpKind::Copy => "COPY",
            OpKind::Exp => "EXPONENTIAL",
            OpKind::Sin => "SIN",
            OpKind::Cos => "COS",
            OpKind::Abs => "ABS",
            OpKind::ScalarAdd => "SCL_ELM_ADD",
            OpKind::ScalarSub => "SCL_ELM_SUB",
            OpKind::ScalarMul => "SCL_ELM_MUL",
            OpKind::ScalarDiv => "SCL_ELM_DIV",
            OpKind::ArrayAxpy => "ARRAY_AXPY",
            OpKind::ArraySum => "ARRAY_SUM",
            OpKind::ArrayMean => "ARRAY_MEAN",
            OpKind::MatAdd => "MAT_ADD",
            OpKind::MatSub => "MAT_SUB",
            OpKind::MatTranspose => "MAT_TRAN",
            OpKind::MatMul => "MAT_MUL",
            OpKind::MatInv => "MAT_INV",
            OpKind::MatArrMul => "MAT_ARR_MUL",
            OpKind::MatArrAdd => "MAT_ARR_ADD",
            OpKind::Group { .. } => "EXP_GROUP",
            OpKind::DZero => "D_ZERO",
            OpKind::DIdentity => "D_IDENTITY",
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, OpKind::Group { .. })
    }

    /// Number of parameter bytes the kind expects for the given operation dtype.
    pub fn param_size(&self, dtype: DType) -> usize {
        match self {
            OpKind::Fill
            | OpKind::ScalarAdd
            | OpKind::ScalarSub
            | OpKind::ScalarMul
            | OpKind::ScalarDiv
            | OpKind::ArrayAxpy => dtype.byte_size(),
            _ => 0,
        }
    }

    /// Inclusive bounds on the number of inputs (member count for groups).
    pub fn input_arity(&self) -> (usize, usize) {
        match self {
            OpKind::ElemAdd | OpKind::ElemSub | OpKind::ElemMul | OpKind::ElemDiv => (2, MAX_IN),
            OpKind::ElemRandom | OpKind::Fill => (0, 0),
            OpKind::Copy
            | OpKind::Exp
            | OpKind::Sin
            | OpKind::Cos
            | OpKind::Abs
            | OpKind::ScalarAdd
            | OpKind::ScalarSub
            | OpKind::ScalarMul
            | OpKind::ScalarDiv
            | OpKind::ArraySum
            | OpKind::ArrayMean
            | OpKind::MatTranspose
            | OpKind::MatInv => (1, 1),
            OpKind::ArrayAxpy
            | OpKind::MatAdd
            | OpKind::MatSub
            | OpKind::MatMul
            | OpKind::MatArrMul
            | OpKind::MatArrAdd => (2, 2),
            OpKind::Group { .. } => (2, MAX_IN),
            OpKind::DZero | OpKind::DIdentity => (0, MAX_IN),
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
