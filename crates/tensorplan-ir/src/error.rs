//! Error types for the IR.

use thiserror::Error;

use crate::dtype::DType;
use crate::expr::OpId;
use crate::graph::OpKind;
use crate::tensor::TensorId;

/// Which fixed-capacity container overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    Tensors,
    Operations,
    Inputs,
    Outputs,
    Rank,
    FanOut,
    GroupMembers,
    Params,
}

impl std::fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CapacityKind::Tensors => "tensor",
            CapacityKind::Operations => "operation",
            CapacityKind::Inputs => "operation input",
            CapacityKind::Outputs => "operation output",
            CapacityKind::Rank => "shape rank",
            CapacityKind::FanOut => "tensor fan-out",
            CapacityKind::GroupMembers => "group member",
            CapacityKind::Params => "parameter byte",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("{what} capacity exceeded: limit is {limit}, needed {requested}")]
    CapacityOverflow {
        what: CapacityKind,
        limit: usize,
        requested: usize,
    },
    #[error("Operation {op} references tensor {tensor} which is not in the tensor array")]
    UnresolvedTensor { op: OpId, tensor: TensorId },
    #[error("Tensor {tensor} is produced by both operation {first} and operation {second}")]
    MultipleProducers {
        tensor: TensorId,
        first: OpId,
        second: OpId,
    },
    #[error("Group {group}: member expression {member} not found to the right of the group")]
    GroupMemberNotFound { group: OpId, member: OpId },
    #[error("Group {group}: {reason}")]
    InvalidGroup { group: OpId, reason: String },
    #[error("Operation {op} ({kind}): {reason}")]
    InvalidOperation {
        op: OpId,
        kind: OpKind,
        reason: String,
    },
    #[error("Tensor id {id} appears twice with different descriptors")]
    ConflictingTensor { id: TensorId },
    #[error("Operation id {id} is used by two structurally different operations")]
    ConflictingOperation { id: OpId },
    #[error("Tensor id {id} lies in the reserved synthetic id range (>= {base})")]
    ReservedTensorId { id: TensorId, base: u32 },
    #[error("No tensor with id {id}")]
    UnknownTensorId { id: TensorId },
    #[error("Tensor index {index} out of bounds (len: {len})")]
    TensorIndexOutOfBounds { index: usize, len: usize },
    #[error("Arena node {index} out of bounds (len: {len})")]
    NodeIndexOutOfBounds { index: usize, len: usize },
    #[error("Arena node {index} is a tensor where an operation was expected")]
    ExpectedOperation { index: usize },
    #[error("Data type mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },
    #[error("Shape must have at least one dimension and no zero-sized dimension")]
    InvalidShape,
    #[error("Shape {dims:?} is too large to address")]
    ShapeOverflow { dims: Vec<usize> },
    #[error("Schedule places consumer operation {consumer} before its producer {producer}")]
    ScheduleViolation { producer: OpId, consumer: OpId },
    #[error("Graph contains a cycle and cannot be topologically sorted")]
    CyclicGraph,
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type IrResult<T> = Result<T, IrError>;

pub(crate) fn check_capacity(what: CapacityKind, limit: usize, requested: usize) -> IrResult<()> {
    if requested > limit {
        return Err(IrError::CapacityOverflow {
            what,
            limit,
            requested,
        });
    }
    Ok(())
}
