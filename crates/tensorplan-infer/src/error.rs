//! Error types for the memory store and execution provider.

use tensorplan_ir::{DType, IrError, OpId, OpKind, TensorId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("Unsupported dtype {dtype} for tensor {tensor}: no memory pool")]
    UnsupportedDType { tensor: TensorId, dtype: DType },

    #[error("Unsupported operation: {kind} on {dtype} (op {op})")]
    UnsupportedOperation {
        op: OpId,
        kind: OpKind,
        dtype: DType,
    },

    #[error("Pool for {dtype} cannot hold tensor {tensor}: arena exceeds the addressable size")]
    PoolOverflow { tensor: TensorId, dtype: DType },

    #[error("Type error: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Tensor index {index} out of bounds for {len} tensors")]
    TensorIndexOutOfBounds { index: usize, len: usize },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Logger initialization failed: {0}")]
    Logging(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
