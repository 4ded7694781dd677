//! Kernel collaborator interface.

use smallvec::SmallVec;
use tensorplan_ir::{CompactOp, DType, OpId, OpKind, OpParams, TensorRef, MAX_IN, MAX_OUT};

use crate::error::{ExecutorError, ExecutorResult};

/// Descriptors of the operation being dispatched.
#[derive(Debug, Clone)]
pub struct OpContext<'a> {
    /// Position in the execution order
    pub index: usize,
    pub id: OpId,
    pub kind: OpKind,
    pub dtype: DType,
    pub inputs: SmallVec<[&'a TensorRef; MAX_IN]>,
    pub outputs: SmallVec<[&'a TensorRef; MAX_OUT]>,
}

impl<'a> OpContext<'a> {
    pub fn new(index: usize, op: &CompactOp, tensors: &'a [TensorRef]) -> ExecutorResult<Self> {
        let lookup = |i: &u32| {
            tensors
                .get(*i as usize)
                .ok_or(ExecutorError::TensorIndexOutOfBounds {
                    index: *i as usize,
                    len: tensors.len(),
                })
        };
        Ok(OpContext {
            index,
            id: op.id,
            kind: op.kind,
            dtype: op.dtype,
            inputs: op.inputs.iter().map(lookup).collect::<ExecutorResult<_>>()?,
            outputs: op.outputs.iter().map(lookup).collect::<ExecutorResult<_>>()?,
        })
    }
}

/// Operand views of one operation, all drawn from the pool of its dtype.
///
/// Inputs are fully populated. A kernel must write every element of every output.
#[derive(Debug)]
pub struct TypedIo<'a, T> {
    pub inputs: SmallVec<[&'a [T]; MAX_IN]>,
    pub outputs: SmallVec<[&'a mut [T]; MAX_OUT]>,
    pub params: &'a OpParams,
}

/// Operands tagged with their primitive type.
#[derive(Debug)]
pub enum KernelArgs<'a> {
    U8(TypedIo<'a, u8>),
    U16(TypedIo<'a, u16>),
    U32(TypedIo<'a, u32>),
    U64(TypedIo<'a, u64>),
    I8(TypedIo<'a, i8>),
    I16(TypedIo<'a, i16>),
    I32(TypedIo<'a, i32>),
    I64(TypedIo<'a, i64>),
    F32(TypedIo<'a, f32>),
    F64(TypedIo<'a, f64>),
}

impl KernelArgs<'_> {
    pub fn dtype(&self) -> DType {
        match self {
            KernelArgs::U8(_) => DType::U8,
            KernelArgs::U16(_) => DType::U16,
            KernelArgs::U32(_) => DType::U32,
            KernelArgs::U64(_) => DType::U64,
            KernelArgs::I8(_) => DType::I8,
            KernelArgs::I16(_) => DType::I16,
            KernelArgs::I32(_) => DType::I32,
            KernelArgs::I64(_) => DType::I64,
            KernelArgs::F32(_) => DType::F32,
            KernelArgs::F64(_) => DType::F64,
        }
    }
}

/// A set of compute kernels the execution provider dispatches to.
pub trait KernelSet {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether [`KernelSet::execute`] handles `kind` on `dtype`.
    fn supports(&self, kind: OpKind, dtype: DType) -> bool;

    /// Run one operation.
    fn execute(&mut self, ctx: &OpContext<'_>, args: KernelArgs<'_>) -> ExecutorResult<()>;
}
