//! DAG node wrappers carrying dense adjacency.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::dtype::DType;
use crate::expr::{ExprNode, OpId};
use crate::graph::OpKind;
use crate::limits::{MAX_IN, MAX_OUT, TENSOR_MAX_OUT};
use crate::tensor::{TensorId, TensorRef};

/// A tensor together with its producer and consumers (operation indices).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorNode {
    pub(crate) tensor: TensorRef,
    pub(crate) incoming: Option<u32>,
    pub(crate) outgoing: SmallVec<[u32; TENSOR_MAX_OUT]>,
}

impl TensorNode {
    pub(crate) fn new(tensor: TensorRef) -> Self {
        TensorNode {
            tensor,
            incoming: None,
            outgoing: SmallVec::new(),
        }
    }

    pub fn tensor(&self) -> &TensorRef {
        &self.tensor
    }

    pub fn id(&self) -> TensorId {
        self.tensor.id()
    }

    pub fn dtype(&self) -> DType {
        self.tensor.dtype()
    }

    /// Index of the producing operation.
    pub fn incoming(&self) -> Option<usize> {
        self.incoming.map(|i| i as usize)
    }

    /// Indices of the consuming operations, each listed once.
    pub fn outgoing(&self) -> impl Iterator<Item = usize> + '_ {
        self.outgoing.iter().map(|&i| i as usize)
    }

    pub fn total_out(&self) -> usize {
        self.outgoing.len()
    }
}

/// An operation with its inputs and outputs rewritten as tensor indices.
///
/// Group markers carry no indices; their layout lives in the schedule slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprEdge {
    pub(crate) expr: ExprNode,
    pub(crate) inp_idxs: SmallVec<[u32; MAX_IN]>,
    pub(crate) out_idxs: SmallVec<[u32; MAX_OUT]>,
}

impl ExprEdge {
    pub(crate) fn new(expr: ExprNode) -> Self {
        ExprEdge {
            expr,
            inp_idxs: SmallVec::new(),
            out_idxs: SmallVec::new(),
        }
    }

    pub fn expr(&self) -> &ExprNode {
        &self.expr
    }

    pub fn id(&self) -> OpId {
        self.expr.id()
    }

    pub fn kind(&self) -> OpKind {
        self.expr.kind()
    }

    pub fn is_group(&self) -> bool {
        self.expr.is_group()
    }

    pub fn inp_idxs(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.inp_idxs.iter().map(|&i| i as usize)
    }

    pub fn out_idxs(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.out_idxs.iter().map(|&i| i as usize)
    }
}
