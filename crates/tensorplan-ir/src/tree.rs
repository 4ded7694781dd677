//! Expression trees stored in an index-addressed arena.
//!
//! Nodes only ever reference nodes created before them, so an arena is acyclic by
//! construction and the same tensor or sub-expression can be shared by any number of parents.
//!
//! ```
//! use tensorplan_ir::{DType, ExprArena, OpKind, TensorRef, Resolver, GraphCapacity};
//!
//! let mut arena = ExprArena::new();
//! let x = arena.tensor(TensorRef::array(0, DType::F32, 8).unwrap());
//! let y = arena.tensor(TensorRef::array(1, DType::F32, 8).unwrap());
//! let e = arena.op(OpKind::Exp, &[x], &[y]).unwrap();
//!
//! // `x` is read twice but resolves to one tensor entry.
//! let z = arena.tensor(TensorRef::array(2, DType::F32, 8).unwrap());
//! let add = arena.op(OpKind::ElemAdd, &[x, e], &[z]).unwrap();
//!
//! let res = Resolver::new(GraphCapacity::default()).resolve_tree(&arena, &[add]).unwrap();
//! assert_eq!(res.tensors.len(), 3);
//! assert_eq!(res.exprs.len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::dtype::DType;
use crate::error::{check_capacity, CapacityKind, IrError, IrResult};
use crate::graph::OpKind;
use crate::limits::{MAX_IN, MAX_OUT};
use crate::params::OpParams;
use crate::tensor::TensorRef;

/// Index of a node inside an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdx(pub u32);

impl NodeIdx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Tensor(TensorRef),
    /// Inputs may be tensor nodes or operation nodes; an operation node used as an input
    /// stands for that operation's first output.
    Op {
        kind: OpKind,
        dtype: DType,
        inputs: SmallVec<[NodeIdx; MAX_IN]>,
        outputs: SmallVec<[NodeIdx; MAX_OUT]>,
        params: OpParams,
    },
    Group {
        members: SmallVec<[NodeIdx; MAX_IN]>,
        pinned: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<TreeNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nodes: usize) -> Self {
        ExprArena {
            nodes: Vec::with_capacity(nodes),
        }
    }

    pub fn tensor(&mut self, tensor: TensorRef) -> NodeIdx {
        self.push(TreeNode::Tensor(tensor))
    }

    /// Add an operation without parameter bytes. The dtype is taken from the first output.
    pub fn op(&mut self, kind: OpKind, inputs: &[NodeIdx], outputs: &[NodeIdx]) -> IrResult<NodeIdx> {
        self.op_with_params(kind, inputs, outputs, OpParams::empty())
    }

    pub fn op_with_params(
        &mut self,
        kind: OpKind,
        inputs: &[NodeIdx],
        outputs: &[NodeIdx],
        params: OpParams,
    ) -> IrResult<NodeIdx> {
        check_capacity(CapacityKind::Inputs, MAX_IN, inputs.len())?;
        check_capacity(CapacityKind::Outputs, MAX_OUT, outputs.len())?;
        for &idx in inputs {
            if let TreeNode::Group { .. } = self.get(idx)? {
                return Err(IrError::InvalidOperation {
                    op: self.nodes.len() as u32,
                    kind,
                    reason: format!("input node {} is a group marker", idx.0),
                });
            }
        }
        let mut dtype = None;
        for &idx in outputs {
            match self.get(idx)? {
                TreeNode::Tensor(t) => {
                    dtype.get_or_insert(t.dtype());
                }
                _ => {
                    return Err(IrError::InvalidOperation {
                        op: self.nodes.len() as u32,
                        kind,
                        reason: format!("output node {} is not a tensor", idx.0),
                    })
                }
            }
        }
        let dtype = dtype.ok_or_else(|| IrError::InvalidOperation {
            op: self.nodes.len() as u32,
            kind,
            reason: "operation declares no output".to_string(),
        })?;
        Ok(self.push(TreeNode::Op {
            kind,
            dtype,
            inputs: SmallVec::from_slice(inputs),
            outputs: SmallVec::from_slice(outputs),
            params,
        }))
    }

    /// Group previously added operation nodes.
    pub fn group(&mut self, members: &[NodeIdx], pinned: bool) -> IrResult<NodeIdx> {
        check_capacity(CapacityKind::GroupMembers, MAX_IN, members.len())?;
        for &idx in members {
            if !matches!(self.get(idx)?, TreeNode::Op { .. }) {
                return Err(IrError::ExpectedOperation { index: idx.index() });
            }
        }
        Ok(self.push(TreeNode::Group {
            members: SmallVec::from_slice(members),
            pinned,
        }))
    }

    pub fn get(&self, idx: NodeIdx) -> IrResult<&TreeNode> {
        self.nodes
            .get(idx.index())
            .ok_or(IrError::NodeIndexOutOfBounds {
                index: idx.index(),
                len: self.nodes.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    fn push(&mut self, node: TreeNode) -> NodeIdx {
        self.nodes.push(node);
        NodeIdx((self.nodes.len() - 1) as u32)
    }
}
