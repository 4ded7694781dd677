//! Operation descriptors.
//!
//! An [`ExprNode`] is one application of an [`OpKind`] to tensors named by id. Two nodes
//! describing the same computation share a [`content_hash`](ExprNode::content_hash) whatever
//! their own ids are; the resolver uses it as a pre-filter before comparing them with
//! [`structurally_eq`](ExprNode::structurally_eq).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::dtype::DType;
use crate::error::{check_capacity, CapacityKind, IrError, IrResult};
use crate::graph::OpKind;
use crate::limits::{MAX_IN, MAX_OUT};
use crate::params::OpParams;
use crate::tensor::TensorId;

/// Operation identifier. Caller-assigned in flat form, synthetic in tree form.
pub type OpId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExprNode {
    id: OpId,
    kind: OpKind,
    dtype: Option<DType>,
    inputs: SmallVec<[u32; MAX_IN]>,
    outputs: SmallVec<[TensorId; MAX_OUT]>,
    params: OpParams,
}

impl ExprNode {
    /// Build a non-group operation without parameter bytes.
    pub fn new(
        id: OpId,
        kind: OpKind,
        dtype: DType,
        inputs: &[TensorId],
        outputs: &[TensorId],
    ) -> IrResult<Self> {
        Self::with_params(id, kind, dtype, inputs, outputs, OpParams::empty())
    }

    /// Build a non-group operation.
    pub fn with_params(
        id: OpId,
        kind: OpKind,
        dtype: DType,
        inputs: &[TensorId],
        outputs: &[TensorId],
        params: OpParams,
    ) -> IrResult<Self> {
        let invalid = |reason: &str| IrError::InvalidOperation {
            op: id,
            kind,
            reason: reason.to_string(),
        };

        if kind.is_group() {
            return Err(invalid("group markers are built with ExprNode::group"));
        }
        check_capacity(CapacityKind::Inputs, MAX_IN, inputs.len())?;
        check_capacity(CapacityKind::Outputs, MAX_OUT, outputs.len())?;

        let (min_in, max_in) = kind.input_arity();
        if inputs.len() < min_in || inputs.len() > max_in {
            return Err(invalid(&format!(
                "expects {}..={} inputs, got {}",
                min_in,
                max_in,
                inputs.len()
            )));
        }
        if outputs.is_empty() {
            return Err(invalid("operation declares no output"));
        }
        for (i, out) in outputs.iter().enumerate() {
            if outputs[..i].contains(out) {
                return Err(invalid(&format!("output tensor {} listed twice", out)));
            }
            if inputs.contains(out) {
                return Err(invalid(&format!("tensor {} is both read and written", out)));
            }
        }
        let expected = kind.param_size(dtype);
        if params.len() != expected {
            return Err(invalid(&format!(
                "expects {} parameter bytes, got {}",
                expected,
                params.len()
            )));
        }

        Ok(ExprNode {
            id,
            kind,
            dtype: Some(dtype),
            inputs: SmallVec::from_slice(inputs),
            outputs: SmallVec::from_slice(outputs),
            params,
        })
    }

    /// Build a group marker over the given member operation ids.
    pub fn group(id: OpId, members: &[OpId], pinned: bool) -> IrResult<Self> {
        check_capacity(CapacityKind::GroupMembers, MAX_IN, members.len())?;
        if members.len() < 2 {
            return Err(IrError::InvalidGroup {
                group: id,
                reason: format!("a group needs at least 2 members, got {}", members.len()),
            });
        }
        for (i, m) in members.iter().enumerate() {
            if members[..i].contains(m) || *m == id {
                return Err(IrError::InvalidGroup {
                    group: id,
                    reason: format!("member {} listed twice", m),
                });
            }
        }
        Ok(ExprNode {
            id,
            kind: OpKind::Group { pinned },
            dtype: None,
            inputs: SmallVec::from_slice(members),
            outputs: SmallVec::new(),
            params: OpParams::empty(),
        })
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Element type of the operation; `None` for group markers.
    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    /// Input tensor ids, or member operation ids for a group marker.
    pub fn inputs(&self) -> &[u32] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn params(&self) -> &OpParams {
        &self.params
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// Member operation ids of a group marker.
    pub fn members(&self) -> Option<&[OpId]> {
        self.is_group().then_some(&self.inputs[..])
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self.kind, OpKind::Group { pinned: true })
    }

    /// Structural hash over kind, arity and the ordered input/output ids. Never the node id.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind.hash(&mut hasher);
        self.inputs.len().hash(&mut hasher);
        self.outputs.len().hash(&mut hasher);
        for id in &self.inputs {
            id.hash(&mut hasher);
        }
        for id in &self.outputs {
            id.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Full structural equality, ignoring the node id.
    pub fn structurally_eq(&self, other: &ExprNode) -> bool {
        self.kind == other.kind
            && self.dtype == other.dtype
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.params == other.params
    }

    /// Re-run constructor validation, for nodes that did not come through a constructor.
    pub(crate) fn revalidate(&self) -> IrResult<()> {
        if let OpKind::Group { pinned } = self.kind {
            return Self::group(self.id, &self.inputs, pinned).map(|_| ());
        }
        let dtype = self.dtype.ok_or_else(|| IrError::InvalidOperation {
            op: self.id,
            kind: self.kind,
            reason: "missing dtype".to_string(),
        })?;
        Self::with_params(
            self.id,
            self.kind,
            dtype,
            &self.inputs,
            &self.outputs,
            self.params,
        )
        .map(|_| ())
    }

    pub(crate) fn map_members(&mut self, f: impl Fn(OpId) -> OpId) {
        if self.is_group() {
            for m in self.inputs.iter_mut() {
                *m = f(*m);
            }
        }
    }
}

impl std::fmt::Display for ExprNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}(", self.kind, self.id)?;
        for (i, id) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, ") -> [")?;
        for (i, id) in self.outputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ignores_id() {
        let a = ExprNode::new(7, OpKind::ElemAdd, DType::F32, &[0, 1], &[2]).unwrap();
        let b = ExprNode::new(99, OpKind::ElemAdd, DType::F32, &[0, 1], &[2]).unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
        assert!(a.structurally_eq(&b));
    }

    #[test]
    fn test_hash_depends_on_order() {
        let a = ExprNode::new(0, OpKind::ElemSub, DType::F32, &[0, 1], &[2]).unwrap();
        let b = ExprNode::new(0, OpKind::ElemSub, DType::F32, &[1, 0], &[2]).unwrap();
        assert_ne!(a.content_hash(), b.content_hash());
        assert!(!a.structurally_eq(&b));
    }

    #[test]
    fn test_structural_eq_checks_params() {
        let a = ExprNode::with_params(
            0,
            OpKind::Fill,
            DType::F32,
            &[],
            &[1],
            OpParams::from_scalar(1.0f32),
        )
        .unwrap();
        let b = ExprNode::with_params(
            1,
            OpKind::Fill,
            DType::F32,
            &[],
            &[1],
            OpParams::from_scalar(2.0f32),
        )
        .unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
        assert!(!a.structurally_eq(&b));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(ExprNode::new(0, OpKind::Copy, DType::F32, &[1], &[]).is_err());
        assert!(ExprNode::new(0, OpKind::Copy, DType::F32, &[1], &[1]).is_err());
        assert!(ExprNode::new(0, OpKind::MatMul, DType::F32, &[0, 1], &[2, 2]).is_err());
        assert!(ExprNode::new(0, OpKind::Fill, DType::F32, &[], &[1]).is_err());
        assert!(matches!(
            ExprNode::new(0, OpKind::ElemAdd, DType::F32, &[0, 1, 2, 3, 4, 5], &[6]),
            Err(IrError::CapacityOverflow {
                what: CapacityKind::Inputs,
                ..
            })
        ));
    }

    #[test]
    fn test_group() {
        let g = ExprNode::group(10, &[1, 2, 3], true).unwrap();
        assert!(g.is_pinned());
        assert_eq!(g.members(), Some(&[1, 2, 3][..]));
        assert_eq!(g.dtype(), None);
        assert!(ExprNode::group(10, &[1], false).is_err());
        assert!(ExprNode::group(10, &[1, 1], false).is_err());
    }

    #[test]
    fn test_display() {
        let a = ExprNode::new(3, OpKind::ElemAdd, DType::F32, &[0, 1], &[2]).unwrap();
        assert_eq!(a.to_string(), "ELM_ADD#3(0, 1) -> [2]");
    }
}
