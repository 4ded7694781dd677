//! Frozen tensor/operation DAGs.

pub mod dot_export;
pub mod memory;
mod node;
mod optype;
pub mod schedule;
pub mod subgraph;
pub mod validation;

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde::Serialize;

pub use dot_export::{export_to_dot, export_to_dot_with_options, DotExportOptions};
pub use memory::{CompactOp, CompactStaticGraph, DTypeStats, GraphMetadata};
pub use node::{ExprEdge, TensorNode};
pub use optype::OpKind;
pub use schedule::ScheduleSlot;
pub use subgraph::{GraphIo, Reachability, SubgraphCount};
pub use validation::{
    validate_dag, validate_topological_order, ValidationError, ValidationErrorKind,
    ValidationReport, ValidationWarning, ValidationWarningKind,
};

use crate::error::{check_capacity, CapacityKind, IrError, IrResult};
use crate::expr::{ExprNode, OpId};
use crate::limits::{GraphCapacity, TENSOR_MAX_OUT};
use crate::tensor::{TensorId, TensorRef};

/// A resolved, indexed and immutable DAG.
///
/// Built once from deduplicated descriptors; every transformation (sorting, subgraph
/// extraction) returns a new DAG with adjacency regenerated from scratch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticDag {
    capacity: GraphCapacity,
    tensors: Vec<TensorNode>,
    ops: Vec<ExprEdge>,
    schedule: Vec<ScheduleSlot>,
}

impl StaticDag {
    /// Freeze descriptors into a DAG.
    ///
    /// Groups are made contiguous (members rotated right after their marker), adjacency is
    /// generated and ranks are computed. The operation order is otherwise kept; call
    /// [`topological_sort`](StaticDag::topological_sort) to obtain an execution order.
    pub fn build(
        tensors: Vec<TensorRef>,
        exprs: Vec<ExprNode>,
        capacity: GraphCapacity,
    ) -> IrResult<Self> {
        check_capacity(CapacityKind::Tensors, capacity.max_tensors, tensors.len())?;
        check_capacity(
            CapacityKind::Operations,
            capacity.max_operations,
            exprs.len(),
        )?;

        let mut tensor_ids = HashSet::with_capacity(tensors.len());
        for t in &tensors {
            t.validate()?;
            if !tensor_ids.insert(t.id()) {
                return Err(IrError::ConflictingTensor { id: t.id() });
            }
        }
        let mut op_ids = HashSet::with_capacity(exprs.len());
        for e in &exprs {
            e.revalidate()?;
            if !op_ids.insert(e.id()) {
                return Err(IrError::ConflictingOperation { id: e.id() });
            }
        }

        let exprs = schedule::arrange_groups(exprs)?;

        let mut tensors: Vec<TensorNode> = tensors.into_iter().map(TensorNode::new).collect();
        let mut ops: Vec<ExprEdge> = exprs.into_iter().map(ExprEdge::new).collect();
        generate_indices(&mut tensors, &mut ops)?;

        let ranks = schedule::compute_ranks(&tensors, &ops)?;
        let schedule = schedule::build_slots(&ops, &ranks);

        Ok(StaticDag {
            capacity,
            tensors,
            ops,
            schedule,
        })
    }

    pub fn capacity(&self) -> GraphCapacity {
        self.capacity
    }

    pub fn tensors(&self) -> &[TensorNode] {
        &self.tensors
    }

    pub fn ops(&self) -> &[ExprEdge] {
        &self.ops
    }

    /// One slot per operation, in operation order.
    pub fn schedule(&self) -> &[ScheduleSlot] {
        &self.schedule
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn tensor_idx_from_id(&self, id: TensorId) -> Option<usize> {
        self.tensors.iter().position(|t| t.id() == id)
    }

    pub fn op_idx_from_id(&self, id: OpId) -> Option<usize> {
        self.ops.iter().position(|o| o.id() == id)
    }

    /// Operation indices of the members of the group whose marker sits at `header`.
    pub fn group_members(&self, header: usize) -> Option<Range<usize>> {
        match self.schedule.get(header)? {
            ScheduleSlot::GroupHeader { members, .. } => Some(header + 1..header + 1 + members),
            _ => None,
        }
    }

    /// Clone the descriptors back out, in current order.
    pub fn descriptors(&self) -> (Vec<TensorRef>, Vec<ExprNode>) {
        (
            self.tensors.iter().map(|t| t.tensor.clone()).collect(),
            self.ops.iter().map(|o| o.expr.clone()).collect(),
        )
    }

    pub(crate) fn tensor_idx_checked(&self, index: usize) -> IrResult<&TensorNode> {
        self.tensors.get(index).ok_or(IrError::TensorIndexOutOfBounds {
            index,
            len: self.tensors.len(),
        })
    }
}

/// Fill `incoming`/`outgoing` and `inp_idxs`/`out_idxs`. Group markers are skipped.
fn generate_indices(tensors: &mut [TensorNode], ops: &mut [ExprEdge]) -> IrResult<()> {
    let position: HashMap<TensorId, usize> = tensors
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id(), i))
        .collect();
    let op_ids: Vec<OpId> = ops.iter().map(|o| o.id()).collect();

    for (i, op) in ops.iter_mut().enumerate() {
        if op.is_group() {
            continue;
        }
        let op_id = op.id();
        let lookup = |tensor: TensorId| {
            position
                .get(&tensor)
                .copied()
                .ok_or(IrError::UnresolvedTensor { op: op_id, tensor })
        };

        for &id in op.expr.inputs() {
            let t = lookup(id)?;
            op.inp_idxs.push(t as u32);
            let node = &mut tensors[t];
            if !node.outgoing.contains(&(i as u32)) {
                check_capacity(
                    CapacityKind::FanOut,
                    TENSOR_MAX_OUT,
                    node.outgoing.len() + 1,
                )?;
                node.outgoing.push(i as u32);
            }
        }
        for &id in op.expr.outputs() {
            let t = lookup(id)?;
            op.out_idxs.push(t as u32);
            let node = &mut tensors[t];
            if let Some(prev) = node.incoming {
                return Err(IrError::MultipleProducers {
                    tensor: id,
                    first: op_ids[prev as usize],
                    second: op_id,
                });
            }
            node.incoming = Some(i as u32);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::ops;

    fn f32s(n: u32) -> Vec<TensorRef> {
        (0..n).map(|i| TensorRef::scalar(i, DType::F32)).collect()
    }

    #[test]
    fn test_adjacency() {
        let t = f32s(3);
        let add = ops::elm_add(0, &t[2], &[&t[0], &t[1]]).unwrap();
        let dag = StaticDag::build(t, vec![add], GraphCapacity::exact(3, 1)).unwrap();

        assert_eq!(dag.tensors()[2].incoming(), Some(0));
        assert_eq!(dag.tensors()[0].outgoing().collect::<Vec<_>>(), vec![0]);
        assert_eq!(dag.tensors()[1].outgoing().collect::<Vec<_>>(), vec![0]);
        assert_eq!(dag.tensors()[2].total_out(), 0);
        assert_eq!(dag.ops()[0].inp_idxs().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(dag.ops()[0].out_idxs().collect::<Vec<_>>(), vec![2]);
        assert_eq!(dag.schedule()[0], ScheduleSlot::Free { rank: 2 });
    }

    #[test]
    fn test_repeated_input_single_consumer_entry() {
        let t = f32s(2);
        let add = ops::elm_add(0, &t[1], &[&t[0], &t[0]]).unwrap();
        let dag = StaticDag::build(t, vec![add], GraphCapacity::default()).unwrap();
        assert_eq!(dag.tensors()[0].total_out(), 1);
        assert_eq!(dag.ops()[0].inp_idxs().len(), 2);
    }

    #[test]
    fn test_unresolved_tensor() {
        let t = f32s(3);
        let add = ops::elm_add(7, &t[2], &[&t[0], &t[1]]).unwrap();
        let err = StaticDag::build(t[..2].to_vec(), vec![add], GraphCapacity::default());
        assert_eq!(err, Err(IrError::UnresolvedTensor { op: 7, tensor: 2 }));
    }

    #[test]
    fn test_multiple_producers() {
        let t = f32s(2);
        let a = ops::fill(1, &t[0], 1.0f32).unwrap();
        let b = ops::fill(2, &t[0], 2.0f32).unwrap();
        let err = StaticDag::build(t, vec![a, b], GraphCapacity::default());
        assert_eq!(
            err,
            Err(IrError::MultipleProducers {
                tensor: 0,
                first: 1,
                second: 2
            })
        );
    }

    #[test]
    fn test_fan_out_overflow() {
        let t = f32s((TENSOR_MAX_OUT + 2) as u32);
        let exprs: Vec<_> = (1..t.len())
            .map(|i| ops::copy(i as u32, &t[i], &t[0]).unwrap())
            .collect();
        let err = StaticDag::build(t, exprs, GraphCapacity::default());
        assert!(matches!(
            err,
            Err(IrError::CapacityOverflow {
                what: CapacityKind::FanOut,
                ..
            })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let t = f32s(2);
        let a = ops::copy(0, &t[1], &t[0]).unwrap();
        let b = ops::copy(1, &t[0], &t[1]).unwrap();
        assert_eq!(
            StaticDag::build(t, vec![a, b], GraphCapacity::default()),
            Err(IrError::CyclicGraph)
        );
    }

    #[test]
    fn test_capacity_checked() {
        let t = f32s(3);
        let add = ops::elm_add(0, &t[2], &[&t[0], &t[1]]).unwrap();
        assert!(matches!(
            StaticDag::build(t, vec![add], GraphCapacity::exact(2, 1)),
            Err(IrError::CapacityOverflow {
                what: CapacityKind::Tensors,
                ..
            })
        ));
    }

    #[test]
    fn test_lookups() {
        let t: Vec<_> = [10, 20, 30]
            .iter()
            .map(|&i| TensorRef::scalar(i, DType::F32))
            .collect();
        let add = ops::elm_add(42, &t[2], &[&t[0], &t[1]]).unwrap();
        let dag = StaticDag::build(t, vec![add], GraphCapacity::default()).unwrap();
        assert_eq!(dag.tensor_idx_from_id(20), Some(1));
        assert_eq!(dag.tensor_idx_from_id(21), None);
        assert_eq!(dag.op_idx_from_id(42), Some(0));
    }
}
