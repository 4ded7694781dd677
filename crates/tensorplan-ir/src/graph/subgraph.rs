//! Backward dependency search and induced subgraphs.
//!
//! Extraction is two-phase: a count pre-pass sizes the target capacity, then the visited
//! tensors and operations are rebuilt, in their original relative order, into a fresh
//! [`StaticDag`]. A group marker is kept only when all of its members are.

use serde::{Deserialize, Serialize};

use super::{ScheduleSlot, StaticDag};
use crate::error::{IrError, IrResult};
use crate::limits::GraphCapacity;
use crate::tensor::TensorId;

/// Visited flags over tensors and operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    pub tensors: Vec<bool>,
    pub ops: Vec<bool>,
}

impl Reachability {
    pub fn count(&self) -> SubgraphCount {
        SubgraphCount {
            tensors: self.tensors.iter().filter(|&&v| v).count(),
            operations: self.ops.iter().filter(|&&v| v).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubgraphCount {
    pub tensors: usize,
    pub operations: usize,
}

impl SubgraphCount {
    /// The exact capacity needed to hold the subgraph.
    pub fn capacity(&self) -> GraphCapacity {
        GraphCapacity::exact(self.tensors, self.operations)
    }
}

/// Graph inputs (tensors nobody produces) and outputs (tensors nobody consumes), as indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphIo {
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl StaticDag {
    /// Mark every tensor and operation the wanted tensors depend on.
    pub fn reachability(&self, wanted: &[usize]) -> IrResult<Reachability> {
        let mut tensors = vec![false; self.num_tensors()];
        let mut ops = vec![false; self.num_ops()];

        let mut stack = Vec::with_capacity(wanted.len());
        for &w in wanted {
            self.tensor_idx_checked(w)?;
            stack.push(w);
        }

        while let Some(t) = stack.pop() {
            if tensors[t] {
                continue;
            }
            tensors[t] = true;
            if let Some(p) = self.tensors()[t].incoming() {
                if !ops[p] {
                    ops[p] = true;
                    // Sibling outputs come along with their producer.
                    for o in self.ops()[p].out_idxs() {
                        tensors[o] = true;
                    }
                    stack.extend(self.ops()[p].inp_idxs().filter(|&i| !tensors[i]));
                }
            }
        }

        for (i, slot) in self.schedule().iter().enumerate() {
            if let ScheduleSlot::GroupHeader { members, .. } = slot {
                ops[i] = ops[i + 1..i + 1 + members].iter().all(|&v| v);
            }
        }

        Ok(Reachability { tensors, ops })
    }

    pub fn subgraph_count_by_idx(&self, wanted: &[usize]) -> IrResult<SubgraphCount> {
        Ok(self.reachability(wanted)?.count())
    }

    pub fn subgraph_count(&self, wanted: &[TensorId]) -> IrResult<SubgraphCount> {
        self.subgraph_count_by_idx(&self.resolve_tensor_ids(wanted)?)
    }

    /// Materialize the subgraph into a DAG of the given capacity.
    pub fn subgraph_by_idx(&self, wanted: &[usize], capacity: GraphCapacity) -> IrResult<StaticDag> {
        let reach = self.reachability(wanted)?;
        let (tensors, exprs) = self.descriptors();

        let tensors: Vec<_> = tensors
            .into_iter()
            .zip(&reach.tensors)
            .filter_map(|(t, &keep)| keep.then_some(t))
            .collect();
        let exprs: Vec<_> = exprs
            .into_iter()
            .zip(&reach.ops)
            .filter_map(|(e, &keep)| keep.then_some(e))
            .collect();

        tracing::debug!(
            wanted = wanted.len(),
            tensors = tensors.len(),
            ops = exprs.len(),
            pruned_ops = self.num_ops() - exprs.len(),
            "extracted subgraph"
        );
        StaticDag::build(tensors, exprs, capacity)
    }

    pub fn subgraph(&self, wanted: &[TensorId], capacity: GraphCapacity) -> IrResult<StaticDag> {
        self.subgraph_by_idx(&self.resolve_tensor_ids(wanted)?, capacity)
    }

    /// Materialize the subgraph sized exactly by the count pre-pass.
    pub fn subgraph_exact(&self, wanted: &[TensorId]) -> IrResult<StaticDag> {
        let idxs = self.resolve_tensor_ids(wanted)?;
        let capacity = self.subgraph_count_by_idx(&idxs)?.capacity();
        self.subgraph_by_idx(&idxs, capacity)
    }

    /// Number of graph inputs and outputs.
    pub fn io_count(&self) -> (usize, usize) {
        let inputs = self
            .tensors()
            .iter()
            .filter(|t| t.incoming().is_none())
            .count();
        let outputs = self.tensors().iter().filter(|t| t.total_out() == 0).count();
        (inputs, outputs)
    }

    pub fn io_indices(&self) -> GraphIo {
        let mut io = GraphIo::default();
        for (i, t) in self.tensors().iter().enumerate() {
            if t.incoming().is_none() {
                io.inputs.push(i);
            }
            if t.total_out() == 0 {
                io.outputs.push(i);
            }
        }
        io
    }

    fn resolve_tensor_ids(&self, ids: &[TensorId]) -> IrResult<Vec<usize>> {
        ids.iter()
            .map(|&id| {
                self.tensor_idx_from_id(id)
                    .ok_or(IrError::UnknownTensorId { id })
            })
            .collect()
    }
}
