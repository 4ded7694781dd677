//! Graph metadata and the compact, exactly-sized graph form.
//!
//! Construction works against caller-declared worst-case capacities. Once a DAG is final,
//! [`GraphMetadata`] records what is actually used and [`CompactStaticGraph`] re-sizes the
//! tensor and operation arrays to those true counts. Per-dtype element totals size the
//! runtime arenas.

use serde::{Deserialize, Serialize};

use super::validation::validate_topological_order;
use super::{OpKind, StaticDag};
use crate::dtype::DType;
use crate::error::{IrError, IrResult};
use crate::expr::OpId;
use crate::params::OpParams;
use crate::tensor::TensorRef;

/// Tensor count and element total of one data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DTypeStats {
    pub dtype: DType,
    pub tensors: usize,
    pub elements: usize,
}

impl DTypeStats {
    pub fn bytes(&self) -> usize {
        self.elements.saturating_mul(self.dtype.byte_size())
    }
}

/// True sizes of a finalized DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphMetadata {
    /// Largest input count of any executable operation
    pub max_inputs: usize,
    /// Largest output count of any executable operation
    pub max_outputs: usize,
    /// Largest consumer count of any tensor
    pub max_fan_out: usize,
    /// Executable operations (group markers excluded)
    pub num_ops: usize,
    pub num_tensors: usize,
    dtypes: Vec<DTypeStats>,
}

impl GraphMetadata {
    pub fn from_dag(dag: &StaticDag) -> Self {
        let mut dtypes: Vec<DTypeStats> = DType::ALL
            .iter()
            .map(|&dtype| DTypeStats {
                dtype,
                tensors: 0,
                elements: 0,
            })
            .collect();
        for t in dag.tensors() {
            let stats = &mut dtypes[t.dtype().index()];
            stats.tensors += 1;
            stats.elements = stats.elements.saturating_add(t.tensor().size());
        }

        let executable = dag.ops().iter().filter(|o| !o.is_group());
        GraphMetadata {
            max_inputs: executable.clone().map(|o| o.inp_idxs().len()).max().unwrap_or(0),
            max_outputs: executable.clone().map(|o| o.out_idxs().len()).max().unwrap_or(0),
            max_fan_out: dag.tensors().iter().map(|t| t.total_out()).max().unwrap_or(0),
            num_ops: executable.count(),
            num_tensors: dag.num_tensors(),
            dtypes,
        }
    }

    pub fn dtype_stats(&self, dtype: DType) -> DTypeStats {
        self.dtypes[dtype.index()]
    }

    /// Stats for every dtype with at least one tensor.
    pub fn used_dtypes(&self) -> impl Iterator<Item = &DTypeStats> {
        self.dtypes.iter().filter(|s| s.tensors > 0)
    }

    pub fn total_bytes(&self) -> usize {
        self.dtypes
            .iter()
            .fold(0usize, |acc, s| acc.saturating_add(s.bytes()))
    }
}

/// One executable operation of a [`CompactStaticGraph`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactOp {
    pub id: OpId,
    pub kind: OpKind,
    pub dtype: DType,
    /// Tensor indices into [`CompactStaticGraph::tensors`]
    pub inputs: Box<[u32]>,
    pub outputs: Box<[u32]>,
    pub params: OpParams,
}

/// Exactly-sized graph handed to execution. Operations are in schedule order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactStaticGraph {
    metadata: GraphMetadata,
    tensors: Box<[TensorRef]>,
    ops: Box<[CompactOp]>,
}

impl CompactStaticGraph {
    /// Compact a topologically sorted DAG.
    ///
    /// Group markers are dropped: the schedule already realizes their constraint. Every
    /// operation must share its dtype with each tensor it touches.
    pub fn from_dag(dag: &StaticDag) -> IrResult<Self> {
        validate_topological_order(dag)?;
        let metadata = GraphMetadata::from_dag(dag);

        let tensors: Box<[TensorRef]> = dag.tensors().iter().map(|t| t.tensor().clone()).collect();

        let mut ops = Vec::with_capacity(metadata.num_ops);
        for edge in dag.ops().iter().filter(|o| !o.is_group()) {
            let expr = edge.expr();
            let dtype = expr.dtype().ok_or_else(|| IrError::InvalidOperation {
                op: expr.id(),
                kind: expr.kind(),
                reason: "missing dtype".to_string(),
            })?;
            for t in edge.inp_idxs().chain(edge.out_idxs()) {
                let actual = tensors[t].dtype();
                if actual != dtype {
                    return Err(IrError::DTypeMismatch {
                        expected: dtype,
                        actual,
                    });
                }
            }
            ops.push(CompactOp {
                id: expr.id(),
                kind: expr.kind(),
                dtype,
                inputs: edge.inp_idxs().map(|i| i as u32).collect(),
                outputs: edge.out_idxs().map(|i| i as u32).collect(),
                params: *expr.params(),
            });
        }

        tracing::debug!(
            tensors = metadata.num_tensors,
            ops = metadata.num_ops,
            bytes = metadata.total_bytes(),
            "compacted graph"
        );
        Ok(CompactStaticGraph {
            metadata,
            tensors,
            ops: ops.into_boxed_slice(),
        })
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn tensors(&self) -> &[TensorRef] {
        &self.tensors
    }

    pub fn ops(&self) -> &[CompactOp] {
        &self.ops
    }
}
