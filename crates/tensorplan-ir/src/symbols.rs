//! Flat symbol container: a tensor array plus an operation array.

use serde::{Deserialize, Serialize};

use crate::error::{check_capacity, CapacityKind, IrResult};
use crate::expr::ExprNode;
use crate::graph::StaticDag;
use crate::limits::GraphCapacity;
use crate::resolve::{Resolution, Resolver};
use crate::tensor::TensorRef;

/// Builder for the flat input form.
///
/// Every id referenced by an operation must name a tensor pushed into the same container.
/// Pushing past the declared capacity fails and leaves the container untouched.
///
/// ```
/// use tensorplan_ir::{ops, DType, GraphCapacity, SymbolContainer, TensorRef};
///
/// let a = TensorRef::scalar(0, DType::F32);
/// let b = TensorRef::scalar(1, DType::F32);
/// let c = TensorRef::scalar(2, DType::F32);
///
/// let mut symbols = SymbolContainer::new(GraphCapacity::exact(3, 1));
/// symbols.push_expr(ops::elm_add(0, &c, &[&a, &b]).unwrap()).unwrap();
/// symbols.push_tensor(a).unwrap();
/// symbols.push_tensor(b).unwrap();
/// symbols.push_tensor(c).unwrap();
///
/// let dag = symbols.to_dag().unwrap();
/// assert_eq!(dag.num_tensors(), 3);
/// assert_eq!(dag.tensors()[2].incoming(), Some(0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolContainer {
    capacity: GraphCapacity,
    tensors: Vec<TensorRef>,
    exprs: Vec<ExprNode>,
}

impl SymbolContainer {
    pub fn new(capacity: GraphCapacity) -> Self {
        SymbolContainer {
            capacity,
            tensors: Vec::with_capacity(capacity.max_tensors),
            exprs: Vec::with_capacity(capacity.max_operations),
        }
    }

    pub fn push_tensor(&mut self, tensor: TensorRef) -> IrResult<usize> {
        check_capacity(
            CapacityKind::Tensors,
            self.capacity.max_tensors,
            self.tensors.len() + 1,
        )?;
        self.tensors.push(tensor);
        Ok(self.tensors.len() - 1)
    }

    pub fn push_expr(&mut self, expr: ExprNode) -> IrResult<usize> {
        check_capacity(
            CapacityKind::Operations,
            self.capacity.max_operations,
            self.exprs.len() + 1,
        )?;
        self.exprs.push(expr);
        Ok(self.exprs.len() - 1)
    }

    pub fn capacity(&self) -> GraphCapacity {
        self.capacity
    }

    pub fn tensors(&self) -> &[TensorRef] {
        &self.tensors
    }

    pub fn exprs(&self) -> &[ExprNode] {
        &self.exprs
    }

    /// Deduplicate the symbols without building adjacency.
    pub fn resolve(&self) -> IrResult<Resolution> {
        Resolver::new(self.capacity).resolve_flat(self)
    }

    /// Deduplicate and freeze into a DAG.
    pub fn to_dag(&self) -> IrResult<StaticDag> {
        self.resolve()?.into_dag(self.capacity)
    }
}
