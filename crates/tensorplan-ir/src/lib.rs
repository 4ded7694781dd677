//! # TensorPlan IR
//!
//! **Static graph representation and planning for fixed-size tensor pipelines**
//!
//! **Version**: 0.1.0-alpha.2
//!
//! This crate turns a fully-known-ahead-of-time description of tensors and operations into a
//! deduplicated, indexed DAG, schedules it, extracts subgraphs and sizes the per-dtype memory
//! arenas an executor needs. Every container has an upper bound declared before construction;
//! exceeding it is an error, never a silent truncation.
//!
//! ## Core Components
//!
//! ### Descriptors
//! - [`TensorRef`]: id, [`DType`], [`Shape`], storage class and layout of one tensor
//! - [`ExprNode`]: one application of an [`OpKind`] to tensor ids, with [`OpParams`] bytes
//! - [`ops`]: constructor helpers deriving the op dtype from its output
//!
//! ### Resolution
//! - [`SymbolContainer`]: flat tensor array + operation array
//! - [`ExprArena`]: expression trees with shared sub-nodes, addressed by [`NodeIdx`]
//! - [`Resolver`]: deduplication with hash pre-filter and structural confirmation
//!
//! ### Graph
//! - [`StaticDag`]: frozen DAG with dense adjacency and one [`ScheduleSlot`] per operation
//! - [`StaticDag::topological_sort`]: group-aware scheduling
//! - [`StaticDag::subgraph`]: backward dependency extraction
//! - [`GraphMetadata`] and [`CompactStaticGraph`]: true sizes and the exactly-sized form
//! - [`export_to_dot`]: Graphviz rendering
//! - [`VersionedDag`]: JSON snapshots
//!
//! ## Example
//!
//! ```
//! use tensorplan_ir::{ops, CompactStaticGraph, DType, GraphCapacity, SymbolContainer, TensorRef};
//!
//! let a = TensorRef::array(0, DType::F32, 4).unwrap();
//! let b = TensorRef::array(1, DType::F32, 4).unwrap();
//! let c = TensorRef::array(2, DType::F32, 4).unwrap();
//! let d = TensorRef::array(3, DType::F32, 4).unwrap();
//!
//! let mut symbols = SymbolContainer::new(GraphCapacity::new(8, 8));
//! // Listed consumer first; scheduling fixes the order.
//! symbols.push_expr(ops::exp(1, &d, &c).unwrap()).unwrap();
//! symbols.push_expr(ops::elm_add(0, &c, &[&a, &b]).unwrap()).unwrap();
//! for t in [a, b, c, d] {
//!     symbols.push_tensor(t).unwrap();
//! }
//!
//! let dag = symbols.to_dag().unwrap().topological_sort().unwrap();
//! assert_eq!(dag.ops()[0].id(), 0);
//!
//! let compact = CompactStaticGraph::from_dag(&dag).unwrap();
//! assert_eq!(compact.metadata().dtype_stats(DType::F32).elements, 16);
//! ```
//!
//! ## Deduplication and hash collisions
//!
//! Operations are merged when their [`ExprNode::content_hash`] matches *and*
//! [`ExprNode::structurally_eq`] confirms it. Two operations with equal hashes but different
//! structure are both kept, and a `warn` event is emitted so the collision is visible.

pub mod dtype;
pub mod error;
pub mod expr;
pub mod graph;
pub mod limits;
pub mod ops;
pub mod params;
pub mod resolve;
pub mod serialization;
pub mod symbols;
pub mod tensor;
pub mod tree;

pub use dtype::{DType, Layout, StorageClass};
pub use error::{CapacityKind, IrError, IrResult};
pub use expr::{ExprNode, OpId};
pub use graph::{
    export_to_dot, export_to_dot_with_options, validate_dag, validate_topological_order,
    CompactOp, CompactStaticGraph, DTypeStats, DotExportOptions, ExprEdge, GraphIo,
    GraphMetadata, OpKind, Reachability, ScheduleSlot, StaticDag, SubgraphCount, TensorNode,
    ValidationReport,
};
pub use limits::{
    GraphCapacity, MAX_IN, MAX_OUT, MAX_RANK, PARAM_BYTES_MAX, SYNTHETIC_ID_BASE, TENSOR_MAX_OUT,
};
pub use params::{OpParams, ParamValue};
pub use resolve::{Resolution, Resolver};
pub use serialization::{DagSnapshot, VersionedDag, FORMAT_VERSION};
pub use symbols::SymbolContainer;
pub use tensor::{Shape, TensorId, TensorRef};
pub use tree::{ExprArena, NodeIdx, TreeNode};
