//! # TensorPlan Infer
//!
//! **Arena memory and execution for compacted TensorPlan graphs**
//!
//! **Version**: 0.1.0-alpha.2
//!
//! Given a [`CompactStaticGraph`](tensorplan_ir::CompactStaticGraph), this crate
//!
//! - allocates one exactly-sized pool per primitive data type ([`MemoryStore`]) and places
//!   every tensor by a running cursor,
//! - hands each operation's operand views to a [`KernelSet`],
//! - runs all operations in schedule order ([`ExecutionProvider`]).
//!
//! No allocation proportional to graph size happens during [`ExecutionProvider::execute`].
//!
//! ## Example
//!
//! ```
//! use tensorplan_infer::{ExecutionProvider, ProviderOptions, ReferenceKernels};
//! use tensorplan_ir::{ops, CompactStaticGraph, DType, GraphCapacity, SymbolContainer, TensorRef};
//!
//! let a = TensorRef::array(0, DType::F32, 3).unwrap();
//! let b = TensorRef::array(1, DType::F32, 3).unwrap();
//! let c = TensorRef::array(2, DType::F32, 3).unwrap();
//!
//! let mut symbols = SymbolContainer::new(GraphCapacity::exact(3, 1));
//! symbols.push_expr(ops::elm_add(0, &c, &[&a, &b]).unwrap()).unwrap();
//! for t in [a, b, c] {
//!     symbols.push_tensor(t).unwrap();
//! }
//! let dag = symbols.to_dag().unwrap().topological_sort().unwrap();
//! let graph = CompactStaticGraph::from_dag(&dag).unwrap();
//!
//! let mut provider =
//!     ExecutionProvider::new(graph, ReferenceKernels::new(), ProviderOptions::default()).unwrap();
//! provider.write(0, &[1.0f32, 2.0, 3.0]).unwrap();
//! provider.write(1, &[10.0f32, 20.0, 30.0]).unwrap();
//! provider.execute().unwrap();
//! assert_eq!(provider.read::<f32>(2).unwrap(), &[11.0, 22.0, 33.0]);
//! ```

pub mod error;
pub mod memory;
pub mod provider;
pub mod reference_kernels;
#[cfg(feature = "structured-logging")]
pub mod structured_logging;
pub mod traits;

pub use error::{ExecutorError, ExecutorResult};
pub use memory::{Element, MemoryStore, Pools, TensorSlot};
pub use provider::{ExecutionProvider, ExecutionStats, ProviderOptions};
pub use reference_kernels::{Numeric, ReferenceKernels};
pub use traits::{KernelArgs, KernelSet, OpContext, TypedIo};
