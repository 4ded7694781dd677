//! TensorPlan - static tensor-graph compiler and planner
//!
//! This is the top-level umbrella crate that re-exports all TensorPlan components.
//!
//! # Architecture
//!
//! - **Planning Layer**: `ir` (resolution, scheduling, extraction, graph metadata)
//! - **Execution Layer**: `infer` (typed arenas, kernels, execution provider)

pub use tensorplan_infer as infer;
pub use tensorplan_ir as ir;
