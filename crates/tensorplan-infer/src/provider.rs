//! Execution provider: dispatches a compact graph's operations in schedule order.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tensorplan_ir::{CompactStaticGraph, IrError, TensorId};

use crate::error::{ExecutorError, ExecutorResult};
use crate::memory::{Element, MemoryStore};
use crate::traits::{KernelSet, OpContext};

/// Provider configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Trace every operation dispatch. Has no effect on results.
    pub is_debug: bool,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.is_debug = enabled;
        self
    }
}

/// Wall-clock statistics of one completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub duration: Duration,
    pub ops_executed: usize,
}

/// Owns a graph, its memory store and a kernel set.
///
/// Every provider has its own pools; concurrent runs need separate providers.
#[derive(Debug)]
pub struct ExecutionProvider<K: KernelSet> {
    graph: CompactStaticGraph,
    store: MemoryStore,
    kernels: K,
    options: ProviderOptions,
}

impl<K: KernelSet> ExecutionProvider<K> {
    pub fn new(graph: CompactStaticGraph, kernels: K, options: ProviderOptions) -> ExecutorResult<Self> {
        let store = MemoryStore::new(&graph)?;
        tracing::debug!(
            kernels = kernels.name(),
            ops = graph.ops().len(),
            bytes = store.total_bytes(),
            "created execution provider"
        );
        Ok(ExecutionProvider {
            graph,
            store,
            kernels,
            options,
        })
    }

    pub fn graph(&self) -> &CompactStaticGraph {
        &self.graph
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MemoryStore {
        &mut self.store
    }

    pub fn kernels(&self) -> &K {
        &self.kernels
    }

    pub fn options(&self) -> ProviderOptions {
        self.options
    }

    /// Check that the kernel set handles every operation.
    pub fn validate(&self) -> ExecutorResult<()> {
        for op in self.graph.ops() {
            if !self.kernels.supports(op.kind, op.dtype) {
                return Err(ExecutorError::UnsupportedOperation {
                    op: op.id,
                    kind: op.kind,
                    dtype: op.dtype,
                });
            }
        }
        Ok(())
    }

    /// Run every operation once, in order. Nothing runs if any operation is unsupported.
    pub fn execute(&mut self) -> ExecutorResult<ExecutionStats> {
        self.validate()?;

        let start = Instant::now();
        let tensors = self.graph.tensors();
        for (index, op) in self.graph.ops().iter().enumerate() {
            if self.options.is_debug {
                tracing::debug!(
                    index,
                    op = op.id,
                    kind = %op.kind,
                    dtype = %op.dtype,
                    "dispatching operation"
                );
            }
            let ctx = OpContext::new(index, op, tensors)?;
            let args = self.store.kernel_args(op)?;
            self.kernels.execute(&ctx, args)?;
        }

        let stats = ExecutionStats {
            duration: start.elapsed(),
            ops_executed: self.graph.ops().len(),
        };
        tracing::debug!(
            ops = stats.ops_executed,
            micros = stats.duration.as_micros() as u64,
            "execution finished"
        );
        Ok(stats)
    }

    /// Index of the tensor with id `id`.
    pub fn tensor_index(&self, id: TensorId) -> ExecutorResult<usize> {
        self.graph
            .tensors()
            .iter()
            .position(|t| t.id() == id)
            .ok_or(ExecutorError::Ir(IrError::UnknownTensorId { id }))
    }

    pub fn read<T: Element>(&self, id: TensorId) -> ExecutorResult<&[T]> {
        self.store.slice(self.tensor_index(id)?)
    }

    pub fn write<T: Element>(&mut self, id: TensorId, data: &[T]) -> ExecutorResult<()> {
        let index = self.tensor_index(id)?;
        self.store.write(index, data)
    }
}
